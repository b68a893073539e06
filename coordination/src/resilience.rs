//! Resilience: degraded results from optional collaborators
//!
//! Web search and evidence lookups are allowed to fail without failing the
//! run. Instead of an error, callers get a [`DegradedResponse`] carrying the
//! best-effort payload, how much of the service was available, and warnings
//! suitable for logs and stage summaries.
//!
//! ```text
//! Collaborator call
//!   ├─ succeeds                → DegradedResponse { level: Full, ... }
//!   ├─ succeeds with problems  → DegradedResponse { level: Partial, warnings, ... }
//!   └─ fails / not configured  → DegradedResponse { level: Unavailable, payload: empty }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much of a collaborator's capability was available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    Full,
    /// Some sub-requests failed; the payload is incomplete.
    Partial,
    /// Nothing usable; the payload is empty.
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A collaborator response wrapped with degradation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedResponse<T> {
    pub payload: T,
    pub level: DegradationLevel,
    /// Which service produced the payload ("none" when unavailable).
    pub served_by: String,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> DegradedResponse<T> {
    pub fn full(payload: T, served_by: &str) -> Self {
        Self {
            payload,
            level: DegradationLevel::Full,
            served_by: served_by.to_string(),
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn unavailable(payload: T, warning: impl Into<String>) -> Self {
        Self {
            payload,
            level: DegradationLevel::Unavailable,
            served_by: "none".to_string(),
            warnings: vec![warning.into()],
            timestamp: Utc::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.level == DegradationLevel::Full
    }

    pub fn is_degraded(&self) -> bool {
        self.level != DegradationLevel::Full
    }

    /// Lower the level to at least `level`, recording why.
    pub fn degrade(mut self, level: DegradationLevel, warning: impl Into<String>) -> Self {
        self.level = self.level.max(level);
        self.warnings.push(warning.into());
        self
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Default> DegradedResponse<T> {
    /// Unavailable with an empty payload.
    pub fn empty(warning: impl Into<String>) -> Self {
        Self::unavailable(T::default(), warning)
    }
}
