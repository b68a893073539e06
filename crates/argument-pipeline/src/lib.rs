//! Argument Pipeline
//!
//! Nine-stage generation of one debate argument from a pool of local models:
//! context extraction, strategy selection, diverse generation, an Elo
//! tournament, ensemble consensus, semantic dedup, evidence grounding,
//! adversarial stress test and final refinement.
//!
//! - `providers`: model, embedding and search contracts with HTTP clients
//! - `dispatch`: rotated, bounded, retried model calls
//! - `parse`: schema checks for every model answer
//! - `evidence`: search adapter and the bounded tool-call loop
//! - `stages`: one module per stage
//! - `state_machine`: legal run-state transitions with a transition log
//! - `orchestrator`: sequencing, timeouts, run ceiling and events
//!
//! Decision logic (rotation, Elo, voting, dedup math, prompts) lives in
//! `debate_coordination`.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod evidence;
pub mod orchestrator;
pub mod parse;
pub mod providers;
pub mod stages;
pub mod state_machine;

pub use config::{check_endpoint, list_models, EndpointConfig};
pub use dispatch::{CallScope, Dispatched, Dispatcher};
pub use errors::{EmbedError, ModelCallError, PipelineError, RetryCategory, SearchError};
pub use orchestrator::{run_pipeline, Collaborators, Orchestrator};
pub use providers::{Embedder, GenerateOptions, ModelClient, SearchResult, WebSearch};
pub use state_machine::{PipelineState, StateMachine};
