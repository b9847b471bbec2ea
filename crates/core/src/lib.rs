//! # GridParley Core
//!
//! Domain types, traits, and error definitions for running multi-agent
//! episodes where every agent decides by querying a remote completion
//! service. This crate has **no I/O of its own**: it defines the model that
//! the provider, environment, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] — a remote completion service
//! - [`Environment`] — the grid-world simulator
//!
//! Implementations live in their respective crates, which keeps the
//! orchestration logic testable with scripted stand-ins.

pub mod environment;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod provider;
pub mod task;

// Re-export key types at crate root for ergonomics
pub use environment::{
    Action, ActionMap, AgentInfo, Environment, Position, ResetOutcome, StepOutcome, ALL_AGENTS,
};
pub use error::{EnvironmentError, Error, ErrorClass, ProviderError, Result};
pub use event::{EpisodeEvent, EventBus};
pub use message::{Message, Role};
pub use model::{ModelFamily, ModelSpec};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use task::{Phase, RoleMap, RoleVariant, TaskFamily, TaskName};
