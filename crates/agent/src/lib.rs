//! Agents and episode orchestration for GridParley.
//!
//! Each step follows a **Observe → Decide → Act** cycle:
//!
//! 1. **Observe**: every active agent turns its observation slice and the
//!    previous step's actions and positions into a prompt
//! 2. **Decide**: the agent queries the completion service through its
//!    [`QueryClient`], with retries, and parses a plan and an action
//! 3. **Act**: the controller submits the joint action to the environment
//!    and accumulates rewards
//!
//! At the phase boundary the negotiation roster hands over to the physical
//! roster. The [`EpisodeRunner`] repeats this for every episode of a run.

pub mod agent;
pub mod controller;
pub mod decision;
pub mod factory;
pub mod history;
pub mod llm_agent;
pub mod query;
pub mod retry;
pub mod roles;
pub mod runner;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, StructuredPrompt};
pub use controller::{EpisodeSummary, PhaseController};
pub use factory::{AgentContext, AgentFactory, Roster};
pub use history::{DialogueHistory, EvictionReport, RetrievalPolicy, TURN_GROUP_SIZE};
pub use llm_agent::{DecisionPolicy, LlmAgent, LlmAgentBuilder};
pub use query::QueryClient;
pub use retry::{RetryPolicy, ServiceRetryPolicy};
pub use runner::{EpisodeRunner, RunReport};
