//! The agent contract seen by the phase controller.

use async_trait::async_trait;
use gridparley_core::environment::{Action, Position};
use gridparley_core::error::Result;
use gridparley_core::task::RoleVariant;
use serde::{Deserialize, Serialize};

/// One agent's view of the current step, built from its observation slice
/// and owned copies of the previous actions and positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredPrompt {
    pub observation: serde_json::Value,
    /// Read from the observation's `current_pos`
    pub current_position: Option<Position>,
    pub previous_actions: Vec<Option<Action>>,
    pub previous_positions: Vec<Option<Position>>,
    /// Rendered user message for the completion service
    pub text: String,
}

/// A participant in an episode.
///
/// Each step the controller calls `update_observation`, then
/// `update_policy`, then `take_action`, in that order.
#[async_trait]
pub trait Agent: Send {
    /// Environment agent name (`player_0`).
    fn name(&self) -> &str;

    /// Role name (`carpenter_0`).
    fn display_name(&self) -> &str;

    /// Index into the controller's per-agent arrays.
    fn id(&self) -> usize;

    fn role(&self) -> RoleVariant;

    fn current_plan(&self) -> &str;

    fn update_observation(
        &mut self,
        raw: &serde_json::Value,
        previous_actions: Vec<Option<Action>>,
        previous_positions: Vec<Option<Position>>,
    ) -> StructuredPrompt;

    /// Run one decision cycle and stage the resulting action.
    async fn update_policy(&mut self, prompt: &StructuredPrompt) -> Result<()>;

    /// Return and clear the staged action.
    ///
    /// Fails with `Error::State` unless `update_policy` ran since the last take.
    fn take_action(&mut self) -> Result<Action>;

    /// Forget dialogue history and any staged action.
    fn reset(&mut self);
}
