//! Prompt construction for each role variant.
//!
//! Game rules live in the simulator; these prompts only establish who the
//! agent is, what phase it acts in and the reply format.

use gridparley_core::environment::{Action, Position};
use gridparley_core::message::Message;
use gridparley_core::task::{Phase, RoleVariant, TaskFamily, TaskName};
use serde_json::Value;

/// Static facts an agent's prompts are built from.
#[derive(Debug, Clone, Copy)]
pub struct RoleContext<'a> {
    pub task: TaskName,
    pub display_name: &'a str,
    /// Role names of every agent, indexed by agent id
    pub peers: &'a [String],
    pub task_description: Option<&'a Value>,
    pub physical_actions: &'a [String],
}

const REPLY_FORMAT: &str =
    "Reply with a single JSON object: {\"plan\": \"<your plan>\", \"action\": <your action>}.";

/// The fixed system messages for an agent.
pub fn instruction_head(role: RoleVariant, ctx: &RoleContext<'_>) -> Vec<Message> {
    let identity = format!(
        "You are {}, one of {} agents ({}) in a turn-based grid world where carpenters and miners \
         gather resources and build together.",
        ctx.display_name,
        ctx.peers.len(),
        ctx.peers.join(", ")
    );

    let phase_rules = match (role.family, role.phase) {
        (TaskFamily::Contract, Phase::NegotiationContract) => {
            "Contract phase: agree with the other agents on contracts stating who pays whom, and \
             how much, for help gathering resources. Your action is a contract proposal, an \
             acceptance or a rejection, written as a JSON object."
                .to_string()
        }
        (TaskFamily::Negotiation, Phase::NegotiationContract) => {
            "Negotiation phase: trade resources with the other agents. Your action is a message \
             or a trade proposal, written as a JSON object."
                .to_string()
        }
        (TaskFamily::SocialStructure, Phase::NegotiationContract) => {
            "Coordination phase: agree on a plan with the agents you are connected to. Your \
             action is a message, written as a JSON object."
                .to_string()
        }
        (TaskFamily::Contract, Phase::Physical) => format!(
            "Physical phase: honour the contracts agreed earlier while moving on the grid. Each \
             step your action is exactly one of: {}.",
            ctx.physical_actions.join(", ")
        ),
        (TaskFamily::Negotiation, Phase::Physical) => format!(
            "Physical phase: gather what your agreed trades require while moving on the grid. \
             Each step your action is exactly one of: {}.",
            ctx.physical_actions.join(", ")
        ),
        (TaskFamily::SocialStructure, Phase::Physical) => format!(
            "You act within the '{}' social structure: cooperate with the agents your structure \
             connects you to. Each step your action is exactly one of: {}.",
            ctx.task.as_str().trim_start_matches("social_structure_"),
            ctx.physical_actions.join(", ")
        ),
    };

    let mut head = vec![
        Message::system(identity),
        Message::system(format!("{phase_rules} {REPLY_FORMAT}")),
    ];
    if let Some(description) = ctx.task_description {
        head.push(Message::system(format!("Task description: {description}")));
    }
    head
}

/// The user message for one step.
pub fn observation_prompt(
    ctx: &RoleContext<'_>,
    observation: &Value,
    previous_actions: &[Option<Action>],
    previous_positions: &[Option<Position>],
) -> String {
    let mut text = format!("Current observation for {}: {observation}\n", ctx.display_name);

    text.push_str("Previous step:\n");
    for (id, peer) in ctx.peers.iter().enumerate() {
        let action = previous_actions
            .get(id)
            .and_then(Option::as_ref)
            .map_or_else(|| "none".to_string(), Action::to_string);
        let position = previous_positions
            .get(id)
            .and_then(Option::as_ref)
            .map_or_else(|| "unknown".to_string(), Position::to_string);
        text.push_str(&format!("- {peer}: action {action}, position {position}\n"));
    }

    text.push_str("Decide your next action.");
    text
}

/// Feedback recorded after a decision was accepted.
pub fn accepted_feedback(action: &Action) -> String {
    format!("Your action {action} was accepted.")
}

/// Feedback recorded when no valid decision could be obtained.
pub fn fallback_feedback(reason: &str, fallback: &Action) -> String {
    format!("Your decision was rejected because {reason}. Using {fallback} instead.")
}

/// The user message for a reconsideration query.
pub fn reconsider_prompt(original: &str, reason: &str) -> String {
    format!("{original}\nFailure explanation: {reason}.")
}

/// The assistant turn closing a decision cycle.
pub fn plan_recap(plan: &str, action: &Action) -> String {
    format!("Plan: {plan}\nAction: {action}")
}
