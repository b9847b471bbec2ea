//! Environment trait — the grid-world simulator seen from the orchestrator.
//!
//! The simulator itself (transitions, rewards, rendering) is external. The
//! orchestrator only needs `reset`, `step` and `close`, with every map keyed
//! by the environment's agent name (`player_0`, `player_1`, ...).

use std::collections::BTreeMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::EnvironmentError;

/// Key present in `terminated`/`truncated` maps that covers every agent.
pub const ALL_AGENTS: &str = "__all__";

/// A single decided action.
///
/// Physical-phase actions are plain strings (`"move_up"`); negotiation-phase
/// actions may be structured proposals, so the payload stays JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(pub serde_json::Value);

impl Action {
    /// A plain string action.
    pub fn named(name: impl Into<String>) -> Self {
        Self(serde_json::Value::String(name.into()))
    }

    /// The action name, when this is a plain string action.
    pub fn as_name(&self) -> Option<&str> {
        self.0.as_str()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Actions for one step, keyed by environment agent name.
pub type ActionMap = BTreeMap<String, Action>;

/// A grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Read `current_pos` out of a raw per-agent observation.
    pub fn from_observation(observation: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(observation.get("current_pos")?.clone()).ok()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// Simulators report positions either as `[x, y]` or `{"x": .., "y": ..}`.
impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Pair(i64, i64),
            Fields { x: i64, y: i64 },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Pair(x, y) | Repr::Fields { x, y } => Position { x, y },
        })
    }
}

/// Per-agent info block returned by `reset`/`step`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Number of contract groups (contract tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_num: Option<u32>,

    /// Length of the negotiation phase (negotiation tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiation_steps: Option<u32>,

    /// Episode step bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    /// Everything else the simulator reports (inventory, role, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// What `reset` hands back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub observations: BTreeMap<String, serde_json::Value>,
    pub infos: BTreeMap<String, AgentInfo>,
    /// Task description shared by all agents, when the simulator provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<serde_json::Value>,
}

/// What `step` hands back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observations: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub rewards: BTreeMap<String, f64>,
    #[serde(default)]
    pub terminated: BTreeMap<String, bool>,
    #[serde(default)]
    pub truncated: BTreeMap<String, bool>,
    #[serde(default)]
    pub infos: BTreeMap<String, AgentInfo>,
}

impl StepOutcome {
    /// True when any terminated or truncated flag is set.
    pub fn is_done(&self) -> bool {
        self.terminated.values().any(|&t| t) || self.truncated.values().any(|&t| t)
    }
}

/// The simulator as seen by the orchestrator.
#[async_trait]
pub trait Environment: Send {
    /// Start a new episode.
    async fn reset(&mut self) -> std::result::Result<ResetOutcome, EnvironmentError>;

    /// Apply one action per active agent.
    async fn step(&mut self, actions: &ActionMap)
        -> std::result::Result<StepOutcome, EnvironmentError>;

    /// Release simulator resources.
    async fn close(&mut self) -> std::result::Result<(), EnvironmentError> {
        Ok(())
    }
}
