//! Task catalogue, phases, role variants and the player-to-role mapping.

use std::collections::BTreeMap;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// The supported task scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    EasyContract,
    HardContract,
    EasyNegotiation,
    HardNegotiation,
    SocialStructureUnconnected,
    SocialStructureConnected,
    SocialStructureIndGroup,
    SocialStructureOvlpGroup,
    SocialStructureHierarchical,
    SocialStructureDynamic,
}

/// Scenario family, which decides the roster layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFamily {
    Contract,
    Negotiation,
    SocialStructure,
}

impl TaskName {
    pub const ALL: [TaskName; 10] = [
        TaskName::EasyContract,
        TaskName::HardContract,
        TaskName::EasyNegotiation,
        TaskName::HardNegotiation,
        TaskName::SocialStructureUnconnected,
        TaskName::SocialStructureConnected,
        TaskName::SocialStructureIndGroup,
        TaskName::SocialStructureOvlpGroup,
        TaskName::SocialStructureHierarchical,
        TaskName::SocialStructureDynamic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::EasyContract => "easy_contract",
            TaskName::HardContract => "hard_contract",
            TaskName::EasyNegotiation => "easy_negotiation",
            TaskName::HardNegotiation => "hard_negotiation",
            TaskName::SocialStructureUnconnected => "social_structure_unconnected",
            TaskName::SocialStructureConnected => "social_structure_connected",
            TaskName::SocialStructureIndGroup => "social_structure_ind_group",
            TaskName::SocialStructureOvlpGroup => "social_structure_ovlp_group",
            TaskName::SocialStructureHierarchical => "social_structure_hierarchical",
            TaskName::SocialStructureDynamic => "social_structure_dynamic",
        }
    }

    pub fn family(&self) -> TaskFamily {
        match self {
            TaskName::EasyContract | TaskName::HardContract => TaskFamily::Contract,
            TaskName::EasyNegotiation | TaskName::HardNegotiation => TaskFamily::Negotiation,
            _ => TaskFamily::SocialStructure,
        }
    }

    /// `easy`/`hard` for contract and negotiation tasks.
    pub fn difficulty(&self) -> Option<&'static str> {
        match self {
            TaskName::EasyContract | TaskName::EasyNegotiation => Some("easy"),
            TaskName::HardContract | TaskName::HardNegotiation => Some("hard"),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TaskName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::config(format!("Unsupported task name: {s}")))
    }
}

/// Episode phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    NegotiationContract,
    Physical,
}

impl Phase {
    /// Phase of `step`: physical once `step >= phase1_length`, provided a
    /// physical roster exists.
    pub fn at(step: u32, phase1_length: u32, has_physical_roster: bool) -> Self {
        if has_physical_roster && step >= phase1_length {
            Phase::Physical
        } else {
            Phase::NegotiationContract
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::NegotiationContract => f.write_str("NEGOTIATION/CONTRACT"),
            Phase::Physical => f.write_str("PHYSICAL"),
        }
    }
}

/// Which prompt family an agent speaks and in which phase it acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleVariant {
    pub family: TaskFamily,
    pub phase: Phase,
}

impl RoleVariant {
    pub fn new(family: TaskFamily, phase: Phase) -> Self {
        Self { family, phase }
    }

    pub fn is_physical(&self) -> bool {
        self.phase == Phase::Physical
    }
}

impl std::fmt::Display for RoleVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let family = match self.family {
            TaskFamily::Contract => "contract",
            TaskFamily::Negotiation => "negotiation",
            TaskFamily::SocialStructure => "social_structure",
        };
        let phase = match self.phase {
            Phase::NegotiationContract => "negotiation",
            Phase::Physical => "physical",
        };
        write!(f, "{family}/{phase}")
    }
}

/// Mapping from environment agent names to role names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMap {
    names: Vec<String>,
    player_to_name: BTreeMap<String, String>,
}

impl RoleMap {
    /// Build the mapping for 4 or 8 agents: half carpenters, half miners.
    pub fn for_agent_count(agent_num: usize) -> Result<Self> {
        if agent_num != 4 && agent_num != 8 {
            return Err(Error::config(format!(
                "Unsupported number of agents: {agent_num}. Supported: 4 or 8."
            )));
        }
        let half = agent_num / 2;
        let names: Vec<String> = (0..half)
            .map(|i| format!("carpenter_{i}"))
            .chain((0..half).map(|i| format!("miner_{i}")))
            .collect();
        let player_to_name = names
            .iter()
            .enumerate()
            .map(|(i, name)| (format!("player_{i}"), name.clone()))
            .collect();
        Ok(Self {
            names,
            player_to_name,
        })
    }

    /// Role names in agent-id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Role name for an environment agent name; falls back to the env name.
    pub fn display_name<'a>(&'a self, env_name: &'a str) -> &'a str {
        self.player_to_name
            .get(env_name)
            .map(String::as_str)
            .unwrap_or(env_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
