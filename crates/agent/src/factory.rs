//! Roster construction.
//!
//! Contract and negotiation tasks get a negotiation-phase roster plus its
//! physical counterpart; social-structure tasks act physically from step 0.

use std::collections::BTreeMap;
use std::sync::Arc;
use gridparley_config::AppConfig;
use gridparley_core::environment::AgentInfo;
use gridparley_core::error::{Error, Result};
use gridparley_core::event::EventBus;
use gridparley_core::model::ModelSpec;
use gridparley_core::provider::Provider;
use gridparley_core::task::{Phase, RoleMap, RoleVariant, TaskFamily, TaskName};
use serde_json::Value;
use tracing::info;

use crate::agent::Agent;
use crate::history::DialogueHistory;
use crate::llm_agent::{DecisionPolicy, LlmAgentBuilder};
use crate::query::QueryClient;
use crate::retry::{RetryPolicy, ServiceRetryPolicy};

/// Everything an episode needs that outlives it: configuration, the
/// resolved model, the completion provider and the event bus.
#[derive(Clone)]
pub struct AgentContext {
    pub config: Arc<AppConfig>,
    pub model: ModelSpec,
    pub provider: Arc<dyn Provider>,
    pub events: Arc<EventBus>,
}

/// The agents of one episode.
pub struct Roster {
    /// Negotiation/contract-phase agents (empty for social-structure tasks)
    pub agents: Vec<Box<dyn Agent>>,
    /// Physical-phase agents (empty if the task never acts physically)
    pub physical_agents: Vec<Box<dyn Agent>>,
    /// Step at which the physical roster takes over
    pub phase1_length: u32,
    /// Environment agent names, indexed by agent id
    pub agent_names: Vec<String>,
}

impl Roster {
    pub fn agent_count(&self) -> usize {
        self.agent_names.len()
    }
}

pub struct AgentFactory {
    ctx: AgentContext,
}

impl AgentFactory {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    /// Build both rosters for `task`.
    ///
    /// `agent_names` is the environment's agent order; `infos` must carry the
    /// fields the task family needs for its phase length.
    pub fn build_roster(
        &self,
        task: TaskName,
        agent_names: &[String],
        infos: &BTreeMap<String, AgentInfo>,
        role_map: &RoleMap,
        task_description: Option<&Value>,
    ) -> Result<Roster> {
        let first = agent_names
            .first()
            .and_then(|name| infos.get(name))
            .ok_or_else(|| Error::config("Environment reported no agent info"))?;

        let (phase1_length, agents) = match task.family() {
            TaskFamily::Contract => {
                let group_num = first
                    .group_num
                    .ok_or_else(|| Error::config("Agent info is missing group_num"))?;
                let phase1_length = 5 * group_num;
                info!(phase1_length, "Initializing contract agents");
                let agents = self.build_variant(
                    task,
                    RoleVariant::new(TaskFamily::Contract, Phase::NegotiationContract),
                    agent_names,
                    role_map,
                    task_description,
                );
                (phase1_length, agents)
            }
            TaskFamily::Negotiation => {
                let phase1_length = first
                    .negotiation_steps
                    .ok_or_else(|| Error::config("Agent info is missing negotiation_steps"))?;
                info!(phase1_length, "Initializing negotiation agents");
                let agents = self.build_variant(
                    task,
                    RoleVariant::new(TaskFamily::Negotiation, Phase::NegotiationContract),
                    agent_names,
                    role_map,
                    task_description,
                );
                (phase1_length, agents)
            }
            TaskFamily::SocialStructure => {
                info!("Initializing social structure agents, no negotiation phase");
                (0, Vec::new())
            }
        };

        let physical_agents = self.build_variant(
            task,
            RoleVariant::new(task.family(), Phase::Physical),
            agent_names,
            role_map,
            task_description,
        );

        Ok(Roster {
            agents,
            physical_agents,
            phase1_length,
            agent_names: agent_names.to_vec(),
        })
    }

    fn build_variant(
        &self,
        task: TaskName,
        role: RoleVariant,
        agent_names: &[String],
        role_map: &RoleMap,
        task_description: Option<&Value>,
    ) -> Vec<Box<dyn Agent>> {
        let config = &self.ctx.config;
        agent_names
            .iter()
            .enumerate()
            .map(|(id, name)| {
                let client = QueryClient::new(self.ctx.provider.clone(), self.ctx.model.clone())
                    .with_retry(RetryPolicy::from(&config.retry))
                    .with_service_retry(ServiceRetryPolicy::from(&config.service_retry))
                    .with_max_tokens(config.query.max_tokens)
                    .with_stop(config.query.stop.clone());

                let mut agent = LlmAgentBuilder {
                    name: name.clone(),
                    display_name: role_map.display_name(name).to_string(),
                    id,
                    role,
                    task,
                    peers: role_map.names().to_vec(),
                    task_description: task_description.cloned(),
                    history: DialogueHistory::recent_k(config.query.recent_k),
                    client,
                    policy: DecisionPolicy {
                        temperature: config.query.temperature,
                        max_reconsiderations: config.decision.max_reconsiderations,
                        default_action: config.decision.default_action.clone(),
                        physical_actions: config.decision.physical_actions.clone(),
                    },
                }
                .build();
                agent.reset();
                Box::new(agent) as Box<dyn Agent>
            })
            .collect()
    }
}
