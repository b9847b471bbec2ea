//! Shared test helpers: scripted provider, environment and agent.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use gridparley_config::AppConfig;
use gridparley_core::environment::{
    Action, ActionMap, AgentInfo, Environment, Position, ResetOutcome, StepOutcome, ALL_AGENTS,
};
use gridparley_core::error::{EnvironmentError, Error, ProviderError, Result};
use gridparley_core::event::EventBus;
use gridparley_core::message::Message;
use gridparley_core::model::ModelSpec;
use gridparley_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use gridparley_core::task::RoleVariant;
use serde_json::json;

use crate::agent::{Agent, StructuredPrompt};
use crate::factory::AgentContext;

/// A mock provider that replays scripted results in order.
///
/// Panics if called more often than scripted, unless built with
/// [`SequentialMockProvider::repeating`] or
/// [`SequentialMockProvider::then_repeating`].
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<std::result::Result<ProviderResponse, ProviderError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<std::result::Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same text.
    pub fn repeating(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new(Vec::new())
        }
    }

    /// Once the scripted results run out, answer with `text`.
    pub fn then_repeating(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let call = requests.len();

        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(text) => Ok(text_response(text)),
            None => panic!("SequentialMockProvider: no more responses (call #{call})"),
        }
    }
}

/// A plain text completion.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// An episode context with default configuration and `provider`.
pub fn test_context(provider: Arc<dyn Provider>) -> AgentContext {
    AgentContext {
        config: Arc::new(AppConfig::default()),
        model: ModelSpec::resolve("gpt-4o-mini").unwrap(),
        provider,
        events: Arc::new(EventBus::default()),
    }
}

/// An in-memory grid world.
///
/// Agent `i` is `player_i` and reports `current_pos = [steps_taken, i]`.
/// Every step pays each agent 1.0.
pub struct ScriptedEnvironment {
    agent_count: usize,
    info: AgentInfo,
    resets: usize,
    agent_counts: Option<Vec<usize>>,
    steps_taken: u32,
    terminate_after: Option<u32>,
    unrewarded: Option<String>,
    drop_observation: Option<(u32, String)>,
    actions: Vec<ActionMap>,
    closed: bool,
}

impl ScriptedEnvironment {
    pub fn new(agent_count: usize) -> Self {
        Self {
            agent_count,
            info: AgentInfo {
                max_length: Some(20),
                ..AgentInfo::default()
            },
            resets: 0,
            agent_counts: None,
            steps_taken: 0,
            terminate_after: None,
            unrewarded: None,
            drop_observation: None,
            actions: Vec::new(),
            closed: false,
        }
    }

    /// Info block reported for every agent.
    pub fn with_info(mut self, info: AgentInfo) -> Self {
        self.info = info;
        self
    }

    /// Report a different agent count on each successive reset.
    pub fn with_agent_counts(mut self, counts: Vec<usize>) -> Self {
        self.agent_counts = Some(counts);
        self
    }

    /// Set `terminated["__all__"]` once `steps` steps have run.
    pub fn terminate_after(mut self, steps: u32) -> Self {
        self.terminate_after = Some(steps);
        self
    }

    /// Leave `name` out of the reward map.
    pub fn without_reward_for(mut self, name: &str) -> Self {
        self.unrewarded = Some(name.to_string());
        self
    }

    /// Leave `name` out of the observations once `steps` steps have run.
    pub fn drop_observation_after(mut self, steps: u32, name: &str) -> Self {
        self.drop_observation = Some((steps, name.to_string()));
        self
    }

    pub fn recorded_actions(&self) -> &[ActionMap] {
        &self.actions
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn names(&self) -> Vec<String> {
        (0..self.agent_count).map(|i| format!("player_{i}")).collect()
    }

    fn observations(&self) -> BTreeMap<String, serde_json::Value> {
        self.names()
            .into_iter()
            .enumerate()
            .filter(|(_, name)| match &self.drop_observation {
                Some((after, dropped)) => self.steps_taken < *after || name != dropped,
                None => true,
            })
            .map(|(i, name)| (name, json!({"current_pos": [self.steps_taken, i]})))
            .collect()
    }
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    async fn reset(&mut self) -> std::result::Result<ResetOutcome, EnvironmentError> {
        if let Some(counts) = &self.agent_counts {
            self.agent_count = counts[self.resets % counts.len()];
        }
        self.resets += 1;
        self.steps_taken = 0;
        Ok(ResetOutcome {
            observations: self.observations(),
            infos: self
                .names()
                .into_iter()
                .map(|name| (name, self.info.clone()))
                .collect(),
            task: Some(json!({"goal": "build a house"})),
        })
    }

    async fn step(
        &mut self,
        actions: &ActionMap,
    ) -> std::result::Result<StepOutcome, EnvironmentError> {
        if self.closed {
            return Err(EnvironmentError::Closed);
        }
        self.actions.push(actions.clone());
        self.steps_taken += 1;

        let names = self.names();
        let rewards = names
            .iter()
            .filter(|name| self.unrewarded.as_ref() != Some(*name))
            .map(|name| (name.clone(), 1.0))
            .collect();
        let done = self.terminate_after == Some(self.steps_taken);
        let mut terminated = BTreeMap::new();
        terminated.insert(ALL_AGENTS.to_string(), done);

        Ok(StepOutcome {
            observations: self.observations(),
            rewards,
            terminated,
            truncated: BTreeMap::new(),
            infos: BTreeMap::new(),
        })
    }

    async fn close(&mut self) -> std::result::Result<(), EnvironmentError> {
        self.closed = true;
        Ok(())
    }
}

/// What a [`ScriptedAgent`] saw when it was asked to decide.
#[derive(Debug, Clone)]
pub struct AgentCall {
    pub agent: String,
    pub role: RoleVariant,
    pub previous_actions: Vec<Option<Action>>,
    pub previous_positions: Vec<Option<Position>>,
}

/// An agent that always chooses the same action and logs its inputs.
pub struct ScriptedAgent {
    name: String,
    id: usize,
    role: RoleVariant,
    action: Action,
    pending: Option<Action>,
    log: Arc<Mutex<Vec<AgentCall>>>,
}

impl ScriptedAgent {
    pub fn new(
        name: &str,
        id: usize,
        role: RoleVariant,
        action: Action,
        log: Arc<Mutex<Vec<AgentCall>>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            id,
            role,
            action,
            pending: None,
            log,
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> usize {
        self.id
    }

    fn role(&self) -> RoleVariant {
        self.role
    }

    fn current_plan(&self) -> &str {
        "scripted"
    }

    fn update_observation(
        &mut self,
        raw: &serde_json::Value,
        previous_actions: Vec<Option<Action>>,
        previous_positions: Vec<Option<Position>>,
    ) -> StructuredPrompt {
        StructuredPrompt {
            observation: raw.clone(),
            current_position: Position::from_observation(raw),
            previous_actions,
            previous_positions,
            text: String::new(),
        }
    }

    async fn update_policy(&mut self, prompt: &StructuredPrompt) -> Result<()> {
        self.log.lock().unwrap().push(AgentCall {
            agent: self.name.clone(),
            role: self.role,
            previous_actions: prompt.previous_actions.clone(),
            previous_positions: prompt.previous_positions.clone(),
        });
        self.pending = Some(self.action.clone());
        Ok(())
    }

    fn take_action(&mut self) -> Result<Action> {
        self.pending
            .take()
            .ok_or_else(|| Error::State(format!("{} has no pending action", self.name)))
    }

    fn reset(&mut self) {
        self.pending = None;
    }
}
