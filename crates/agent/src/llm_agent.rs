//! The completion-backed agent.
//!
//! A single type serves every [`RoleVariant`]: the variant only decides which
//! prompts are built and which actions are acceptable.

use async_trait::async_trait;
use gridparley_core::environment::{Action, Position};
use gridparley_core::error::{Error, Result};
use gridparley_core::message::Message;
use gridparley_core::task::{RoleVariant, TaskName};
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::{Agent, StructuredPrompt};
use crate::decision::{self, Rejection};
use crate::history::DialogueHistory;
use crate::query::QueryClient;
use crate::roles::{self, RoleContext};
use crate::token::estimate_message_tokens;

type Answer = (String, std::result::Result<Action, Rejection>, String);

/// How an agent turns payloads into actions.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub temperature: f32,
    pub max_reconsiderations: u32,
    pub default_action: String,
    pub physical_actions: Vec<String>,
}

pub struct LlmAgent {
    name: String,
    display_name: String,
    id: usize,
    role: RoleVariant,
    task: TaskName,
    peers: Vec<String>,
    task_description: Option<Value>,
    instruction_head: Vec<Message>,
    history: DialogueHistory,
    client: QueryClient,
    policy: DecisionPolicy,
    current_plan: String,
    pending_action: Option<Action>,
}

pub struct LlmAgentBuilder {
    pub name: String,
    pub display_name: String,
    pub id: usize,
    pub role: RoleVariant,
    pub task: TaskName,
    pub peers: Vec<String>,
    pub task_description: Option<Value>,
    pub history: DialogueHistory,
    pub client: QueryClient,
    pub policy: DecisionPolicy,
}

impl LlmAgentBuilder {
    pub fn build(self) -> LlmAgent {
        let mut agent = LlmAgent {
            name: self.name,
            display_name: self.display_name,
            id: self.id,
            role: self.role,
            task: self.task,
            peers: self.peers,
            task_description: self.task_description,
            instruction_head: Vec::new(),
            history: self.history,
            client: self.client,
            policy: self.policy,
            current_plan: String::new(),
            pending_action: None,
        };
        agent.instruction_head = roles::instruction_head(agent.role, &agent.role_context());
        agent
    }
}

impl LlmAgent {
    fn role_context(&self) -> RoleContext<'_> {
        RoleContext {
            task: self.task,
            display_name: &self.display_name,
            peers: &self.peers,
            task_description: self.task_description.as_ref(),
            physical_actions: &self.policy.physical_actions,
        }
    }

    pub fn instruction_head(&self) -> &[Message] {
        &self.instruction_head
    }

    pub fn history(&self) -> &DialogueHistory {
        &self.history
    }

    /// Query once and judge the reply: (raw payload, verdict, plan).
    async fn ask(&self, user_message: &str, use_trace: bool) -> Result<Answer> {
        let payload = self
            .client
            .query(
                &self.instruction_head,
                &self.history,
                user_message,
                self.policy.temperature,
                use_trace,
            )
            .await?;
        let parsed = decision::parse(&payload);
        let verdict = decision::validate(&payload, &parsed, self.role, &self.policy.physical_actions);
        Ok((payload, verdict, parsed.plan))
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn id(&self) -> usize {
        self.id
    }

    fn role(&self) -> RoleVariant {
        self.role
    }

    fn current_plan(&self) -> &str {
        &self.current_plan
    }

    fn update_observation(
        &mut self,
        raw: &Value,
        previous_actions: Vec<Option<Action>>,
        previous_positions: Vec<Option<Position>>,
    ) -> StructuredPrompt {
        let text = roles::observation_prompt(
            &self.role_context(),
            raw,
            &previous_actions,
            &previous_positions,
        );
        StructuredPrompt {
            observation: raw.clone(),
            current_position: Position::from_observation(raw),
            previous_actions,
            previous_positions,
            text,
        }
    }

    async fn update_policy(&mut self, prompt: &StructuredPrompt) -> Result<()> {
        let limit = self.client.model().context_limit;
        self.history.evict_if_over_budget(
            estimate_message_tokens,
            &self.instruction_head,
            &Message::user(prompt.text.as_str()),
            limit,
        );

        let (mut payload, mut verdict, mut plan) = self.ask(&prompt.text, true).await?;

        let mut reconsiderations = 0;
        while let Err(reason) = &verdict {
            if reconsiderations >= self.policy.max_reconsiderations {
                break;
            }
            reconsiderations += 1;
            debug!(
                agent = %self.display_name,
                attempt = reconsiderations,
                reason = %reason,
                "Reconsidering without dialogue history"
            );
            let retry_prompt = roles::reconsider_prompt(&prompt.text, &reason.to_string());
            (payload, verdict, plan) = self.ask(&retry_prompt, false).await?;
        }

        let (action, feedback) = match verdict {
            Ok(action) => {
                let feedback = roles::accepted_feedback(&action);
                (action, feedback)
            }
            Err(reason) => {
                let fallback = Action::named(self.policy.default_action.clone());
                info!(
                    agent = %self.display_name,
                    reason = %reason,
                    fallback = %fallback,
                    "No valid decision, using default action"
                );
                let feedback = roles::fallback_feedback(&reason.to_string(), &fallback);
                (fallback, feedback)
            }
        };

        self.history.append_turn(Message::user(prompt.text.as_str()));
        self.history.append_turn(Message::assistant(payload));
        self.history.append_turn(Message::user(feedback));
        self.history
            .append_turn(Message::assistant(roles::plan_recap(&plan, &action)));

        self.current_plan = plan;
        self.pending_action = Some(action);
        Ok(())
    }

    fn take_action(&mut self) -> Result<Action> {
        self.pending_action.take().ok_or_else(|| {
            Error::State(format!(
                "{} has no pending action; update_policy must run before take_action",
                self.display_name
            ))
        })
    }

    fn reset(&mut self) {
        self.history.clear();
        self.current_plan.clear();
        self.pending_action = None;
    }
}
