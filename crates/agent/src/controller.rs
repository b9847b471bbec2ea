//! Phase-switching episode controller.
//!
//! Drives one episode: each step, every active agent observes, decides and
//! acts; the joint action goes to the environment; rewards accumulate. At
//! `phase1_length` the negotiation roster is replaced by the physical roster,
//! exactly once. The episode ends at `max_length` (exclusive) or as soon as
//! any terminated/truncated flag is set.

use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::Utc;
use futures::future::join_all;
use gridparley_core::environment::{Action, ActionMap, Environment, Position};
use gridparley_core::error::{EnvironmentError, Error, Result};
use gridparley_core::event::{EpisodeEvent, EventBus};
use gridparley_core::task::Phase;
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::{Agent, StructuredPrompt};
use crate::factory::Roster;

/// How an episode ended.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    /// Cumulative reward per agent id
    pub final_rewards: Vec<f64>,
    pub steps_executed: u32,
    /// A terminated/truncated flag stopped the episode before `max_length`
    pub ended_early: bool,
}

/// Per-episode bookkeeping owned by the controller.
struct EpisodeState {
    previous_action: Vec<Option<Action>>,
    previous_position: Vec<Option<Position>>,
    cumulative_reward: Vec<f64>,
}

impl EpisodeState {
    fn new(agent_count: usize) -> Self {
        Self {
            previous_action: vec![None; agent_count],
            previous_position: vec![None; agent_count],
            cumulative_reward: vec![0.0; agent_count],
        }
    }

    fn record(&mut self, id: usize, action: &Action, position: Option<Position>) -> Result<()> {
        let slot = self
            .previous_action
            .get_mut(id)
            .ok_or_else(|| Error::State(format!("agent id {id} outside the roster")))?;
        *slot = Some(action.clone());
        self.previous_position[id] = position;
        Ok(())
    }
}

pub struct PhaseController {
    events: Arc<EventBus>,
    episode: usize,
    parallel: bool,
}

impl PhaseController {
    pub fn new(events: Arc<EventBus>, episode: usize) -> Self {
        Self {
            events,
            episode,
            parallel: false,
        }
    }

    /// Query all agents of a step concurrently against the step-start snapshot.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub async fn run_episode(
        &self,
        env: &mut dyn Environment,
        roster: Roster,
        initial_observations: BTreeMap<String, Value>,
        max_length: u32,
    ) -> Result<EpisodeSummary> {
        if max_length == 0 {
            return Err(Error::config("max_length must be greater than 0"));
        }

        let Roster {
            agents,
            physical_agents,
            phase1_length,
            agent_names,
        } = roster;

        let has_physical = !physical_agents.is_empty();
        let mut active = agents;
        let mut physical = Some(physical_agents);
        let mut state = EpisodeState::new(agent_names.len());
        let mut observations = initial_observations;
        let mut steps_executed = 0;
        let mut ended_early = false;

        for step in 0..max_length {
            if step == phase1_length && has_physical {
                if let Some(p) = physical.take() {
                    info!(episode = self.episode, step, "Switching to physical agents");
                    active = p;
                    self.events.publish(EpisodeEvent::PhaseSwitched {
                        episode: self.episode,
                        step,
                        timestamp: Utc::now(),
                    });
                }
            }

            if active.is_empty() {
                return Err(Error::config(format!("No active agents at step {step}")));
            }

            let phase = Phase::at(step, phase1_length, has_physical);
            info!(episode = self.episode, step, max_length, %phase, "Step started");

            let actions = if self.parallel {
                self.decide_parallel(&mut active, &observations, &mut state, step, phase)
                    .await?
            } else {
                self.decide_sequential(&mut active, &observations, &mut state, step, phase)
                    .await?
            };

            let outcome = env.step(&actions).await?;

            let rewards: Vec<f64> = agent_names
                .iter()
                .map(|name| outcome.rewards.get(name).copied().unwrap_or(0.0))
                .collect();
            for (total, reward) in state.cumulative_reward.iter_mut().zip(&rewards) {
                *total += reward;
            }
            steps_executed = step + 1;

            info!(
                episode = self.episode,
                step,
                %phase,
                ?rewards,
                cumulative = ?state.cumulative_reward,
                "Step completed"
            );
            self.events.publish(EpisodeEvent::StepCompleted {
                episode: self.episode,
                step,
                phase,
                rewards,
                cumulative_rewards: state.cumulative_reward.clone(),
                timestamp: Utc::now(),
            });

            let done = outcome.is_done();
            observations = outcome.observations;

            if done {
                info!(episode = self.episode, step, "Episode ended early on termination or truncation");
                ended_early = steps_executed < max_length;
                break;
            }
        }

        Ok(EpisodeSummary {
            final_rewards: state.cumulative_reward,
            steps_executed,
            ended_early,
        })
    }

    /// Agents decide one after another; later agents see earlier agents'
    /// actions from this same step.
    async fn decide_sequential(
        &self,
        agents: &mut [Box<dyn Agent>],
        observations: &BTreeMap<String, Value>,
        state: &mut EpisodeState,
        step: u32,
        phase: Phase,
    ) -> Result<ActionMap> {
        let mut actions = ActionMap::new();
        for agent in agents.iter_mut() {
            let raw = observation_for(observations, agent.name())?;
            let prompt = agent.update_observation(
                raw,
                state.previous_action.clone(),
                state.previous_position.clone(),
            );
            agent.update_policy(&prompt).await?;
            let action = agent.take_action()?;
            self.finish_decision(agent.as_ref(), &prompt, action, state, &mut actions, step, phase)?;
        }
        Ok(actions)
    }

    /// Every agent sees the snapshot taken at the start of the step; policy
    /// updates run concurrently, bookkeeping is written in roster order.
    async fn decide_parallel(
        &self,
        agents: &mut [Box<dyn Agent>],
        observations: &BTreeMap<String, Value>,
        state: &mut EpisodeState,
        step: u32,
        phase: Phase,
    ) -> Result<ActionMap> {
        let mut prompts = Vec::with_capacity(agents.len());
        for agent in agents.iter_mut() {
            let raw = observation_for(observations, agent.name())?;
            prompts.push(agent.update_observation(
                raw,
                state.previous_action.clone(),
                state.previous_position.clone(),
            ));
        }

        let results = join_all(
            agents
                .iter_mut()
                .zip(&prompts)
                .map(|(agent, prompt)| agent.update_policy(prompt)),
        )
        .await;
        results.into_iter().collect::<Result<Vec<()>>>()?;

        let mut actions = ActionMap::new();
        for (agent, prompt) in agents.iter_mut().zip(&prompts) {
            let action = agent.take_action()?;
            self.finish_decision(agent.as_ref(), prompt, action, state, &mut actions, step, phase)?;
        }
        Ok(actions)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_decision(
        &self,
        agent: &dyn Agent,
        prompt: &StructuredPrompt,
        action: Action,
        state: &mut EpisodeState,
        actions: &mut ActionMap,
        step: u32,
        phase: Phase,
    ) -> Result<()> {
        state.record(agent.id(), &action, prompt.current_position)?;

        info!(
            episode = self.episode,
            step,
            %phase,
            agent = agent.display_name(),
            plan = agent.current_plan(),
            action = %action,
            "Agent decided"
        );
        self.events.publish(EpisodeEvent::AgentDecided {
            episode: self.episode,
            step,
            phase,
            agent: agent.display_name().to_string(),
            plan: agent.current_plan().to_string(),
            action: action.0.clone(),
            timestamp: Utc::now(),
        });

        debug!(agent = agent.name(), "Action recorded");
        actions.insert(agent.name().to_string(), action);
        Ok(())
    }
}

fn observation_for<'a>(observations: &'a BTreeMap<String, Value>, name: &str) -> Result<&'a Value> {
    observations
        .get(name)
        .ok_or_else(|| EnvironmentError::MissingObservation(name.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{AgentCall, ScriptedAgent, ScriptedEnvironment};
    use gridparley_core::task::{RoleVariant, TaskFamily};
    use std::sync::Mutex;

    fn roster(
        n: usize,
        phase1_length: u32,
        with_negotiation: bool,
        with_physical: bool,
        log: &Arc<Mutex<Vec<AgentCall>>>,
    ) -> Roster {
        let names: Vec<String> = (0..n).map(|i| format!("player_{i}")).collect();
        let build = |phase: Phase, action: &str| -> Vec<Box<dyn Agent>> {
            names
                .iter()
                .enumerate()
                .map(|(id, name)| {
                    Box::new(ScriptedAgent::new(
                        name,
                        id,
                        RoleVariant::new(TaskFamily::Contract, phase),
                        Action::named(action),
                        log.clone(),
                    )) as Box<dyn Agent>
                })
                .collect()
        };
        Roster {
            agents: if with_negotiation {
                build(Phase::NegotiationContract, "propose")
            } else {
                Vec::new()
            },
            physical_agents: if with_physical {
                build(Phase::Physical, "move_up")
            } else {
                Vec::new()
            },
            phase1_length,
            agent_names: names,
        }
    }

    async fn run(
        env: &mut ScriptedEnvironment,
        roster: Roster,
        max_length: u32,
        parallel: bool,
    ) -> (Result<EpisodeSummary>, Vec<EpisodeEvent>) {
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let controller = PhaseController::new(events, 0).with_parallel(parallel);
        let initial = env.reset().await.unwrap().observations;
        let result = controller.run_episode(env, roster, initial, max_length).await;
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push((*event).clone());
        }
        (result, seen)
    }

    #[tokio::test]
    async fn swaps_roster_exactly_once_at_phase_boundary() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4);
        let (result, events) = run(&mut env, roster(4, 10, true, true, &log), 15, false).await;

        let summary = result.unwrap();
        assert_eq!(summary.steps_executed, 15);
        assert!(!summary.ended_early);

        let calls = log.lock().unwrap();
        assert_eq!(calls.len(), 15 * 4);
        assert!(calls[..40].iter().all(|c| !c.role.is_physical()));
        assert!(calls[40..].iter().all(|c| c.role.is_physical()));

        let swaps: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                EpisodeEvent::PhaseSwitched { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(swaps, vec![10]);

        let actions = env.recorded_actions();
        assert_eq!(actions[9]["player_0"], Action::named("propose"));
        assert_eq!(actions[10]["player_0"], Action::named("move_up"));
    }

    #[tokio::test]
    async fn social_structure_starts_physical() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4);
        let (result, events) = run(&mut env, roster(4, 0, false, true, &log), 3, false).await;

        assert_eq!(result.unwrap().steps_executed, 3);
        assert!(log.lock().unwrap().iter().all(|c| c.role.is_physical()));
        let phases: Vec<Phase> = events
            .iter()
            .filter_map(|e| match e {
                EpisodeEvent::StepCompleted { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec![Phase::Physical; 3]);
    }

    #[tokio::test]
    async fn no_physical_roster_means_no_swap() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4);
        let (result, events) = run(&mut env, roster(4, 2, true, false, &log), 5, false).await;

        assert_eq!(result.unwrap().steps_executed, 5);
        assert!(log.lock().unwrap().iter().all(|c| !c.role.is_physical()));
        assert!(!events.iter().any(|e| matches!(e, EpisodeEvent::PhaseSwitched { .. })));
    }

    #[tokio::test]
    async fn rewards_accumulate_and_missing_reward_counts_zero() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4).without_reward_for("player_3");
        let (result, _) = run(&mut env, roster(4, 0, false, true, &log), 5, false).await;

        let summary = result.unwrap();
        assert_eq!(summary.final_rewards, vec![5.0, 5.0, 5.0, 0.0]);
    }

    #[tokio::test]
    async fn termination_stops_early() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4).terminate_after(3);
        let (result, _) = run(&mut env, roster(4, 0, false, true, &log), 10, false).await;

        let summary = result.unwrap();
        assert_eq!(summary.steps_executed, 3);
        assert!(summary.ended_early);
        assert_eq!(env.recorded_actions().len(), 3);
    }

    #[tokio::test]
    async fn zero_max_length_is_rejected_before_any_step() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4);
        let (result, _) = run(&mut env, roster(4, 0, false, true, &log), 0, false).await;

        assert!(matches!(result, Err(Error::Config { .. })));
        assert!(env.recorded_actions().is_empty());
    }

    #[tokio::test]
    async fn sequential_agents_see_earlier_actions_of_the_same_step() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4);
        let (result, _) = run(&mut env, roster(4, 0, false, true, &log), 1, false).await;
        result.unwrap();

        let calls = log.lock().unwrap();
        assert_eq!(calls[0].agent, "player_0");
        assert!(calls[0].previous_actions.iter().all(Option::is_none));
        assert_eq!(calls[2].previous_actions[0], Some(Action::named("move_up")));
        assert_eq!(calls[2].previous_actions[1], Some(Action::named("move_up")));
        assert!(calls[2].previous_actions[2].is_none());
    }

    #[tokio::test]
    async fn parallel_agents_share_the_step_start_snapshot() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4);
        let (result, _) = run(&mut env, roster(4, 0, false, true, &log), 2, true).await;
        result.unwrap();

        let calls = log.lock().unwrap();
        assert!(calls[..4].iter().all(|c| c.previous_actions.iter().all(Option::is_none)));
        assert!(calls[4..].iter().all(|c| c.previous_actions.iter().all(Option::is_some)));
        assert_eq!(calls[4].previous_positions[1], Some(Position::new(0, 1)));
    }

    #[tokio::test]
    async fn missing_observation_is_environment_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut env = ScriptedEnvironment::new(4).drop_observation_after(1, "player_2");
        let (result, _) = run(&mut env, roster(4, 0, false, true, &log), 5, false).await;

        assert!(matches!(
            result,
            Err(Error::Environment(EnvironmentError::MissingObservation(ref name))) if name == "player_2"
        ));
    }
}
