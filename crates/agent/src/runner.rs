//! Episode runner — the outer loop over episodes.
//!
//! For each episode: reset the environment, derive the agent order and role
//! map, build the roster and hand it to a [`PhaseController`]. A failed
//! episode is logged, recorded and skipped; the run continues.

use chrono::Utc;
use gridparley_core::environment::Environment;
use gridparley_core::error::{Error, Result};
use gridparley_core::event::EpisodeEvent;
use gridparley_core::task::{RoleMap, TaskName};
use tracing::{error, info, warn};

use crate::controller::{EpisodeSummary, PhaseController};
use crate::factory::{AgentContext, AgentFactory};
use crate::retry::RetryPolicy;

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub completed: Vec<(usize, EpisodeSummary)>,
    pub failed: Vec<(usize, String)>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct EpisodeRunner<E: Environment> {
    env: E,
    task: TaskName,
    ctx: AgentContext,
}

impl<E: Environment> EpisodeRunner<E> {
    pub fn new(env: E, task: TaskName, ctx: AgentContext) -> Self {
        Self { env, task, ctx }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Run `max_episodes` episodes, then close the environment.
    pub async fn run(&mut self, max_episodes: usize) -> RunReport {
        info!(
            task = %self.task,
            model = %self.ctx.model.id,
            max_episodes,
            max_backoff_secs = RetryPolicy::from(&self.ctx.config.retry).max_delay().as_secs_f64(),
            "Starting run"
        );

        let mut report = RunReport::default();
        for episode in 0..max_episodes {
            match self.run_episode(episode).await {
                Ok(summary) => {
                    info!(
                        episode,
                        steps = summary.steps_executed,
                        final_rewards = ?summary.final_rewards,
                        "Episode completed"
                    );
                    self.ctx.events.publish(EpisodeEvent::EpisodeCompleted {
                        episode,
                        steps: summary.steps_executed,
                        final_rewards: summary.final_rewards.clone(),
                        timestamp: Utc::now(),
                    });
                    report.completed.push((episode, summary));
                }
                Err(e) => {
                    error!(episode, error = %e, "Episode failed");
                    self.ctx.events.publish(EpisodeEvent::EpisodeFailed {
                        episode,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    report.failed.push((episode, e.to_string()));
                }
            }
        }

        if let Err(e) = self.env.close().await {
            warn!(error = %e, "Failed to close environment");
        }
        report
    }

    async fn run_episode(&mut self, episode: usize) -> Result<EpisodeSummary> {
        let reset = self.env.reset().await?;

        // BTreeMap keys: environment agent names in sorted order.
        let agent_names: Vec<String> = reset.infos.keys().cloned().collect();
        let role_map = RoleMap::for_agent_count(agent_names.len())?;

        let max_length = agent_names
            .first()
            .and_then(|name| reset.infos.get(name))
            .and_then(|info| info.max_length)
            .ok_or_else(|| Error::config("Agent info is missing max_length"))?;

        let factory = AgentFactory::new(self.ctx.clone());
        let roster = factory.build_roster(
            self.task,
            &agent_names,
            &reset.infos,
            &role_map,
            reset.task.as_ref(),
        )?;

        info!(
            episode,
            task = %self.task,
            difficulty = self.task.difficulty().unwrap_or("n/a"),
            agents = agent_names.len(),
            max_length,
            phase1_length = roster.phase1_length,
            "Starting episode"
        );
        self.ctx.events.publish(EpisodeEvent::EpisodeStarted {
            episode,
            task: self.task,
            model: self.ctx.model.id.clone(),
            agents: role_map.names().to_vec(),
            max_length,
            phase1_length: roster.phase1_length,
            timestamp: Utc::now(),
        });

        let controller = PhaseController::new(self.ctx.events.clone(), episode)
            .with_parallel(self.ctx.config.decision.parallel);
        controller
            .run_episode(&mut self.env, roster, reset.observations, max_length)
            .await
    }
}
