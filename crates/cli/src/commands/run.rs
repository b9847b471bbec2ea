//! `gridparley run` — Run episodes against the simulator.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use gridparley_agent::{AgentContext, EpisodeRunner, RunReport};
use gridparley_config::AppConfig;
use gridparley_core::EventBus;
use gridparley_env::HttpEnvironment;
use gridparley_providers::build_for_model;
use gridparley_providers::router::provider_key;
use tracing::{info, warn};

use crate::recorder::JsonlRecorder;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Task scenario (e.g. easy_contract, social_structure_dynamic)
    #[arg(long)]
    pub task: Option<String>,

    /// Model name from `gridparley models`
    #[arg(long)]
    pub model: Option<String>,

    /// Number of episodes to run
    #[arg(long)]
    pub max_episodes: Option<usize>,

    /// Simulator base URL
    #[arg(long)]
    pub env_url: Option<String>,

    /// Let every agent of a step decide concurrently
    #[arg(long)]
    pub parallel: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(task) = &self.task {
            config.task = task.parse()?;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max_episodes) = self.max_episodes {
            config.max_episodes = max_episodes;
        }
        if let Some(url) = &self.env_url {
            config.environment.base_url = url.clone();
        }
        if self.parallel {
            config.decision.parallel = true;
        }
        config.validate()?;
        Ok(())
    }
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    args.apply(&mut config)?;

    let model = config.model_spec()?;
    if config.api_key_for(provider_key(model.family)).is_none() {
        warn!(model = %model.id, "No API key configured; requests will likely be rejected");
    }
    let provider = build_for_model(&config, &model);

    let events = Arc::new(EventBus::default());
    let recorder = JsonlRecorder::create(&config.output_dir).await?;
    let record_path = recorder.path().to_path_buf();
    let recording = recorder.spawn(events.subscribe());

    let env = HttpEnvironment::new(
        config.environment.base_url.clone(),
        Duration::from_secs(config.environment.timeout_secs),
    );

    let task = config.task;
    let max_episodes = config.max_episodes;
    println!("🧱 GridParley");
    println!("   Task:      {task}");
    println!("   Model:     {} ({})", model.id, model.family);
    println!("   Simulator: {}", config.environment.base_url);
    println!("   Episodes:  {max_episodes}");
    println!();

    let ctx = AgentContext {
        config: Arc::new(config),
        model,
        provider,
        events: events.clone(),
    };
    let mut runner = EpisodeRunner::new(env, task, ctx);
    let report = runner.run(max_episodes).await;

    // Dropping every sender ends the recorder.
    drop(runner);
    drop(events);
    let written = recording.await??;
    info!(path = %record_path.display(), events = written, "Episode record written");

    print_report(&report);
    println!("   Record:    {}", record_path.display());

    if report.all_succeeded() {
        Ok(())
    } else {
        Err(format!("{} of {max_episodes} episode(s) failed", report.failed.len()).into())
    }
}

fn print_report(report: &RunReport) {
    println!();
    for (episode, summary) in &report.completed {
        let rewards: Vec<String> = summary
            .final_rewards
            .iter()
            .map(|r| format!("{r:.2}"))
            .collect();
        let ended = if summary.ended_early { " (ended early)" } else { "" };
        println!(
            "   ✅ Episode {episode}: {} steps{ended}, rewards [{}]",
            summary.steps_executed,
            rewards.join(", ")
        );
    }
    for (episode, error) in &report.failed {
        println!("   ❌ Episode {episode}: {error}");
    }
}
