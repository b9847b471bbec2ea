//! Episode events — progress records for observers.
//!
//! The controller and runner publish an event at each step and at episode
//! boundaries. Subscribers (the JSONL recorder, tests) are pure observers:
//! publishing never fails and nothing waits on a subscriber.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use crate::task::{Phase, TaskName};

/// All progress records emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EpisodeEvent {
    /// An episode was initialised and is about to take its first step
    EpisodeStarted {
        episode: usize,
        task: TaskName,
        model: String,
        agents: Vec<String>,
        max_length: u32,
        phase1_length: u32,
        timestamp: DateTime<Utc>,
    },

    /// The active roster was replaced by the physical roster
    PhaseSwitched {
        episode: usize,
        step: u32,
        timestamp: DateTime<Utc>,
    },

    /// One agent finished its decision cycle
    AgentDecided {
        episode: usize,
        step: u32,
        phase: Phase,
        agent: String,
        plan: String,
        action: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// The environment applied a step
    StepCompleted {
        episode: usize,
        step: u32,
        phase: Phase,
        rewards: Vec<f64>,
        cumulative_rewards: Vec<f64>,
        timestamp: DateTime<Utc>,
    },

    /// The episode finished (bound reached or terminated)
    EpisodeCompleted {
        episode: usize,
        steps: u32,
        final_rewards: Vec<f64>,
        timestamp: DateTime<Utc>,
    },

    /// The episode was aborted
    EpisodeFailed {
        episode: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for episode events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<EpisodeEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: EpisodeEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EpisodeEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(EpisodeEvent::PhaseSwitched {
            episode: 0,
            step: 10,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            EpisodeEvent::PhaseSwitched { step, .. } => assert_eq!(*step, 10),
            _ => panic!("Expected PhaseSwitched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(EpisodeEvent::EpisodeFailed {
            episode: 3,
            error: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = EpisodeEvent::EpisodeCompleted {
            episode: 1,
            steps: 15,
            final_rewards: vec![1.0, 2.0],
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "episode_completed");
        assert_eq!(json["steps"], 15);
    }
}
