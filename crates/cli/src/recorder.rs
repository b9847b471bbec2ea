//! JSONL episode recorder.
//!
//! Subscribes to the [`EventBus`](gridparley_core::EventBus) and appends one
//! JSON object per [`EpisodeEvent`] to `{output_dir}/run-<timestamp>.jsonl`.
//! The recorder stops once every sender has been dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use gridparley_core::EpisodeEvent;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

pub struct JsonlRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlRecorder {
    /// Create `output_dir` if needed and open a fresh record file in it.
    pub async fn create(output_dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(output_dir).await?;
        let name = format!("run-{}.jsonl", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        let path = output_dir.join(name);
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn record(&mut self, event: &EpisodeEvent) -> io::Result<()> {
        let line = serde_json::to_string(event)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await
    }

    /// Drain `events` into the file on a background task.
    ///
    /// Resolves to the number of events written.
    pub fn spawn(
        mut self,
        mut events: broadcast::Receiver<Arc<EpisodeEvent>>,
    ) -> JoinHandle<io::Result<usize>> {
        tokio::spawn(async move {
            let mut written = 0;
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.record(&event).await?;
                        written += 1;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Recorder fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            self.writer.flush().await?;
            Ok(written)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridparley_core::{EventBus, Phase};

    #[tokio::test]
    async fn writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::default();
        let recorder = JsonlRecorder::create(&dir.path().join("outputs"))
            .await
            .unwrap();
        let path = recorder.path().to_path_buf();
        let handle = recorder.spawn(bus.subscribe());

        bus.publish(EpisodeEvent::StepCompleted {
            episode: 0,
            step: 0,
            phase: Phase::Physical,
            rewards: vec![1.0, 0.5],
            cumulative_rewards: vec![1.0, 0.5],
            timestamp: Utc::now(),
        });
        bus.publish(EpisodeEvent::EpisodeFailed {
            episode: 1,
            error: "simulator went away".into(),
            timestamp: Utc::now(),
        });
        drop(bus);

        assert_eq!(handle.await.unwrap().unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "step_completed");
        assert_eq!(lines[0]["cumulative_rewards"][1], 0.5);
        assert_eq!(lines[1]["event"], "episode_failed");
        assert_eq!(lines[1]["error"], "simulator went away");
    }

    #[tokio::test]
    async fn record_file_is_named_by_run() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::create(dir.path()).await.unwrap();
        let name = recorder.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("run-"));
        assert!(name.ends_with(".jsonl"));
    }
}
