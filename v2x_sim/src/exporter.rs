//! JSON exporter for V2X broadcasts.
//!
//! Writes every broadcast of a run plus a summary next to it.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use v2x_core::{BroadcastMessage, EngineStats, MessageSummary};

/// File holding every broadcast of the run.
pub const MESSAGES_FILE: &str = "v2x_messages_complete.json";

/// File holding the run summary.
pub const SUMMARY_FILE: &str = "v2x_summary.json";

/// Summary document written at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id of this run
    pub run_id: Uuid,

    /// Steps processed
    pub steps: u64,

    #[serde(flatten)]
    pub messages: MessageSummary,

    /// Fusion counters at the end of the run
    pub engine: EngineStats,
}

/// Collects broadcasts during a run and writes them out at the end.
#[derive(Debug)]
pub struct MessageExporter {
    output_dir: PathBuf,
    run_id: Uuid,
    messages: Vec<BroadcastMessage>,
}

impl MessageExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn record(&mut self, msg: BroadcastMessage) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[BroadcastMessage] {
        &self.messages
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn summary(&self, steps: u64, engine: EngineStats) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            steps,
            messages: MessageSummary::from_broadcasts(&self.messages),
            engine,
        }
    }

    /// Writes messages and summary, creating the output directory if needed.
    pub fn write(&self, steps: u64, engine: EngineStats) -> std::io::Result<RunSummary> {
        fs::create_dir_all(&self.output_dir)?;

        write_json(&self.output_dir.join(MESSAGES_FILE), &self.messages)?;
        let summary = self.summary(steps, engine);
        write_json(&self.output_dir.join(SUMMARY_FILE), &summary)?;
        Ok(summary)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
