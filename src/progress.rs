//! Progress reporting handed to every component instead of a global console.

use std::sync::Mutex;

/// Logging target used by [`TracingProgress`].
pub const LOG_TARGET: &str = "couch_bench";

pub trait Progress: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);
}

/// Forwards progress to the installed `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn info(&self, message: &str) {
        tracing::info!(target: LOG_TARGET, "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: LOG_TARGET, "{message}");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
}

/// Captures messages in memory; used by tests in place of a console.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, msg)| msg).collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, msg)| msg)
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }
}

impl Progress for RecordingProgress {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }
}
