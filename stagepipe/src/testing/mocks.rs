//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::stages::Stage;

/// A shared, ordered record of stage labels.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// A stage that appends its label to a journal on every run.
///
/// Several stages sharing one journal record their relative order.
#[derive(Debug)]
pub struct RecordingStage {
    label: String,
    journal: Journal,
}

impl RecordingStage {
    /// Creates a recording stage with its own journal.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_journal(label, Journal::default())
    }

    /// Creates a recording stage writing to a shared journal.
    #[must_use]
    pub fn with_journal(label: impl Into<String>, journal: Journal) -> Self {
        Self {
            label: label.into(),
            journal,
        }
    }

    /// Returns the journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Returns the recorded labels.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    /// Returns how often this stage ran.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.journal.lock().iter().filter(|l| **l == self.label).count()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    async fn do_work(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        self.journal.lock().push(self.label.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("RecordingStage({})", self.label)
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    message: String,
    attempts: AtomicUsize,
}

impl FailingStage {
    /// Creates a stage failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Returns how often the stage ran.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for FailingStage {
    fn default() -> Self {
        Self::new("stage failed")
    }
}

#[async_trait]
impl Stage for FailingStage {
    async fn do_work(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("{}", self.message)
    }
}

/// A stage that sleeps before succeeding.
#[derive(Debug, Clone, Copy)]
pub struct SlowStage {
    delay: Duration,
}

impl SlowStage {
    /// Creates a stage sleeping for `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Creates a stage sleeping for `ms` milliseconds.
    #[must_use]
    pub const fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Returns the delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for SlowStage {
    fn default() -> Self {
        Self::with_delay_ms(10)
    }
}

#[async_trait]
impl Stage for SlowStage {
    async fn do_work(&self, _ctx: &ExecutionContext) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_recording_stages_share_a_journal() {
        let ctx = ExecutionContext::new();
        let first = RecordingStage::new("first");
        let second = RecordingStage::with_journal("second", first.journal().clone());

        first.do_work(&ctx).await.unwrap();
        second.do_work(&ctx).await.unwrap();
        first.do_work(&ctx).await.unwrap();

        assert_eq!(first.entries(), vec!["first", "second", "first"]);
        assert_eq!(first.execution_count(), 2);
        assert_eq!(second.describe(), "RecordingStage(second)");
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::new("kaput");
        let err = stage.do_work(&ExecutionContext::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "kaput");
        assert_eq!(stage.attempts(), 1);
        assert_eq!(stage.describe(), "FailingStage");
    }

    #[tokio::test]
    async fn test_slow_stage() {
        let stage = SlowStage::with_delay_ms(10);
        let start = std::time::Instant::now();
        stage.do_work(&ExecutionContext::new()).await.unwrap();

        assert!(start.elapsed() >= stage.delay());
    }
}
