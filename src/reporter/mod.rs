//! Heartbeat batching — accumulates successful probes and flushes
//! fixed-size batches to the registry.
//!
//! Submission is best-effort: the pending batch is handed off before the
//! flush result is known, so a registry hiccup can never grow the batch
//! without bound or leak one provider's results into the next pass.

use async_trait::async_trait;
use tracing::debug;

use crate::probe::ProbeResult;
use crate::registry::{Datapack, RegistryError, ServerReport};

/// Where finished batches go. The registry client is the production
/// sink; tests substitute their own.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn submit(&self, servers: &[ServerReport]) -> Result<(), RegistryError>;
}

pub struct BatchReporter<'a, S: HeartbeatSink> {
    sink: &'a S,
    capacity: usize,
    pending: Vec<ServerReport>,
}

impl<'a, S: HeartbeatSink> BatchReporter<'a, S> {
    pub fn new(sink: &'a S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Feed one probe outcome in. Failures are dropped; successes are
    /// batched, flushing as soon as the batch reaches capacity.
    ///
    /// A submission error is returned for observability, but the batch
    /// is already cleared — the caller logs it and moves on.
    pub async fn offer(&mut self, result: ProbeResult) -> Result<(), RegistryError> {
        match result {
            ProbeResult::Unreachable { id, error } => {
                debug!(server = id, %error, "Dropping unreachable server from batch");
                Ok(())
            }
            ProbeResult::Online { id, info } => {
                self.pending.push(ServerReport {
                    id,
                    datapack: Datapack { info },
                });
                if self.pending.len() >= self.capacity {
                    self.flush().await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Submit whatever is pending at the end of a provider pass.
    /// No-op on an empty batch — no registry call is made.
    pub async fn flush_remainder(&mut self) -> Result<(), RegistryError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.flush().await
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn flush(&mut self) -> Result<(), RegistryError> {
        let batch = std::mem::take(&mut self.pending);
        self.sink.submit(&batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeFailure, ServerInfo};
    use std::sync::Mutex;

    struct RecordingSink {
        batches: Mutex<Vec<Vec<u64>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn batches(&self) -> Vec<Vec<u64>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HeartbeatSink for RecordingSink {
        async fn submit(&self, servers: &[ServerReport]) -> Result<(), RegistryError> {
            if self.fail {
                return Err(RegistryError::NonSuccess {
                    result: "FAIL".into(),
                    message: None,
                });
            }
            self.batches
                .lock()
                .unwrap()
                .push(servers.iter().map(|s| s.id).collect());
            Ok(())
        }
    }

    fn online(id: u64) -> ProbeResult {
        ProbeResult::Online {
            id,
            info: ServerInfo {
                hostname: format!("server-{id}"),
                online: 3,
                maxplayers: 24,
                map: "cp_dustbowl".into(),
                keywords: None,
                bots: 0,
                game: "Team Fortress".into(),
                appid: 440,
                version: "1.0".into(),
                passworded: false,
                vac_secure: true,
                sourcetv_port: None,
                sourcetv_name: None,
            },
        }
    }

    fn unreachable(id: u64) -> ProbeResult {
        ProbeResult::Unreachable {
            id,
            error: ProbeFailure::Timeout,
        }
    }

    #[tokio::test]
    async fn test_flushes_at_capacity() {
        let sink = RecordingSink::new();
        let mut reporter = BatchReporter::new(&sink, 2);

        reporter.offer(online(1)).await.unwrap();
        assert_eq!(reporter.pending(), 1);
        assert!(sink.batches().is_empty());

        reporter.offer(online(2)).await.unwrap();
        assert_eq!(reporter.pending(), 0);
        assert_eq!(sink.batches(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_never_holds_more_than_capacity() {
        let sink = RecordingSink::new();
        let mut reporter = BatchReporter::new(&sink, 3);

        for id in 1..=10 {
            reporter.offer(online(id)).await.unwrap();
            assert!(reporter.pending() < 3);
        }

        assert_eq!(sink.batches(), vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
        assert_eq!(reporter.pending(), 1);
    }

    #[tokio::test]
    async fn test_remainder_flush_leaves_batch_empty() {
        let sink = RecordingSink::new();
        let mut reporter = BatchReporter::new(&sink, 5);

        reporter.offer(online(1)).await.unwrap();
        reporter.offer(online(2)).await.unwrap();
        reporter.flush_remainder().await.unwrap();

        assert_eq!(reporter.pending(), 0);
        assert_eq!(sink.batches(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_empty_remainder_makes_no_call() {
        let sink = RecordingSink::new();
        let mut reporter = BatchReporter::new(&sink, 5);

        reporter.flush_remainder().await.unwrap();
        assert!(sink.batches().is_empty());

        // Also after a capacity flush emptied the batch.
        for id in 1..=5 {
            reporter.offer(online(id)).await.unwrap();
        }
        reporter.flush_remainder().await.unwrap();
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_discarded() {
        let sink = RecordingSink::new();
        let mut reporter = BatchReporter::new(&sink, 2);

        reporter.offer(unreachable(1)).await.unwrap();
        reporter.offer(online(2)).await.unwrap();
        reporter.offer(unreachable(3)).await.unwrap();
        reporter.offer(online(4)).await.unwrap();

        assert_eq!(sink.batches(), vec![vec![2, 4]]);
    }

    #[tokio::test]
    async fn test_failed_submission_is_observable_and_clears_batch() {
        let sink = RecordingSink::failing();
        let mut reporter = BatchReporter::new(&sink, 2);

        reporter.offer(online(1)).await.unwrap();
        let err = reporter.offer(online(2)).await.unwrap_err();
        assert!(matches!(err, RegistryError::NonSuccess { .. }));

        // The batch was dropped, not retried.
        assert_eq!(reporter.pending(), 0);
        reporter.flush_remainder().await.unwrap();
    }
}
