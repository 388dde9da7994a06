//! # Retransmission Job
//!
//! Periodic, single-instance trigger for the contingency orchestrator. A
//! tick that arrives while the previous run is still executing is skipped
//! entirely, not queued. Each run is wrapped in a hard execution budget;
//! exceeding it cancels in-flight work and is reported as a distinct
//! timed-out condition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::contingency::{ContingencyOrchestrator, RetransmissionSummary};
use crate::error::RelayError;

/// Outcome of one job tick.
#[derive(Debug)]
pub enum JobRunOutcome {
    Completed(RetransmissionSummary),
    /// Previous run still in flight; this tick did nothing.
    Skipped,
    /// Execution budget exceeded; in-flight work was cancelled.
    TimedOut,
    Failed(RelayError),
}

pub struct RetransmissionJob {
    orchestrator: Arc<ContingencyOrchestrator>,
    running: AtomicBool,
    config: SchedulerConfig,
}

impl RetransmissionJob {
    pub fn new(orchestrator: Arc<ContingencyOrchestrator>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            running: AtomicBool::new(false),
            config,
        }
    }

    /// Spawn the periodic trigger loop. The first run happens one full
    /// interval after start.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            interval_secs = self.config.interval_secs,
            budget_secs = self.config.execution_budget_secs,
            "⏰ Retransmission job scheduled"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval() fires immediately on first tick; consume it so the
            // first run waits a full period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    /// Execute one run if none is in flight. The compare-and-swap on the
    /// running flag is the single-flight guard shared with any manual
    /// trigger.
    pub async fn run_once(&self) -> JobRunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous retransmission run still in flight, skipping this tick");
            return JobRunOutcome::Skipped;
        }

        let outcome = match tokio::time::timeout(
            self.config.execution_budget(),
            self.orchestrator.retransmit_pending_documents(),
        )
        .await
        {
            Ok(Ok(summary)) => {
                info!(
                    pending = summary.pending_fetched,
                    received = summary.documents_received,
                    rejected = summary.documents_rejected,
                    still_pending = summary.documents_still_pending,
                    "Retransmission run completed"
                );
                JobRunOutcome::Completed(summary)
            }
            Ok(Err(err)) => {
                error!(error = %err, "Retransmission run failed");
                JobRunOutcome::Failed(err)
            }
            Err(_) => {
                error!(
                    budget_secs = self.config.execution_budget_secs,
                    "Retransmission run exceeded its execution budget and was cancelled"
                );
                JobRunOutcome::TimedOut
            }
        };

        self.running.store(false, Ordering::Release);
        outcome
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
