//! Post-commit reconciliation with the external notary
//!
//! Two patterns, both strictly after the primary transaction commits:
//!
//! - [`race_with_timeout`]: the caller wants a confirmation to report
//!   (referral binding, redemption creation). The notarization and a
//!   timer run concurrently; if the timer wins the caller gets
//!   `TimedOut` (unknown, not false) and the in-flight call keeps
//!   running detached, its late result discarded.
//! - [`Reconciler`]: a queue drained by one background worker. Each job
//!   is attempted once under a timeout; on success a new independent
//!   transaction backfills the tx hash through a [`HashSink`], on any
//!   failure the hash stays null forever. No retries, nothing surfaced.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::ledger::store as ledger_store;
use crate::notary::client::{NotarizeInstruction, Notary, NotaryError};
use crate::redemption::engine::attach_request_tx_hash;

/// Outcome of racing a notarization against a timer.
#[derive(Debug)]
pub enum RaceOutcome {
    Confirmed(String),
    Failed(NotaryError),
    TimedOut,
}

impl RaceOutcome {
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            RaceOutcome::Confirmed(hash) => Some(hash),
            _ => None,
        }
    }

    pub fn confirmed(&self) -> bool {
        matches!(self, RaceOutcome::Confirmed(_))
    }
}

/// Run the notarization and a timer concurrently and return whichever
/// resolves first. The losing call is not cancelled: it runs on in a
/// detached task and its result is dropped.
pub async fn race_with_timeout(
    notary: Arc<dyn Notary>,
    instruction: NotarizeInstruction,
    timeout: Duration,
) -> RaceOutcome {
    let instruction_id = instruction.instruction_id.clone();
    let handle = tokio::spawn(async move { notary.notarize(&instruction).await });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(hash))) => RaceOutcome::Confirmed(hash),
        Ok(Ok(Err(err))) => {
            debug!(instruction_id = %instruction_id, error = %err, "Notarization resolved first but failed");
            RaceOutcome::Failed(err)
        }
        Ok(Err(join_err)) => {
            warn!(instruction_id = %instruction_id, error = %join_err, "Notarization task panicked");
            RaceOutcome::Failed(NotaryError::Transport(join_err.to_string()))
        }
        Err(_) => {
            debug!(
                instruction_id = %instruction_id,
                timeout_ms = timeout.as_millis() as u64,
                "Timer won the race, notarization left in flight"
            );
            RaceOutcome::TimedOut
        }
    }
}

/// Where a confirmed hash lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillTarget {
    LedgerEntry(i64),
    Request(Uuid),
}

#[derive(Debug)]
pub struct NotarizeJob {
    pub instruction: NotarizeInstruction,
    pub target: BackfillTarget,
}

/// Backfill write seam, so the worker is testable without Postgres.
#[async_trait]
pub trait HashSink: Send + Sync {
    async fn attach(&self, target: BackfillTarget, tx_hash: &str) -> Result<(), EngineError>;
}

pub struct PgHashSink {
    pool: PgPool,
}

impl PgHashSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HashSink for PgHashSink {
    async fn attach(&self, target: BackfillTarget, tx_hash: &str) -> Result<(), EngineError> {
        // Both writes absorb and log their own storage failures.
        match target {
            BackfillTarget::LedgerEntry(entry_id) => {
                ledger_store::attach_tx_hash(&self.pool, entry_id, tx_hash).await;
            }
            BackfillTarget::Request(request_id) => {
                attach_request_tx_hash(&self.pool, request_id, tx_hash).await;
            }
        }
        Ok(())
    }
}

/// Cheaply cloneable handle for enqueueing fire-and-forget jobs.
#[derive(Clone)]
pub struct Reconciler {
    sender: mpsc::UnboundedSender<NotarizeJob>,
}

impl Reconciler {
    /// Hand a job to the worker and return immediately. A dropped worker
    /// only costs audit trail, so a send failure is logged and swallowed.
    pub fn enqueue(&self, job: NotarizeJob) {
        if self.sender.send(job).is_err() {
            warn!("Reconciler worker gone, notarization job dropped");
        }
    }
}

/// Start the background worker draining the job queue. Returns the
/// enqueue handle; the worker lives until every handle is dropped.
pub fn spawn_reconciler(
    notary: Arc<dyn Notary>,
    sink: Arc<dyn HashSink>,
    call_timeout: Duration,
) -> Reconciler {
    let (sender, mut receiver) = mpsc::unbounded_channel::<NotarizeJob>();

    tokio::spawn(async move {
        while let Some(job) = receiver.recv().await {
            process_job(notary.as_ref(), sink.as_ref(), job, call_timeout).await;
        }
        debug!("Reconciler queue closed, worker stopping");
    });

    Reconciler { sender }
}

async fn process_job(
    notary: &dyn Notary,
    sink: &dyn HashSink,
    job: NotarizeJob,
    call_timeout: Duration,
) {
    let instruction_id = job.instruction.instruction_id.clone();

    match tokio::time::timeout(call_timeout, notary.notarize(&job.instruction)).await {
        Ok(Ok(hash)) => {
            debug!(
                instruction_id = %instruction_id,
                tx_hash = %hash,
                "Notarization confirmed, backfilling"
            );
            if let Err(err) = sink.attach(job.target, &hash).await {
                warn!(
                    instruction_id = %instruction_id,
                    error = %err,
                    "Tx hash backfill failed, hash lost"
                );
            }
        }
        Ok(Err(NotaryError::Skipped)) => {
            debug!(instruction_id = %instruction_id, "Notarization skipped");
        }
        Ok(Err(err)) => {
            warn!(
                instruction_id = %instruction_id,
                error = %err,
                "Notarization failed, tx hash stays null"
            );
        }
        Err(_) => {
            warn!(
                instruction_id = %instruction_id,
                timeout_ms = call_timeout.as_millis() as u64,
                "Notarization timed out, tx hash stays null"
            );
        }
    }
}
