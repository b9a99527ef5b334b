//! The reconciler's classified error type (spec §7). Leaf crates
//! (`fabnet-store`, `fabnet-chart`, `fabnet-workflow`) return plain
//! `anyhow::Error`; this boundary sorts failures into the few buckets
//! `error_policy` needs to pick a backoff, matching the teacher's habit of
//! a typed error enum at API boundaries (see `mz-cloud-resources`'s
//! `CloudResourceController` trait) even though its own leaves stay
//! `anyhow`-typed.

use std::time::Duration;
use thiserror::Error;

/// Validation failures and terminal workflow failures are not represented
/// here: both are modeled as state transitions (`State::Invalid`,
/// `State::Failed`) produced by `decision::step`, not as an `Err` the
/// reconcile loop has to catch. This enum only classifies failures that
/// happen *while carrying out* a decision's actions or gathering its
/// observations.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A precondition the reconciler cannot fix by retrying unchanged
    /// (e.g. a referenced secret is missing). Surfaces to `Status.message`
    /// and backs off at the same cadence as a transient error.
    #[error("precondition not met: {0}")]
    Precondition(String),

    /// A `kube` API call failed for a reason expected to clear on its own
    /// (conflict, server timeout, connection reset).
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] kube::Error),

    /// `cryptogen`/`configtxgen`/`helm` exited non-zero. Carries the
    /// combined stdout+stderr, matching the original's
    /// `cmd.CombinedOutput()` + log pattern.
    #[error("external tool failed: {0}")]
    ToolFailure(String),

    /// Anything else bubbling up from a leaf crate that doesn't fit the
    /// above (archive corruption, scratch-directory I/O, ...).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReconcileError {
    /// The backoff `error_policy` applies for this class of failure.
    pub fn requeue_after(&self) -> Duration {
        match self {
            ReconcileError::Precondition(_) => Duration::from_secs(15),
            ReconcileError::TransientIo(_) => Duration::from_secs(5),
            ReconcileError::ToolFailure(_) => Duration::from_secs(30),
            ReconcileError::Other(_) => Duration::from_secs(15),
        }
    }
}
