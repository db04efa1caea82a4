// ABOUTME: Error kinds surfaced by the replication orchestrator
// ABOUTME: Carried inside anyhow chains so callers can downcast to a specific kind

use crate::replication::SubscriptionProgress;
use std::fmt;

/// Why a catch-up wait stopped before the replica converged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitInterrupt {
    DeadlineElapsed,
    Cancelled,
}

impl fmt::Display for WaitInterrupt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WaitInterrupt::DeadlineElapsed => write!(f, "deadline elapsed"),
            WaitInterrupt::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug)]
pub enum ReplicationError {
    /// A required argument was blank or empty. Never retried.
    InvalidArgument(String),
    /// The configuration cannot drive replication as written.
    InvalidConfiguration(String),
    /// A catalog query or DDL statement failed.
    StatementFailed {
        context: String,
        source: anyhow::Error,
    },
    /// The replica did not converge before the deadline or cancellation.
    CatchUpTimeout {
        subscription: String,
        reason: WaitInterrupt,
        last: SubscriptionProgress,
    },
    /// The run was cancelled before or during a connect, query or DDL step.
    Cancelled { step: String },
    /// A replica step failed and the remaining replicas were skipped.
    SequenceAborted {
        index: usize,
        label: String,
        subscription: String,
    },
}

impl ReplicationError {
    pub fn statement_failed(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ReplicationError::StatementFailed {
            context: context.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReplicationError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ReplicationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            ReplicationError::StatementFailed { context, source } => {
                write!(f, "Statement failed: {}: {}", context, source)
            }
            ReplicationError::CatchUpTimeout {
                subscription,
                reason,
                last,
            } => write!(
                f,
                "Subscription '{}' not caught up ({}): received={} latest_end={} pid={}",
                subscription, reason, last.received, last.latest_end, last.pid
            ),
            ReplicationError::Cancelled { step } => write!(f, "Cancelled during {}", step),
            ReplicationError::SequenceAborted {
                index,
                label,
                subscription,
            } => write!(
                f,
                "Replica {} ({}) failed on subscription '{}'; remaining replicas were skipped",
                index + 1,
                label,
                subscription
            ),
        }
    }
}

impl std::error::Error for ReplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReplicationError::StatementFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Find the first `ReplicationError` among the sources of an error chain.
///
/// Kinds attached with `.context(..)` (such as `SequenceAborted`) are only visible
/// through `err.downcast_ref()`; this walks past them to the underlying failure.
pub fn find_kind(err: &anyhow::Error) -> Option<&ReplicationError> {
    err.chain().find_map(|e| e.downcast_ref::<ReplicationError>())
}
