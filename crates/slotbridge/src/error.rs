//! Pool errors.
//!
//! `E` is the driver's own error type. Driver failures travel back from the
//! worker thread untouched and surface as [`PoolError::Operation`].

use crate::bridge::protocol::SlotId;
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    /// A connection could not be opened while building the pool.
    #[error("failed to open connection for slot {index}: {source}")]
    Construction {
        index: usize,
        #[source]
        source: E,
    },

    /// The driver failed an operation. Display and source are the driver's.
    #[error(transparent)]
    Operation(E),

    /// The driver panicked; the slot has been taken out of service.
    #[error("worker for slot {slot} panicked: {message}")]
    WorkerPanicked { slot: SlotId, message: String },

    #[error("worker for slot {slot} is gone")]
    WorkerGone { slot: SlotId },

    /// Borrower and worker disagreed about the handoff.
    #[error("protocol violation on slot {slot}: {detail}")]
    Protocol { slot: SlotId, detail: String },

    #[error("pool is closed")]
    Closed,

    /// Every slot has been quarantined; nothing can ever be acquired again.
    #[error("every slot in the pool has been quarantined")]
    Exhausted,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread for slot {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

impl<E> PoolError<E> {
    /// The driver error, if this is an operation failure.
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            PoolError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Unwrap the driver error, handing back `self` for every other kind.
    pub fn into_operation(self) -> Result<E, Self> {
        match self {
            PoolError::Operation(e) => Ok(e),
            other => Err(other),
        }
    }

    /// Whether the failing slot can no longer be trusted.
    pub fn is_slot_fatal(&self) -> bool {
        matches!(
            self,
            PoolError::WorkerPanicked { .. } | PoolError::WorkerGone { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("no such table: widgets")]
    struct DriverError;

    #[test]
    fn operation_error_is_transparent() {
        let err: PoolError<DriverError> = PoolError::Operation(DriverError);
        assert_eq!(err.to_string(), "no such table: widgets");
        assert!(err.as_operation().is_some());
        assert!(err.into_operation().is_ok());
    }

    #[test]
    fn construction_error_keeps_source() {
        let err: PoolError<DriverError> = PoolError::Construction {
            index: 2,
            source: DriverError,
        };
        assert_eq!(
            err.to_string(),
            "failed to open connection for slot 2: no such table: widgets"
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("no such table: widgets"));
        assert!(err.into_operation().is_err());
    }

    #[test]
    fn fatal_kinds() {
        let slot = SlotId::new();
        assert!(PoolError::<DriverError>::WorkerGone { slot }.is_slot_fatal());
        assert!(
            PoolError::<DriverError>::WorkerPanicked {
                slot,
                message: "boom".into()
            }
            .is_slot_fatal()
        );
        assert!(!PoolError::<DriverError>::Closed.is_slot_fatal());
    }
}
