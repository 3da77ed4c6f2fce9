//! Error types for endpoint function operations

use thiserror::Error;
use xmt_proto::bar::BarNo;

/// Result type alias for endpoint operations
pub type Result<T> = std::result::Result<T, XmtError>;

/// Errors that can occur while binding or operating the endpoint function
#[derive(Debug, Error)]
pub enum XmtError {
    /// The controller reported no usable BAR for the register block
    #[error("No free BAR usable for the command register block")]
    NoFreeBar,

    /// The register BAR has a controller-fixed size smaller than the block
    #[error("{bar} is fixed at {fixed} bytes, smaller than the {needed}-byte register block")]
    RegisterBarTooSmall {
        /// BAR that was considered
        bar: BarNo,
        /// Controller-fixed size in bytes
        fixed: u64,
        /// Rounded register block size in bytes
        needed: u64,
    },

    /// Backing memory allocation failed
    #[error("Failed to allocate {size} bytes of backing memory for {bar}")]
    OutOfSpace {
        /// BAR the allocation was for
        bar: BarNo,
        /// Requested size in bytes
        size: u64,
    },

    /// An offset/length pair crosses the buffer capacity
    #[error("Range {offset:#x}+{len:#x} crosses the {capacity:#x}-byte buffer capacity")]
    Overflow {
        /// Requested start offset
        offset: u64,
        /// Requested length
        len: u64,
        /// Buffer capacity
        capacity: u64,
    },

    /// A mapping offset is not page-aligned
    #[error("Mapping offset {offset:#x} is not aligned to the {page}-byte page size")]
    UnalignedOffset {
        /// Requested offset
        offset: u64,
        /// Page size in bytes
        page: u64,
    },

    /// The endpoint controller rejected an operation
    #[error("Controller error: {reason}")]
    Controller {
        /// Reason reported by the controller
        reason: String,
    },

    /// An unknown lifecycle notifier event was delivered
    #[error("Invalid notifier event {raw:#x}")]
    InvalidEvent {
        /// Raw event value
        raw: u32,
    },
}

impl XmtError {
    /// Create a controller error
    pub fn controller(reason: impl Into<String>) -> Self {
        Self::Controller {
            reason: reason.into(),
        }
    }

    /// Create an overflow error
    #[must_use]
    pub const fn overflow(offset: u64, len: u64, capacity: u64) -> Self {
        Self::Overflow {
            offset,
            len,
            capacity,
        }
    }
}
