//! Error types for protocol-level checks.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised when a decoded message breaks the wire contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An oplog entry was returned at or below the requested cursor.
    #[error("oplog entry lsn {lsn} is not after requested lsn {after_lsn}")]
    EntryBeforeCursor {
        /// The `after_lsn` the batch was requested with.
        after_lsn: u64,
        /// The offending entry's LSN.
        lsn: u64,
    },

    /// Oplog entries were not strictly ascending.
    #[error("oplog entries out of order: lsn {lsn} follows {previous}")]
    OutOfOrder {
        /// LSN of the preceding entry.
        previous: u64,
        /// LSN of the offending entry.
        lsn: u64,
    },

    /// A field required by the entry's op type was absent.
    #[error("oplog entry lsn {lsn} ({op_type}) is missing field `{field}`")]
    MissingField {
        /// LSN of the entry.
        lsn: u64,
        /// The entry's op type.
        op_type: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// An integer did not map to a known enum value.
    #[error("unknown {kind} value: {value}")]
    UnknownEnumValue {
        /// Enum name.
        kind: &'static str,
        /// Raw wire value.
        value: i64,
    },
}
