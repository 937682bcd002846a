//! Error types for table and registry operations.

/// Errors surfaced by malformed calls.
///
/// Redundant cleanup (removing an entry twice, disposing a key twice) is not
/// an error and never produces one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// A required argument was missing or already dead.
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),

	/// The key identity is already present in the table.
	#[error("key is already present in the table")]
	DuplicateKey,
}

/// Result type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;
