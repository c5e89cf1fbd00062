//! Error types for reconciliation operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::util;

/// Uniform failure record for one tree operation. Carries the relative
/// name the operation was working on, a short operation label, and the
/// underlying cause.
#[derive(Debug)]
pub struct OpError {
	/// Relative name of the entry the operation applied to
	pub file: String,

	/// Short label of the failed step, e.g. "write file open"
	pub op: &'static str,

	/// The underlying error
	pub source: Box<dyn Error + Send + Sync>,

	/// The on-disk state disagrees with the database; the caller must
	/// rescan before retrying this change
	pub must_rescan: bool,
}

impl OpError {
	pub fn new<E>(file: &str, op: &'static str, source: E) -> Self
	where
		E: Into<Box<dyn Error + Send + Sync>>,
	{
		OpError { file: file.to_string(), op, source: source.into(), must_rescan: false }
	}

	pub fn rescan<E>(file: &str, op: &'static str, source: E) -> Self
	where
		E: Into<Box<dyn Error + Send + Sync>>,
	{
		OpError { file: file.to_string(), op, source: source.into(), must_rescan: true }
	}
}

impl fmt::Display for OpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}: {}", self.op, self.file, self.source)
	}
}

impl Error for OpError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(self.source.as_ref())
	}
}

/// Errors from the block pullers
#[derive(Debug)]
pub enum PullError {
	/// No device currently advertises the file
	NoDevice,

	/// The local index has no (valid) copy of the block
	NoSuchBlock,

	/// Neither a local nor a network source is configured
	NoSource,

	/// The received data did not hash to the expected value
	HashMismatch { expected: Vec<u8>, actual: Vec<u8> },

	/// I/O error while reading a local candidate
	Io(io::Error),

	/// The transport failed while talking to a device
	Transport(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for PullError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PullError::NoDevice => write!(f, "no connected device has the required file"),
			PullError::NoSuchBlock => write!(f, "no such block"),
			PullError::NoSource => write!(f, "no source"),
			PullError::HashMismatch { expected, actual } => {
				write!(
					f,
					"hash mismatch: expected {}, got {}",
					util::hash_to_base64(expected),
					util::hash_to_base64(actual)
				)
			}
			PullError::Io(e) => write!(f, "I/O error: {}", e),
			PullError::Transport(e) => write!(f, "transport error: {}", e),
		}
	}
}

impl Error for PullError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			PullError::Io(e) => Some(e),
			PullError::Transport(e) => Some(e.as_ref()),
			_ => None,
		}
	}
}

impl From<io::Error> for PullError {
	fn from(e: io::Error) -> Self {
		PullError::Io(e)
	}
}


// vim: ts=4
