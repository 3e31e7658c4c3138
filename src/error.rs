//! Error taxonomy surfaced by the engine.

use thiserror::Error;

/// Errors returned by any public operation on a [`crate::Session`].
#[derive(Debug, Error)]
pub enum ImgError {
	/// The backing store failed a positioned read or write. The session should be
	/// considered unusable afterwards; this is not locally recovered.
	#[error("backing store I/O error: {0}")]
	Io(#[from] std::io::Error),
	/// The allocator has no free block left.
	#[error("no free blocks available")]
	NoSpace,
	/// The descriptor table has no free slot left.
	#[error("descriptor table is full")]
	TableFull,
	/// No descriptor exists at the given path or fd.
	#[error("no such file or directory")]
	NotFound,
	/// The operation requires a directory but the descriptor is not one.
	#[error("not a directory")]
	NotADirectory,
	/// The operation forbids a directory but the descriptor is one.
	#[error("is a directory")]
	IsADirectory,
	/// `rmdir` was called on a directory containing entries other than `.` and `..`.
	#[error("directory not empty")]
	NotEmpty,
	/// `link` was asked to hard-link a directory, which `imgFS.c`'s
	/// `link_callback` rejects with `-EPERM` (distinct from `unlink`'s
	/// `EISDIR` on the same descriptor kind).
	#[error("operation not permitted")]
	Perm,
	/// A path component exceeds `MAX_FNAME_LEN - 1` bytes.
	#[error("file name too long")]
	NameTooLong,
	/// The argument given to the operation is malformed (bad path, `from == to`, ...).
	#[error("invalid argument")]
	InvalidArgument,
}

impl ImgError {
	/// Maps the error to the `errno` value a FUSE host binding would surface to
	/// the kernel, mirroring the error codes `imgFS.c`'s FUSE callbacks returned.
	pub fn errno(&self) -> i32 {
		match self {
			Self::Io(_) => libc::EIO,
			Self::NoSpace => libc::EOVERFLOW,
			Self::TableFull => libc::ENFILE,
			Self::NotFound => libc::ENOENT,
			Self::NotADirectory => libc::ENOTDIR,
			Self::IsADirectory => libc::EISDIR,
			Self::NotEmpty => libc::ENOTEMPTY,
			Self::Perm => libc::EPERM,
			Self::NameTooLong => libc::ENAMETOOLONG,
			Self::InvalidArgument => libc::EINVAL,
		}
	}
}
