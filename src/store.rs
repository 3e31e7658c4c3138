//! Positioned read/write of fixed-size records against the backing image file.

use crate::error::ImgError;
use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

/// Reads `buf.len()` bytes at `offset`. Fails with `ImgError::Io` on a short read.
pub(crate) fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<(), ImgError> {
	file.seek(SeekFrom::Start(offset))?;
	file.read_exact(buf)?;
	Ok(())
}

/// Writes `buf` at `offset`. Fails with `ImgError::Io` on a short write.
pub(crate) fn write_at(file: &mut File, offset: u64, buf: &[u8]) -> Result<(), ImgError> {
	file.seek(SeekFrom::Start(offset))?;
	file.write_all(buf)?;
	Ok(())
}
