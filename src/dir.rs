//! Directory content, name lookup, link-count maintenance, path resolution.
//!
//! A directory is a regular file whose content is a sequence of
//! [`DirEntry`](crate::direntry) records, terminated by the first record
//! whose first name byte is the zero sentinel. Records whose first byte is
//! the tombstone marker are logically deleted and skipped.

use crate::descriptor;
use crate::descriptor::FileDescriptor;
use crate::descriptor::FileType;
use crate::direntry::DIRENTRY_LEN;
use crate::direntry::DirEntry;
use crate::direntry::MAX_FNAME_LEN;
use crate::direntry::is_sentinel;
use crate::direntry::is_tombstone;
use crate::direntry::tombstone_record;
use crate::error::ImgError;
use crate::file_io;
use crate::layout::Layout;
use std::fs::File;

/// The root directory's fixed descriptor slot.
pub(crate) const ROOT_FD_ID: u32 = 0;

/// An explicit cursor over a directory's entry stream, replacing the
/// original `getEntryFrom(dirDescrOrNull, ...)` contract's hidden static
/// state with an owned offset the caller threads through itself.
#[derive(Debug, Clone)]
pub(crate) struct DirIter {
	dir_fd_id: u32,
	offset: u64,
}

impl DirIter {
	pub(crate) fn new(dir_fd_id: u32) -> Self {
		Self {
			dir_fd_id,
			offset: 0,
		}
	}

	/// Advances past tombstoned records and returns the next live entry, or
	/// `None` once the zero sentinel is reached.
	pub(crate) fn next_raw(
		&mut self,
		file: &mut File,
		layout: &Layout,
	) -> Result<Option<DirEntry>, ImgError> {
		let descr = descriptor::get_descriptor(file, layout, self.dir_fd_id)?;
		loop {
			let mut buf = [0u8; DIRENTRY_LEN];
			let read = file_io::read_from(file, layout, &descr, &mut buf, self.offset)?;
			if read < DIRENTRY_LEN || is_sentinel(&buf) {
				return Ok(None);
			}
			self.offset += DIRENTRY_LEN as u64;
			if is_tombstone(&buf) {
				continue;
			}
			return Ok(Some(DirEntry::decode(&buf)));
		}
	}
}

/// Tombstones every entry of a directory about to be removed.
pub(crate) fn tombstone_all_entries(
	file: &mut File,
	layout: &Layout,
	dir: &mut FileDescriptor,
) -> Result<(), ImgError> {
	let mut offset = 0u64;
	loop {
		let mut buf = [0u8; DIRENTRY_LEN];
		let read = file_io::read_from(file, layout, dir, &mut buf, offset)?;
		if read < DIRENTRY_LEN || is_sentinel(&buf) {
			break;
		}
		if !is_tombstone(&buf) {
			file_io::write_to(file, layout, dir, &tombstone_record(), offset)?;
		}
		offset += DIRENTRY_LEN as u64;
	}
	Ok(())
}

/// Finds the first overwritable slot (a tombstoned entry or the stream's
/// end), writes `entry` there, and increments `nlink` on its target.
pub(crate) fn append_entry(
	file: &mut File,
	layout: &Layout,
	dir: &mut FileDescriptor,
	entry: &DirEntry,
) -> Result<(), ImgError> {
	let mut offset = 0u64;
	loop {
		let mut buf = [0u8; DIRENTRY_LEN];
		let read = file_io::read_from(file, layout, dir, &mut buf, offset)?;
		if read < DIRENTRY_LEN || is_tombstone(&buf) || is_sentinel(&buf) {
			break;
		}
		offset += DIRENTRY_LEN as u64;
	}
	let written = file_io::write_to(file, layout, dir, &entry.encode(), offset)?;
	if written < DIRENTRY_LEN {
		return Err(ImgError::NoSpace);
	}
	if entry.fd_id == dir.fd_id {
		// Target is the directory being written to itself (e.g. `.`); mutate
		// the in-memory copy directly so the write_to above's own
		// append_block-driven saves don't clobber this increment or vice versa.
		dir.nlink += 1;
		descriptor::save_descriptor(file, layout, dir)?;
	} else {
		let mut target = descriptor::get_descriptor(file, layout, entry.fd_id)?;
		target.nlink += 1;
		descriptor::save_descriptor(file, layout, &target)?;
	}
	Ok(())
}

/// Linear scan for a non-tombstoned entry named `name`. Returns its target
/// fd and byte offset.
pub(crate) fn find_entry(
	file: &mut File,
	layout: &Layout,
	dir: &FileDescriptor,
	name: &str,
) -> Result<Option<(u32, u64)>, ImgError> {
	let mut offset = 0u64;
	loop {
		let mut buf = [0u8; DIRENTRY_LEN];
		let read = file_io::read_from(file, layout, dir, &mut buf, offset)?;
		if read < DIRENTRY_LEN || is_sentinel(&buf) {
			return Ok(None);
		}
		if !is_tombstone(&buf) {
			let entry = DirEntry::decode(&buf);
			if entry.name() == name {
				return Ok(Some((entry.fd_id, offset)));
			}
		}
		offset += DIRENTRY_LEN as u64;
	}
}

/// Tombstones the entry named `name`, decrements `nlink` on its target, and
/// removes the target descriptor if `nlink` reaches zero.
pub(crate) fn delete_entry(
	file: &mut File,
	layout: &Layout,
	dir: &mut FileDescriptor,
	name: &str,
) -> Result<Option<u32>, ImgError> {
	let Some((fd_id, offset)) = find_entry(file, layout, dir, name)? else {
		return Ok(None);
	};
	file_io::write_to(file, layout, dir, &tombstone_record(), offset)?;
	if fd_id == dir.fd_id {
		dir.nlink = dir.nlink.saturating_sub(1);
		if dir.nlink == 0 {
			descriptor::remove_descriptor(file, layout, dir)?;
		} else {
			descriptor::save_descriptor(file, layout, dir)?;
		}
	} else {
		let mut target = descriptor::get_descriptor(file, layout, fd_id)?;
		target.nlink = target.nlink.saturating_sub(1);
		if target.nlink == 0 {
			descriptor::remove_descriptor(file, layout, &mut target)?;
		} else {
			descriptor::save_descriptor(file, layout, &target)?;
		}
	}
	Ok(Some(fd_id))
}

/// The last `/` separates the parent path from the leaf name. Rejects
/// relative paths, `"/"`, and names longer than `MAX_FNAME_LEN - 1` bytes.
pub(crate) fn split_path(path: &str) -> Result<(String, String), ImgError> {
	if !path.starts_with('/') || path == "/" {
		return Err(ImgError::InvalidArgument);
	}
	let idx = path.rfind('/').unwrap();
	let parent = if idx == 0 {
		"/".to_string()
	} else {
		path[..idx].to_string()
	};
	let name = path[idx + 1..].to_string();
	if name.is_empty() || name.len() >= MAX_FNAME_LEN {
		return Err(ImgError::NameTooLong);
	}
	Ok((parent, name))
}

/// Resolves an absolute path to its descriptor. Symlinks are not followed;
/// the caller decides whether to. `"/"` always resolves to the root
/// descriptor (fd 0).
pub(crate) fn resolve(
	file: &mut File,
	layout: &Layout,
	path: &str,
) -> Result<FileDescriptor, ImgError> {
	if path == "/" {
		return descriptor::get_descriptor(file, layout, ROOT_FD_ID);
	}
	if !path.starts_with('/') {
		return Err(ImgError::InvalidArgument);
	}
	let mut current = descriptor::get_descriptor(file, layout, ROOT_FD_ID)?;
	let mut components = path.split('/').filter(|s| !s.is_empty()).peekable();
	while let Some(name) = components.next() {
		if name.len() >= MAX_FNAME_LEN {
			return Err(ImgError::NameTooLong);
		}
		let Some((fd_id, _)) = find_entry(file, layout, &current, name)? else {
			return Err(ImgError::NotFound);
		};
		let next = descriptor::get_descriptor(file, layout, fd_id)?;
		if components.peek().is_some() && next.file_type != FileType::Directory {
			return Err(ImgError::NotADirectory);
		}
		current = next;
	}
	Ok(current)
}

/// Writes `.` pointing to `dir`'s own fd. For the root (`path == "/"`), also
/// writes `..` pointing to itself; otherwise resolves the parent, writes
/// `..` pointing to it, and writes `dir`'s own entry into the parent by its
/// trailing path component.
pub(crate) fn make_default_links(
	file: &mut File,
	layout: &Layout,
	dir: &mut FileDescriptor,
	path: &str,
) -> Result<(), ImgError> {
	if dir.file_type != FileType::Directory {
		return Err(ImgError::NotADirectory);
	}
	let dot = DirEntry::new(".", dir.fd_id)?;
	append_entry(file, layout, dir, &dot)?;
	if path == "/" {
		let dotdot = DirEntry::new("..", dir.fd_id)?;
		append_entry(file, layout, dir, &dotdot)?;
	} else {
		let (parent_path, name) = split_path(path)?;
		let mut parent = resolve(file, layout, &parent_path)?;
		if parent.file_type != FileType::Directory {
			return Err(ImgError::NotADirectory);
		}
		let dotdot = DirEntry::new("..", parent.fd_id)?;
		append_entry(file, layout, dir, &dotdot)?;
		let self_entry = DirEntry::new(&name, dir.fd_id)?;
		append_entry(file, layout, &mut parent, &self_entry)?;
	}
	Ok(())
}

/// Splits `absolute_path` into `(parent, name)`, resolves the parent by
/// path, and appends `(name -> target_fd_id)` there.
pub(crate) fn make_link(
	file: &mut File,
	layout: &Layout,
	target_fd_id: u32,
	absolute_path: &str,
) -> Result<(), ImgError> {
	let (parent_path, name) = split_path(absolute_path)?;
	let mut parent = resolve(file, layout, &parent_path)?;
	if parent.file_type != FileType::Directory {
		return Err(ImgError::NotADirectory);
	}
	let entry = DirEntry::new(&name, target_fd_id)?;
	append_entry(file, layout, &mut parent, &entry)
}

/// Splits `absolute_path` and tombstones the matching entry in its parent.
pub(crate) fn remove_link(
	file: &mut File,
	layout: &Layout,
	absolute_path: &str,
) -> Result<Option<u32>, ImgError> {
	let (parent_path, name) = split_path(absolute_path)?;
	let mut parent = resolve(file, layout, &parent_path)?;
	if parent.file_type != FileType::Directory {
		return Err(ImgError::NotADirectory);
	}
	delete_entry(file, layout, &mut parent, &name)
}
