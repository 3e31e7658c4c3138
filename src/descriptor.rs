//! Fixed-capacity descriptor table: allocation, lookup, deletion, iteration.

use crate::block::Link;
use crate::error::ImgError;
use crate::fat;
use crate::layout::Layout;
use crate::store;
use std::fs::File;

/// `fd_id(4) + type(1) + size(8) + nlink(4) + first_block(4) + occupied_blocks(4)`,
/// little-endian, no padding.
pub(crate) const DESCRIPTOR_LEN: usize = 25;

/// The kind of filesystem object a descriptor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
	/// A free slot in the descriptor table.
	Deleted,
	/// A regular file.
	Regular,
	/// A directory.
	Directory,
	/// A symbolic link.
	Symlink,
}

impl FileType {
	fn to_raw(self) -> u8 {
		match self {
			Self::Deleted => 0,
			Self::Regular => 1,
			Self::Directory => 2,
			Self::Symlink => 3,
		}
	}

	fn from_raw(v: u8) -> Self {
		match v {
			1 => Self::Regular,
			2 => Self::Directory,
			3 => Self::Symlink,
			_ => Self::Deleted,
		}
	}
}

/// An inode-like record in the descriptor region.
#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
	/// Position of this descriptor in the descriptor region.
	pub fd_id: u32,
	/// Kind of filesystem object.
	pub file_type: FileType,
	/// Logical byte length, for regular files and symlinks.
	pub size: u64,
	/// Number of non-tombstoned directory entries binding a name to this descriptor.
	pub nlink: u32,
	/// Head of the block chain, or `Link::End` if the chain is empty.
	pub(crate) first_block: Link,
	/// Cached length of the chain from `first_block`.
	pub occupied_blocks: u32,
}

impl FileDescriptor {
	fn encode(&self) -> [u8; DESCRIPTOR_LEN] {
		let mut buf = [0u8; DESCRIPTOR_LEN];
		buf[0..4].copy_from_slice(&self.fd_id.to_le_bytes());
		buf[4] = self.file_type.to_raw();
		buf[5..13].copy_from_slice(&self.size.to_le_bytes());
		buf[13..17].copy_from_slice(&self.nlink.to_le_bytes());
		buf[17..21].copy_from_slice(&self.first_block.to_raw().to_le_bytes());
		buf[21..25].copy_from_slice(&self.occupied_blocks.to_le_bytes());
		buf
	}

	// The stored `fd_id` is redundant with the slot index; the caller always
	// passes the slot actually read from, which takes precedence.
	fn decode(fd_id: u32, buf: &[u8; DESCRIPTOR_LEN]) -> Self {
		let file_type = FileType::from_raw(buf[4]);
		let size = u64::from_le_bytes(buf[5..13].try_into().unwrap());
		let nlink = u32::from_le_bytes(buf[13..17].try_into().unwrap());
		let first_block = Link::from_raw(i32::from_le_bytes(buf[17..21].try_into().unwrap()));
		let occupied_blocks = u32::from_le_bytes(buf[21..25].try_into().unwrap());
		Self {
			fd_id,
			file_type,
			size,
			nlink,
			first_block,
			occupied_blocks,
		}
	}
}

pub(crate) fn get_descriptor(
	file: &mut File,
	layout: &Layout,
	fd_id: u32,
) -> Result<FileDescriptor, ImgError> {
	let mut buf = [0u8; DESCRIPTOR_LEN];
	store::read_at(file, layout.descriptor_offset(fd_id), &mut buf)?;
	Ok(FileDescriptor::decode(fd_id, &buf))
}

pub(crate) fn save_descriptor(
	file: &mut File,
	layout: &Layout,
	descr: &FileDescriptor,
) -> Result<(), ImgError> {
	store::write_at(file, layout.descriptor_offset(descr.fd_id), &descr.encode())
}

/// Scans from slot 0, finds the first `Deleted` slot (the reuse policy is
/// lowest-index-first), allocates one data block for it, and persists it.
pub(crate) fn create_descriptor(
	file: &mut File,
	layout: &Layout,
	file_type: FileType,
) -> Result<FileDescriptor, ImgError> {
	let mut fd_id = 0u32;
	loop {
		if fd_id >= layout.max_files {
			log::warn!("descriptor table full ({} slots)", layout.max_files);
			return Err(ImgError::TableFull);
		}
		let slot = get_descriptor(file, layout, fd_id)?;
		if slot.file_type == FileType::Deleted {
			break;
		}
		fd_id += 1;
	}
	let mut descr = FileDescriptor {
		fd_id,
		file_type,
		size: 0,
		nlink: 0,
		first_block: Link::End,
		occupied_blocks: 0,
	};
	// Every new descriptor starts with one block, so `first_block != End` and
	// directory reads find a zero-filled block to start from.
	fat::append_block(file, layout, &mut descr)?;
	Ok(descr)
}

/// Tombstones every entry if `descr` is a directory, releases its block
/// chain, and marks the slot `Deleted`.
pub(crate) fn remove_descriptor(
	file: &mut File,
	layout: &Layout,
	descr: &mut FileDescriptor,
) -> Result<(), ImgError> {
	if descr.file_type == FileType::Directory {
		crate::dir::tombstone_all_entries(file, layout, descr)?;
	}
	fat::release_chain(file, layout, descr.first_block)?;
	descr.first_block = Link::End;
	descr.occupied_blocks = 0;
	descr.file_type = FileType::Deleted;
	save_descriptor(file, layout, descr)
}

/// Yields all non-`Deleted` descriptors in slot order.
pub(crate) fn iterate_descriptors(
	file: &mut File,
	layout: &Layout,
) -> Result<Vec<FileDescriptor>, ImgError> {
	let mut out = Vec::new();
	for fd_id in 0..layout.max_files {
		let descr = get_descriptor(file, layout, fd_id)?;
		if descr.file_type != FileType::Deleted {
			out.push(descr);
		}
	}
	Ok(out)
}
