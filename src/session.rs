//! Top-level session: image lifecycle and the operations a host binds against.

use crate::descriptor;
use crate::descriptor::FileDescriptor;
use crate::descriptor::FileType;
use crate::dir;
use crate::dir::DirIter;
use crate::error::ImgError;
use crate::fat;
use crate::file_io;
use crate::layout::ImageParams;
use crate::layout::Layout;
use crate::layout::read_superblock;
use crate::layout::write_superblock;
use crate::block::Link;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

/// Attributes surfaced by [`Session::getattr`].
#[derive(Debug, Clone, Copy)]
pub struct Attr {
	pub fd_id: u32,
	pub file_type: FileType,
	pub size: u64,
	pub nlink: u32,
}

/// An open handle to an image file plus its in-memory root descriptor, from
/// `create_image`/`open_image` to `close`.
pub struct Session {
	file: File,
	layout: Layout,
	root: FileDescriptor,
}

impl Session {
	/// Writes the superblock, zero-fills the image, initializes the FAT's free
	/// list, and creates the root directory (fd 0, `.` and `..` both resolving
	/// to itself).
	pub fn create_image(path: &Path, params: ImageParams) -> Result<Self, ImgError> {
		params.validate()?;
		let layout = Layout::compute(params);
		log::debug!(
			"creating image at {:?}: {} blocks, {} descriptor slots, first data block {}",
			path,
			layout.block_count,
			layout.max_files,
			layout.first_data_block
		);

		let mut file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;

		zero_fill(&mut file, layout.image_len)?;
		write_superblock(&mut file, &params)?;
		init_fat(&mut file, &layout)?;

		let mut root = descriptor::create_descriptor(&mut file, &layout, FileType::Directory)?;
		debug_assert_eq!(root.fd_id, 0, "root must occupy the first descriptor slot");
		dir::make_default_links(&mut file, &layout, &mut root, "/")?;

		Ok(Self { file, layout, root })
	}

	/// Reads the superblock, recomputes region offsets, and loads the root
	/// descriptor.
	pub fn open_image(path: &Path) -> Result<Self, ImgError> {
		let mut file = OpenOptions::new().read(true).write(true).open(path)?;
		let params = read_superblock(&mut file)?;
		let layout = Layout::compute(params);
		let root = descriptor::get_descriptor(&mut file, &layout, dir::ROOT_FD_ID)?;
		log::debug!("opened image at {:?}: {} blocks", path, layout.block_count);
		Ok(Self { file, layout, root })
	}

	/// Releases the backing store handle. Must be called exactly once per
	/// successful `open_image`/`create_image`; dropping a `Session` without
	/// calling `close` is not relied upon for correctness.
	pub fn close(self) -> Result<(), ImgError> {
		log::debug!("closing session, root nlink = {}", self.root.nlink);
		drop(self.file);
		Ok(())
	}

	fn resolve(&mut self, path: &str) -> Result<FileDescriptor, ImgError> {
		dir::resolve(&mut self.file, &self.layout, path)
	}

	/// Directory logical size is the byte offset of the terminating
	/// zero-sentinel entry, recomputed by scan rather than tracked in the
	/// descriptor record.
	fn directory_size(&mut self, descr: &FileDescriptor) -> Result<u64, ImgError> {
		let mut offset = 0u64;
		loop {
			let mut buf = [0u8; crate::direntry::DIRENTRY_LEN];
			let read = file_io::read_from(&mut self.file, &self.layout, descr, &mut buf, offset)?;
			if read < crate::direntry::DIRENTRY_LEN || crate::direntry::is_sentinel(&buf) {
				return Ok(offset);
			}
			offset += crate::direntry::DIRENTRY_LEN as u64;
		}
	}

	pub fn getattr(&mut self, path: &str) -> Result<Attr, ImgError> {
		let descr = self.resolve(path)?;
		let size = if descr.file_type == FileType::Directory {
			self.directory_size(&descr)?
		} else {
			descr.size
		};
		Ok(Attr {
			fd_id: descr.fd_id,
			file_type: descr.file_type,
			size,
			nlink: descr.nlink,
		})
	}

	/// Stateless: returns the descriptor's `fd_id`, not a per-open handle.
	pub fn open(&mut self, path: &str) -> Result<u32, ImgError> {
		Ok(self.resolve(path)?.fd_id)
	}

	pub fn readdir(&mut self, fd_id: u32) -> Result<Vec<(String, u32)>, ImgError> {
		let descr = descriptor::get_descriptor(&mut self.file, &self.layout, fd_id)?;
		if descr.file_type != FileType::Directory {
			return Err(ImgError::NotADirectory);
		}
		let mut iter = DirIter::new(fd_id);
		let mut out = Vec::new();
		while let Some(entry) = iter.next_raw(&mut self.file, &self.layout)? {
			out.push((entry.name().to_string(), entry.fd_id));
		}
		Ok(out)
	}

	pub fn read(&mut self, fd_id: u32, size: usize, offset: u64) -> Result<Vec<u8>, ImgError> {
		let descr = descriptor::get_descriptor(&mut self.file, &self.layout, fd_id)?;
		let mut buf = vec![0u8; size];
		let n = file_io::read_from(&mut self.file, &self.layout, &descr, &mut buf, offset)?;
		buf.truncate(n);
		Ok(buf)
	}

	/// Writes `data` at `offset`, extending the chain as needed, and rolls the
	/// resulting size into the descriptor (the underlying `file_io::write_to`
	/// primitive does not own logical length; this folds that accounting into
	/// the session so callers never see a stale `size`).
	pub fn write(&mut self, fd_id: u32, data: &[u8], offset: u64) -> Result<usize, ImgError> {
		let mut descr = descriptor::get_descriptor(&mut self.file, &self.layout, fd_id)?;
		if descr.file_type == FileType::Directory {
			return Err(ImgError::IsADirectory);
		}
		let n = file_io::write_to(&mut self.file, &self.layout, &mut descr, data, offset)?;
		let end = offset + n as u64;
		if n > 0 && end > descr.size {
			descr.size = end;
			descriptor::save_descriptor(&mut self.file, &self.layout, &descr)?;
		}
		if fd_id == self.root.fd_id {
			self.root = descr;
		}
		Ok(n)
	}

	pub fn truncate(&mut self, path: &str, new_size: u64) -> Result<(), ImgError> {
		let mut descr = self.resolve(path)?;
		if descr.file_type == FileType::Directory {
			return Err(ImgError::IsADirectory);
		}
		file_io::change_size(&mut self.file, &self.layout, &mut descr, new_size)?;
		if descr.fd_id == self.root.fd_id {
			self.root = descr;
		}
		Ok(())
	}

	fn create_named(&mut self, path: &str, file_type: FileType) -> Result<u32, ImgError> {
		let (parent_path, _) = dir::split_path(path)?;
		let parent = self.resolve(&parent_path)?;
		if parent.file_type != FileType::Directory {
			return Err(ImgError::NotADirectory);
		}
		let descr = descriptor::create_descriptor(&mut self.file, &self.layout, file_type)?;
		dir::make_link(&mut self.file, &self.layout, descr.fd_id, path)?;
		Ok(descr.fd_id)
	}

	/// Mirrors the original `create_callback`'s existence check: re-creating
	/// an already-resolvable path reuses its descriptor instead of linking a
	/// second entry and leaking a fresh descriptor and block.
	pub fn create(&mut self, path: &str) -> Result<u32, ImgError> {
		if let Ok(descr) = self.resolve(path) {
			return Ok(descr.fd_id);
		}
		self.create_named(path, FileType::Regular)
	}

	/// Creates the directory descriptor and installs its default `.`/`..`
	/// links and its own entry in the parent.
	pub fn mkdir(&mut self, path: &str) -> Result<u32, ImgError> {
		let (parent_path, _) = dir::split_path(path)?;
		let parent = self.resolve(&parent_path)?;
		if parent.file_type != FileType::Directory {
			return Err(ImgError::NotADirectory);
		}
		let mut descr = descriptor::create_descriptor(&mut self.file, &self.layout, FileType::Directory)?;
		dir::make_default_links(&mut self.file, &self.layout, &mut descr, path)?;
		Ok(descr.fd_id)
	}

	/// Stores `target` as the new symlink's content, including the trailing
	/// NUL (`imgFS.c`'s `symlink_callback` sizes and writes
	/// `strlen(to) + 1`, and `readlink` is expected to hand the terminator
	/// back too).
	pub fn symlink(&mut self, target: &str, link_path: &str) -> Result<u32, ImgError> {
		let fd_id = self.create_named(link_path, FileType::Symlink)?;
		let mut data = target.as_bytes().to_vec();
		data.push(0);
		self.write(fd_id, &data, 0)?;
		Ok(fd_id)
	}

	/// Returns the symlink's stored content as-is, NUL terminator included
	/// (`spec.md` §8 S5: `readlink("/ln")` returns `"/hi\0"`).
	pub fn readlink(&mut self, path: &str) -> Result<String, ImgError> {
		let descr = self.resolve(path)?;
		if descr.file_type != FileType::Symlink {
			return Err(ImgError::InvalidArgument);
		}
		let mut buf = vec![0u8; descr.size as usize];
		let n = file_io::read_from(&mut self.file, &self.layout, &descr, &mut buf, 0)?;
		buf.truncate(n);
		String::from_utf8(buf).map_err(|_| ImgError::InvalidArgument)
	}

	/// Hard-linking a directory is rejected the way `imgFS.c`'s
	/// `link_callback` rejects it (`-EPERM`), distinct from `unlink`'s
	/// `EISDIR` on the same descriptor kind.
	pub fn link(&mut self, from: &str, to: &str) -> Result<(), ImgError> {
		let descr = self.resolve(from)?;
		if descr.file_type == FileType::Directory {
			return Err(ImgError::Perm);
		}
		dir::make_link(&mut self.file, &self.layout, descr.fd_id, to)
	}

	pub fn unlink(&mut self, path: &str) -> Result<(), ImgError> {
		let descr = self.resolve(path)?;
		if descr.file_type == FileType::Directory {
			return Err(ImgError::IsADirectory);
		}
		dir::remove_link(&mut self.file, &self.layout, path)?;
		Ok(())
	}

	/// A directory is empty iff its only non-tombstoned entries are `.` and
	/// `..`. Tombstones every entry, then removes the descriptor itself
	/// (required even though `.` keeps `nlink` at 1 on its own, mirroring the
	/// reference host's explicit `removeDescriptor` call after `removeLink`).
	pub fn rmdir(&mut self, path: &str) -> Result<(), ImgError> {
		if path == "/" {
			return Err(ImgError::InvalidArgument);
		}
		let mut descr = self.resolve(path)?;
		if descr.file_type != FileType::Directory {
			return Err(ImgError::NotADirectory);
		}
		let mut iter = DirIter::new(descr.fd_id);
		let mut count = 0;
		while let Some(entry) = iter.next_raw(&mut self.file, &self.layout)? {
			if entry.name() != "." && entry.name() != ".." {
				count += 1;
			}
		}
		if count > 0 {
			return Err(ImgError::NotEmpty);
		}
		dir::remove_link(&mut self.file, &self.layout, path)?;
		descriptor::remove_descriptor(&mut self.file, &self.layout, &mut descr)?;
		Ok(())
	}

	/// `link(to); unlink(from)`. Rejects `from == to` up front, since applying
	/// those two steps literally would tombstone the entry it had just added.
	pub fn rename(&mut self, from: &str, to: &str) -> Result<(), ImgError> {
		if from == to {
			return Err(ImgError::InvalidArgument);
		}
		self.link(from, to)?;
		self.unlink(from)
	}
}

/// Zero-fills the first `len` bytes of `file`, growing it to that length.
/// Guarantees freshly allocated blocks read as all-zero (so a directory's
/// zero-sentinel holds naturally and uninitialized FAT cells read `0` until
/// `init_fat` overwrites them).
fn zero_fill(file: &mut File, len: u64) -> Result<(), ImgError> {
	file.set_len(len)?;
	Ok(())
}

/// Sets the free-list head to `first_data_block` and chains every block up to
/// `block_count - 1`, the last cell holding `Link::End`.
fn init_fat(file: &mut File, layout: &Layout) -> Result<(), ImgError> {
	if layout.first_data_block >= layout.block_count {
		fat::write_head(file, layout, Link::End)?;
		return Ok(());
	}
	fat::write_head(file, layout, Link::Block(layout.first_data_block))?;
	for block in layout.first_data_block..layout.block_count - 1 {
		fat::write_cell(file, layout, block, Link::Block(block + 1))?;
	}
	fat::write_cell(file, layout, layout.block_count - 1, Link::End)
}
