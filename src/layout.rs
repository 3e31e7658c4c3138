//! Superblock and region layout.
//!
//! Three numbers persisted at offset 0 - `device_size`, `block_size`,
//! `max_files` - fully determine every other region offset in the image;
//! nothing else is stored redundantly, and `Layout::compute` is the single
//! place that recomputes them, on both `create_image` and `open_image`.

use crate::descriptor::DESCRIPTOR_LEN;
use crate::error::ImgError;
use crate::store;
use std::fs::File;

/// Byte width of the superblock record: `device_size: i64`, `block_size: i32`,
/// `max_files: i32`, little-endian, tightly packed.
pub(crate) const SUPERBLOCK_LEN: usize = 16;
/// Byte width of a single `BlockId` cell in the free-list head or the FAT.
pub(crate) const BLOCK_ID_LEN: u64 = 4;

/// The three values an image is parameterized by at creation time.
#[derive(Debug, Clone, Copy)]
pub struct ImageParams {
	/// Capacity of the data region, in bytes.
	pub device_size: u64,
	/// Size of a data block, in bytes.
	pub block_size: u32,
	/// Capacity of the descriptor table.
	pub max_files: u32,
}

impl ImageParams {
	pub(crate) fn validate(&self) -> Result<(), ImgError> {
		if self.block_size == 0 || self.max_files == 0 {
			return Err(ImgError::InvalidArgument);
		}
		if self.device_size < self.block_size as u64 {
			return Err(ImgError::InvalidArgument);
		}
		Ok(())
	}
}

/// Computed (never persisted) region offsets for an open image.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
	pub block_size: u32,
	pub max_files: u32,
	pub descriptors_offset: u64,
	pub fat_head_offset: u64,
	pub fat_offset: u64,
	pub data_offset: u64,
	/// `device_size / block_size`: the number of cells in the FAT, and the
	/// number of blocks in the data region.
	pub block_count: u32,
	/// Lowest block index whose byte range lies entirely at or beyond
	/// `data_offset`; the initial free list runs from here to `block_count - 1`.
	pub first_data_block: u32,
	/// Total size the backing file must have for every computed offset to be
	/// addressable.
	pub image_len: u64,
}

impl Layout {
	pub(crate) fn compute(params: ImageParams) -> Self {
		let descriptors_offset = SUPERBLOCK_LEN as u64;
		let fat_head_offset =
			descriptors_offset + params.max_files as u64 * DESCRIPTOR_LEN as u64;
		let fat_offset = fat_head_offset + BLOCK_ID_LEN;
		let block_count = (params.device_size / params.block_size as u64) as u32;
		let data_offset = fat_offset + block_count as u64 * BLOCK_ID_LEN;
		// The original C source computes this as
		// `dataOffset/blockSize + (dataOffset%blockSize) ? 1 : 0`, which due to
		// operator precedence does not round up; use an explicit ceiling.
		let first_data_block = data_offset.div_ceil(params.block_size as u64) as u32;
		let image_len = data_offset + block_count as u64 * params.block_size as u64;
		Self {
			block_size: params.block_size,
			max_files: params.max_files,
			descriptors_offset,
			fat_head_offset,
			fat_offset,
			data_offset,
			block_count,
			first_data_block,
			image_len,
		}
	}

	pub(crate) fn block_offset(&self, block: u32) -> u64 {
		self.data_offset + block as u64 * self.block_size as u64
	}

	pub(crate) fn fat_cell_offset(&self, block: u32) -> u64 {
		self.fat_offset + block as u64 * BLOCK_ID_LEN
	}

	pub(crate) fn descriptor_offset(&self, fd_id: u32) -> u64 {
		self.descriptors_offset + fd_id as u64 * DESCRIPTOR_LEN as u64
	}
}

pub(crate) fn write_superblock(file: &mut File, params: &ImageParams) -> Result<(), ImgError> {
	let mut buf = [0u8; SUPERBLOCK_LEN];
	buf[0..8].copy_from_slice(&(params.device_size as i64).to_le_bytes());
	buf[8..12].copy_from_slice(&(params.block_size as i32).to_le_bytes());
	buf[12..16].copy_from_slice(&(params.max_files as i32).to_le_bytes());
	store::write_at(file, 0, &buf)
}

pub(crate) fn read_superblock(file: &mut File) -> Result<ImageParams, ImgError> {
	let mut buf = [0u8; SUPERBLOCK_LEN];
	store::read_at(file, 0, &mut buf)?;
	let device_size = i64::from_le_bytes(buf[0..8].try_into().unwrap()) as u64;
	let block_size = i32::from_le_bytes(buf[8..12].try_into().unwrap()) as u32;
	let max_files = i32::from_le_bytes(buf[12..16].try_into().unwrap()) as u32;
	Ok(ImageParams {
		device_size,
		block_size,
		max_files,
	})
}
