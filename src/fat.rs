//! Free-block management via the singly-linked allocation table.
//!
//! FAT cell `i` means: if `i` is in use, `cell[i]` is the next block of its
//! chain (or `End`); if `i` is free, `cell[i]` is the next free block. The
//! single head cell at `fat_head_offset` points to the first free block.

use crate::block::Link;
use crate::descriptor::FileDescriptor;
use crate::descriptor::save_descriptor;
use crate::error::ImgError;
use crate::layout::Layout;
use crate::store;
use std::fs::File;

fn read_raw(file: &mut File, offset: u64) -> Result<Link, ImgError> {
	let mut buf = [0u8; 4];
	store::read_at(file, offset, &mut buf)?;
	Ok(Link::from_raw(i32::from_le_bytes(buf)))
}

fn write_raw(file: &mut File, offset: u64, link: Link) -> Result<(), ImgError> {
	store::write_at(file, offset, &link.to_raw().to_le_bytes())
}

pub(crate) fn read_head(file: &mut File, layout: &Layout) -> Result<Link, ImgError> {
	read_raw(file, layout.fat_head_offset)
}

pub(crate) fn write_head(file: &mut File, layout: &Layout, link: Link) -> Result<(), ImgError> {
	write_raw(file, layout.fat_head_offset, link)
}

pub(crate) fn read_cell(file: &mut File, layout: &Layout, block: u32) -> Result<Link, ImgError> {
	read_raw(file, layout.fat_cell_offset(block))
}

pub(crate) fn write_cell(
	file: &mut File,
	layout: &Layout,
	block: u32,
	link: Link,
) -> Result<(), ImgError> {
	write_raw(file, layout.fat_cell_offset(block), link)
}

/// Pops the head of the free list. `NoSpace` if the free list is empty.
pub(crate) fn allocate_block(file: &mut File, layout: &Layout) -> Result<u32, ImgError> {
	let Link::Block(block) = read_head(file, layout)? else {
		log::warn!("allocator exhausted: no free blocks");
		return Err(ImgError::NoSpace);
	};
	let next_free = read_cell(file, layout, block)?;
	write_cell(file, layout, block, Link::End)?;
	write_head(file, layout, next_free)?;
	Ok(block)
}

/// LIFO-splices `start`'s chain onto the front of the free list. A no-op if
/// `start` is `Link::End`.
pub(crate) fn release_chain(file: &mut File, layout: &Layout, start: Link) -> Result<(), ImgError> {
	let Link::Block(start_block) = start else {
		return Ok(());
	};
	let old_head = read_head(file, layout)?;
	write_head(file, layout, start)?;
	let mut tail = start_block;
	while let Link::Block(next) = read_cell(file, layout, tail)? {
		tail = next;
	}
	write_cell(file, layout, tail, old_head)
}

/// Allocates a block, splices it onto the tail of `descr`'s chain (or sets
/// `first_block` directly if the chain was empty), zero-fills its data range,
/// and persists `descr`.
pub(crate) fn append_block(
	file: &mut File,
	layout: &Layout,
	descr: &mut FileDescriptor,
) -> Result<u32, ImgError> {
	let block = allocate_block(file, layout)?;
	match descr.first_block {
		Link::End => descr.first_block = Link::Block(block),
		Link::Block(head) => {
			let mut tail = head;
			while let Link::Block(next) = read_cell(file, layout, tail)? {
				tail = next;
			}
			write_cell(file, layout, tail, Link::Block(block))?;
		}
	}
	let zeros = vec![0u8; layout.block_size as usize];
	store::write_at(file, layout.block_offset(block), &zeros)?;
	descr.occupied_blocks += 1;
	save_descriptor(file, layout, descr)?;
	Ok(block)
}

/// Removes the last `n` blocks from `descr`'s chain tail.
pub(crate) fn truncate_blocks(
	file: &mut File,
	layout: &Layout,
	descr: &mut FileDescriptor,
	n: u32,
) -> Result<(), ImgError> {
	if n == 0 {
		return Ok(());
	}
	if n >= descr.occupied_blocks {
		release_chain(file, layout, descr.first_block)?;
		descr.first_block = Link::End;
		descr.occupied_blocks = 0;
	} else {
		let new_tail_index = descr.occupied_blocks - n - 1;
		let Link::Block(new_tail) = nth_in_chain(file, layout, descr.first_block, new_tail_index)?
		else {
			unreachable!("occupied_blocks is out of sync with the chain length");
		};
		let sub_chain_head = read_cell(file, layout, new_tail)?;
		write_cell(file, layout, new_tail, Link::End)?;
		release_chain(file, layout, sub_chain_head)?;
		descr.occupied_blocks -= n;
	}
	save_descriptor(file, layout, descr)
}

pub(crate) fn chain_length(file: &mut File, layout: &Layout, start: Link) -> Result<u32, ImgError> {
	let mut n = 0;
	let mut cur = start;
	while let Link::Block(b) = cur {
		n += 1;
		cur = read_cell(file, layout, b)?;
	}
	Ok(n)
}

pub(crate) fn collect_chain(
	file: &mut File,
	layout: &Layout,
	start: Link,
) -> Result<Vec<u32>, ImgError> {
	let mut out = Vec::new();
	let mut cur = start;
	while let Link::Block(b) = cur {
		out.push(b);
		cur = read_cell(file, layout, b)?;
	}
	Ok(out)
}

/// O(k): walks `k` links forward from `start`.
pub(crate) fn nth_in_chain(
	file: &mut File,
	layout: &Layout,
	start: Link,
	k: u32,
) -> Result<Link, ImgError> {
	let mut cur = start;
	for _ in 0..k {
		match cur {
			Link::Block(b) => cur = read_cell(file, layout, b)?,
			Link::End => return Ok(Link::End),
		}
	}
	Ok(cur)
}

pub(crate) fn free_count(file: &mut File, layout: &Layout) -> Result<u32, ImgError> {
	chain_length(file, layout, read_head(file, layout)?)
}
