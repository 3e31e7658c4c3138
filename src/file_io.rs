//! Maps logical file offsets to `(block, in-block offset)`, extending chains
//! on demand.
//!
//! Every segment here is driven off an explicit `offset + bytes_done`
//! position rather than a cursor that advances "to the next block" before
//! the final segment is written - the latter is what makes the original
//! `writeTo` double-skip a block under some size/offset combinations.

use crate::block::Link;
use crate::descriptor::FileDescriptor;
use crate::descriptor::save_descriptor;
use crate::error::ImgError;
use crate::fat;
use crate::layout::Layout;
use crate::store;
use std::fs::File;

/// Reads into `buf`, starting at `offset`. Returns the number of bytes read;
/// `0` if `offset + buf.len()` would touch a block beyond `occupied_blocks`
/// (partial reads past EOF are not supported - the caller must pre-check size).
pub(crate) fn read_from(
	file: &mut File,
	layout: &Layout,
	descr: &FileDescriptor,
	buf: &mut [u8],
	offset: u64,
) -> Result<usize, ImgError> {
	let size = buf.len();
	if size == 0 {
		return Ok(0);
	}
	let block_size = layout.block_size as u64;
	let last_block_index = ((offset + size as u64 - 1) / block_size) as u32;
	if last_block_index >= descr.occupied_blocks {
		return Ok(0);
	}

	let start_block_index = (offset / block_size) as u32;
	let mut block = match fat::nth_in_chain(file, layout, descr.first_block, start_block_index)? {
		Link::Block(b) => b,
		Link::End => return Ok(0),
	};
	let mut cur_block_index = start_block_index;

	let mut done = 0usize;
	while done < size {
		let cur_offset = offset + done as u64;
		let wanted_block_index = (cur_offset / block_size) as u32;
		if wanted_block_index != cur_block_index {
			let steps = wanted_block_index - cur_block_index;
			match fat::nth_in_chain(file, layout, Link::Block(block), steps)? {
				Link::Block(b) => block = b,
				Link::End => return Ok(done),
			}
			cur_block_index = wanted_block_index;
		}
		let in_block_offset = (cur_offset % block_size) as u32;
		let chunk = ((layout.block_size - in_block_offset) as usize).min(size - done);
		store::read_at(
			file,
			layout.block_offset(block) + in_block_offset as u64,
			&mut buf[done..done + chunk],
		)?;
		done += chunk;
	}
	Ok(done)
}

/// Writes `buf` starting at `offset`, extending the chain as needed. Returns
/// the number of bytes written; `0` (without touching the file) if the
/// extension required exceeds the free block count.
pub(crate) fn write_to(
	file: &mut File,
	layout: &Layout,
	descr: &mut FileDescriptor,
	buf: &[u8],
	offset: u64,
) -> Result<usize, ImgError> {
	let size = buf.len();
	if size == 0 {
		return Ok(0);
	}
	let block_size = layout.block_size as u64;
	let last_block_index = ((offset + size as u64 - 1) / block_size) as u32;
	let needed_blocks = last_block_index + 1;
	let additional = needed_blocks.saturating_sub(descr.occupied_blocks);

	if additional > 0 {
		let free = fat::free_count(file, layout)?;
		if additional > free {
			return Ok(0);
		}
		for _ in 0..additional {
			fat::append_block(file, layout, descr)?;
		}
	}

	let start_block_index = (offset / block_size) as u32;
	let mut block = match fat::nth_in_chain(file, layout, descr.first_block, start_block_index)? {
		Link::Block(b) => b,
		Link::End => unreachable!("chain shorter than the length just ensured"),
	};
	let mut cur_block_index = start_block_index;

	let mut done = 0usize;
	while done < size {
		let cur_offset = offset + done as u64;
		let wanted_block_index = (cur_offset / block_size) as u32;
		if wanted_block_index != cur_block_index {
			let steps = wanted_block_index - cur_block_index;
			match fat::nth_in_chain(file, layout, Link::Block(block), steps)? {
				Link::Block(b) => block = b,
				Link::End => unreachable!("chain shorter than the length just ensured"),
			}
			cur_block_index = wanted_block_index;
		}
		let in_block_offset = (cur_offset % block_size) as u32;
		let chunk = ((layout.block_size - in_block_offset) as usize).min(size - done);
		store::write_at(
			file,
			layout.block_offset(block) + in_block_offset as u64,
			&buf[done..done + chunk],
		)?;
		done += chunk;
	}
	Ok(done)
}

/// Grows or shrinks `descr`'s chain to `ceil(new_size / block_size)` blocks.
/// On a grow that completes in full, the logical size becomes exactly
/// `new_size`. If the allocator runs out of space partway, the logical size
/// instead reflects only the whole blocks actually added, capped at
/// `new_size`. Returns the signed delta between the old and new logical
/// size. Always persists `descr`.
pub(crate) fn change_size(
	file: &mut File,
	layout: &Layout,
	descr: &mut FileDescriptor,
	new_size: u64,
) -> Result<i64, ImgError> {
	let block_size = layout.block_size as u64;
	let new_blocks = new_size.div_ceil(block_size) as u32;
	let old_size = descr.size;

	if new_size < old_size {
		let delta_blocks = descr.occupied_blocks.saturating_sub(new_blocks);
		fat::truncate_blocks(file, layout, descr, delta_blocks)?;
		descr.size = new_size;
		save_descriptor(file, layout, descr)?;
		Ok(new_size as i64 - old_size as i64)
	} else if new_size > old_size {
		let delta_blocks = new_blocks.saturating_sub(descr.occupied_blocks);
		let mut added = 0u32;
		for _ in 0..delta_blocks {
			match fat::append_block(file, layout, descr) {
				Ok(_) => added += 1,
				Err(ImgError::NoSpace) => break,
				Err(e) => return Err(e),
			}
		}
		descr.size = if added == delta_blocks {
			new_size
		} else {
			(old_size + added as u64 * block_size).min(new_size)
		};
		save_descriptor(file, layout, descr)?;
		Ok(descr.size as i64 - old_size as i64)
	} else {
		Ok(0)
	}
}
