//! The `BlockId` sentinel, modeled as a sum type at the API boundary.
//!
//! On disk a block reference is a raw `i32`, `-1` meaning "no block" (either
//! end-of-chain or end-of-free-list). [`Link`] keeps that persisted
//! representation at the edges (`to_raw`/`from_raw`) while every other layer
//! works with the sum type instead of checking a magic number.

/// A reference to a block, or the absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
	/// References the data block with the given index.
	Block(u32),
	/// End of chain / end of free list / "no block".
	End,
}

impl Link {
	pub(crate) fn to_raw(self) -> i32 {
		match self {
			Self::Block(b) => b as i32,
			Self::End => -1,
		}
	}

	pub(crate) fn from_raw(v: i32) -> Self {
		if v < 0 {
			Self::End
		} else {
			Self::Block(v as u32)
		}
	}
}
