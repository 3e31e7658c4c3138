//! Single-file disk image engine: a FAT-style block allocator, a fixed
//! descriptor table, and a directory/link layer over one preallocated image
//! file.
//!
//! [`Session`] is the entry point: `create_image`/`open_image` to start,
//! `close` to tear down, and the inherent methods in between map directly to
//! what a user-space filesystem host binding would dispatch path operations
//! into.

mod block;
mod descriptor;
mod dir;
mod direntry;
mod error;
mod fat;
mod file_io;
mod layout;
mod session;
mod store;

pub use descriptor::FileType;
pub use error::ImgError;
pub use layout::ImageParams;
pub use session::Attr;
pub use session::Session;
