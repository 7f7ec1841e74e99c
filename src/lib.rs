//! Best-fit allocator over a single fixed-size arena.
//!
//! One contiguous region is obtained from the operating system at init time
//! and never grows afterwards. Blocks are delimited with boundary tags (a
//! tagged size header on every block, a raw size footer on free blocks),
//! placement is best fit, and freed blocks stay fragmented until the caller
//! explicitly asks for a coalescing pass. Start reading at [`crate::tag`],
//! then [`Arena`], which documents the in-memory layout.
//!
//! ```rust
//! use fitalloc::Arena;
//!
//! let mut arena = Arena::init(4096).unwrap();
//!
//! let address = arena.alloc(100).unwrap();
//! arena.payload_mut(address).unwrap().fill(42);
//!
//! arena.free(address).unwrap();
//! arena.coalesce();
//! ```
//!
//! For the classic one-heap-per-process setup see [`crate::global`].

use std::ptr::NonNull;

mod arena;
mod bestfit;
mod coalesce;
mod dealloc;
mod diagnostics;
mod platform;
mod tag;

pub mod global;

/// Non-null pointer to `T`. We use this instead of `*mut T` where absence
/// is meaningful, so the compiler forces us to handle the `None` case.
pub(crate) type Pointer<T> = Option<NonNull<T>>;

pub use arena::{Address, Arena, InitError};
pub use dealloc::FreeError;
pub use diagnostics::{BlockInfo, Blocks, Stats};
