use std::{error, fmt, ptr::NonNull};

use crate::{
    platform,
    tag::{Tag, WORD},
};

/// Offset of the first block header. The mapping we get from the platform is
/// page aligned, so by placing the first header one word past the start
/// every payload ends up aligned to 8 bytes. The word before the first
/// header is padding and never touched.
pub(crate) const FIRST_BLOCK: usize = WORD;

/// A single fixed-size heap managed with boundary tags. The arena obtains
/// one contiguous region from [`crate::platform`] at construction time and
/// never grows or shrinks it afterwards. All bookkeeping lives inside the
/// region itself, encoded as [`Tag`] words:
///
/// ```text
/// base                                                       base + mapped
///  |                                                                    |
///  v                                                                    v
///  +---------+--------+~~~~~~~~~~~+--------+~~~~~~~~+--------+ ... +----+
///  | padding | header |  payload  | header | payload / footer |     | 1 |
///  +---------+--------+~~~~~~~~~~~+--------+~~~~~~~~+--------+ ... +----+
///   4 bytes    block 1 (allocated)  block 2 (free)              sentinel
/// ```
///
/// The block list is contiguous and gapless: adding a block's size to its
/// header offset yields the next header, and the last block is followed by
/// the end sentinel, a reserved tag of raw value 1 written once at init.
/// Free blocks repeat their size in a footer occupying their last word,
/// which is what lets the coalescer walk backwards. Allocated blocks have
/// no footer, those bytes belong to the caller.
///
/// Unlike a classic `malloc` style allocator this one never touches the
/// block list behind the caller's back: [`Arena::free`] only marks blocks
/// and merging is deferred until [`Arena::coalesce`] is invoked explicitly.
///
/// The arena is an explicit value, not a hidden process global, so callers
/// decide its lifetime and synchronization (the core itself is single
/// threaded). A process-wide instance with an init-once guard is available
/// in [`crate::global`]. Internally no raw pointers escape: callers hold
/// opaque [`Address`] tokens which are validated against the arena bounds
/// on every call.
pub struct Arena {
    /// Start of the mapped region.
    base: NonNull<u8>,
    /// Length of the mapped region in bytes. Multiple of the page size.
    mapped: usize,
}

// The arena has exclusive ownership of its mapping and hands out offsets
// instead of pointers, so moving it across threads is fine and shared
// references only permit reads.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

/// Opaque handle to an allocated payload, returned by [`Arena::alloc`] and
/// consumed by [`Arena::free`] and the payload accessors. Internally it is
/// the byte offset from the arena base to the first payload byte, one word
/// past the block header.
///
/// Only values produced by [`Arena::alloc`] refer to live blocks. The raw
/// escape hatches exist for companion diagnostic tooling that records and
/// replays offsets; a forged token is rejected by validation or, if it
/// points into the middle of some payload, stopped by the arena bounds
/// checks instead of corrupting memory silently.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Address(usize);

impl Address {
    /// Token for a raw byte offset. See the type level docs before using
    /// this for anything other than tooling interop.
    #[inline]
    pub fn from_raw(offset: usize) -> Self {
        Address(offset)
    }

    /// Byte offset from the arena base.
    #[inline]
    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Ways in which establishing an arena can fail. Returned by
/// [`Arena::init`] and [`crate::global::init`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InitError {
    /// Requested region size is zero or cannot be encoded in a block header
    /// once rounded up to the page size.
    InvalidSize,
    /// The process-wide arena was already established by a previous call.
    /// Only produced by [`crate::global::init`].
    AlreadyInitialized,
    /// The platform refused to hand us the backing region.
    MappingFailure,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::InvalidSize => write!(f, "requested region size is not valid"),
            InitError::AlreadyInitialized => write!(f, "arena was already initialized"),
            InitError::MappingFailure => write!(f, "platform could not map the backing region"),
        }
    }
}

impl error::Error for InitError {}

impl Arena {
    /// Establishes a new arena of at least `region_size` bytes.
    ///
    /// The size is rounded up to the next multiple of the platform page
    /// size and that many zero-initialized bytes are requested from the
    /// kernel. On success the region holds exactly one free block spanning
    /// everything between the leading padding word and the end sentinel.
    ///
    /// The first block's previous-allocated bit is set even though there is
    /// no previous block: a non-existent neighbor must never look like a
    /// coalescing target.
    pub fn init(region_size: usize) -> Result<Self, InitError> {
        if region_size == 0 {
            return Err(InitError::InvalidSize);
        }

        let page = platform::page_size();
        let mapped = region_size
            .checked_add(page - 1)
            .ok_or(InitError::InvalidSize)?
            / page
            * page;

        if mapped - 2 * WORD > Tag::MAX_SIZE {
            return Err(InitError::InvalidSize);
        }

        let Some(base) = (unsafe { platform::request_memory(mapped) }) else {
            return Err(InitError::MappingFailure);
        };

        let mut arena = Arena { base, mapped };
        let capacity = arena.capacity();

        arena.set_tag_at(FIRST_BLOCK, Tag::new(capacity, false, true));
        arena.write_footer(FIRST_BLOCK, capacity);
        arena.set_tag_at(arena.sentinel(), Tag::END);

        Ok(arena)
    }

    /// Total usable bytes managed by this arena, block headers included.
    /// This is the mapped length minus the padding word and the sentinel.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mapped - 2 * WORD
    }

    /// Offset of the end sentinel, one word past the last usable byte.
    #[inline]
    pub(crate) fn sentinel(&self) -> usize {
        self.mapped - WORD
    }

    /// Read-only view of the payload of an allocated block. `None` if the
    /// token doesn't refer to a live allocation.
    pub fn payload(&self, address: Address) -> Option<&[u8]> {
        let header = self.allocated_header_of(address).ok()?;
        let length = self.tag_at(header).size() - WORD;

        unsafe {
            Some(std::slice::from_raw_parts(
                self.base.as_ptr().add(address.as_raw()),
                length,
            ))
        }
    }

    /// Mutable view of the payload of an allocated block. This is the only
    /// way to write user data into the arena, since [`Arena::alloc`] hands
    /// out offset tokens rather than pointers.
    pub fn payload_mut(&mut self, address: Address) -> Option<&mut [u8]> {
        let header = self.allocated_header_of(address).ok()?;
        let length = self.tag_at(header).size() - WORD;

        unsafe {
            Some(std::slice::from_raw_parts_mut(
                self.base.as_ptr().add(address.as_raw()),
                length,
            ))
        }
    }

    /// Reads the boundary tag stored at `offset`.
    #[inline]
    pub(crate) fn tag_at(&self, offset: usize) -> Tag {
        Tag::from_bits(self.word_at(offset))
    }

    /// Writes a boundary tag at `offset`.
    #[inline]
    pub(crate) fn set_tag_at(&mut self, offset: usize, tag: Tag) {
        self.set_word_at(offset, tag.bits());
    }

    /// Writes the footer of the free block whose header lives at `header`.
    /// Footers hold the raw size with both flag bits zero.
    #[inline]
    pub(crate) fn write_footer(&mut self, header: usize, size: usize) {
        self.set_word_at(header + size - WORD, size as u32);
    }

    /// Raw size stored in the footer right before `header`. Only meaningful
    /// when the previous block is known to be free.
    #[inline]
    pub(crate) fn footer_size_before(&self, header: usize) -> usize {
        self.word_at(header - WORD) as usize
    }

    /// All word accesses funnel through here and [`Self::set_word_at`], so
    /// a corrupted size can never make a traversal escape the mapping. The
    /// offsets we compute from our own invariants always pass this check.
    #[inline]
    fn word_at(&self, offset: usize) -> u32 {
        self.check_bounds(offset);
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().read() }
    }

    #[inline]
    fn set_word_at(&mut self, offset: usize, word: u32) {
        self.check_bounds(offset);
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().write(word) }
    }

    #[inline]
    fn check_bounds(&self, offset: usize) {
        assert!(
            offset % WORD == 0 && offset + WORD <= self.mapped,
            "offset {offset} escapes the arena (mapped length {})",
            self.mapped,
        );
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { platform::return_memory(self.base, self.mapped) }
    }
}
