use std::{error, fmt};

use crate::{
    arena::{Address, Arena, FIRST_BLOCK},
    tag::{ALIGNMENT, WORD},
};

/// Ways in which [`Arena::free`] can reject a token. The checks run in the
/// order the variants are declared here and nothing is written to the arena
/// until all of them pass, so a failed call never changes any state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FreeError {
    /// Null token, or an offset that is not aligned to 8 bytes and
    /// therefore cannot be a payload we handed out.
    InvalidPointer,
    /// Offset outside the usable region of the arena.
    OutOfRange,
    /// The block behind the token is not currently allocated.
    DoubleFree,
}

impl fmt::Display for FreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeError::InvalidPointer => write!(f, "token is null or misaligned"),
            FreeError::OutOfRange => write!(f, "token points outside the arena"),
            FreeError::DoubleFree => write!(f, "block is already free"),
        }
    }
}

impl error::Error for FreeError {}

impl Arena {
    /// Releases the block behind `address`, previously returned by
    /// [`Arena::alloc`].
    ///
    /// This only does the O(1) bookkeeping: the block's allocated bit is
    /// cleared, its footer is written and the following block learns that
    /// its neighbor is free now. The block is *not* merged with adjacent
    /// free blocks; that cost is amortized and paid only when the caller
    /// decides to run [`Arena::coalesce`].
    ///
    /// # Panics
    ///
    /// A forged token that points into the middle of a live payload can
    /// pass validation and make us read a garbage size. The bounds checks
    /// on every word access stop such a traversal from escaping the arena,
    /// at the price of a panic. Tokens returned by [`Arena::alloc`] never
    /// panic.
    pub fn free(&mut self, address: Address) -> Result<(), FreeError> {
        let header = self.allocated_header_of(address)?;
        let tag = self.tag_at(header);
        let size = tag.size();

        self.set_tag_at(header, tag.with_allocated(false));
        self.write_footer(header, size);

        let next = header + size;
        let next_tag = self.tag_at(next);
        if !next_tag.is_end() {
            self.set_tag_at(next, next_tag.with_prev_allocated(false));
        }

        Ok(())
    }

    /// Validates `address` and resolves it to the offset of its block
    /// header. Shared by [`Arena::free`] and the payload accessors.
    pub(crate) fn allocated_header_of(&self, address: Address) -> Result<usize, FreeError> {
        let offset = address.as_raw();

        if offset == 0 {
            return Err(FreeError::InvalidPointer);
        }

        if offset % ALIGNMENT != 0 {
            return Err(FreeError::InvalidPointer);
        }

        // Payloads live between the first header and the sentinel.
        if offset < FIRST_BLOCK + WORD || offset >= self.sentinel() {
            return Err(FreeError::OutOfRange);
        }

        let header = offset - WORD;
        if !self.tag_at(header).is_allocated() {
            return Err(FreeError::DoubleFree);
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_updates_boundary_tags() {
        let mut arena = Arena::init(4096).unwrap();
        let first = arena.alloc(28).unwrap();
        let second = arena.alloc(28).unwrap();

        arena.free(first).unwrap();

        let header = first.as_raw() - WORD;
        let tag = arena.tag_at(header);
        assert!(!tag.is_allocated());
        assert!(tag.prev_allocated());
        assert_eq!(tag.size(), 32);

        // Footer written in the last word of the freed block.
        assert_eq!(arena.footer_size_before(second.as_raw() - WORD), 32);

        // The next block knows its neighbor is free now.
        assert!(!arena.tag_at(second.as_raw() - WORD).prev_allocated());
    }

    #[test]
    fn free_does_not_merge() {
        let mut arena = Arena::init(4096).unwrap();
        let first = arena.alloc(28).unwrap();
        let second = arena.alloc(28).unwrap();

        arena.free(first).unwrap();
        arena.free(second).unwrap();

        // Two standalone free blocks plus the initial remainder. Merging is
        // coalesce's job, not ours.
        assert_eq!(arena.blocks().filter(|block| !block.allocated).count(), 3);
    }

    #[test]
    fn null_and_misaligned_tokens() {
        let mut arena = Arena::init(4096).unwrap();
        let address = arena.alloc(28).unwrap();

        assert_eq!(
            arena.free(Address::from_raw(0)),
            Err(FreeError::InvalidPointer)
        );
        assert_eq!(
            arena.free(Address::from_raw(address.as_raw() + WORD)),
            Err(FreeError::InvalidPointer)
        );

        // The real token still works afterwards.
        assert_eq!(arena.free(address), Ok(()));
    }

    #[test]
    fn out_of_range_tokens() {
        let mut arena = Arena::init(4096).unwrap();

        let past_the_end = arena.sentinel() + WORD;
        assert_eq!(
            arena.free(Address::from_raw(past_the_end)),
            Err(FreeError::OutOfRange)
        );
        assert_eq!(
            arena.free(Address::from_raw(past_the_end * 2)),
            Err(FreeError::OutOfRange)
        );
    }

    #[test]
    fn double_free_is_rejected_and_changes_nothing() {
        let mut arena = Arena::init(4096).unwrap();
        let address = arena.alloc(100).unwrap();
        let survivor = arena.alloc(100).unwrap();

        arena.free(address).unwrap();

        let before = arena.stats();
        assert_eq!(arena.free(address), Err(FreeError::DoubleFree));
        assert_eq!(arena.stats(), before);

        // The other allocation is untouched.
        assert!(arena.tag_at(survivor.as_raw() - WORD).is_allocated());
    }
}
