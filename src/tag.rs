/// Header and footer size in bytes. Every block starts with a 4 byte header
/// and every *free* block also ends with a 4 byte footer. Allocated blocks
/// don't have footers, their last bytes belong to the user.
pub(crate) const WORD: usize = 4;

/// Block sizes are always multiples of 8, which also guarantees that payloads
/// are aligned to 8 bytes because headers are 4 bytes long and the first
/// header is written 4 bytes past a page aligned address.
pub(crate) const ALIGNMENT: usize = 8;

/// Smallest block we can represent: header plus footer with no payload at
/// all. Split remainders below this size cannot exist in the list, they are
/// absorbed into the allocated block instead.
pub(crate) const MIN_BLOCK_SIZE: usize = ALIGNMENT;

/// Rounds `size` up to the next multiple of [`ALIGNMENT`].
#[inline]
pub(crate) fn align_up(size: usize) -> usize {
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Boundary tag stored in block headers and footers. The entire block list
/// is encoded with this single `u32`:
///
/// ```text
/// +-----------------------------------+-------+-------+
/// |  size (multiple of 8, bits 31..2) | bit 1 | bit 0 |
/// +-----------------------------------+-------+-------+
///                                         |       |
///              previous block allocated --+       +-- this block allocated
/// ```
///
/// Since sizes are multiples of 8 the two low bits of the size are always
/// zero, so we can use them for the flags and still recover the exact size
/// by masking them off. Footers of free blocks store the raw size with both
/// flag bits zero, which lets us jump backwards to the previous header
/// without any out of band index.
///
/// The end of the arena is marked with the reserved raw value 1. No real
/// block can ever produce it because real sizes are non-zero multiples of 8,
/// so a tag of 1 would decode as "size 0, allocated". Every traversal stops
/// when it reads this value.
///
/// All bit manipulation in the crate lives here. Other modules read and
/// write sizes and flags only through these accessors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Tag(u32);

impl Tag {
    /// Bit 0. Set when the block is currently allocated.
    const ALLOCATED: u32 = 0b01;

    /// Bit 1. Set when the block right before this one is allocated.
    const PREV_ALLOCATED: u32 = 0b10;

    /// End of arena marker, written once at init and never touched again.
    pub const END: Tag = Tag(1);

    /// Largest size a header can encode.
    pub const MAX_SIZE: usize = (u32::MAX & !(Self::ALLOCATED | Self::PREV_ALLOCATED)) as usize;

    /// Encodes `size` and the two status bits into a tag. `size` must
    /// already be a multiple of [`ALIGNMENT`], we never round here.
    pub fn new(size: usize, allocated: bool, prev_allocated: bool) -> Self {
        debug_assert!(size % ALIGNMENT == 0, "unaligned block size: {size}");
        debug_assert!(size <= Self::MAX_SIZE);

        let mut bits = size as u32;
        if allocated {
            bits |= Self::ALLOCATED;
        }
        if prev_allocated {
            bits |= Self::PREV_ALLOCATED;
        }

        Tag(bits)
    }

    /// Reinterprets a raw header value read from the arena.
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        Tag(bits)
    }

    /// Raw value as it is stored in the arena.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Block size in bytes, including the header itself. Masking the two
    /// flag bits off recovers the exact size because of [`ALIGNMENT`].
    #[inline]
    pub fn size(self) -> usize {
        (self.0 & !(Self::ALLOCATED | Self::PREV_ALLOCATED)) as usize
    }

    #[inline]
    pub fn is_allocated(self) -> bool {
        self.0 & Self::ALLOCATED != 0
    }

    #[inline]
    pub fn prev_allocated(self) -> bool {
        self.0 & Self::PREV_ALLOCATED != 0
    }

    #[inline]
    pub fn is_end(self) -> bool {
        self.0 == Self::END.0
    }

    /// Same tag with the allocated bit forced to `allocated`.
    #[inline]
    pub fn with_allocated(self, allocated: bool) -> Self {
        Tag::new(self.size(), allocated, self.prev_allocated())
    }

    /// Same tag with the previous-allocated bit forced to `prev_allocated`.
    #[inline]
    pub fn with_prev_allocated(self, prev_allocated: bool) -> Self {
        Tag::new(self.size(), self.is_allocated(), prev_allocated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_status_bits() {
        // A 24 byte block in all four states. Free with free previous block
        // encodes as the plain size, each flag adds its bit on top.
        assert_eq!(Tag::new(24, false, false).bits(), 24);
        assert_eq!(Tag::new(24, false, true).bits(), 26);
        assert_eq!(Tag::new(24, true, false).bits(), 25);
        assert_eq!(Tag::new(24, true, true).bits(), 27);
    }

    #[test]
    fn decode_recovers_exact_size() {
        for size in (8..=256).step_by(8) {
            for (allocated, prev) in [(false, false), (false, true), (true, false), (true, true)] {
                let tag = Tag::new(size, allocated, prev);
                assert_eq!(tag.size(), size);
                assert_eq!(tag.is_allocated(), allocated);
                assert_eq!(tag.prev_allocated(), prev);
            }
        }
    }

    #[test]
    fn end_marker_is_unambiguous() {
        assert!(Tag::END.is_end());
        assert!(!Tag::new(8, false, false).is_end());
        // The closest real encodings to the marker value.
        assert!(!Tag::new(8, true, false).is_end());
        assert!(!Tag::from_bits(Tag::new(0, true, false).bits() + 8).is_end());
    }

    #[test]
    fn flag_updates_preserve_size() {
        let tag = Tag::new(64, true, true);
        assert_eq!(tag.with_allocated(false).bits(), 66);
        assert_eq!(tag.with_allocated(false).with_prev_allocated(false).bits(), 64);
        assert_eq!(tag.with_prev_allocated(true).bits(), 67);
    }

    #[test]
    fn alignment_round_up() {
        assert_eq!(align_up(1), 8);
        assert_eq!(align_up(8), 8);
        assert_eq!(align_up(104), 104);
        assert_eq!(align_up(100 + WORD), 104);
        assert_eq!(align_up(50 + WORD), 56);
    }
}
