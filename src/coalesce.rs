use crate::{
    arena::{Arena, FIRST_BLOCK},
    tag::Tag,
};

impl Arena {
    /// Merges every run of adjacent free blocks into a single block.
    ///
    /// [`Arena::free`] deliberately leaves freed blocks standalone, so the
    /// list accumulates fragmentation until the caller decides to pay for
    /// a coalescing pass. One pass is enough: forward merges re-examine the
    /// grown block before advancing, so three or more consecutive free
    /// blocks collapse in a single visit, and blocks whose predecessor is
    /// free are folded backwards through the predecessor's footer.
    ///
    /// Calling this at any time is safe and idempotent. When it returns, no
    /// two adjacent blocks in the list are both free.
    pub fn coalesce(&mut self) {
        let mut current = FIRST_BLOCK;
        let mut tag = self.tag_at(current);

        while !tag.is_end() {
            let mut size = tag.size();

            if !tag.is_allocated() {
                // Absorb the whole run of free blocks ahead of us.
                loop {
                    let next_tag = self.tag_at(current + size);
                    if next_tag.is_end() || next_tag.is_allocated() {
                        break;
                    }
                    size += next_tag.size();
                }

                if size != tag.size() {
                    tag = Tag::new(size, false, tag.prev_allocated());
                    self.set_tag_at(current, tag);
                    self.write_footer(current, size);
                }

                // If the block before us is free too, grow it over us. Its
                // footer tells us where its header is.
                if !tag.prev_allocated() {
                    let prev_size = self.footer_size_before(current);
                    let prev = current - prev_size;
                    let prev_tag = self.tag_at(prev);

                    size += prev_size;
                    self.set_tag_at(prev, Tag::new(size, false, prev_tag.prev_allocated()));
                    self.write_footer(prev, size);

                    // Continue the scan from the merged result.
                    current = prev;
                }
            }

            current += size;
            tag = self.tag_at(current);
        }

        debug_assert!(
            self.no_adjacent_free_blocks(),
            "coalesce left two adjacent free blocks in the list",
        );
    }

    /// Walks the block list checking the coalescer's postcondition.
    pub(crate) fn no_adjacent_free_blocks(&self) -> bool {
        let mut previous_free = false;

        let mut current = FIRST_BLOCK;
        let mut tag = self.tag_at(current);

        while !tag.is_end() {
            if !tag.is_allocated() && previous_free {
                return false;
            }
            previous_free = !tag.is_allocated();

            current += tag.size();
            tag = self.tag_at(current);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::BlockInfo;

    #[test]
    fn free_everything_collapses_to_one_block() {
        let mut arena = Arena::init(4096).unwrap();
        let capacity = arena.capacity();

        let mut addresses = Vec::new();
        for size in [100, 50, 200, 8, 1000] {
            addresses.push(arena.alloc(size).unwrap());
        }

        // Free in an order that exercises both merge directions.
        for address in [2, 0, 4, 1, 3].map(|i| addresses[i]) {
            arena.free(address).unwrap();
        }

        arena.coalesce();

        let blocks: Vec<BlockInfo> = arena.blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].allocated);
        assert_eq!(blocks[0].size, capacity);

        // The spanning block's footer is back in place as well.
        assert_eq!(arena.footer_size_before(arena.sentinel()), capacity);
    }

    #[test]
    fn runs_of_free_blocks_collapse_in_one_pass() {
        let mut arena = Arena::init(4096).unwrap();

        // [a][b][c][guard][tail], then free a, b and c so the pass meets
        // three consecutive free blocks followed by an allocated one.
        let a = arena.alloc(28).unwrap();
        let b = arena.alloc(60).unwrap();
        let c = arena.alloc(124).unwrap();
        let guard = arena.alloc(28).unwrap();

        arena.free(a).unwrap();
        arena.free(b).unwrap();
        arena.free(c).unwrap();

        arena.coalesce();

        let first = arena.tag_at(a.as_raw() - 4);
        assert!(!first.is_allocated());
        assert_eq!(first.size(), 32 + 64 + 128);

        // The run's merged footer sits right before the guard block.
        assert_eq!(arena.footer_size_before(guard.as_raw() - 4), 32 + 64 + 128);
        assert!(!arena.tag_at(guard.as_raw() - 4).prev_allocated());
    }

    #[test]
    fn adjacent_pair_merges_into_the_earlier_block() {
        let mut arena = Arena::init(4096).unwrap();

        let a = arena.alloc(28).unwrap();
        let b = arena.alloc(28).unwrap();
        let guard = arena.alloc(28).unwrap();

        arena.free(a).unwrap();
        arena.free(b).unwrap();

        arena.coalesce();

        let merged = arena.tag_at(a.as_raw() - 4);
        assert!(!merged.is_allocated());
        assert_eq!(merged.size(), 64);
        assert!(arena.tag_at(guard.as_raw() - 4).is_allocated());
    }

    #[test]
    fn coalescing_is_idempotent() {
        let mut arena = Arena::init(4096).unwrap();

        let addresses: Vec<_> = (0..6).map(|_| arena.alloc(40).unwrap()).collect();
        for address in addresses.iter().step_by(2) {
            arena.free(*address).unwrap();
        }

        arena.coalesce();
        let first_pass: Vec<BlockInfo> = arena.blocks().collect();

        arena.coalesce();
        let second_pass: Vec<BlockInfo> = arena.blocks().collect();

        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn no_adjacent_free_blocks_after_any_pattern() {
        let mut arena = Arena::init(4096).unwrap();

        let addresses: Vec<_> = (1..20).map(|i| arena.alloc(i * 8).unwrap()).collect();
        for (i, address) in addresses.iter().enumerate() {
            if i % 3 != 0 {
                arena.free(*address).unwrap();
            }
        }

        arena.coalesce();
        assert!(arena.no_adjacent_free_blocks());

        // Freeing the survivors and coalescing again goes back to a single
        // spanning block.
        for (i, address) in addresses.iter().enumerate() {
            if i % 3 == 0 {
                arena.free(*address).unwrap();
            }
        }
        arena.coalesce();

        assert_eq!(arena.blocks().count(), 1);
        assert_eq!(arena.stats().free, arena.capacity());
    }

    #[test]
    fn allocated_blocks_survive_coalescing() {
        let mut arena = Arena::init(4096).unwrap();

        let keep = arena.alloc(64).unwrap();
        let drop = arena.alloc(64).unwrap();

        arena.payload_mut(keep).unwrap().fill(42);
        arena.free(drop).unwrap();
        arena.coalesce();

        assert!(arena.payload(keep).unwrap().iter().all(|byte| *byte == 42));
    }
}
