use crate::{
    arena::{Address, Arena, FIRST_BLOCK},
    tag::{align_up, Tag, MIN_BLOCK_SIZE, WORD},
};

impl Arena {
    /// Allocates a block with room for at least `size` payload bytes and
    /// returns a token for it, or `None` when the request is zero, larger
    /// than the arena could ever satisfy, or no free block currently fits.
    /// A failed call leaves the block list untouched.
    ///
    /// Placement is best fit: the smallest free block that can hold the
    /// request wins. If the winner is larger than needed and the excess can
    /// stand on its own as a free block, it is split off; otherwise the
    /// whole block is handed out.
    pub fn alloc(&mut self, size: usize) -> Option<Address> {
        if size == 0 {
            return None;
        }

        let needed = size.checked_add(WORD)?;
        if needed > self.capacity() {
            return None;
        }

        // Header plus payload, rounded so the next header stays aligned.
        let total = align_up(needed);

        let (chosen, chosen_size) = self.find_best_fit(total)?;
        let prev_allocated = self.tag_at(chosen).prev_allocated();

        if chosen_size - total >= MIN_BLOCK_SIZE {
            // Split: the tail of the chosen block becomes a free block of
            // its own, sitting right after the allocation we're about to
            // hand out.
            let remainder = chosen_size - total;
            let split = chosen + total;
            self.set_tag_at(split, Tag::new(remainder, false, true));
            self.write_footer(split, remainder);
        } else {
            // Block sizes are multiples of 8 and so is `total`, so a
            // remainder too small to split can only be zero.
            debug_assert_eq!(chosen_size, total);

            let next = chosen + chosen_size;
            let next_tag = self.tag_at(next);
            if !next_tag.is_end() {
                self.set_tag_at(next, next_tag.with_prev_allocated(true));
            }
        }

        self.set_tag_at(chosen, Tag::new(total, true, prev_allocated));

        Some(Address::from_raw(chosen + WORD))
    }

    /// Scans the block list for the free block best suited to hold `total`
    /// bytes and returns its header offset and size.
    ///
    /// The tie-break is part of the allocator's observable contract: a
    /// candidate replaces the current best only when it is *strictly*
    /// smaller, so among equally sized blocks the lowest address wins. The
    /// scan stops early the moment some candidate matches `total` exactly,
    /// since nothing can beat it.
    fn find_best_fit(&self, total: usize) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;

        let mut current = FIRST_BLOCK;
        let mut tag = self.tag_at(current);

        while !tag.is_end() {
            if !tag.is_allocated() && tag.size() >= total {
                match best {
                    Some((_, best_size)) if tag.size() >= best_size => {}
                    _ => best = Some((current, tag.size())),
                }
            }

            if best.is_some_and(|(_, best_size)| best_size == total) {
                break;
            }

            current += tag.size();
            tag = self.tag_at(current);
        }

        best
    }
}
