//! Read-only visibility into the block list. Nothing here participates in
//! allocation decisions, it exists so operators (and tests) can see what
//! the arena looks like without poking at boundary tags themselves.

use std::fmt;

use crate::arena::{Arena, FIRST_BLOCK};

/// Snapshot of one block, as yielded by [`Arena::blocks`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockInfo {
    /// Position in the list, starting at 1 like the companion tooling
    /// numbers its rows.
    pub index: usize,
    /// Offset of the block header from the arena base.
    pub offset: usize,
    /// Block size in bytes, header included.
    pub size: usize,
    pub allocated: bool,
    pub prev_allocated: bool,
}

/// Iterator over the block list, first block to sentinel. See
/// [`Arena::blocks`].
pub struct Blocks<'a> {
    arena: &'a Arena,
    offset: usize,
    index: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let tag = self.arena.tag_at(self.offset);
        if tag.is_end() {
            return None;
        }

        self.index += 1;
        let info = BlockInfo {
            index: self.index,
            offset: self.offset,
            size: tag.size(),
            allocated: tag.is_allocated(),
            prev_allocated: tag.prev_allocated(),
        };
        self.offset += tag.size();

        Some(info)
    }
}

/// Aggregate byte counts over the block list. Sizes include headers, so
/// `used + free` always equals [`Arena::capacity`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Stats {
    /// Bytes sitting in allocated blocks.
    pub used: usize,
    /// Bytes sitting in free blocks.
    pub free: usize,
}

impl Stats {
    pub fn total(&self) -> usize {
        self.used + self.free
    }
}

impl Arena {
    /// Walks the block list read-only, yielding one [`BlockInfo`] per block
    /// until the sentinel.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            arena: self,
            offset: FIRST_BLOCK,
            index: 0,
        }
    }

    /// Aggregate used and free byte counts.
    pub fn stats(&self) -> Stats {
        let mut stats = Stats { used: 0, free: 0 };

        for block in self.blocks() {
            if block.allocated {
                stats.used += block.size;
            } else {
                stats.free += block.size;
            }
        }

        stats
    }
}

/// Renders the block list as a table, one row per block, the same shape the
/// original diagnostic tool prints:
///
/// ```text
/// ------------------------- Memory Block -------------------------
/// No.     Current Previous        begin           end             Size
/// 1       ALLOC   ALLOC           0x00000004      0x0000006b      104
/// 2       FREE    ALLOC           0x0000006c      0x00000ff7      3984
/// ```
impl fmt::Display for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str =
            "---------------------------------------------------------------------------------";

        fn status(allocated: bool) -> &'static str {
            if allocated {
                "ALLOC"
            } else {
                "FREE "
            }
        }

        writeln!(f, "--------------------------------- Memory Block ----------------------------------")?;
        writeln!(f, "No.\tCurrent\tPrevious\tbegin_address\t\tend_address\t\tSize")?;
        writeln!(f, "{RULE}")?;

        for block in self.blocks() {
            writeln!(
                f,
                "{}\t{}\t{}\t0x{:08x}\t0x{:08x}\t{:4}",
                block.index,
                status(block.allocated),
                status(block.prev_allocated),
                block.offset,
                block.offset + block.size - 1,
                block.size,
            )?;
        }

        let stats = self.stats();
        writeln!(f, "{RULE}")?;
        writeln!(f, "Used size = {:4}", stats.used)?;
        writeln!(f, "Free size = {:4}", stats.free)?;
        writeln!(f, "Total size      = {:4}", stats.total())?;
        writeln!(f, "{RULE}")
    }
}
