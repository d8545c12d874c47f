//! Page allocation for the blocks of one heap.
//!
//! Blocks are packed into pages whose sizes can be expressed by [`PageFlags`]. The first page is
//! sized to fit the largest block. Later pages shrink while the remaining blocks still fit.
//! Whenever the resulting page counts overflow their bit fields the whole heap is laid out again
//! with pages twice as large.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    block::BlockId,
    error::{Error, Result},
    page_flags::{PageFlags, BUCKET_COUNT},
    types::{Heap, VirtualAddress},
};

/// Smallest size of the first page
pub const BASE_PAGE_SIZE: u64 = 0x2000;

/// Every block starts on a multiple of this
pub const ALIGN_SIZE: u64 = 16;

/// Largest page a [`PageFlags`] word can describe
pub const MAX_PAGE_SIZE: u64 = (0x200 << 0xF) << 8;

const LARGE_PAGE_WARNING: u64 = 256 * 1024 * 1024;

/// A block to be placed, with its length in bytes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LayoutBlock {
    pub id: BlockId,
    pub length: u64,
}

/// Result of laying out one heap
#[derive(Debug, Clone, PartialEq)]
pub struct HeapLayout {
    /// Heap offsets in placement order
    pub positions: Vec<(BlockId, u64)>,
    pub flags: PageFlags,
    /// Offset one past the last placed block, including its padding
    pub used: u64,
}

/// Final address of every block in a resource, parts included
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Layout {
    positions: HashMap<BlockId, VirtualAddress>,
}

impl Layout {
    pub fn assign(&mut self, id: BlockId, address: VirtualAddress) {
        self.positions.insert(id, address);
    }

    pub fn position(&self, id: BlockId) -> Option<VirtualAddress> {
        self.positions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn padding(position: u64) -> u64 {
    (ALIGN_SIZE - position % ALIGN_SIZE) % ALIGN_SIZE
}

/// Assigns a heap offset to every block and computes the page flags covering them
///
/// For the system heap the first block is the root and is always placed at offset 0.
pub fn assign_positions(blocks: &[LayoutBlock], heap: Heap) -> Result<HeapLayout> {
    if blocks.is_empty() {
        return Ok(HeapLayout {
            positions: Vec::new(),
            flags: PageFlags::default(),
            used: 0,
        });
    }

    let mut total = 0;
    let mut largest = 0;
    for block in blocks {
        total += block.length;
        total += padding(total);
        largest = largest.max(block.length);
    }

    let mut start_page_size = BASE_PAGE_SIZE;
    while start_page_size < largest {
        start_page_size *= 2;
    }

    let mut multiplier = 1;
    let mut warned = false;

    loop {
        if start_page_size > MAX_PAGE_SIZE {
            return Err(Error::Allocation(format!(
                "{} heap needs pages larger than {} bytes",
                heap, MAX_PAGE_SIZE
            )));
        }

        if start_page_size > LARGE_PAGE_WARNING && !warned {
            warn!(
                "{} heap is laid out with a {} byte first page",
                heap, start_page_size
            );
            warned = true;
        }

        let attempt = pack(blocks, heap, start_page_size, multiplier, total);
        if attempt.page_count == attempt.flags.count() as u64
            && attempt.flags.size() >= attempt.used
        {
            debug!(
                "laid out {} {} blocks: {}",
                blocks.len(),
                heap,
                attempt.flags
            );
            return Ok(HeapLayout {
                positions: attempt.positions,
                flags: attempt.flags,
                used: attempt.used,
            });
        }

        debug!(
            "{} pages of {} bytes do not fit their page flags, retrying",
            heap, start_page_size
        );
        start_page_size *= 2;
        multiplier *= 2;
    }
}

struct Attempt {
    positions: Vec<(BlockId, u64)>,
    flags: PageFlags,
    page_count: u64,
    used: u64,
}

fn take_best_block(blocks: &mut Vec<LayoutBlock>, space: i64) -> Option<LayoutBlock> {
    blocks
        .iter()
        .position(|block| block.length as i64 <= space)
        .map(|index| blocks.remove(index))
}

fn pack(
    blocks: &[LayoutBlock],
    heap: Heap,
    start_page_size: u64,
    multiplier: u64,
    total: u64,
) -> Attempt {
    let is_system = heap == Heap::System;

    let (mut root, mut remaining) = match blocks.split_first() {
        Some((root, rest)) if is_system => (Some(*root), rest.to_vec()),
        _ => (None, blocks.to_vec()),
    };
    remaining.sort_by(|a, b| b.length.cmp(&a.length));

    let target_page_size =
        (0x10000 * multiplier).max(start_page_size >> if is_system { 5 } else { 2 });
    let min_page_size = (0x200 * multiplier).max(target_page_size.min(start_page_size) >> 4);

    let mut base_shift = 0;
    let mut base_size = 0x200;
    while base_size < min_page_size {
        base_shift += 1;
        base_size *= 2;
        if base_shift >= 0xF {
            break;
        }
    }

    let base_size_max = base_size << 8;
    let mut index = 0;
    let mut test_size = start_page_size;
    while test_size < base_size_max {
        index += 1;
        test_size *= 2;
    }

    let mut counts = [0u32; BUCKET_COUNT];
    let mut page_count = 1;
    if let Some(count) = counts.get_mut(index) {
        *count = 1;
    } else {
        page_count = u64::MAX;
    }

    let mut positions = Vec::with_capacity(blocks.len());
    let mut position = 0;
    let mut page_size = start_page_size;
    let mut page_start = 0;
    let mut space = start_page_size as i64;
    let mut remainder = total as i64;

    while page_count != u64::MAX {
        let block = match root.take() {
            Some(root) => Some(root),
            None => take_best_block(&mut remaining, space),
        };

        if let Some(block) = block {
            positions.push((block.id, position));

            let start = position;
            position += block.length;
            position += padding(position);

            let used = (position - start) as i64;
            space -= used;
            remainder -= used;
        } else if let Some(biggest) = remaining.first().map(|block| block.length) {
            page_start += page_size;
            position = page_start;

            while biggest <= page_size >> 1 {
                if page_size <= min_page_size || index >= BUCKET_COUNT - 1 {
                    break;
                }
                if page_size <= target_page_size
                    && remainder >= (page_size - min_page_size) as i64
                {
                    break;
                }

                page_size >>= 1;
                index += 1;
            }

            space = page_size as i64;
            counts[index] += 1;
            page_count += 1;
        } else {
            break;
        }
    }

    Attempt {
        positions,
        flags: PageFlags::from_counts(counts, base_shift),
        page_count,
        used: position,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{assign_positions, LayoutBlock};
    use crate::{block::BlockId, error::Result, types::Heap};

    fn blocks(lengths: &[u64]) -> Vec<LayoutBlock> {
        lengths
            .iter()
            .enumerate()
            .map(|(index, length)| LayoutBlock {
                id: BlockId(index),
                length: *length,
            })
            .collect()
    }

    #[test]
    fn empty_heap() -> Result<()> {
        let layout = assign_positions(&[], Heap::Graphics)?;

        assert_eq!(layout.flags.value(), 0);
        assert!(layout.positions.is_empty());

        Ok(())
    }

    #[test]
    fn single_root_page() -> Result<()> {
        let layout = assign_positions(&blocks(&[8192]), Heap::System)?;

        assert_eq!(layout.flags.value(), 0x20000);
        assert_eq!(layout.positions, vec![(BlockId(0), 0)]);

        Ok(())
    }

    #[test]
    fn root_first_then_largest() -> Result<()> {
        let layout = assign_positions(&blocks(&[40, 8, 100, 24]), Heap::System)?;

        assert_eq!(
            layout.positions,
            vec![
                (BlockId(0), 0),
                (BlockId(2), 48),
                (BlockId(3), 160),
                (BlockId(1), 192),
            ]
        );
        assert_eq!(layout.used, 208);
        assert_eq!(layout.flags.count(), 1);

        Ok(())
    }

    #[test]
    fn graphics_heap_has_no_root() -> Result<()> {
        let layout = assign_positions(&blocks(&[16, 64, 32]), Heap::Graphics)?;

        assert_eq!(
            layout.positions,
            vec![(BlockId(1), 0), (BlockId(2), 64), (BlockId(0), 96)]
        );

        Ok(())
    }

    #[test]
    fn overflowing_blocks_open_new_pages() -> Result<()> {
        let layout = assign_positions(&blocks(&[0x2000, 0x2000, 0x1000]), Heap::System)?;

        assert_eq!(layout.flags.count(), layout.flags.pages().len() as u32);
        assert!(layout.flags.size() >= layout.used);

        let pages = layout.flags.pages();
        for (id, offset) in &layout.positions {
            let length = [0x2000, 0x2000, 0x1000][id.index()];
            assert!(
                pages
                    .iter()
                    .any(|page| *offset >= page.offset && offset + length <= page.offset + page.size),
                "block {} at {:#X} straddles a page boundary",
                id,
                offset
            );
        }

        Ok(())
    }

    #[test]
    fn stable_order_for_equal_lengths() -> Result<()> {
        let layout = assign_positions(&blocks(&[16, 32, 32, 32]), Heap::System)?;

        assert_eq!(
            layout.positions,
            vec![
                (BlockId(0), 0),
                (BlockId(1), 16),
                (BlockId(2), 48),
                (BlockId(3), 80),
            ]
        );

        Ok(())
    }
}
