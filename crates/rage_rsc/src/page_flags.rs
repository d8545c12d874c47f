//! Packed description of a heap's page layout.
//!
//! | Bits  | Meaning                               |
//! |-------|---------------------------------------|
//! | 0-3   | base shift, base size = `0x200 << n`  |
//! | 4     | pages of `base << 8`                  |
//! | 5-6   | pages of `base << 7`                  |
//! | 7-10  | pages of `base << 6`                  |
//! | 11-16 | pages of `base << 5`                  |
//! | 17-23 | pages of `base << 4`                  |
//! | 24    | pages of `base << 3`                  |
//! | 25    | pages of `base << 2`                  |
//! | 26    | pages of `base << 1`                  |
//! | 27    | pages of `base`                       |
//! | 28-31 | version tag                           |

use std::fmt;

/// Number of page size buckets
pub const BUCKET_COUNT: usize = 9;

const BUCKET_SHIFTS: [u32; BUCKET_COUNT] = [4, 5, 7, 11, 17, 24, 25, 26, 27];
const BUCKET_MASKS: [u32; BUCKET_COUNT] = [0x1, 0x3, 0xF, 0x3F, 0x7F, 0x1, 0x1, 0x1, 0x1];

/// A single page described by a [`PageFlags`] word
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Page {
    /// Offset of the page from the start of the heap
    pub offset: u64,
    pub size: u64,
}

/// Bit-packed page layout of one heap
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PageFlags(u32);

impl PageFlags {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Packs page counts and a base shift, masking every field to its bit width
    pub fn from_counts(counts: [u32; BUCKET_COUNT], base_shift: u32) -> Self {
        let value = counts
            .iter()
            .zip(BUCKET_SHIFTS.iter().zip(BUCKET_MASKS.iter()))
            .fold(base_shift & 0xF, |value, (count, (shift, mask))| {
                value | ((count & mask) << shift)
            });

        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns a copy with bits 28-31 replaced by `tag`
    pub const fn with_version_tag(self, tag: u32) -> Self {
        Self((self.0 & 0x0FFF_FFFF) | ((tag & 0xF) << 28))
    }

    pub const fn version_tag(self) -> u32 {
        self.0 >> 28
    }

    /// Combines the tags of a system and graphics word back into a resource version
    pub fn version_from_tags(system: PageFlags, graphics: PageFlags) -> i32 {
        ((system.version_tag() << 4) | graphics.version_tag()) as i32
    }

    pub const fn base_shift(self) -> u32 {
        self.0 & 0xF
    }

    pub const fn base_size(self) -> u64 {
        0x200 << self.base_shift()
    }

    /// Page counts for each bucket, largest pages first
    pub fn page_counts(self) -> [u32; BUCKET_COUNT] {
        let mut counts = [0; BUCKET_COUNT];
        for (index, count) in counts.iter_mut().enumerate() {
            *count = (self.0 >> BUCKET_SHIFTS[index]) & BUCKET_MASKS[index];
        }
        counts
    }

    /// Page size of each bucket
    pub fn base_sizes(self) -> [u64; BUCKET_COUNT] {
        let base_size = self.base_size();
        let mut sizes = [0; BUCKET_COUNT];
        for (index, size) in sizes.iter_mut().enumerate() {
            *size = base_size << (8 - index);
        }
        sizes
    }

    /// Total number of pages
    pub fn count(self) -> u32 {
        self.page_counts().iter().sum()
    }

    /// Total number of bytes covered by all pages
    pub fn size(self) -> u64 {
        self.page_counts()
            .iter()
            .zip(self.base_sizes())
            .map(|(count, size)| *count as u64 * size)
            .sum()
    }

    /// Every page in heap order, largest buckets first
    pub fn pages(self) -> Vec<Page> {
        let mut pages = Vec::with_capacity(self.count() as usize);
        let mut offset = 0;

        for (count, size) in self.page_counts().into_iter().zip(self.base_sizes()) {
            for _ in 0..count {
                pages.push(Page { offset, size });
                offset += size;
            }
        }

        pages
    }
}

impl From<u32> for PageFlags {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for PageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Size: {}, Pages: {}", self.size(), self.count())
    }
}
