//! Half-open `[offset, offset + size)` intervals over device addresses.

use std::fmt;

/// Rounds `value` up to the next multiple of `alignment`.
///
/// An alignment of 0 or 1 leaves the value unchanged.
#[inline]
pub fn align_next(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// A contiguous byte range inside a memory block or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub offset: u64,
    pub size: u64,
}

impl Range {
    #[inline]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// One past the last byte.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True iff `size` bytes fit after aligning the start of this range.
    pub fn has_space_for(&self, size: u64, alignment: u64) -> bool {
        let start = align_next(self.offset, alignment);
        start <= self.end() && self.end() - start >= size
    }

    /// True iff the two ranges share at least one byte.
    pub fn overlaps(&self, other: &Range) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset < other.end()
            && other.offset < self.end()
    }

    /// True iff `other` lies entirely inside this range.
    pub fn contains(&self, other: &Range) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    #[inline]
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.end()
    }

    /// Free bytes between the end of this range and the start of `next`.
    #[inline]
    pub fn gap_to(&self, next: &Range) -> u64 {
        next.offset.saturating_sub(self.end())
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_next() {
        assert_eq!(align_next(0, 16), 0);
        assert_eq!(align_next(1, 16), 16);
        assert_eq!(align_next(16, 16), 16);
        assert_eq!(align_next(17, 16), 32);
        assert_eq!(align_next(100, 256), 256);
        assert_eq!(align_next(7, 3), 9);
        assert_eq!(align_next(42, 1), 42);
        assert_eq!(align_next(42, 0), 42);
    }

    #[test]
    fn test_align_next_idempotent() {
        for alignment in [1u64, 2, 3, 4, 7, 16, 64, 256, 1000, 4096] {
            for value in (0u64..5000).step_by(37) {
                let once = align_next(value, alignment);
                assert_eq!(align_next(once, alignment), once);
                assert_eq!(once % alignment, 0);
                assert!(once >= value);
                assert!(once - value < alignment);
            }
        }
    }

    #[test]
    fn test_has_space_for() {
        let range = Range::new(100, 200);
        assert!(range.has_space_for(200, 1));
        assert!(!range.has_space_for(201, 1));
        // aligned start is 128, leaving 172 bytes
        assert!(range.has_space_for(172, 64));
        assert!(!range.has_space_for(173, 64));
        // aligned start past the end
        assert!(!Range::new(1, 10).has_space_for(1, 64));
    }

    #[test]
    fn test_overlaps_and_contains() {
        let a = Range::new(0, 100);
        let b = Range::new(50, 100);
        let c = Range::new(100, 10);

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&Range::new(10, 0)));

        assert!(a.contains(&Range::new(10, 20)));
        assert!(a.contains(&a));
        assert!(!a.contains(&b));
        assert!(a.contains_offset(99));
        assert!(!a.contains_offset(100));
    }

    #[test]
    fn test_gap_to() {
        assert_eq!(Range::new(0, 100).gap_to(&Range::new(300, 100)), 200);
        assert_eq!(Range::new(0, 100).gap_to(&Range::new(100, 1)), 0);
        assert_eq!(Range::new(300, 100).to_string(), "[300, 400)");
    }
}
