//! Ordered, non-overlapping range bookkeeping shared by memory blocks and buffers.
//!
//! Both allocation tiers (bindings inside a device-memory block, sub-buffers
//! inside a buffer) keep their occupied ranges in a [`RangeList`] and search it
//! first-fit, low to high. The largest free gap is rescanned in O(n) after every
//! mutation; entry counts per container stay small in practice.

use super::range::{Range, align_next};

/// One occupied range and whoever occupies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEntry<T> {
    pub range: Range,
    pub owner: T,
}

/// Sorted list of occupied ranges inside a container of fixed capacity.
#[derive(Debug, Clone)]
pub struct RangeList<T> {
    capacity: u64,
    entries: Vec<RangeEntry<T>>,
    used: u64,
    largest_free: u64,
}

impl<T> RangeList<T> {
    /// Creates an empty list spanning `capacity` bytes.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
            used: 0,
            largest_free: capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Occupied entries in ascending offset order.
    #[inline]
    pub fn entries(&self) -> &[RangeEntry<T>] {
        &self.entries
    }

    /// Capacity minus the sum of all entry sizes.
    #[inline]
    pub fn total_free(&self) -> u64 {
        self.capacity - self.used
    }

    /// Size of the largest gap, tail gap included.
    #[inline]
    pub fn largest_free(&self) -> u64 {
        self.largest_free
    }

    /// Cheap pre-check against the cached largest gap.
    ///
    /// Alignment can still make [`find_free_space`](Self::find_free_space) fail
    /// when this returns true.
    #[inline]
    pub fn may_fit(&self, size: u64) -> bool {
        size <= self.largest_free
    }

    /// First-fit search for `size` bytes starting at a multiple of `alignment`.
    ///
    /// Walks the entries from offset 0, aligning the end of the previous entry
    /// and accepting the first gap that is large enough. The tail gap after the
    /// last entry is tried last.
    pub fn find_free_space(&self, size: u64, alignment: u64) -> Option<u64> {
        if !self.may_fit(size) {
            return None;
        }

        let mut prev_end = 0;
        for entry in &self.entries {
            let start = align_next(prev_end, alignment);
            if entry.range.offset >= start && entry.range.offset - start >= size {
                return Some(start);
            }
            prev_end = entry.range.end();
        }

        let start = align_next(prev_end, alignment);
        (start <= self.capacity && self.capacity - start >= size).then_some(start)
    }

    /// Finds space for `size` bytes and records it for `owner`.
    ///
    /// Returns `None` when no gap fits; the list is unchanged in that case.
    pub fn allocate(&mut self, size: u64, alignment: u64, owner: T) -> Option<Range> {
        let offset = self.find_free_space(size, alignment)?;
        let range = Range::new(offset, size);
        self.insert(range, owner);
        Some(range)
    }

    /// Removes the entry starting exactly at `offset`.
    pub fn remove_at_offset(&mut self, offset: u64) -> Option<RangeEntry<T>> {
        let index = self
            .entries
            .binary_search_by_key(&offset, |entry| entry.range.offset)
            .ok()?;
        Some(self.remove_index(index))
    }

    /// Removes the entry covering exactly `range`. A different entry at the
    /// same offset is left in place.
    pub fn remove_range(&mut self, range: Range) -> Option<RangeEntry<T>> {
        let index = self
            .entries
            .binary_search_by_key(&range.offset, |entry| entry.range.offset)
            .ok()?;
        if self.entries[index].range != range {
            return None;
        }
        Some(self.remove_index(index))
    }

    /// Removes the first entry whose owner matches.
    pub fn remove_by(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<RangeEntry<T>> {
        let index = self.entries.iter().position(|entry| pred(&entry.owner))?;
        Some(self.remove_index(index))
    }

    /// Returns the first entry whose owner matches.
    pub fn find_by(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&RangeEntry<T>> {
        self.entries.iter().find(|entry| pred(&entry.owner))
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
        self.largest_free = self.capacity;
    }

    /// Sorted, pairwise disjoint, inside capacity, and cached totals agree.
    pub fn is_consistent(&self) -> bool {
        let sorted_disjoint = self
            .entries
            .windows(2)
            .all(|pair| pair[0].range.end() <= pair[1].range.offset);
        let in_bounds = self
            .entries
            .last()
            .is_none_or(|last| last.range.end() <= self.capacity);
        let used: u64 = self.entries.iter().map(|entry| entry.range.size).sum();

        sorted_disjoint
            && in_bounds
            && used == self.used
            && self.largest_free == self.scan_largest_free()
    }

    fn insert(&mut self, range: Range, owner: T) {
        let index = self
            .entries
            .partition_point(|entry| entry.range.offset < range.offset);

        debug_assert!(
            index == 0 || self.entries[index - 1].range.end() <= range.offset,
            "{range} overlaps its predecessor"
        );
        debug_assert!(
            index == self.entries.len() || range.end() <= self.entries[index].range.offset,
            "{range} overlaps its successor"
        );

        self.entries.insert(index, RangeEntry { range, owner });
        self.used += range.size;
        self.largest_free = self.scan_largest_free();
    }

    fn remove_index(&mut self, index: usize) -> RangeEntry<T> {
        let entry = self.entries.remove(index);
        self.used -= entry.range.size;
        self.largest_free = self.scan_largest_free();
        entry
    }

    fn scan_largest_free(&self) -> u64 {
        let mut largest = 0;
        let mut prev_end = 0;
        for entry in &self.entries {
            largest = largest.max(entry.range.offset.saturating_sub(prev_end));
            prev_end = entry.range.end();
        }
        largest.max(self.capacity.saturating_sub(prev_end))
    }
}
