//! Interrupt-vector allocation.

use crate::error::{CoreError, Result};

/// Maximum usable vector number.
const VECTOR_CEILING: u16 = 255;

/// Monotonic allocator of contiguous interrupt-vector blocks.
#[derive(Debug, Clone)]
pub struct VectorAllocator {
    base: u16,
    next: u16,
}

impl VectorAllocator {
    /// Allocator starting at the architecture's vector base.
    pub fn new(base: u16) -> Self {
        VectorAllocator { base, next: base }
    }

    /// The configured base vector.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Total vectors handed out so far.
    pub fn allocated(&self) -> u16 {
        self.next - self.base
    }

    /// Reserve a contiguous block of `count` vectors.
    ///
    /// Returns the first vector of the block. The highest vector of any
    /// block never exceeds 255; over-allocation is fatal.
    pub fn allocate(&mut self, count: u16) -> Result<u16> {
        if count == 0 || u32::from(self.next) + u32::from(count) > u32::from(VECTOR_CEILING) + 1 {
            return Err(CoreError::VectorOverflow {
                next: self.next,
                count,
            });
        }
        let start = self.next;
        self.next += count;
        Ok(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_contiguous_and_monotonic() {
        let mut alloc = VectorAllocator::new(0xC0);
        assert_eq!(alloc.allocate(1).unwrap(), 0xC0);
        assert_eq!(alloc.allocate(4).unwrap(), 0xC1);
        assert_eq!(alloc.allocate(1).unwrap(), 0xC5);
        assert_eq!(alloc.allocated(), 6);
    }

    #[test]
    fn over_allocation_is_rejected() {
        let mut alloc = VectorAllocator::new(0xC0);
        assert!(matches!(
            alloc.allocate(256),
            Err(CoreError::VectorOverflow { .. })
        ));
        // The failed request reserves nothing.
        assert_eq!(alloc.allocate(1).unwrap(), 0xC0);
    }

    #[test]
    fn ceiling_is_inclusive_of_255() {
        let mut alloc = VectorAllocator::new(0xC0);
        assert_eq!(alloc.allocate(64).unwrap(), 0xC0);
        assert!(alloc.allocate(1).is_err());
    }

    #[test]
    fn zero_count_is_rejected() {
        let mut alloc = VectorAllocator::new(0xC0);
        assert!(alloc.allocate(0).is_err());
    }
}
