//! GC statistics.
//!
//! Counters for monitoring and tuning. The collector is single-threaded,
//! so these are plain integers updated in place.

/// Statistics about collector activity since runtime creation.
#[derive(Debug, Default, Clone)]
pub struct GcStats {
    // =========================================================================
    // Allocation
    // =========================================================================
    /// Total objects allocated.
    pub objects_allocated: u64,
    /// Total objects reclaimed by the sweeper.
    pub objects_freed: u64,

    // =========================================================================
    // Collections
    // =========================================================================
    /// Completed minor (young-only) cycles.
    pub minor_cycles: u64,
    /// Completed major / non-generational full cycles.
    pub major_cycles: u64,
    /// Individual incremental steps performed.
    pub incremental_steps: u64,

    // =========================================================================
    // Pages
    // =========================================================================
    /// Heap pages created.
    pub pages_created: u64,
    /// Fully dead heap pages released back to the allocator.
    pub pages_released: u64,
}

impl GcStats {
    /// Create zeroed statistics.
    pub const fn new() -> Self {
        Self {
            objects_allocated: 0,
            objects_freed: 0,
            minor_cycles: 0,
            major_cycles: 0,
            incremental_steps: 0,
            pages_created: 0,
            pages_released: 0,
        }
    }

    /// Total completed cycles of either kind.
    pub fn total_cycles(&self) -> u64 {
        self.minor_cycles + self.major_cycles
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_totals() {
        let mut stats = GcStats::new();
        stats.minor_cycles = 3;
        stats.major_cycles = 2;
        assert_eq!(stats.total_cycles(), 5);

        stats.reset();
        assert_eq!(stats.total_cycles(), 0);
        assert_eq!(stats.objects_allocated, 0);
    }
}
