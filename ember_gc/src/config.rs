//! GC configuration parameters.
//!
//! All thresholds and ratios are tunable for different workloads. The
//! defaults match the behavior of a small embedded interpreter heap.

/// Work unit used for step sizing and the allocation threshold.
///
/// An allocation-triggered step is budgeted `(STEP_UNIT / 100) * step_ratio`
/// units of work, and the next step is scheduled once `STEP_UNIT` more
/// objects are live.
pub const STEP_UNIT: usize = 1024;

/// Percentage of the post-mark live count that sets the old-generation
/// ceiling after a major collection.
pub const MAJOR_GROWTH_RATIO: usize = 120;

/// Hard cap on the old-generation ceiling. If the computed ceiling would
/// exceed this, a full collection is forced instead of letting the old
/// generation grow unchecked.
pub const MAJOR_TOO_MANY: usize = 10_000;

/// Configuration for the garbage collector.
///
/// # Example
///
/// ```ignore
/// use ember_gc::GcConfig;
///
/// // Small heap for an embedded target
/// let config = GcConfig {
///     page_capacity: 256,
///     max_objects: 16 * 1024,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Number of object slots per heap page.
    ///
    /// Pages are created on demand and released only when every slot in
    /// them is dead.
    ///
    /// Default: 1024
    pub page_capacity: usize,

    /// Capacity of the bounded protection arena.
    ///
    /// Every allocation implicitly protects the new object in the arena, so
    /// native call sites must save and restore the arena index around work
    /// that allocates. Overflow raises the pre-allocated arena error.
    ///
    /// Default: 100
    pub arena_capacity: usize,

    /// Interval ratio in percent: how much headroom (relative to the
    /// post-mark live count) is granted before the next cycle begins.
    ///
    /// 100 starts a new cycle immediately after the previous one finishes.
    ///
    /// Default: 200
    pub interval_ratio: usize,

    /// Step ratio in percent: how much work a single incremental step
    /// performs. Larger values mean longer pauses and fewer steps.
    ///
    /// Default: 200
    pub step_ratio: usize,

    /// Start in generational mode.
    ///
    /// Default: true
    pub generational: bool,

    /// Hard ceiling on total heap slots (0 = unlimited).
    ///
    /// When the ceiling is reached, a full collection is forced; if that
    /// frees nothing, allocation fails with the pre-allocated out-of-memory
    /// exception.
    ///
    /// Default: 0 (unlimited)
    pub max_objects: usize,

    /// Verify the tri-color invariant after each full collection.
    ///
    /// Expensive but useful when debugging missed write barriers.
    ///
    /// Default: false (enabled in debug builds)
    pub verify_heap: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            page_capacity: 1024,
            arena_capacity: 100,
            interval_ratio: 200,
            step_ratio: 200,
            generational: true,
            max_objects: 0,
            verify_heap: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Configuration for a tightly bounded embedded heap.
    pub fn small() -> Self {
        Self {
            page_capacity: 256,
            max_objects: 16 * 1024,
            ..Default::default()
        }
    }

    /// Configuration favoring short pauses: small steps, frequent cycles.
    pub fn low_latency() -> Self {
        Self {
            interval_ratio: 150,
            step_ratio: 100,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_capacity < 16 {
            return Err(ConfigError::PageTooSmall);
        }
        if self.arena_capacity < 8 {
            return Err(ConfigError::ArenaTooSmall);
        }
        if self.interval_ratio < 100 {
            return Err(ConfigError::InvalidIntervalRatio);
        }
        if self.step_ratio == 0 {
            return Err(ConfigError::InvalidStepRatio);
        }
        if self.max_objects != 0 && self.max_objects < self.page_capacity {
            return Err(ConfigError::CeilingBelowPage);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Page capacity is too small (minimum 16 slots).
    PageTooSmall,
    /// Arena capacity is too small (minimum 8 entries).
    ArenaTooSmall,
    /// Interval ratio must be at least 100 percent.
    InvalidIntervalRatio,
    /// Step ratio must be non-zero.
    InvalidStepRatio,
    /// The object ceiling must fit at least one page.
    CeilingBelowPage,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::PageTooSmall => write!(f, "page capacity must be at least 16 slots"),
            ConfigError::ArenaTooSmall => write!(f, "arena capacity must be at least 8 entries"),
            ConfigError::InvalidIntervalRatio => {
                write!(f, "interval ratio must be at least 100 percent")
            }
            ConfigError::InvalidStepRatio => write!(f, "step ratio must be non-zero"),
            ConfigError::CeilingBelowPage => {
                write!(f, "max_objects must be zero or at least one page capacity")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
