//! Tunables shared by the caches and the command buffer ring.

/// Number of ticks an entry may go unused before `gc()` evicts it.
pub const GARBAGE_COLLECTION_PERIOD: u32 = 10;

/// Number of command buffers cycled by the ring.
pub const COMMAND_BUFFER_COUNT: usize = 10;

/// Descriptor sets allocated from one descriptor pool before a new pool is opened.
pub const MAX_SETS_PER_POOL: u32 = 16;

/// Descriptor count requested for variable-count bindings at allocation time.
pub const VARIABLE_DESCRIPTOR_COUNT: u32 = 128;

/// Highest descriptor set count a pipeline layout may span.
pub const MAX_DESCRIPTOR_SETS: u32 = 32;

/// Configuration for a [`GpuContext`](crate::GpuContext) and the caches it owns.
///
/// # Example
///
/// ```ignore
/// let config = CacheConfig::new().with_gc_period(4).with_command_buffer_count(3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Ticks an entry may stay untouched before eviction.
    pub gc_period: u32,
    /// Size of the command buffer ring.
    pub command_buffer_count: usize,
    /// Sets per descriptor pool.
    pub max_sets_per_pool: u32,
    /// Count used for variable-sized update-after-bind bindings.
    pub variable_descriptor_count: u32,
}

impl CacheConfig {
    /// Create a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the garbage collection period.
    pub fn with_gc_period(mut self, gc_period: u32) -> Self {
        self.gc_period = gc_period;
        self
    }

    /// Set the number of command buffers in the ring.
    pub fn with_command_buffer_count(mut self, count: usize) -> Self {
        self.command_buffer_count = count;
        self
    }

    /// Set the number of descriptor sets per pool.
    pub fn with_max_sets_per_pool(mut self, count: u32) -> Self {
        self.max_sets_per_pool = count;
        self
    }

    /// Set the descriptor count for variable-sized bindings.
    pub fn with_variable_descriptor_count(mut self, count: u32) -> Self {
        self.variable_descriptor_count = count;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            gc_period: GARBAGE_COLLECTION_PERIOD,
            command_buffer_count: COMMAND_BUFFER_COUNT,
            max_sets_per_pool: MAX_SETS_PER_POOL,
            variable_descriptor_count: VARIABLE_DESCRIPTOR_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.gc_period, 10);
        assert_eq!(config.command_buffer_count, 10);
        assert_eq!(config.max_sets_per_pool, 16);
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .with_gc_period(3)
            .with_command_buffer_count(2)
            .with_max_sets_per_pool(4)
            .with_variable_descriptor_count(8);
        assert_eq!(config.gc_period, 3);
        assert_eq!(config.command_buffer_count, 2);
        assert_eq!(config.max_sets_per_pool, 4);
        assert_eq!(config.variable_descriptor_count, 8);
    }
}
