//! Construction-time configuration for a [`crate::database::ZoneDatabase`].

/// Configuration knobs for constructing a [`crate::database::ZoneDatabase`].
///
/// There is no host process in scope here, so unlike Cascade's layered
/// file/CLI/env configuration, this is just a small builder with sensible
/// defaults.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Number of node lock buckets (and, in lockstep, resign-heap buckets).
    ///
    /// Must be a power of two. Larger values reduce contention between
    /// threads touching unrelated nodes, at the cost of more lock memory.
    pub(crate) bucket_count: usize,

    /// Hint for the initial capacity of the node arenas.
    pub(crate) initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_count: 64,
            initial_capacity: 1024,
        }
    }
}

impl Config {
    /// Start building a [`Config`] from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of node lock buckets. Rounded up to the next power of
    /// two if not already one.
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count.next_power_of_two().max(1);
        self
    }

    /// Set the initial node-arena capacity hint.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn bucket_count_rounds_up() {
        let cfg = Config::new().bucket_count(100);
        assert_eq!(cfg.bucket_count, 128);
    }

    #[test]
    fn defaults_are_nonzero() {
        let cfg = Config::default();
        assert!(cfg.bucket_count > 0);
        assert!(cfg.initial_capacity > 0);
    }
}
