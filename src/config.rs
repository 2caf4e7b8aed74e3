//! Configuration passed explicitly when building or loading a triple index.

use crate::checksum::Checksum;
use crate::triples::Order;

/// How persisted word arrays are made addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Copy every word array onto the heap.
    #[default]
    Loaded,
    /// Leave word arrays in a memory map; pages fault in on first touch.
    ///
    /// Rank/select directories are always rebuilt on the heap.
    Mapped,
}

/// When the auxiliary predicate index is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPolicy {
    /// Build on the first query that binds the predicate but not the subject.
    #[default]
    Lazy,
    /// Build as soon as the triples are built or loaded.
    Eager,
    /// Never build; only an attached or sidecar index is used.
    Disabled,
}

/// Configuration for building, saving and loading a [`crate::BitmapTriples`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Permutation used to lay out triples (default: SPO).
    pub order: Order,

    /// Residency of persisted word arrays (default: loaded).
    pub load_mode: LoadMode,

    /// Predicate index policy (default: lazy).
    pub predicate_index: IndexPolicy,

    /// Checksum written after every payload (default: CRC-32C).
    pub checksum: Checksum,

    /// Fail loads on checksum mismatch instead of logging (default: true).
    pub strict_checksums: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            order: Order::SPO,
            load_mode: LoadMode::Loaded,
            predicate_index: IndexPolicy::Lazy,
            checksum: Checksum::Crc32,
            strict_checksums: true,
        }
    }
}

impl Config {
    /// Set the triple permutation.
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Set the load mode.
    pub fn with_load_mode(mut self, load_mode: LoadMode) -> Self {
        self.load_mode = load_mode;
        self
    }

    /// Set the predicate index policy.
    pub fn with_predicate_index(mut self, policy: IndexPolicy) -> Self {
        self.predicate_index = policy;
        self
    }

    /// Set the payload checksum.
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = checksum;
        self
    }

    /// Set whether checksum mismatches abort a load.
    pub fn with_strict_checksums(mut self, strict: bool) -> Self {
        self.strict_checksums = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.order, Order::SPO);
        assert_eq!(config.load_mode, LoadMode::Loaded);
        assert_eq!(config.predicate_index, IndexPolicy::Lazy);
        assert_eq!(config.checksum, Checksum::Crc32);
        assert!(config.strict_checksums);
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::default()
            .with_order(Order::POS)
            .with_load_mode(LoadMode::Mapped)
            .with_predicate_index(IndexPolicy::Disabled)
            .with_checksum(Checksum::Crc16)
            .with_strict_checksums(false);
        assert_eq!(config.order, Order::POS);
        assert_eq!(config.load_mode, LoadMode::Mapped);
        assert_eq!(config.predicate_index, IndexPolicy::Disabled);
        assert_eq!(config.checksum, Checksum::Crc16);
        assert!(!config.strict_checksums);
    }
}
