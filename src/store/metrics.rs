use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts store traffic generated by the mapping layer.
///
/// The detached entity state promises to serve cached reads without touching
/// the store; these counters are how that is observed.
pub trait StoreMetrics: Send + Sync {
    /// Records a property read on a node or relationship.
    fn property_read(&self);

    /// Records a property write or removal.
    fn property_written(&self);

    /// Records the creation of a node or relationship.
    fn element_created(&self);

    /// Records the deletion of a node or relationship.
    fn element_deleted(&self);

    /// Records a relationship scan around a node.
    fn relationship_scan(&self);

    /// Records an index lookup or existence check.
    fn index_query(&self);
}

/// Discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl StoreMetrics for NoopMetrics {
    fn property_read(&self) {}
    fn property_written(&self) {}
    fn element_created(&self) {}
    fn element_deleted(&self) {}
    fn relationship_scan(&self) {}
    fn index_query(&self) {}
}

/// Atomic counter implementation of [`StoreMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Number of property reads.
    pub property_reads: AtomicU64,

    /// Number of property writes and removals.
    pub property_writes: AtomicU64,

    /// Number of nodes and relationships created.
    pub elements_created: AtomicU64,

    /// Number of nodes and relationships deleted.
    pub elements_deleted: AtomicU64,

    /// Number of relationship scans.
    pub relationship_scans: AtomicU64,

    /// Number of index lookups.
    pub index_queries: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreMetricsSnapshot {
    pub property_reads: u64,
    pub property_writes: u64,
    pub elements_created: u64,
    pub elements_deleted: u64,
    pub relationship_scans: u64,
    pub index_queries: u64,
}

impl StoreMetricsSnapshot {
    /// Total number of calls that reached the store.
    pub fn total(&self) -> u64 {
        self.property_reads
            + self.property_writes
            + self.elements_created
            + self.elements_deleted
            + self.relationship_scans
            + self.index_queries
    }
}

impl CounterMetrics {
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            property_reads: self.property_reads.load(Ordering::Relaxed),
            property_writes: self.property_writes.load(Ordering::Relaxed),
            elements_created: self.elements_created.load(Ordering::Relaxed),
            elements_deleted: self.elements_deleted.load(Ordering::Relaxed),
            relationship_scans: self.relationship_scans.load(Ordering::Relaxed),
            index_queries: self.index_queries.load(Ordering::Relaxed),
        }
    }
}

impl StoreMetrics for CounterMetrics {
    fn property_read(&self) {
        self.property_reads.fetch_add(1, Ordering::Relaxed);
    }

    fn property_written(&self) {
        self.property_writes.fetch_add(1, Ordering::Relaxed);
    }

    fn element_created(&self) {
        self.elements_created.fetch_add(1, Ordering::Relaxed);
    }

    fn element_deleted(&self) {
        self.elements_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn relationship_scan(&self) {
        self.relationship_scans.fetch_add(1, Ordering::Relaxed);
    }

    fn index_query(&self) {
        self.index_queries.fetch_add(1, Ordering::Relaxed);
    }
}

/// The default metrics sink, [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn StoreMetrics> {
    Arc::new(NoopMetrics)
}
