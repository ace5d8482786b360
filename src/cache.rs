use crate::aggregate::LayerBundle;
use crate::types::DatasetId;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Bundles kept resident at once.
pub const CAPACITY: usize = 3;

/// Bundle dropped from the cache to make room for a newer one.
#[derive(Debug, Clone)]
pub struct Evicted {
    pub dataset: DatasetId,
    pub bundle: Arc<LayerBundle>,
}

/// Fixed-capacity store of computed layer bundles.
///
/// Eviction is strictly by insertion order: `get` does not refresh an entry.
#[derive(Debug, Default)]
pub struct LayerCache {
    // front is the oldest insertion
    entries: VecDeque<(DatasetId, Arc<LayerBundle>)>,
}

impl LayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dataset: DatasetId) -> Option<Arc<LayerBundle>> {
        self.entries
            .iter()
            .find(|(id, _)| *id == dataset)
            .map(|(_, bundle)| Arc::clone(bundle))
    }

    pub fn contains(&self, dataset: DatasetId) -> bool {
        self.entries.iter().any(|(id, _)| *id == dataset)
    }

    /// Inserts `bundle` unless `dataset` is already resident, in which case the
    /// existing bundle is kept. Returns the entry evicted to stay within capacity.
    pub fn put(&mut self, dataset: DatasetId, bundle: Arc<LayerBundle>) -> Option<Evicted> {
        if self.contains(dataset) {
            debug!(dataset = %dataset, "bundle already cached, keeping existing entry");
            return None;
        }

        let evicted = if self.entries.len() >= CAPACITY {
            self.entries
                .pop_front()
                .map(|(dataset, bundle)| Evicted { dataset, bundle })
        } else {
            None
        };
        if let Some(evicted) = &evicted {
            debug!(evicted = %evicted.dataset, inserted = %dataset, "evicting oldest bundle");
        }

        self.entries.push_back((dataset, bundle));
        evicted
    }

    /// Resident datasets, oldest insertion first.
    pub fn list(&self) -> Vec<DatasetId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundaryLevel;

    fn bundle(dataset: DatasetId) -> Arc<LayerBundle> {
        Arc::new(LayerBundle::new(dataset, Vec::new(), Default::default()))
    }

    #[test]
    fn fourth_insert_evicts_the_first() {
        let mut cache = LayerCache::new();
        assert!(cache.put(DatasetId::Pm25, bundle(DatasetId::Pm25)).is_none());
        assert!(cache.put(DatasetId::Nh3, bundle(DatasetId::Nh3)).is_none());
        assert!(cache.put(DatasetId::Nox, bundle(DatasetId::Nox)).is_none());

        let evicted = cache.put(DatasetId::Co, bundle(DatasetId::Co)).unwrap();
        assert_eq!(evicted.dataset, DatasetId::Pm25);
        assert_eq!(evicted.bundle.dataset, DatasetId::Pm25);
        assert_eq!(cache.list(), vec![DatasetId::Nh3, DatasetId::Nox, DatasetId::Co]);
        assert!(cache.get(DatasetId::Pm25).is_none());
    }

    #[test]
    fn re_put_keeps_the_original_bundle() {
        let mut cache = LayerCache::new();
        let original = bundle(DatasetId::So2);
        cache.put(DatasetId::So2, Arc::clone(&original));
        cache.put(DatasetId::Vocs, bundle(DatasetId::Vocs));

        assert!(cache.put(DatasetId::So2, bundle(DatasetId::So2)).is_none());
        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&cache.get(DatasetId::So2).unwrap(), &original));
        assert_eq!(cache.list(), vec![DatasetId::So2, DatasetId::Vocs]);
    }

    #[test]
    fn access_does_not_protect_from_eviction() {
        let mut cache = LayerCache::new();
        for dataset in [DatasetId::Pm25, DatasetId::Nh3, DatasetId::Nox] {
            cache.put(dataset, bundle(dataset));
        }
        // reading the oldest entry does not make it recent
        assert!(cache.get(DatasetId::Pm25).is_some());
        let evicted = cache.put(DatasetId::Co, bundle(DatasetId::Co)).unwrap();
        assert_eq!(evicted.dataset, DatasetId::Pm25);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut cache = LayerCache::new();
        for dataset in DatasetId::ALL.into_iter().chain(DatasetId::ALL) {
            cache.put(dataset, bundle(dataset));
            assert!(cache.len() <= CAPACITY);
        }
        assert_eq!(cache.list(), vec![DatasetId::Co, DatasetId::So2, DatasetId::Vocs]);
        assert!(cache.get(DatasetId::Vocs).unwrap().boundary_layer(BoundaryLevel::Province).is_empty());
    }
}
