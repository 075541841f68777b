use rustc_hash::FxHashMap;

use crate::concurrent::FastResetArray;

// Below this many expected keys, hashing beats touching the dense array.
const SMALL_MAP_LIMIT: usize = 64;

/// Thread-local map from cluster/block id to accumulated edge weight.
///
/// While the upper bound on the number of distinct keys is small the ratings
/// live in a hash map; once a caller announces a larger bound via
/// [`update_upper_bound`](RatingMap::update_upper_bound) the map switches to a
/// dense fast-reset array over the full key range.
pub struct RatingMap {
    small: FxHashMap<usize, i64>,
    dense: FastResetArray<i64>,
    use_dense: bool,
}

impl RatingMap {
    /// `capacity` is the size of the key universe (number of clusters or
    /// blocks).
    pub fn new(capacity: usize) -> Self {
        Self {
            small: FxHashMap::default(),
            dense: FastResetArray::new(capacity),
            use_dense: false,
        }
    }

    /// Chooses the representation for the next accumulation run. Must be
    /// called while the map is empty.
    pub fn update_upper_bound(&mut self, upper_bound: usize) {
        debug_assert!(self.is_empty());
        self.use_dense = upper_bound > SMALL_MAP_LIMIT && upper_bound <= self.dense.capacity();
    }

    pub fn add(&mut self, key: usize, delta: i64) {
        if self.use_dense {
            *self.dense.get_mut(key) += delta;
        } else {
            *self.small.entry(key).or_insert(0) += delta;
        }
    }

    pub fn get(&self, key: usize) -> i64 {
        if self.use_dense {
            *self.dense.get(key)
        } else {
            self.small.get(&key).copied().unwrap_or(0)
        }
    }

    pub fn for_each(&self, mut consumer: impl FnMut(usize, i64)) {
        if self.use_dense {
            for (key, &rating) in self.dense.entries() {
                consumer(key, rating);
            }
        } else {
            for (&key, &rating) in &self.small {
                consumer(key, rating);
            }
        }
    }

    pub fn len(&self) -> usize {
        if self.use_dense {
            self.dense.len()
        } else {
            self.small.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        if self.use_dense {
            self.dense.clear();
        } else {
            self.small.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(map: &RatingMap) -> Vec<(usize, i64)> {
        let mut entries = Vec::new();
        map.for_each(|key, rating| entries.push((key, rating)));
        entries.sort_unstable();
        entries
    }

    #[test]
    fn test_small_and_dense_agree() {
        let keys = [3_usize, 7, 3, 90, 7, 3];

        let mut small = RatingMap::new(128);
        small.update_upper_bound(4);
        let mut dense = RatingMap::new(128);
        dense.update_upper_bound(128);

        for &key in &keys {
            small.add(key, 2);
            dense.add(key, 2);
        }

        assert_eq!(collect(&small), vec![(3, 6), (7, 4), (90, 2)]);
        assert_eq!(collect(&small), collect(&dense));
        assert_eq!(small.get(3), 6);
        assert_eq!(dense.get(3), 6);
        assert_eq!(dense.get(4), 0);
    }

    #[test]
    fn test_clear_between_runs() {
        let mut map = RatingMap::new(256);
        map.update_upper_bound(200);
        map.add(100, 1);
        map.clear();

        map.update_upper_bound(2);
        map.add(100, 5);
        assert_eq!(map.get(100), 5);
        assert_eq!(map.len(), 1);
    }
}
