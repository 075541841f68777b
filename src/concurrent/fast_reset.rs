/// Static array that can reset used elements in O(# of used elements), where
/// the number of used elements might be much smaller than the capacity.
///
/// Entries are marked as used when they are first written through
/// [`get_mut`](FastResetArray::get_mut) or [`set`](FastResetArray::set).
pub struct FastResetArray<V> {
    data: Vec<V>,
    used: Vec<usize>,
}

impl<V: Clone + Default + PartialEq> FastResetArray<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![V::default(); capacity],
            used: Vec::new(),
        }
    }

    pub fn get(&self, pos: usize) -> &V {
        &self.data[pos]
    }

    pub fn get_mut(&mut self, pos: usize) -> &mut V {
        if self.data[pos] == V::default() {
            self.used.push(pos);
        }
        &mut self.data[pos]
    }

    pub fn set(&mut self, pos: usize, value: V) {
        *self.get_mut(pos) = value;
    }

    pub fn used_entry_ids(&self) -> &[usize] {
        &self.used
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &V)> {
        self.used.iter().map(move |&pos| (pos, &self.data[pos]))
    }

    pub fn clear(&mut self) {
        for &pos in &self.used {
            self.data[pos] = V::default();
        }
        self.used.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn resize(&mut self, capacity: usize) {
        self.data.resize(capacity, V::default());
    }
}

/// Concurrent sibling of [`FastResetArray`].
///
/// Writes go through shared references (values are typically atomics), so the
/// array cannot observe which entries were touched. The caller tracks dirty
/// indices externally and hands them over with
/// [`set_used_entries`](ConcurrentFastResetArray::set_used_entries);
/// [`clear`](ConcurrentFastResetArray::clear) then resets only those.
pub struct ConcurrentFastResetArray<V> {
    data: Vec<V>,
    used: Vec<usize>,
}

impl<V: Default> ConcurrentFastResetArray<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: (0..capacity).map(|_| V::default()).collect(),
            used: Vec::new(),
        }
    }

    pub fn get(&self, pos: usize) -> &V {
        &self.data[pos]
    }

    pub fn data(&self) -> &[V] {
        &self.data
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn set_used_entries(&mut self, used: Vec<usize>) {
        self.used = used;
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &V)> {
        self.used.iter().map(move |&pos| (pos, &self.data[pos]))
    }

    pub fn clear(&mut self) {
        for &pos in &self.used {
            self.data[pos] = V::default();
        }
        self.used.clear();
    }
}
