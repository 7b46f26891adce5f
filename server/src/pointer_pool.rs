/// Fixed-capacity free list of pointer body indices.
///
/// Every index in `0..capacity` is either free or held by exactly one peer.
pub struct PointerPool {
    free: Vec<usize>,
    held: Vec<bool>,
}

impl PointerPool {
    pub fn new(capacity: usize) -> Self {
        // Reversed so the first acquire hands out index 0.
        Self {
            free: (0..capacity).rev().collect(),
            held: vec![false; capacity],
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Take a free index, or `None` when every pointer is in use.
    pub fn acquire(&mut self) -> Option<usize> {
        let index = self.free.pop()?;
        self.held[index] = true;
        Some(index)
    }

    /// Return an index to the pool. Releasing an index that is not currently
    /// held (double release, out of range) is ignored and returns false.
    pub fn release(&mut self, index: usize) -> bool {
        match self.held.get_mut(index) {
            Some(held) if *held => {
                *held = false;
                self.free.push(index);
                true
            }
            _ => false,
        }
    }

    pub fn is_held(&self, index: usize) -> bool {
        self.held.get(index).copied().unwrap_or(false)
    }
}
