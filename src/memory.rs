/// Byte accounting for a single accumulator.
///
/// The owner recomputes its footprint after every mutation and calls
/// [`MemoryTracker::set`]; the tracker only remembers the latest figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTracker {
    current: usize,
    max_allowed: usize,
}

impl MemoryTracker {
    pub fn new(max_allowed: usize) -> Self {
        Self {
            current: 0,
            max_allowed,
        }
    }

    pub fn set(&mut self, bytes: usize) {
        self.current = bytes;
    }

    pub fn current_bytes(&self) -> usize {
        self.current
    }

    pub fn max_allowed_bytes(&self) -> usize {
        self.max_allowed
    }

    pub fn within_limit(&self) -> bool {
        self.current <= self.max_allowed
    }
}
