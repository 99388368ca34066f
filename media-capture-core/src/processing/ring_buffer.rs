/// Fixed-capacity circular buffer that overwrites its oldest entry.
///
/// Not synchronized; wrap in `parking_lot::Mutex` for cross-thread access.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    write_index: usize,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            write_index: 0,
            capacity,
        }
    }

    /// Append one value, dropping the oldest if full.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(value);
        } else {
            self.buffer[self.write_index] = value;
        }
        self.write_index = (self.write_index + 1) % self.capacity;
    }

    /// Append `values` in order. If there are more than `capacity`, only
    /// the tail is kept.
    pub fn write(&mut self, values: &[T]) {
        let values = if values.len() > self.capacity {
            &values[values.len() - self.capacity..]
        } else {
            values
        };
        for value in values {
            self.push(value.clone());
        }
    }

    /// Contents ordered oldest to newest.
    pub fn to_vec(&self) -> Vec<T> {
        if self.buffer.len() < self.capacity {
            return self.buffer.clone();
        }
        let mut ordered = Vec::with_capacity(self.capacity);
        ordered.extend_from_slice(&self.buffer[self.write_index..]);
        ordered.extend_from_slice(&self.buffer[..self.write_index]);
        ordered
    }

    /// Most recently pushed value.
    pub fn latest(&self) -> Option<&T> {
        if self.buffer.is_empty() {
            return None;
        }
        let index = (self.write_index + self.capacity - 1) % self.capacity;
        self.buffer.get(index)
    }

    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.write_index = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
