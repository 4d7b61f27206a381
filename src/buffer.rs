use std::collections::VecDeque;

/// Bytes received from the printer that haven't been framed yet.
#[derive(Debug)]
pub struct Buffer {
    data: VecDeque<u8>,
    capacity: usize,
}

impl Buffer {
    pub fn new(capacity: usize) -> Buffer {
        Buffer {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn head(&self) -> Option<u8> {
        self.data.front().copied()
    }

    /// Append as many of `bytes` as fit, returns the number stored.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let room = self.capacity - self.data.len().min(self.capacity);
        let n = room.min(bytes.len());
        self.data.extend(&bytes[..n]);
        n
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.data.pop_front()
    }

    pub fn consume(&mut self, len: usize) {
        assert!(len <= self.len());
        self.data.drain(..len);
    }

    pub fn as_slice(&mut self) -> &[u8] {
        self.data.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}
