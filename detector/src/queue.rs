//! Fixed-capacity circular sample queue between acquisition and processing.
//!
//! Acquisition must never wait on the classifier, so a full queue overwrites
//! its oldest unread entry instead of rejecting the write.  The unread count
//! is clamped at capacity and the read cursor moves with the overwrite, so
//! read order always equals write order minus the dropped prefix.

/// Lossy FIFO of filtered samples.
#[derive(Debug, Clone)]
pub struct SampleQueue {
    buffer: Box<[f32]>,
    write_index: usize,
    read_index: usize,
    count: usize,
    dropped: u64,
}

impl SampleQueue {
    /// Create a queue holding up to `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)].into_boxed_slice(),
            write_index: 0,
            read_index: 0,
            count: 0,
            dropped: 0,
        }
    }

    /// Append a sample.  Returns true if the oldest unread sample was
    /// overwritten to make room.
    #[inline]
    pub fn push(&mut self, sample: f32) -> bool {
        let capacity = self.buffer.len();
        self.buffer[self.write_index] = sample;
        self.write_index = (self.write_index + 1) % capacity;

        if self.count == capacity {
            // Oldest entry was just overwritten; skip past it.
            self.read_index = (self.read_index + 1) % capacity;
            self.dropped += 1;
            true
        } else {
            self.count += 1;
            false
        }
    }

    /// Remove and return the oldest unread sample.
    #[inline]
    pub fn pop(&mut self) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        let sample = self.buffer[self.read_index];
        self.read_index = (self.read_index + 1) % self.buffer.len();
        self.count -= 1;
        Some(sample)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Total samples lost to overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pop_returns_none() {
        let mut q = SampleQueue::new(4);
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_fifo_order() {
        let mut q = SampleQueue::new(4);
        for v in [1.0, 2.0, 3.0] {
            assert!(!q.push(v));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(1.0));
        assert_eq!(q.pop(), Some(2.0));
        q.push(4.0);
        q.push(5.0);
        assert_eq!(q.pop(), Some(3.0));
        assert_eq!(q.pop(), Some(4.0));
        assert_eq!(q.pop(), Some(5.0));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut q = SampleQueue::new(3);
        q.push(1.0);
        q.push(2.0);
        q.push(3.0);
        assert!(q.push(4.0), "fourth push into capacity 3 must drop");
        assert!(q.push(5.0));
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 2);
        assert_eq!(q.pop(), Some(3.0));
        assert_eq!(q.pop(), Some(4.0));
        assert_eq!(q.pop(), Some(5.0));
        assert!(q.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut q = SampleQueue::new(0);
        assert_eq!(q.capacity(), 1);
        q.push(1.0);
        assert!(q.push(2.0));
        assert_eq!(q.pop(), Some(2.0));
    }

    #[test]
    fn test_fifo_modulo_drops_under_mixed_load() {
        // Push/pop with an irregular pattern and check that what comes out
        // is always the written sequence with a dropped prefix skipped.
        let capacity = 5;
        let mut q = SampleQueue::new(capacity);
        let mut next_written = 0u32;
        let mut next_expected = 0u32;
        let mut popped = 0u64;
        let mut x: u32 = 7;

        for _ in 0..10_000 {
            x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let pushes = (x >> 28) as usize % 4;
            let pops = (x >> 24) as usize % 4;

            for _ in 0..pushes {
                q.push(next_written as f32);
                next_written += 1;
                assert!(q.len() <= capacity);
            }
            // Anything older than the last `capacity` writes is gone.
            let oldest_live = next_written.saturating_sub(q.len() as u32);
            next_expected = next_expected.max(oldest_live);

            for _ in 0..pops {
                match q.pop() {
                    Some(v) => {
                        assert_eq!(v, next_expected as f32);
                        next_expected += 1;
                        popped += 1;
                    }
                    None => assert_eq!(next_expected, next_written),
                }
            }
        }
        assert_eq!(popped + q.dropped() + q.len() as u64, next_written as u64);
    }
}
