//! Sample buffers shared between capture callbacks and workers

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

struct RingInner {
    samples: VecDeque<f32>,
    capacity: usize,
    total_written: u64,
}

/// Bounded buffer of the most recent samples.
///
/// Cloning shares the buffer. The capture side only appends, readers take a
/// copy of the whole window, and the lock is held for a single copy either
/// way.
#[derive(Clone)]
pub struct SampleRing {
    inner: Arc<Mutex<RingInner>>,
}

impl SampleRing {
    /// Create a ring holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(RingInner {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                total_written: 0,
            })),
        }
    }

    /// Append samples, dropping the oldest ones beyond capacity
    pub fn push(&self, samples: &[f32]) {
        let mut inner = self.inner.lock();
        let capacity = inner.capacity;
        let tail = if samples.len() > capacity {
            &samples[samples.len() - capacity..]
        } else {
            samples
        };
        let overflow = (inner.samples.len() + tail.len()).saturating_sub(capacity);
        inner.samples.drain(..overflow);
        inner.samples.extend(tail.iter().copied());
        inner.total_written += samples.len() as u64;
    }

    /// Copy of the current window, oldest sample first
    pub fn snapshot(&self) -> Vec<f32> {
        let inner = self.inner.lock();
        inner.samples.iter().copied().collect()
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    /// Whether no sample has been buffered yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of samples held
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Samples pushed since creation
    pub fn total_written(&self) -> u64 {
        self.inner.lock().total_written
    }

    /// Drop every buffered sample
    pub fn clear(&self) {
        self.inner.lock().samples.clear();
    }
}

/// Cuts an arbitrary stream of callback buffers into fixed-size blocks
pub struct BlockAssembler {
    block_size: usize,
    pending: Vec<f32>,
    blocks: u64,
}

impl BlockAssembler {
    /// Create an assembler emitting blocks of `block_size` samples
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
            blocks: 0,
        }
    }

    /// Blocks emitted so far
    pub fn blocks_emitted(&self) -> u64 {
        self.blocks
    }

    /// Feed samples; `on_block` runs once per completed block
    pub fn push(&mut self, mut samples: &[f32], mut on_block: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            let take = (self.block_size - self.pending.len()).min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];
            if self.pending.len() == self.block_size {
                on_block(&self.pending);
                self.pending.clear();
                self.blocks += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_most_recent() {
        let ring = SampleRing::new(4);
        ring.push(&[1.0, 2.0, 3.0]);
        ring.push(&[4.0, 5.0]);
        assert_eq!(ring.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.total_written(), 5);

        ring.push(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(ring.snapshot(), vec![8.0, 9.0, 10.0, 11.0]);
        assert_eq!(ring.len(), ring.capacity());
    }

    #[test]
    fn test_ring_clone_shares_buffer() {
        let ring = SampleRing::new(8);
        let writer = ring.clone();
        writer.push(&[0.5; 3]);
        assert_eq!(ring.len(), 3);
        ring.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn test_assembler_emits_fixed_blocks() {
        let mut assembler = BlockAssembler::new(4);
        let mut blocks = Vec::new();
        assembler.push(&[1.0, 2.0, 3.0], |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());
        assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |b| blocks.push(b.to_vec()));
        assert_eq!(
            blocks,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(assembler.blocks_emitted(), 2);
    }
}
