//! Fixed-capacity work queues shared by concurrent producers.
//!
//! A queue is filled during one pass and read during the next. Producers
//! reserve a slot with a compare-and-swap on the live count; once the
//! queue is full, further pushes are refused and counted instead of
//! growing the buffer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use rayon::prelude::*;

use crate::context::ContextError;

pub struct WorkQueue<T> {
    name: &'static str,
    slots: Box<[OnceLock<T>]>,
    len: AtomicUsize,
    dropped: AtomicUsize,
}

impl<T> WorkQueue<T> {
    /// Allocate `capacity` slots up front.
    pub fn with_capacity(name: &'static str, capacity: usize) -> Result<Self, ContextError> {
        if capacity == 0 {
            return Err(ContextError::EmptyPool { queue: name });
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|source| ContextError::PoolAllocation {
                queue: name,
                capacity,
                source,
            })?;
        slots.resize_with(capacity, OnceLock::new);

        Ok(Self {
            name,
            slots: slots.into_boxed_slice(),
            len: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of reserved slots. Never exceeds the capacity.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes refused since the last reset.
    #[inline]
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Append `item`, returning its slot, or hand it back if the queue is full.
    pub fn push(&self, item: T) -> Result<usize, T> {
        let capacity = self.capacity();
        let reserved = self
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                (len < capacity).then_some(len + 1)
            });

        match reserved {
            Ok(slot) => self.slots[slot].set(item).map(|()| slot),
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(item)
            }
        }
    }

    /// Filled slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots[..self.len()].iter().filter_map(OnceLock::get)
    }

    /// Empty the queue and clear the drop counter. Capacity is unchanged.
    pub fn reset(&mut self) {
        let len = *self.len.get_mut();
        for slot in &mut self.slots[..len] {
            slot.take();
        }
        *self.len.get_mut() = 0;
        *self.dropped.get_mut() = 0;
    }
}

impl<T: Send + Sync> WorkQueue<T> {
    /// Filled slots, for one rayon task per item.
    pub fn par_iter(&self) -> impl ParallelIterator<Item = &T> + '_ {
        self.slots[..self.len()].par_iter().filter_map(OnceLock::get)
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let queue = WorkQueue::with_capacity("test", 3).unwrap();

        assert_eq!(queue.push(10), Ok(0));
        assert_eq!(queue.push(11), Ok(1));
        assert_eq!(queue.push(12), Ok(2));
        assert_eq!(queue.push(13), Err(13));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![10, 11, 12]);
    }

    #[test]
    fn test_reset_reuses_slots() {
        let mut queue = WorkQueue::with_capacity("test", 2).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        let _ = queue.push(3);

        queue.reset();
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 0);
        assert_eq!(queue.capacity(), 2);

        queue.push(4).unwrap();
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_concurrent_producers_never_overfill() {
        let queue = WorkQueue::with_capacity("test", 1000).unwrap();

        let accepted = (0..5000u32)
            .into_par_iter()
            .filter(|&i| queue.push(i).is_ok())
            .count();

        assert_eq!(accepted, 1000);
        assert_eq!(queue.len(), 1000);
        assert_eq!(queue.dropped(), 4000);
        assert_eq!(queue.par_iter().count(), 1000);

        let mut values: Vec<u32> = queue.iter().copied().collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 1000);
    }

    #[test]
    fn test_pool_errors() {
        assert!(matches!(
            WorkQueue::<u64>::with_capacity("empty", 0),
            Err(ContextError::EmptyPool { queue: "empty" })
        ));
        assert!(matches!(
            WorkQueue::<u64>::with_capacity("huge", usize::MAX),
            Err(ContextError::PoolAllocation { queue: "huge", .. })
        ));
    }
}
