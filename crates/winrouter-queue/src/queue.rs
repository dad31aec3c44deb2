use std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::error::QueueError;

/// One slot in the ring buffer.
///
/// `sequence` is the synchronisation point between producers and
/// consumers: a producer may write into the slot once `sequence == pos`
/// (the slot is "empty, my turn"), a consumer may read it once
/// `sequence == pos + 1` (the slot is "full, my turn"). This is the same
/// version-counter idea as the teacher's `Seqlock`, adapted from a
/// single shared `Copy` value to a per-slot turn counter guarding an
/// owned, heap-allocated handle.
#[repr(align(64))]
struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded, lock-free multi-producer multi-consumer queue of handles.
///
/// `push` and `pop` are both non-blocking: `push` fails (returning the
/// record to the caller) when the queue is full, `pop` fails when the
/// queue is empty. Neither call spins or sleeps — the backoff policy
/// (10µs retry up to 10 attempts on push, 100µs indefinite retry on pop)
/// is the caller's responsibility, typically the queue-sink or
/// queue-source driving it.
pub struct WindowQueue<T> {
    buffer: Box<[Slot<T>]>,
    capacity: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

unsafe impl<T: Send> Send for WindowQueue<T> {}
unsafe impl<T: Send> Sync for WindowQueue<T> {}

impl<T> WindowQueue<T> {
    /// Builds a queue with room for `capacity` handles.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self { buffer, capacity, head: AtomicUsize::new(0), tail: AtomicUsize::new(0) })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate occupancy. Racy under concurrent push/pop, useful only
    /// for metrics/telemetry, never for correctness decisions.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking push. Returns `None` on success, or `Some(record)`
    /// handing the record back to the caller when the queue is full.
    pub fn push(&self, record: T) -> Option<T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos % self.capacity];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;

            match diff.cmp(&0) {
                std::cmp::Ordering::Equal => {
                    if self
                        .tail
                        .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        unsafe { (*slot.value.get()).write(record) };
                        slot.sequence.store(pos + 1, Ordering::Release);
                        return None;
                    }
                    pos = self.tail.load(Ordering::Relaxed);
                }
                std::cmp::Ordering::Less => return Some(record),
                std::cmp::Ordering::Greater => pos = self.tail.load(Ordering::Relaxed),
            }
        }
    }

    /// Non-blocking pop. Returns `None` when the queue is currently
    /// empty.
    pub fn pop(&self) -> Option<T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos % self.capacity];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq as isize - (pos + 1) as isize;

            match diff.cmp(&0) {
                std::cmp::Ordering::Equal => {
                    if self
                        .head
                        .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        let record = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence.store(pos + self.capacity, Ordering::Release);
                        return Some(record);
                    }
                    pos = self.head.load(Ordering::Relaxed);
                }
                std::cmp::Ordering::Less => return None,
                std::cmp::Ordering::Greater => pos = self.head.load(Ordering::Relaxed),
            }
        }
    }
}

impl<T> Drop for WindowQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
