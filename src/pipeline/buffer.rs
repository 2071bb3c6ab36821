//! Typed port buffers.
//!
//! A `TypedBuffer<T>` backs one named port of a stage. It owns one cell per
//! worker (the value that worker's task replica reads or writes) and a handle
//! to a bounded MPMC queue. Binding an input buffer to an output buffer makes
//! both hold the same queue, so whatever the producing stage's workers push is
//! popped by exactly one of the consuming stage's workers.
//!
//! Transfers are non-blocking: `pop`/`push` move at most one item and report
//! [`TransferStatus::Retry`] when the queue is empty/full, leaving the retry
//! (and its cancellation check) to the caller.

use crate::pipeline::port::{DataType, PortDirection};
use crate::pipeline::scalar::Scalar;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of a single `pop`/`push` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Nothing moved; try again later.
    Retry,
    /// The cell was filled/drained, or the buffer is stopped.
    Done,
}

impl TransferStatus {
    #[inline]
    pub fn is_done(self) -> bool {
        self == TransferStatus::Done
    }
}

/// Result of binding an input buffer to an output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStatus {
    /// First association for this input buffer.
    Bound,
    /// The input buffer was already bound; the previous association was dropped.
    Rebound,
}

/// The queue shared between bound buffers. Holds both channel ends so it never
/// disconnects.
struct SharedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    stopped: AtomicBool,
}

impl<T> SharedQueue<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            stopped: AtomicBool::new(false),
        }
    }

    #[inline]
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
        self.stopped.store(false, Ordering::Release);
    }
}

/// Bounded, typed buffer backing one port of a stage.
pub struct TypedBuffer<T: Scalar> {
    name: String,
    direction: PortDirection,
    queue: Arc<SharedQueue<T>>,
    cells: Box<[Mutex<Option<T>>]>,
}

impl<T: Scalar> TypedBuffer<T> {
    /// Create an unbound buffer with room for `buffer_size` queued items and
    /// one cell per worker.
    pub fn new(
        name: impl Into<String>,
        direction: PortDirection,
        buffer_size: usize,
        n_threads: usize,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            queue: Arc::new(SharedQueue::new(buffer_size)),
            cells: (0..n_threads).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    /// Capacity of the queue this buffer currently uses. Once bound, this is
    /// the producing side's capacity.
    pub fn capacity(&self) -> usize {
        self.queue.capacity
    }

    pub fn n_threads(&self) -> usize {
        self.cells.len()
    }

    /// Number of items waiting in the queue.
    pub fn len(&self) -> usize {
        self.queue.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.rx.is_empty()
    }

    /// Whether this buffer shares its queue with at least one other buffer.
    pub fn is_bound(&self) -> bool {
        Arc::strong_count(&self.queue) > 1
    }

    /// Whether `self` and `other` share the same queue.
    pub fn shares_queue_with(&self, other: &TypedBuffer<T>) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }

    pub fn is_stopped(&self) -> bool {
        self.queue.is_stopped()
    }

    #[inline]
    fn cell(&self, tid: usize) -> MutexGuard<'_, Option<T>> {
        self.cells[tid]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current content of worker `tid`'s cell.
    pub fn read(&self, tid: usize) -> Option<T> {
        *self.cell(tid)
    }

    /// Overwrite worker `tid`'s cell.
    pub fn write(&self, tid: usize, value: T) {
        *self.cell(tid) = Some(value);
    }

    /// Move one queued item into worker `tid`'s cell.
    ///
    /// Items still queued after a stop are delivered; an empty stopped queue
    /// reports `Done` and leaves the cell empty.
    pub fn pop(&self, tid: usize) -> TransferStatus {
        debug_assert_eq!(self.direction, PortDirection::Input);
        match self.queue.rx.try_recv() {
            Ok(value) => {
                *self.cell(tid) = Some(value);
                TransferStatus::Done
            }
            Err(TryRecvError::Empty) if !self.queue.is_stopped() => TransferStatus::Retry,
            Err(_) => {
                *self.cell(tid) = None;
                TransferStatus::Done
            }
        }
    }

    /// Move worker `tid`'s produced value into the queue.
    ///
    /// An empty cell (nothing produced this cycle) is `Done` with no transfer.
    /// On a stopped queue the value is discarded. A full queue keeps the value
    /// in the cell and reports `Retry`.
    pub fn push(&self, tid: usize) -> TransferStatus {
        debug_assert_eq!(self.direction, PortDirection::Output);
        let mut cell = self.cell(tid);
        let Some(value) = cell.take() else {
            return TransferStatus::Done;
        };
        if self.queue.is_stopped() {
            return TransferStatus::Done;
        }
        match self.queue.tx.try_send(value) {
            Ok(()) => TransferStatus::Done,
            Err(TrySendError::Full(value)) => {
                *cell = Some(value);
                TransferStatus::Retry
            }
            Err(TrySendError::Disconnected(_)) => TransferStatus::Done,
        }
    }

    /// Share `other`'s queue. The data types already match by construction.
    pub fn bind(&mut self, other: &TypedBuffer<T>) -> BindStatus {
        let status = if self.is_bound() {
            BindStatus::Rebound
        } else {
            BindStatus::Bound
        };
        self.queue = Arc::clone(&other.queue);
        status
    }

    /// Close the queue. Idempotent; affects every buffer sharing the queue.
    pub fn stop(&self) {
        self.queue.stop();
    }

    /// Clear the stop flag, drop queued items and empty every cell.
    pub fn reset(&self) {
        self.queue.clear();
        for tid in 0..self.cells.len() {
            *self.cell(tid) = None;
        }
    }
}

impl<T: Scalar> fmt::Debug for TypedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedBuffer")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("data_type", &T::DATA_TYPE)
            .field("capacity", &self.capacity())
            .field("queued", &self.len())
            .field("bound", &self.is_bound())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(capacity: usize, n_threads: usize) -> (TypedBuffer<i32>, TypedBuffer<i32>) {
        let output = TypedBuffer::new("out", PortDirection::Output, capacity, n_threads);
        let mut input = TypedBuffer::new("in", PortDirection::Input, capacity, n_threads);
        assert_eq!(input.bind(&output), BindStatus::Bound);
        (output, input)
    }

    #[test]
    fn test_push_then_pop_moves_one_item() {
        let (output, input) = pair(4, 2);
        output.write(1, 42);
        assert_eq!(output.push(1), TransferStatus::Done);
        assert_eq!(output.read(1), None);
        assert_eq!(input.len(), 1);

        assert_eq!(input.pop(0), TransferStatus::Done);
        assert_eq!(input.read(0), Some(42));
        assert_eq!(input.read(1), None);
        assert!(input.is_empty());
    }

    #[test]
    fn test_pop_empty_retries() {
        let (_output, input) = pair(2, 1);
        assert_eq!(input.pop(0), TransferStatus::Retry);
    }

    #[test]
    fn test_push_full_retries_and_keeps_value() {
        let (output, _input) = pair(1, 1);
        output.write(0, 1);
        assert_eq!(output.push(0), TransferStatus::Done);
        output.write(0, 2);
        assert_eq!(output.push(0), TransferStatus::Retry);
        assert_eq!(output.read(0), Some(2));
    }

    #[test]
    fn test_push_without_value_is_done() {
        let (output, input) = pair(2, 1);
        assert_eq!(output.push(0), TransferStatus::Done);
        assert!(input.is_empty());
    }

    #[test]
    fn test_stop_unblocks_both_sides() {
        let (output, input) = pair(1, 1);
        output.write(0, 7);
        assert_eq!(output.push(0), TransferStatus::Done);

        output.stop();
        assert!(input.is_stopped());

        // Queued item is still delivered, then the stopped queue reports done.
        assert_eq!(input.pop(0), TransferStatus::Done);
        assert_eq!(input.read(0), Some(7));
        assert_eq!(input.pop(0), TransferStatus::Done);
        assert_eq!(input.read(0), None);

        // Pushing into a stopped queue discards instead of blocking.
        output.write(0, 8);
        assert_eq!(output.push(0), TransferStatus::Done);
        assert!(input.is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (output, input) = pair(2, 1);
        output.stop();
        output.stop();
        input.stop();
        assert!(output.is_stopped());
        assert_eq!(input.pop(0), TransferStatus::Done);
        assert_eq!(input.pop(0), TransferStatus::Done);
    }

    #[test]
    fn test_reset_clears_queue_cells_and_stop_flag() {
        let (output, input) = pair(4, 2);
        output.write(0, 1);
        output.push(0);
        output.write(1, 2);
        input.write(1, 9);
        output.stop();

        input.reset();
        assert!(!output.is_stopped());
        assert!(output.is_empty());
        assert_eq!(input.read(1), None);
        // The output side's cells belong to the output buffer.
        assert_eq!(output.read(1), Some(2));
        output.reset();
        assert_eq!(output.read(1), None);
    }

    #[test]
    fn test_bind_shares_queue_and_reports_rebind() {
        let first = TypedBuffer::<f64>::new("a", PortDirection::Output, 2, 1);
        let second = TypedBuffer::<f64>::new("b", PortDirection::Output, 8, 1);
        let mut input = TypedBuffer::<f64>::new("in", PortDirection::Input, 2, 1);
        assert!(!input.is_bound());
        assert!(!first.is_bound());

        assert_eq!(input.bind(&first), BindStatus::Bound);
        assert!(input.shares_queue_with(&first));
        assert!(first.is_bound());

        assert_eq!(input.bind(&second), BindStatus::Rebound);
        assert!(input.shares_queue_with(&second));
        assert!(!first.is_bound());
        assert_eq!(input.capacity(), 8);
    }

    #[test]
    fn test_concurrent_producers_and_consumers_lose_nothing() {
        const PER_PRODUCER: i64 = 2_000;
        let output = Arc::new(TypedBuffer::<i64>::new("out", PortDirection::Output, 8, 3));
        let mut input = TypedBuffer::<i64>::new("in", PortDirection::Input, 8, 2);
        input.bind(&output);
        let input = Arc::new(input);

        let producers: Vec<_> = (0..3)
            .map(|tid| {
                let output = Arc::clone(&output);
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        output.write(tid, tid as i64 * PER_PRODUCER + i);
                        while !output.push(tid).is_done() {
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let total = 3 * PER_PRODUCER as usize;
        let received = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let consumers: Vec<_> = (0..2)
            .map(|tid| {
                let input = Arc::clone(&input);
                let received = Arc::clone(&received);
                std::thread::spawn(move || loop {
                    if received.lock().unwrap().len() >= total {
                        break;
                    }
                    if input.pop(tid).is_done() {
                        let value = input.read(tid).unwrap();
                        received.lock().unwrap().push(value);
                    } else {
                        std::thread::yield_now();
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        for c in consumers {
            c.join().unwrap();
        }

        let mut received = received.lock().unwrap().clone();
        received.sort_unstable();
        let expected: Vec<i64> = (0..3 * PER_PRODUCER).collect();
        assert_eq!(received, expected);
    }
}
