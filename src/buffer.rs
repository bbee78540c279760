//! Bounded, lossy hand-off between the ingress path and the pose worker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;

/// Frames held at most; bounds latency to about two processing intervals.
pub const FRAME_BUFFER_CAPACITY: usize = 2;

/// One encoded camera frame as received from the client.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
    /// Client-side capture timestamp
    pub timestamp_us: u64,
    pub received_at: Instant,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, timestamp_us: u64) -> Self {
        Self {
            data: data.into(),
            timestamp_us,
            received_at: Instant::now(),
        }
    }

    /// Time spent between arrival and now.
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// Fixed-capacity frame queue with drop-oldest overflow.
///
/// `push` never blocks; when the queue is full the oldest frame is evicted so
/// the consumer always sees the most recent frames.
pub struct FrameBuffer {
    frames: Mutex<VecDeque<Frame>>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(FRAME_BUFFER_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        // A panic while holding the lock cannot leave the deque inconsistent.
        self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues `frame`, evicting the oldest one if full. Returns true when a
    /// frame was evicted.
    pub fn push(&self, frame: Frame) -> bool {
        let evicted = {
            let mut frames = self.lock();
            let evicted = if frames.len() >= self.capacity {
                frames.pop_front();
                true
            } else {
                false
            };
            frames.push_back(frame);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_one();
        evicted
    }

    /// Takes the oldest retained frame, waiting up to `timeout` for one to
    /// arrive. `None` on timeout.
    pub fn pop(&self, timeout: Duration) -> Option<Frame> {
        let frames = self.lock();
        let (mut frames, _) = self
            .available
            .wait_timeout_while(frames, timeout, |f| f.is_empty())
            .unwrap_or_else(|e| e.into_inner());
        frames.pop_front()
    }

    /// Discards every pending frame. Returns how many were removed.
    pub fn drain(&self) -> usize {
        let mut frames = self.lock();
        let n = frames.len();
        frames.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames evicted by overflow since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(tag: u8) -> Frame {
        Frame::new(vec![tag], tag as u64)
    }

    fn tag(frame: &Frame) -> u8 {
        frame.data[0]
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let buffer = FrameBuffer::new();
        assert!(!buffer.push(frame(1)));
        assert!(!buffer.push(frame(2)));
        assert!(buffer.push(frame(3)));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 1);

        let timeout = Duration::from_millis(10);
        assert_eq!(buffer.pop(timeout).map(|f| tag(&f)), Some(2));
        assert_eq!(buffer.pop(timeout).map(|f| tag(&f)), Some(3));
        assert!(buffer.pop(timeout).is_none());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let buffer = FrameBuffer::new();
        for i in 0..50 {
            buffer.push(frame(i));
            assert!(buffer.len() <= FRAME_BUFFER_CAPACITY);
        }
        assert_eq!(buffer.dropped(), 48);
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let buffer = FrameBuffer::new();
        let start = Instant::now();
        assert!(buffer.pop(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let buffer = Arc::new(FrameBuffer::new());
        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(frame(7));
        });

        let got = buffer.pop(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(got.map(|f| tag(&f)), Some(7));
    }

    #[test]
    fn test_drain() {
        let buffer = FrameBuffer::new();
        assert_eq!(buffer.drain(), 0);

        buffer.push(frame(1));
        buffer.push(frame(2));
        assert_eq!(buffer.drain(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.pop(Duration::from_millis(5)).is_none());
    }
}
