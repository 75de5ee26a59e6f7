//! The output-side buffer: a bounded queue with flush cursors.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lumber_entry::Entry;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{BufferError, BuildError};

/// A bounded FIFO queue of entries with explicit flush acknowledgment.
///
/// `read_chunk` does not remove entries; it advances a read cursor and
/// returns a [`Clearer`] that marks entries flushed. Entries stay
/// resident until marked, so the set of added entries always equals the
/// union of resident and flushed entries — nothing is silently dropped.
/// A second `read_chunk` before the previous clearer runs never
/// re-issues the same entries.
#[async_trait]
pub trait Buffer: Send + Sync {
    /// Enqueue an entry, waiting for space when the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Cancelled`] (without enqueueing) when `ctx`
    /// is cancelled while waiting.
    async fn add(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), BufferError>;

    /// Read the next chunk of unread entries.
    ///
    /// Waits until at least one unread entry exists, then returns up to
    /// the configured chunk size; if fewer accumulate within the chunk
    /// delay, the partial chunk is returned.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Cancelled`] when `ctx` is cancelled while
    /// waiting.
    async fn read_chunk(
        &self,
        ctx: &CancellationToken,
    ) -> Result<(Vec<Entry>, Box<dyn Clearer>), BufferError>;

    /// The number of resident (unflushed) entries.
    fn len(&self) -> usize;

    /// Whether the buffer holds no resident entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acknowledges delivery of a chunk returned by [`Buffer::read_chunk`].
///
/// Marked entries are released from the buffer; space freed at the front
/// wakes blocked `add` callers. Ranges are indices within the chunk.
pub trait Clearer: Send {
    /// Mark the whole chunk as flushed.
    fn mark_all_as_flushed(&mut self) -> Result<(), BufferError>;

    /// Mark the chunk's entries in `[lo, hi)` as flushed.
    fn mark_range_as_flushed(&mut self, lo: usize, hi: usize) -> Result<(), BufferError>;
}

/// Declarative buffer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// The buffer implementation. Only `memory` is available.
    #[serde(rename = "type")]
    pub kind: BufferKind,
    /// Bound on resident entries; `add` blocks at the bound.
    pub max_entries: usize,
    /// Most entries returned by a single `read_chunk`.
    pub max_chunk_size: usize,
    /// How long `read_chunk` waits for a full chunk before returning a
    /// partial one.
    #[serde(with = "humantime_serde")]
    pub max_chunk_delay: Duration,
}

/// The available buffer implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    /// In-memory bounded queue.
    #[default]
    Memory,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            kind: BufferKind::Memory,
            max_entries: 1024,
            max_chunk_size: 100,
            max_chunk_delay: Duration::from_secs(1),
        }
    }
}

impl BufferConfig {
    /// Build the configured buffer.
    pub fn build(&self, id: &str) -> Result<Arc<dyn Buffer>, BuildError> {
        if self.max_entries == 0 || self.max_chunk_size == 0 {
            return Err(BuildError::InvalidConfig {
                id: id.to_string(),
                message: "`max_entries` and `max_chunk_size` must be positive".to_string(),
            });
        }
        match self.kind {
            BufferKind::Memory => Ok(Arc::new(MemoryBuffer::new(self))),
        }
    }
}

/// One queue position. The entry is dropped once the slot is flushed.
#[derive(Debug)]
struct Slot {
    entry: Option<Entry>,
    flushed: bool,
}

#[derive(Debug, Default)]
struct State {
    slots: VecDeque<Slot>,
    /// Absolute index of `slots[0]` over the buffer's lifetime.
    base: u64,
    /// Absolute index of the next unread entry.
    read: u64,
}

impl State {
    fn tail(&self) -> u64 {
        self.base + self.slots.len() as u64
    }

    fn unread(&self) -> u64 {
        self.tail() - self.read
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    not_empty: Notify,
    not_full: Notify,
    max_entries: usize,
}

impl Shared {
    /// Poison-tolerant lock: state is repaired by cursor arithmetic, not
    /// abandoned.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The in-memory [`Buffer`] implementation.
#[derive(Debug, Clone)]
pub struct MemoryBuffer {
    shared: Arc<Shared>,
    max_chunk_size: usize,
    max_chunk_delay: Duration,
}

impl MemoryBuffer {
    /// A memory buffer with the given bounds.
    #[must_use]
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                not_empty: Notify::new(),
                not_full: Notify::new(),
                max_entries: config.max_entries,
            }),
            max_chunk_size: config.max_chunk_size,
            max_chunk_delay: config.max_chunk_delay,
        }
    }

    /// Copy out `count` unread entries and advance the read cursor.
    fn take_chunk(&self, state: &mut State, count: usize) -> (Vec<Entry>, Box<dyn Clearer>) {
        let lo = state.read;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let index = (state.read - state.base) as usize;
            if let Some(entry) = state.slots[index].entry.clone() {
                entries.push(entry);
            }
            state.read += 1;
        }
        let clearer = MemoryClearer {
            shared: Arc::clone(&self.shared),
            lo,
            len: count,
        };
        (entries, Box::new(clearer))
    }
}

#[async_trait]
impl Buffer for MemoryBuffer {
    async fn add(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), BufferError> {
        let mut entry = Some(entry);
        loop {
            let notified = self.shared.not_full.notified();
            {
                let mut state = self.shared.lock();
                if state.slots.len() < self.shared.max_entries {
                    state.slots.push_back(Slot {
                        entry: entry.take(),
                        flushed: false,
                    });
                    drop(state);
                    self.shared.not_empty.notify_waiters();
                    return Ok(());
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = ctx.cancelled() => return Err(BufferError::Cancelled),
            }
        }
    }

    async fn read_chunk(
        &self,
        ctx: &CancellationToken,
    ) -> Result<(Vec<Entry>, Box<dyn Clearer>), BufferError> {
        'wait_first: loop {
            // Wait for the first unread entry.
            loop {
                let notified = self.shared.not_empty.notified();
                {
                    let state = self.shared.lock();
                    if state.unread() > 0 {
                        break;
                    }
                }
                tokio::select! {
                    _ = notified => {}
                    _ = ctx.cancelled() => return Err(BufferError::Cancelled),
                }
            }

            // Accumulate toward a full chunk until the delay expires.
            let deadline = tokio::time::Instant::now() + self.max_chunk_delay;
            loop {
                let notified = self.shared.not_empty.notified();
                {
                    let mut state = self.shared.lock();
                    if state.unread() as usize >= self.max_chunk_size {
                        return Ok(self.take_chunk(&mut state, self.max_chunk_size));
                    }
                }
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        let mut state = self.shared.lock();
                        let count = (state.unread() as usize).min(self.max_chunk_size);
                        if count == 0 {
                            // Another reader raced us to the entries.
                            continue 'wait_first;
                        }
                        return Ok(self.take_chunk(&mut state, count));
                    }
                    _ = ctx.cancelled() => return Err(BufferError::Cancelled),
                }
            }
        }
    }

    fn len(&self) -> usize {
        let state = self.shared.lock();
        state.slots.iter().filter(|slot| !slot.flushed).count()
    }
}

/// [`Clearer`] for a chunk of a [`MemoryBuffer`].
struct MemoryClearer {
    shared: Arc<Shared>,
    /// Absolute index of the chunk's first entry.
    lo: u64,
    /// Number of entries in the chunk.
    len: usize,
}

impl Clearer for MemoryClearer {
    fn mark_all_as_flushed(&mut self) -> Result<(), BufferError> {
        self.mark_range_as_flushed(0, self.len)
    }

    fn mark_range_as_flushed(&mut self, lo: usize, hi: usize) -> Result<(), BufferError> {
        if lo > hi || hi > self.len {
            return Err(BufferError::InvalidRange {
                lo,
                hi,
                len: self.len,
            });
        }
        let mut state = self.shared.lock();
        for absolute in (self.lo + lo as u64)..(self.lo + hi as u64) {
            if absolute < state.base {
                continue;
            }
            let index = (absolute - state.base) as usize;
            if let Some(slot) = state.slots.get_mut(index) {
                slot.flushed = true;
                slot.entry = None;
            }
        }
        // Release flushed slots from the front so blocked adders wake.
        let mut freed = false;
        while state.slots.front().is_some_and(|slot| slot.flushed) {
            state.slots.pop_front();
            state.base += 1;
            freed = true;
        }
        drop(state);
        if freed {
            self.shared.not_full.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn config(max_entries: usize, max_chunk_size: usize, delay_ms: u64) -> BufferConfig {
        BufferConfig {
            kind: BufferKind::Memory,
            max_entries,
            max_chunk_size,
            max_chunk_delay: Duration::from_millis(delay_ms),
        }
    }

    fn entry(n: i64) -> Entry {
        Entry::from_record(json!(n))
    }

    #[tokio::test]
    async fn chunk_returns_what_accumulated() {
        let buffer = MemoryBuffer::new(&config(16, 10, 50));
        let ctx = CancellationToken::new();
        buffer.add(&ctx, entry(1)).await.unwrap();
        buffer.add(&ctx, entry(2)).await.unwrap();

        let (entries, _clearer) = buffer.read_chunk(&ctx).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record, json!(1));
    }

    #[tokio::test]
    async fn full_chunk_returns_without_delay() {
        tokio::time::pause();
        let buffer = MemoryBuffer::new(&config(16, 2, 60_000));
        let ctx = CancellationToken::new();
        buffer.add(&ctx, entry(1)).await.unwrap();
        buffer.add(&ctx, entry(2)).await.unwrap();
        buffer.add(&ctx, entry(3)).await.unwrap();

        // A full chunk is available; the 60s delay must not be waited.
        let (entries, _clearer) = buffer.read_chunk(&ctx).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn second_read_does_not_reissue() {
        let buffer = MemoryBuffer::new(&config(16, 2, 10));
        let ctx = CancellationToken::new();
        for n in 0..4 {
            buffer.add(&ctx, entry(n)).await.unwrap();
        }

        let (first, _c1) = buffer.read_chunk(&ctx).await.unwrap();
        let (second, _c2) = buffer.read_chunk(&ctx).await.unwrap();
        assert_eq!(first[0].record, json!(0));
        assert_eq!(second[0].record, json!(2));
    }

    #[tokio::test]
    async fn entries_stay_resident_until_marked() {
        let buffer = MemoryBuffer::new(&config(16, 4, 10));
        let ctx = CancellationToken::new();
        for n in 0..4 {
            buffer.add(&ctx, entry(n)).await.unwrap();
        }
        assert_eq!(buffer.len(), 4);

        let (entries, mut clearer) = buffer.read_chunk(&ctx).await.unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(buffer.len(), 4);

        clearer.mark_range_as_flushed(0, 2).unwrap();
        assert_eq!(buffer.len(), 2);
        clearer.mark_all_as_flushed().unwrap();
        assert_eq!(buffer.len(), 0);
    }

    #[tokio::test]
    async fn add_blocks_at_capacity_until_flush() {
        let buffer = MemoryBuffer::new(&config(2, 2, 10));
        let ctx = CancellationToken::new();
        buffer.add(&ctx, entry(1)).await.unwrap();
        buffer.add(&ctx, entry(2)).await.unwrap();

        let blocked = {
            let buffer = buffer.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { buffer.add(&ctx, entry(3)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        let (_, mut clearer) = buffer.read_chunk(&ctx).await.unwrap();
        clearer.mark_all_as_flushed().unwrap();
        blocked.await.unwrap().unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_add_does_not_enqueue() {
        let buffer = MemoryBuffer::new(&config(1, 1, 10));
        let ctx = CancellationToken::new();
        buffer.add(&ctx, entry(1)).await.unwrap();

        let blocked = {
            let buffer = buffer.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { buffer.add(&ctx, entry(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();
        let result = blocked.await.unwrap();
        assert!(matches!(result, Err(BufferError::Cancelled)));
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn empty_read_blocks_until_entry_arrives() {
        let buffer = MemoryBuffer::new(&config(4, 4, 20));
        let ctx = CancellationToken::new();

        let reader = {
            let buffer = buffer.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { buffer.read_chunk(&ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!reader.is_finished());

        buffer.add(&ctx, entry(7)).await.unwrap();
        let (entries, _clearer) = reader.await.unwrap().unwrap();
        assert_eq!(entries[0].record, json!(7));
    }

    #[tokio::test]
    async fn cancelled_read_returns_cancelled() {
        let buffer = MemoryBuffer::new(&config(4, 4, 20));
        let ctx = CancellationToken::new();
        let reader = {
            let buffer = buffer.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { buffer.read_chunk(&ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();
        assert!(matches!(reader.await.unwrap(), Err(BufferError::Cancelled)));
    }

    #[test]
    fn out_of_range_flush_is_rejected() {
        let buffer = MemoryBuffer::new(&config(4, 4, 10));
        let mut clearer = MemoryClearer {
            shared: Arc::clone(&buffer.shared),
            lo: 0,
            len: 2,
        };
        assert!(matches!(
            clearer.mark_range_as_flushed(0, 3),
            Err(BufferError::InvalidRange { .. })
        ));
    }
}
