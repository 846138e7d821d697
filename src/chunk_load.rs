//! Chunked ring-buffer loading: stream K parallel iterators into caller-owned
//! buffers and yield a view every time a full chunk has been written.
//!
//! A single loader thread advances the sources and writes into a ring of
//! `n_chunks` buffer-relative slots; the caller's thread reads back views
//! once a producer has signaled a slot is full. Coordination between the
//! two is two counting semaphores (`rsem` for readable chunks, `wsem` for
//! writable ones). Cross-thread mutation of the shared buffers is
//! expressed with a raw pointer guarded by that handshake, asserting
//! `Send`/`Sync` by hand on `RingStorage` rather than leaning on a lock
//! the protocol makes unnecessary.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::config::ChunkLoadConfig;
use crate::error::{AccessError, SourceCause};
use crate::invariants::{debug_assert_initial_wsem_available, debug_assert_ring_bounds};
use crate::semaphore::Semaphore;

/// Destination storage for one lane of a [`chunk_load`] run.
///
/// Implementations must support writing any element to any in-range
/// index, and returning a borrowed slice over a contiguous range.
pub trait Buffer<T> {
    /// Total capacity of this buffer. `chunk_load` truncates this down to
    /// a multiple of `chunk_size` before using it.
    fn len(&self) -> usize;

    /// Whether the buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the element at `index`.
    fn set(&mut self, index: usize, value: T);

    /// Borrow `self[start..end]`.
    fn slice(&self, start: usize, end: usize) -> &[T];

    /// Overwrite `self[start..end]` with `T::default()`. Used to pad a
    /// short final chunk when `pad_last` is requested.
    fn zero_fill(&mut self, start: usize, end: usize)
    where
        T: Default,
    {
        for i in start..end {
            self.set(i, T::default());
        }
    }
}

impl<T> Buffer<T> for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn set(&mut self, index: usize, value: T) {
        self[index] = value;
    }

    fn slice(&self, start: usize, end: usize) -> &[T] {
        &self[start..end]
    }
}

impl<T> Buffer<T> for Box<[T]> {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn set(&mut self, index: usize, value: T) {
        self[index] = value;
    }

    fn slice(&self, start: usize, end: usize) -> &[T] {
        &self[start..end]
    }
}

struct RingStorage<B> {
    buffers: UnsafeCell<Vec<B>>,
}

// SAFETY: access to `buffers` is only ever performed while holding the
// corresponding read or write permit from `rsem`/`wsem`, which guarantees
// the producer thread and the consumer thread never touch the same slot
// range at the same time.
unsafe impl<B: Send> Send for RingStorage<B> {}
unsafe impl<B: Send> Sync for RingStorage<B> {}

enum EndRecord {
    /// Sources ran out after writing `usize` elements into the current
    /// chunk (0 if the stream ended exactly on a chunk boundary).
    Done(usize),
    /// Advancing a source panicked.
    Fail(SourceCause),
}

/// Start loading `sources` into `buffers`, `chunk_size` elements at a time.
///
/// `sources` and `buffers` must have the same length (one source per
/// lane). Every buffer is truncated down to a multiple of `chunk_size`
/// before use; the shortest truncated buffer determines the ring length.
/// `pad_last` controls whether a short final chunk is zero-padded up to
/// `chunk_size` instead of being yielded at its natural, shorter length.
///
/// # Panics
///
/// Panics if `sources.len() != buffers.len()`, `chunk_size == 0`, or if no
/// buffer is large enough to hold even one chunk.
pub fn chunk_load<S, B, T>(
    sources: Vec<S>,
    buffers: Vec<B>,
    chunk_size: usize,
    pad_last: bool,
) -> ChunkLoad<T, B>
where
    S: Iterator<Item = T> + Send + 'static,
    B: Buffer<T> + Send + 'static,
    T: Send + Default + 'static,
{
    chunk_load_with_config(
        sources,
        buffers,
        ChunkLoadConfig::new(chunk_size).with_pad_last(pad_last),
    )
}

/// Like [`chunk_load`], but sized from a [`ChunkLoadConfig`] built with its
/// `with_*` methods instead of raw positional arguments.
pub fn chunk_load_with_config<S, B, T>(
    sources: Vec<S>,
    buffers: Vec<B>,
    config: ChunkLoadConfig,
) -> ChunkLoad<T, B>
where
    S: Iterator<Item = T> + Send + 'static,
    B: Buffer<T> + Send + 'static,
    T: Send + Default + 'static,
{
    ChunkLoad::new(sources, buffers, config)
}

/// Handle returned by [`chunk_load`]. Not a standard `Iterator`, since each
/// yielded [`ChunkView`] borrows from `self` and must not outlive the next
/// call to [`ChunkLoad::next_chunk`].
pub struct ChunkLoad<T, B> {
    storage: Arc<RingStorage<B>>,
    rsem: Semaphore,
    wsem: Semaphore,
    end_evt: Arc<AtomicBool>,
    end_data: Receiver<EndRecord>,
    chunk_size: usize,
    pad_last: bool,
    ring_len: usize,
    offset: usize,
    producer: Option<JoinHandle<()>>,
    done: bool,
    /// Whether the previously yielded chunk's write permit is still owed
    /// back to `wsem`. Released at the top of the next `next_chunk` call
    /// instead of before returning the view, so the view stays valid for
    /// as long as the caller holds it.
    wsem_owed: bool,
    _marker: PhantomData<T>,
}

impl<T, B> ChunkLoad<T, B>
where
    T: Send + Default + 'static,
    B: Buffer<T> + Send + 'static,
{
    fn new<S>(sources: Vec<S>, buffers: Vec<B>, config: ChunkLoadConfig) -> Self
    where
        S: Iterator<Item = T> + Send + 'static,
    {
        assert_eq!(
            sources.len(),
            buffers.len(),
            "chunk_load: sources and buffers must have the same length"
        );
        let chunk_size = config.chunk_size();
        let ring_len = buffers
            .iter()
            .map(|b| b.len() - b.len() % chunk_size)
            .min()
            .unwrap_or(0);
        let n_chunks = ring_len / chunk_size;
        assert!(
            n_chunks > 0,
            "chunk_load: every buffer must hold at least one chunk of {chunk_size} elements"
        );

        let storage = Arc::new(RingStorage {
            buffers: UnsafeCell::new(buffers),
        });
        let rsem = Semaphore::new(n_chunks, 0);
        let wsem = Semaphore::new(n_chunks, n_chunks);
        let end_evt = Arc::new(AtomicBool::new(false));
        let (end_tx, end_rx) = bounded::<EndRecord>(1);

        let producer_storage = Arc::clone(&storage);
        let producer_rsem = rsem.clone();
        let producer_wsem = wsem.clone();
        let producer_end_evt = Arc::clone(&end_evt);

        let producer = thread::spawn(move || {
            run_producer(
                sources,
                producer_storage,
                chunk_size,
                ring_len,
                producer_rsem,
                producer_wsem,
                producer_end_evt,
                end_tx,
            );
        });

        Self {
            storage,
            rsem,
            wsem,
            end_evt,
            end_data: end_rx,
            chunk_size,
            pad_last: config.pad_last(),
            ring_len,
            offset: 0,
            producer: Some(producer),
            done: false,
            wsem_owed: false,
            _marker: PhantomData,
        }
    }

    /// Block until either a full chunk is ready or the stream has ended,
    /// and return a view over it.
    ///
    /// Returns `None` once the sources are exhausted (after yielding any
    /// final short or padded chunk). Returns `Some(Err(_))` exactly once,
    /// if advancing a source panicked; the loader is exhausted afterward.
    pub fn next_chunk(&mut self) -> Option<Result<ChunkView<'_, T, B>, AccessError>> {
        if self.done {
            return None;
        }
        // The slot behind the previously yielded chunk is only released now,
        // once the caller has moved on to ask for the next one — not when
        // that chunk was first handed out, or the producer could start
        // overwriting it while the caller still holds the view.
        if self.wsem_owed {
            self.wsem.release();
            self.wsem_owed = false;
        }
        self.rsem.acquire();

        if !self.end_evt.load(Ordering::Acquire) {
            debug_assert_ring_bounds!(self.offset, self.ring_len);
            let view = ChunkView {
                storage: self.storage.as_ref(),
                offset: self.offset,
                len: self.chunk_size,
                _marker: PhantomData,
            };
            self.offset = (self.offset + self.chunk_size) % self.ring_len;
            self.wsem_owed = true;
            return Some(Ok(view));
        }

        let record = self.end_data.try_recv().ok();
        self.finish();
        match record {
            Some(EndRecord::Done(0)) | None => None,
            Some(EndRecord::Done(remainder)) => {
                let start = self.offset;
                let len = if self.pad_last {
                    // SAFETY: no write permit is outstanding once the
                    // stream has ended, and the consumer is the sole
                    // remaining accessor of this slot.
                    unsafe {
                        let buffers = &mut *self.storage.buffers.get();
                        for buf in buffers.iter_mut() {
                            buf.zero_fill(start + remainder, start + self.chunk_size);
                        }
                    }
                    self.chunk_size
                } else {
                    remainder
                };
                Some(Ok(ChunkView {
                    storage: self.storage.as_ref(),
                    offset: start,
                    len,
                    _marker: PhantomData,
                }))
            }
            Some(EndRecord::Fail(cause)) => Some(Err(AccessError::stream(cause))),
        }
    }

    /// Tear down the loader: stop the producer and release its resources.
    /// Safe to call more than once, and runs automatically on drop if the
    /// caller abandons the loader before it naturally ends.
    pub fn stop(&mut self) {
        if self.done {
            return;
        }
        if self.wsem_owed {
            self.wsem.release();
            self.wsem_owed = false;
        }
        self.end_evt.store(true, Ordering::Release);
        self.wsem.release();
        while self.end_data.try_recv().is_ok() {}
        self.finish();
    }

    fn finish(&mut self) {
        self.done = true;
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

impl<T, B> Drop for ChunkLoad<T, B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A borrowed view over one completed chunk, spanning every lane.
///
/// Tied to the `&mut self` borrow of the [`ChunkLoad::next_chunk`] call
/// that produced it: it must be consumed before the next call, since that
/// call releases the write permit covering this same ring slot.
pub struct ChunkView<'a, T, B> {
    storage: &'a RingStorage<B>,
    offset: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<'a, T, B: Buffer<T>> ChunkView<'a, T, B> {
    /// Number of elements in this chunk (equal to `chunk_size`, except
    /// possibly for the final chunk when padding is disabled).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow lane `k`'s slice for this chunk.
    pub fn lane(&self, k: usize) -> &[T] {
        // SAFETY: see `RingStorage`'s Send/Sync justification; this view's
        // lifetime is bounded by the `&mut self` borrow that produced it,
        // so no write permit for this slot can be outstanding concurrently.
        unsafe { (&*self.storage.buffers.get())[k].slice(self.offset, self.offset + self.len) }
    }

    /// Number of lanes (source/buffer pairs) in this run.
    pub fn lanes(&self) -> usize {
        unsafe { (&*self.storage.buffers.get()).len() }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_producer<S, B, T>(
    mut sources: Vec<S>,
    storage: Arc<RingStorage<B>>,
    chunk_size: usize,
    ring_len: usize,
    rsem: Semaphore,
    wsem: Semaphore,
    end_evt: Arc<AtomicBool>,
    end_tx: Sender<EndRecord>,
) where
    S: Iterator<Item = T>,
    B: Buffer<T>,
{
    let k = sources.len();
    let acquired = wsem.try_acquire();
    debug_assert_initial_wsem_available!(acquired);

    let mut offset = 0usize;
    loop {
        if end_evt.load(Ordering::Acquire) {
            return;
        }

        let mut samples = Vec::with_capacity(k);
        let mut exhausted = false;
        let mut panicked = None;
        for src in sources.iter_mut() {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| src.next())) {
                Ok(Some(v)) => samples.push(v),
                Ok(None) => {
                    exhausted = true;
                    break;
                }
                Err(payload) => {
                    panicked = Some(SourceCause::from_panic(payload));
                    break;
                }
            }
        }

        if let Some(cause) = panicked {
            end_evt.store(true, Ordering::Release);
            let _ = end_tx.send(EndRecord::Fail(cause));
            rsem.release();
            return;
        }
        if exhausted {
            end_evt.store(true, Ordering::Release);
            let _ = end_tx.send(EndRecord::Done(offset % chunk_size));
            rsem.release();
            return;
        }

        // SAFETY: this slot was made writable by the matching `wsem`
        // permit already held by this thread.
        unsafe {
            let buffers = &mut *storage.buffers.get();
            for (buf, sample) in buffers.iter_mut().zip(samples) {
                buf.set(offset, sample);
            }
        }
        offset += 1;
        if offset % chunk_size == 0 {
            offset %= ring_len;
            rsem.release();
            wsem.acquire();
        }
    }
}
