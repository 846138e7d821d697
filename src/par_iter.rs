//! Parallel, order-preserving iteration over an [`Indexable`] source.
//!
//! A fixed pool of worker threads fetches elements out of order while the
//! main thread reassembles them into the original sequence. The shape
//! mirrors `dpc-pariter`'s `parallel_map`: two bounded `crossbeam-channel`
//! channels, a soft in-flight cap kept below the channel capacity so there
//! is always headroom for a worker to post its result, and an index-keyed
//! buffer for results that arrive ahead of the one currently being
//! yielded.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::config::{resolve_nprocs, ParIterConfig};
use crate::error::{AccessError, SourceCause};
use crate::indexable::Indexable;
use crate::invariants::debug_assert_reorder_domain;

type WorkerResult<T> = (usize, Result<T, SourceCause>);

/// Start fetching elements of `source` using worker threads.
///
/// `nprocs` is the worker count: values `<= 0` are resolved relative to the
/// number of logical CPUs (see [`ParIterConfig::with_nprocs`]). Results come
/// back in the original order regardless of which worker finished first. A
/// failed access surfaces as `Some(Err(AccessError))` exactly once, after
/// which the iterator is exhausted.
pub fn par_iter<S>(source: S, nprocs: isize) -> ParIter<S::Item>
where
    S: Indexable + Send + Sync + 'static,
    S::Item: Send + 'static,
{
    ParIter::new(source, nprocs)
}

/// Like [`par_iter`], but sized from a [`ParIterConfig`] built with its
/// `with_*` methods instead of a raw worker count.
pub fn par_iter_with_config<S>(source: S, config: ParIterConfig) -> ParIter<S::Item>
where
    S: Indexable + Send + Sync + 'static,
    S::Item: Send + 'static,
{
    ParIter::new(source, config.nprocs())
}

enum WorkerMsg {
    Index(usize),
    Stop,
}

/// Iterator returned by [`par_iter`]. Yields `Result<T, AccessError>` in the
/// original index order.
pub struct ParIter<T> {
    q_in: Sender<WorkerMsg>,
    q_out: Receiver<WorkerResult<T>>,
    workers: Vec<JoinHandle<()>>,
    nprocs: usize,
    n: usize,
    n_injected: usize,
    n_done: usize,
    pending: HashMap<usize, T>,
    cleaned_up: bool,
}

impl<T: Send + 'static> ParIter<T> {
    fn new<S>(source: S, nprocs: isize) -> Self
    where
        S: Indexable<Item = T> + Send + Sync + 'static,
    {
        let n = source.len();
        let nprocs = resolve_nprocs(nprocs);

        let (in_tx, in_rx) = bounded::<WorkerMsg>(2 * nprocs);
        let (out_tx, out_rx) = bounded::<WorkerResult<T>>(2 * nprocs);

        let source = Arc::new(source);
        let mut workers = Vec::with_capacity(nprocs);
        for _ in 0..nprocs {
            let in_rx = in_rx.clone();
            let out_tx = out_tx.clone();
            let source = Arc::clone(&source);
            workers.push(thread::spawn(move || worker_loop(source, in_rx, out_tx)));
        }
        // Drop the parent's sender clone so the channel can only be closed
        // once every worker's own clone is gone.
        drop(out_tx);
        drop(in_rx);

        Self {
            q_in: in_tx,
            q_out: out_rx,
            workers,
            nprocs,
            n,
            n_injected: 0,
            n_done: 0,
            pending: HashMap::new(),
            cleaned_up: false,
        }
    }

    /// Dispatch as many indexes as fit under the soft in-flight cap.
    fn pump(&mut self) {
        if self.cleaned_up {
            return;
        }
        while self.n_injected < self.n && self.q_in.len() < self.nprocs {
            if self
                .q_in
                .send(WorkerMsg::Index(self.n_injected))
                .is_err()
            {
                return;
            }
            self.n_injected += 1;
        }
    }

    /// Drain `q_out`, send a stop sentinel to every worker, and join them.
    /// Safe to call more than once; only the first call does anything.
    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        while self.q_out.try_recv().is_ok() {}
        for _ in 0..self.nprocs {
            let _ = self.q_in.send(WorkerMsg::Stop);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<T: Send + 'static> Iterator for ParIter<T> {
    type Item = Result<T, AccessError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cleaned_up {
            return None;
        }
        loop {
            if self.n_done >= self.n {
                self.cleanup();
                return None;
            }
            if let Some(v) = self.pending.remove(&self.n_done) {
                self.n_done += 1;
                self.pump();
                return Some(Ok(v));
            }
            self.pump();
            let (idx, result) = match self.q_out.recv() {
                Ok(msg) => msg,
                Err(_) => {
                    // Every worker exited without posting a final result;
                    // only possible if a worker panicked outside the
                    // catch_unwind boundary, which this crate never does.
                    self.cleanup();
                    return None;
                }
            };
            debug_assert_reorder_domain!(idx, self.n_done, self.n_injected);
            match result {
                Ok(v) => {
                    if idx == self.n_done {
                        self.n_done += 1;
                        self.pump();
                        return Some(Ok(v));
                    }
                    self.pending.insert(idx, v);
                }
                Err(cause) => {
                    self.cleanup();
                    return Some(Err(AccessError::indexed(idx, cause)));
                }
            }
        }
    }
}

impl<T> Drop for ParIter<T> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn worker_loop<S>(source: Arc<S>, in_rx: Receiver<WorkerMsg>, out_tx: Sender<WorkerResult<S::Item>>)
where
    S: Indexable,
{
    loop {
        let msg = match in_rx.recv() {
            Ok(msg) => msg,
            Err(_) => return,
        };
        let index = match msg {
            WorkerMsg::Stop => return,
            WorkerMsg::Index(i) => i,
        };

        let result = catch_unwind(AssertUnwindSafe(|| source.get(index)))
            .map_err(SourceCause::from_panic);
        if out_tx.send((index, result)).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order_across_many_workers() {
        let data: Vec<i32> = (0..500).collect();
        let results: Result<Vec<i32>, AccessError> = par_iter(data.clone(), 8).collect();
        assert_eq!(results.unwrap(), data);
    }

    #[test]
    fn single_worker_still_preserves_order() {
        let data: Vec<i32> = (0..50).collect();
        let results: Result<Vec<i32>, AccessError> = par_iter(data.clone(), 1).collect();
        assert_eq!(results.unwrap(), data);
    }

    #[test]
    fn empty_source_yields_nothing() {
        let data: Vec<i32> = Vec::new();
        let mut it = par_iter(data, 4);
        assert!(it.next().is_none());
    }

    #[test]
    fn with_config_entry_point_matches_plain_nprocs() {
        let data: Vec<i32> = (0..30).collect();
        let config = ParIterConfig::default().with_nprocs(3);
        let results: Result<Vec<i32>, AccessError> =
            par_iter_with_config(data.clone(), config).collect();
        assert_eq!(results.unwrap(), data);
    }

    #[test]
    fn negative_nprocs_resolves_relative_to_cpu_count() {
        let data: Vec<i32> = (0..10).collect();
        let results: Result<Vec<i32>, AccessError> = par_iter(data.clone(), -1).collect();
        assert_eq!(results.unwrap(), data);
    }

    #[test]
    fn panicking_access_surfaces_as_access_error_then_exhausts() {
        struct PanicsOnThree;
        impl Indexable for PanicsOnThree {
            type Item = i32;
            fn len(&self) -> usize {
                10
            }
            fn get(&self, index: usize) -> i32 {
                if index == 3 {
                    panic!("bad index");
                }
                index as i32
            }
        }

        let mut it = par_iter(PanicsOnThree, 4);
        let mut saw_error = false;
        let mut count = 0;
        for item in &mut it {
            count += 1;
            if let Err(e) = item {
                saw_error = true;
                assert_eq!(e.index(), Some(3));
                break;
            }
        }
        assert!(saw_error);
        assert!(count <= 10);
        assert!(it.next().is_none());
    }

    #[test]
    fn dropping_mid_iteration_does_not_hang() {
        let data: Vec<i32> = (0..1000).collect();
        let mut it = par_iter(data, 4);
        for _ in 0..5 {
            it.next();
        }
        drop(it);
    }
}
