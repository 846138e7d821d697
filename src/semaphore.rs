//! A counting semaphore built from a bounded channel of unit values.
//!
//! `crossbeam-channel` is already the transport for `par_iter`'s index and
//! result queues; reusing it here (acquire = `recv`, release = `send`)
//! avoids pulling in a second concurrency primitive for the same job, and
//! gives `chunk_load`'s ring coordination the same cancellation-safe
//! `try_recv`/`try_send` behavior the rest of the crate relies on.

use crossbeam_channel::{bounded, Receiver, Sender};

#[derive(Clone)]
pub(crate) struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Semaphore {
    /// `capacity` is the maximum number of permits the semaphore can ever
    /// hold at once; `initial` is how many it starts with.
    pub(crate) fn new(capacity: usize, initial: usize) -> Self {
        debug_assert!(initial <= capacity);
        let (tx, rx) = bounded(capacity);
        for _ in 0..initial {
            tx.try_send(())
                .expect("initial permits must fit the semaphore's capacity");
        }
        Self { tx, rx }
    }

    /// Block until a permit is available.
    pub(crate) fn acquire(&self) {
        self.rx
            .recv()
            .expect("semaphore channel disconnected unexpectedly");
    }

    /// Take a permit only if one is immediately available.
    pub(crate) fn try_acquire(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Return a permit. Never blocks: if the semaphore is already at
    /// capacity (which only happens during shutdown races) the extra
    /// permit is simply dropped, since one is already available.
    pub(crate) fn release(&self) {
        let _ = self.tx.try_send(());
    }
}
