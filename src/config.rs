//! Configuration structs for [`crate::par_iter`] and [`crate::chunk_load`].
//!
//! Follows the same builder-with-defaults shape used throughout the
//! surrounding crates: a plain struct, a `Default` impl, and `with_*`
//! methods that consume and return `Self`.

/// Sizing knobs for [`crate::par_iter`]'s worker pool.
#[derive(Debug, Clone, Copy)]
pub struct ParIterConfig {
    nprocs: isize,
}

impl Default for ParIterConfig {
    fn default() -> Self {
        Self { nprocs: 0 }
    }
}

impl ParIterConfig {
    /// Use exactly `nprocs` workers. Zero or negative values are resolved
    /// relative to the number of logical CPUs at call time: `0` means "one
    /// worker per CPU", `-1` means "all CPUs but one", and so on.
    pub fn with_nprocs(mut self, nprocs: isize) -> Self {
        self.nprocs = nprocs;
        self
    }

    /// One worker per available CPU. Equivalent to the default.
    pub fn all_cpus() -> Self {
        Self { nprocs: 0 }
    }

    /// Leave one CPU free for the caller's own thread.
    pub fn leave_one_free() -> Self {
        Self { nprocs: -1 }
    }

    pub(crate) fn nprocs(&self) -> isize {
        self.nprocs
    }
}

/// Resolve a raw `nprocs` value (as stored in [`ParIterConfig`]) into a
/// concrete worker count, never less than one.
pub(crate) fn resolve_nprocs(nprocs: isize) -> usize {
    if nprocs <= 0 {
        let available = num_cpus::get() as isize;
        let resolved = available + nprocs;
        if resolved <= 0 {
            1
        } else {
            resolved as usize
        }
    } else {
        nprocs as usize
    }
}

/// Sizing and padding knobs for [`crate::chunk_load`]'s ring buffer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLoadConfig {
    chunk_size: usize,
    pad_last: bool,
}

impl ChunkLoadConfig {
    /// Create a configuration that yields chunks of `chunk_size` elements.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        Self {
            chunk_size,
            pad_last: false,
        }
    }

    /// If set, a short final chunk is zero-padded up to `chunk_size` instead
    /// of being yielded at its natural, shorter length.
    pub fn with_pad_last(mut self, pad_last: bool) -> Self {
        self.pad_last = pad_last;
        self
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn pad_last(&self) -> bool {
        self.pad_last
    }
}
