//! Error types raised when reading from a source fails inside a worker
//! thread or a loader thread.
//!
//! Both [`crate::par_iter`] and [`crate::chunk_load`] run user code on a
//! thread other than the caller's, so a panic inside `Indexable::get` or
//! `Iterator::next` cannot simply propagate. It is caught at the boundary
//! and turned into an [`AccessError`] that the caller observes from the
//! normal `Result`-returning API instead.

use std::any::Any;
use thiserror::Error;

/// What a worker captured about a panic that happened while accessing a
/// source.
#[derive(Debug, Error)]
pub enum SourceCause {
    /// The panic payload was a string and is reproduced verbatim.
    #[error("{0}")]
    Panic(String),
    /// The panic payload was not a `&str` or `String` and could not be
    /// turned into a message.
    #[error("cause could not be represented")]
    Opaque,
}

impl SourceCause {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        if let Some(s) = payload.downcast_ref::<&str>() {
            SourceCause::Panic((*s).to_string())
        } else if let Some(s) = payload.downcast_ref::<String>() {
            SourceCause::Panic(s.clone())
        } else {
            SourceCause::Opaque
        }
    }
}

/// The single public error type raised by this crate when a source access
/// fails.
///
/// [`par_iter`](crate::par_iter) raises the indexed variant, naming the
/// index whose access failed. [`chunk_load`](crate::chunk_load) raises the
/// stream variant, since its sources are plain iterators with no index.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Accessing `index` on an [`Indexable`](crate::Indexable) panicked.
    #[error("accessing index {index} failed")]
    Indexed {
        index: usize,
        #[source]
        cause: Option<SourceCause>,
    },
    /// Advancing one of the source iterators panicked.
    #[error("accessing source failed")]
    Stream {
        #[source]
        cause: Option<SourceCause>,
    },
}

impl AccessError {
    pub(crate) fn indexed(index: usize, cause: SourceCause) -> Self {
        AccessError::Indexed {
            index,
            cause: Some(cause),
        }
    }

    pub(crate) fn stream(cause: SourceCause) -> Self {
        AccessError::Stream { cause: Some(cause) }
    }

    /// The index whose access failed, if this error came from `par_iter`.
    pub fn index(&self) -> Option<usize> {
        match self {
            AccessError::Indexed { index, .. } => Some(*index),
            AccessError::Stream { .. } => None,
        }
    }
}
