//! The live cached document.
//!
//! Readers clone an `Arc` under a short read lock; the scheduler replaces the
//! whole entry under the write lock, so a reader sees either the old or the
//! new document and never a partially built one.

use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};

use super::error::MetadataError;

/// A successfully fetched document plus its freshness metadata.
#[derive(Debug)]
pub struct CachedDocument<D> {
    document: Arc<D>,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    source_identifier: String,
}

impl<D> CachedDocument<D> {
    pub fn new(
        document: D,
        fetched_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        source_identifier: impl Into<String>,
    ) -> Self {
        Self {
            document: Arc::new(document),
            fetched_at,
            expires_at,
            source_identifier: source_identifier.into(),
        }
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn source_identifier(&self) -> &str {
        &self.source_identifier
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The same document with a renewed freshness window.
    pub(crate) fn renewed(&self, fetched_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            document: Arc::clone(&self.document),
            fetched_at,
            expires_at,
            source_identifier: self.source_identifier.clone(),
        }
    }
}

/// Holder of the single live [`CachedDocument`].
#[derive(Debug)]
pub struct MetadataCache<D> {
    current: RwLock<Option<Arc<CachedDocument<D>>>>,
}

impl<D> Default for MetadataCache<D> {
    fn default() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }
}

impl<D> MetadataCache<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document, or `Unavailable` if there is none or if it has
    /// expired while `require_valid` is set.
    pub fn get(
        &self,
        now: DateTime<Utc>,
        require_valid: bool,
    ) -> Result<Arc<CachedDocument<D>>, MetadataError> {
        let current = self.peek().ok_or(MetadataError::Unavailable)?;

        if require_valid && current.is_expired(now) {
            return Err(MetadataError::Unavailable);
        }

        Ok(current)
    }

    /// Current document regardless of expiry.
    pub fn peek(&self) -> Option<Arc<CachedDocument<D>>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the live document, returning the previous one.
    pub(crate) fn swap(&self, document: CachedDocument<D>) -> Option<Arc<CachedDocument<D>>> {
        let document = Arc::new(document);
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        current.replace(document)
    }

    /// Drop the live document.
    pub fn invalidate(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
