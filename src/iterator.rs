//! User-facing iterator over the engine.
//!
//! Wraps an index snapshot iterator, applies the optional prefix filter and
//! dereferences positions into values on demand under the engine read lock.

use bytes::Bytes;

use crate::db::Engine;
use crate::index::IndexIterator;
use crate::options::IteratorOptions;
use crate::Result;

/// Iterator over the engine's keys in byte-lexicographic order.
pub struct EngineIterator<'a> {
    engine: &'a Engine,
    index_iter: IndexIterator,
    options: IteratorOptions,
}

impl Engine {
    /// Create an iterator with the given options.
    pub fn iterator(&self, options: IteratorOptions) -> Result<EngineIterator<'_>> {
        let index_iter = self.index.iterator(options.reverse)?;
        let mut iter = EngineIterator {
            engine: self,
            index_iter,
            options,
        };
        iter.skip_to_next();
        Ok(iter)
    }
}

impl EngineIterator<'_> {
    /// Go back to the first matching entry.
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_next();
    }

    /// Position at the first matching key >= `key` (<= in reverse).
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_next();
    }

    /// Advance to the next matching entry.
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_next();
    }

    /// Whether the iterator points at an entry.
    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    /// Key at the current entry.
    pub fn key(&self) -> &Bytes {
        self.index_iter.key()
    }

    /// Value at the current entry, read from its data file.
    pub fn value(&self) -> Result<Bytes> {
        let pos = self.index_iter.value();
        let inner = self.engine.inner.read();
        self.engine.read_value_at(&inner, &pos)
    }

    /// Skip entries that do not carry the configured prefix.
    fn skip_to_next(&mut self) {
        let prefix = &self.options.prefix;
        if prefix.is_empty() {
            return;
        }

        while self.index_iter.valid() {
            let key = self.index_iter.key();
            if key.len() >= prefix.len() && &key[..prefix.len()] == prefix.as_slice() {
                break;
            }
            self.index_iter.next();
        }
    }
}
