//! Owned entry iterator with an explicit status.
//!
//! Enumeration results are collected under one point-in-time read handle
//! and handed out as an owned iterator, so concurrent mutation can never
//! skip or duplicate entries mid-walk. Failures (closed engine, backend
//! fault) surface through [`EntryIter::status`] instead of a `Result` at
//! creation time; callers iterate, then check.

use keelfs_common::Error;

/// Finite, forward-only sequence of (key, value) pairs.
#[derive(Debug)]
pub struct EntryIter {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    status: Option<Error>,
}

impl EntryIter {
    pub(crate) fn ok(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            entries: entries.into_iter(),
            status: None,
        }
    }

    pub(crate) fn failed(error: Error) -> Self {
        Self {
            entries: Vec::new().into_iter(),
            status: Some(error),
        }
    }

    /// The failure that produced this iterator, if any.
    ///
    /// A failed iterator yields no entries; an empty collection is not a
    /// failure.
    #[must_use]
    pub fn status(&self) -> Option<&Error> {
        self.status.as_ref()
    }

    /// Whether the enumeration succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_none()
    }

    /// Entries left to yield.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }
}

impl Iterator for EntryIter {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for EntryIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_iterator_yields_in_order() {
        let mut iter = EntryIter::ok(vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ]);
        assert!(iter.is_ok());
        assert_eq!(iter.len(), 2);
        assert_eq!(iter.next(), Some((b"a".to_vec(), b"1".to_vec())));
        assert_eq!(iter.next(), Some((b"b".to_vec(), b"2".to_vec())));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_failed_iterator_is_empty_with_status() {
        let mut iter = EntryIter::failed(Error::StorageClosed);
        assert!(!iter.is_ok());
        assert!(iter.status().is_some_and(Error::is_closed));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_empty_is_not_a_failure() {
        let iter = EntryIter::ok(Vec::new());
        assert!(iter.is_ok());
        assert!(iter.is_empty());
    }
}
