//! Reverse scans over one field's column
//!
//! A [`ColumnScan`] walks the keys of a (database, series, field) prefix
//! from the newest entry to the oldest, restricted to a [`TimeRange`]. The
//! range is turned into key bounds once, so the cursor never visits entries
//! outside it.

use chronos_core::{ChronosError, FieldValue, Result, SequenceNumber, Timestamp};
use lmdb::{Cursor, Database, RoCursor, Transaction};
use lmdb_sys::{MDB_LAST, MDB_PREV, MDB_SET_RANGE};

use crate::keys;

/// Inclusive range of timestamps, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn all() -> Self {
        Self {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Key bounds `[lower, upper)` under a column prefix; `upper` is `None`
    /// when the range runs to the end of the keyspace
    fn key_bounds(&self, prefix: &[u8]) -> (Vec<u8>, Option<Vec<u8>>) {
        let lower = keys::encode_column_key(prefix, self.start, 0);
        let upper = match self.end.checked_add(1) {
            Some(next) => Some(keys::encode_column_key(prefix, next, 0)),
            None => keys::prefix_successor(prefix),
        };
        (lower, upper)
    }
}

/// (timestamp, sequence number) of a point; orders like the points do
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub timestamp: Timestamp,
    pub sequence_number: SequenceNumber,
}

/// One decoded column entry
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEntry {
    pub key: RowKey,
    pub value: FieldValue,
}

impl ColumnEntry {
    pub fn new(timestamp: Timestamp, sequence_number: SequenceNumber, value: FieldValue) -> Self {
        Self {
            key: RowKey {
                timestamp,
                sequence_number,
            },
            value,
        }
    }
}

pub(crate) fn encode_value(value: &FieldValue) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ChronosError::Corruption(e.to_string()))
}

pub(crate) fn decode_value(bytes: &[u8]) -> Result<FieldValue> {
    bincode::deserialize(bytes).map_err(|e| ChronosError::Corruption(e.to_string()))
}

/// Newest-first iterator over one column inside a read transaction
pub struct ColumnScan<'txn> {
    cursor: RoCursor<'txn>,
    prefix: Vec<u8>,
    lower: Vec<u8>,
    upper: Option<Vec<u8>>,
    started: bool,
    done: bool,
}

impl<'txn> ColumnScan<'txn> {
    pub fn open<T: Transaction>(
        txn: &'txn T,
        db: Database,
        prefix: Vec<u8>,
        range: TimeRange,
    ) -> Result<Self> {
        let cursor = txn
            .open_ro_cursor(db)
            .map_err(|e| ChronosError::Storage(e.to_string()))?;
        let (lower, upper) = range.key_bounds(&prefix);
        Ok(Self {
            cursor,
            prefix,
            lower,
            upper,
            started: false,
            done: range.is_empty(),
        })
    }

    /// Position on the last key below the upper bound
    fn seek_last(&self) -> lmdb::Result<(Option<&'txn [u8]>, &'txn [u8])> {
        match &self.upper {
            Some(upper) => match self.cursor.get(Some(upper.as_slice()), None, MDB_SET_RANGE) {
                Ok(_) => self.cursor.get(None, None, MDB_PREV),
                Err(lmdb::Error::NotFound) => self.cursor.get(None, None, MDB_LAST),
                Err(e) => Err(e),
            },
            None => self.cursor.get(None, None, MDB_LAST),
        }
    }

    fn decode(&self, key: &[u8], value: &[u8]) -> Result<ColumnEntry> {
        let (timestamp, sequence_number) = keys::decode_column_key(&self.prefix, key)?;
        Ok(ColumnEntry::new(timestamp, sequence_number, decode_value(value)?))
    }
}

impl Iterator for ColumnScan<'_> {
    type Item = Result<ColumnEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let positioned = if self.started {
            self.cursor.get(None, None, MDB_PREV)
        } else {
            self.started = true;
            self.seek_last()
        };

        let result = match positioned {
            // Anything below the lower bound is older data or another prefix
            Ok((Some(key), _)) if key < self.lower.as_slice() => None,
            Ok((Some(key), value)) => Some(self.decode(key, value)),
            Ok((None, _)) => Some(Err(ChronosError::Storage(
                "cursor returned an entry without a key".into(),
            ))),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => Some(Err(ChronosError::Storage(e.to_string()))),
        };

        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}
