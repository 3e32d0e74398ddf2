//! Key layout for the `data` and `fields` databases
//!
//! Names are length-prefixed so that the encoding of a (database, series)
//! pair is never a prefix of another pair's encoding:
//!
//! ```text
//! series prefix : len(db) u32 BE | db | len(series) u32 BE | series
//! column key    : series prefix  | field_id u64 BE | timestamp (sign-flipped) u64 BE | seq u32 BE
//! catalog key   : series prefix  | len(name) u32 BE | name
//! ```
//!
//! Within one column prefix, ascending key order is ascending
//! (timestamp, sequence number) order.

use chronos_core::{ChronosError, FieldId, Result, SequenceNumber, Timestamp};

const TIMESTAMP_LEN: usize = 8;
const SEQUENCE_LEN: usize = 4;

/// Meta keys used in the meta database
pub mod meta_keys {
    pub const NEXT_FIELD_ID: &str = "next_field_id";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Current on-disk layout version
pub const SCHEMA_VERSION: u32 = 1;

fn encode_str(s: &str, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn decode_str(buf: &[u8]) -> Result<(String, &[u8])> {
    if buf.len() < 4 {
        return Err(ChronosError::Corruption(
            "buffer too short for string length".into(),
        ));
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let rest = &buf[4..];
    if rest.len() < len {
        return Err(ChronosError::Corruption(format!(
            "string length {} exceeds remaining {} bytes",
            len,
            rest.len()
        )));
    }
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|e| ChronosError::Corruption(e.to_string()))?
        .to_string();
    Ok((s, &rest[len..]))
}

/// Prefix shared by every key of one database
pub fn database_prefix(database: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + database.len());
    encode_str(database, &mut buf);
    buf
}

/// Prefix shared by every key of one series
pub fn series_prefix(database: &str, series: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + database.len() + series.len());
    encode_str(database, &mut buf);
    encode_str(series, &mut buf);
    buf
}

/// Prefix shared by every entry of one field's column
pub fn column_prefix(database: &str, series: &str, field_id: FieldId) -> Vec<u8> {
    let mut buf = series_prefix(database, series);
    buf.extend_from_slice(&field_id.to_be_bytes());
    buf
}

/// Flip the sign bit so that big-endian byte order matches signed order
fn timestamp_to_bytes(ts: Timestamp) -> [u8; TIMESTAMP_LEN] {
    ((ts as u64) ^ (1 << 63)).to_be_bytes()
}

fn timestamp_from_bytes(bytes: [u8; TIMESTAMP_LEN]) -> Timestamp {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

/// Key of one column entry under an already-built column prefix
pub fn encode_column_key(prefix: &[u8], ts: Timestamp, seq: SequenceNumber) -> Vec<u8> {
    let mut buf = Vec::with_capacity(prefix.len() + TIMESTAMP_LEN + SEQUENCE_LEN);
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(&timestamp_to_bytes(ts));
    buf.extend_from_slice(&seq.to_be_bytes());
    buf
}

/// Recover (timestamp, sequence number) from a column key with a known prefix
pub fn decode_column_key(prefix: &[u8], key: &[u8]) -> Result<(Timestamp, SequenceNumber)> {
    if key.len() != prefix.len() + TIMESTAMP_LEN + SEQUENCE_LEN || !key.starts_with(prefix) {
        return Err(ChronosError::Corruption(format!(
            "column key of {} bytes does not extend the expected prefix",
            key.len()
        )));
    }
    let rest = &key[prefix.len()..];
    let mut ts = [0u8; TIMESTAMP_LEN];
    ts.copy_from_slice(&rest[..TIMESTAMP_LEN]);
    let mut seq = [0u8; SEQUENCE_LEN];
    seq.copy_from_slice(&rest[TIMESTAMP_LEN..]);
    Ok((timestamp_from_bytes(ts), SequenceNumber::from_be_bytes(seq)))
}

/// Catalog key of a field
pub fn field_key(database: &str, series: &str, field: &str) -> Vec<u8> {
    let mut buf = series_prefix(database, series);
    encode_str(field, &mut buf);
    buf
}

/// Field name from a catalog key under the given series prefix
pub fn decode_field_name(series_prefix: &[u8], key: &[u8]) -> Result<String> {
    let rest = key.strip_prefix(series_prefix).ok_or_else(|| {
        ChronosError::Corruption("catalog key outside of its series prefix".into())
    })?;
    let (name, tail) = decode_str(rest)?;
    if !tail.is_empty() {
        return Err(ChronosError::Corruption(
            "trailing bytes after field name".into(),
        ));
    }
    Ok(name)
}

/// Series name from a catalog key under the given database prefix
pub fn decode_series_name(database_prefix: &[u8], key: &[u8]) -> Result<String> {
    let rest = key.strip_prefix(database_prefix).ok_or_else(|| {
        ChronosError::Corruption("catalog key outside of its database prefix".into())
    })?;
    let (series, _) = decode_str(rest)?;
    Ok(series)
}

/// Smallest key greater than every key starting with `prefix`
///
/// `None` when no such key exists (the prefix is all `0xff`).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_key_roundtrip() {
        let prefix = column_prefix("db1", "events", 7);
        let key = encode_column_key(&prefix, -42, 3);
        assert_eq!(decode_column_key(&prefix, &key).unwrap(), (-42, 3));
    }

    #[test]
    fn test_sort_order_follows_time_then_sequence() {
        let prefix = column_prefix("test", "foo", 0);
        let ordered = [
            (i64::MIN, 0),
            (-1, u32::MAX),
            (0, 0),
            (0, 1),
            (0, 2),
            (1, 0),
            (1_700_000_000, 5),
            (i64::MAX, u32::MAX),
        ];
        let keys: Vec<_> = ordered
            .iter()
            .map(|(ts, seq)| encode_column_key(&prefix, *ts, *seq))
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_series_prefixes_do_not_nest() {
        // "ab"/"c" and "a"/"bc" must not share a prefix relation
        let a = series_prefix("ab", "c");
        let b = series_prefix("a", "bc");
        assert!(!a.starts_with(&b) && !b.starts_with(&a));

        let foo = series_prefix("db", "foo");
        let foobar = series_prefix("db", "foobar");
        assert!(!foobar.starts_with(&foo));
    }

    #[test]
    fn test_decode_rejects_foreign_prefix() {
        let prefix = column_prefix("db1", "events", 1);
        let other = column_prefix("db2", "events", 1);
        let key = encode_column_key(&other, 10, 1);
        assert!(matches!(
            decode_column_key(&prefix, &key),
            Err(ChronosError::Corruption(_))
        ));
    }

    #[test]
    fn test_field_and_series_names_decode() {
        let key = field_key("db", "cpu", "load");
        assert_eq!(
            decode_field_name(&series_prefix("db", "cpu"), &key).unwrap(),
            "load"
        );
        assert_eq!(
            decode_series_name(&database_prefix("db"), &key).unwrap(),
            "cpu"
        );
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(&[1, 2, 3]), Some(vec![1, 2, 4]));
        assert_eq!(prefix_successor(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_successor(&[0xff, 0xff]), None);
    }
}
