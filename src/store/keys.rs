//! Key layout and encoding for the work-item partitions
//!
//! Partition structure:
//! - `items`: {id: u64 BE} -> WorkItem (JSON)
//! - `supplier_index`: {supplier} 0x00 {id: u64 BE} -> empty
//! - `url_index`: {supplier} 0x00 {url} -> {id: u64 BE}
//! - `status_index`: {supplier} 0x00 {status tag: u8} {id: u64 BE} -> empty
//! - `lease_index`: {locked_at millis: u64 BE, sign-flipped} {id: u64 BE} -> empty
//!   (processing items only)
//! - `reparse_index`: {supplier} 0x00 {last_parsed_at millis, sign-flipped} {id: u64 BE}
//!   -> empty (done items only; never-parsed sorts first)
//! - `metadata`: next_id -> u64 BE, index_version -> u8
//!
//! Big-endian ids keep prefix scans in allocation (creation) order.

use chrono::{DateTime, Utc};

use super::error::{Result, StoreError};
use super::model::ItemStatus;

const SEPARATOR: u8 = 0x00;

pub const NEXT_ID_KEY: &[u8] = b"next_id";
pub const INDEX_VERSION_KEY: &[u8] = b"index_version";

/// Bumped whenever the derived index layout changes; a mismatch triggers a rebuild on open
pub const INDEX_VERSION: u8 = 1;

pub fn encode_item_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn decode_id(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::InvalidKey(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Prefix covering every item of a supplier in the supplier index
pub fn encode_supplier_prefix(supplier: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(supplier.len() + 1);
    key.extend_from_slice(supplier.as_bytes());
    key.push(SEPARATOR);
    key
}

pub fn encode_supplier_key(supplier: &str, id: u64) -> Vec<u8> {
    let mut key = encode_supplier_prefix(supplier);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Trailing 8 bytes (the item id) of any index key
pub fn decode_trailing_id(key: &[u8]) -> Result<u64> {
    if key.len() < 9 {
        return Err(StoreError::InvalidKey(format!(
            "index key too short ({} bytes)",
            key.len()
        )));
    }
    decode_id(&key[key.len() - 8..])
}

pub fn encode_url_key(supplier: &str, url: &str) -> Vec<u8> {
    let mut key = encode_supplier_prefix(supplier);
    key.extend_from_slice(url.as_bytes());
    key
}

fn status_tag(status: ItemStatus) -> u8 {
    match status {
        ItemStatus::Pending => b'p',
        ItemStatus::Processing => b'r',
        ItemStatus::Done => b'd',
        ItemStatus::Failed => b'f',
        ItemStatus::Blocked => b'b',
    }
}

/// Millisecond timestamp as bytes whose lexical order matches time order
fn encode_instant(at: Option<DateTime<Utc>>) -> [u8; 8] {
    let millis = at.map_or(i64::MIN, |at| at.timestamp_millis());
    ((millis as u64) ^ (1 << 63)).to_be_bytes()
}

/// Exclusive upper bound covering every instant in the same millisecond as `at` or earlier
fn encode_instant_bound(at: DateTime<Utc>) -> [u8; 8] {
    let millis = at.timestamp_millis().saturating_add(1);
    ((millis as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn encode_status_prefix(supplier: &str, status: ItemStatus) -> Vec<u8> {
    let mut key = encode_supplier_prefix(supplier);
    key.push(status_tag(status));
    key
}

pub fn encode_status_key(supplier: &str, status: ItemStatus, id: u64) -> Vec<u8> {
    let mut key = encode_status_prefix(supplier, status);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn encode_lease_key(locked_at: Option<DateTime<Utc>>, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&encode_instant(locked_at));
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Upper bound of the lease index range holding leases granted at or before `at`
pub fn encode_lease_bound(at: DateTime<Utc>) -> Vec<u8> {
    encode_instant_bound(at).to_vec()
}

pub fn encode_reparse_key(supplier: &str, last_parsed_at: Option<DateTime<Utc>>, id: u64) -> Vec<u8> {
    let mut key = encode_supplier_prefix(supplier);
    key.extend_from_slice(&encode_instant(last_parsed_at));
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Upper bound of the supplier's reparse range holding items parsed at or before `at`
pub fn encode_reparse_bound(supplier: &str, at: DateTime<Utc>) -> Vec<u8> {
    let mut key = encode_supplier_prefix(supplier);
    key.extend_from_slice(&encode_instant_bound(at));
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_keys_sort_by_id() {
        assert!(encode_item_key(2) < encode_item_key(10));
        assert!(encode_item_key(255) < encode_item_key(256));
        assert_eq!(decode_id(&encode_item_key(42)).unwrap(), 42);
    }

    #[test]
    fn test_supplier_key_round_trip() {
        let key = encode_supplier_key("acme", 7);
        assert!(key.starts_with(&encode_supplier_prefix("acme")));
        assert_eq!(decode_trailing_id(&key).unwrap(), 7);
    }

    #[test]
    fn test_supplier_prefix_does_not_match_longer_names() {
        let key = encode_supplier_key("acme-west", 1);
        assert!(!key.starts_with(&encode_supplier_prefix("acme")));
    }

    #[test]
    fn test_instant_keys_sort_by_time() {
        let early = DateTime::from_timestamp_millis(-5_000).unwrap();
        let epoch = DateTime::from_timestamp_millis(0).unwrap();
        let late = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();

        assert!(encode_lease_key(None, 9) < encode_lease_key(Some(early), 1));
        assert!(encode_lease_key(Some(early), 9) < encode_lease_key(Some(epoch), 1));
        assert!(encode_lease_key(Some(epoch), 9) < encode_lease_key(Some(late), 1));
        assert!(encode_lease_key(Some(late), u64::MAX) < encode_lease_bound(late));
        assert!(encode_lease_bound(epoch) < encode_lease_key(Some(late), 0));
    }

    #[test]
    fn test_reparse_bound_stays_inside_supplier() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let bound = encode_reparse_bound("acme", at);
        assert!(bound.starts_with(&encode_supplier_prefix("acme")));
        assert!(encode_reparse_key("acme", None, 3) < bound);
        assert!(encode_reparse_key("acme", Some(at), 3) < bound);
        assert!(encode_reparse_key("acmf", None, 0) > bound);
    }

    #[test]
    fn test_status_keys_group_by_status() {
        let key = encode_status_key("acme", ItemStatus::Pending, 4);
        assert!(key.starts_with(&encode_status_prefix("acme", ItemStatus::Pending)));
        assert!(!key.starts_with(&encode_status_prefix("acme", ItemStatus::Done)));
        assert_eq!(decode_trailing_id(&key).unwrap(), 4);
    }

    #[test]
    fn test_decode_rejects_short_keys() {
        assert!(matches!(decode_id(b"abc"), Err(StoreError::InvalidKey(_))));
        assert!(decode_trailing_id(b"a\0").is_err());
    }
}
