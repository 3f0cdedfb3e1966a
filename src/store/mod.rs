//! Durable work-item store on a transactional fjall keyspace
//!
//! Every mutation runs inside [`WorkStore::write`], which holds fjall's single
//! write transaction for the duration of the closure. Readers use snapshot
//! transactions and never block writers.
//!
//! Status, lease and reparse indexes are derived from item state and kept in
//! step by [`StoreTx::put`], so the claim path only touches candidate rows.

mod error;
mod keys;
mod model;

pub use error::{Result, StoreError};
pub use model::{ItemStatus, NewWorkItem, WorkItem, window_start};

use std::path::Path;

use chrono::{DateTime, Utc};
use fjall::{
    Config, PartitionCreateOptions, PersistMode, ReadTransaction, TxKeyspace, TxPartitionHandle,
    WriteTransaction,
};
use tracing::info;

use keys::{
    INDEX_VERSION, INDEX_VERSION_KEY, NEXT_ID_KEY, decode_id, decode_trailing_id,
    encode_item_key, encode_lease_bound, encode_lease_key, encode_reparse_bound,
    encode_reparse_key, encode_status_key, encode_status_prefix, encode_supplier_key,
    encode_supplier_prefix, encode_url_key,
};

#[derive(Clone)]
struct Partitions {
    items: TxPartitionHandle,
    supplier_index: TxPartitionHandle,
    url_index: TxPartitionHandle,
    status_index: TxPartitionHandle,
    lease_index: TxPartitionHandle,
    reparse_index: TxPartitionHandle,
    metadata: TxPartitionHandle,
}

/// Derived index entries for one item state
#[derive(Debug, PartialEq, Eq)]
struct IndexKeys {
    status: Vec<u8>,
    lease: Option<Vec<u8>>,
    reparse: Option<Vec<u8>>,
}

impl IndexKeys {
    fn of(item: &WorkItem) -> Self {
        Self {
            status: encode_status_key(&item.supplier_name, item.status, item.id),
            lease: (item.status == ItemStatus::Processing)
                .then(|| encode_lease_key(item.locked_at, item.id)),
            reparse: (item.status == ItemStatus::Done && item.is_valid)
                .then(|| encode_reparse_key(&item.supplier_name, item.last_parsed_at, item.id)),
        }
    }
}

/// Fjall-backed persistent storage for work items
#[derive(Clone)]
pub struct WorkStore {
    keyspace: TxKeyspace,
    partitions: Partitions,
}

impl WorkStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening work store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open_transactional()?;

        let partitions = Partitions {
            items: keyspace.open_partition("items", PartitionCreateOptions::default())?,
            supplier_index: keyspace
                .open_partition("supplier_index", PartitionCreateOptions::default())?,
            url_index: keyspace.open_partition("url_index", PartitionCreateOptions::default())?,
            status_index: keyspace
                .open_partition("status_index", PartitionCreateOptions::default())?,
            lease_index: keyspace
                .open_partition("lease_index", PartitionCreateOptions::default())?,
            reparse_index: keyspace
                .open_partition("reparse_index", PartitionCreateOptions::default())?,
            metadata: keyspace.open_partition("metadata", PartitionCreateOptions::default())?,
        };

        let store = Self {
            keyspace,
            partitions,
        };
        store.ensure_indexes()?;

        info!("Work store opened successfully");
        Ok(store)
    }

    /// Rebuild derived indexes when they were written by an older layout (or never)
    fn ensure_indexes(&self) -> Result<()> {
        let version = self.read(|tx| tx.tx.get_raw(&tx.partitions.metadata, INDEX_VERSION_KEY))?;
        if version.as_deref() == Some(&[INDEX_VERSION][..]) {
            return Ok(());
        }

        let rebuilt = self.write(|tx| tx.rebuild_indexes())?;
        info!(items = rebuilt, version = INDEX_VERSION, "Rebuilt work store indexes");
        Ok(())
    }

    /// Run `f` inside the write transaction; commits only when `f` returns `Ok`.
    pub fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut StoreTx<'_, WriteTransaction<'_>>) -> std::result::Result<T, E>,
    {
        let tx = self.keyspace.write_tx();
        let mut store_tx = StoreTx {
            tx,
            partitions: &self.partitions,
        };
        let value = f(&mut store_tx)?;
        store_tx.tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Run `f` against a consistent snapshot
    pub fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut StoreTx<'_, ReadTransaction>) -> std::result::Result<T, E>,
    {
        let mut store_tx = StoreTx {
            tx: self.keyspace.read_tx(),
            partitions: &self.partitions,
        };
        f(&mut store_tx)
    }

    pub fn get(&self, id: u64) -> Result<Option<WorkItem>> {
        self.read(|tx| tx.get(id))
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    /// Cheap read used by the health endpoint
    pub fn health_check(&self) -> Result<()> {
        self.read(|tx| tx.check_readable())
    }
}

#[cfg(test)]
impl WorkStore {
    /// Replace an item's stored bytes without touching any index
    pub(crate) fn overwrite_raw(&self, id: u64, bytes: &[u8]) {
        self.write(|tx| {
            tx.tx
                .insert(&tx.partitions.items, encode_item_key(id), bytes.to_vec());
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }
}

/// Raw byte access shared by read and write transactions.
///
/// Iterators are drained eagerly so callers can mutate while walking results.
pub trait RawTx {
    fn get_raw(&mut self, partition: &TxPartitionHandle, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn prefix_raw(
        &mut self,
        partition: &TxPartitionHandle,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Keys in `start..end`, at most `limit` of them
    fn range_keys(
        &mut self,
        partition: &TxPartitionHandle,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<Vec<u8>>>;
}

impl RawTx for ReadTransaction {
    fn get_raw(&mut self, partition: &TxPartitionHandle, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get(partition, key)?.map(|value| value.to_vec()))
    }

    fn prefix_raw(
        &mut self,
        partition: &TxPartitionHandle,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.prefix(partition, prefix) {
            let (key, value) = entry?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn range_keys(
        &mut self,
        partition: &TxPartitionHandle,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        if start >= end {
            return Ok(out);
        }
        for entry in self.range(partition, start..end).take(limit) {
            let (key, _) = entry?;
            out.push(key.to_vec());
        }
        Ok(out)
    }
}

impl RawTx for WriteTransaction<'_> {
    fn get_raw(&mut self, partition: &TxPartitionHandle, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get(partition, key)?.map(|value| value.to_vec()))
    }

    fn prefix_raw(
        &mut self,
        partition: &TxPartitionHandle,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.prefix(partition, prefix) {
            let (key, value) = entry?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn range_keys(
        &mut self,
        partition: &TxPartitionHandle,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        if start >= end {
            return Ok(out);
        }
        for entry in self.range(partition, start..end).take(limit) {
            let (key, _) = entry?;
            out.push(key.to_vec());
        }
        Ok(out)
    }
}

/// Typed view over one fjall transaction
pub struct StoreTx<'a, T> {
    tx: T,
    partitions: &'a Partitions,
}

impl<T: RawTx> StoreTx<'_, T> {
    pub fn get(&mut self, id: u64) -> Result<Option<WorkItem>> {
        match self.tx.get_raw(&self.partitions.items, &encode_item_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_url(&mut self, supplier: &str, url: &str) -> Result<Option<WorkItem>> {
        let key = encode_url_key(supplier, url);
        match self.tx.get_raw(&self.partitions.url_index, &key)? {
            Some(raw_id) => {
                let id = decode_id(&raw_id)?;
                self.get(id)?.map(Some).ok_or(StoreError::DanglingIndex(id))
            }
            None => Ok(None),
        }
    }

    /// Items of one supplier (or all items), in creation order
    pub fn scan(&mut self, supplier: Option<&str>) -> Result<Vec<WorkItem>> {
        match supplier {
            Some(supplier) => {
                let prefix = encode_supplier_prefix(supplier);
                let entries = self.tx.prefix_raw(&self.partitions.supplier_index, &prefix)?;
                let mut items = Vec::with_capacity(entries.len());
                for (key, _) in entries {
                    let id = decode_trailing_id(&key)?;
                    let item = self.get(id)?.ok_or(StoreError::DanglingIndex(id))?;
                    items.push(item);
                }
                Ok(items)
            }
            None => self
                .tx
                .prefix_raw(&self.partitions.items, &[])?
                .into_iter()
                .map(|(_, value)| serde_json::from_slice(&value).map_err(StoreError::from))
                .collect(),
        }
    }

    /// Load the items behind index hits, in the order given
    pub fn load_many(&mut self, ids: &[u64]) -> Result<Vec<WorkItem>> {
        let mut items = Vec::with_capacity(ids.len());
        for &id in ids {
            items.push(self.get(id)?.ok_or(StoreError::DanglingIndex(id))?);
        }
        Ok(items)
    }

    /// Ids of a supplier's items in `status`, ascending, starting after `after`
    pub fn ids_with_status(
        &mut self,
        supplier: &str,
        status: ItemStatus,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<u64>> {
        let start = match after {
            Some(id) => match id.checked_add(1) {
                Some(next) => encode_status_key(supplier, status, next),
                None => return Ok(Vec::new()),
            },
            None => encode_status_prefix(supplier, status),
        };
        // Status tags are ASCII letters, so bumping the last byte closes the prefix
        let mut end = encode_status_prefix(supplier, status);
        if let Some(tag) = end.last_mut() {
            *tag += 1;
        }

        self.tx
            .range_keys(&self.partitions.status_index, &start, &end, limit)?
            .iter()
            .map(|key| decode_trailing_id(key))
            .collect()
    }

    /// Ids of `processing` items, oldest lease first. With `locked_at_or_before`
    /// only leases granted (or renewed) no later than that millisecond are returned.
    pub fn leased_ids(&mut self, locked_at_or_before: Option<DateTime<Utc>>) -> Result<Vec<u64>> {
        let end = match locked_at_or_before {
            Some(at) => encode_lease_bound(at),
            None => vec![0xFF; 17],
        };
        self.tx
            .range_keys(&self.partitions.lease_index, &[], &end, usize::MAX)?
            .iter()
            .map(|key| decode_trailing_id(key))
            .collect()
    }

    /// Ids of a supplier's valid `done` items parsed no later than `parsed_at_or_before`
    /// (never-parsed items included), least recently parsed first
    pub fn reparse_candidates(
        &mut self,
        supplier: &str,
        parsed_at_or_before: DateTime<Utc>,
    ) -> Result<Vec<u64>> {
        let start = encode_supplier_prefix(supplier);
        let end = encode_reparse_bound(supplier, parsed_at_or_before);
        self.tx
            .range_keys(&self.partitions.reparse_index, &start, &end, usize::MAX)?
            .iter()
            .map(|key| decode_trailing_id(key))
            .collect()
    }

    fn check_readable(&mut self) -> Result<()> {
        self.tx.get_raw(&self.partitions.metadata, NEXT_ID_KEY)?;
        Ok(())
    }

    pub fn count(&mut self) -> Result<usize> {
        Ok(self.tx.prefix_raw(&self.partitions.items, &[])?.len())
    }
}

impl StoreTx<'_, WriteTransaction<'_>> {
    /// Allocate the next item id; ids are dense and follow creation order
    fn next_id(&mut self) -> Result<u64> {
        let current = match self.tx.get_raw(&self.partitions.metadata, NEXT_ID_KEY)? {
            Some(bytes) => decode_id(&bytes)?,
            None => 1,
        };
        self.tx.insert(
            &self.partitions.metadata,
            NEXT_ID_KEY.to_vec(),
            (current + 1).to_be_bytes().to_vec(),
        );
        Ok(current)
    }

    /// Insert a brand new item and its index entries
    pub fn insert_new(&mut self, new: NewWorkItem, now: chrono::DateTime<chrono::Utc>) -> Result<WorkItem> {
        let id = self.next_id()?;
        let item = WorkItem::new(id, new, now);

        self.put(&item)?;
        self.tx.insert(
            &self.partitions.supplier_index,
            encode_supplier_key(&item.supplier_name, id),
            Vec::<u8>::new(),
        );
        self.tx.insert(
            &self.partitions.url_index,
            encode_url_key(&item.supplier_name, &item.url),
            encode_item_key(id),
        );

        Ok(item)
    }

    /// Write an item and move its status, lease and reparse index entries along with it.
    ///
    /// Supplier and url never change after insert, so the supplier and url
    /// indexes are maintained by [`StoreTx::insert_new`] alone.
    pub fn put(&mut self, item: &WorkItem) -> Result<()> {
        let previous = self.get(item.id)?.map(|previous| IndexKeys::of(&previous));
        let next = IndexKeys::of(item);

        let value = serde_json::to_vec(item)?;
        self.tx
            .insert(&self.partitions.items, encode_item_key(item.id), value);

        let partitions = self.partitions;
        let (old_status, old_lease, old_reparse) = match previous {
            Some(keys) => (Some(keys.status), keys.lease, keys.reparse),
            None => (None, None, None),
        };
        sync_index(&mut self.tx, &partitions.status_index, old_status, Some(next.status));
        sync_index(&mut self.tx, &partitions.lease_index, old_lease, next.lease);
        sync_index(&mut self.tx, &partitions.reparse_index, old_reparse, next.reparse);
        Ok(())
    }

    /// Drop every derived index entry and recompute it from the items partition
    fn rebuild_indexes(&mut self) -> Result<usize> {
        let partitions = self.partitions;
        for partition in [
            &partitions.status_index,
            &partitions.lease_index,
            &partitions.reparse_index,
        ] {
            for (key, _) in self.tx.prefix_raw(partition, &[])? {
                self.tx.remove(partition, key);
            }
        }

        let items = self.scan(None)?;
        for item in &items {
            let keys = IndexKeys::of(item);
            sync_index(&mut self.tx, &partitions.status_index, None, Some(keys.status));
            sync_index(&mut self.tx, &partitions.lease_index, None, keys.lease);
            sync_index(&mut self.tx, &partitions.reparse_index, None, keys.reparse);
        }

        self.tx.insert(
            &partitions.metadata,
            INDEX_VERSION_KEY.to_vec(),
            vec![INDEX_VERSION],
        );
        Ok(items.len())
    }
}

fn sync_index(
    tx: &mut WriteTransaction<'_>,
    partition: &TxPartitionHandle,
    old: Option<Vec<u8>>,
    new: Option<Vec<u8>>,
) {
    if old == new {
        return;
    }
    if let Some(old) = old {
        tx.remove(partition, old);
    }
    if let Some(new) = new {
        tx.insert(partition, new, Vec::<u8>::new());
    }
}
