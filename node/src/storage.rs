use {
  cinder_vm::{BlockDelta, Snapshot},
  once_cell::sync::OnceCell,
  std::path::Path,
};

/// Irreversible chain state mirrored into a sled tree.
///
/// Keys are the table name followed by the big endian primary key,
/// values are the encoded records.
pub struct OnDiskStore {
  tree: sled::Tree,
}

impl OnDiskStore {
  pub fn new(path: &Path, name: &str) -> Result<Self, sled::Error> {
    static DB: OnceCell<sled::Db> = OnceCell::new();
    Ok(Self {
      tree: DB.get_or_try_init(|| sled::open(path))?.open_tree(name)?,
    })
  }

  pub fn from_tree(tree: sled::Tree) -> Self {
    Self { tree }
  }

  /// Replaces the whole contents with the rows of a snapshot.
  pub fn import(&self, snapshot: &Snapshot) -> Result<(), sled::Error> {
    self.tree.clear()?;
    let mut batch = sled::Batch::default();
    for (key, value) in snapshot.rows() {
      batch.insert(key, value);
    }
    self.tree.apply_batch(batch)?;
    self.tree.flush()?;
    Ok(())
  }

  /// Applies the changes of one block, atomically.
  pub fn apply(&self, delta: &BlockDelta) -> Result<(), sled::Error> {
    let mut batch = sled::Batch::default();
    for (key, value) in delta.upserts() {
      batch.insert(key, value);
    }
    for key in delta.deletes() {
      batch.remove(key);
    }
    self.tree.apply_batch(batch)?;
    self.tree.flush()?;
    Ok(())
  }

  pub fn get(&self, key: &[u8]) -> Result<Option<sled::IVec>, sled::Error> {
    self.tree.get(key)
  }

  pub fn len(&self) -> usize {
    self.tree.len()
  }
}

#[cfg(test)]
mod tests {
  use {
    super::OnDiskStore,
    cinder_primitives::{BlockHeader, BlockTimestamp, Digest},
    cinder_vm::{snapshot::row_key, store::{TableDelta, TableDump}, BlockDelta, Snapshot},
  };

  fn store() -> anyhow::Result<OnDiskStore> {
    let db = sled::Config::new().temporary(true).open()?;
    Ok(OnDiskStore::from_tree(db.open_tree("rows")?))
  }

  #[test]
  fn deltas_update_imported_rows() -> anyhow::Result<()> {
    let store = store()?;
    store.import(&Snapshot {
      chain_id: Digest::hash(b"chain"),
      head: BlockHeader::genesis(BlockTimestamp::from_slot(1)),
      tables: vec![TableDump {
        table: "account".into(),
        rows: vec![(0, vec![1]), (1, vec![2])],
      }],
    })?;
    assert_eq!(store.len(), 2);

    store.apply(&BlockDelta {
      height: 1,
      tables: vec![TableDelta {
        table: "account".into(),
        upserts: vec![(1, vec![3]), (2, vec![4])],
        deletes: vec![0],
      }],
    })?;

    assert_eq!(store.len(), 2);
    assert!(store.get(&row_key("account", 0))?.is_none());
    assert_eq!(
      store.get(&row_key("account", 1))?.map(|v| v.to_vec()),
      Some(vec![3])
    );
    assert_eq!(
      store.get(&row_key("account", 2))?.map(|v| v.to_vec()),
      Some(vec![4])
    );
    Ok(())
  }
}
