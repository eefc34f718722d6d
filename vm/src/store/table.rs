use {
  super::{IndexKey, StoreError},
  cinder_primitives::{pack, unpack},
  serde::{de::DeserializeOwned, Deserialize, Serialize},
  std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt::Debug,
    ops::RangeBounds,
  },
};

/// A typed row stored in a [`Table`].
///
/// The primary key is assigned by the table on creation and never
/// changes. Every secondary index is unique, so records that need a
/// non-unique ordering append their primary key to the index key.
pub trait Record:
  Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
  const TABLE: &'static str;
  const INDICES: usize;

  fn id(&self) -> u64;

  /// Exactly [`Record::INDICES`] keys, in index order.
  fn index_keys(&self) -> Vec<IndexKey>;
}

/// One level of the undo stack of a single table.
#[derive(Debug)]
struct UndoFrame<R> {
  revision: i64,
  old_values: BTreeMap<u64, R>,
  removed_values: BTreeMap<u64, R>,
  new_ids: BTreeSet<u64>,
  old_next_id: u64,
}

impl<R> UndoFrame<R> {
  fn new(revision: i64, old_next_id: u64) -> Self {
    Self {
      revision,
      old_values: BTreeMap::new(),
      removed_values: BTreeMap::new(),
      new_ids: BTreeSet::new(),
      old_next_id,
    }
  }
}

/// Full contents of a table at some point, rows encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDump {
  pub table: String,
  pub rows: Vec<(u64, Vec<u8>)>,
}

/// Rows changed by one undo frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDelta {
  pub table: String,
  pub upserts: Vec<(u64, Vec<u8>)>,
  pub deletes: Vec<u64>,
}

impl TableDelta {
  pub fn is_empty(&self) -> bool {
    self.upserts.is_empty() && self.deletes.is_empty()
  }
}

/// Object-safe view of a table used by the database to drive
/// sessions over heterogenous record types.
pub trait UndoTable {
  fn name(&self) -> &'static str;
  fn push_frame(&mut self, revision: i64);
  fn undo_frame(&mut self) -> Result<(), StoreError>;
  fn squash_frames(&mut self) -> Result<(), StoreError>;
  fn commit_frames(&mut self, revision: i64);
  fn committed_dump(&self) -> Result<TableDump, StoreError>;
  fn frame_delta(&self) -> Result<TableDelta, StoreError>;
  fn restore(&mut self, dump: &TableDump) -> Result<(), StoreError>;
}

/// Records keyed by a table-assigned `u64` with unique secondary
/// indices kept in lockstep with the primary map.
#[derive(Debug)]
pub struct Table<R: Record> {
  rows: BTreeMap<u64, R>,
  indices: Vec<BTreeMap<IndexKey, u64>>,
  next_id: u64,
  frames: VecDeque<UndoFrame<R>>,
}

impl<R: Record> Default for Table<R> {
  fn default() -> Self {
    Self {
      rows: BTreeMap::new(),
      indices: (0..R::INDICES).map(|_| BTreeMap::new()).collect(),
      next_id: 0,
      frames: VecDeque::new(),
    }
  }
}

impl<R: Record> Table<R> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn next_id(&self) -> u64 {
    self.next_id
  }

  pub fn get(&self, id: u64) -> Option<&R> {
    self.rows.get(&id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &R> {
    self.rows.values()
  }

  pub fn find(&self, index: usize, key: &IndexKey) -> Option<&R> {
    self
      .indices
      .get(index)?
      .get(key)
      .and_then(|id| self.rows.get(id))
  }

  /// Records of a secondary index whose keys fall within `range`,
  /// in key order.
  pub fn range<'a>(
    &'a self,
    index: usize,
    range: impl RangeBounds<IndexKey> + 'a,
  ) -> impl Iterator<Item = &'a R> + 'a {
    self
      .indices
      .get(index)
      .map(|idx| idx.range(range))
      .into_iter()
      .flatten()
      .filter_map(|(_, id)| self.rows.get(id))
  }

  /// First record whose key in `index` is not less than `key`,
  /// followed by every record after it.
  pub fn lower_bound<'a>(
    &'a self,
    index: usize,
    key: IndexKey,
  ) -> impl Iterator<Item = &'a R> + 'a {
    self.range(index, key..)
  }

  /// Inserts a new record built from the next free primary key.
  pub fn create(
    &mut self,
    init: impl FnOnce(u64) -> R,
  ) -> Result<&R, StoreError> {
    let id = self.next_id;
    let record = init(id);
    if record.id() != id {
      return Err(StoreError::IdMismatch {
        table: R::TABLE,
        expected: id,
        found: record.id(),
      });
    }

    let keys = record.index_keys();
    self.check_unique(&keys, None)?;
    self.insert_keys(keys, id);
    self.next_id += 1;

    if let Some(frame) = self.frames.back_mut() {
      frame.new_ids.insert(id);
    }

    self.rows.insert(id, record);
    self.rows.get(&id).ok_or(StoreError::NotFound {
      table: R::TABLE,
      id,
    })
  }

  /// Applies `mutator` to a copy of the record and stores the result
  /// if every secondary key is still unique.
  pub fn modify(
    &mut self,
    id: u64,
    mutator: impl FnOnce(&mut R),
  ) -> Result<&R, StoreError> {
    let current = self.rows.get(&id).ok_or(StoreError::NotFound {
      table: R::TABLE,
      id,
    })?;

    let mut updated = current.clone();
    mutator(&mut updated);
    if updated.id() != id {
      return Err(StoreError::IdMismatch {
        table: R::TABLE,
        expected: id,
        found: updated.id(),
      });
    }

    let old_keys = current.index_keys();
    let new_keys = updated.index_keys();
    self.check_unique(&new_keys, Some(id))?;

    for (i, (old, new)) in old_keys.into_iter().zip(new_keys).enumerate() {
      if old != new {
        self.indices[i].remove(&old);
        self.indices[i].insert(new, id);
      }
    }

    let previous = self.rows.insert(id, updated);
    if let (Some(frame), Some(previous)) = (self.frames.back_mut(), previous) {
      if !frame.new_ids.contains(&id) && !frame.old_values.contains_key(&id) {
        frame.old_values.insert(id, previous);
      }
    }

    self.rows.get(&id).ok_or(StoreError::NotFound {
      table: R::TABLE,
      id,
    })
  }

  pub fn remove(&mut self, id: u64) -> Result<R, StoreError> {
    let record = self.rows.remove(&id).ok_or(StoreError::NotFound {
      table: R::TABLE,
      id,
    })?;
    self.remove_keys(&record);

    if let Some(frame) = self.frames.back_mut() {
      if frame.new_ids.remove(&id) {
        // created and removed within the same frame
      } else if let Some(original) = frame.old_values.remove(&id) {
        frame.removed_values.insert(id, original);
      } else {
        frame.removed_values.insert(id, record.clone());
      }
    }
    Ok(record)
  }

  fn check_unique(
    &self,
    keys: &[IndexKey],
    own: Option<u64>,
  ) -> Result<(), StoreError> {
    if keys.len() != R::INDICES {
      return Err(StoreError::IndexArity {
        table: R::TABLE,
        expected: R::INDICES,
        found: keys.len(),
      });
    }
    for (index, key) in keys.iter().enumerate() {
      if let Some(existing) = self.indices[index].get(key) {
        if Some(*existing) != own {
          return Err(StoreError::UniqueViolation {
            table: R::TABLE,
            index,
          });
        }
      }
    }
    Ok(())
  }

  fn insert_keys(&mut self, keys: Vec<IndexKey>, id: u64) {
    for (index, key) in keys.into_iter().enumerate() {
      self.indices[index].insert(key, id);
    }
  }

  fn remove_keys(&mut self, record: &R) {
    for (index, key) in record.index_keys().into_iter().enumerate() {
      self.indices[index].remove(&key);
    }
  }

  fn reinsert(&mut self, id: u64, record: R) -> Result<(), StoreError> {
    let keys = record.index_keys();
    self.check_unique(&keys, None)?;
    self.insert_keys(keys, id);
    self.rows.insert(id, record);
    Ok(())
  }

  /// Rows as they were before the oldest frame still on the stack.
  pub fn committed_rows(&self) -> BTreeMap<u64, &R> {
    let mut overlay: BTreeMap<u64, Option<&R>> = BTreeMap::new();
    for frame in &self.frames {
      for (id, value) in frame.old_values.iter() {
        overlay.entry(*id).or_insert(Some(value));
      }
      for (id, value) in frame.removed_values.iter() {
        overlay.entry(*id).or_insert(Some(value));
      }
      for id in &frame.new_ids {
        overlay.entry(*id).or_insert(None);
      }
    }

    let mut rows: BTreeMap<u64, &R> = self
      .rows
      .iter()
      .filter(|(id, _)| !overlay.contains_key(id))
      .map(|(id, r)| (*id, r))
      .collect();
    rows.extend(overlay.into_iter().filter_map(|(id, r)| Some((id, r?))));
    rows
  }
}

impl<R: Record> UndoTable for Table<R> {
  fn name(&self) -> &'static str {
    R::TABLE
  }

  fn push_frame(&mut self, revision: i64) {
    self.frames.push_back(UndoFrame::new(revision, self.next_id));
  }

  fn undo_frame(&mut self) -> Result<(), StoreError> {
    let frame = self.frames.pop_back().ok_or(StoreError::NothingToUndo)?;

    for id in &frame.new_ids {
      let record = self.rows.remove(id).ok_or(StoreError::NotFound {
        table: R::TABLE,
        id: *id,
      })?;
      self.remove_keys(&record);
    }

    for id in frame.old_values.keys() {
      let record = self.rows.remove(id).ok_or(StoreError::NotFound {
        table: R::TABLE,
        id: *id,
      })?;
      self.remove_keys(&record);
    }

    for (id, record) in frame.old_values {
      self.reinsert(id, record)?;
    }

    for (id, record) in frame.removed_values {
      self.reinsert(id, record)?;
    }

    self.next_id = frame.old_next_id;
    Ok(())
  }

  fn squash_frames(&mut self) -> Result<(), StoreError> {
    let head = self.frames.pop_back().ok_or(StoreError::NothingToUndo)?;
    let Some(prev) = self.frames.back_mut() else {
      // squashing the only frame makes its changes permanent
      return Ok(());
    };

    for (id, value) in head.old_values {
      if prev.new_ids.contains(&id) || prev.old_values.contains_key(&id) {
        continue;
      }
      prev.old_values.insert(id, value);
    }

    prev.new_ids.extend(head.new_ids.iter().copied());

    for (id, value) in head.removed_values {
      if prev.new_ids.remove(&id) {
        continue;
      }
      if let Some(original) = prev.old_values.remove(&id) {
        prev.removed_values.insert(id, original);
      } else {
        prev.removed_values.insert(id, value);
      }
    }
    Ok(())
  }

  fn commit_frames(&mut self, revision: i64) {
    while self
      .frames
      .front()
      .map(|f| f.revision <= revision)
      .unwrap_or(false)
    {
      self.frames.pop_front();
    }
  }

  fn committed_dump(&self) -> Result<TableDump, StoreError> {
    let rows = self
      .committed_rows()
      .into_iter()
      .map(|(id, r)| Ok((id, pack(r)?)))
      .collect::<Result<_, StoreError>>()?;
    Ok(TableDump {
      table: R::TABLE.to_owned(),
      rows,
    })
  }

  fn frame_delta(&self) -> Result<TableDelta, StoreError> {
    let mut delta = TableDelta {
      table: R::TABLE.to_owned(),
      ..Default::default()
    };
    let Some(frame) = self.frames.back() else {
      return Ok(delta);
    };

    let touched: BTreeSet<u64> = frame
      .new_ids
      .iter()
      .chain(frame.old_values.keys())
      .copied()
      .collect();
    for id in touched {
      let record = self.rows.get(&id).ok_or(StoreError::NotFound {
        table: R::TABLE,
        id,
      })?;
      delta.upserts.push((id, pack(record)?));
    }
    delta.deletes = frame.removed_values.keys().copied().collect();
    Ok(delta)
  }

  fn restore(&mut self, dump: &TableDump) -> Result<(), StoreError> {
    if dump.table != R::TABLE {
      return Err(StoreError::TableMismatch {
        expected: R::TABLE,
        found: dump.table.clone(),
      });
    }
    *self = Self::default();
    for (id, bytes) in &dump.rows {
      let record: R = unpack(bytes)?;
      if record.id() != *id {
        return Err(StoreError::IdMismatch {
          table: R::TABLE,
          expected: *id,
          found: record.id(),
        });
      }
      self.reinsert(*id, record)?;
      self.next_id = self.next_id.max(id + 1);
    }
    Ok(())
  }
}
