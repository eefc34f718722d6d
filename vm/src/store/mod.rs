//! Versioned record storage with nested undo sessions.
//!
//! Every table keeps its own stack of undo frames. The [`Database`]
//! drives all tables of a [`TableSet`] in lockstep, so a session
//! started on the database covers every table and a single `undo`
//! restores all of them, primary and secondary entries alike.

mod key;
mod table;

use {cinder_primitives::CodecError, thiserror::Error};

pub use {
  key::IndexKey,
  table::{Record, Table, TableDelta, TableDump, UndoTable},
};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("record {id} not found in table {table}")]
  NotFound { table: &'static str, id: u64 },

  #[error("unique index {index} of table {table} violated")]
  UniqueViolation { table: &'static str, index: usize },

  #[error("table {table} expected {expected} index keys, got {found}")]
  IndexArity {
    table: &'static str,
    expected: usize,
    found: usize,
  },

  #[error("primary key of a record in {table} changed from {expected} to {found}")]
  IdMismatch {
    table: &'static str,
    expected: u64,
    found: u64,
  },

  #[error("dump of table {found} cannot be restored into {expected}")]
  TableMismatch { expected: &'static str, found: String },

  #[error("dump does not contain table {0}")]
  MissingTable(&'static str),

  #[error("undo stack is empty")]
  NothingToUndo,

  #[error("revision {requested} was never pushed, head is {head}")]
  UnknownRevision { requested: i64, head: i64 },

  #[error("revision {revision} is at or below committed revision {committed}")]
  AlreadyCommitted { revision: i64, committed: i64 },

  #[error("session {revision} is not the top of the undo stack ({head})")]
  OutOfOrder { revision: i64, head: i64 },

  #[error("record encoding: {0}")]
  Codec(#[from] CodecError),
}

/// A fixed collection of tables that share one undo stack.
pub trait TableSet {
  fn for_each(&self, f: &mut dyn FnMut(&dyn UndoTable));
  fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut dyn UndoTable));
}

/// Owner of all tables and of the revision counters.
///
/// `revision` is the number of the topmost undo frame, `committed`
/// is the newest revision that can no longer be undone.
#[derive(Debug)]
pub struct Database<T: TableSet> {
  tables: T,
  revision: i64,
  committed: i64,
}

impl<T: TableSet> Database<T> {
  pub fn new(tables: T) -> Self {
    Self {
      tables,
      revision: 0,
      committed: 0,
    }
  }

  pub fn tables(&self) -> &T {
    &self.tables
  }

  pub fn tables_mut(&mut self) -> &mut T {
    &mut self.tables
  }

  pub fn revision(&self) -> i64 {
    self.revision
  }

  pub fn committed(&self) -> i64 {
    self.committed
  }

  pub fn start_session(&mut self) -> Session {
    self.revision += 1;
    let revision = self.revision;
    self.tables.for_each_mut(&mut |t| t.push_frame(revision));
    Session { revision }
  }

  /// Discards the topmost frame in every table.
  pub fn undo(&mut self) -> Result<(), StoreError> {
    if self.revision <= self.committed {
      return Err(StoreError::NothingToUndo);
    }
    let mut result = Ok(());
    self.tables.for_each_mut(&mut |t| {
      if result.is_ok() {
        result = t.undo_frame();
      }
    });
    result?;
    self.revision -= 1;
    Ok(())
  }

  /// Merges the topmost frame into the one below it.
  pub fn squash(&mut self) -> Result<(), StoreError> {
    if self.revision <= self.committed {
      return Err(StoreError::NothingToUndo);
    }
    let mut result = Ok(());
    self.tables.for_each_mut(&mut |t| {
      if result.is_ok() {
        result = t.squash_frames();
      }
    });
    result?;
    self.revision -= 1;
    Ok(())
  }

  /// Makes every frame up to and including `revision` permanent.
  ///
  /// Committing a revision older than the last commit is a no-op.
  pub fn commit(&mut self, revision: i64) -> Result<(), StoreError> {
    if revision > self.revision {
      return Err(StoreError::UnknownRevision {
        requested: revision,
        head: self.revision,
      });
    }
    if revision <= self.committed {
      return Ok(());
    }
    self.tables.for_each_mut(&mut |t| t.commit_frames(revision));
    self.committed = revision;
    Ok(())
  }

  /// Committed contents of every table.
  pub fn dump(&self) -> Result<Vec<TableDump>, StoreError> {
    let mut dumps = vec![];
    let mut result = Ok(());
    self.tables.for_each(&mut |t| {
      if result.is_ok() {
        match t.committed_dump() {
          Ok(dump) => dumps.push(dump),
          Err(e) => result = Err(e),
        }
      }
    });
    result.map(|_| dumps)
  }

  /// Changes recorded in the topmost frame of every table.
  pub fn delta(&self) -> Result<Vec<TableDelta>, StoreError> {
    let mut deltas = vec![];
    let mut result = Ok(());
    self.tables.for_each(&mut |t| {
      if result.is_ok() {
        match t.frame_delta() {
          Ok(delta) if !delta.is_empty() => deltas.push(delta),
          Ok(_) => {}
          Err(e) => result = Err(e),
        }
      }
    });
    result.map(|_| deltas)
  }

  /// Replaces the contents of every table with a committed dump.
  pub fn restore(&mut self, dumps: &[TableDump]) -> Result<(), StoreError> {
    if self.revision != self.committed {
      return Err(StoreError::OutOfOrder {
        revision: self.committed,
        head: self.revision,
      });
    }
    let mut result = Ok(());
    self.tables.for_each_mut(&mut |t| {
      if result.is_ok() {
        result = match dumps.iter().find(|d| d.table == t.name()) {
          Some(dump) => t.restore(dump),
          None => Err(StoreError::MissingTable(t.name())),
        };
      }
    });
    result
  }
}

/// Handle to one undo frame.
///
/// A session must be consumed explicitly. Dropping it leaves the
/// frame on the stack, exactly as [`Session::push`] does.
#[derive(Debug)]
#[must_use = "a session must be pushed, squashed or undone"]
pub struct Session {
  revision: i64,
}

impl Session {
  pub fn revision(&self) -> i64 {
    self.revision
  }

  /// Keeps the frame on the undo stack and returns its revision.
  pub fn push(self) -> i64 {
    self.revision
  }

  pub fn squash<T: TableSet>(
    self,
    db: &mut Database<T>,
  ) -> Result<(), StoreError> {
    self.ensure_top(db)?;
    db.squash()
  }

  pub fn undo<T: TableSet>(self, db: &mut Database<T>) -> Result<(), StoreError> {
    self.ensure_top(db)?;
    db.undo()
  }

  fn ensure_top<T: TableSet>(&self, db: &Database<T>) -> Result<(), StoreError> {
    if self.revision <= db.committed {
      return Err(StoreError::AlreadyCommitted {
        revision: self.revision,
        committed: db.committed,
      });
    }
    if self.revision != db.revision {
      return Err(StoreError::OutOfOrder {
        revision: self.revision,
        head: db.revision,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Database, IndexKey, Record, StoreError, Table, TableSet, UndoTable},
    serde::{Deserialize, Serialize},
  };

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Balance {
    id: u64,
    owner: u64,
    amount: u64,
  }

  impl Record for Balance {
    const INDICES: usize = 1;
    const TABLE: &'static str = "balance";

    fn id(&self) -> u64 {
      self.id
    }

    fn index_keys(&self) -> Vec<IndexKey> {
      vec![IndexKey::new().u64(self.owner)]
    }
  }

  #[derive(Default)]
  struct Tables {
    balances: Table<Balance>,
  }

  impl TableSet for Tables {
    fn for_each(&self, f: &mut dyn FnMut(&dyn UndoTable)) {
      f(&self.balances);
    }

    fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut dyn UndoTable)) {
      f(&mut self.balances);
    }
  }

  fn balances(db: &Database<Tables>) -> Vec<Balance> {
    db.tables().balances.iter().cloned().collect()
  }

  #[test]
  fn nested_sessions() -> anyhow::Result<()> {
    let mut db = Database::new(Tables::default());
    db.tables_mut().balances.create(|id| Balance {
      id,
      owner: 1,
      amount: 100,
    })?;

    let block = db.start_session();
    let tx = db.start_session();
    db.tables_mut().balances.modify(0, |b| b.amount = 50)?;
    tx.squash(&mut db)?;

    let failing = db.start_session();
    db.tables_mut().balances.modify(0, |b| b.amount = 0)?;
    failing.undo(&mut db)?;

    assert_eq!(balances(&db)[0].amount, 50);
    block.undo(&mut db)?;
    assert_eq!(balances(&db)[0].amount, 100);
    assert_eq!(db.revision(), 0);
    Ok(())
  }

  #[test]
  fn commit_is_monotonic() -> anyhow::Result<()> {
    let mut db = Database::new(Tables::default());
    let first = db.start_session();
    db.tables_mut().balances.create(|id| Balance {
      id,
      owner: 1,
      amount: 1,
    })?;
    let second = db.start_session();
    db.tables_mut().balances.modify(0, |b| b.amount = 2)?;

    assert!(matches!(
      db.commit(5),
      Err(StoreError::UnknownRevision { .. })
    ));

    db.commit(first.revision())?;
    db.commit(0)?; // older than committed, ignored
    assert_eq!(db.committed(), 1);
    assert!(matches!(
      first.undo(&mut db),
      Err(StoreError::AlreadyCommitted { .. })
    ));

    second.undo(&mut db)?;
    assert_eq!(balances(&db)[0].amount, 1);
    assert!(matches!(db.undo(), Err(StoreError::NothingToUndo)));
    Ok(())
  }

  #[test]
  fn undo_out_of_order_is_rejected() -> anyhow::Result<()> {
    let mut db = Database::new(Tables::default());
    let outer = db.start_session();
    let inner = db.start_session();
    assert!(matches!(
      outer.undo(&mut db),
      Err(StoreError::OutOfOrder { .. })
    ));
    inner.undo(&mut db)?;
    assert_eq!(db.revision(), 1);
    Ok(())
  }

  #[test]
  fn dump_and_delta() -> anyhow::Result<()> {
    let mut db = Database::new(Tables::default());
    db.tables_mut().balances.create(|id| Balance {
      id,
      owner: 1,
      amount: 1,
    })?;
    let session = db.start_session();
    db.tables_mut().balances.create(|id| Balance {
      id,
      owner: 2,
      amount: 2,
    })?;

    let dump = db.dump()?;
    assert_eq!(dump.len(), 1);
    assert_eq!(dump[0].rows.len(), 1);

    let delta = db.delta()?;
    assert_eq!(delta[0].upserts.len(), 1);
    assert_eq!(delta[0].upserts[0].0, 1);

    db.commit(session.push())?;
    assert_eq!(db.dump()?[0].rows.len(), 2);
    assert!(db.delta()?.is_empty());
    Ok(())
  }
}
