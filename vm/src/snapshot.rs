//! Logical export of chain state: full committed dumps and per-block
//! deltas, both made of encoded rows keyed by `(table, primary key)`.

use {
  crate::{
    store::{TableDelta, TableDump},
    ChainError,
  },
  cinder_primitives::{BlockHeader, Digest},
  serde::{Deserialize, Serialize},
  std::io::{Read, Write},
};

/// Committed state of a chain as of an irreversible block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub chain_id: Digest,
  pub head: BlockHeader,
  pub tables: Vec<TableDump>,
}

impl Snapshot {
  pub fn write_to(&self, writer: &mut impl Write) -> Result<(), ChainError> {
    rmp_serde::encode::write(writer, self)
      .map_err(|e| ChainError::Serialization(e.to_string()))
  }

  pub fn read_from(reader: impl Read) -> Result<Self, ChainError> {
    rmp_serde::from_read(reader)
      .map_err(|e| ChainError::Serialization(e.to_string()))
  }

  /// Every row of every table with its storage key.
  pub fn rows(&self) -> impl Iterator<Item = (Vec<u8>, &[u8])> {
    self.tables.iter().flat_map(|dump| {
      dump
        .rows
        .iter()
        .map(move |(id, bytes)| (row_key(&dump.table, *id), bytes.as_slice()))
    })
  }
}

/// State changes made by one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDelta {
  pub height: u64,
  pub tables: Vec<TableDelta>,
}

impl BlockDelta {
  pub fn upserts(&self) -> impl Iterator<Item = (Vec<u8>, &[u8])> {
    self.tables.iter().flat_map(|delta| {
      delta
        .upserts
        .iter()
        .map(move |(id, bytes)| (row_key(&delta.table, *id), bytes.as_slice()))
    })
  }

  pub fn deletes(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
    self.tables.iter().flat_map(|delta| {
      delta.deletes.iter().map(move |id| row_key(&delta.table, *id))
    })
  }
}

/// Key of a row in a flat key-value store. Rows of one table are
/// contiguous and ordered by primary key.
pub fn row_key(table: &str, id: u64) -> Vec<u8> {
  let mut key = Vec::with_capacity(table.len() + 9);
  key.extend_from_slice(table.as_bytes());
  key.push(0);
  key.extend_from_slice(&id.to_be_bytes());
  key
}
