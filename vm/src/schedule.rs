//! Queries over the deferred queue and the replay protection records.

use {
  crate::{
    objects::{GeneratedTransactionObject, TransactionObject},
    state::ChainTables,
    ChainError,
  },
  cinder_primitives::{Digest, TimePoint},
  tracing::debug,
};

/// Deferred transactions whose delay elapsed by `now`, in the order
/// they become due.
pub fn due_transactions(tables: &ChainTables, now: TimePoint) -> Vec<Digest> {
  tables
    .generated_transactions
    .range(
      GeneratedTransactionObject::BY_DELAY,
      ..=GeneratedTransactionObject::delay_key(now, u64::MAX),
    )
    .map(|g| g.trx_id)
    .collect()
}

pub fn find_generated<'a>(
  tables: &'a ChainTables,
  trx_id: &Digest,
) -> Option<&'a GeneratedTransactionObject> {
  tables.generated_transactions.find(
    GeneratedTransactionObject::BY_TRX_ID,
    &GeneratedTransactionObject::trx_key(trx_id),
  )
}

/// Drops replay protection records of transactions that expired before
/// `now`. They can no longer be included, so remembering them is moot.
pub fn clear_expired_transactions(
  tables: &mut ChainTables,
  now: TimePoint,
) -> Result<usize, ChainError> {
  let expired: Vec<u64> = tables
    .transactions
    .range(
      TransactionObject::BY_EXPIRATION,
      ..TransactionObject::expiration_key(now, 0),
    )
    .map(|t| t.id)
    .collect();

  for id in &expired {
    tables.transactions.remove(*id)?;
  }
  if !expired.is_empty() {
    debug!("cleared {} expired transaction records", expired.len());
  }
  Ok(expired.len())
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    cinder_primitives::Name,
  };

  fn generated(
    tables: &mut ChainTables,
    seed: u8,
    delay_until: u64,
  ) -> anyhow::Result<Digest> {
    let trx_id = Digest::from_bytes([seed; 32]);
    tables.generated_transactions.create(|id| GeneratedTransactionObject {
      id,
      trx_id,
      sender: Name::default(),
      sender_id: seed as u128,
      payer: Name::from_static("alice"),
      delay_until: TimePoint::from_secs(delay_until),
      expiration: TimePoint::from_secs(delay_until + 600),
      published: TimePoint::from_secs(0),
      packed_trx: vec![],
    })?;
    Ok(trx_id)
  }

  #[test]
  fn due_in_delay_order() -> anyhow::Result<()> {
    let mut tables = ChainTables::default();
    let late = generated(&mut tables, 1, 30)?;
    let early = generated(&mut tables, 2, 10)?;
    generated(&mut tables, 3, 31)?;

    assert!(due_transactions(&tables, TimePoint::from_secs(5)).is_empty());
    assert_eq!(due_transactions(&tables, TimePoint::from_secs(30)), vec![
      early, late
    ]);
    assert!(find_generated(&tables, &late).is_some());
    Ok(())
  }

  #[test]
  fn expired_records_are_cleared() -> anyhow::Result<()> {
    let mut tables = ChainTables::default();
    for (seed, expiration) in [(1u8, 10u64), (2, 20), (3, 30)] {
      tables.transactions.create(|id| TransactionObject {
        id,
        trx_id: Digest::from_bytes([seed; 32]),
        expiration: TimePoint::from_secs(expiration),
      })?;
    }

    assert_eq!(clear_expired_transactions(&mut tables, TimePoint::from_secs(20))?, 1);
    assert_eq!(tables.transactions.len(), 2);
    assert_eq!(clear_expired_transactions(&mut tables, TimePoint::from_secs(31))?, 2);
    assert!(tables.transactions.is_empty());
    Ok(())
  }
}
