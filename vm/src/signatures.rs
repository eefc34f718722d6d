//! Recovery of the provided keys of a signed transaction.

use {
  crate::{AuthorizationError, ChainError},
  cinder_primitives::{Digest, PublicKey, SignedTransaction},
  rayon::prelude::*,
  std::{
    collections::BTreeSet,
    sync::atomic::{AtomicBool, Ordering},
  },
};

/// Verifies every signature of `trx` in parallel and returns the set of
/// keys that signed it.
///
/// Verification stops early once any signature turned out invalid.
pub fn recover_keys(
  trx: &SignedTransaction,
  chain_id: &Digest,
) -> Result<BTreeSet<PublicKey>, ChainError> {
  let digest = trx.transaction.signing_digest(chain_id)?;
  let failed = AtomicBool::new(false);

  let keys = trx
    .signatures
    .par_iter()
    .map(|sig| {
      if failed.load(Ordering::Acquire) {
        return Err(AuthorizationError::InvalidSignature);
      }
      match sig.key.verify(digest.as_ref(), &sig.signature) {
        true => Ok(sig.key),
        false => {
          failed.store(true, Ordering::Release);
          Err(AuthorizationError::InvalidSignature)
        }
      }
    })
    .collect::<Result<BTreeSet<_>, _>>()?;

  Ok(keys)
}
