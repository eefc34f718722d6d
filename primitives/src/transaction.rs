use {
  crate::{
    b58::hexbytes,
    crypto::{pack, CodecError},
    Action,
    Digest,
    PublicKey,
    TimePoint,
  },
  ed25519_dalek::{Keypair, Signer},
  serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
  /// The transaction is rejected once the block time passes this point.
  pub expiration: TimePoint,

  /// Upper bound of billable network usage in 8-byte words,
  /// zero means bounded only by chain configuration.
  pub max_net_usage_words: u32,

  /// Upper bound of billable cpu time in milliseconds,
  /// zero means bounded only by chain configuration.
  pub max_cpu_usage_ms: u32,

  /// Number of seconds the transaction is held before execution.
  /// A non-zero delay turns an input transaction into a deferred one.
  pub delay_sec: u32,

  /// Actions executed in order. A failure of any of them, or of anything
  /// they spawn, discards the whole transaction.
  pub actions: Vec<Action>,
}

impl Transaction {
  pub fn new(expiration: TimePoint, actions: Vec<Action>) -> Self {
    Self {
      expiration,
      max_net_usage_words: 0,
      max_cpu_usage_ms: 0,
      delay_sec: 0,
      actions,
    }
  }

  pub fn packed(&self) -> Result<Vec<u8>, CodecError> {
    pack(self)
  }

  /// Transaction id, the digest of its canonical encoding.
  pub fn id(&self) -> Result<Digest, CodecError> {
    Digest::of(self)
  }

  /// Digest that signatures commit to. Binding the chain id prevents
  /// replaying a transaction on a different chain.
  pub fn signing_digest(&self, chain_id: &Digest) -> Result<Digest, CodecError> {
    Ok(Digest::hash_parts(&[chain_id.as_ref(), &self.packed()?]))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySignature {
  pub key: PublicKey,

  #[serde(with = "hexbytes")]
  pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedTransaction {
  pub transaction: Transaction,
  pub signatures: Vec<KeySignature>,
}

impl SignedTransaction {
  pub fn unsigned(transaction: Transaction) -> Self {
    Self {
      transaction,
      signatures: vec![],
    }
  }

  pub fn sign(
    mut self,
    keypair: &Keypair,
    chain_id: &Digest,
  ) -> Result<Self, CodecError> {
    let digest = self.transaction.signing_digest(chain_id)?;
    let signature = keypair.sign(digest.as_ref());
    self.signatures.push(KeySignature {
      key: keypair.public.into(),
      signature: signature.to_bytes().to_vec(),
    });
    Ok(self)
  }

  pub fn id(&self) -> Result<Digest, CodecError> {
    self.transaction.id()
  }
}

impl From<Transaction> for SignedTransaction {
  fn from(transaction: Transaction) -> Self {
    Self::unsigned(transaction)
  }
}
