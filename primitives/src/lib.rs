mod action;
mod authority;
mod b58;
mod block;
mod crypto;
mod name;
mod receipt;
mod time;
mod transaction;

pub mod system;

pub use {
  action::Action,
  authority::{
    Authority,
    AuthorityError,
    KeyWeight,
    PermissionLevel,
    PermissionLevelWeight,
    WaitWeight,
  },
  b58::{hexbytes, ToBase58String},
  block::BlockHeader,
  crypto::{pack, unpack, CodecError, Digest, PublicKey},
  name::{Error as NameError, Name},
  receipt::{ActionReceipt, TransactionReceipt, TransactionStatus},
  time::{
    BlockTimestamp,
    TimePoint,
    BLOCK_INTERVAL_MS,
    BLOCK_TIMESTAMP_EPOCH_MS,
  },
  transaction::{KeySignature, SignedTransaction, Transaction},
};
