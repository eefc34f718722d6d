use {
  crate::storage::OnDiskStore,
  cinder_primitives::Name,
  clap::Parser,
  humantime::Duration,
  std::path::PathBuf,
};

/// Cinder Node
///
/// A single producer node that applies transactions read from a feed
/// to a Cinder chain, with no consensus algorithm, for dev, CI and
/// test scenarios.
#[derive(Debug, Parser)]
pub struct SystemSettings {
  /// Genesis state of the chain, as JSON
  #[clap(short, long, value_name = "FILE")]
  genesis: PathBuf,

  /// Resume from a snapshot instead of starting at genesis
  #[clap(long, value_name = "FILE")]
  snapshot: Option<PathBuf>,

  /// Signed transactions to apply, one JSON object per line
  #[clap(short = 'f', long, value_name = "FILE")]
  transactions: Option<PathBuf>,

  /// Directory of the on-disk state, state is kept in memory only
  /// when omitted
  #[clap(short, long, value_name = "DIR")]
  data_dir: Option<PathBuf>,

  /// Account named as the producer of every block
  #[clap(short, long, default_value = "cinder", value_name = "NAME")]
  producer: Name,

  /// Block production interval
  #[clap(long, short = 't', value_name = "DURATION", default_value = "500ms")]
  block_time: Duration,

  /// Number of most recent blocks kept reversible
  #[clap(long, default_value = "2", value_name = "BLOCKS")]
  reversible_blocks: u64,

  /// Stop after producing this many blocks
  #[clap(long, value_name = "COUNT")]
  blocks: Option<u64>,
}

impl SystemSettings {
  pub fn genesis(&self) -> &PathBuf {
    &self.genesis
  }

  pub fn snapshot(&self) -> Option<&PathBuf> {
    self.snapshot.as_ref()
  }

  pub fn transactions(&self) -> Option<&PathBuf> {
    self.transactions.as_ref()
  }

  pub fn producer(&self) -> Name {
    self.producer
  }

  pub fn block_time(&self) -> std::time::Duration {
    self.block_time.into()
  }

  pub fn reversible_blocks(&self) -> u64 {
    self.reversible_blocks
  }

  pub fn blocks(&self) -> Option<u64> {
    self.blocks
  }

  /// Persistent store of the irreversible state, if a data directory
  /// was given.
  pub fn storage(&self) -> Result<Option<OnDiskStore>, sled::Error> {
    match &self.data_dir {
      Some(dir) => Ok(Some(OnDiskStore::new(&dir.join("state"), "rows")?)),
      None => Ok(None),
    }
  }

  /// Where the snapshot is written on shutdown.
  pub fn snapshot_out(&self) -> Option<PathBuf> {
    self.data_dir.as_ref().map(|dir| dir.join("snapshot.bin"))
  }
}
