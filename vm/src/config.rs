use {
  crate::ChainError,
  cinder_primitives::{Digest, Name, PublicKey, TimePoint},
  serde::{Deserialize, Serialize},
};

/// Percentages are expressed in hundredths of a percent.
pub const PERCENT_100: u32 = 10_000;

/// Protocol parameters that every validating node must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
  /// Hard cap of net usage per block, in bytes.
  pub max_block_net_usage: u64,
  pub target_block_net_usage_pct: u32,
  pub max_transaction_net_usage: u32,
  /// Fixed overhead billed to every transaction, in bytes.
  pub base_per_transaction_net_usage: u32,

  /// Hard cap of cpu usage per block, in microseconds.
  pub max_block_cpu_usage: u32,
  pub target_block_cpu_usage_pct: u32,
  pub max_transaction_cpu_usage: u32,
  pub min_transaction_cpu_usage: u32,
  pub base_per_transaction_cpu_usage: u32,
  pub base_per_action_cpu_usage: u32,

  /// How many wasm instructions are billed as one microsecond.
  pub instructions_per_us: u64,

  pub max_transaction_lifetime: u32,
  pub deferred_trx_expiration_window: u32,
  pub max_transaction_delay: u32,
  pub max_inline_action_size: u32,
  pub max_inline_action_depth: u16,
  pub max_authority_depth: u16,

  /// Linear memory cap of a contract, in 64KiB pages.
  pub max_wasm_pages: u32,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      max_block_net_usage: 1024 * 1024,
      target_block_net_usage_pct: 10 * PERCENT_100 / 100,
      max_transaction_net_usage: 512 * 1024,
      base_per_transaction_net_usage: 12,
      max_block_cpu_usage: 200_000,
      target_block_cpu_usage_pct: 10 * PERCENT_100 / 100,
      max_transaction_cpu_usage: 150_000,
      min_transaction_cpu_usage: 100,
      base_per_transaction_cpu_usage: 50,
      base_per_action_cpu_usage: 10,
      instructions_per_us: 100,
      max_transaction_lifetime: 60 * 60,
      deferred_trx_expiration_window: 10 * 60,
      max_transaction_delay: 45 * 24 * 3600,
      max_inline_action_size: 512 * 1024,
      max_inline_action_depth: 4,
      max_authority_depth: 6,
      max_wasm_pages: 528,
    }
  }
}

impl ChainConfig {
  pub fn validate(&self) -> Result<(), ChainError> {
    let check = |cond: bool, msg: &str| {
      if cond {
        Ok(())
      } else {
        Err(ChainError::assertion(format!("invalid chain config: {msg}")))
      }
    };

    check(
      self.target_block_net_usage_pct <= PERCENT_100,
      "target net usage percentage above 100%",
    )?;
    check(
      self.target_block_cpu_usage_pct <= PERCENT_100,
      "target cpu usage percentage above 100%",
    )?;
    check(
      (self.max_transaction_net_usage as u64) < self.max_block_net_usage,
      "max transaction net usage must be less than max block net usage",
    )?;
    check(
      self.max_transaction_cpu_usage <= self.max_block_cpu_usage,
      "max transaction cpu usage above max block cpu usage",
    )?;
    check(
      self.min_transaction_cpu_usage <= self.max_transaction_cpu_usage,
      "min transaction cpu usage above max transaction cpu usage",
    )?;
    check(self.instructions_per_us > 0, "instructions per us is zero")?;
    check(self.max_authority_depth >= 1, "max authority depth is zero")?;
    check(self.max_wasm_pages >= 1, "max wasm pages is zero")?;
    Ok(())
  }
}

/// Extra account created at genesis next to the system accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
  pub name: Name,
  pub key: PublicKey,
  #[serde(default)]
  pub privileged: bool,
}

/// Initial state of a chain.
///
/// The chain id is the digest of the canonical encoding of this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
  pub initial_timestamp: TimePoint,
  pub initial_key: PublicKey,
  #[serde(default)]
  pub initial_configuration: ChainConfig,
  #[serde(default)]
  pub accounts: Vec<GenesisAccount>,
}

impl GenesisState {
  pub fn new(initial_timestamp: TimePoint, initial_key: PublicKey) -> Self {
    Self {
      initial_timestamp,
      initial_key,
      initial_configuration: ChainConfig::default(),
      accounts: vec![],
    }
  }

  pub fn chain_id(&self) -> Result<Digest, ChainError> {
    Ok(Digest::of(self)?)
  }
}

#[cfg(test)]
mod tests {
  use super::ChainConfig;

  #[test]
  fn default_config_is_valid() -> anyhow::Result<()> {
    ChainConfig::default().validate()?;
    Ok(())
  }

  #[test]
  fn inconsistent_config_is_rejected() {
    let config = ChainConfig {
      max_transaction_cpu_usage: 10,
      min_transaction_cpu_usage: 20,
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }
}
