//! Per-account and per-block accounting of cpu, net and ram.
//!
//! Cpu and net are rate limited: every account owns a share of a
//! virtual block capacity proportional to its staked weight, measured
//! over a sliding window of block slots. Ram is a plain quota.

mod accumulator;

pub use accumulator::{
  ElasticLimitParameters,
  Ratio,
  UsageAccumulator,
  RATE_LIMITING_PRECISION,
};

use {
  crate::{
    config::ChainConfig,
    error::ResourceKind,
    objects::{
      ResourceLimitsConfigObject,
      ResourceLimitsObject,
      ResourceLimitsStateObject,
      ResourceUsageObject,
    },
    state::ChainTables,
    store::{IndexKey, Record, StoreError},
    ChainError,
  },
  cinder_primitives::{Name, BLOCK_INTERVAL_MS},
  std::collections::BTreeSet,
  tracing::debug,
};

pub const OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES: u64 = 32;
pub const OVERHEAD_PER_ACCOUNT_RAM_BYTES: u64 = 2 * 1024;
pub const SETCODE_RAM_BYTES_MULTIPLIER: u64 = 10;

pub const TABLE_ID_RAM_BYTES: u64 = 44 + 2 * OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES;
pub const KEY_VALUE_RAM_BYTES: u64 = 44 + 2 * OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES;
pub const PERMISSION_RAM_BYTES: u64 = 68 + 5 * OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES;
pub const PERMISSION_LINK_RAM_BYTES: u64 =
  40 + 3 * OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES;
pub const GENERATED_TRANSACTION_OVERHEAD_RAM_BYTES: u64 =
  96 + 4 * OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES;

/// Account usage windows, 24 hours of block slots.
pub const ACCOUNT_USAGE_AVERAGE_WINDOW: u32 =
  (24 * 3600 * 1000 / BLOCK_INTERVAL_MS) as u32;

/// Usage of an account over its window, in microseconds or bytes.
/// All three are `-1` for unlimited accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountResourceLimit {
  pub used: i64,
  pub available: i64,
  pub max: i64,
}

impl AccountResourceLimit {
  pub const UNLIMITED: Self = Self {
    used: -1,
    available: -1,
    max: -1,
  };

  pub fn is_unlimited(&self) -> bool {
    self.available < 0
  }
}

fn not_found(table: &'static str) -> ChainError {
  ChainError::StoreInvariant(StoreError::NotFound { table, id: 0 })
}

fn config_object(config: &ChainConfig) -> ResourceLimitsConfigObject {
  ResourceLimitsConfigObject {
    id: 0,
    cpu_limit_parameters: ElasticLimitParameters::new(
      config.max_block_cpu_usage as u64,
      config.target_block_cpu_usage_pct,
    ),
    net_limit_parameters: ElasticLimitParameters::new(
      config.max_block_net_usage,
      config.target_block_net_usage_pct,
    ),
    account_cpu_usage_average_window: ACCOUNT_USAGE_AVERAGE_WINDOW,
    account_net_usage_average_window: ACCOUNT_USAGE_AVERAGE_WINDOW,
  }
}

/// Creates the resource singletons at genesis.
pub fn initialize(
  tables: &mut ChainTables,
  config: &ChainConfig,
) -> Result<(), ChainError> {
  let limits = config_object(config);
  limits.cpu_limit_parameters.validate()?;
  limits.net_limit_parameters.validate()?;

  let virtual_cpu_limit = limits.cpu_limit_parameters.max;
  let virtual_net_limit = limits.net_limit_parameters.max;
  tables.resource_limits_config.create(|id| ResourceLimitsConfigObject {
    id,
    ..limits
  })?;
  tables
    .resource_limits_state
    .create(|id| ResourceLimitsStateObject {
      id,
      virtual_cpu_limit,
      virtual_net_limit,
      ..Default::default()
    })?;
  Ok(())
}

/// Re-derives elastic parameters after a configuration change.
pub fn set_block_parameters(
  tables: &mut ChainTables,
  config: &ChainConfig,
) -> Result<(), ChainError> {
  let limits = config_object(config);
  limits.cpu_limit_parameters.validate()?;
  limits.net_limit_parameters.validate()?;
  tables.resource_limits_config.modify(0, |c| {
    c.cpu_limit_parameters = limits.cpu_limit_parameters;
    c.net_limit_parameters = limits.net_limit_parameters;
  })?;
  Ok(())
}

/// Creates unlimited quotas and empty usage for a new account.
pub fn initialize_account(
  tables: &mut ChainTables,
  account: Name,
) -> Result<(), ChainError> {
  tables.resource_limits.create(|id| ResourceLimitsObject {
    id,
    owner: account,
    pending: false,
    net_weight: -1,
    cpu_weight: -1,
    ram_bytes: -1,
  })?;
  tables.resource_usage.create(|id| ResourceUsageObject {
    id,
    owner: account,
    net_usage: UsageAccumulator::default(),
    cpu_usage: UsageAccumulator::default(),
    ram_usage: 0,
  })?;
  Ok(())
}

fn limits_record(
  tables: &ChainTables,
  pending: bool,
  account: Name,
) -> Option<&ResourceLimitsObject> {
  tables.resource_limits.find(
    ResourceLimitsObject::BY_OWNER,
    &ResourceLimitsObject::key(pending, account),
  )
}

fn usage_record(
  tables: &ChainTables,
  account: Name,
) -> Result<&ResourceUsageObject, ChainError> {
  tables
    .resource_usage
    .find(
      ResourceUsageObject::BY_OWNER,
      &ResourceUsageObject::key(account),
    )
    .ok_or_else(|| not_found(ResourceUsageObject::TABLE))
}

/// Schedules new quotas for `account`, effective at the end of the
/// block. Returns whether the ram quota was lowered.
///
/// Lowering the ram quota below current usage is rejected.
pub fn set_account_limits(
  tables: &mut ChainTables,
  account: Name,
  ram_bytes: i64,
  net_weight: i64,
  cpu_weight: i64,
) -> Result<bool, ChainError> {
  if ram_bytes < -1 || net_weight < -1 || cpu_weight < -1 {
    return Err(ChainError::assertion(
      "resource limits must be non-negative or -1",
    ));
  }

  let pending_id = match limits_record(tables, true, account) {
    Some(pending) => pending.id,
    None => {
      let active = limits_record(tables, false, account)
        .cloned()
        .ok_or_else(|| {
          ChainError::assertion(format!("account '{account}' has no limits"))
        })?;
      tables
        .resource_limits
        .create(|id| ResourceLimitsObject {
          id,
          pending: true,
          ..active
        })?
        .id
    }
  };

  let current_ram = tables
    .resource_limits
    .get(pending_id)
    .map(|l| l.ram_bytes)
    .unwrap_or(-1);
  let decreased = ram_bytes >= 0 && (current_ram < 0 || ram_bytes < current_ram);

  if decreased {
    let usage = usage_record(tables, account)?.ram_usage;
    if usage > ram_bytes as u64 {
      return Err(ChainError::assertion(format!(
        "ram quota of '{account}' can not be lowered below its usage of \
         {usage} bytes"
      )));
    }
  }

  tables.resource_limits.modify(pending_id, |l| {
    l.ram_bytes = ram_bytes;
    l.net_weight = net_weight;
    l.cpu_weight = cpu_weight;
  })?;

  debug!(
    "limits of {account} scheduled: ram {ram_bytes}, net {net_weight}, cpu \
     {cpu_weight}"
  );
  Ok(decreased)
}

/// Current quotas `(ram_bytes, net_weight, cpu_weight)`, pending ones
/// take precedence.
pub fn get_account_limits(
  tables: &ChainTables,
  account: Name,
) -> Result<(i64, i64, i64), ChainError> {
  let limits = limits_record(tables, true, account)
    .or_else(|| limits_record(tables, false, account))
    .ok_or_else(|| {
      ChainError::assertion(format!("account '{account}' has no limits"))
    })?;
  Ok((limits.ram_bytes, limits.net_weight, limits.cpu_weight))
}

/// Promotes pending quotas to active ones and maintains the totals.
pub fn process_account_limit_updates(
  tables: &mut ChainTables,
) -> Result<(), ChainError> {
  let pending: Vec<ResourceLimitsObject> = tables
    .resource_limits
    .range(ResourceLimitsObject::BY_OWNER, IndexKey::new().bool(true)..)
    .cloned()
    .collect();

  let mut state = tables.resource_state()?.clone();

  fn update_total(total: &mut u64, value: &mut i64, pending: i64) {
    if *value > 0 {
      *total = total.saturating_sub(*value as u64);
    }
    if pending > 0 {
      *total = total.saturating_add(pending as u64);
    }
    *value = pending;
  }

  for update in pending {
    let active_id = limits_record(tables, false, update.owner)
      .map(|l| l.id)
      .ok_or_else(|| not_found(ResourceLimitsObject::TABLE))?;

    let mut active = tables
      .resource_limits
      .get(active_id)
      .cloned()
      .ok_or_else(|| not_found(ResourceLimitsObject::TABLE))?;

    update_total(
      &mut state.total_ram_bytes,
      &mut active.ram_bytes,
      update.ram_bytes,
    );
    update_total(
      &mut state.total_net_weight,
      &mut active.net_weight,
      update.net_weight,
    );
    update_total(
      &mut state.total_cpu_weight,
      &mut active.cpu_weight,
      update.cpu_weight,
    );

    tables.resource_limits.modify(active_id, |l| *l = active)?;
    tables.resource_limits.remove(update.id)?;
  }

  tables.resource_limits_state.modify(0, |s| {
    s.total_ram_bytes = state.total_ram_bytes;
    s.total_net_weight = state.total_net_weight;
    s.total_cpu_weight = state.total_cpu_weight;
  })?;
  Ok(())
}

fn max_share_in_window(
  virtual_limit: u64,
  window: u32,
  weight: i64,
  total_weight: u64,
) -> u128 {
  let capacity = virtual_limit as u128 * window as u128;
  capacity * weight as u128 / total_weight as u128
}

/// Charges cpu and net of a transaction to every billed account and to
/// the block.
///
/// With `enforce_account_limits` unset only the block cap is checked,
/// which is how failed transactions are billed.
pub fn add_transaction_usage(
  tables: &mut ChainTables,
  accounts: &BTreeSet<Name>,
  cpu_usage: u64,
  net_usage: u64,
  ordinal: u32,
  enforce_account_limits: bool,
) -> Result<(), ChainError> {
  let state = tables.resource_state()?.clone();
  let config = tables.resource_config()?.clone();

  for account in accounts {
    let (_, net_weight, cpu_weight) = get_account_limits(tables, *account)?;
    let usage_id = usage_record(tables, *account)?.id;

    let mut cpu = usage_record(tables, *account)?.cpu_usage;
    let mut net = usage_record(tables, *account)?.net_usage;
    cpu.add(cpu_usage, ordinal, config.account_cpu_usage_average_window)?;
    net.add(net_usage, ordinal, config.account_net_usage_average_window)?;
    tables.resource_usage.modify(usage_id, |u| {
      u.cpu_usage = cpu;
      u.net_usage = net;
    })?;

    if !enforce_account_limits {
      continue;
    }

    if cpu_weight >= 0 && state.total_cpu_weight > 0 {
      let window = config.account_cpu_usage_average_window;
      let used = cpu.value_ex as u128 * window as u128
        / RATE_LIMITING_PRECISION as u128;
      let allowed = max_share_in_window(
        state.virtual_cpu_limit,
        window,
        cpu_weight,
        state.total_cpu_weight,
      );
      if used > allowed {
        debug!("{account} exceeded its cpu share: {used} > {allowed}");
        return Err(ChainError::TransactionResourceExhausted(
          ResourceKind::Cpu,
        ));
      }
    }

    if net_weight >= 0 && state.total_net_weight > 0 {
      let window = config.account_net_usage_average_window;
      let used = net.value_ex as u128 * window as u128
        / RATE_LIMITING_PRECISION as u128;
      let allowed = max_share_in_window(
        state.virtual_net_limit,
        window,
        net_weight,
        state.total_net_weight,
      );
      if used > allowed {
        debug!("{account} exceeded its net share: {used} > {allowed}");
        return Err(ChainError::TransactionResourceExhausted(
          ResourceKind::Net,
        ));
      }
    }
  }

  let pending_cpu = state.pending_cpu_usage.saturating_add(cpu_usage);
  let pending_net = state.pending_net_usage.saturating_add(net_usage);
  tables.resource_limits_state.modify(0, |s| {
    s.pending_cpu_usage = pending_cpu;
    s.pending_net_usage = pending_net;
  })?;

  if pending_cpu > config.cpu_limit_parameters.max {
    return Err(ChainError::BlockResourceExhausted(ResourceKind::Cpu));
  }
  if pending_net > config.net_limit_parameters.max {
    return Err(ChainError::BlockResourceExhausted(ResourceKind::Net));
  }
  Ok(())
}

/// Adjusts the ram usage of `account` by a signed number of bytes.
pub fn add_pending_ram_usage(
  tables: &mut ChainTables,
  account: Name,
  delta: i64,
) -> Result<(), ChainError> {
  if delta == 0 {
    return Ok(());
  }
  let usage = usage_record(tables, account)?;
  let id = usage.id;
  let updated = if delta > 0 {
    usage.ram_usage.checked_add(delta as u64)
  } else {
    usage.ram_usage.checked_sub(delta.unsigned_abs())
  };
  let updated = updated.ok_or_else(|| {
    ChainError::assertion(format!("ram usage of '{account}' out of range"))
  })?;
  tables.resource_usage.modify(id, |u| u.ram_usage = updated)?;
  Ok(())
}

/// Fails when `account` uses more ram than its quota.
pub fn verify_account_ram_usage(
  tables: &ChainTables,
  account: Name,
) -> Result<(), ChainError> {
  let (ram_bytes, _, _) = get_account_limits(tables, account)?;
  let usage = usage_record(tables, account)?.ram_usage;
  if ram_bytes >= 0 && usage > ram_bytes as u64 {
    debug!("{account} uses {usage} bytes of ram, quota is {ram_bytes}");
    return Err(ChainError::TransactionResourceExhausted(ResourceKind::Ram));
  }
  Ok(())
}

pub fn get_account_ram_usage(
  tables: &ChainTables,
  account: Name,
) -> Result<u64, ChainError> {
  Ok(usage_record(tables, account)?.ram_usage)
}

fn account_limit(
  tables: &ChainTables,
  account: Name,
  ordinal: u32,
  kind: ResourceKind,
) -> Result<AccountResourceLimit, ChainError> {
  let state = tables.resource_state()?;
  let config = tables.resource_config()?;
  let (_, net_weight, cpu_weight) = get_account_limits(tables, account)?;
  let usage = usage_record(tables, account)?;

  let (weight, total, virtual_limit, window, mut accumulator) = match kind {
    ResourceKind::Cpu => (
      cpu_weight,
      state.total_cpu_weight,
      state.virtual_cpu_limit,
      config.account_cpu_usage_average_window,
      usage.cpu_usage,
    ),
    _ => (
      net_weight,
      state.total_net_weight,
      state.virtual_net_limit,
      config.account_net_usage_average_window,
      usage.net_usage,
    ),
  };

  if weight < 0 || total == 0 {
    return Ok(AccountResourceLimit::UNLIMITED);
  }

  // decay a copy to the current ordinal
  accumulator.add(0, ordinal.max(accumulator.last_ordinal), window)?;

  let max = max_share_in_window(virtual_limit, window, weight, total);
  let precision = RATE_LIMITING_PRECISION as u128;
  let scaled = accumulator.value_ex as u128 * window as u128;
  let used = scaled / precision + u128::from(scaled % precision > 0);
  let clamp = |v: u128| v.min(i64::MAX as u128) as i64;

  Ok(AccountResourceLimit {
    used: clamp(used),
    available: clamp(max.saturating_sub(used)),
    max: clamp(max),
  })
}

pub fn get_account_cpu_limit(
  tables: &ChainTables,
  account: Name,
  ordinal: u32,
) -> Result<AccountResourceLimit, ChainError> {
  account_limit(tables, account, ordinal, ResourceKind::Cpu)
}

pub fn get_account_net_limit(
  tables: &ChainTables,
  account: Name,
  ordinal: u32,
) -> Result<AccountResourceLimit, ChainError> {
  account_limit(tables, account, ordinal, ResourceKind::Net)
}

/// Cpu left in the current block.
pub fn get_block_cpu_limit(tables: &ChainTables) -> Result<u64, ChainError> {
  let state = tables.resource_state()?;
  let config = tables.resource_config()?;
  Ok(
    config
      .cpu_limit_parameters
      .max
      .saturating_sub(state.pending_cpu_usage),
  )
}

/// Net left in the current block.
pub fn get_block_net_limit(tables: &ChainTables) -> Result<u64, ChainError> {
  let state = tables.resource_state()?;
  let config = tables.resource_config()?;
  Ok(
    config
      .net_limit_parameters
      .max
      .saturating_sub(state.pending_net_usage),
  )
}

/// Folds the pending usage of the finished block into the block
/// averages and moves the virtual limits accordingly.
pub fn process_block_usage(
  tables: &mut ChainTables,
  ordinal: u32,
) -> Result<(), ChainError> {
  let config = tables.resource_config()?.clone();
  let mut state = tables.resource_state()?.clone();

  state.average_block_cpu_usage.add(
    state.pending_cpu_usage,
    ordinal,
    config.cpu_limit_parameters.periods,
  )?;
  state.virtual_cpu_limit = config.cpu_limit_parameters.update(
    state.virtual_cpu_limit,
    state.average_block_cpu_usage.average(),
  );
  state.pending_cpu_usage = 0;

  state.average_block_net_usage.add(
    state.pending_net_usage,
    ordinal,
    config.net_limit_parameters.periods,
  )?;
  state.virtual_net_limit = config.net_limit_parameters.update(
    state.virtual_net_limit,
    state.average_block_net_usage.average(),
  );
  state.pending_net_usage = 0;

  debug!(
    "block usage processed, virtual cpu limit {}, virtual net limit {}",
    state.virtual_cpu_limit, state.virtual_net_limit
  );
  tables.resource_limits_state.modify(0, |s| *s = state)?;
  Ok(())
}
