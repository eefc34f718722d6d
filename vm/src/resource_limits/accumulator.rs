use {
  crate::ChainError,
  serde::{Deserialize, Serialize},
};

/// Fixed-point scale of accumulator values.
pub const RATE_LIMITING_PRECISION: u64 = 1_000_000;

fn divide_ceil(num: u128, den: u128) -> u128 {
  num / den + u128::from(num % den > 0)
}

fn downgrade(value: u128) -> Result<u64, ChainError> {
  u64::try_from(value)
    .map_err(|_| ChainError::assertion("resource usage overflow"))
}

/// Exponentially decaying average of usage over a window of ordinals.
///
/// `value_ex` is the average scaled by [`RATE_LIMITING_PRECISION`].
/// All arithmetic is integer so every node computes identical values.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct UsageAccumulator {
  pub last_ordinal: u32,
  pub value_ex: u64,
  pub consumed: u64,
}

impl UsageAccumulator {
  /// Average rounded up to whole units.
  pub fn average(&self) -> u64 {
    // value_ex / P always fits
    divide_ceil(self.value_ex as u128, RATE_LIMITING_PRECISION as u128) as u64
  }

  /// Decays `value_ex` by `elapsed` ordinals of a `window`.
  ///
  /// `floor(value_ex * (window - elapsed) / window)`, or zero once the
  /// whole window has passed.
  pub fn decay(value_ex: u64, elapsed: u32, window: u32) -> u64 {
    if window == 0 || elapsed >= window {
      return 0;
    }
    let remaining = (window - elapsed) as u128;
    ((value_ex as u128 * remaining) / window as u128) as u64
  }

  pub fn add(
    &mut self,
    units: u64,
    ordinal: u32,
    window: u32,
  ) -> Result<(), ChainError> {
    if window == 0 {
      return Err(ChainError::assertion("averaging window must be positive"));
    }

    if ordinal < self.last_ordinal {
      return Err(ChainError::assertion("usage ordinal moved backwards"));
    }

    if ordinal != self.last_ordinal {
      self.value_ex =
        Self::decay(self.value_ex, ordinal - self.last_ordinal, window);
      self.last_ordinal = ordinal;
      self.consumed = self.average();
    }

    let contribution = divide_ceil(
      units as u128 * RATE_LIMITING_PRECISION as u128,
      window as u128,
    );

    self.consumed = self
      .consumed
      .checked_add(units)
      .ok_or_else(|| ChainError::assertion("resource usage overflow"))?;
    self.value_ex =
      downgrade(self.value_ex as u128 + contribution)?;
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
  pub numerator: u64,
  pub denominator: u64,
}

impl Ratio {
  fn apply(&self, value: u64) -> u64 {
    let scaled = value as u128 * self.numerator as u128;
    let result = scaled / self.denominator.max(1) as u128;
    result.min(u64::MAX as u128) as u64
  }
}

/// Bounds and rates of a congestion-driven virtual limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticLimitParameters {
  /// Usage above which the limit contracts.
  pub target: u64,

  /// Hard cap, and the lowest value the virtual limit may reach.
  pub max: u64,

  /// Averaging window in blocks.
  pub periods: u32,
  pub max_multiplier: u32,
  pub contract_rate: Ratio,
  pub expand_rate: Ratio,
}

impl ElasticLimitParameters {
  pub fn new(max: u64, target_pct: u32) -> Self {
    Self {
      target: (max as u128 * target_pct as u128
        / crate::config::PERCENT_100 as u128) as u64,
      max,
      periods: 120,
      max_multiplier: 1000,
      contract_rate: Ratio {
        numerator: 99,
        denominator: 100,
      },
      expand_rate: Ratio {
        numerator: 1000,
        denominator: 999,
      },
    }
  }

  pub fn validate(&self) -> Result<(), ChainError> {
    let valid = self.periods > 0
      && self.max_multiplier > 0
      && self.contract_rate.denominator > 0
      && self.expand_rate.denominator > 0
      && self.contract_rate.numerator <= self.contract_rate.denominator
      && self.expand_rate.numerator >= self.expand_rate.denominator
      && self.target <= self.max;
    if valid {
      Ok(())
    } else {
      Err(ChainError::assertion("invalid elastic limit parameters"))
    }
  }

  /// Next virtual limit given the current one and the recent average.
  pub fn update(&self, current: u64, average_usage: u64) -> u64 {
    let next = if average_usage > self.target {
      self.contract_rate.apply(current)
    } else {
      self.expand_rate.apply(current)
    };
    let ceiling = self.max.saturating_mul(self.max_multiplier as u64);
    next.max(self.max).min(ceiling)
  }
}
