use {
  serde::{Deserialize, Serialize},
  std::fmt::{Debug, Display},
  time::{format_description::well_known::Rfc3339, OffsetDateTime},
};

/// Length of one block slot.
pub const BLOCK_INTERVAL_MS: u64 = 500;

/// Milliseconds since unix epoch of slot zero (2000-01-01T00:00:00Z).
pub const BLOCK_TIMESTAMP_EPOCH_MS: u64 = 946_684_800_000;

/// Microseconds since the unix epoch.
///
/// Chain logic never reads the wall clock, every time value is derived
/// from block headers and transaction headers.
#[derive(
  Copy,
  Clone,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub struct TimePoint(u64);

impl TimePoint {
  pub const fn from_micros(micros: u64) -> Self {
    Self(micros)
  }

  pub const fn from_secs(secs: u64) -> Self {
    Self(secs.saturating_mul(1_000_000))
  }

  pub const fn as_micros(&self) -> u64 {
    self.0
  }

  pub const fn as_secs(&self) -> u64 {
    self.0 / 1_000_000
  }

  pub const fn saturating_add_micros(&self, micros: u64) -> Self {
    Self(self.0.saturating_add(micros))
  }

  pub const fn saturating_add_secs(&self, secs: u64) -> Self {
    Self(self.0.saturating_add(secs.saturating_mul(1_000_000)))
  }
}

impl Display for TimePoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let nanos = self.0 as i128 * 1000;
    match OffsetDateTime::from_unix_timestamp_nanos(nanos)
      .ok()
      .and_then(|t| t.format(&Rfc3339).ok())
    {
      Some(text) => f.write_str(&text),
      None => write!(f, "{}us", self.0),
    }
  }
}

impl Debug for TimePoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "time({self})")
  }
}

/// Block time expressed as a count of 500ms slots since
/// [`BLOCK_TIMESTAMP_EPOCH_MS`].
///
/// Slots are also the ordinals used by the resource usage accumulators.
#[derive(
  Copy,
  Clone,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub struct BlockTimestamp(u32);

impl BlockTimestamp {
  pub const fn from_slot(slot: u32) -> Self {
    Self(slot)
  }

  pub const fn slot(&self) -> u32 {
    self.0
  }

  pub const fn next(&self) -> Self {
    Self(self.0 + 1)
  }

  pub const fn to_time_point(&self) -> TimePoint {
    TimePoint::from_micros(
      (self.0 as u64 * BLOCK_INTERVAL_MS + BLOCK_TIMESTAMP_EPOCH_MS) * 1000,
    )
  }
}

impl From<TimePoint> for BlockTimestamp {
  fn from(t: TimePoint) -> Self {
    let ms = t.as_micros() / 1000;
    let slot = ms.saturating_sub(BLOCK_TIMESTAMP_EPOCH_MS) / BLOCK_INTERVAL_MS;
    Self(slot.min(u32::MAX as u64) as u32)
  }
}

impl Display for BlockTimestamp {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Display::fmt(&self.to_time_point(), f)
  }
}

impl Debug for BlockTimestamp {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "slot({}, {})", self.0, self.to_time_point())
  }
}

#[cfg(test)]
mod tests {
  use super::{BlockTimestamp, TimePoint};

  #[test]
  fn slots_roundtrip_through_time_points() {
    let ts = BlockTimestamp::from_slot(1234);
    assert_eq!(BlockTimestamp::from(ts.to_time_point()), ts);
    assert_eq!(
      ts.next().to_time_point().as_micros() - ts.to_time_point().as_micros(),
      500_000
    );
  }

  #[test]
  fn time_point_display() {
    let t = TimePoint::from_secs(946_684_800);
    assert_eq!(t.to_string(), "2000-01-01T00:00:00Z");
  }
}
