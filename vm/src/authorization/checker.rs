use {
  super::AuthorizationError,
  crate::state::ChainTables,
  cinder_primitives::{Authority, Name, PermissionLevel, PublicKey},
  std::collections::{BTreeSet, HashMap},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermissionStatus {
  BeingEvaluated,
  Unsatisfied,
  Satisfied,
}

/// Entry of an authority visited in evaluation order.
enum Factor<'a> {
  Wait(u32),
  Key(&'a PublicKey),
  Permission(&'a PermissionLevel),
}

impl Factor<'_> {
  fn rank(&self) -> u8 {
    match self {
      Factor::Wait(_) => 0,
      Factor::Key(_) => 1,
      Factor::Permission(_) => 2,
    }
  }
}

/// Evaluates permission levels against a fixed set of provided
/// credentials.
///
/// Results of evaluated permission levels are cached for the lifetime
/// of the checker, which is also what breaks cycles between
/// authorities that reference each other.
pub struct AuthorityChecker<'a> {
  tables: &'a ChainTables,
  provided_keys: Vec<PublicKey>,
  used_keys: Vec<bool>,
  provided_permissions: &'a BTreeSet<PermissionLevel>,
  provided_delay_sec: u64,
  max_depth: u16,
  cache: HashMap<PermissionLevel, PermissionStatus>,
}

impl<'a> AuthorityChecker<'a> {
  /// Duplicate keys collapse to a single provided key.
  pub fn new(
    tables: &'a ChainTables,
    provided_keys: impl IntoIterator<Item = PublicKey>,
    provided_permissions: &'a BTreeSet<PermissionLevel>,
    provided_delay_sec: u64,
    max_depth: u16,
  ) -> Self {
    let provided_keys: Vec<PublicKey> = provided_keys
      .into_iter()
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    let used_keys = vec![false; provided_keys.len()];
    Self {
      tables,
      provided_keys,
      used_keys,
      provided_permissions,
      provided_delay_sec,
      max_depth,
      cache: HashMap::new(),
    }
  }

  /// Whether `level` is satisfied, with the delay the checker was
  /// created with.
  pub fn satisfied(
    &mut self,
    level: &PermissionLevel,
  ) -> Result<bool, AuthorizationError> {
    self.satisfied_level(level, 0)
  }

  /// Whether `level` is satisfied with a different provided delay.
  pub fn satisfied_with_delay(
    &mut self,
    level: &PermissionLevel,
    provided_delay_sec: u64,
  ) -> Result<bool, AuthorizationError> {
    if provided_delay_sec != self.provided_delay_sec {
      self.provided_delay_sec = provided_delay_sec;
      self.cache.clear();
    }
    self.satisfied_level(level, 0)
  }

  /// Whether an authority that is not stored in the database is
  /// satisfied.
  pub fn satisfied_authority(
    &mut self,
    authority: &Authority,
  ) -> Result<bool, AuthorizationError> {
    self.evaluate(authority, 0)
  }

  pub fn all_keys_used(&self) -> bool {
    self.used_keys.iter().all(|used| *used)
  }

  pub fn used_keys(&self) -> Vec<PublicKey> {
    self.keys_where(true)
  }

  pub fn unused_keys(&self) -> Vec<PublicKey> {
    self.keys_where(false)
  }

  fn keys_where(&self, used: bool) -> Vec<PublicKey> {
    self
      .provided_keys
      .iter()
      .zip(self.used_keys.iter())
      .filter(|(_, u)| **u == used)
      .map(|(k, _)| *k)
      .collect()
  }

  fn status(&self, level: &PermissionLevel) -> Option<PermissionStatus> {
    let wildcard = PermissionLevel::new(level.actor, Name::default());
    if self.provided_permissions.contains(level)
      || self.provided_permissions.contains(&wildcard)
    {
      return Some(PermissionStatus::Satisfied);
    }
    self.cache.get(level).copied()
  }

  fn satisfied_level(
    &mut self,
    level: &PermissionLevel,
    depth: u16,
  ) -> Result<bool, AuthorizationError> {
    match self.status(level) {
      Some(PermissionStatus::Satisfied) => Ok(true),
      Some(_) => Ok(false),
      None => {
        if depth >= self.max_depth {
          return Err(AuthorizationError::DepthExceeded {
            max: self.max_depth,
          });
        }

        let tables = self.tables;
        let permission = tables
          .permission(level)
          .ok_or(AuthorizationError::UnknownPermission(*level))?;

        self.cache.insert(*level, PermissionStatus::BeingEvaluated);
        let satisfied = self.evaluate(&permission.auth, depth + 1)?;
        self.cache.insert(*level, match satisfied {
          true => PermissionStatus::Satisfied,
          false => PermissionStatus::Unsatisfied,
        });
        Ok(satisfied)
      }
    }
  }

  /// Visits entries heaviest first, waits before keys before
  /// permission levels, and stops as soon as the threshold is met.
  /// Keys marked as used by an unsatisfied authority are released.
  fn evaluate(
    &mut self,
    authority: &Authority,
    depth: u16,
  ) -> Result<bool, AuthorizationError> {
    let mut factors: Vec<(u16, Factor)> = authority
      .waits
      .iter()
      .map(|w| (w.weight, Factor::Wait(w.wait_sec)))
      .chain(authority.keys.iter().map(|k| (k.weight, Factor::Key(&k.key))))
      .chain(
        authority
          .accounts
          .iter()
          .map(|a| (a.weight, Factor::Permission(&a.permission))),
      )
      .collect();
    factors.sort_by(|(wa, fa), (wb, fb)| {
      wb.cmp(wa).then_with(|| fa.rank().cmp(&fb.rank()))
    });

    let saved = self.used_keys.clone();
    let threshold = authority.threshold as u64;
    let mut total: u64 = 0;

    for (weight, factor) in factors {
      let counts = match factor {
        Factor::Wait(wait_sec) => self.provided_delay_sec >= wait_sec as u64,
        Factor::Key(key) => match self.provided_keys.binary_search(key) {
          Ok(position) => {
            self.used_keys[position] = true;
            true
          }
          Err(_) => false,
        },
        Factor::Permission(level) => self.satisfied_level(level, depth)?,
      };

      if counts {
        total += weight as u64;
        if total >= threshold {
          return Ok(true);
        }
      }
    }

    self.used_keys = saved;
    Ok(false)
  }
}
