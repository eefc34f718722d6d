//! Permissions, permission links and the checks that decide whether a
//! set of keys, satisfied permission levels and a delay authorizes a
//! list of actions.

mod checker;

pub use checker::AuthorityChecker;

use {
  crate::{
    objects::{
      GeneratedTransactionObject,
      PermissionLinkObject,
      PermissionObject,
    },
    resource_limits,
    state::ChainTables,
    ChainError,
  },
  cinder_primitives::{
    pack,
    system::{
      self,
      CancelDelay,
      DeleteAuth,
      LinkAuth,
      UnlinkAuth,
      UpdateAuth,
    },
    unpack,
    Action,
    Authority,
    AuthorityError,
    Name,
    PermissionLevel,
    PublicKey,
    TimePoint,
    Transaction,
  },
  std::collections::{BTreeMap, BTreeSet},
  thiserror::Error,
  tracing::debug,
};

#[derive(Debug, Error)]
pub enum AuthorizationError {
  #[error("declared authority '{0}' is not satisfied by the provided keys, permissions and delay")]
  Unsatisfied(PermissionLevel),

  #[error("permission '{0}' does not exist")]
  UnknownPermission(PermissionLevel),

  #[error("authority recursion deeper than {max} levels")]
  DepthExceeded { max: u16 },

  #[error("missing authority of '{0}'")]
  MissingAuth(Name),

  #[error("declared authority '{declared}' is irrelevant, minimum authority is '{minimum}'")]
  IrrelevantAuth {
    declared: PermissionLevel,
    minimum: PermissionLevel,
  },

  #[error("transaction bears irrelevant signatures from {0:?}")]
  IrrelevantSignature(Vec<PublicKey>),

  #[error("invalid authority: {0}")]
  InvalidAuthority(#[from] AuthorityError),

  #[error("invalid transaction signature")]
  InvalidSignature,
}

/// System actions that can never be linked to a custom permission.
const UNLINKABLE_ACTIONS: [Name; 5] = [
  system::UPDATEAUTH,
  system::DELETEAUTH,
  system::LINKAUTH,
  system::UNLINKAUTH,
  system::CANCELDELAY,
];

pub fn find_permission<'a>(
  tables: &'a ChainTables,
  level: &PermissionLevel,
) -> Option<&'a PermissionObject> {
  tables.permission(level)
}

pub fn get_permission<'a>(
  tables: &'a ChainTables,
  level: &PermissionLevel,
) -> Result<&'a PermissionObject, AuthorizationError> {
  tables
    .permission(level)
    .ok_or(AuthorizationError::UnknownPermission(*level))
}

/// Ram billed for storing a permission with this authority.
pub fn permission_billable_size(auth: &Authority) -> Result<u64, ChainError> {
  Ok(resource_limits::PERMISSION_RAM_BYTES + pack(auth)?.len() as u64)
}

/// Every account referenced by an authority must exist.
fn validate_authority(
  tables: &ChainTables,
  auth: &Authority,
) -> Result<(), ChainError> {
  auth.validate()?;
  for entry in &auth.accounts {
    let actor = entry.permission.actor;
    if !tables.is_account(actor) {
      return Err(ChainError::assertion(format!(
        "authority references non-existing account '{actor}'"
      )));
    }
  }
  Ok(())
}

pub fn create_permission(
  tables: &mut ChainTables,
  account: Name,
  name: Name,
  parent: Option<u64>,
  auth: Authority,
  now: TimePoint,
) -> Result<u64, ChainError> {
  validate_authority(tables, &auth)?;
  let id = tables
    .permissions
    .create(|id| PermissionObject {
      id,
      owner: account,
      name,
      parent,
      last_updated: now,
      auth,
    })?
    .id;
  debug!("created permission {account}@{name}");
  Ok(id)
}

pub fn modify_permission(
  tables: &mut ChainTables,
  id: u64,
  auth: Authority,
  now: TimePoint,
) -> Result<(), ChainError> {
  validate_authority(tables, &auth)?;
  tables.permissions.modify(id, |p| {
    p.auth = auth;
    p.last_updated = now;
  })?;
  Ok(())
}

/// Removes a permission that has no children and no links.
pub fn remove_permission(
  tables: &mut ChainTables,
  id: u64,
) -> Result<PermissionObject, ChainError> {
  let permission = tables
    .permissions
    .get(id)
    .ok_or_else(|| ChainError::assertion("permission does not exist"))?;

  let has_children = tables
    .permissions
    .range(
      PermissionObject::BY_PARENT,
      PermissionObject::parent_key(Some(id), 0)
        ..=PermissionObject::parent_key(Some(id), u64::MAX),
    )
    .next()
    .is_some();
  if has_children {
    return Err(ChainError::assertion(format!(
      "cannot delete permission {} that has children",
      permission.level()
    )));
  }

  let (owner, name) = (permission.owner, permission.name);
  let has_links = tables
    .permission_links
    .range(
      PermissionLinkObject::BY_PERMISSION,
      PermissionLinkObject::permission_key(owner, name, 0)
        ..=PermissionLinkObject::permission_key(owner, name, u64::MAX),
    )
    .next()
    .is_some();
  if has_links {
    return Err(ChainError::assertion(format!(
      "cannot delete linked permission {owner}@{name}"
    )));
  }

  Ok(tables.permissions.remove(id)?)
}

/// Whether `declared` is `required` or one of its ancestors.
pub fn permission_satisfies(
  tables: &ChainTables,
  declared: &PermissionObject,
  required: &PermissionObject,
) -> bool {
  if declared.owner != required.owner {
    return false;
  }
  let mut current = Some(required);
  while let Some(permission) = current {
    if permission.id == declared.id {
      return true;
    }
    current = permission.parent.and_then(|p| tables.permissions.get(p));
  }
  false
}

/// Permission linked for `account` to `code::action`, falling back to
/// a link covering every action of `code`.
pub fn lookup_linked_permission(
  tables: &ChainTables,
  account: Name,
  code: Name,
  action: Name,
) -> Option<Name> {
  let find = |message_type| {
    tables
      .permission_links
      .find(
        PermissionLinkObject::BY_ACTION,
        &PermissionLinkObject::key(account, code, message_type),
      )
      .map(|l| l.required_permission)
  };
  find(action).or_else(|| find(Name::default()))
}

/// Lowest permission of `account` able to authorize `code::action`,
/// `None` when any permission will do.
pub fn lookup_minimum_permission(
  tables: &ChainTables,
  account: Name,
  code: Name,
  action: Name,
) -> Result<Option<Name>, ChainError> {
  if code == system::SYSTEM_ACCOUNT && UNLINKABLE_ACTIONS.contains(&action) {
    return Err(ChainError::assertion(format!(
      "{action} can not be linked to a minimum permission"
    )));
  }
  match lookup_linked_permission(tables, account, code, action) {
    None => Ok(Some(system::ACTIVE_PERMISSION)),
    Some(linked) if linked == system::ANY_PERMISSION => Ok(None),
    Some(linked) => Ok(Some(linked)),
  }
}

fn single_declared_auth(
  auths: &[PermissionLevel],
  account: Name,
  action: Name,
) -> Result<PermissionLevel, ChainError> {
  if auths.len() != 1 {
    return Err(ChainError::assertion(format!(
      "{action} must declare exactly one authorization"
    )));
  }
  let declared = auths[0];
  if declared.actor != account {
    return Err(ChainError::assertion(format!(
      "the actor of {action} must be the affected account '{account}'"
    )));
  }
  Ok(declared)
}

fn ensure_satisfies(
  tables: &ChainTables,
  declared: &PermissionLevel,
  minimum: &PermissionLevel,
) -> Result<(), ChainError> {
  let declared_permission = get_permission(tables, declared)?;
  let minimum_permission = get_permission(tables, minimum)?;
  if !permission_satisfies(tables, declared_permission, minimum_permission) {
    return Err(
      AuthorizationError::IrrelevantAuth {
        declared: *declared,
        minimum: *minimum,
      }
      .into(),
    );
  }
  Ok(())
}

pub fn check_updateauth_authorization(
  tables: &ChainTables,
  update: &UpdateAuth,
  auths: &[PermissionLevel],
) -> Result<(), ChainError> {
  let declared = single_declared_auth(auths, update.account, system::UPDATEAUTH)?;
  let existing = PermissionLevel::new(update.account, update.permission);
  let minimum = match find_permission(tables, &existing) {
    Some(_) => existing,
    None => PermissionLevel::new(update.account, update.parent),
  };
  ensure_satisfies(tables, &declared, &minimum)
}

pub fn check_deleteauth_authorization(
  tables: &ChainTables,
  delete: &DeleteAuth,
  auths: &[PermissionLevel],
) -> Result<(), ChainError> {
  let declared = single_declared_auth(auths, delete.account, system::DELETEAUTH)?;
  let minimum = PermissionLevel::new(delete.account, delete.permission);
  ensure_satisfies(tables, &declared, &minimum)
}

pub fn check_linkauth_authorization(
  tables: &ChainTables,
  link: &LinkAuth,
  auths: &[PermissionLevel],
) -> Result<(), ChainError> {
  let declared = single_declared_auth(auths, link.account, system::LINKAUTH)?;
  if link.code == system::SYSTEM_ACCOUNT
    && UNLINKABLE_ACTIONS.contains(&link.message_type)
  {
    return Err(ChainError::assertion(format!(
      "cannot link {} to a minimum permission",
      link.message_type
    )));
  }

  match lookup_minimum_permission(tables, link.account, link.code, link.message_type)? {
    None => Ok(()),
    Some(minimum) => ensure_satisfies(
      tables,
      &declared,
      &PermissionLevel::new(link.account, minimum),
    ),
  }
}

pub fn check_unlinkauth_authorization(
  tables: &ChainTables,
  unlink: &UnlinkAuth,
  auths: &[PermissionLevel],
) -> Result<(), ChainError> {
  let declared = single_declared_auth(auths, unlink.account, system::UNLINKAUTH)?;
  let linked = lookup_linked_permission(
    tables,
    unlink.account,
    unlink.code,
    unlink.message_type,
  )
  .ok_or_else(|| {
    ChainError::assertion(format!(
      "no permission link of '{}' for {}::{}",
      unlink.account, unlink.code, unlink.message_type
    ))
  })?;

  if linked == system::ANY_PERMISSION {
    return Ok(());
  }
  ensure_satisfies(tables, &declared, &PermissionLevel::new(unlink.account, linked))
}

/// Returns the delay of the canceled transaction, which the canceling
/// authority is allowed to use.
pub fn check_canceldelay_authorization(
  tables: &ChainTables,
  cancel: &CancelDelay,
  auths: &[PermissionLevel],
) -> Result<u64, ChainError> {
  if auths.len() != 1 {
    return Err(ChainError::assertion(
      "canceldelay must declare exactly one authorization",
    ));
  }
  ensure_satisfies(tables, &auths[0], &cancel.canceling_auth)?;

  let generated = tables
    .generated_transactions
    .find(
      GeneratedTransactionObject::BY_TRX_ID,
      &GeneratedTransactionObject::trx_key(&cancel.trx_id),
    )
    .filter(|g| g.sender == Name::default())
    .ok_or_else(|| {
      ChainError::transaction(format!(
        "there is no delayed transaction with id {}",
        cancel.trx_id
      ))
    })?;

  let trx: Transaction = unpack(&generated.packed_trx)?;
  let found = trx
    .actions
    .iter()
    .flat_map(|a| a.authorization.iter())
    .any(|level| *level == cancel.canceling_auth);
  if !found {
    return Err(ChainError::assertion(
      "canceling authority was not declared by the delayed transaction",
    ));
  }

  Ok(
    generated
      .delay_until
      .as_secs()
      .saturating_sub(generated.published.as_secs()),
  )
}

/// Parameters of one [`check_authorization`] call.
pub struct AuthorizationRequest<'a> {
  pub actions: &'a [Action],
  pub provided_keys: &'a BTreeSet<PublicKey>,
  pub provided_permissions: &'a BTreeSet<PermissionLevel>,
  pub provided_delay_sec: u64,
  pub allow_unused_keys: bool,
}

/// Verifies that every authorization declared by `actions` is relevant
/// and satisfied.
///
/// A provided delay at or above the maximum transaction delay counts as
/// infinite, satisfying every wait.
pub fn check_authorization(
  tables: &ChainTables,
  request: AuthorizationRequest,
) -> Result<(), ChainError> {
  let config = tables.config()?;
  let max_delay = config.max_transaction_delay as u64;
  let effective_delay = match request.provided_delay_sec >= max_delay {
    true => u64::MAX,
    false => request.provided_delay_sec,
  };

  let mut to_satisfy: BTreeMap<PermissionLevel, u64> = BTreeMap::new();

  for action in request.actions {
    let mut delay = effective_delay;
    let mut special_case = false;

    if action.account == system::SYSTEM_ACCOUNT {
      special_case = true;
      match action.name {
        system::UPDATEAUTH => check_updateauth_authorization(
          tables,
          &action.data_as()?,
          &action.authorization,
        )?,
        system::DELETEAUTH => check_deleteauth_authorization(
          tables,
          &action.data_as()?,
          &action.authorization,
        )?,
        system::LINKAUTH => check_linkauth_authorization(
          tables,
          &action.data_as()?,
          &action.authorization,
        )?,
        system::UNLINKAUTH => check_unlinkauth_authorization(
          tables,
          &action.data_as()?,
          &action.authorization,
        )?,
        system::CANCELDELAY => {
          let canceled = check_canceldelay_authorization(
            tables,
            &action.data_as()?,
            &action.authorization,
          )?;
          delay = delay.max(canceled);
        }
        _ => special_case = false,
      }
    }

    for declared in &action.authorization {
      if !special_case {
        let minimum = lookup_minimum_permission(
          tables,
          declared.actor,
          action.account,
          action.name,
        )?;
        if let Some(minimum) = minimum {
          ensure_satisfies(
            tables,
            declared,
            &PermissionLevel::new(declared.actor, minimum),
          )?;
        }
      }

      to_satisfy
        .entry(*declared)
        .and_modify(|d| *d = (*d).min(delay))
        .or_insert(delay);
    }
  }

  let mut checker = AuthorityChecker::new(
    tables,
    request.provided_keys.iter().copied(),
    request.provided_permissions,
    effective_delay,
    config.max_authority_depth,
  );

  for (level, delay) in &to_satisfy {
    if !checker.satisfied_with_delay(level, *delay)? {
      return Err(AuthorizationError::Unsatisfied(*level).into());
    }
  }

  if !request.allow_unused_keys && !checker.all_keys_used() {
    return Err(
      AuthorizationError::IrrelevantSignature(checker.unused_keys()).into(),
    );
  }
  Ok(())
}

/// Whether one declared permission level is satisfied by the keys and
/// permission levels provided.
pub fn check_permission(
  tables: &ChainTables,
  level: &PermissionLevel,
  provided_keys: &BTreeSet<PublicKey>,
  provided_permissions: &BTreeSet<PermissionLevel>,
  provided_delay_sec: u64,
) -> Result<(), ChainError> {
  let config = tables.config()?;
  let mut checker = AuthorityChecker::new(
    tables,
    provided_keys.iter().copied(),
    provided_permissions,
    provided_delay_sec,
    config.max_authority_depth,
  );
  match checker.satisfied(level)? {
    true => Ok(()),
    false => Err(AuthorizationError::Unsatisfied(*level).into()),
  }
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    crate::{config::ChainConfig, objects::*},
    cinder_primitives::{Digest, KeyWeight, WaitWeight},
  };

  fn key(seed: u8) -> PublicKey {
    PublicKey::from_bytes([seed; 32])
  }

  fn name(s: &str) -> Name {
    Name::from_static(s)
  }

  fn tables() -> anyhow::Result<ChainTables> {
    let mut tables = ChainTables::default();
    tables.global_property.create(|id| GlobalPropertyObject {
      id,
      chain_id: Digest::zero(),
      configuration: ChainConfig::default(),
    })?;
    Ok(tables)
  }

  fn add_account(
    tables: &mut ChainTables,
    account: Name,
    owner: Authority,
    active: Authority,
  ) -> anyhow::Result<()> {
    tables.accounts.create(|id| AccountObject {
      id,
      name: account,
      creation_date: TimePoint::default(),
      privileged: false,
      code_hash: Digest::zero(),
      vm_type: 0,
      vm_version: 0,
      code_sequence: 0,
      abi: vec![],
      abi_sequence: 0,
      recv_sequence: 0,
      auth_sequence: 0,
    })?;
    let now = TimePoint::default();
    let owner_id = create_permission(
      tables,
      account,
      system::OWNER_PERMISSION,
      None,
      owner,
      now,
    )?;
    create_permission(
      tables,
      account,
      system::ACTIVE_PERMISSION,
      Some(owner_id),
      active,
      now,
    )?;
    Ok(())
  }

  fn level(actor: &str, permission: Name) -> PermissionLevel {
    PermissionLevel::new(name(actor), permission)
  }

  fn check(
    tables: &ChainTables,
    level: PermissionLevel,
    keys: &[PublicKey],
    delay: u64,
  ) -> Result<(), ChainError> {
    let keys = keys.iter().copied().collect();
    check_permission(tables, &level, &keys, &BTreeSet::new(), delay)
  }

  #[test]
  fn multisig_threshold() -> anyhow::Result<()> {
    let mut tables = tables()?;
    let mut keys = vec![key(1), key(2), key(3)];
    keys.sort();
    let multisig = Authority {
      threshold: 2,
      keys: keys
        .iter()
        .map(|k| KeyWeight { key: *k, weight: 1 })
        .collect(),
      accounts: vec![],
      waits: vec![],
    };
    add_account(
      &mut tables,
      name("alice"),
      multisig.clone(),
      multisig,
    )?;

    let active = level("alice", system::ACTIVE_PERMISSION);
    assert!(check(&tables, active, &[keys[0]], 0).is_err());
    // the same key twice is still one key
    assert!(check(&tables, active, &[keys[0], keys[0]], 0).is_err());
    check(&tables, active, &[keys[0], keys[2]], 0)?;
    Ok(())
  }

  #[test]
  fn nested_account_authority() -> anyhow::Result<()> {
    let mut tables = tables()?;
    add_account(
      &mut tables,
      name("bob"),
      Authority::from_key(key(2)),
      Authority::from_key(key(2)),
    )?;
    let delegated =
      Authority::from_permission(level("bob", system::ACTIVE_PERMISSION));
    add_account(&mut tables, name("alice"), delegated.clone(), delegated)?;

    check(&tables, level("alice", system::ACTIVE_PERMISSION), &[key(2)], 0)?;
    assert!(matches!(
      check(&tables, level("alice", system::ACTIVE_PERMISSION), &[key(3)], 0),
      Err(ChainError::Authorization(AuthorizationError::Unsatisfied(_)))
    ));
    Ok(())
  }

  #[test]
  fn depth_is_bounded() -> anyhow::Result<()> {
    let mut tables = tables()?;
    let max_depth = ChainConfig::default().max_authority_depth as usize;

    // a0 -> a1 -> ... -> a{max}, each delegating to the next
    let names: Vec<Name> = (0..=max_depth)
      .map(|i| format!("chain{}", (b'a' + i as u8) as char).parse())
      .collect::<Result<_, _>>()?;
    add_account(
      &mut tables,
      names[max_depth],
      Authority::from_key(key(9)),
      Authority::from_key(key(9)),
    )?;
    for i in (0..max_depth).rev() {
      let next = Authority::from_permission(PermissionLevel::new(
        names[i + 1],
        system::ACTIVE_PERMISSION,
      ));
      add_account(&mut tables, names[i], next.clone(), next)?;
    }

    let deep = PermissionLevel::new(names[0], system::ACTIVE_PERMISSION);
    assert!(matches!(
      check(&tables, deep, &[key(9)], 0),
      Err(ChainError::Authorization(AuthorizationError::DepthExceeded { .. }))
    ));

    let shallow = PermissionLevel::new(names[1], system::ACTIVE_PERMISSION);
    check(&tables, shallow, &[key(9)], 0)?;
    Ok(())
  }

  #[test]
  fn unknown_permission() -> anyhow::Result<()> {
    let tables = tables()?;
    assert!(matches!(
      check(&tables, level("nobody", system::ACTIVE_PERMISSION), &[], 0),
      Err(ChainError::Authorization(
        AuthorizationError::UnknownPermission(_)
      ))
    ));
    Ok(())
  }

  #[test]
  fn waits_need_delay() -> anyhow::Result<()> {
    let mut tables = tables()?;
    let delayed = Authority {
      threshold: 2,
      keys: vec![KeyWeight {
        key: key(1),
        weight: 1,
      }],
      accounts: vec![],
      waits: vec![WaitWeight {
        wait_sec: 3600,
        weight: 1,
      }],
    };
    add_account(&mut tables, name("carol"), delayed.clone(), delayed)?;

    let active = level("carol", system::ACTIVE_PERMISSION);
    assert!(check(&tables, active, &[key(1)], 60).is_err());
    check(&tables, active, &[key(1)], 3600)?;
    Ok(())
  }

  #[test]
  fn wildcard_and_code_permissions() -> anyhow::Result<()> {
    let mut tables = tables()?;
    let code = Authority::from_permission(PermissionLevel::new(
      name("token"),
      system::CODE_PERMISSION,
    ));
    add_account(&mut tables, name("token"), Authority::from_key(key(1)), code)?;

    let active = level("token", system::ACTIVE_PERMISSION);
    let provided: BTreeSet<_> =
      [PermissionLevel::new(name("token"), system::CODE_PERMISSION)]
        .into_iter()
        .collect();
    check_permission(&tables, &active, &BTreeSet::new(), &provided, 0)?;

    let wildcard: BTreeSet<_> =
      [PermissionLevel::new(name("token"), Name::default())]
        .into_iter()
        .collect();
    check_permission(
      &tables,
      &level("token", system::OWNER_PERMISSION),
      &BTreeSet::new(),
      &wildcard,
      0,
    )?;
    Ok(())
  }

  #[test]
  fn links_redirect_minimum_permission() -> anyhow::Result<()> {
    let mut tables = tables()?;
    add_account(
      &mut tables,
      name("alice"),
      Authority::from_key(key(1)),
      Authority::from_key(key(2)),
    )?;
    let active_id = get_permission(&tables, &level("alice", system::ACTIVE_PERMISSION))?.id;
    let claim = name("claim");
    create_permission(
      &mut tables,
      name("alice"),
      claim,
      Some(active_id),
      Authority::from_key(key(3)),
      TimePoint::default(),
    )?;
    tables.permission_links.create(|id| PermissionLinkObject {
      id,
      account: name("alice"),
      code: name("game"),
      message_type: name("play"),
      required_permission: claim,
    })?;

    assert_eq!(
      lookup_minimum_permission(&tables, name("alice"), name("game"), name("play"))?,
      Some(claim)
    );
    assert_eq!(
      lookup_minimum_permission(&tables, name("alice"), name("game"), name("quit"))?,
      Some(system::ACTIVE_PERMISSION)
    );

    let play = Action {
      account: name("game"),
      name: name("play"),
      authorization: vec![level("alice", claim)],
      data: vec![],
    };
    let keys: BTreeSet<_> = [key(3)].into_iter().collect();
    check_authorization(&tables, AuthorizationRequest {
      actions: std::slice::from_ref(&play),
      provided_keys: &keys,
      provided_permissions: &BTreeSet::new(),
      provided_delay_sec: 0,
      allow_unused_keys: false,
    })?;

    // claim is below active, it cannot authorize unlinked actions
    let quit = Action {
      name: name("quit"),
      ..play.clone()
    };
    assert!(matches!(
      check_authorization(&tables, AuthorizationRequest {
        actions: std::slice::from_ref(&quit),
        provided_keys: &keys,
        provided_permissions: &BTreeSet::new(),
        provided_delay_sec: 0,
        allow_unused_keys: false,
      }),
      Err(ChainError::Authorization(AuthorizationError::IrrelevantAuth { .. }))
    ));

    // an extra key that is never used is rejected
    let extra: BTreeSet<_> = [key(3), key(4)].into_iter().collect();
    assert!(matches!(
      check_authorization(&tables, AuthorizationRequest {
        actions: std::slice::from_ref(&play),
        provided_keys: &extra,
        provided_permissions: &BTreeSet::new(),
        provided_delay_sec: 0,
        allow_unused_keys: false,
      }),
      Err(ChainError::Authorization(
        AuthorizationError::IrrelevantSignature(_)
      ))
    ));

    // the link keeps claim alive
    let claim_id = get_permission(&tables, &level("alice", claim))?.id;
    assert!(remove_permission(&mut tables, claim_id).is_err());
    assert!(remove_permission(&mut tables, active_id).is_err());
    Ok(())
  }

  #[test]
  fn ancestors_satisfy_descendants() -> anyhow::Result<()> {
    let mut tables = tables()?;
    add_account(
      &mut tables,
      name("alice"),
      Authority::from_key(key(1)),
      Authority::from_key(key(2)),
    )?;
    let owner = get_permission(&tables, &level("alice", system::OWNER_PERMISSION))?;
    let active = get_permission(&tables, &level("alice", system::ACTIVE_PERMISSION))?;
    assert!(permission_satisfies(&tables, owner, active));
    assert!(permission_satisfies(&tables, active, active));
    assert!(!permission_satisfies(&tables, active, owner));
    Ok(())
  }
}
