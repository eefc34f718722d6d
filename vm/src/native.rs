//! Built-in handlers of the system actions.

use {
  crate::{
    apply_context::ApplyContext,
    authorization::{
      create_permission,
      find_permission,
      get_permission,
      modify_permission,
      permission_billable_size,
      remove_permission,
    },
    execution::transaction_id_to_sender_id,
    objects::{
      AccountObject,
      CodeObject,
      GeneratedTransactionObject,
      PermissionLinkObject,
    },
    resource_limits::{
      self,
      OVERHEAD_PER_ACCOUNT_RAM_BYTES,
      PERMISSION_LINK_RAM_BYTES,
      SETCODE_RAM_BYTES_MULTIPLIER,
    },
    wasm::{HostApi, VM_TYPE_WASM},
    ChainError,
  },
  cinder_primitives::{
    system::{self, *},
    Digest,
    Name,
    PermissionLevel,
  },
  tracing::{debug, info},
};

pub(crate) type Handler = fn(&mut ApplyContext) -> Result<(), ChainError>;

/// Reserved prefix of system account and permission names.
const RESERVED_PREFIX: &str = "cinder.";

/// Longest name an account can be created with.
const MAX_ACCOUNT_NAME_LEN: usize = 12;

pub(crate) fn handler(action: Name) -> Option<Handler> {
  let handler: Handler = match action {
    system::NEWACCOUNT => newaccount,
    system::SETCODE => setcode,
    system::SETABI => setabi,
    system::UPDATEAUTH => updateauth,
    system::DELETEAUTH => deleteauth,
    system::LINKAUTH => linkauth,
    system::UNLINKAUTH => unlinkauth,
    system::CANCELDELAY => canceldelay,
    system::SETPRIV => setpriv,
    system::SETLIMITS => setlimits,
    _ => return None,
  };
  Some(handler)
}

fn is_reserved(name: Name) -> bool {
  name.to_string().starts_with(RESERVED_PREFIX)
}

fn newaccount(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let create: NewAccount = ctx.act.data_as()?;
  ctx.require_auth(create.creator)?;
  create.owner.validate()?;
  create.active.validate()?;

  let name = create.name;
  if name.is_empty() {
    return Err(ChainError::assertion("account name cannot be empty"));
  }
  if name.to_string().len() > MAX_ACCOUNT_NAME_LEN {
    return Err(ChainError::assertion(format!(
      "account names can only be {MAX_ACCOUNT_NAME_LEN} chars long"
    )));
  }
  if !ctx.privileged && is_reserved(name) {
    return Err(ChainError::assertion(format!(
      "only privileged accounts can have names that start with \
       '{RESERVED_PREFIX}'"
    )));
  }
  if ctx.trx.tables.is_account(name) {
    return Err(ChainError::assertion(format!(
      "cannot create account named {name}, as that name is already taken"
    )));
  }

  let now = ctx.now();
  let tables = &mut *ctx.trx.tables;
  tables.accounts.create(|id| AccountObject {
    id,
    name,
    creation_date: now,
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
  resource_limits::initialize_account(tables, name)?;

  let ram = OVERHEAD_PER_ACCOUNT_RAM_BYTES
    + permission_billable_size(&create.owner)?
    + permission_billable_size(&create.active)?;

  let owner = create_permission(
    tables,
    name,
    OWNER_PERMISSION,
    None,
    create.owner,
    now,
  )?;
  create_permission(
    tables,
    name,
    ACTIVE_PERMISSION,
    Some(owner),
    create.active,
    now,
  )?;

  ctx.trx.add_ram_usage(name, ram as i64)?;
  info!("account {name} created by {}", create.creator);
  Ok(())
}

fn setcode(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let act: SetCode = ctx.act.data_as()?;
  ctx.require_auth(act.account)?;

  if act.vm_type != VM_TYPE_WASM || act.vm_version != 0 {
    return Err(ChainError::assertion("vm type and version must be 0"));
  }

  let mut code_hash = Digest::zero();
  if !act.code.is_empty() {
    code_hash = Digest::hash(&act.code);
    let runtime = ctx.trx.runtime;
    let module = runtime.validate(&act.code, ctx.trx.config.max_wasm_pages)?;
    drop(runtime.cache().insert((code_hash, act.vm_version), module));
  }

  let account = ctx.trx.tables.require_account(act.account)?.clone();
  let tables = &mut *ctx.trx.tables;

  let existing = match account.has_code() {
    true => tables
      .codes
      .find(
        CodeObject::BY_HASH,
        &CodeObject::key(&account.code_hash, account.vm_type, account.vm_version),
      )
      .cloned(),
    false => None,
  };

  if existing.is_none() && act.code.is_empty() {
    return Err(ChainError::assertion("contract is already cleared"));
  }
  if account.code_hash == code_hash
    && account.vm_type == act.vm_type
    && account.vm_version == act.vm_version
  {
    return Err(ChainError::assertion(
      "contract is already running this version of code",
    ));
  }

  let old_size = existing
    .as_ref()
    .map(|c| c.code.len() as i64 * SETCODE_RAM_BYTES_MULTIPLIER as i64)
    .unwrap_or(0);
  let new_size = act.code.len() as i64 * SETCODE_RAM_BYTES_MULTIPLIER as i64;

  if let Some(old) = existing {
    if old.ref_count == 1 {
      tables.codes.remove(old.id)?;
      ctx.trx.runtime.cache().evict(&(old.code_hash, old.vm_version));
    } else {
      tables.codes.modify(old.id, |c| c.ref_count -= 1)?;
    }
  }

  if !act.code.is_empty() {
    let key = CodeObject::key(&code_hash, act.vm_type, act.vm_version);
    match tables.codes.find(CodeObject::BY_HASH, &key).map(|c| c.id) {
      Some(id) => {
        tables.codes.modify(id, |c| c.ref_count += 1)?;
      }
      None => {
        let block_num = ctx.trx.block.block_num;
        let SetCode {
          vm_type,
          vm_version,
          code,
          ..
        } = act.clone();
        tables.codes.create(|id| CodeObject {
          id,
          code_hash,
          code,
          vm_type,
          vm_version,
          ref_count: 1,
          first_block_used: block_num,
        })?;
      }
    }
  }

  tables.accounts.modify(account.id, |a| {
    a.code_hash = code_hash;
    a.vm_type = act.vm_type;
    a.vm_version = act.vm_version;
    a.code_sequence += 1;
  })?;

  if new_size != old_size {
    ctx.trx.add_ram_usage(act.account, new_size - old_size)?;
  }
  debug!("code of {} set to {code_hash}", act.account);
  Ok(())
}

fn setabi(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let act: SetAbi = ctx.act.data_as()?;
  ctx.require_auth(act.account)?;

  let account = ctx.trx.tables.require_account(act.account)?.clone();
  let delta = act.abi.len() as i64 - account.abi.len() as i64;
  ctx.trx.tables.accounts.modify(account.id, |a| {
    a.abi = act.abi;
    a.abi_sequence += 1;
  })?;

  if delta != 0 {
    ctx.trx.add_ram_usage(act.account, delta)?;
  }
  Ok(())
}

fn updateauth(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let update: UpdateAuth = ctx.act.data_as()?;
  ctx.require_auth(update.account)?;

  if update.permission.is_empty() {
    return Err(ChainError::assertion("cannot create authority with empty name"));
  }
  if is_reserved(update.permission) {
    return Err(ChainError::assertion(format!(
      "permission names that start with '{RESERVED_PREFIX}' are reserved"
    )));
  }
  if update.permission == update.parent {
    return Err(ChainError::assertion("cannot set an authority as its own parent"));
  }
  ctx.trx.tables.require_account(update.account)?;
  update.auth.validate()?;

  if update.permission == ACTIVE_PERMISSION && update.parent != OWNER_PERMISSION {
    return Err(ChainError::assertion(
      "cannot change active authority's parent from owner",
    ));
  }
  if update.permission == OWNER_PERMISSION {
    if !update.parent.is_empty() {
      return Err(ChainError::assertion("cannot change owner authority's parent"));
    }
  } else if update.parent.is_empty() {
    return Err(ChainError::assertion("only owner permission can have empty parent"));
  }

  let max_delay = ctx.trx.config.max_transaction_delay;
  if update.auth.waits.iter().any(|w| w.wait_sec > max_delay) {
    return Err(ChainError::assertion(format!(
      "cannot set delay longer than the maximum of {max_delay}s"
    )));
  }

  let tables = &mut *ctx.trx.tables;
  let parent = match update.permission == OWNER_PERMISSION {
    true => None,
    false => Some(
      get_permission(tables, &PermissionLevel::new(update.account, update.parent))?
        .id,
    ),
  };

  let now = ctx.trx.block.time;
  let level = PermissionLevel::new(update.account, update.permission);
  let new_size = permission_billable_size(&update.auth)? as i64;

  let delta = match find_permission(tables, &level).cloned() {
    Some(permission) => {
      if permission.parent != parent {
        return Err(ChainError::assertion(
          "changing the parent of an authority is not supported",
        ));
      }
      let old_size = permission_billable_size(&permission.auth)? as i64;
      modify_permission(tables, permission.id, update.auth, now)?;
      new_size - old_size
    }
    None => {
      create_permission(
        tables,
        update.account,
        update.permission,
        parent,
        update.auth,
        now,
      )?;
      new_size
    }
  };

  ctx.trx.add_ram_usage(update.account, delta)
}

fn deleteauth(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let remove: DeleteAuth = ctx.act.data_as()?;
  ctx.require_auth(remove.account)?;

  if remove.permission == ACTIVE_PERMISSION || remove.permission == OWNER_PERMISSION {
    return Err(ChainError::assertion(format!(
      "cannot delete the {} authority",
      remove.permission
    )));
  }

  let tables = &mut *ctx.trx.tables;
  let permission = get_permission(
    tables,
    &PermissionLevel::new(remove.account, remove.permission),
  )?
  .clone();
  let size = permission_billable_size(&permission.auth)? as i64;
  remove_permission(tables, permission.id)?;

  ctx.trx.add_ram_usage(remove.account, -size)
}

fn linkauth(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let link: LinkAuth = ctx.act.data_as()?;
  ctx.require_auth(link.account)?;

  if link.requirement.is_empty() {
    return Err(ChainError::assertion("required permission cannot be empty"));
  }

  let tables = &mut *ctx.trx.tables;
  tables.require_account(link.account)?;
  tables.require_account(link.code)?;
  if link.requirement != ANY_PERMISSION {
    get_permission(tables, &PermissionLevel::new(link.account, link.requirement))?;
  }

  let key = PermissionLinkObject::key(link.account, link.code, link.message_type);
  let existing = tables
    .permission_links
    .find(PermissionLinkObject::BY_ACTION, &key)
    .cloned();

  match existing {
    Some(existing) => {
      if existing.required_permission == link.requirement {
        return Err(ChainError::assertion(
          "new requirement is the same as the old one",
        ));
      }
      tables
        .permission_links
        .modify(existing.id, |l| l.required_permission = link.requirement)?;
      Ok(())
    }
    None => {
      tables.permission_links.create(|id| PermissionLinkObject {
        id,
        account: link.account,
        code: link.code,
        message_type: link.message_type,
        required_permission: link.requirement,
      })?;
      ctx
        .trx
        .add_ram_usage(link.account, PERMISSION_LINK_RAM_BYTES as i64)
    }
  }
}

fn unlinkauth(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let unlink: UnlinkAuth = ctx.act.data_as()?;
  ctx.require_auth(unlink.account)?;

  let key =
    PermissionLinkObject::key(unlink.account, unlink.code, unlink.message_type);
  let link = ctx
    .trx
    .tables
    .permission_links
    .find(PermissionLinkObject::BY_ACTION, &key)
    .map(|l| l.id)
    .ok_or_else(|| ChainError::assertion("no link found to unlink"))?;

  ctx.trx.tables.permission_links.remove(link)?;
  ctx
    .trx
    .add_ram_usage(unlink.account, -(PERMISSION_LINK_RAM_BYTES as i64))
}

fn canceldelay(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let cancel: CancelDelay = ctx.act.data_as()?;
  ctx.require_auth(cancel.canceling_auth.actor)?;

  let sender_id = transaction_id_to_sender_id(&cancel.trx_id);
  let generated = ctx
    .trx
    .tables
    .generated_transactions
    .find(
      GeneratedTransactionObject::BY_SENDER_ID,
      &GeneratedTransactionObject::sender_key(Name::default(), sender_id),
    )
    .filter(|g| g.trx_id == cancel.trx_id)
    .cloned()
    .ok_or_else(|| {
      ChainError::transaction(format!(
        "there is no delayed transaction with id {}",
        cancel.trx_id
      ))
    })?;

  ctx
    .trx
    .add_ram_usage(generated.payer, -(generated.billable_size() as i64))?;
  ctx.trx.tables.generated_transactions.remove(generated.id)?;
  info!("delayed transaction {} canceled", cancel.trx_id);
  Ok(())
}

fn setpriv(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  ctx.require_privileged()?;
  let act: SetPriv = ctx.act.data_as()?;
  let id = ctx.trx.tables.require_account(act.account)?.id;
  ctx
    .trx
    .tables
    .accounts
    .modify(id, |a| a.privileged = act.is_priv)?;
  info!("privileged flag of {} set to {}", act.account, act.is_priv);
  Ok(())
}

fn setlimits(ctx: &mut ApplyContext) -> Result<(), ChainError> {
  let act: SetLimits = ctx.act.data_as()?;
  ctx.set_resource_limits(act.account, act.ram_bytes, act.net_weight, act.cpu_weight)
}
