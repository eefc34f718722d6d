//! The fixed set of functions a contract may import from `env`.

use {
  crate::{error::TrapKind, ChainError},
  cinder_primitives::{Digest, Name, TimePoint},
  once_cell::sync::Lazy,
  std::collections::BTreeMap,
  wasmer::{
    imports,
    AsStoreMut,
    Function,
    FunctionEnv,
    FunctionEnvMut,
    FunctionType,
    Imports,
    Memory,
    Type,
  },
};

pub const HOST_MODULE: &str = "env";

/// Everything a running contract can observe or change.
///
/// Implemented by the apply context of the action being executed.
/// Iterators are small non-negative handles, `-1` is the end iterator.
pub trait HostApi {
  fn action_data(&self) -> &[u8];
  fn receiver(&self) -> Name;
  fn current_time(&self) -> TimePoint;

  fn require_auth(&mut self, account: Name) -> Result<(), ChainError>;
  fn require_auth2(
    &mut self,
    account: Name,
    permission: Name,
  ) -> Result<(), ChainError>;
  fn has_auth(&self, account: Name) -> bool;
  fn require_recipient(&mut self, account: Name) -> Result<(), ChainError>;
  fn is_account(&self, account: Name) -> bool;
  fn is_privileged(&self, account: Name) -> Result<bool, ChainError>;

  fn console_append(&mut self, text: &str);

  fn db_store(
    &mut self,
    scope: Name,
    table: Name,
    payer: Name,
    id: u64,
    value: &[u8],
  ) -> Result<i32, ChainError>;
  fn db_update(
    &mut self,
    iterator: i32,
    payer: Name,
    value: &[u8],
  ) -> Result<(), ChainError>;
  fn db_remove(&mut self, iterator: i32) -> Result<(), ChainError>;
  fn db_get(&self, iterator: i32) -> Result<&[u8], ChainError>;
  fn db_next(&mut self, iterator: i32) -> Result<(i32, u64), ChainError>;
  fn db_find(
    &mut self,
    scope: Name,
    table: Name,
    id: u64,
  ) -> Result<i32, ChainError>;
  fn db_lowerbound(
    &mut self,
    scope: Name,
    table: Name,
    id: u64,
  ) -> Result<i32, ChainError>;

  fn send_inline(&mut self, action: &[u8]) -> Result<(), ChainError>;
  fn send_deferred(
    &mut self,
    sender_id: u128,
    payer: Name,
    transaction: &[u8],
    replace_existing: bool,
  ) -> Result<(), ChainError>;
  fn cancel_deferred(&mut self, sender_id: u128) -> Result<bool, ChainError>;

  fn set_resource_limits(
    &mut self,
    account: Name,
    ram_bytes: i64,
    net_weight: i64,
    cpu_weight: i64,
  ) -> Result<(), ChainError>;
}

/// Raw handle to the host api of the current call.
///
/// Only ever set for the duration of a single `apply` call on a store
/// that is dropped before the api borrow ends.
pub(crate) struct ApiPtr(pub(crate) *mut (dyn HostApi + 'static));

// the store and its env never leave the thread that runs the call
unsafe impl Send for ApiPtr {}

pub(crate) struct HostEnv {
  pub(crate) memory: Option<Memory>,
  pub(crate) api: ApiPtr,
}

/// Signatures of every importable host function.
pub static HOST_FUNCTIONS: Lazy<BTreeMap<&'static str, FunctionType>> =
  Lazy::new(|| {
    use Type::{I32, I64};
    let f = |params: &[Type], results: &[Type]| {
      FunctionType::new(params.to_vec(), results.to_vec())
    };
    [
      ("read_action_data", f(&[I32, I32], &[I32])),
      ("action_data_size", f(&[], &[I32])),
      ("current_receiver", f(&[], &[I64])),
      ("current_time", f(&[], &[I64])),
      ("require_auth", f(&[I64], &[])),
      ("require_auth2", f(&[I64, I64], &[])),
      ("has_auth", f(&[I64], &[I32])),
      ("require_recipient", f(&[I64], &[])),
      ("is_account", f(&[I64], &[I32])),
      ("check", f(&[I32, I32, I32], &[])),
      ("abort", f(&[], &[])),
      ("prints", f(&[I32, I32], &[])),
      ("printi", f(&[I64], &[])),
      ("sha3_256", f(&[I32, I32, I32], &[])),
      ("db_store_i64", f(&[I64, I64, I64, I64, I32, I32], &[I32])),
      ("db_update_i64", f(&[I32, I64, I32, I32], &[])),
      ("db_remove_i64", f(&[I32], &[])),
      ("db_get_i64", f(&[I32, I32, I32], &[I32])),
      ("db_next_i64", f(&[I32, I32], &[I32])),
      ("db_find_i64", f(&[I64, I64, I64], &[I32])),
      ("db_lowerbound_i64", f(&[I64, I64, I64], &[I32])),
      ("send_inline", f(&[I32, I32], &[])),
      ("send_deferred", f(&[I32, I64, I32, I32, I32], &[])),
      ("cancel_deferred", f(&[I32], &[I32])),
      ("set_resource_limits", f(&[I64, I64, I64, I64], &[])),
      ("is_privileged", f(&[I64], &[I32])),
    ]
    .into_iter()
    .collect()
  });

fn out_of_bounds() -> ChainError {
  ChainError::ContractTrap(TrapKind::OutOfBounds)
}

fn api<'a>(env: &'a mut FunctionEnvMut<HostEnv>) -> &'a mut dyn HostApi {
  // valid for the whole apply call, see ApiPtr
  unsafe { &mut *env.data_mut().api.0 }
}

fn memory(env: &FunctionEnvMut<HostEnv>) -> Result<Memory, ChainError> {
  env.data().memory.clone().ok_or_else(out_of_bounds)
}

fn read_memory(
  env: &FunctionEnvMut<HostEnv>,
  ptr: i32,
  len: i32,
) -> Result<Vec<u8>, ChainError> {
  let memory = memory(env)?;
  let view = memory.view(env);
  let (offset, len) = (ptr as u32 as u64, len as u32 as u64);
  if offset + len > view.data_size() {
    return Err(out_of_bounds());
  }
  let mut buffer = vec![0u8; len as usize];
  view.read(offset, &mut buffer).map_err(|_| out_of_bounds())?;
  Ok(buffer)
}

fn write_memory(
  env: &FunctionEnvMut<HostEnv>,
  ptr: i32,
  data: &[u8],
) -> Result<(), ChainError> {
  let memory = memory(env)?;
  let view = memory.view(env);
  let offset = ptr as u32 as u64;
  if offset + data.len() as u64 > view.data_size() {
    return Err(out_of_bounds());
  }
  view.write(offset, data).map_err(|_| out_of_bounds())
}

/// Copies at most `len` bytes of `data` and returns the full size, so
/// a zero `len` can be used to query the size.
fn copy_out(
  env: &FunctionEnvMut<HostEnv>,
  data: &[u8],
  ptr: i32,
  len: i32,
) -> Result<i32, ChainError> {
  let copy = data.len().min(len as u32 as usize);
  if copy > 0 {
    write_memory(env, ptr, &data[..copy])?;
  }
  Ok(data.len() as i32)
}

fn name(value: i64) -> Name {
  Name::from_u64(value as u64)
}

fn read_action_data(
  mut env: FunctionEnvMut<HostEnv>,
  ptr: i32,
  len: i32,
) -> Result<i32, ChainError> {
  let data = api(&mut env).action_data().to_vec();
  copy_out(&env, &data, ptr, len)
}

fn action_data_size(mut env: FunctionEnvMut<HostEnv>) -> i32 {
  api(&mut env).action_data().len() as i32
}

fn current_receiver(mut env: FunctionEnvMut<HostEnv>) -> i64 {
  api(&mut env).receiver().as_u64() as i64
}

fn current_time(mut env: FunctionEnvMut<HostEnv>) -> i64 {
  api(&mut env).current_time().as_micros() as i64
}

fn require_auth(
  mut env: FunctionEnvMut<HostEnv>,
  account: i64,
) -> Result<(), ChainError> {
  api(&mut env).require_auth(name(account))
}

fn require_auth2(
  mut env: FunctionEnvMut<HostEnv>,
  account: i64,
  permission: i64,
) -> Result<(), ChainError> {
  api(&mut env).require_auth2(name(account), name(permission))
}

fn has_auth(mut env: FunctionEnvMut<HostEnv>, account: i64) -> i32 {
  api(&mut env).has_auth(name(account)) as i32
}

fn require_recipient(
  mut env: FunctionEnvMut<HostEnv>,
  account: i64,
) -> Result<(), ChainError> {
  api(&mut env).require_recipient(name(account))
}

fn is_account(mut env: FunctionEnvMut<HostEnv>, account: i64) -> i32 {
  api(&mut env).is_account(name(account)) as i32
}

fn check(
  env: FunctionEnvMut<HostEnv>,
  condition: i32,
  ptr: i32,
  len: i32,
) -> Result<(), ChainError> {
  if condition != 0 {
    return Ok(());
  }
  let message = read_memory(&env, ptr, len)?;
  Err(ChainError::Assertion(
    String::from_utf8_lossy(&message).into_owned(),
  ))
}

fn abort(_env: FunctionEnvMut<HostEnv>) -> Result<(), ChainError> {
  Err(ChainError::assertion("abort() called"))
}

fn prints(
  mut env: FunctionEnvMut<HostEnv>,
  ptr: i32,
  len: i32,
) -> Result<(), ChainError> {
  let text = read_memory(&env, ptr, len)?;
  api(&mut env).console_append(&String::from_utf8_lossy(&text));
  Ok(())
}

fn printi(mut env: FunctionEnvMut<HostEnv>, value: i64) {
  api(&mut env).console_append(&value.to_string());
}

fn sha3_256(
  env: FunctionEnvMut<HostEnv>,
  ptr: i32,
  len: i32,
  out: i32,
) -> Result<(), ChainError> {
  let data = read_memory(&env, ptr, len)?;
  write_memory(&env, out, Digest::hash(&data).as_ref())
}

fn db_store_i64(
  mut env: FunctionEnvMut<HostEnv>,
  scope: i64,
  table: i64,
  payer: i64,
  id: i64,
  ptr: i32,
  len: i32,
) -> Result<i32, ChainError> {
  let value = read_memory(&env, ptr, len)?;
  api(&mut env).db_store(name(scope), name(table), name(payer), id as u64, &value)
}

fn db_update_i64(
  mut env: FunctionEnvMut<HostEnv>,
  iterator: i32,
  payer: i64,
  ptr: i32,
  len: i32,
) -> Result<(), ChainError> {
  let value = read_memory(&env, ptr, len)?;
  api(&mut env).db_update(iterator, name(payer), &value)
}

fn db_remove_i64(
  mut env: FunctionEnvMut<HostEnv>,
  iterator: i32,
) -> Result<(), ChainError> {
  api(&mut env).db_remove(iterator)
}

fn db_get_i64(
  mut env: FunctionEnvMut<HostEnv>,
  iterator: i32,
  ptr: i32,
  len: i32,
) -> Result<i32, ChainError> {
  let value = api(&mut env).db_get(iterator)?.to_vec();
  copy_out(&env, &value, ptr, len)
}

fn db_next_i64(
  mut env: FunctionEnvMut<HostEnv>,
  iterator: i32,
  primary_out: i32,
) -> Result<i32, ChainError> {
  let (next, primary) = api(&mut env).db_next(iterator)?;
  if next >= 0 {
    write_memory(&env, primary_out, &primary.to_le_bytes())?;
  }
  Ok(next)
}

fn db_find_i64(
  mut env: FunctionEnvMut<HostEnv>,
  scope: i64,
  table: i64,
  id: i64,
) -> Result<i32, ChainError> {
  api(&mut env).db_find(name(scope), name(table), id as u64)
}

fn db_lowerbound_i64(
  mut env: FunctionEnvMut<HostEnv>,
  scope: i64,
  table: i64,
  id: i64,
) -> Result<i32, ChainError> {
  api(&mut env).db_lowerbound(name(scope), name(table), id as u64)
}

fn send_inline(
  mut env: FunctionEnvMut<HostEnv>,
  ptr: i32,
  len: i32,
) -> Result<(), ChainError> {
  let action = read_memory(&env, ptr, len)?;
  api(&mut env).send_inline(&action)
}

fn read_sender_id(
  env: &FunctionEnvMut<HostEnv>,
  ptr: i32,
) -> Result<u128, ChainError> {
  let bytes = read_memory(env, ptr, 16)?;
  let mut id = [0u8; 16];
  id.copy_from_slice(&bytes);
  Ok(u128::from_le_bytes(id))
}

fn send_deferred(
  mut env: FunctionEnvMut<HostEnv>,
  sender_id_ptr: i32,
  payer: i64,
  ptr: i32,
  len: i32,
  replace_existing: i32,
) -> Result<(), ChainError> {
  let sender_id = read_sender_id(&env, sender_id_ptr)?;
  let transaction = read_memory(&env, ptr, len)?;
  api(&mut env).send_deferred(
    sender_id,
    name(payer),
    &transaction,
    replace_existing != 0,
  )
}

fn cancel_deferred(
  mut env: FunctionEnvMut<HostEnv>,
  sender_id_ptr: i32,
) -> Result<i32, ChainError> {
  let sender_id = read_sender_id(&env, sender_id_ptr)?;
  Ok(api(&mut env).cancel_deferred(sender_id)? as i32)
}

fn set_resource_limits(
  mut env: FunctionEnvMut<HostEnv>,
  account: i64,
  ram_bytes: i64,
  net_weight: i64,
  cpu_weight: i64,
) -> Result<(), ChainError> {
  api(&mut env).set_resource_limits(
    name(account),
    ram_bytes,
    net_weight,
    cpu_weight,
  )
}

fn is_privileged(
  mut env: FunctionEnvMut<HostEnv>,
  account: i64,
) -> Result<i32, ChainError> {
  Ok(api(&mut env).is_privileged(name(account))? as i32)
}

/// Builds the import object for one instantiation.
pub(crate) fn host_imports(
  store: &mut impl AsStoreMut,
  env: &FunctionEnv<HostEnv>,
) -> Imports {
  imports! {
    "env" => {
      "read_action_data" => Function::new_typed_with_env(store, env, read_action_data),
      "action_data_size" => Function::new_typed_with_env(store, env, action_data_size),
      "current_receiver" => Function::new_typed_with_env(store, env, current_receiver),
      "current_time" => Function::new_typed_with_env(store, env, current_time),
      "require_auth" => Function::new_typed_with_env(store, env, require_auth),
      "require_auth2" => Function::new_typed_with_env(store, env, require_auth2),
      "has_auth" => Function::new_typed_with_env(store, env, has_auth),
      "require_recipient" => Function::new_typed_with_env(store, env, require_recipient),
      "is_account" => Function::new_typed_with_env(store, env, is_account),
      "check" => Function::new_typed_with_env(store, env, check),
      "abort" => Function::new_typed_with_env(store, env, abort),
      "prints" => Function::new_typed_with_env(store, env, prints),
      "printi" => Function::new_typed_with_env(store, env, printi),
      "sha3_256" => Function::new_typed_with_env(store, env, sha3_256),
      "db_store_i64" => Function::new_typed_with_env(store, env, db_store_i64),
      "db_update_i64" => Function::new_typed_with_env(store, env, db_update_i64),
      "db_remove_i64" => Function::new_typed_with_env(store, env, db_remove_i64),
      "db_get_i64" => Function::new_typed_with_env(store, env, db_get_i64),
      "db_next_i64" => Function::new_typed_with_env(store, env, db_next_i64),
      "db_find_i64" => Function::new_typed_with_env(store, env, db_find_i64),
      "db_lowerbound_i64" => Function::new_typed_with_env(store, env, db_lowerbound_i64),
      "send_inline" => Function::new_typed_with_env(store, env, send_inline),
      "send_deferred" => Function::new_typed_with_env(store, env, send_deferred),
      "cancel_deferred" => Function::new_typed_with_env(store, env, cancel_deferred),
      "set_resource_limits" => Function::new_typed_with_env(store, env, set_resource_limits),
      "is_privileged" => Function::new_typed_with_env(store, env, is_privileged),
    }
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{host_imports, ApiPtr, HostApi, HostEnv, HOST_FUNCTIONS, HOST_MODULE},
    crate::ChainError,
    cinder_primitives::{Name, TimePoint},
    wasmer::{Extern, FunctionEnv, Store},
  };

  struct NoApi;

  #[rustfmt::skip]
  impl HostApi for NoApi {
    fn action_data(&self) -> &[u8] { &[] }
    fn receiver(&self) -> Name { Name::default() }
    fn current_time(&self) -> TimePoint { TimePoint::default() }
    fn require_auth(&mut self, _: Name) -> Result<(), ChainError> { Ok(()) }
    fn require_auth2(&mut self, _: Name, _: Name) -> Result<(), ChainError> { Ok(()) }
    fn has_auth(&self, _: Name) -> bool { false }
    fn require_recipient(&mut self, _: Name) -> Result<(), ChainError> { Ok(()) }
    fn is_account(&self, _: Name) -> bool { false }
    fn is_privileged(&self, _: Name) -> Result<bool, ChainError> { Ok(false) }
    fn console_append(&mut self, _: &str) {}
    fn db_store(&mut self, _: Name, _: Name, _: Name, _: u64, _: &[u8]) -> Result<i32, ChainError> { Ok(-1) }
    fn db_update(&mut self, _: i32, _: Name, _: &[u8]) -> Result<(), ChainError> { Ok(()) }
    fn db_remove(&mut self, _: i32) -> Result<(), ChainError> { Ok(()) }
    fn db_get(&self, _: i32) -> Result<&[u8], ChainError> { Ok(&[]) }
    fn db_next(&mut self, _: i32) -> Result<(i32, u64), ChainError> { Ok((-1, 0)) }
    fn db_find(&mut self, _: Name, _: Name, _: u64) -> Result<i32, ChainError> { Ok(-1) }
    fn db_lowerbound(&mut self, _: Name, _: Name, _: u64) -> Result<i32, ChainError> { Ok(-1) }
    fn send_inline(&mut self, _: &[u8]) -> Result<(), ChainError> { Ok(()) }
    fn send_deferred(&mut self, _: u128, _: Name, _: &[u8], _: bool) -> Result<(), ChainError> { Ok(()) }
    fn cancel_deferred(&mut self, _: u128) -> Result<bool, ChainError> { Ok(false) }
    fn set_resource_limits(&mut self, _: Name, _: i64, _: i64, _: i64) -> Result<(), ChainError> { Ok(()) }
  }

  #[test]
  fn imports_match_signature_table() {
    let mut store = Store::default();
    let env = FunctionEnv::new(&mut store, HostEnv {
      memory: None,
      api: ApiPtr(std::ptr::null_mut::<NoApi>()),
    });
    let imports = host_imports(&mut store, &env);

    let mut count = 0;
    for ((module, name), export) in imports.into_iter() {
      assert_eq!(module, HOST_MODULE);
      let Extern::Function(function) = export else {
        panic!("{name} is not a function");
      };
      assert_eq!(Some(&function.ty(&store)), HOST_FUNCTIONS.get(name.as_str()));
      count += 1;
    }
    assert_eq!(count, HOST_FUNCTIONS.len());
  }
}
