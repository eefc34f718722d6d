//! Sandboxed execution of contract bytecode.
//!
//! Modules are compiled once with a deterministic compiler and an
//! instruction metering middleware, cached, and instantiated in a
//! fresh store for every action they handle. Every module gets its
//! own compiler configuration, a metering middleware instance counts
//! the instructions of exactly one module.

mod cache;
mod host;
mod tunables;

pub use {
  cache::{CodeKey, ModuleCache},
  host::{HostApi, HOST_FUNCTIONS, HOST_MODULE},
  tunables::LimitingTunables,
};

use {
  crate::{error::TrapKind, ChainError},
  cinder_primitives::Name,
  host::{host_imports, ApiPtr, HostEnv},
  rayon::prelude::*,
  std::sync::Arc,
  tracing::{debug, warn},
  wasmer::{
    wasmparser::Operator,
    BaseTunables,
    CompilerConfig,
    Engine,
    EngineBuilder,
    ExternType,
    FunctionEnv,
    Instance,
    Module,
    Pages,
    RuntimeError,
    Singlepass,
    Store,
    Target,
    TypedFunction,
  },
  wasmer_types::TrapCode,
  wasmer_middlewares::{
    metering::{get_remaining_points, set_remaining_points, MeteringPoints},
    Metering,
  },
};

pub const APPLY_EXPORT: &str = "apply";
pub const MEMORY_EXPORT: &str = "memory";

/// The only vm type understood by this runtime.
pub const VM_TYPE_WASM: u8 = 0;

/// Every operator costs the same.
fn instruction_cost(_: &Operator) -> u64 {
  1
}

/// One call of a contract entry point.
pub struct Invocation {
  pub receiver: Name,
  pub account: Name,
  pub action: Name,
  pub max_pages: u32,

  /// Instructions the contract may execute.
  pub points: u64,
}

/// A contract compiled together with the engine that owns its code.
#[derive(Debug)]
pub struct CompiledModule {
  engine: Engine,
  module: Module,
}

/// Compiles `code` with a metering middleware of its own.
pub(crate) fn compile(code: &[u8]) -> Result<CompiledModule, ChainError> {
  let mut compiler = Singlepass::default();
  compiler.canonicalize_nans(true);
  compiler.push_middleware(Arc::new(Metering::new(0, instruction_cost)));
  let engine: Engine = EngineBuilder::new(compiler).engine().into();
  let module = Module::from_binary(&engine, code)
    .map_err(|e| ChainError::ModuleLoad(e.to_string()))?;
  Ok(CompiledModule { engine, module })
}

/// Compiles, caches and runs contracts.
pub struct WasmRuntime {
  cache: ModuleCache,
}

impl Default for WasmRuntime {
  fn default() -> Self {
    Self::new(ModuleCache::default())
  }
}

impl WasmRuntime {
  pub fn new(cache: ModuleCache) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &ModuleCache {
    &self.cache
  }

  /// Checks that `code` can be installed as a contract.
  ///
  /// The module must compile, import only host functions with their
  /// exact signatures, export `apply(i64, i64, i64)` and its memory,
  /// and must not need more than `max_pages` of initial memory.
  pub fn validate(
    &self,
    code: &[u8],
    max_pages: u32,
  ) -> Result<CompiledModule, ChainError> {
    let compiled = compile(code)?;
    check_module(&compiled.module, max_pages)?;
    Ok(compiled)
  }

  /// Compiles and caches a batch of modules in parallel.
  ///
  /// Invalid modules are skipped, they fail again when executed.
  pub fn warm_up(&self, codes: Vec<(CodeKey, Vec<u8>)>) {
    codes
      .into_par_iter()
      .filter(|(key, _)| !self.cache.contains(key))
      .for_each(|(key, code)| {
        match compile(&code) {
          Ok(module) => drop(self.cache.insert(key, module)),
          Err(e) => warn!("warm up of code {} failed: {e}", key.0),
        }
      });
  }

  /// Returns the compiled module of a code, compiling it with the
  /// bytes returned by `code` on a cache miss.
  pub fn load(
    &self,
    key: CodeKey,
    code: impl FnOnce() -> Result<Vec<u8>, ChainError>,
  ) -> Result<Arc<CompiledModule>, ChainError> {
    if let Some(module) = self.cache.checkout(&key) {
      return Ok(module);
    }
    debug!("module cache miss for code {}", key.0);
    Ok(self.cache.insert(key, compile(&code()?)?))
  }

  /// Runs `apply(receiver, code, action)` of a loaded module.
  ///
  /// The number of instructions actually executed is returned together
  /// with the outcome, a contract that runs out of instructions fails
  /// with [`ChainError::DeadlineExceeded`].
  pub fn execute(
    &self,
    compiled: &CompiledModule,
    invocation: Invocation,
    api: &mut dyn HostApi,
  ) -> (u64, Result<(), ChainError>) {
    let Invocation {
      receiver,
      account,
      action,
      max_pages,
      points,
    } = invocation;

    let tunables = LimitingTunables::new(
      BaseTunables::for_target(&Target::default()),
      Pages(max_pages),
    );
    let mut store =
      Store::new_with_tunables(compiled.engine.clone(), tunables);

    let api: *mut (dyn HostApi + '_) = api;
    // SAFETY: the pointer only lives in `env`, which belongs to `store`.
    // The store, the instance and every host function holding `env`
    // are local to this call and dropped before it returns, so the
    // pointer is never used after the `api` borrow ends.
    let api: *mut (dyn HostApi + 'static) = unsafe { std::mem::transmute(api) };
    let env = FunctionEnv::new(&mut store, HostEnv {
      memory: None,
      api: ApiPtr(api),
    });

    let imports = host_imports(&mut store, &env);
    let instance = match Instance::new(&mut store, &compiled.module, &imports)
    {
      Ok(instance) => instance,
      Err(e) => return (0, Err(ChainError::ModuleLoad(e.to_string()))),
    };

    let entry = match exports(&store, &instance) {
      Ok((memory, entry)) => {
        env.as_mut(&mut store).memory = Some(memory);
        entry
      }
      Err(e) => return (0, Err(e)),
    };

    set_remaining_points(&mut store, &instance, points);
    let result = entry.call(
      &mut store,
      receiver.as_u64() as i64,
      account.as_u64() as i64,
      action.as_u64() as i64,
    );

    let (consumed, exhausted) =
      match get_remaining_points(&mut store, &instance) {
        MeteringPoints::Remaining(left) => (points.saturating_sub(left), false),
        MeteringPoints::Exhausted => (points, true),
      };

    (consumed, result.map_err(|e| runtime_error(e, exhausted)))
  }
}

fn exports(
  store: &Store,
  instance: &Instance,
) -> Result<(wasmer::Memory, TypedFunction<(i64, i64, i64), ()>), ChainError> {
  let memory = instance
    .exports
    .get_memory(MEMORY_EXPORT)
    .map_err(|e| ChainError::ModuleLoad(e.to_string()))?
    .clone();
  let entry = instance
    .exports
    .get_typed_function(store, APPLY_EXPORT)
    .map_err(|e| ChainError::ModuleLoad(e.to_string()))?;
  Ok((memory, entry))
}

fn runtime_error(error: RuntimeError, exhausted: bool) -> ChainError {
  let error = match error.downcast::<ChainError>() {
    Ok(host) => return host,
    Err(error) => error,
  };
  if exhausted {
    return ChainError::DeadlineExceeded;
  }
  let message = error.message();
  ChainError::ContractTrap(match error.to_trap() {
    Some(TrapCode::HeapAccessOutOfBounds)
    | Some(TrapCode::TableAccessOutOfBounds)
    | Some(TrapCode::HeapMisaligned) => TrapKind::OutOfBounds,
    Some(TrapCode::IntegerDivisionByZero) => TrapKind::DivisionByZero,
    Some(TrapCode::UnreachableCodeReached) => TrapKind::Unreachable,
    Some(TrapCode::StackOverflow) => TrapKind::StackOverflow,
    _ => TrapKind::Other(message),
  })
}

/// Static checks of a compiled module against the host surface.
fn check_module(module: &Module, max_pages: u32) -> Result<(), ChainError> {
  let reject = |msg: String| Err(ChainError::ModuleLoad(msg));

  for import in module.imports() {
    if import.module() != HOST_MODULE {
      return reject(format!(
        "import {}::{} is outside of the host module",
        import.module(),
        import.name()
      ));
    }
    match (import.ty(), HOST_FUNCTIONS.get(import.name())) {
      (ExternType::Function(actual), Some(expected)) if actual == expected => {}
      (ExternType::Function(actual), Some(expected)) => {
        return reject(format!(
          "host function {} imported as {actual}, expected {expected}",
          import.name()
        ))
      }
      _ => {
        return reject(format!("unknown host import {}", import.name()));
      }
    }
  }

  let mut has_apply = false;
  let mut has_memory = false;
  for export in module.exports() {
    match (export.name(), export.ty()) {
      (APPLY_EXPORT, ExternType::Function(ty)) => {
        use wasmer::Type::I64;
        if ty.params() != [I64, I64, I64] || !ty.results().is_empty() {
          return reject(format!("apply has signature {ty}"));
        }
        has_apply = true;
      }
      (MEMORY_EXPORT, ExternType::Memory(ty)) => {
        if ty.minimum > Pages(max_pages) {
          return reject(format!(
            "initial memory of {} pages exceeds the limit of {max_pages}",
            ty.minimum.0
          ));
        }
        has_memory = true;
      }
      _ => {}
    }
  }

  if !has_apply {
    return reject(format!("module does not export {APPLY_EXPORT}"));
  }
  if !has_memory {
    return reject(format!("module does not export {MEMORY_EXPORT}"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use {
    super::{ModuleCache, WasmRuntime},
    crate::ChainError,
    cinder_primitives::Digest,
  };

  fn wasm(wat: &str) -> anyhow::Result<Vec<u8>> {
    Ok(wasmer::wat2wasm(wat.as_bytes())?.into_owned())
  }

  fn load_error(runtime: &WasmRuntime, wat: &str) -> anyhow::Result<String> {
    match runtime.validate(&wasm(wat)?, 16) {
      Err(ChainError::ModuleLoad(msg)) => Ok(msg),
      other => anyhow::bail!("expected a module load error, got {other:?}"),
    }
  }

  #[test]
  fn accepts_minimal_contract() -> anyhow::Result<()> {
    let runtime = WasmRuntime::new(ModuleCache::new(4));
    runtime.validate(
      &wasm(
        r#"(module
          (import "env" "prints" (func (param i32 i32)))
          (memory (export "memory") 1)
          (func (export "apply") (param i64 i64 i64)))"#,
      )?,
      16,
    )?;
    Ok(())
  }

  #[test]
  fn one_runtime_compiles_many_modules() -> anyhow::Result<()> {
    let runtime = WasmRuntime::new(ModuleCache::new(4));
    let sources = [
      r#"(module
        (memory (export "memory") 1)
        (func (export "apply") (param i64 i64 i64)))"#,
      r#"(module
        (import "env" "prints" (func (param i32 i32)))
        (memory (export "memory") 1)
        (func (export "apply") (param i64 i64 i64)
          (call 0 (i32.const 0) (i32.const 0))))"#,
    ];

    let codes = sources
      .iter()
      .map(|wat| wasm(wat))
      .collect::<anyhow::Result<Vec<_>>>()?;
    for code in &codes {
      runtime.validate(code, 16)?;
    }

    let keys: Vec<_> = codes.iter().map(|c| (Digest::hash(c), 0)).collect();
    for (key, code) in keys.iter().zip(&codes) {
      runtime.load(*key, || Ok(code.clone()))?;
    }
    runtime.warm_up(vec![(
      (Digest::hash(b"third"), 0),
      wasm(r#"(module (memory (export "memory") 1))"#)?,
    )]);

    assert_eq!(runtime.cache().len(), 3);
    let first = runtime
      .load(keys[0], || Err(ChainError::assertion("cache miss")))?;
    let again = runtime.load(keys[0], || Ok(vec![]))?;
    assert!(std::sync::Arc::ptr_eq(&first, &again));
    Ok(())
  }

  #[test]
  fn rejects_foreign_imports() -> anyhow::Result<()> {
    let runtime = WasmRuntime::default();
    let msg = load_error(
      &runtime,
      r#"(module
        (import "wasi" "clock_time_get" (func (param i32 i64 i32) (result i32)))
        (memory (export "memory") 1)
        (func (export "apply") (param i64 i64 i64)))"#,
    )?;
    assert!(msg.contains("outside of the host module"));

    let msg = load_error(
      &runtime,
      r#"(module
        (import "env" "random" (func (result i64)))
        (memory (export "memory") 1)
        (func (export "apply") (param i64 i64 i64)))"#,
    )?;
    assert!(msg.contains("unknown host import"));

    let msg = load_error(
      &runtime,
      r#"(module
        (import "env" "prints" (func (param i64)))
        (memory (export "memory") 1)
        (func (export "apply") (param i64 i64 i64)))"#,
    )?;
    assert!(msg.contains("host function prints"));
    Ok(())
  }

  #[test]
  fn rejects_missing_entry_point_and_large_memory() -> anyhow::Result<()> {
    let runtime = WasmRuntime::default();
    let msg = load_error(
      &runtime,
      r#"(module (memory (export "memory") 1) (func (export "run")))"#,
    )?;
    assert!(msg.contains("apply"));

    let msg = load_error(
      &runtime,
      r#"(module
        (memory (export "memory") 17)
        (func (export "apply") (param i64 i64 i64)))"#,
    )?;
    assert!(msg.contains("exceeds the limit"));
    Ok(())
  }
}
