use {
  super::CompiledModule,
  cinder_primitives::Digest,
  lru::LruCache,
  parking_lot::Mutex,
  std::{
    num::NonZeroUsize,
    sync::{
      atomic::{AtomicU64, Ordering},
      Arc,
    },
  },
};

/// Compiled modules are keyed by code digest and vm version.
pub type CodeKey = (Digest, u8);

const DEFAULT_CAPACITY: usize = 256;

/// Least recently used cache of compiled modules.
///
/// Entries stay cached while they run, every execution of the same
/// code shares one compiled artifact.
pub struct ModuleCache {
  modules: Mutex<LruCache<CodeKey, Arc<CompiledModule>>>,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl Default for ModuleCache {
  fn default() -> Self {
    Self::new(DEFAULT_CAPACITY)
  }
}

impl ModuleCache {
  /// A zero capacity never evicts.
  pub fn new(capacity: usize) -> Self {
    let modules = match NonZeroUsize::new(capacity) {
      Some(capacity) => LruCache::new(capacity),
      None => LruCache::unbounded(),
    };
    Self {
      modules: Mutex::new(modules),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    }
  }

  /// Looks up a module and marks it as the most recently used.
  pub fn checkout(&self, key: &CodeKey) -> Option<Arc<CompiledModule>> {
    let module = self.modules.lock().get(key).cloned();
    let counter = match module {
      Some(_) => &self.hits,
      None => &self.misses,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    module
  }

  pub fn insert(
    &self,
    key: CodeKey,
    module: CompiledModule,
  ) -> Arc<CompiledModule> {
    let module = Arc::new(module);
    self.modules.lock().put(key, module.clone());
    module
  }

  pub fn contains(&self, key: &CodeKey) -> bool {
    self.modules.lock().contains(key)
  }

  pub fn len(&self) -> usize {
    self.modules.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drops the module of a code that is no longer referenced.
  pub fn evict(&self, key: &CodeKey) {
    self.modules.lock().pop(key);
  }

  /// `(hits, misses)` since creation.
  pub fn stats(&self) -> (u64, u64) {
    (
      self.hits.load(Ordering::Relaxed),
      self.misses.load(Ordering::Relaxed),
    )
  }
}
