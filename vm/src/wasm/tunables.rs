use {
  std::ptr::NonNull,
  wasmer::{
    vm::{
      self,
      MemoryError,
      MemoryStyle,
      TableStyle,
      VMMemoryDefinition,
      VMTableDefinition,
    },
    MemoryType,
    Pages,
    TableType,
    Tunables,
  },
};

/// Caps every linear memory of an instance at `limit` pages.
///
/// Memories without a declared maximum get the limit as their maximum,
/// a declared maximum above the limit is lowered to it. A minimum above
/// the limit can never be satisfied and fails instantiation.
pub struct LimitingTunables<T: Tunables> {
  limit: Pages,
  base: T,
}

impl<T: Tunables> LimitingTunables<T> {
  pub fn new(base: T, limit: Pages) -> Self {
    Self { limit, base }
  }

  fn adjust_memory(&self, requested: &MemoryType) -> MemoryType {
    let mut adjusted = *requested;
    adjusted.maximum = Some(match requested.maximum {
      Some(max) if max < self.limit => max,
      _ => self.limit,
    });
    adjusted
  }

  fn validate_memory(&self, ty: &MemoryType) -> Result<(), MemoryError> {
    if ty.minimum > self.limit {
      return Err(MemoryError::Generic(format!(
        "initial memory of {} pages exceeds the limit of {} pages",
        ty.minimum.0, self.limit.0
      )));
    }
    Ok(())
  }
}

impl<T: Tunables> Tunables for LimitingTunables<T> {
  fn memory_style(&self, memory: &MemoryType) -> MemoryStyle {
    self.base.memory_style(&self.adjust_memory(memory))
  }

  fn table_style(&self, table: &TableType) -> TableStyle {
    self.base.table_style(table)
  }

  fn create_host_memory(
    &self,
    ty: &MemoryType,
    style: &MemoryStyle,
  ) -> Result<vm::VMMemory, MemoryError> {
    let adjusted = self.adjust_memory(ty);
    self.validate_memory(&adjusted)?;
    self.base.create_host_memory(&adjusted, style)
  }

  unsafe fn create_vm_memory(
    &self,
    ty: &MemoryType,
    style: &MemoryStyle,
    vm_definition_location: NonNull<VMMemoryDefinition>,
  ) -> Result<vm::VMMemory, MemoryError> {
    let adjusted = self.adjust_memory(ty);
    self.validate_memory(&adjusted)?;
    self
      .base
      .create_vm_memory(&adjusted, style, vm_definition_location)
  }

  fn create_host_table(
    &self,
    ty: &TableType,
    style: &TableStyle,
  ) -> Result<vm::VMTable, String> {
    self.base.create_host_table(ty, style)
  }

  unsafe fn create_vm_table(
    &self,
    ty: &TableType,
    style: &TableStyle,
    vm_definition_location: NonNull<VMTableDefinition>,
  ) -> Result<vm::VMTable, String> {
    self.base.create_vm_table(ty, style, vm_definition_location)
  }
}
