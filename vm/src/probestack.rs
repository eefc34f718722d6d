//! Toolchain compatibility shim.
//!
//! wasmer-vm 3.x links against `__rust_probestack`, which newer Rust
//! toolchains no longer export from `compiler_builtins`. This restores
//! the original x86_64 stack-probe routine from `compiler_builtins` so
//! JIT-compiled code keeps probing the guard page as before.

#[cfg(all(
  target_arch = "x86_64",
  not(target_os = "windows"),
  not(target_vendor = "apple")
))]
core::arch::global_asm!(
  ".pushsection .text.__rust_probestack",
  ".globl __rust_probestack",
  ".type __rust_probestack, @function",
  "__rust_probestack:",
  ".cfi_startproc",
  "pushq %rbp",
  ".cfi_adjust_cfa_offset 8",
  ".cfi_offset %rbp, -16",
  "movq %rsp, %rbp",
  ".cfi_def_cfa_register %rbp",
  "mov %rax, %r11",
  "cmp $0x1000, %r11",
  "jna 3f",
  "2:",
  "sub $0x1000, %rsp",
  "test %rsp, 8(%rsp)",
  "sub $0x1000, %r11",
  "cmp $0x1000, %r11",
  "ja 2b",
  "3:",
  "sub %r11, %rsp",
  "test %rsp, 8(%rsp)",
  "add %rax, %rsp",
  "leave",
  ".cfi_def_cfa_register %rsp",
  ".cfi_adjust_cfa_offset -8",
  "ret",
  ".cfi_endproc",
  ".size __rust_probestack, . - __rust_probestack",
  ".popsection",
  options(att_syntax)
);
