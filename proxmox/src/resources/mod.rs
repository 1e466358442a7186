//! Resource implementations

pub mod qemu;

pub use qemu::QemuVmResource;
