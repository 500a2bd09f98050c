pub mod codegen;
pub mod jit;

pub use codegen::{Codegen, CodegenError};
pub use jit::{ExecValue, Jit};

/// Errors surfaced by the native-code layers rather than by checking the
/// script itself.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Module(#[from] cranelift_module::ModuleError),
}

pub type BackendResult<T> = Result<T, BackendError>;
