//! Compile-time error conditions surfaced to the caller.
//!
//! Everything else is treated as a violation of the validated-module
//! precondition and reported through `anyhow` context chains.

use thiserror::Error;

/// Errors the compiler front door can return.
///
/// Runtime failures of compiled code (division by zero, gas exhaustion, ...)
/// are not represented here; they are emitted as trap paths in the generated
/// IR and reported by the host's `trap` intrinsic with a [`TrapCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The input binary failed validation; the core refuses to lower it.
    #[error("module is not validated")]
    NotValidated,

    /// The module requests a feature this backend does not support
    /// (currently the exception-handling proposal).
    #[error("unsupported configuration: {0}")]
    InvalidConfigure(String),

    /// Target triple resolution failed.
    #[error("cannot resolve target triple: {0}")]
    IllegalPath(String),

    /// An instruction outside the supported opcode surface.
    #[error("unsupported instruction: {0}")]
    Unsupported(String),
}

/// Error codes baked into generated trap paths.
///
/// The numeric values are part of the compiled-binary contract: the `trap`
/// helper forwards them verbatim to the host's `Trap` intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TrapCode {
    Unreachable = 0x89,
    /// Raised by the indirect-dispatch intrinsics, never emitted directly.
    UndefinedElement = 0x8a,
    /// Raised by the indirect-dispatch intrinsics, never emitted directly.
    IndirectCallTypeMismatch = 0x8b,
    DivideByZero = 0x8c,
    IntegerOverflow = 0x8d,
    InvalidConvToInt = 0x8e,
    CastNullToNonNull = 0x95,
    AccessNullFunc = 0x96,
    AccessNullI31 = 0x97,
    UnalignedAtomicAccess = 0x9a,
    CostLimitExceeded = 0xa0,
    Interrupted = 0xa1,
}

impl TrapCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}
