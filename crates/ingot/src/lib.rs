//! ingot — ahead-of-time WebAssembly compiler.
//!
//! This crate lowers validated WebAssembly modules into LLVM IR. The
//! pipeline validates and decomposes the binary, then walks each function
//! body once, simulating the operand stack at build time and materialising
//! structured control flow into LLVM basic blocks. The result is a populated
//! LLVM module plus a target machine, ready for native code emission.
//!
//! Compiled code talks to its host exclusively through the `intrinsics`
//! table global and the execution-context record threaded as every
//! function's first parameter; see `intrinsics` for the table contract.

pub mod codegen;
pub mod error;
pub mod intrinsics;
pub mod opcode;
pub mod parser;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use codegen::CompiledModule;
pub use error::{CompileError, TrapCode};

/// Optimization level for the downstream pass pipeline and code generator.
/// The per-function lowering itself is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    O0,
    O1,
    #[default]
    O2,
    O3,
    Os,
    Oz,
}

impl std::str::FromStr for OptimizationLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "O0" | "0" => Ok(OptimizationLevel::O0),
            "O1" | "1" => Ok(OptimizationLevel::O1),
            "O2" | "2" => Ok(OptimizationLevel::O2),
            "O3" | "3" => Ok(OptimizationLevel::O3),
            "Os" | "s" => Ok(OptimizationLevel::Os),
            "Oz" | "z" => Ok(OptimizationLevel::Oz),
            other => Err(anyhow::anyhow!("unknown optimization level {other:?}")),
        }
    }
}

/// Configuration options for compilation
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Passed to the optimizer and code generator.
    pub optimization_level: OptimizationLevel,
    /// Suppress host-CPU feature detection; SIMD lowering takes only the
    /// portable paths and the code generator targets a generic CPU.
    pub is_generic_binary: bool,
    /// Poll the execution context's stop token at block entries.
    pub interruptible: bool,
    /// Accumulate an instruction counter into the execution context.
    pub instruction_counting: bool,
    /// Meter gas against the execution context's cost table and limit.
    pub cost_measuring: bool,
}

/// Compile a WebAssembly binary into LLVM IR.
///
/// This is the main entry point. The caller owns the LLVM context; the
/// returned [`CompiledModule`] borrows from it. One compilation runs at a
/// time per context — LLVM contexts are not thread-safe, so parallel
/// compilation means independent contexts.
///
/// # Example
/// ```no_run
/// use ingot::{compile, CompileOptions};
///
/// let wasm_bytes = std::fs::read("input.wasm").unwrap();
/// let ll = inkwell::context::Context::create();
/// let compiled = compile(&ll, "input", &wasm_bytes, &CompileOptions::default()).unwrap();
/// println!("{}", compiled.print_ir());
/// ```
pub fn compile<'ctx>(
    ll: &'ctx inkwell::context::Context,
    name: &str,
    wasm: &[u8],
    options: &CompileOptions,
) -> Result<CompiledModule<'ctx>> {
    tracing::info!(name, "compile start");
    let parsed = parser::parse_module(wasm).context("failed to decompose WebAssembly module")?;
    let compiled = codegen::compile_module(ll, name, &parsed, options)
        .context("failed to generate LLVM IR")?;
    tracing::info!(name, "compile done");
    Ok(compiled)
}
