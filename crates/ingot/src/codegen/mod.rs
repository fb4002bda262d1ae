//! Code generation: validated module sections → populated LLVM module.
//!
//! The driver walks the decomposed module in a fixed order (types, imports,
//! globals, memories/data, tables/elements, functions/code, exports), hands
//! every function body to a fresh [`FunctionCompiler`], verifies the result,
//! and runs the standard optimization pipeline against a target machine for
//! the host (or a generic target when requested).

pub mod atomic;
pub mod context;
pub mod function;
pub mod memory;
pub mod numeric;
pub mod reference;
pub mod simd;
pub mod types;
pub mod wrapper;

use anyhow::{anyhow, bail, Context as _, Result};
use inkwell::attributes::AttributeLoc;
use inkwell::context::Context;
use inkwell::module::{FlagBehavior, Linkage, Module};
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::values::BasicValue;

use crate::error::CompileError;
use crate::parser::ParsedModule;
use crate::{CompileOptions, OptimizationLevel};
use context::CompileContext;
use function::FunctionCompiler;

/// The compilation artefact: the populated module plus the target machine it
/// was configured for, ready for the object emitter. The LLVM context is the
/// one the caller handed in; the module borrows from it.
pub struct CompiledModule<'ctx> {
    pub module: Module<'ctx>,
    pub target_machine: TargetMachine,
}

impl<'ctx> CompiledModule<'ctx> {
    /// Textual IR, mostly for tests and debugging dumps.
    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }
}

pub fn compile_module<'ctx>(
    ll: &'ctx Context,
    name: &str,
    parsed: &ParsedModule<'_>,
    options: &CompileOptions,
) -> Result<CompiledModule<'ctx>> {
    let mut ctx = CompileContext::new(ll, name, options.is_generic_binary)?;

    let triple = TargetMachine::get_default_triple();
    ctx.module.set_triple(&triple);
    ctx.module.add_basic_value_flag(
        "PIC Level",
        FlagBehavior::Error,
        ctx.i32_ty.const_int(2, false).as_basic_value_enum(),
    );

    // Types.
    ctx.composite_types = parsed.types.clone();
    wrapper::declare_wrappers(&mut ctx)?;

    // Imports.
    for import in &parsed.imported_funcs {
        wrapper::declare_import_thunk(&mut ctx, import)?;
    }

    // Globals (imported globals already ordered first by the parser).
    ctx.globals = parsed
        .globals
        .iter()
        .map(|vt| types::value_type(ll, *vt))
        .collect();

    // Memories, data, tables, elements and exports are module-instance
    // concerns; they do not change per-function lowering.
    tracing::debug!(
        memories = parsed.memory_count,
        tables = parsed.table_count,
        exports = parsed.exports.len(),
        "module shape"
    );

    // Functions and code: declare every body first so calls resolve, then
    // lower each one.
    let first_local = ctx.functions.len();
    for def in &parsed.functions {
        let func_id = ctx.functions.len();
        let func_ty = ctx.func_type_of(def.type_idx)?;
        let native_ty = types::function_type(ll, func_ty);
        let f = ctx
            .module
            .add_function(&format!("f{func_id}"), native_ty, Some(Linkage::External));
        ctx.export_symbol(f);
        f.add_attribute(AttributeLoc::Param(0), ctx.readonly);
        f.add_attribute(AttributeLoc::Param(0), ctx.noalias);
        ctx.functions.push((def.type_idx, f));
    }
    for (i, def) in parsed.functions.iter().enumerate() {
        let (type_idx, f) = ctx.functions[first_local + i];
        let result_types = ctx.func_type_of(type_idx)?.results().to_vec();
        let mut fc = FunctionCompiler::new(
            &ctx,
            f,
            &def.locals,
            options.interruptible,
            options.instruction_counting,
            options.cost_measuring,
        )?;
        fc.compile(&def.body, result_types)
            .with_context(|| format!("lowering function f{}", first_local + i))?;
    }

    tracing::info!("verify start");
    ctx.module
        .verify()
        .map_err(|e| anyhow!("invalid module: {}", e.to_string()))?;

    tracing::info!("optimize start");
    let target_machine = create_target_machine(options)?;
    ctx.module
        .run_passes(
            options.optimization_level.pass_pipeline(),
            &target_machine,
            PassBuilderOptions::create(),
        )
        .map_err(|e| anyhow!("pass pipeline failed: {}", e.to_string()))?;
    tracing::info!("optimize done");

    Ok(CompiledModule {
        module: ctx.module,
        target_machine,
    })
}

fn create_target_machine(options: &CompileOptions) -> Result<TargetMachine> {
    Target::initialize_all(&InitializationConfig::default());
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple).map_err(|e| {
        CompileError::IllegalPath(e.to_string())
    })?;
    let (cpu, features) = if options.is_generic_binary {
        ("generic".to_string(), String::new())
    } else {
        (
            TargetMachine::get_host_cpu_name().to_string(),
            TargetMachine::get_host_cpu_features().to_string(),
        )
    };
    let Some(tm) = target.create_target_machine(
        &triple,
        &cpu,
        &features,
        options.optimization_level.codegen_level(),
        RelocMode::PIC,
        CodeModel::Default,
    ) else {
        bail!(CompileError::IllegalPath(format!(
            "no target machine for {}",
            triple.as_str().to_string_lossy()
        )));
    };
    Ok(tm)
}

impl OptimizationLevel {
    /// Pass pipeline string for the new pass manager. Tail-call elimination
    /// is kept even at the low levels so `return_call` stays a real tail
    /// call.
    pub(crate) fn pass_pipeline(self) -> &'static str {
        match self {
            OptimizationLevel::O0 => "default<O0>,function(tailcallelim)",
            OptimizationLevel::O1 => "default<O1>,function(tailcallelim)",
            OptimizationLevel::O2 => "default<O2>",
            OptimizationLevel::O3 => "default<O3>",
            OptimizationLevel::Os => "default<Os>",
            OptimizationLevel::Oz => "default<Oz>",
        }
    }

    pub(crate) fn codegen_level(self) -> inkwell::OptimizationLevel {
        match self {
            OptimizationLevel::O0 => inkwell::OptimizationLevel::None,
            OptimizationLevel::O1 => inkwell::OptimizationLevel::Less,
            OptimizationLevel::O3 => inkwell::OptimizationLevel::Aggressive,
            _ => inkwell::OptimizationLevel::Default,
        }
    }
}
