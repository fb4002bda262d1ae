//! Per-module shared state for code generation.
//!
//! The compile context owns the LLVM module being populated, caches every
//! type and attribute the function compiler needs, declares the `intrinsics`
//! table and `version` globals, and emits the process-wide `trap` helper.

use anyhow::{anyhow, Context as _, Result};
use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::targets::TargetMachine;
use inkwell::types::{ArrayType, BasicTypeEnum, FloatType, FunctionType, IntType, PointerType, StructType, VectorType};
use inkwell::values::{
    BasicMetadataValueEnum, CallSiteValue, FunctionValue, GlobalValue, InstructionValue, IntValue,
    PointerValue, StructValue,
};
use inkwell::{AddressSpace, GlobalVisibility};
use wasmparser::{BlockType, ValType};

use crate::intrinsics::Intrinsic;
use crate::parser::CompositeDef;

/// Version constant embedded in every compiled binary.
pub const BINARY_VERSION: u32 = 1;

/// Architecture the module is being compiled for, as far as SIMD instruction
/// selection is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetArch {
    X86_64,
    Aarch64,
    Other,
}

/// Subtarget feature flags. All false for a generic binary, so the SIMD
/// lowering takes only the portable paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct Subtarget {
    pub xop: bool,
    pub sse4_1: bool,
    pub ssse3: bool,
    pub sse2: bool,
    pub neon: bool,
}

/// Per-module compile state shared by every function compiler.
pub struct CompileContext<'ctx> {
    pub ll: &'ctx Context,
    pub module: Module<'ctx>,

    pub cold: Attribute,
    pub noalias: Attribute,
    pub noinline: Attribute,
    pub noreturn: Attribute,
    pub readonly: Attribute,

    pub i8_ty: IntType<'ctx>,
    pub i16_ty: IntType<'ctx>,
    pub i32_ty: IntType<'ctx>,
    pub i64_ty: IntType<'ctx>,
    pub i128_ty: IntType<'ctx>,
    pub f32_ty: FloatType<'ctx>,
    pub f64_ty: FloatType<'ctx>,
    pub i8x16_ty: VectorType<'ctx>,
    pub i16x8_ty: VectorType<'ctx>,
    pub i32x4_ty: VectorType<'ctx>,
    pub f32x4_ty: VectorType<'ctx>,
    pub i64x2_ty: VectorType<'ctx>,
    pub f64x2_ty: VectorType<'ctx>,
    pub i128x1_ty: VectorType<'ctx>,
    pub ptr_ty: PointerType<'ctx>,

    pub exec_ctx_ty: StructType<'ctx>,
    pub cost_table_ty: ArrayType<'ctx>,
    intrinsics_table_ty: ArrayType<'ctx>,
    intrinsics_table: GlobalValue<'ctx>,
    pub trap_fn: FunctionValue<'ctx>,

    pub arch: TargetArch,
    pub subtarget: Subtarget,

    /// Type section, indexed by type index.
    pub composite_types: Vec<CompositeDef>,
    /// `tN` wrapper per type index; duplicates share the first occurrence.
    pub wrappers: Vec<FunctionValue<'ctx>>,
    /// `(type index, fN declaration)` per function index, imports first.
    pub functions: Vec<(u32, FunctionValue<'ctx>)>,
    /// Global value types, imported globals first.
    pub globals: Vec<BasicTypeEnum<'ctx>>,
}

impl<'ctx> CompileContext<'ctx> {
    pub fn new(ll: &'ctx Context, name: &str, is_generic_binary: bool) -> Result<Self> {
        let module = ll.create_module(name);

        let enum_attr = |attr: &str| {
            ll.create_enum_attribute(Attribute::get_named_enum_kind_id(attr), 0)
        };

        let i8_ty = ll.i8_type();
        let i16_ty = ll.i16_type();
        let i32_ty = ll.i32_type();
        let i64_ty = ll.i64_type();
        let i128_ty = ll.i128_type();
        let f32_ty = ll.f32_type();
        let f64_ty = ll.f64_type();
        let ptr_ty = ll.ptr_type(AddressSpace::default());

        // Cost table: one u64 cost per opcode value.
        let cost_table_ty = i64_ty.array_type(u16::MAX as u32 + 1);

        // Execution context layout; compiled code receives a pointer to this
        // as its first parameter and only ever extracts fields from it.
        let exec_ctx_ty = ll.opaque_struct_type("ExecCtx");
        exec_ctx_ty.set_body(
            &[
                ptr_ty.into(), // memory base pointer array
                ptr_ty.into(), // global storage array
                ptr_ty.into(), // instruction count
                ptr_ty.into(), // cost table
                ptr_ty.into(), // gas
                i64_ty.into(), // gas limit
                ptr_ty.into(), // stop token
            ],
            false,
        );

        let intrinsics_table_ty = ptr_ty.array_type(Intrinsic::COUNT);
        let intrinsics_table = module.add_global(ptr_ty, None, "intrinsics");
        intrinsics_table.set_linkage(Linkage::External);
        intrinsics_table.set_initializer(&ptr_ty.const_null());

        let version = module.add_global(i32_ty, None, "version");
        version.set_linkage(Linkage::External);
        version.set_constant(true);
        version.set_initializer(&i32_ty.const_int(u64::from(BINARY_VERSION), false));

        let trap_ty = ll.void_type().fn_type(&[i32_ty.into()], false);
        let trap_fn = module.add_function("trap", trap_ty, Some(Linkage::Private));

        let arch = detect_arch();
        let subtarget = if is_generic_binary {
            Subtarget::default()
        } else {
            detect_subtarget(arch)
        };

        let ctx = Self {
            ll,
            module,
            cold: enum_attr("cold"),
            noalias: enum_attr("noalias"),
            noinline: enum_attr("noinline"),
            noreturn: enum_attr("noreturn"),
            readonly: enum_attr("readonly"),
            i8_ty,
            i16_ty,
            i32_ty,
            i64_ty,
            i128_ty,
            f32_ty,
            f64_ty,
            i8x16_ty: i8_ty.vec_type(16),
            i16x8_ty: i16_ty.vec_type(8),
            i32x4_ty: i32_ty.vec_type(4),
            f32x4_ty: f32_ty.vec_type(4),
            i64x2_ty: i64_ty.vec_type(2),
            f64x2_ty: f64_ty.vec_type(2),
            i128x1_ty: i128_ty.vec_type(1),
            ptr_ty,
            exec_ctx_ty,
            cost_table_ty,
            intrinsics_table_ty,
            intrinsics_table,
            trap_fn,
            arch,
            subtarget,
            composite_types: Vec::new(),
            wrappers: Vec::new(),
            functions: Vec::new(),
            globals: Vec::new(),
        };

        ctx.emit_trap_helper()?;
        Ok(ctx)
    }

    /// The `trap(i32 code)` helper: no-return, cold, and never inlined so
    /// every trap block stays a single call.
    fn emit_trap_helper(&self) -> Result<()> {
        let f = self.trap_fn;
        f.add_attribute(AttributeLoc::Function, self.noreturn);
        f.add_attribute(AttributeLoc::Function, self.cold);
        f.add_attribute(AttributeLoc::Function, self.noinline);

        let builder = self.ll.create_builder();
        builder.position_at_end(self.ll.append_basic_block(f, "entry"));
        let trap_ty = self
            .ll
            .void_type()
            .fn_type(&[self.i32_ty.into()], false);
        let code = f
            .get_nth_param(0)
            .ok_or_else(|| anyhow!("trap helper lost its parameter"))?;
        let call = self.call_intrinsic(&builder, Intrinsic::Trap, trap_ty, &[code.into()])?;
        call.add_attribute(AttributeLoc::Function, self.noreturn);
        builder.build_unreachable()?;
        Ok(())
    }

    /// Declare (or reuse) an LLVM-level intrinsic by its mangled name.
    pub fn llvm_intrinsic(&self, name: &str, ty: FunctionType<'ctx>) -> FunctionValue<'ctx> {
        self.module
            .get_function(name)
            .unwrap_or_else(|| self.module.add_function(name, ty, None))
    }

    /// Tag a load with `invariant.group` so repeated loads fold.
    pub fn set_invariant_group(&self, inst: InstructionValue<'ctx>) -> Result<()> {
        let kind = self.ll.get_kind_id("invariant.group");
        inst.set_metadata(self.ll.metadata_node(&[]), kind)
            .map_err(|e| anyhow!("setting invariant.group: {e}"))
    }

    /// Resolve a host-intrinsic slot to a callable `(type, pointer)` pair.
    pub fn get_intrinsic(
        &self,
        builder: &Builder<'ctx>,
        index: Intrinsic,
        ty: FunctionType<'ctx>,
    ) -> Result<(FunctionType<'ctx>, PointerValue<'ctx>)> {
        let table = builder
            .build_load(self.ptr_ty, self.intrinsics_table.as_pointer_value(), "intrinsics")?;
        if let Some(inst) = table.as_instruction_value() {
            self.set_invariant_group(inst)?;
        }
        let slot = unsafe {
            builder.build_in_bounds_gep(
                self.intrinsics_table_ty,
                table.into_pointer_value(),
                &[
                    self.i64_ty.const_zero(),
                    self.i64_ty.const_int(u64::from(index.index()), false),
                ],
                "intr_slot",
            )?
        };
        let fn_ptr = builder.build_load(self.ptr_ty, slot, "intr_fn")?;
        Ok((ty, fn_ptr.into_pointer_value()))
    }

    /// Call a host intrinsic through the table.
    pub fn call_intrinsic(
        &self,
        builder: &Builder<'ctx>,
        index: Intrinsic,
        ty: FunctionType<'ctx>,
        args: &[BasicMetadataValueEnum<'ctx>],
    ) -> Result<CallSiteValue<'ctx>> {
        let (fn_ty, fn_ptr) = self.get_intrinsic(builder, index, ty)?;
        Ok(builder.build_indirect_call(fn_ty, fn_ptr, args, "intr_call")?)
    }

    /// Base pointer of memory `index`, loaded through the execution context.
    pub fn get_memory(
        &self,
        builder: &Builder<'ctx>,
        exec_ctx: StructValue<'ctx>,
        index: u32,
    ) -> Result<PointerValue<'ctx>> {
        let array = builder
            .build_extract_value(exec_ctx, 0, "mem_array")?
            .into_pointer_value();
        let slot = unsafe {
            builder.build_in_bounds_gep(
                self.ptr_ty,
                array,
                &[self.i64_ty.const_int(u64::from(index), false)],
                "mem_slot",
            )?
        };
        let base = builder.build_load(self.ptr_ty, slot, "mem_base")?;
        if let Some(inst) = base.as_instruction_value() {
            self.set_invariant_group(inst)?;
        }
        Ok(base.into_pointer_value())
    }

    /// Storage pointer and value type of global `index`.
    pub fn get_global(
        &self,
        builder: &Builder<'ctx>,
        exec_ctx: StructValue<'ctx>,
        index: u32,
    ) -> Result<(BasicTypeEnum<'ctx>, PointerValue<'ctx>)> {
        let ty = self.globals[index as usize];
        let array = builder
            .build_extract_value(exec_ctx, 1, "global_array")?
            .into_pointer_value();
        let slot = unsafe {
            builder.build_in_bounds_gep(
                self.ptr_ty,
                array,
                &[self.i64_ty.const_int(u64::from(index), false)],
                "global_slot",
            )?
        };
        let ptr = builder.build_load(self.ptr_ty, slot, "global_ptr")?;
        if let Some(inst) = ptr.as_instruction_value() {
            self.set_invariant_group(inst)?;
        }
        Ok((ty, ptr.into_pointer_value()))
    }

    pub fn get_instr_count(
        &self,
        builder: &Builder<'ctx>,
        exec_ctx: StructValue<'ctx>,
    ) -> Result<PointerValue<'ctx>> {
        Ok(builder
            .build_extract_value(exec_ctx, 2, "instr_count")?
            .into_pointer_value())
    }

    pub fn get_cost_table(
        &self,
        builder: &Builder<'ctx>,
        exec_ctx: StructValue<'ctx>,
    ) -> Result<PointerValue<'ctx>> {
        Ok(builder
            .build_extract_value(exec_ctx, 3, "cost_table")?
            .into_pointer_value())
    }

    pub fn get_gas(
        &self,
        builder: &Builder<'ctx>,
        exec_ctx: StructValue<'ctx>,
    ) -> Result<PointerValue<'ctx>> {
        Ok(builder
            .build_extract_value(exec_ctx, 4, "gas")?
            .into_pointer_value())
    }

    pub fn get_gas_limit(
        &self,
        builder: &Builder<'ctx>,
        exec_ctx: StructValue<'ctx>,
    ) -> Result<IntValue<'ctx>> {
        Ok(builder
            .build_extract_value(exec_ctx, 5, "gas_limit")?
            .into_int_value())
    }

    pub fn get_stop_token(
        &self,
        builder: &Builder<'ctx>,
        exec_ctx: StructValue<'ctx>,
    ) -> Result<PointerValue<'ctx>> {
        Ok(builder
            .build_extract_value(exec_ctx, 6, "stop_token")?
            .into_pointer_value())
    }

    /// Parameter and result types of a block type.
    pub fn resolve_block_type(&self, bt: BlockType) -> Result<(Vec<ValType>, Vec<ValType>)> {
        match bt {
            BlockType::Empty => Ok((Vec::new(), Vec::new())),
            BlockType::Type(vt) => Ok((Vec::new(), vec![vt])),
            BlockType::FuncType(idx) => {
                let func_ty = self
                    .composite_types
                    .get(idx as usize)
                    .and_then(CompositeDef::as_func)
                    .context("block type index is not a function type")?;
                Ok((func_ty.params().to_vec(), func_ty.results().to_vec()))
            }
        }
    }

    pub fn func_type_of(&self, type_idx: u32) -> Result<&wasmparser::FuncType> {
        self.composite_types
            .get(type_idx as usize)
            .and_then(CompositeDef::as_func)
            .context("type index is not a function type")
    }

    /// Mark a symbol externally visible and protected, the way function
    /// bodies and wrappers are persisted.
    pub fn export_symbol(&self, f: FunctionValue<'ctx>) {
        let g = f.as_global_value();
        g.set_visibility(GlobalVisibility::Protected);
    }

    /// `llvm.roundeven` exists on every LLVM since 12; the SSE4.1/NEON and
    /// `nearbyint` ladders only matter on older toolchains.
    pub fn has_roundeven(&self) -> bool {
        true
    }
}

fn detect_arch() -> TargetArch {
    let triple = TargetMachine::get_default_triple();
    let triple = triple.as_str().to_string_lossy().to_string();
    if triple.starts_with("x86_64") {
        TargetArch::X86_64
    } else if triple.starts_with("aarch64") || triple.starts_with("arm64") {
        TargetArch::Aarch64
    } else {
        TargetArch::Other
    }
}

/// Parse the host CPU feature string ("+sse2,-avx,...") into the flags the
/// SIMD lowering keys on.
fn detect_subtarget(arch: TargetArch) -> Subtarget {
    let mut subtarget = Subtarget::default();
    let features = TargetMachine::get_host_cpu_features().to_string();
    for feature in features.split(',') {
        let Some(enabled) = feature.strip_prefix('+') else {
            continue;
        };
        match arch {
            TargetArch::X86_64 => match enabled {
                "xop" => subtarget.xop = true,
                "sse4.1" => subtarget.sse4_1 = true,
                "ssse3" => subtarget.ssse3 = true,
                "sse2" => subtarget.sse2 = true,
                _ => {}
            },
            TargetArch::Aarch64 => {
                if enabled == "neon" {
                    subtarget.neon = true;
                }
            }
            TargetArch::Other => {}
        }
    }
    subtarget
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_helper_is_noreturn_and_terminated() {
        let ll = Context::create();
        let ctx = CompileContext::new(&ll, "t", true).unwrap();
        let trap = ctx.module.get_function("trap").unwrap();
        assert_eq!(trap.count_basic_blocks(), 1);
        let entry = trap.get_first_basic_block().unwrap();
        assert!(entry.get_terminator().is_some());
    }

    #[test]
    fn generic_binary_disables_every_subtarget_path() {
        let ll = Context::create();
        let ctx = CompileContext::new(&ll, "t", true).unwrap();
        assert!(!ctx.subtarget.sse2 && !ctx.subtarget.ssse3 && !ctx.subtarget.neon);
    }

    #[test]
    fn version_global_is_emitted() {
        let ll = Context::create();
        let ctx = CompileContext::new(&ll, "t", true).unwrap();
        assert!(ctx.module.get_global("version").is_some());
        assert!(ctx.module.get_global("intrinsics").is_some());
    }

    #[test]
    fn block_type_resolution() {
        let ll = Context::create();
        let ctx = CompileContext::new(&ll, "t", true).unwrap();
        let (params, results) = ctx.resolve_block_type(BlockType::Empty).unwrap();
        assert!(params.is_empty() && results.is_empty());
        let (params, results) = ctx
            .resolve_block_type(BlockType::Type(ValType::I32))
            .unwrap();
        assert!(params.is_empty());
        assert_eq!(results, vec![ValType::I32]);
    }
}
