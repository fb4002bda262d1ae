//! Per-type call wrappers and import thunks.
//!
//! Every unique function type gets a `tN` wrapper with the uniform
//! `(exec_ctx, f_ptr, args_ptr, rets_ptr)` shape so the host can invoke any
//! compiled function without knowing its native signature. Imported
//! functions get `fN` thunks with the native signature that bounce through
//! the `Call` intrinsic.

use anyhow::{anyhow, Result};
use inkwell::attributes::AttributeLoc;
use inkwell::builder::Builder;
use inkwell::module::Linkage;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue, PointerValue};
use wasmparser::FuncType;

use crate::codegen::context::CompileContext;
use crate::codegen::types::{function_type, value_type};
use crate::intrinsics::Intrinsic;
use crate::parser::{CompositeDef, ImportedFunc};

/// Pointer to ValVariant slot `index` of a raw 16-byte-slot buffer.
fn val_slot<'ctx>(
    ctx: &CompileContext<'ctx>,
    builder: &Builder<'ctx>,
    buf: PointerValue<'ctx>,
    index: u64,
) -> Result<PointerValue<'ctx>> {
    Ok(unsafe {
        builder.build_in_bounds_gep(
            ctx.i64x2_ty,
            buf,
            &[ctx.i64_ty.const_int(index, false)],
            "slot",
        )?
    })
}

/// Emit the `tN` wrapper for every type-section entry. Structurally equal
/// function types share the first occurrence's wrapper.
pub fn declare_wrappers(ctx: &mut CompileContext<'_>) -> Result<()> {
    let wrapper_ty = ctx.ll.void_type().fn_type(
        &[
            ctx.ptr_ty.into(),
            ctx.ptr_ty.into(),
            ctx.ptr_ty.into(),
            ctx.ptr_ty.into(),
        ],
        false,
    );

    for idx in 0..ctx.composite_types.len() {
        let name = format!("t{idx}");
        let func_ty = match &ctx.composite_types[idx] {
            CompositeDef::Func(f) => Some(f.clone()),
            _ => None,
        };

        let Some(func_ty) = func_ty else {
            // Struct/array entries keep the table dense with an empty stub.
            let f = ctx.module.add_function(&name, wrapper_ty, None);
            ctx.export_symbol(f);
            let builder = ctx.ll.create_builder();
            builder.position_at_end(ctx.ll.append_basic_block(f, "entry"));
            builder.build_return(None)?;
            ctx.wrappers.push(f);
            continue;
        };

        // Alias duplicate signatures to the first wrapper.
        if let Some(prev) = (0..idx).find(|&j| {
            matches!(&ctx.composite_types[j], CompositeDef::Func(g) if *g == func_ty)
        }) {
            let shared = ctx.wrappers[prev];
            ctx.wrappers.push(shared);
            continue;
        }

        let f = ctx.module.add_function(&name, wrapper_ty, None);
        ctx.export_symbol(f);
        f.add_attribute(AttributeLoc::Param(0), ctx.readonly);
        f.add_attribute(AttributeLoc::Param(0), ctx.noalias);
        f.add_attribute(AttributeLoc::Param(1), ctx.noalias);
        f.add_attribute(AttributeLoc::Param(2), ctx.noalias);
        f.add_attribute(AttributeLoc::Param(3), ctx.noalias);

        emit_wrapper_body(ctx, f, &func_ty)?;
        ctx.wrappers.push(f);
    }
    Ok(())
}

fn emit_wrapper_body<'ctx>(
    ctx: &CompileContext<'ctx>,
    f: FunctionValue<'ctx>,
    func_ty: &FuncType,
) -> Result<()> {
    let builder = ctx.ll.create_builder();
    builder.position_at_end(ctx.ll.append_basic_block(f, "entry"));

    let exec_ctx = f
        .get_nth_param(0)
        .ok_or_else(|| anyhow!("wrapper missing exec ctx"))?;
    let fn_ptr = f
        .get_nth_param(1)
        .ok_or_else(|| anyhow!("wrapper missing function pointer"))?
        .into_pointer_value();
    let args_ptr = f
        .get_nth_param(2)
        .ok_or_else(|| anyhow!("wrapper missing args pointer"))?
        .into_pointer_value();
    let rets_ptr = f
        .get_nth_param(3)
        .ok_or_else(|| anyhow!("wrapper missing rets pointer"))?
        .into_pointer_value();

    let native_ty = function_type(ctx.ll, func_ty);

    let mut args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(func_ty.params().len() + 1);
    args.push(exec_ctx.into());
    for (i, vt) in func_ty.params().iter().enumerate() {
        let slot = val_slot(ctx, &builder, args_ptr, i as u64)?;
        let value = builder.build_load(value_type(ctx.ll, *vt), slot, "arg")?;
        args.push(value.into());
    }

    let ret = builder
        .build_indirect_call(native_ty, fn_ptr, &args, "invoke")?
        .try_as_basic_value()
        .basic();

    match ret {
        None => {}
        Some(value) if value.is_struct_value() => {
            let agg = value.into_struct_value();
            for i in 0..agg.get_type().count_fields() {
                let field = builder.build_extract_value(agg, i, "ret")?;
                let slot = val_slot(ctx, &builder, rets_ptr, u64::from(i))?;
                builder.build_store(slot, field)?;
            }
        }
        Some(value) => {
            let slot = val_slot(ctx, &builder, rets_ptr, 0)?;
            builder.build_store(slot, value)?;
        }
    }
    builder.build_return(None)?;
    Ok(())
}

/// Emit the `fN` thunk for one imported function and register it in the
/// function index space.
pub fn declare_import_thunk(ctx: &mut CompileContext<'_>, import: &ImportedFunc) -> Result<()> {
    let func_id = ctx.functions.len() as u32;
    let func_ty = ctx.func_type_of(import.type_idx)?.clone();
    let native_ty = function_type(ctx.ll, &func_ty);
    let f = ctx
        .module
        .add_function(&format!("f{func_id}"), native_ty, Some(Linkage::Internal));
    f.add_attribute(AttributeLoc::Param(0), ctx.readonly);
    f.add_attribute(AttributeLoc::Param(0), ctx.noalias);

    tracing::debug!(
        func = func_id,
        module = %import.module,
        name = %import.name,
        "import thunk"
    );

    let builder = ctx.ll.create_builder();
    builder.position_at_end(ctx.ll.append_basic_block(f, "entry"));

    let arg_count = func_ty.params().len();
    let ret_count = func_ty.results().len();
    let args_buf = builder.build_alloca(ctx.i64x2_ty.array_type(arg_count as u32), "args")?;
    let rets_buf = builder.build_alloca(ctx.i64x2_ty.array_type(ret_count as u32), "rets")?;

    for i in 0..arg_count {
        let param = f
            .get_nth_param(i as u32 + 1)
            .ok_or_else(|| anyhow!("import thunk missing parameter {i}"))?;
        let slot = val_slot(ctx, &builder, args_buf, i as u64)?;
        builder.build_store(slot, param)?;
    }

    let i32t = ctx.i32_ty;
    let call_ty = ctx.ll.void_type().fn_type(
        &[i32t.into(), ctx.ptr_ty.into(), ctx.ptr_ty.into()],
        false,
    );
    ctx.call_intrinsic(
        &builder,
        Intrinsic::Call,
        call_ty,
        &[
            i32t.const_int(u64::from(func_id), false).into(),
            args_buf.into(),
            rets_buf.into(),
        ],
    )?;

    match func_ty.results() {
        [] => {
            builder.build_return(None)?;
        }
        [single] => {
            let slot = val_slot(ctx, &builder, rets_buf, 0)?;
            let value = builder.build_load(value_type(ctx.ll, *single), slot, "ret")?;
            builder.build_return(Some(&value))?;
        }
        many => {
            let mut values: Vec<BasicValueEnum> = Vec::with_capacity(many.len());
            for (i, vt) in many.iter().enumerate() {
                let slot = val_slot(ctx, &builder, rets_buf, i as u64)?;
                let ty: BasicTypeEnum = value_type(ctx.ll, *vt);
                values.push(builder.build_load(ty, slot, "ret")?);
            }
            builder.build_aggregate_return(&values)?;
        }
    }

    ctx.functions.push((import.type_idx, f));
    Ok(())
}
