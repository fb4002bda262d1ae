//! WebAssembly value types ↔ LLVM types.
//!
//! Every reference type shares the `<2 x i64>` representation with `v128`:
//! lane 0 carries the type tag, lane 1 the pointer payload. Compiled function
//! signatures always take the execution-context pointer as their first
//! parameter; multi-value returns become a literal struct.

use inkwell::context::Context;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::values::BasicValueEnum;
use inkwell::AddressSpace;
use wasmparser::{FuncType, ValType};

/// Map one value type onto its LLVM representation.
pub fn value_type<'ctx>(ctx: &'ctx Context, vt: ValType) -> BasicTypeEnum<'ctx> {
    match vt {
        ValType::I32 => ctx.i32_type().into(),
        ValType::I64 => ctx.i64_type().into(),
        ValType::F32 => ctx.f32_type().into(),
        ValType::F64 => ctx.f64_type().into(),
        ValType::V128 | ValType::Ref(_) => ctx.i64_type().vec_type(2).into(),
    }
}

/// Parameter list for a compiled function: exec-ctx pointer first, then the
/// WebAssembly parameters.
pub fn args_type<'ctx>(ctx: &'ctx Context, params: &[ValType]) -> Vec<BasicMetadataTypeEnum<'ctx>> {
    let mut result = Vec::with_capacity(params.len() + 1);
    result.push(ctx.ptr_type(AddressSpace::default()).into());
    for vt in params {
        result.push(value_type(ctx, *vt).into());
    }
    result
}

/// Return shape for a compiled function: void, a single value, or a struct.
pub fn rets_type<'ctx>(ctx: &'ctx Context, results: &[ValType]) -> Option<BasicTypeEnum<'ctx>> {
    match results {
        [] => None,
        [single] => Some(value_type(ctx, *single)),
        many => {
            let fields: Vec<BasicTypeEnum> =
                many.iter().map(|vt| value_type(ctx, *vt)).collect();
            Some(ctx.struct_type(&fields, false).into())
        }
    }
}

/// LLVM signature for a WebAssembly function type.
pub fn function_type<'ctx>(ctx: &'ctx Context, func_ty: &FuncType) -> FunctionType<'ctx> {
    let args = args_type(ctx, func_ty.params());
    match rets_type(ctx, func_ty.results()) {
        None => ctx.void_type().fn_type(&args, false),
        Some(ret) => ret.fn_type(&args, false),
    }
}

/// The all-zero constant of a value type, used to initialise declared locals.
pub fn const_zero<'ctx>(ctx: &'ctx Context, vt: ValType) -> BasicValueEnum<'ctx> {
    zero_value(value_type(ctx, vt))
}

/// Zero of an arbitrary LLVM basic type.
pub fn zero_value(ty: BasicTypeEnum) -> BasicValueEnum {
    match ty {
        BasicTypeEnum::IntType(t) => t.const_zero().into(),
        BasicTypeEnum::FloatType(t) => t.const_zero().into(),
        BasicTypeEnum::VectorType(t) => t.const_zero().into(),
        BasicTypeEnum::PointerType(t) => t.const_null().into(),
        BasicTypeEnum::StructType(t) => t.const_zero().into(),
        BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.const_zero().into(),
    }
}

/// Undef of an arbitrary LLVM basic type. Pops in statically unreachable code
/// produce these so the operand stack stays well-typed.
pub fn undef_value(ty: BasicTypeEnum) -> BasicValueEnum {
    match ty {
        BasicTypeEnum::IntType(t) => t.get_undef().into(),
        BasicTypeEnum::FloatType(t) => t.get_undef().into(),
        BasicTypeEnum::VectorType(t) => t.get_undef().into(),
        BasicTypeEnum::PointerType(t) => t.get_undef().into(),
        BasicTypeEnum::StructType(t) => t.get_undef().into(),
        BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.get_undef().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_and_v128_share_the_two_lane_form() {
        let ctx = Context::create();
        let v128 = value_type(&ctx, ValType::V128);
        let funcref = value_type(&ctx, ValType::FUNCREF);
        assert_eq!(v128, funcref);
        assert!(v128.is_vector_type());
    }

    #[test]
    fn exec_ctx_pointer_is_prepended() {
        let ctx = Context::create();
        let args = args_type(&ctx, &[ValType::I32, ValType::F64]);
        assert_eq!(args.len(), 3);
        assert!(matches!(args[0], BasicMetadataTypeEnum::PointerType(_)));
    }

    #[test]
    fn multi_value_returns_become_a_struct() {
        let ctx = Context::create();
        let ret = rets_type(&ctx, &[ValType::I32, ValType::I64]).unwrap();
        assert!(ret.is_struct_type());
    }
}
