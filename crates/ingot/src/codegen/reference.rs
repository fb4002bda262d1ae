//! Reference and GC opcode lowering.
//!
//! References live on the operand stack as `<2 x i64>`: lane 0 is the type
//! tag, lane 1 the pointer payload. The tag layout is fixed here and shared
//! with the host intrinsics: bits 0..8 hold the heap-type code, bit 8 the
//! nullability flag, bits 32..64 the composite type index for concrete
//! types. Struct and array accesses marshal through 16-byte ValVariant
//! scratch buffers; subtype tests and casts are host intrinsic calls.

use anyhow::{anyhow, Result};
use inkwell::types::BasicTypeEnum;
use inkwell::values::{IntValue, VectorValue};
use inkwell::IntPredicate;
use wasmparser::{AbstractHeapType, HeapType, Operator, RefType};

use crate::codegen::function::FunctionCompiler;
use crate::error::TrapCode;
use crate::intrinsics::Intrinsic;
use crate::parser::{CompositeDef, StorageKind};

// Heap-type codes, matching the binary encoding of the abstract heap types.
const HEAP_NOFUNC: u64 = 0x73;
const HEAP_NOEXTERN: u64 = 0x72;
const HEAP_NONE: u64 = 0x71;
const HEAP_FUNC: u64 = 0x70;
const HEAP_EXTERN: u64 = 0x6F;
const HEAP_ANY: u64 = 0x6E;
const HEAP_EQ: u64 = 0x6D;
const HEAP_I31: u64 = 0x6C;
const HEAP_STRUCT: u64 = 0x6B;
const HEAP_ARRAY: u64 = 0x6A;

const NULLABLE_BIT: u64 = 1 << 8;
const HEAP_CODE_MASK: u64 = 0xFF;

fn abstract_code(ty: AbstractHeapType) -> u64 {
    match ty {
        AbstractHeapType::Func => HEAP_FUNC,
        AbstractHeapType::Extern => HEAP_EXTERN,
        AbstractHeapType::Any => HEAP_ANY,
        AbstractHeapType::Eq => HEAP_EQ,
        AbstractHeapType::I31 => HEAP_I31,
        AbstractHeapType::Struct => HEAP_STRUCT,
        AbstractHeapType::Array => HEAP_ARRAY,
        AbstractHeapType::NoFunc => HEAP_NOFUNC,
        AbstractHeapType::NoExtern => HEAP_NOEXTERN,
        _ => HEAP_NONE,
    }
}

impl<'a, 'ctx> FunctionCompiler<'a, 'ctx> {
    pub(crate) fn translate_reference(&mut self, op: &Operator) -> Result<bool> {
        match op {
            Operator::RefNull { hty } => {
                let tag = self.null_tag(hty);
                let v = self.const_ref(tag, 0);
                self.push(v);
            }
            Operator::RefIsNull => {
                let reference = self.pop()?.into_vector_value();
                let payload = self.ref_payload(reference)?;
                let is_null = self.builder.build_int_compare(
                    IntPredicate::EQ,
                    payload,
                    self.ctx.i64_ty.const_zero(),
                    "is_null",
                )?;
                let v = self
                    .builder
                    .build_int_z_extend(is_null, self.ctx.i32_ty, "is_null32")?;
                self.push(v);
            }
            Operator::RefFunc { function_index } => {
                let ty = self
                    .ctx
                    .i64x2_ty
                    .fn_type(&[self.ctx.i32_ty.into()], false);
                let v = self.host_call_value(
                    Intrinsic::RefFunc,
                    ty,
                    &[self
                        .ctx
                        .i32_ty
                        .const_int(u64::from(*function_index), false)
                        .into()],
                )?;
                self.push(v);
            }
            Operator::RefEq => {
                let rhs = self.pop()?.into_vector_value();
                let lhs = self.pop()?.into_vector_value();
                let rhs = self.ref_payload(rhs)?;
                let lhs = self.ref_payload(lhs)?;
                let eq = self
                    .builder
                    .build_int_compare(IntPredicate::EQ, lhs, rhs, "ref_eq")?;
                let v = self
                    .builder
                    .build_int_z_extend(eq, self.ctx.i32_ty, "ref_eq32")?;
                self.push(v);
            }
            Operator::RefAsNonNull => {
                let reference = self.top()?.into_vector_value();
                let payload = self.ref_payload(reference)?;
                let non_null = self.builder.build_int_compare(
                    IntPredicate::NE,
                    payload,
                    self.ctx.i64_ty.const_zero(),
                    "non_null",
                )?;
                self.trap_unless(non_null, TrapCode::CastNullToNonNull)?;
            }
            Operator::BrOnNull { relative_depth } => {
                let reference = self.pop()?.into_vector_value();
                let payload = self.ref_payload(reference)?;
                let is_null = self.builder.build_int_compare(
                    IntPredicate::EQ,
                    payload,
                    self.ctx.i64_ty.const_zero(),
                    "on_null",
                )?;
                self.branch_ref_cond(*relative_depth, is_null, "br_on_null.end")?;
                self.push(reference);
            }
            Operator::BrOnNonNull { relative_depth } => {
                let reference = self.top()?.into_vector_value();
                let payload = self.ref_payload(reference)?;
                let non_null = self.builder.build_int_compare(
                    IntPredicate::NE,
                    payload,
                    self.ctx.i64_ty.const_zero(),
                    "on_non_null",
                )?;
                self.branch_ref_cond(*relative_depth, non_null, "br_on_non_null.end")?;
                self.pop()?;
            }
            Operator::BrOnCast {
                relative_depth,
                from_ref_type: _,
                to_ref_type,
            } => {
                let matched = self.ref_test_value(*to_ref_type)?;
                let cond = self.builder.build_int_compare(
                    IntPredicate::NE,
                    matched,
                    self.ctx.i32_ty.const_zero(),
                    "cast_hit",
                )?;
                self.branch_ref_cond(*relative_depth, cond, "br_on_cast.end")?;
            }
            Operator::BrOnCastFail {
                relative_depth,
                from_ref_type: _,
                to_ref_type,
            } => {
                let matched = self.ref_test_value(*to_ref_type)?;
                let cond = self.builder.build_int_compare(
                    IntPredicate::EQ,
                    matched,
                    self.ctx.i32_ty.const_zero(),
                    "cast_miss",
                )?;
                self.branch_ref_cond(*relative_depth, cond, "br_on_cast_fail.end")?;
            }
            Operator::RefTestNonNull { hty } => self.ref_test(hty, false)?,
            Operator::RefTestNullable { hty } => self.ref_test(hty, true)?,
            Operator::RefCastNonNull { hty } => self.ref_cast(hty, false)?,
            Operator::RefCastNullable { hty } => self.ref_cast(hty, true)?,

            Operator::AnyConvertExtern => self.any_convert_extern()?,
            Operator::ExternConvertAny => self.extern_convert_any()?,

            Operator::RefI31 => {
                let value = self.pop_int()?;
                let masked = self.builder.build_and(
                    value,
                    self.ctx.i32_ty.const_int(0x7FFF_FFFF, false),
                    "i31_bits",
                )?;
                // The sentinel high bit distinguishes a real i31 from null.
                let tagged = self.builder.build_or(
                    masked,
                    self.ctx.i32_ty.const_int(0x8000_0000, false),
                    "i31_mark",
                )?;
                let payload =
                    self.builder
                        .build_int_z_extend(tagged, self.ctx.i64_ty, "i31_payload")?;
                let base = self.const_ref(HEAP_I31, 0);
                let v = self.builder.build_insert_element(
                    base,
                    payload,
                    self.ctx.i64_ty.const_int(1, false),
                    "i31_ref",
                )?;
                self.push(v);
            }
            Operator::I31GetS => {
                let value = self.i31_value()?;
                let sign = self.builder.build_and(
                    value,
                    self.ctx.i32_ty.const_int(0x4000_0000, false),
                    "i31_sign",
                )?;
                let sign = self.builder.build_left_shift(
                    sign,
                    self.ctx.i32_ty.const_int(1, false),
                    "i31_sign_hi",
                )?;
                let v = self.builder.build_or(value, sign, "i31_s")?;
                self.push(v);
            }
            Operator::I31GetU => {
                let v = self.i31_value()?;
                self.push(v);
            }

            Operator::StructNew { struct_type_index } => {
                let field_count = self.struct_field_count(*struct_type_index)?;
                let args = self.pop_n(field_count)?;
                let buf = self.val_buffer(field_count)?;
                for (i, value) in args.iter().enumerate() {
                    self.store_val_slot(buf, field_count, i, *value)?;
                }
                let v = self.struct_new_call(*struct_type_index, buf, field_count)?;
                self.push(v);
            }
            Operator::StructNewDefault { struct_type_index } => {
                let buf = self.ctx.ptr_ty.const_null();
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.i64x2_ty.fn_type(
                    &[i32t.into(), self.ctx.ptr_ty.into(), i32t.into()],
                    false,
                );
                let v = self.host_call_value(
                    Intrinsic::StructNew,
                    ty,
                    &[
                        i32t.const_int(u64::from(*struct_type_index), false).into(),
                        buf.into(),
                        i32t.const_zero().into(),
                    ],
                )?;
                self.push(v);
            }
            Operator::StructGet {
                struct_type_index,
                field_index,
            } => self.struct_get(*struct_type_index, *field_index, false)?,
            Operator::StructGetS {
                struct_type_index,
                field_index,
            } => self.struct_get(*struct_type_index, *field_index, true)?,
            Operator::StructGetU {
                struct_type_index,
                field_index,
            } => self.struct_get(*struct_type_index, *field_index, false)?,
            Operator::StructSet {
                struct_type_index,
                field_index,
            } => {
                let value = self.pop()?;
                let reference = self.pop()?;
                let buf = self.val_buffer(1)?;
                self.store_val_slot(buf, 1, 0, value)?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[
                        self.ctx.i64x2_ty.into(),
                        i32t.into(),
                        i32t.into(),
                        self.ctx.ptr_ty.into(),
                    ],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::StructSet,
                    ty,
                    &[
                        reference.into(),
                        i32t.const_int(u64::from(*struct_type_index), false).into(),
                        i32t.const_int(u64::from(*field_index), false).into(),
                        buf.into(),
                    ],
                )?;
            }

            Operator::ArrayNew { array_type_index } => {
                let length = self.pop()?;
                let value = self.pop()?;
                let buf = self.val_buffer(1)?;
                self.store_val_slot(buf, 1, 0, value)?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.i64x2_ty.fn_type(
                    &[i32t.into(), i32t.into(), self.ctx.ptr_ty.into(), i32t.into()],
                    false,
                );
                let v = self.host_call_value(
                    Intrinsic::ArrayNew,
                    ty,
                    &[
                        i32t.const_int(u64::from(*array_type_index), false).into(),
                        length.into(),
                        buf.into(),
                        i32t.const_int(1, false).into(),
                    ],
                )?;
                self.push(v);
            }
            Operator::ArrayNewDefault { array_type_index } => {
                let length = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.i64x2_ty.fn_type(
                    &[i32t.into(), i32t.into(), self.ctx.ptr_ty.into(), i32t.into()],
                    false,
                );
                let v = self.host_call_value(
                    Intrinsic::ArrayNew,
                    ty,
                    &[
                        i32t.const_int(u64::from(*array_type_index), false).into(),
                        length.into(),
                        self.ctx.ptr_ty.const_null().into(),
                        i32t.const_zero().into(),
                    ],
                )?;
                self.push(v);
            }
            Operator::ArrayNewFixed {
                array_type_index,
                array_size,
            } => {
                let count = *array_size as usize;
                let args = self.pop_n(count)?;
                let buf = self.val_buffer(count)?;
                for (i, value) in args.iter().enumerate() {
                    self.store_val_slot(buf, count, i, *value)?;
                }
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.i64x2_ty.fn_type(
                    &[i32t.into(), i32t.into(), self.ctx.ptr_ty.into(), i32t.into()],
                    false,
                );
                let v = self.host_call_value(
                    Intrinsic::ArrayNew,
                    ty,
                    &[
                        i32t.const_int(u64::from(*array_type_index), false).into(),
                        i32t.const_int(count as u64, false).into(),
                        buf.into(),
                        i32t.const_int(count as u64, false).into(),
                    ],
                )?;
                self.push(v);
            }
            Operator::ArrayNewData {
                array_type_index,
                array_data_index,
            } => self.array_new_segment(
                Intrinsic::ArrayNewData,
                *array_type_index,
                *array_data_index,
            )?,
            Operator::ArrayNewElem {
                array_type_index,
                array_elem_index,
            } => self.array_new_segment(
                Intrinsic::ArrayNewElem,
                *array_type_index,
                *array_elem_index,
            )?,
            Operator::ArrayGet { array_type_index } => self.array_get(*array_type_index, false)?,
            Operator::ArrayGetS { array_type_index } => self.array_get(*array_type_index, true)?,
            Operator::ArrayGetU { array_type_index } => self.array_get(*array_type_index, false)?,
            Operator::ArraySet { array_type_index } => {
                let value = self.pop()?;
                let index = self.pop()?;
                let reference = self.pop()?;
                let buf = self.val_buffer(1)?;
                self.store_val_slot(buf, 1, 0, value)?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[
                        self.ctx.i64x2_ty.into(),
                        i32t.into(),
                        i32t.into(),
                        self.ctx.ptr_ty.into(),
                    ],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::ArraySet,
                    ty,
                    &[
                        reference.into(),
                        i32t.const_int(u64::from(*array_type_index), false).into(),
                        index.into(),
                        buf.into(),
                    ],
                )?;
            }
            Operator::ArrayLen => {
                let reference = self.pop()?;
                let ty = self
                    .ctx
                    .i32_ty
                    .fn_type(&[self.ctx.i64x2_ty.into()], false);
                let v = self.host_call_value(Intrinsic::ArrayLen, ty, &[reference.into()])?;
                self.push(v);
            }
            Operator::ArrayFill { array_type_index } => {
                let count = self.pop()?;
                let value = self.pop()?;
                let offset = self.pop()?;
                let reference = self.pop()?;
                let buf = self.val_buffer(1)?;
                self.store_val_slot(buf, 1, 0, value)?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[
                        self.ctx.i64x2_ty.into(),
                        i32t.into(),
                        i32t.into(),
                        i32t.into(),
                        self.ctx.ptr_ty.into(),
                    ],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::ArrayFill,
                    ty,
                    &[
                        reference.into(),
                        i32t.const_int(u64::from(*array_type_index), false).into(),
                        offset.into(),
                        count.into(),
                        buf.into(),
                    ],
                )?;
            }
            Operator::ArrayCopy {
                array_type_index_dst,
                array_type_index_src,
            } => {
                let count = self.pop()?;
                let src_offset = self.pop()?;
                let src_ref = self.pop()?;
                let dst_offset = self.pop()?;
                let dst_ref = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[
                        self.ctx.i64x2_ty.into(),
                        i32t.into(),
                        i32t.into(),
                        self.ctx.i64x2_ty.into(),
                        i32t.into(),
                        i32t.into(),
                        i32t.into(),
                    ],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::ArrayCopy,
                    ty,
                    &[
                        dst_ref.into(),
                        i32t.const_int(u64::from(*array_type_index_dst), false).into(),
                        dst_offset.into(),
                        src_ref.into(),
                        i32t.const_int(u64::from(*array_type_index_src), false).into(),
                        src_offset.into(),
                        count.into(),
                    ],
                )?;
            }
            Operator::ArrayInitData {
                array_type_index,
                array_data_index,
            } => self.array_init_segment(
                Intrinsic::ArrayInitData,
                *array_type_index,
                *array_data_index,
            )?,
            Operator::ArrayInitElem {
                array_type_index,
                array_elem_index,
            } => self.array_init_segment(
                Intrinsic::ArrayInitElem,
                *array_type_index,
                *array_elem_index,
            )?,

            _ => return Ok(false),
        }
        Ok(true)
    }

    // ── Tag encoding ──

    /// 64-bit type tag for a reference type.
    pub(crate) fn encode_ref_type(&self, rt: RefType) -> u64 {
        let nullable = if rt.is_nullable() { NULLABLE_BIT } else { 0 };
        match rt.heap_type() {
            HeapType::Abstract { ty, .. } => abstract_code(ty) | nullable,
            HeapType::Concrete(idx) => {
                let idx = idx.as_module_index().unwrap_or(0);
                nullable | (u64::from(idx) << 32)
            }
        }
    }

    fn encode_heap_type(&self, hty: &HeapType, nullable: bool) -> u64 {
        let nullable = if nullable { NULLABLE_BIT } else { 0 };
        match hty {
            HeapType::Abstract { ty, .. } => abstract_code(*ty) | nullable,
            HeapType::Concrete(idx) => {
                let idx = idx.as_module_index().unwrap_or(0);
                nullable | (u64::from(idx) << 32)
            }
        }
    }

    /// Null references carry the narrowest compatible null kind.
    fn null_tag(&self, hty: &HeapType) -> u64 {
        let code = match hty {
            HeapType::Abstract { ty, .. } => match ty {
                AbstractHeapType::Func | AbstractHeapType::NoFunc => HEAP_NOFUNC,
                AbstractHeapType::Extern | AbstractHeapType::NoExtern => HEAP_NOEXTERN,
                _ => HEAP_NONE,
            },
            HeapType::Concrete(idx) => {
                let idx = idx.as_module_index().unwrap_or(0) as usize;
                match self.ctx.composite_types.get(idx) {
                    Some(CompositeDef::Func(_)) => HEAP_NOFUNC,
                    _ => HEAP_NONE,
                }
            }
        };
        code | NULLABLE_BIT
    }

    fn const_ref(&self, tag: u64, payload: u64) -> VectorValue<'ctx> {
        inkwell::types::VectorType::const_vector(&[
            self.ctx.i64_ty.const_int(tag, false).into(),
            self.ctx.i64_ty.const_int(payload, false).into(),
        ])
    }

    pub(crate) fn ref_payload(&mut self, reference: VectorValue<'ctx>) -> Result<IntValue<'ctx>> {
        Ok(self
            .builder
            .build_extract_element(reference, self.ctx.i64_ty.const_int(1, false), "ref_ptr")?
            .into_int_value())
    }

    fn ref_tag(&mut self, reference: VectorValue<'ctx>) -> Result<IntValue<'ctx>> {
        Ok(self
            .builder
            .build_extract_element(reference, self.ctx.i64_ty.const_zero(), "ref_tag")?
            .into_int_value())
    }

    // ── Shared shapes ──

    /// Conditional branch to a label with standard branch transfer; the
    /// fall-through continues at a fresh block.
    fn branch_ref_cond(
        &mut self,
        depth: u32,
        cond: IntValue<'ctx>,
        next_name: &str,
    ) -> Result<()> {
        self.set_label_jump_phi(depth)?;
        let next = self.append_block(next_name);
        let target = self.label(depth)?;
        self.builder.build_conditional_branch(cond, target, next)?;
        self.builder.position_at_end(next);
        Ok(())
    }

    fn ref_test_value(&mut self, target: RefType) -> Result<IntValue<'ctx>> {
        let reference = self.top()?.into_vector_value();
        let tag = self
            .ctx
            .i64_ty
            .const_int(self.encode_ref_type(target), false);
        let ty = self.ctx.i32_ty.fn_type(
            &[self.ctx.i64x2_ty.into(), self.ctx.i64_ty.into()],
            false,
        );
        Ok(self
            .host_call_value(Intrinsic::RefTest, ty, &[reference.into(), tag.into()])?
            .into_int_value())
    }

    fn ref_test(&mut self, hty: &HeapType, nullable: bool) -> Result<()> {
        let reference = self.pop()?;
        let tag = self
            .ctx
            .i64_ty
            .const_int(self.encode_heap_type(hty, nullable), false);
        let ty = self.ctx.i32_ty.fn_type(
            &[self.ctx.i64x2_ty.into(), self.ctx.i64_ty.into()],
            false,
        );
        let v = self.host_call_value(Intrinsic::RefTest, ty, &[reference.into(), tag.into()])?;
        self.push(v);
        Ok(())
    }

    fn ref_cast(&mut self, hty: &HeapType, nullable: bool) -> Result<()> {
        let reference = self.pop()?;
        let tag = self
            .ctx
            .i64_ty
            .const_int(self.encode_heap_type(hty, nullable), false);
        let ty = self.ctx.i64x2_ty.fn_type(
            &[self.ctx.i64x2_ty.into(), self.ctx.i64_ty.into()],
            false,
        );
        let v = self.host_call_value(Intrinsic::RefCast, ty, &[reference.into(), tag.into()])?;
        self.push(v);
        Ok(())
    }

    fn any_convert_extern(&mut self) -> Result<()> {
        let reference = self.pop()?.into_vector_value();
        let payload = self.ref_payload(reference)?;
        let tag = self.ref_tag(reference)?;

        let null_bb = self.append_block("conv_any.null");
        let live_bb = self.append_block("conv_any.live");
        let end = self.append_block("conv_any.end");
        let is_null = self.builder.build_int_compare(
            IntPredicate::EQ,
            payload,
            self.ctx.i64_ty.const_zero(),
            "is_null",
        )?;
        self.builder.build_conditional_branch(is_null, null_bb, live_bb)?;

        self.builder.position_at_end(null_bb);
        let null_ref = self.const_ref(HEAP_NONE | NULLABLE_BIT, 0);
        self.builder.build_unconditional_branch(end)?;

        // A live external reference internalises to anyref; anything else
        // already carries an internal tag.
        self.builder.position_at_end(live_bb);
        let code = self.builder.build_and(
            tag,
            self.ctx.i64_ty.const_int(HEAP_CODE_MASK, false),
            "heap_code",
        )?;
        let was_extern = self.builder.build_int_compare(
            IntPredicate::EQ,
            code,
            self.ctx.i64_ty.const_int(HEAP_EXTERN, false),
            "was_extern",
        )?;
        let was_noextern = self.builder.build_int_compare(
            IntPredicate::EQ,
            code,
            self.ctx.i64_ty.const_int(HEAP_NOEXTERN, false),
            "was_noextern",
        )?;
        let external = self.builder.build_or(was_extern, was_noextern, "external")?;
        let any_tag = self.ctx.i64_ty.const_int(HEAP_ANY, false);
        let new_tag = self
            .builder
            .build_select(external, any_tag, tag, "internal_tag")?
            .into_int_value();
        let live_ref = self.builder.build_insert_element(
            reference,
            new_tag,
            self.ctx.i64_ty.const_zero(),
            "internalised",
        )?;
        self.builder.build_unconditional_branch(end)?;

        self.builder.position_at_end(end);
        let phi = self.builder.build_phi(self.ctx.i64x2_ty, "conv_any")?;
        phi.add_incoming(&[(&null_ref, null_bb), (&live_ref, live_bb)]);
        self.push(phi.as_basic_value());
        Ok(())
    }

    fn extern_convert_any(&mut self) -> Result<()> {
        let reference = self.pop()?.into_vector_value();
        let payload = self.ref_payload(reference)?;

        let null_bb = self.append_block("conv_extern.null");
        let live_bb = self.append_block("conv_extern.live");
        let end = self.append_block("conv_extern.end");
        let is_null = self.builder.build_int_compare(
            IntPredicate::EQ,
            payload,
            self.ctx.i64_ty.const_zero(),
            "is_null",
        )?;
        self.builder.build_conditional_branch(is_null, null_bb, live_bb)?;

        self.builder.position_at_end(null_bb);
        let null_ref = self.const_ref(HEAP_NOEXTERN | NULLABLE_BIT, 0);
        self.builder.build_unconditional_branch(end)?;

        self.builder.position_at_end(live_bb);
        let extern_base = self.const_ref(HEAP_EXTERN, 0);
        let live_ref = self.builder.build_insert_element(
            extern_base,
            payload,
            self.ctx.i64_ty.const_int(1, false),
            "externalised",
        )?;
        self.builder.build_unconditional_branch(end)?;

        self.builder.position_at_end(end);
        let phi = self.builder.build_phi(self.ctx.i64x2_ty, "conv_extern")?;
        phi.add_incoming(&[(&null_ref, null_bb), (&live_ref, live_bb)]);
        self.push(phi.as_basic_value());
        Ok(())
    }

    /// Pop an i31 ref, trap on null, and return the 31-bit payload.
    fn i31_value(&mut self) -> Result<IntValue<'ctx>> {
        let reference = self.pop()?.into_vector_value();
        let payload = self.ref_payload(reference)?;
        let value = self
            .builder
            .build_int_truncate(payload, self.ctx.i32_ty, "i31_word")?;
        let sentinel = self.builder.build_and(
            value,
            self.ctx.i32_ty.const_int(0x8000_0000, false),
            "i31_sentinel",
        )?;
        let present = self.builder.build_int_compare(
            IntPredicate::NE,
            sentinel,
            self.ctx.i32_ty.const_zero(),
            "i31_present",
        )?;
        self.trap_unless(present, TrapCode::AccessNullI31)?;
        Ok(self.builder.build_and(
            value,
            self.ctx.i32_ty.const_int(0x7FFF_FFFF, false),
            "i31_val",
        )?)
    }

    // ── Struct/array marshalling ──

    fn struct_field_count(&self, type_idx: u32) -> Result<usize> {
        match self.ctx.composite_types.get(type_idx as usize) {
            Some(CompositeDef::Struct(fields)) => Ok(fields.len()),
            _ => Err(anyhow!("type {type_idx} is not a struct type")),
        }
    }

    fn struct_field_storage(&self, type_idx: u32, field_idx: u32) -> Result<StorageKind> {
        match self.ctx.composite_types.get(type_idx as usize) {
            Some(CompositeDef::Struct(fields)) => fields
                .get(field_idx as usize)
                .map(|f| f.storage)
                .ok_or_else(|| anyhow!("field {field_idx} out of range")),
            _ => Err(anyhow!("type {type_idx} is not a struct type")),
        }
    }

    fn array_storage(&self, type_idx: u32) -> Result<StorageKind> {
        match self.ctx.composite_types.get(type_idx as usize) {
            Some(CompositeDef::Array(field)) => Ok(field.storage),
            _ => Err(anyhow!("type {type_idx} is not an array type")),
        }
    }

    /// Width the marshalled field value is read back with.
    fn storage_load_type(&self, storage: StorageKind) -> BasicTypeEnum<'ctx> {
        match storage {
            StorageKind::I8 | StorageKind::I16 => self.ctx.i32_ty.into(),
            StorageKind::Val(vt) => crate::codegen::types::value_type(self.ctx.ll, vt),
        }
    }

    fn struct_new_call(
        &mut self,
        type_idx: u32,
        buf: inkwell::values::PointerValue<'ctx>,
        count: usize,
    ) -> Result<inkwell::values::BasicValueEnum<'ctx>> {
        let i32t = self.ctx.i32_ty;
        let ty = self.ctx.i64x2_ty.fn_type(
            &[i32t.into(), self.ctx.ptr_ty.into(), i32t.into()],
            false,
        );
        self.host_call_value(
            Intrinsic::StructNew,
            ty,
            &[
                i32t.const_int(u64::from(type_idx), false).into(),
                buf.into(),
                i32t.const_int(count as u64, false).into(),
            ],
        )
    }

    fn struct_get(&mut self, type_idx: u32, field_idx: u32, signed: bool) -> Result<()> {
        let storage = self.struct_field_storage(type_idx, field_idx)?;
        let reference = self.pop()?;
        let ret_buf = self.val_buffer(1)?;
        let i32t = self.ctx.i32_ty;
        let ty = self.ctx.ll.void_type().fn_type(
            &[
                self.ctx.i64x2_ty.into(),
                i32t.into(),
                i32t.into(),
                self.ctx.i8_ty.into(),
                self.ctx.ptr_ty.into(),
            ],
            false,
        );
        self.ctx.call_intrinsic(
            &self.builder,
            Intrinsic::StructGet,
            ty,
            &[
                reference.into(),
                i32t.const_int(u64::from(type_idx), false).into(),
                i32t.const_int(u64::from(field_idx), false).into(),
                self.ctx.i8_ty.const_int(u64::from(signed), false).into(),
                ret_buf.into(),
            ],
        )?;
        let load_ty = self.storage_load_type(storage);
        let value = self.load_val_slot(ret_buf, 1, 0, load_ty)?;
        self.push(value);
        Ok(())
    }

    fn array_get(&mut self, type_idx: u32, signed: bool) -> Result<()> {
        let storage = self.array_storage(type_idx)?;
        let index = self.pop()?;
        let reference = self.pop()?;
        let ret_buf = self.val_buffer(1)?;
        let i32t = self.ctx.i32_ty;
        let ty = self.ctx.ll.void_type().fn_type(
            &[
                self.ctx.i64x2_ty.into(),
                i32t.into(),
                i32t.into(),
                self.ctx.i8_ty.into(),
                self.ctx.ptr_ty.into(),
            ],
            false,
        );
        self.ctx.call_intrinsic(
            &self.builder,
            Intrinsic::ArrayGet,
            ty,
            &[
                reference.into(),
                i32t.const_int(u64::from(type_idx), false).into(),
                index.into(),
                self.ctx.i8_ty.const_int(u64::from(signed), false).into(),
                ret_buf.into(),
            ],
        )?;
        let load_ty = self.storage_load_type(storage);
        let value = self.load_val_slot(ret_buf, 1, 0, load_ty)?;
        self.push(value);
        Ok(())
    }

    fn array_new_segment(
        &mut self,
        intrinsic: Intrinsic,
        type_idx: u32,
        segment_idx: u32,
    ) -> Result<()> {
        let length = self.pop()?;
        let start = self.pop()?;
        let i32t = self.ctx.i32_ty;
        let ty = self.ctx.i64x2_ty.fn_type(
            &[i32t.into(), i32t.into(), i32t.into(), i32t.into()],
            false,
        );
        let v = self.host_call_value(
            intrinsic,
            ty,
            &[
                i32t.const_int(u64::from(type_idx), false).into(),
                i32t.const_int(u64::from(segment_idx), false).into(),
                start.into(),
                length.into(),
            ],
        )?;
        self.push(v);
        Ok(())
    }

    fn array_init_segment(
        &mut self,
        intrinsic: Intrinsic,
        type_idx: u32,
        segment_idx: u32,
    ) -> Result<()> {
        let count = self.pop()?;
        let src_offset = self.pop()?;
        let dst_offset = self.pop()?;
        let reference = self.pop()?;
        let i32t = self.ctx.i32_ty;
        let ty = self.ctx.ll.void_type().fn_type(
            &[
                self.ctx.i64x2_ty.into(),
                i32t.into(),
                i32t.into(),
                i32t.into(),
                i32t.into(),
                i32t.into(),
            ],
            false,
        );
        self.ctx.call_intrinsic(
            &self.builder,
            intrinsic,
            ty,
            &[
                reference.into(),
                i32t.const_int(u64::from(type_idx), false).into(),
                i32t.const_int(u64::from(segment_idx), false).into(),
                dst_offset.into(),
                src_offset.into(),
                count.into(),
            ],
        )?;
        Ok(())
    }
}
