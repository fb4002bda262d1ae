//! Memory and table opcode lowering.
//!
//! Plain loads and stores address linear memory directly: the i32 address is
//! zero-extended, offset, and GEP'd from the memory base. Accesses are
//! volatile with alignment forced to 1; misalignment trapping is not
//! generated. Bulk-memory and table operations delegate to host intrinsics.

use anyhow::{anyhow, Result};
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, IntValue};
use wasmparser::{MemArg, Operator};

use crate::codegen::function::FunctionCompiler;
use crate::intrinsics::Intrinsic;

impl<'a, 'ctx> FunctionCompiler<'a, 'ctx> {
    pub(crate) fn translate_memory(&mut self, op: &Operator) -> Result<bool> {
        match op {
            Operator::I32Load { memarg } => self.emit_load(memarg, self.ctx.i32_ty.into())?,
            Operator::I64Load { memarg } => self.emit_load(memarg, self.ctx.i64_ty.into())?,
            Operator::F32Load { memarg } => self.emit_load(memarg, self.ctx.f32_ty.into())?,
            Operator::F64Load { memarg } => self.emit_load(memarg, self.ctx.f64_ty.into())?,
            Operator::I32Load8S { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i8_ty.into(), self.ctx.i32_ty, true)?
            }
            Operator::I32Load8U { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i8_ty.into(), self.ctx.i32_ty, false)?
            }
            Operator::I32Load16S { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i16_ty.into(), self.ctx.i32_ty, true)?
            }
            Operator::I32Load16U { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i16_ty.into(), self.ctx.i32_ty, false)?
            }
            Operator::I64Load8S { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i8_ty.into(), self.ctx.i64_ty, true)?
            }
            Operator::I64Load8U { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i8_ty.into(), self.ctx.i64_ty, false)?
            }
            Operator::I64Load16S { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i16_ty.into(), self.ctx.i64_ty, true)?
            }
            Operator::I64Load16U { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i16_ty.into(), self.ctx.i64_ty, false)?
            }
            Operator::I64Load32S { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i32_ty.into(), self.ctx.i64_ty, true)?
            }
            Operator::I64Load32U { memarg } => {
                self.emit_load_extend(memarg, self.ctx.i32_ty.into(), self.ctx.i64_ty, false)?
            }

            Operator::I32Store { memarg } => self.emit_store(memarg, self.ctx.i32_ty.into(), false)?,
            Operator::I64Store { memarg } => self.emit_store(memarg, self.ctx.i64_ty.into(), false)?,
            Operator::F32Store { memarg } => self.emit_store(memarg, self.ctx.f32_ty.into(), false)?,
            Operator::F64Store { memarg } => self.emit_store(memarg, self.ctx.f64_ty.into(), false)?,
            Operator::I32Store8 { memarg } | Operator::I64Store8 { memarg } => {
                self.emit_store(memarg, self.ctx.i8_ty.into(), true)?
            }
            Operator::I32Store16 { memarg } | Operator::I64Store16 { memarg } => {
                self.emit_store(memarg, self.ctx.i16_ty.into(), true)?
            }
            Operator::I64Store32 { memarg } => {
                self.emit_store(memarg, self.ctx.i32_ty.into(), true)?
            }

            Operator::MemorySize { mem } => {
                let ty = self
                    .ctx
                    .i32_ty
                    .fn_type(&[self.ctx.i32_ty.into()], false);
                let mem = self.ctx.i32_ty.const_int(u64::from(*mem), false);
                let v = self.host_call_value(Intrinsic::MemSize, ty, &[mem.into()])?;
                self.push(v);
            }
            Operator::MemoryGrow { mem } => {
                let delta = self.pop()?;
                let ty = self
                    .ctx
                    .i32_ty
                    .fn_type(&[self.ctx.i32_ty.into(), self.ctx.i32_ty.into()], false);
                let mem = self.ctx.i32_ty.const_int(u64::from(*mem), false);
                let v =
                    self.host_call_value(Intrinsic::MemGrow, ty, &[mem.into(), delta.into()])?;
                self.push(v);
            }
            Operator::MemoryInit { data_index, mem } => {
                let len = self.pop()?;
                let src = self.pop()?;
                let dst = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[i32t.into(), i32t.into(), i32t.into(), i32t.into(), i32t.into()],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::MemInit,
                    ty,
                    &[
                        i32t.const_int(u64::from(*mem), false).into(),
                        i32t.const_int(u64::from(*data_index), false).into(),
                        dst.into(),
                        src.into(),
                        len.into(),
                    ],
                )?;
            }
            Operator::DataDrop { data_index } => {
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(&[i32t.into()], false);
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::DataDrop,
                    ty,
                    &[i32t.const_int(u64::from(*data_index), false).into()],
                )?;
            }
            Operator::MemoryCopy { dst_mem, src_mem } => {
                let len = self.pop()?;
                let src = self.pop()?;
                let dst = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[i32t.into(), i32t.into(), i32t.into(), i32t.into(), i32t.into()],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::MemCopy,
                    ty,
                    &[
                        i32t.const_int(u64::from(*dst_mem), false).into(),
                        i32t.const_int(u64::from(*src_mem), false).into(),
                        dst.into(),
                        src.into(),
                        len.into(),
                    ],
                )?;
            }
            Operator::MemoryFill { mem } => {
                let len = self.pop()?;
                let value = self.pop_int()?;
                let value = self
                    .builder
                    .build_int_truncate(value, self.ctx.i8_ty, "fill_byte")?;
                let off = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[i32t.into(), i32t.into(), self.ctx.i8_ty.into(), i32t.into()],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::MemFill,
                    ty,
                    &[
                        i32t.const_int(u64::from(*mem), false).into(),
                        off.into(),
                        value.into(),
                        len.into(),
                    ],
                )?;
            }

            Operator::TableGet { table } => {
                let idx = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self
                    .ctx
                    .i64x2_ty
                    .fn_type(&[i32t.into(), i32t.into()], false);
                let v = self.host_call_value(
                    Intrinsic::TableGet,
                    ty,
                    &[i32t.const_int(u64::from(*table), false).into(), idx.into()],
                )?;
                self.push(v);
            }
            Operator::TableSet { table } => {
                let value = self.pop()?;
                let idx = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.i64_ty.fn_type(
                    &[i32t.into(), i32t.into(), self.ctx.i64x2_ty.into()],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::TableSet,
                    ty,
                    &[
                        i32t.const_int(u64::from(*table), false).into(),
                        idx.into(),
                        value.into(),
                    ],
                )?;
            }
            Operator::TableInit { elem_index, table } => {
                let len = self.pop()?;
                let src = self.pop()?;
                let dst = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[i32t.into(), i32t.into(), i32t.into(), i32t.into(), i32t.into()],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::TableInit,
                    ty,
                    &[
                        i32t.const_int(u64::from(*table), false).into(),
                        i32t.const_int(u64::from(*elem_index), false).into(),
                        dst.into(),
                        src.into(),
                        len.into(),
                    ],
                )?;
            }
            Operator::ElemDrop { elem_index } => {
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(&[i32t.into()], false);
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::ElemDrop,
                    ty,
                    &[i32t.const_int(u64::from(*elem_index), false).into()],
                )?;
            }
            Operator::TableCopy {
                dst_table,
                src_table,
            } => {
                let len = self.pop()?;
                let src = self.pop()?;
                let dst = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = self.ctx.ll.void_type().fn_type(
                    &[i32t.into(), i32t.into(), i32t.into(), i32t.into(), i32t.into()],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::TableCopy,
                    ty,
                    &[
                        i32t.const_int(u64::from(*dst_table), false).into(),
                        i32t.const_int(u64::from(*src_table), false).into(),
                        dst.into(),
                        src.into(),
                        len.into(),
                    ],
                )?;
            }
            Operator::TableGrow { table } => {
                let delta = self.pop()?;
                let value = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = i32t.fn_type(
                    &[i32t.into(), self.ctx.i64x2_ty.into(), i32t.into()],
                    false,
                );
                let v = self.host_call_value(
                    Intrinsic::TableGrow,
                    ty,
                    &[
                        i32t.const_int(u64::from(*table), false).into(),
                        value.into(),
                        delta.into(),
                    ],
                )?;
                self.push(v);
            }
            Operator::TableSize { table } => {
                let i32t = self.ctx.i32_ty;
                let ty = i32t.fn_type(&[i32t.into()], false);
                let v = self.host_call_value(
                    Intrinsic::TableSize,
                    ty,
                    &[i32t.const_int(u64::from(*table), false).into()],
                )?;
                self.push(v);
            }
            Operator::TableFill { table } => {
                let len = self.pop()?;
                let value = self.pop()?;
                let off = self.pop()?;
                let i32t = self.ctx.i32_ty;
                let ty = i32t.fn_type(
                    &[i32t.into(), i32t.into(), self.ctx.i64x2_ty.into(), i32t.into()],
                    false,
                );
                self.ctx.call_intrinsic(
                    &self.builder,
                    Intrinsic::TableFill,
                    ty,
                    &[
                        i32t.const_int(u64::from(*table), false).into(),
                        off.into(),
                        value.into(),
                        len.into(),
                    ],
                )?;
            }

            _ => return Ok(false),
        }
        Ok(true)
    }

    // ── Shared lowering ──

    /// Effective address: zero-extended i32 address plus the static offset.
    pub(crate) fn effective_address(&mut self, memory_offset: u64) -> Result<IntValue<'ctx>> {
        let addr = self.pop_int()?;
        let mut off = self
            .builder
            .build_int_z_extend(addr, self.ctx.i64_ty, "addr")?;
        if memory_offset != 0 {
            off = self.builder.build_int_add(
                off,
                self.ctx.i64_ty.const_int(memory_offset, false),
                "addr_off",
            )?;
        }
        Ok(off)
    }

    /// Byte pointer into memory `mem` at `offset`.
    pub(crate) fn memory_pointer(
        &mut self,
        mem: u32,
        offset: IntValue<'ctx>,
    ) -> Result<inkwell::values::PointerValue<'ctx>> {
        let base = self.ctx.get_memory(&self.builder, self.exec_ctx, mem)?;
        Ok(unsafe {
            self.builder
                .build_in_bounds_gep(self.ctx.i8_ty, base, &[offset], "mem_ptr")?
        })
    }

    /// Load a value from memory; volatile, alignment forced to 1.
    pub(crate) fn load_from_memory(
        &mut self,
        memarg: &MemArg,
        load_ty: BasicTypeEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        let off = self.effective_address(memarg.offset)?;
        let ptr = self.memory_pointer(memarg.memory, off)?;
        let value = self.builder.build_load(load_ty, ptr, "load")?;
        let inst = value
            .as_instruction_value()
            .ok_or_else(|| anyhow!("load without an instruction"))?;
        inst.set_volatile(true).map_err(|e| anyhow!("volatile: {e}"))?;
        inst.set_alignment(1).map_err(|e| anyhow!("alignment: {e}"))?;
        Ok(value)
    }

    pub(crate) fn emit_load(&mut self, memarg: &MemArg, load_ty: BasicTypeEnum<'ctx>) -> Result<()> {
        let value = self.load_from_memory(memarg, load_ty)?;
        self.push(value);
        Ok(())
    }

    pub(crate) fn emit_load_extend(
        &mut self,
        memarg: &MemArg,
        load_ty: BasicTypeEnum<'ctx>,
        extend_ty: inkwell::types::IntType<'ctx>,
        signed: bool,
    ) -> Result<()> {
        let value = self.load_from_memory(memarg, load_ty)?.into_int_value();
        let value = if signed {
            self.builder.build_int_s_extend(value, extend_ty, "sext")?
        } else {
            self.builder.build_int_z_extend(value, extend_ty, "zext")?
        };
        self.push(value);
        Ok(())
    }

    /// Store the popped value; `trunc` narrows it to the store type first.
    pub(crate) fn emit_store(
        &mut self,
        memarg: &MemArg,
        store_ty: BasicTypeEnum<'ctx>,
        trunc: bool,
    ) -> Result<()> {
        let mut value = self.pop()?;
        if trunc {
            value = self
                .builder
                .build_int_truncate(
                    value.into_int_value(),
                    store_ty.into_int_type(),
                    "trunc",
                )?
                .into();
        }
        let off = self.effective_address(memarg.offset)?;
        let ptr = self.memory_pointer(memarg.memory, off)?;
        self.store_to_pointer(ptr, value)
    }

    pub(crate) fn store_to_pointer(
        &mut self,
        ptr: inkwell::values::PointerValue<'ctx>,
        value: BasicValueEnum<'ctx>,
    ) -> Result<()> {
        let inst = self.builder.build_store(ptr, value)?;
        inst.set_volatile(true).map_err(|e| anyhow!("volatile: {e}"))?;
        inst.set_alignment(1).map_err(|e| anyhow!("alignment: {e}"))?;
        Ok(())
    }

    /// Call a host intrinsic and take its single result.
    pub(crate) fn host_call_value(
        &mut self,
        intrinsic: Intrinsic,
        ty: inkwell::types::FunctionType<'ctx>,
        args: &[inkwell::values::BasicMetadataValueEnum<'ctx>],
    ) -> Result<BasicValueEnum<'ctx>> {
        self.ctx
            .call_intrinsic(&self.builder, intrinsic, ty, args)?
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| anyhow!("host intrinsic returned no value"))
    }
}
