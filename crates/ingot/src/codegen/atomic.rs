//! Atomic opcode lowering.
//!
//! Every atomic access first proves natural alignment of the effective
//! address (trapping otherwise) and then emits a sequentially-consistent
//! LLVM atomic. Wait and notify delegate to host intrinsics.

use anyhow::{anyhow, Result};
use inkwell::types::IntType;
use inkwell::values::IntValue;
use inkwell::{AtomicOrdering, AtomicRMWBinOp, IntPredicate};
use wasmparser::{MemArg, Operator};

use crate::codegen::function::FunctionCompiler;
use crate::error::TrapCode;
use crate::intrinsics::Intrinsic;

impl<'a, 'ctx> FunctionCompiler<'a, 'ctx> {
    pub(crate) fn translate_atomic(&mut self, op: &Operator) -> Result<bool> {
        use AtomicRMWBinOp as Rmw;
        let i32t = self.ctx.i32_ty;
        let i64t = self.ctx.i64_ty;
        let i8t = self.ctx.i8_ty;
        let i16t = self.ctx.i16_ty;
        match op {
            Operator::AtomicFence => {
                self.builder
                    .build_fence(AtomicOrdering::SequentiallyConsistent, "fence")?;
            }
            Operator::MemoryAtomicNotify { memarg } => self.atomic_notify(memarg)?,
            Operator::MemoryAtomicWait32 { memarg } => self.atomic_wait(memarg, 32)?,
            Operator::MemoryAtomicWait64 { memarg } => self.atomic_wait(memarg, 64)?,

            Operator::I32AtomicLoad { memarg } => self.atomic_load(memarg, i32t, i32t, true)?,
            Operator::I64AtomicLoad { memarg } => self.atomic_load(memarg, i64t, i64t, true)?,
            Operator::I32AtomicLoad8U { memarg } => self.atomic_load(memarg, i32t, i8t, false)?,
            Operator::I32AtomicLoad16U { memarg } => self.atomic_load(memarg, i32t, i16t, false)?,
            Operator::I64AtomicLoad8U { memarg } => self.atomic_load(memarg, i64t, i8t, false)?,
            Operator::I64AtomicLoad16U { memarg } => self.atomic_load(memarg, i64t, i16t, false)?,
            Operator::I64AtomicLoad32U { memarg } => self.atomic_load(memarg, i64t, i32t, false)?,

            Operator::I32AtomicStore { memarg } => self.atomic_store(memarg, i32t)?,
            Operator::I64AtomicStore { memarg } => self.atomic_store(memarg, i64t)?,
            Operator::I32AtomicStore8 { memarg } | Operator::I64AtomicStore8 { memarg } => {
                self.atomic_store(memarg, i8t)?
            }
            Operator::I32AtomicStore16 { memarg } | Operator::I64AtomicStore16 { memarg } => {
                self.atomic_store(memarg, i16t)?
            }
            Operator::I64AtomicStore32 { memarg } => self.atomic_store(memarg, i32t)?,

            Operator::I32AtomicRmwAdd { memarg } => {
                self.atomic_rmw(memarg, Rmw::Add, i32t, i32t, true)?
            }
            Operator::I64AtomicRmwAdd { memarg } => {
                self.atomic_rmw(memarg, Rmw::Add, i64t, i64t, true)?
            }
            Operator::I32AtomicRmw8AddU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Add, i32t, i8t, false)?
            }
            Operator::I32AtomicRmw16AddU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Add, i32t, i16t, false)?
            }
            Operator::I64AtomicRmw8AddU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Add, i64t, i8t, false)?
            }
            Operator::I64AtomicRmw16AddU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Add, i64t, i16t, false)?
            }
            Operator::I64AtomicRmw32AddU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Add, i64t, i32t, false)?
            }

            Operator::I32AtomicRmwSub { memarg } => {
                self.atomic_rmw(memarg, Rmw::Sub, i32t, i32t, true)?
            }
            Operator::I64AtomicRmwSub { memarg } => {
                self.atomic_rmw(memarg, Rmw::Sub, i64t, i64t, true)?
            }
            Operator::I32AtomicRmw8SubU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Sub, i32t, i8t, false)?
            }
            Operator::I32AtomicRmw16SubU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Sub, i32t, i16t, false)?
            }
            Operator::I64AtomicRmw8SubU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Sub, i64t, i8t, false)?
            }
            Operator::I64AtomicRmw16SubU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Sub, i64t, i16t, false)?
            }
            Operator::I64AtomicRmw32SubU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Sub, i64t, i32t, false)?
            }

            Operator::I32AtomicRmwAnd { memarg } => {
                self.atomic_rmw(memarg, Rmw::And, i32t, i32t, true)?
            }
            Operator::I64AtomicRmwAnd { memarg } => {
                self.atomic_rmw(memarg, Rmw::And, i64t, i64t, true)?
            }
            Operator::I32AtomicRmw8AndU { memarg } => {
                self.atomic_rmw(memarg, Rmw::And, i32t, i8t, false)?
            }
            Operator::I32AtomicRmw16AndU { memarg } => {
                self.atomic_rmw(memarg, Rmw::And, i32t, i16t, false)?
            }
            Operator::I64AtomicRmw8AndU { memarg } => {
                self.atomic_rmw(memarg, Rmw::And, i64t, i8t, false)?
            }
            Operator::I64AtomicRmw16AndU { memarg } => {
                self.atomic_rmw(memarg, Rmw::And, i64t, i16t, false)?
            }
            Operator::I64AtomicRmw32AndU { memarg } => {
                self.atomic_rmw(memarg, Rmw::And, i64t, i32t, false)?
            }

            Operator::I32AtomicRmwOr { memarg } => {
                self.atomic_rmw(memarg, Rmw::Or, i32t, i32t, true)?
            }
            Operator::I64AtomicRmwOr { memarg } => {
                self.atomic_rmw(memarg, Rmw::Or, i64t, i64t, true)?
            }
            Operator::I32AtomicRmw8OrU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Or, i32t, i8t, false)?
            }
            Operator::I32AtomicRmw16OrU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Or, i32t, i16t, false)?
            }
            Operator::I64AtomicRmw8OrU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Or, i64t, i8t, false)?
            }
            Operator::I64AtomicRmw16OrU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Or, i64t, i16t, false)?
            }
            Operator::I64AtomicRmw32OrU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Or, i64t, i32t, false)?
            }

            Operator::I32AtomicRmwXor { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xor, i32t, i32t, true)?
            }
            Operator::I64AtomicRmwXor { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xor, i64t, i64t, true)?
            }
            Operator::I32AtomicRmw8XorU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xor, i32t, i8t, false)?
            }
            Operator::I32AtomicRmw16XorU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xor, i32t, i16t, false)?
            }
            Operator::I64AtomicRmw8XorU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xor, i64t, i8t, false)?
            }
            Operator::I64AtomicRmw16XorU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xor, i64t, i16t, false)?
            }
            Operator::I64AtomicRmw32XorU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xor, i64t, i32t, false)?
            }

            Operator::I32AtomicRmwXchg { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xchg, i32t, i32t, true)?
            }
            Operator::I64AtomicRmwXchg { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xchg, i64t, i64t, true)?
            }
            Operator::I32AtomicRmw8XchgU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xchg, i32t, i8t, false)?
            }
            Operator::I32AtomicRmw16XchgU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xchg, i32t, i16t, false)?
            }
            Operator::I64AtomicRmw8XchgU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xchg, i64t, i8t, false)?
            }
            Operator::I64AtomicRmw16XchgU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xchg, i64t, i16t, false)?
            }
            Operator::I64AtomicRmw32XchgU { memarg } => {
                self.atomic_rmw(memarg, Rmw::Xchg, i64t, i32t, false)?
            }

            Operator::I32AtomicRmwCmpxchg { memarg } => {
                self.atomic_cmpxchg(memarg, i32t, i32t, true)?
            }
            Operator::I64AtomicRmwCmpxchg { memarg } => {
                self.atomic_cmpxchg(memarg, i64t, i64t, true)?
            }
            Operator::I32AtomicRmw8CmpxchgU { memarg } => {
                self.atomic_cmpxchg(memarg, i32t, i8t, false)?
            }
            Operator::I32AtomicRmw16CmpxchgU { memarg } => {
                self.atomic_cmpxchg(memarg, i32t, i16t, false)?
            }
            Operator::I64AtomicRmw8CmpxchgU { memarg } => {
                self.atomic_cmpxchg(memarg, i64t, i8t, false)?
            }
            Operator::I64AtomicRmw16CmpxchgU { memarg } => {
                self.atomic_cmpxchg(memarg, i64t, i16t, false)?
            }
            Operator::I64AtomicRmw32CmpxchgU { memarg } => {
                self.atomic_cmpxchg(memarg, i64t, i32t, false)?
            }

            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Trap unless `offset` is naturally aligned for the access width.
    fn check_alignment(&mut self, offset: IntValue<'ctx>, width_bits: u32) -> Result<()> {
        let mask = self
            .ctx
            .i64_ty
            .const_int(u64::from(width_bits / 8) - 1, false);
        let low = self.builder.build_and(offset, mask, "align_bits")?;
        let aligned = self.builder.build_int_compare(
            IntPredicate::EQ,
            low,
            self.ctx.i64_ty.const_zero(),
            "aligned",
        )?;
        self.trap_unless(aligned, TrapCode::UnalignedAtomicAccess)
    }

    /// Narrow or widen an integer to the access width.
    fn int_to_width(
        &mut self,
        value: IntValue<'ctx>,
        ty: IntType<'ctx>,
        signed: bool,
    ) -> Result<IntValue<'ctx>> {
        let from = value.get_type().get_bit_width();
        let to = ty.get_bit_width();
        Ok(if from == to {
            value
        } else if from > to {
            self.builder.build_int_truncate(value, ty, "narrow")?
        } else if signed {
            self.builder.build_int_s_extend(value, ty, "sext")?
        } else {
            self.builder.build_int_z_extend(value, ty, "zext")?
        })
    }

    fn extend_result(
        &mut self,
        value: IntValue<'ctx>,
        ty: IntType<'ctx>,
        signed: bool,
    ) -> Result<IntValue<'ctx>> {
        if value.get_type() == ty {
            return Ok(value);
        }
        Ok(if signed {
            self.builder.build_int_s_extend(value, ty, "sext")?
        } else {
            self.builder.build_int_z_extend(value, ty, "zext")?
        })
    }

    fn atomic_address(
        &mut self,
        memarg: &MemArg,
        width_bits: u32,
    ) -> Result<inkwell::values::PointerValue<'ctx>> {
        let off = self.effective_address(memarg.offset)?;
        self.check_alignment(off, width_bits)?;
        self.memory_pointer(memarg.memory, off)
    }

    fn atomic_load(
        &mut self,
        memarg: &MemArg,
        int_ty: IntType<'ctx>,
        target_ty: IntType<'ctx>,
        signed: bool,
    ) -> Result<()> {
        let ptr = self.atomic_address(memarg, target_ty.get_bit_width())?;
        let value = self.builder.build_load(target_ty, ptr, "atomic_load")?;
        let inst = value
            .as_instruction_value()
            .ok_or_else(|| anyhow!("load without an instruction"))?;
        inst.set_volatile(true).map_err(|e| anyhow!("volatile: {e}"))?;
        inst.set_alignment(target_ty.get_bit_width() / 8)
            .map_err(|e| anyhow!("alignment: {e}"))?;
        inst.set_atomic_ordering(AtomicOrdering::SequentiallyConsistent)
            .map_err(|e| anyhow!("ordering: {e}"))?;
        let value = self.extend_result(value.into_int_value(), int_ty, signed)?;
        self.push(value);
        Ok(())
    }

    fn atomic_store(&mut self, memarg: &MemArg, target_ty: IntType<'ctx>) -> Result<()> {
        let value = self.pop_int()?;
        let value = self.int_to_width(value, target_ty, true)?;
        let ptr = self.atomic_address(memarg, target_ty.get_bit_width())?;
        let inst = self.builder.build_store(ptr, value)?;
        inst.set_volatile(true).map_err(|e| anyhow!("volatile: {e}"))?;
        inst.set_alignment(target_ty.get_bit_width() / 8)
            .map_err(|e| anyhow!("alignment: {e}"))?;
        inst.set_atomic_ordering(AtomicOrdering::SequentiallyConsistent)
            .map_err(|e| anyhow!("ordering: {e}"))?;
        Ok(())
    }

    fn atomic_rmw(
        &mut self,
        memarg: &MemArg,
        bin_op: AtomicRMWBinOp,
        int_ty: IntType<'ctx>,
        target_ty: IntType<'ctx>,
        signed: bool,
    ) -> Result<()> {
        let value = self.pop_int()?;
        let value = self.int_to_width(value, target_ty, true)?;
        let ptr = self.atomic_address(memarg, target_ty.get_bit_width())?;
        let old = self.builder.build_atomicrmw(
            bin_op,
            ptr,
            value,
            AtomicOrdering::SequentiallyConsistent,
        )?;
        let old = self.extend_result(old, int_ty, signed)?;
        self.push(old);
        Ok(())
    }

    fn atomic_cmpxchg(
        &mut self,
        memarg: &MemArg,
        int_ty: IntType<'ctx>,
        target_ty: IntType<'ctx>,
        signed: bool,
    ) -> Result<()> {
        let replacement = self.pop_int()?;
        let replacement = self.int_to_width(replacement, target_ty, true)?;
        let expected = self.pop_int()?;
        let expected = self.int_to_width(expected, target_ty, true)?;
        let ptr = self.atomic_address(memarg, target_ty.get_bit_width())?;
        let pair = self.builder.build_cmpxchg(
            ptr,
            expected,
            replacement,
            AtomicOrdering::SequentiallyConsistent,
            AtomicOrdering::SequentiallyConsistent,
        )?;
        let old = self
            .builder
            .build_extract_value(pair, 0, "old")?
            .into_int_value();
        let old = self.extend_result(old, int_ty, signed)?;
        self.push(old);
        Ok(())
    }

    fn atomic_notify(&mut self, memarg: &MemArg) -> Result<()> {
        let count = self.pop()?;
        let offset = self.pop_int()?;
        let mut addr = self
            .builder
            .build_int_z_extend(offset, self.ctx.i64_ty, "addr")?;
        if memarg.offset != 0 {
            addr = self.builder.build_int_add(
                addr,
                self.ctx.i64_ty.const_int(memarg.offset, false),
                "addr_off",
            )?;
        }
        self.check_alignment(addr, 32)?;
        let i32t = self.ctx.i32_ty;
        let ty = i32t.fn_type(&[i32t.into(), i32t.into(), i32t.into()], false);
        let v = self.host_call_value(
            Intrinsic::MemAtomicNotify,
            ty,
            &[
                i32t.const_int(u64::from(memarg.memory), false).into(),
                offset.into(),
                count.into(),
            ],
        )?;
        self.push(v);
        Ok(())
    }

    fn atomic_wait(&mut self, memarg: &MemArg, width_bits: u32) -> Result<()> {
        let timeout = self.pop()?;
        let expected = self.pop_int()?;
        let expected = self.int_to_width(expected, self.ctx.i64_ty, false)?;
        let offset = self.pop_int()?;
        let mut addr = self
            .builder
            .build_int_z_extend(offset, self.ctx.i64_ty, "addr")?;
        if memarg.offset != 0 {
            addr = self.builder.build_int_add(
                addr,
                self.ctx.i64_ty.const_int(memarg.offset, false),
                "addr_off",
            )?;
        }
        self.check_alignment(addr, width_bits)?;
        let i32t = self.ctx.i32_ty;
        let i64t = self.ctx.i64_ty;
        let ty = i32t.fn_type(
            &[
                i32t.into(),
                i32t.into(),
                i64t.into(),
                i64t.into(),
                i32t.into(),
            ],
            false,
        );
        let v = self.host_call_value(
            Intrinsic::MemAtomicWait,
            ty,
            &[
                i32t.const_int(u64::from(memarg.memory), false).into(),
                offset.into(),
                expected.into(),
                timeout.into(),
                i32t.const_int(u64::from(width_bits), false).into(),
            ],
        )?;
        self.push(v);
        Ok(())
    }
}
