//! SIMD and relaxed-SIMD opcode lowering.
//!
//! Every vector is held on the operand stack as `<2 x i64>`; handlers bitcast
//! to the lane shape they need and back. Where a subtarget instruction maps
//! an operation exactly (pshufb/tbl1 swizzle, pmulhrsw/sqrdmulh Q15,
//! pavg/urhadd averages, the pmadd family for pairwise adds and dots) it is
//! used; every path also has a portable fallback so a generic binary stays
//! correct.

use anyhow::{anyhow, Result};
use inkwell::types::{BasicTypeEnum, VectorType};
use inkwell::values::{BasicValueEnum, VectorValue};
use inkwell::{FloatPredicate, IntPredicate};
use wasmparser::{MemArg, Operator};

use crate::codegen::context::TargetArch;
use crate::codegen::function::FunctionCompiler;

impl<'a, 'ctx> FunctionCompiler<'a, 'ctx> {
    pub(crate) fn translate_simd(&mut self, op: &Operator) -> Result<bool> {
        let i8x16 = self.ctx.i8x16_ty;
        let i16x8 = self.ctx.i16x8_ty;
        let i32x4 = self.ctx.i32x4_ty;
        let i64x2 = self.ctx.i64x2_ty;
        let f32x4 = self.ctx.f32x4_ty;
        let f64x2 = self.ctx.f64x2_ty;
        match op {
            // ── Memory ──
            Operator::V128Load { memarg } => {
                let v = self.load_from_memory(memarg, i64x2.into())?;
                self.push(v);
            }
            Operator::V128Load8x8S { memarg } => self.load_extend_vector(memarg, 8, 8, true)?,
            Operator::V128Load8x8U { memarg } => self.load_extend_vector(memarg, 8, 8, false)?,
            Operator::V128Load16x4S { memarg } => self.load_extend_vector(memarg, 16, 4, true)?,
            Operator::V128Load16x4U { memarg } => self.load_extend_vector(memarg, 16, 4, false)?,
            Operator::V128Load32x2S { memarg } => self.load_extend_vector(memarg, 32, 2, true)?,
            Operator::V128Load32x2U { memarg } => self.load_extend_vector(memarg, 32, 2, false)?,
            Operator::V128Load8Splat { memarg } => {
                let v = self.load_from_memory(memarg, self.ctx.i8_ty.into())?;
                let splat = self.splat_scalar(v, 16)?;
                self.push_canonical(splat)?;
            }
            Operator::V128Load16Splat { memarg } => {
                let v = self.load_from_memory(memarg, self.ctx.i16_ty.into())?;
                let splat = self.splat_scalar(v, 8)?;
                self.push_canonical(splat)?;
            }
            Operator::V128Load32Splat { memarg } => {
                let v = self.load_from_memory(memarg, self.ctx.i32_ty.into())?;
                let splat = self.splat_scalar(v, 4)?;
                self.push_canonical(splat)?;
            }
            Operator::V128Load64Splat { memarg } => {
                let v = self.load_from_memory(memarg, self.ctx.i64_ty.into())?;
                let splat = self.splat_scalar(v, 2)?;
                self.push_canonical(splat)?;
            }
            Operator::V128Load32Zero { memarg } => self.load_zero_pad(memarg, self.ctx.i32_ty)?,
            Operator::V128Load64Zero { memarg } => self.load_zero_pad(memarg, self.ctx.i64_ty)?,
            Operator::V128Store { memarg } => {
                self.emit_store(memarg, i64x2.into(), false)?;
            }
            Operator::V128Load8Lane { memarg, lane } => {
                self.load_lane(memarg, *lane, self.ctx.i8_ty.into(), i8x16)?
            }
            Operator::V128Load16Lane { memarg, lane } => {
                self.load_lane(memarg, *lane, self.ctx.i16_ty.into(), i16x8)?
            }
            Operator::V128Load32Lane { memarg, lane } => {
                self.load_lane(memarg, *lane, self.ctx.i32_ty.into(), i32x4)?
            }
            Operator::V128Load64Lane { memarg, lane } => {
                self.load_lane(memarg, *lane, self.ctx.i64_ty.into(), i64x2)?
            }
            Operator::V128Store8Lane { memarg, lane } => {
                self.store_lane(memarg, *lane, self.ctx.i8_ty.into(), i8x16)?
            }
            Operator::V128Store16Lane { memarg, lane } => {
                self.store_lane(memarg, *lane, self.ctx.i16_ty.into(), i16x8)?
            }
            Operator::V128Store32Lane { memarg, lane } => {
                self.store_lane(memarg, *lane, self.ctx.i32_ty.into(), i32x4)?
            }
            Operator::V128Store64Lane { memarg, lane } => {
                self.store_lane(memarg, *lane, self.ctx.i64_ty.into(), i64x2)?
            }

            // ── Const and shuffle ──
            Operator::V128Const { value } => {
                let bits = value.i128() as u128;
                let v = VectorType::const_vector(&[
                    self.ctx.i64_ty.const_int(bits as u64, false).into(),
                    self.ctx.i64_ty.const_int((bits >> 64) as u64, false).into(),
                ]);
                self.push(v);
            }
            Operator::I8x16Shuffle { lanes } => {
                let v2 = self.pop_vec(i8x16)?;
                let v1 = self.pop_vec(i8x16)?;
                let mask: Vec<u32> = lanes.iter().map(|l| u32::from(*l)).collect();
                let mask = self.const_mask(&mask);
                let v = self.builder.build_shuffle_vector(v1, v2, mask, "shuffle")?;
                self.push_canonical(v)?;
            }
            Operator::I8x16Swizzle | Operator::I8x16RelaxedSwizzle => self.swizzle()?,

            // ── Splats ──
            Operator::I8x16Splat => self.int_splat(self.ctx.i8_ty.into(), 16)?,
            Operator::I16x8Splat => self.int_splat(self.ctx.i16_ty.into(), 8)?,
            Operator::I32x4Splat => self.int_splat(self.ctx.i32_ty.into(), 4)?,
            Operator::I64x2Splat => self.int_splat(self.ctx.i64_ty.into(), 2)?,
            Operator::F32x4Splat => {
                let v = self.pop()?;
                let splat = self.splat_scalar(v, 4)?;
                self.push_canonical(splat)?;
            }
            Operator::F64x2Splat => {
                let v = self.pop()?;
                let splat = self.splat_scalar(v, 2)?;
                self.push_canonical(splat)?;
            }

            // ── Lane access ──
            Operator::I8x16ExtractLaneS { lane } => {
                self.extract_lane_extend(i8x16, *lane, true)?
            }
            Operator::I8x16ExtractLaneU { lane } => {
                self.extract_lane_extend(i8x16, *lane, false)?
            }
            Operator::I16x8ExtractLaneS { lane } => {
                self.extract_lane_extend(i16x8, *lane, true)?
            }
            Operator::I16x8ExtractLaneU { lane } => {
                self.extract_lane_extend(i16x8, *lane, false)?
            }
            Operator::I32x4ExtractLane { lane } => self.extract_lane(i32x4, *lane)?,
            Operator::I64x2ExtractLane { lane } => self.extract_lane(i64x2, *lane)?,
            Operator::F32x4ExtractLane { lane } => self.extract_lane(f32x4, *lane)?,
            Operator::F64x2ExtractLane { lane } => self.extract_lane(f64x2, *lane)?,
            Operator::I8x16ReplaceLane { lane } => self.replace_lane(i8x16, *lane, true)?,
            Operator::I16x8ReplaceLane { lane } => self.replace_lane(i16x8, *lane, true)?,
            Operator::I32x4ReplaceLane { lane } => self.replace_lane(i32x4, *lane, false)?,
            Operator::I64x2ReplaceLane { lane } => self.replace_lane(i64x2, *lane, false)?,
            Operator::F32x4ReplaceLane { lane } => self.replace_lane(f32x4, *lane, false)?,
            Operator::F64x2ReplaceLane { lane } => self.replace_lane(f64x2, *lane, false)?,

            // ── Integer comparisons ──
            Operator::I8x16Eq => self.vec_icmp(i8x16, IntPredicate::EQ)?,
            Operator::I8x16Ne => self.vec_icmp(i8x16, IntPredicate::NE)?,
            Operator::I8x16LtS => self.vec_icmp(i8x16, IntPredicate::SLT)?,
            Operator::I8x16LtU => self.vec_icmp(i8x16, IntPredicate::ULT)?,
            Operator::I8x16GtS => self.vec_icmp(i8x16, IntPredicate::SGT)?,
            Operator::I8x16GtU => self.vec_icmp(i8x16, IntPredicate::UGT)?,
            Operator::I8x16LeS => self.vec_icmp(i8x16, IntPredicate::SLE)?,
            Operator::I8x16LeU => self.vec_icmp(i8x16, IntPredicate::ULE)?,
            Operator::I8x16GeS => self.vec_icmp(i8x16, IntPredicate::SGE)?,
            Operator::I8x16GeU => self.vec_icmp(i8x16, IntPredicate::UGE)?,
            Operator::I16x8Eq => self.vec_icmp(i16x8, IntPredicate::EQ)?,
            Operator::I16x8Ne => self.vec_icmp(i16x8, IntPredicate::NE)?,
            Operator::I16x8LtS => self.vec_icmp(i16x8, IntPredicate::SLT)?,
            Operator::I16x8LtU => self.vec_icmp(i16x8, IntPredicate::ULT)?,
            Operator::I16x8GtS => self.vec_icmp(i16x8, IntPredicate::SGT)?,
            Operator::I16x8GtU => self.vec_icmp(i16x8, IntPredicate::UGT)?,
            Operator::I16x8LeS => self.vec_icmp(i16x8, IntPredicate::SLE)?,
            Operator::I16x8LeU => self.vec_icmp(i16x8, IntPredicate::ULE)?,
            Operator::I16x8GeS => self.vec_icmp(i16x8, IntPredicate::SGE)?,
            Operator::I16x8GeU => self.vec_icmp(i16x8, IntPredicate::UGE)?,
            Operator::I32x4Eq => self.vec_icmp(i32x4, IntPredicate::EQ)?,
            Operator::I32x4Ne => self.vec_icmp(i32x4, IntPredicate::NE)?,
            Operator::I32x4LtS => self.vec_icmp(i32x4, IntPredicate::SLT)?,
            Operator::I32x4LtU => self.vec_icmp(i32x4, IntPredicate::ULT)?,
            Operator::I32x4GtS => self.vec_icmp(i32x4, IntPredicate::SGT)?,
            Operator::I32x4GtU => self.vec_icmp(i32x4, IntPredicate::UGT)?,
            Operator::I32x4LeS => self.vec_icmp(i32x4, IntPredicate::SLE)?,
            Operator::I32x4LeU => self.vec_icmp(i32x4, IntPredicate::ULE)?,
            Operator::I32x4GeS => self.vec_icmp(i32x4, IntPredicate::SGE)?,
            Operator::I32x4GeU => self.vec_icmp(i32x4, IntPredicate::UGE)?,
            Operator::I64x2Eq => self.vec_icmp(i64x2, IntPredicate::EQ)?,
            Operator::I64x2Ne => self.vec_icmp(i64x2, IntPredicate::NE)?,
            Operator::I64x2LtS => self.vec_icmp(i64x2, IntPredicate::SLT)?,
            Operator::I64x2GtS => self.vec_icmp(i64x2, IntPredicate::SGT)?,
            Operator::I64x2LeS => self.vec_icmp(i64x2, IntPredicate::SLE)?,
            Operator::I64x2GeS => self.vec_icmp(i64x2, IntPredicate::SGE)?,

            // ── Float comparisons ──
            Operator::F32x4Eq => self.vec_fcmp(f32x4, i32x4, FloatPredicate::OEQ)?,
            Operator::F32x4Ne => self.vec_fcmp(f32x4, i32x4, FloatPredicate::UNE)?,
            Operator::F32x4Lt => self.vec_fcmp(f32x4, i32x4, FloatPredicate::OLT)?,
            Operator::F32x4Gt => self.vec_fcmp(f32x4, i32x4, FloatPredicate::OGT)?,
            Operator::F32x4Le => self.vec_fcmp(f32x4, i32x4, FloatPredicate::OLE)?,
            Operator::F32x4Ge => self.vec_fcmp(f32x4, i32x4, FloatPredicate::OGE)?,
            Operator::F64x2Eq => self.vec_fcmp(f64x2, i64x2, FloatPredicate::OEQ)?,
            Operator::F64x2Ne => self.vec_fcmp(f64x2, i64x2, FloatPredicate::UNE)?,
            Operator::F64x2Lt => self.vec_fcmp(f64x2, i64x2, FloatPredicate::OLT)?,
            Operator::F64x2Gt => self.vec_fcmp(f64x2, i64x2, FloatPredicate::OGT)?,
            Operator::F64x2Le => self.vec_fcmp(f64x2, i64x2, FloatPredicate::OLE)?,
            Operator::F64x2Ge => self.vec_fcmp(f64x2, i64x2, FloatPredicate::OGE)?,

            // ── Bitwise ──
            Operator::V128Not => {
                let v = self.pop_vec(i64x2)?;
                let v = self.builder.build_not(v, "not")?;
                self.push(v);
            }
            Operator::V128And => {
                let (lhs, rhs) = self.pop_vec_pair(i64x2)?;
                let v = self.builder.build_and(lhs, rhs, "and")?;
                self.push(v);
            }
            Operator::V128AndNot => {
                let (lhs, rhs) = self.pop_vec_pair(i64x2)?;
                let rhs = self.builder.build_not(rhs, "not")?;
                let v = self.builder.build_and(lhs, rhs, "andnot")?;
                self.push(v);
            }
            Operator::V128Or => {
                let (lhs, rhs) = self.pop_vec_pair(i64x2)?;
                let v = self.builder.build_or(lhs, rhs, "or")?;
                self.push(v);
            }
            Operator::V128Xor => {
                let (lhs, rhs) = self.pop_vec_pair(i64x2)?;
                let v = self.builder.build_xor(lhs, rhs, "xor")?;
                self.push(v);
            }
            Operator::V128Bitselect => {
                let mask = self.pop_vec(i64x2)?;
                let v2 = self.pop_vec(i64x2)?;
                let v1 = self.pop_vec(i64x2)?;
                let hit = self.builder.build_and(v1, mask, "sel_hi")?;
                let not_mask = self.builder.build_not(mask, "sel_notm")?;
                let miss = self.builder.build_and(v2, not_mask, "sel_lo")?;
                let v = self.builder.build_or(hit, miss, "bitselect")?;
                self.push(v);
            }
            Operator::I8x16RelaxedLaneselect
            | Operator::I16x8RelaxedLaneselect
            | Operator::I32x4RelaxedLaneselect
            | Operator::I64x2RelaxedLaneselect => {
                let mask = self.pop_vec(i64x2)?;
                let v2 = self.pop_vec(i64x2)?;
                let v1 = self.pop_vec(i64x2)?;
                let mixed = self.builder.build_xor(v1, v2, "ls_mix")?;
                let masked = self.builder.build_and(mixed, mask, "ls_pick")?;
                let v = self.builder.build_xor(masked, v2, "laneselect")?;
                self.push(v);
            }
            Operator::V128AnyTrue => {
                let v = self.pop()?;
                let bits = self
                    .builder
                    .build_bit_cast(v, self.ctx.i128_ty, "bits")?
                    .into_int_value();
                let any = self.builder.build_int_compare(
                    IntPredicate::NE,
                    bits,
                    self.ctx.i128_ty.const_zero(),
                    "any_true",
                )?;
                let v = self
                    .builder
                    .build_int_z_extend(any, self.ctx.i32_ty, "any32")?;
                self.push(v);
            }
            Operator::I8x16AllTrue => self.all_true(i8x16)?,
            Operator::I16x8AllTrue => self.all_true(i16x8)?,
            Operator::I32x4AllTrue => self.all_true(i32x4)?,
            Operator::I64x2AllTrue => self.all_true(i64x2)?,
            Operator::I8x16Bitmask => self.bitmask(i8x16)?,
            Operator::I16x8Bitmask => self.bitmask(i16x8)?,
            Operator::I32x4Bitmask => self.bitmask(i32x4)?,
            Operator::I64x2Bitmask => self.bitmask(i64x2)?,

            // ── Integer lanewise ──
            Operator::I8x16Abs => self.vec_abs(i8x16)?,
            Operator::I16x8Abs => self.vec_abs(i16x8)?,
            Operator::I32x4Abs => self.vec_abs(i32x4)?,
            Operator::I64x2Abs => self.vec_abs(i64x2)?,
            Operator::I8x16Neg => self.vec_neg(i8x16)?,
            Operator::I16x8Neg => self.vec_neg(i16x8)?,
            Operator::I32x4Neg => self.vec_neg(i32x4)?,
            Operator::I64x2Neg => self.vec_neg(i64x2)?,
            Operator::I8x16Popcnt => {
                let v = self.pop_vec(i8x16)?;
                let f = self.ctx.llvm_intrinsic(
                    "llvm.ctpop.v16i8",
                    i8x16.fn_type(&[i8x16.into()], false),
                );
                let v = self.call_value(f, &[v.into()])?;
                self.push_canonical(v.into_vector_value())?;
            }

            Operator::I8x16Add => self.vec_add(i8x16)?,
            Operator::I16x8Add => self.vec_add(i16x8)?,
            Operator::I32x4Add => self.vec_add(i32x4)?,
            Operator::I64x2Add => self.vec_add(i64x2)?,
            Operator::I8x16Sub => self.vec_sub(i8x16)?,
            Operator::I16x8Sub => self.vec_sub(i16x8)?,
            Operator::I32x4Sub => self.vec_sub(i32x4)?,
            Operator::I64x2Sub => self.vec_sub(i64x2)?,
            Operator::I16x8Mul => self.vec_mul(i16x8)?,
            Operator::I32x4Mul => self.vec_mul(i32x4)?,
            Operator::I64x2Mul => self.vec_mul(i64x2)?,

            Operator::I8x16AddSatS => self.vec_sat("sadd.sat", i8x16, "v16i8")?,
            Operator::I8x16AddSatU => self.vec_sat("uadd.sat", i8x16, "v16i8")?,
            Operator::I16x8AddSatS => self.vec_sat("sadd.sat", i16x8, "v8i16")?,
            Operator::I16x8AddSatU => self.vec_sat("uadd.sat", i16x8, "v8i16")?,
            Operator::I8x16SubSatS => self.vec_sat("ssub.sat", i8x16, "v16i8")?,
            Operator::I8x16SubSatU => self.vec_sat("usub.sat", i8x16, "v16i8")?,
            Operator::I16x8SubSatS => self.vec_sat("ssub.sat", i16x8, "v8i16")?,
            Operator::I16x8SubSatU => self.vec_sat("usub.sat", i16x8, "v8i16")?,

            Operator::I8x16MinS => self.vec_min_max(i8x16, IntPredicate::SLE)?,
            Operator::I8x16MinU => self.vec_min_max(i8x16, IntPredicate::ULE)?,
            Operator::I8x16MaxS => self.vec_min_max(i8x16, IntPredicate::SGE)?,
            Operator::I8x16MaxU => self.vec_min_max(i8x16, IntPredicate::UGE)?,
            Operator::I16x8MinS => self.vec_min_max(i16x8, IntPredicate::SLE)?,
            Operator::I16x8MinU => self.vec_min_max(i16x8, IntPredicate::ULE)?,
            Operator::I16x8MaxS => self.vec_min_max(i16x8, IntPredicate::SGE)?,
            Operator::I16x8MaxU => self.vec_min_max(i16x8, IntPredicate::UGE)?,
            Operator::I32x4MinS => self.vec_min_max(i32x4, IntPredicate::SLE)?,
            Operator::I32x4MinU => self.vec_min_max(i32x4, IntPredicate::ULE)?,
            Operator::I32x4MaxS => self.vec_min_max(i32x4, IntPredicate::SGE)?,
            Operator::I32x4MaxU => self.vec_min_max(i32x4, IntPredicate::UGE)?,

            Operator::I8x16AvgrU => self.vec_avgr(i8x16)?,
            Operator::I16x8AvgrU => self.vec_avgr(i16x8)?,

            Operator::I8x16Shl => self.vec_shift(i8x16, ShiftKind::Left)?,
            Operator::I8x16ShrS => self.vec_shift(i8x16, ShiftKind::ArithRight)?,
            Operator::I8x16ShrU => self.vec_shift(i8x16, ShiftKind::LogicalRight)?,
            Operator::I16x8Shl => self.vec_shift(i16x8, ShiftKind::Left)?,
            Operator::I16x8ShrS => self.vec_shift(i16x8, ShiftKind::ArithRight)?,
            Operator::I16x8ShrU => self.vec_shift(i16x8, ShiftKind::LogicalRight)?,
            Operator::I32x4Shl => self.vec_shift(i32x4, ShiftKind::Left)?,
            Operator::I32x4ShrS => self.vec_shift(i32x4, ShiftKind::ArithRight)?,
            Operator::I32x4ShrU => self.vec_shift(i32x4, ShiftKind::LogicalRight)?,
            Operator::I64x2Shl => self.vec_shift(i64x2, ShiftKind::Left)?,
            Operator::I64x2ShrS => self.vec_shift(i64x2, ShiftKind::ArithRight)?,
            Operator::I64x2ShrU => self.vec_shift(i64x2, ShiftKind::LogicalRight)?,

            // ── Narrow / extend / widen arithmetic ──
            Operator::I8x16NarrowI16x8S => self.narrow(i16x8, true)?,
            Operator::I8x16NarrowI16x8U => self.narrow(i16x8, false)?,
            Operator::I16x8NarrowI32x4S => self.narrow(i32x4, true)?,
            Operator::I16x8NarrowI32x4U => self.narrow(i32x4, false)?,
            Operator::I16x8ExtendLowI8x16S => self.extend_half(i8x16, true, true)?,
            Operator::I16x8ExtendHighI8x16S => self.extend_half(i8x16, true, false)?,
            Operator::I16x8ExtendLowI8x16U => self.extend_half(i8x16, false, true)?,
            Operator::I16x8ExtendHighI8x16U => self.extend_half(i8x16, false, false)?,
            Operator::I32x4ExtendLowI16x8S => self.extend_half(i16x8, true, true)?,
            Operator::I32x4ExtendHighI16x8S => self.extend_half(i16x8, true, false)?,
            Operator::I32x4ExtendLowI16x8U => self.extend_half(i16x8, false, true)?,
            Operator::I32x4ExtendHighI16x8U => self.extend_half(i16x8, false, false)?,
            Operator::I64x2ExtendLowI32x4S => self.extend_half(i32x4, true, true)?,
            Operator::I64x2ExtendHighI32x4S => self.extend_half(i32x4, true, false)?,
            Operator::I64x2ExtendLowI32x4U => self.extend_half(i32x4, false, true)?,
            Operator::I64x2ExtendHighI32x4U => self.extend_half(i32x4, false, false)?,
            Operator::I16x8ExtMulLowI8x16S => self.ext_mul(i8x16, true, true)?,
            Operator::I16x8ExtMulHighI8x16S => self.ext_mul(i8x16, true, false)?,
            Operator::I16x8ExtMulLowI8x16U => self.ext_mul(i8x16, false, true)?,
            Operator::I16x8ExtMulHighI8x16U => self.ext_mul(i8x16, false, false)?,
            Operator::I32x4ExtMulLowI16x8S => self.ext_mul(i16x8, true, true)?,
            Operator::I32x4ExtMulHighI16x8S => self.ext_mul(i16x8, true, false)?,
            Operator::I32x4ExtMulLowI16x8U => self.ext_mul(i16x8, false, true)?,
            Operator::I32x4ExtMulHighI16x8U => self.ext_mul(i16x8, false, false)?,
            Operator::I64x2ExtMulLowI32x4S => self.ext_mul(i32x4, true, true)?,
            Operator::I64x2ExtMulHighI32x4S => self.ext_mul(i32x4, true, false)?,
            Operator::I64x2ExtMulLowI32x4U => self.ext_mul(i32x4, false, true)?,
            Operator::I64x2ExtMulHighI32x4U => self.ext_mul(i32x4, false, false)?,
            Operator::I16x8ExtAddPairwiseI8x16S => self.ext_add_pairwise(i8x16, true)?,
            Operator::I16x8ExtAddPairwiseI8x16U => self.ext_add_pairwise(i8x16, false)?,
            Operator::I32x4ExtAddPairwiseI16x8S => self.ext_add_pairwise(i16x8, true)?,
            Operator::I32x4ExtAddPairwiseI16x8U => self.ext_add_pairwise(i16x8, false)?,

            Operator::I16x8Q15MulrSatS | Operator::I16x8RelaxedQ15mulrS => self.q15_mul_sat()?,
            Operator::I32x4DotI16x8S => self.dot_i16x8()?,
            Operator::I16x8RelaxedDotI8x16I7x16S => self.relaxed_dot()?,
            Operator::I32x4RelaxedDotI8x16I7x16AddS => self.relaxed_dot_add()?,

            // ── Float lanewise ──
            Operator::F32x4Abs => self.vec_float_unary(f32x4, "fabs", "v4f32")?,
            Operator::F64x2Abs => self.vec_float_unary(f64x2, "fabs", "v2f64")?,
            Operator::F32x4Neg => {
                let v = self.pop_vec(f32x4)?;
                let v = self.builder.build_float_neg(v, "fneg")?;
                self.push_canonical(v)?;
            }
            Operator::F64x2Neg => {
                let v = self.pop_vec(f64x2)?;
                let v = self.builder.build_float_neg(v, "fneg")?;
                self.push_canonical(v)?;
            }
            Operator::F32x4Sqrt => self.vec_float_unary(f32x4, "sqrt", "v4f32")?,
            Operator::F64x2Sqrt => self.vec_float_unary(f64x2, "sqrt", "v2f64")?,
            Operator::F32x4Ceil => self.vec_float_unary(f32x4, "ceil", "v4f32")?,
            Operator::F64x2Ceil => self.vec_float_unary(f64x2, "ceil", "v2f64")?,
            Operator::F32x4Floor => self.vec_float_unary(f32x4, "floor", "v4f32")?,
            Operator::F64x2Floor => self.vec_float_unary(f64x2, "floor", "v2f64")?,
            Operator::F32x4Trunc => self.vec_float_unary(f32x4, "trunc", "v4f32")?,
            Operator::F64x2Trunc => self.vec_float_unary(f64x2, "trunc", "v2f64")?,
            Operator::F32x4Nearest => self.vec_nearest(f32x4)?,
            Operator::F64x2Nearest => self.vec_nearest(f64x2)?,

            Operator::F32x4Add => self.vec_fadd(f32x4)?,
            Operator::F64x2Add => self.vec_fadd(f64x2)?,
            Operator::F32x4Sub => self.vec_fsub(f32x4)?,
            Operator::F64x2Sub => self.vec_fsub(f64x2)?,
            Operator::F32x4Mul => self.vec_fmul(f32x4)?,
            Operator::F64x2Mul => self.vec_fmul(f64x2)?,
            Operator::F32x4Div => self.vec_fdiv(f32x4)?,
            Operator::F64x2Div => self.vec_fdiv(f64x2)?,

            Operator::F32x4Min | Operator::F32x4RelaxedMin => self.vec_fmin_fmax(f32x4, true)?,
            Operator::F64x2Min | Operator::F64x2RelaxedMin => self.vec_fmin_fmax(f64x2, true)?,
            Operator::F32x4Max | Operator::F32x4RelaxedMax => self.vec_fmin_fmax(f32x4, false)?,
            Operator::F64x2Max | Operator::F64x2RelaxedMax => self.vec_fmin_fmax(f64x2, false)?,
            Operator::F32x4PMin => self.vec_pmin_pmax(f32x4, true)?,
            Operator::F64x2PMin => self.vec_pmin_pmax(f64x2, true)?,
            Operator::F32x4PMax => self.vec_pmin_pmax(f32x4, false)?,
            Operator::F64x2PMax => self.vec_pmin_pmax(f64x2, false)?,

            Operator::F32x4RelaxedMadd => self.vec_madd(f32x4, false)?,
            Operator::F32x4RelaxedNmadd => self.vec_madd(f32x4, true)?,
            Operator::F64x2RelaxedMadd => self.vec_madd(f64x2, false)?,
            Operator::F64x2RelaxedNmadd => self.vec_madd(f64x2, true)?,

            // ── Conversions ──
            Operator::I32x4TruncSatF32x4S | Operator::I32x4RelaxedTruncF32x4S => {
                self.vec_trunc_sat_s(f32x4, false)?
            }
            Operator::I32x4TruncSatF32x4U | Operator::I32x4RelaxedTruncF32x4U => {
                self.vec_trunc_sat_u(f32x4, false)?
            }
            Operator::I32x4TruncSatF64x2SZero | Operator::I32x4RelaxedTruncF64x2SZero => {
                self.vec_trunc_sat_s(f64x2, true)?
            }
            Operator::I32x4TruncSatF64x2UZero | Operator::I32x4RelaxedTruncF64x2UZero => {
                self.vec_trunc_sat_u(f64x2, true)?
            }
            Operator::F32x4ConvertI32x4S => {
                let v = self.pop_vec(i32x4)?;
                let v = self.builder.build_signed_int_to_float(v, f32x4, "cvt")?;
                self.push_canonical(v)?;
            }
            Operator::F32x4ConvertI32x4U => {
                let v = self.pop_vec(i32x4)?;
                let v = self.builder.build_unsigned_int_to_float(v, f32x4, "cvt")?;
                self.push_canonical(v)?;
            }
            Operator::F64x2ConvertLowI32x4S => {
                let v = self.low_half(i32x4)?;
                let f64v2 = self.ctx.f64_ty.vec_type(2);
                let v = self.builder.build_signed_int_to_float(v, f64v2, "cvt")?;
                self.push_canonical(v)?;
            }
            Operator::F64x2ConvertLowI32x4U => {
                let v = self.low_half(i32x4)?;
                let f64v2 = self.ctx.f64_ty.vec_type(2);
                let v = self.builder.build_unsigned_int_to_float(v, f64v2, "cvt")?;
                self.push_canonical(v)?;
            }
            Operator::F32x4DemoteF64x2Zero => {
                let v = self.pop_vec(f64x2)?;
                let f32v2 = self.ctx.f32_ty.vec_type(2);
                let demoted = self
                    .builder
                    .build_float_trunc(v, f32v2, "demote")?;
                let zero = f32v2.const_zero();
                let mask = self.const_mask(&[0, 1, 2, 3]);
                let v = self
                    .builder
                    .build_shuffle_vector(demoted, zero, mask, "demote_pad")?;
                self.push_canonical(v)?;
            }
            Operator::F64x2PromoteLowF32x4 => {
                let v = self.pop_vec(f32x4)?;
                let mask = self.const_mask(&[0, 1]);
                let low = self
                    .builder
                    .build_shuffle_vector(v, f32x4.get_undef(), mask, "low")?;
                let v = self
                    .builder
                    .build_float_ext(low, self.ctx.f64_ty.vec_type(2), "promote")?;
                self.push_canonical(v)?;
            }

            _ => return Ok(false),
        }
        Ok(true)
    }

    // ── Canonical-form plumbing ──

    pub(crate) fn pop_vec(&mut self, ty: VectorType<'ctx>) -> Result<VectorValue<'ctx>> {
        let v = self.pop()?;
        Ok(self
            .builder
            .build_bit_cast(v, ty, "lanes")?
            .into_vector_value())
    }

    fn pop_vec_pair(
        &mut self,
        ty: VectorType<'ctx>,
    ) -> Result<(VectorValue<'ctx>, VectorValue<'ctx>)> {
        let rhs = self.pop_vec(ty)?;
        let lhs = self.pop_vec(ty)?;
        Ok((lhs, rhs))
    }

    /// Bitcast back to the `<2 x i64>` stack form and push.
    pub(crate) fn push_canonical(&mut self, v: VectorValue<'ctx>) -> Result<()> {
        let v = self.builder.build_bit_cast(v, self.ctx.i64x2_ty, "v128")?;
        self.push(v);
        Ok(())
    }

    fn const_mask(&self, lanes: &[u32]) -> VectorValue<'ctx> {
        let consts: Vec<BasicValueEnum> = lanes
            .iter()
            .map(|l| self.ctx.i32_ty.const_int(u64::from(*l), false).into())
            .collect();
        VectorType::const_vector(&consts)
    }

    fn const_splat(&self, ty: VectorType<'ctx>, value: u64) -> VectorValue<'ctx> {
        let elem = ty.get_element_type().into_int_type();
        let consts: Vec<BasicValueEnum> = (0..ty.get_size())
            .map(|_| elem.const_int(value, false).into())
            .collect();
        VectorType::const_vector(&consts)
    }

    /// Broadcast a scalar into every lane via insert + zero-mask shuffle.
    fn splat_scalar(
        &mut self,
        scalar: BasicValueEnum<'ctx>,
        count: u32,
    ) -> Result<VectorValue<'ctx>> {
        let vec_ty = match scalar.get_type() {
            BasicTypeEnum::IntType(t) => t.vec_type(count),
            BasicTypeEnum::FloatType(t) => t.vec_type(count),
            other => return Err(anyhow!("cannot splat {other:?}")),
        };
        let seeded = self.builder.build_insert_element(
            vec_ty.get_undef(),
            scalar,
            self.ctx.i64_ty.const_zero(),
            "lane0",
        )?;
        let mask = self.const_mask(&vec![0; count as usize]);
        Ok(self
            .builder
            .build_shuffle_vector(seeded, vec_ty.get_undef(), mask, "splat")?)
    }

    fn int_splat(&mut self, elem: BasicTypeEnum<'ctx>, count: u32) -> Result<()> {
        let v = self.pop_int()?;
        let elem = elem.into_int_type();
        let v = if v.get_type().get_bit_width() > elem.get_bit_width() {
            self.builder.build_int_truncate(v, elem, "lane")?
        } else {
            v
        };
        let splat = self.splat_scalar(v.into(), count)?;
        self.push_canonical(splat)
    }

    // ── Memory helpers ──

    fn load_extend_vector(
        &mut self,
        memarg: &MemArg,
        lane_bits: u32,
        lanes: u32,
        signed: bool,
    ) -> Result<()> {
        let narrow_elem = self.ctx.ll.custom_width_int_type(lane_bits);
        let wide_elem = self.ctx.ll.custom_width_int_type(lane_bits * 2);
        let narrow = narrow_elem.vec_type(lanes);
        let wide = wide_elem.vec_type(lanes);
        let v = self
            .load_from_memory(memarg, narrow.into())?
            .into_vector_value();
        let v = if signed {
            self.builder.build_int_s_extend(v, wide, "sext")?
        } else {
            self.builder.build_int_z_extend(v, wide, "zext")?
        };
        self.push_canonical(v)
    }

    fn load_zero_pad(&mut self, memarg: &MemArg, ty: inkwell::types::IntType<'ctx>) -> Result<()> {
        let v = self.load_from_memory(memarg, ty.into())?.into_int_value();
        let wide = self
            .builder
            .build_int_z_extend(v, self.ctx.i128_ty, "pad")?;
        let v = self
            .builder
            .build_bit_cast(wide, self.ctx.i64x2_ty, "v128")?;
        self.push(v);
        Ok(())
    }

    fn load_lane(
        &mut self,
        memarg: &MemArg,
        lane: u8,
        scalar_ty: BasicTypeEnum<'ctx>,
        vec_ty: VectorType<'ctx>,
    ) -> Result<()> {
        let vector = self.pop_vec(vec_ty)?;
        let value = self.load_from_memory(memarg, scalar_ty)?;
        let v = self.builder.build_insert_element(
            vector,
            value,
            self.ctx.i64_ty.const_int(u64::from(lane), false),
            "lane",
        )?;
        self.push_canonical(v)
    }

    fn store_lane(
        &mut self,
        memarg: &MemArg,
        lane: u8,
        scalar_ty: BasicTypeEnum<'ctx>,
        vec_ty: VectorType<'ctx>,
    ) -> Result<()> {
        let vector = self.pop_vec(vec_ty)?;
        let value = self.builder.build_extract_element(
            vector,
            self.ctx.i64_ty.const_int(u64::from(lane), false),
            "lane",
        )?;
        self.push(value);
        self.emit_store(memarg, scalar_ty, false)
    }

    // ── Lane access ──

    fn extract_lane(&mut self, ty: VectorType<'ctx>, lane: u8) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let v = self.builder.build_extract_element(
            v,
            self.ctx.i64_ty.const_int(u64::from(lane), false),
            "lane",
        )?;
        self.push(v);
        Ok(())
    }

    fn extract_lane_extend(&mut self, ty: VectorType<'ctx>, lane: u8, signed: bool) -> Result<()> {
        self.extract_lane(ty, lane)?;
        let v = self.pop_int()?;
        let v = if signed {
            self.builder.build_int_s_extend(v, self.ctx.i32_ty, "sext")?
        } else {
            self.builder.build_int_z_extend(v, self.ctx.i32_ty, "zext")?
        };
        self.push(v);
        Ok(())
    }

    fn replace_lane(&mut self, ty: VectorType<'ctx>, lane: u8, trunc: bool) -> Result<()> {
        let mut value = self.pop()?;
        if trunc {
            value = self
                .builder
                .build_int_truncate(
                    value.into_int_value(),
                    ty.get_element_type().into_int_type(),
                    "lane_val",
                )?
                .into();
        }
        let vector = self.pop_vec(ty)?;
        let v = self.builder.build_insert_element(
            vector,
            value,
            self.ctx.i64_ty.const_int(u64::from(lane), false),
            "replace",
        )?;
        self.push_canonical(v)
    }

    // ── Comparisons and reductions ──

    fn vec_icmp(&mut self, ty: VectorType<'ctx>, pred: IntPredicate) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let cmp = self.builder.build_int_compare(pred, lhs, rhs, "cmp")?;
        let v = self.builder.build_int_s_extend(cmp, ty, "mask")?;
        self.push_canonical(v)
    }

    fn vec_fcmp(
        &mut self,
        ty: VectorType<'ctx>,
        result_ty: VectorType<'ctx>,
        pred: FloatPredicate,
    ) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let cmp = self.builder.build_float_compare(pred, lhs, rhs, "fcmp")?;
        let v = self.builder.build_int_s_extend(cmp, result_ty, "mask")?;
        self.push_canonical(v)
    }

    fn all_true(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let zero = ty.const_zero();
        let any_zero = self
            .builder
            .build_int_compare(IntPredicate::EQ, v, zero, "lane_zero")?;
        let bits_ty = self.ctx.ll.custom_width_int_type(ty.get_size());
        let bits = self
            .builder
            .build_bit_cast(any_zero, bits_ty, "bits")?
            .into_int_value();
        let all = self.builder.build_int_compare(
            IntPredicate::EQ,
            bits,
            bits_ty.const_zero(),
            "all_true",
        )?;
        let v = self
            .builder
            .build_int_z_extend(all, self.ctx.i32_ty, "all32")?;
        self.push(v);
        Ok(())
    }

    fn bitmask(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let zero = ty.const_zero();
        let negative = self
            .builder
            .build_int_compare(IntPredicate::SLT, v, zero, "sign")?;
        let bits_ty = self.ctx.ll.custom_width_int_type(ty.get_size());
        let bits = self
            .builder
            .build_bit_cast(negative, bits_ty, "bits")?
            .into_int_value();
        let v = self
            .builder
            .build_int_z_extend(bits, self.ctx.i32_ty, "bitmask")?;
        self.push(v);
        Ok(())
    }

    // ── Integer lanewise ──

    fn vec_abs(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let zero = ty.const_zero();
        let negative = self
            .builder
            .build_int_compare(IntPredicate::SLT, v, zero, "neg")?;
        let negated = self.builder.build_int_neg(v, "negated")?;
        let v = self
            .builder
            .build_select(negative, negated, v, "abs")?
            .into_vector_value();
        self.push_canonical(v)
    }

    fn vec_neg(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let v = self.builder.build_int_neg(v, "neg")?;
        self.push_canonical(v)
    }

    fn vec_add(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let v = self.builder.build_int_add(lhs, rhs, "add")?;
        self.push_canonical(v)
    }

    fn vec_sub(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let v = self.builder.build_int_sub(lhs, rhs, "sub")?;
        self.push_canonical(v)
    }

    fn vec_mul(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let v = self.builder.build_int_mul(lhs, rhs, "mul")?;
        self.push_canonical(v)
    }

    fn vec_sat(&mut self, base: &str, ty: VectorType<'ctx>, suffix: &str) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.{base}.{suffix}"),
            ty.fn_type(&[ty.into(), ty.into()], false),
        );
        let v = self.call_value(f, &[lhs.into(), rhs.into()])?;
        self.push_canonical(v.into_vector_value())
    }

    fn vec_min_max(&mut self, ty: VectorType<'ctx>, pred: IntPredicate) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let keep_lhs = self.builder.build_int_compare(pred, lhs, rhs, "pick")?;
        let v = self
            .builder
            .build_select(keep_lhs, lhs, rhs, "minmax")?
            .into_vector_value();
        self.push_canonical(v)
    }

    /// Unsigned rounding average: pavg/urhadd when present, widened
    /// `(a + b + 1) >> 1` otherwise.
    fn vec_avgr(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let lane_bits = ty.get_element_type().into_int_type().get_bit_width();
        if self.ctx.arch == TargetArch::X86_64 && self.ctx.subtarget.sse2 {
            let name = if lane_bits == 8 {
                "llvm.x86.sse2.pavg.b"
            } else {
                "llvm.x86.sse2.pavg.w"
            };
            let f = self
                .ctx
                .llvm_intrinsic(name, ty.fn_type(&[ty.into(), ty.into()], false));
            let v = self.call_value(f, &[lhs.into(), rhs.into()])?;
            return self.push_canonical(v.into_vector_value());
        }
        if self.ctx.arch == TargetArch::Aarch64 && self.ctx.subtarget.neon {
            let name = if lane_bits == 8 {
                "llvm.aarch64.neon.urhadd.v16i8"
            } else {
                "llvm.aarch64.neon.urhadd.v8i16"
            };
            let f = self
                .ctx
                .llvm_intrinsic(name, ty.fn_type(&[ty.into(), ty.into()], false));
            let v = self.call_value(f, &[lhs.into(), rhs.into()])?;
            return self.push_canonical(v.into_vector_value());
        }
        let wide_elem = self.ctx.ll.custom_width_int_type(lane_bits * 2);
        let wide = wide_elem.vec_type(ty.get_size());
        let el = self.builder.build_int_z_extend(lhs, wide, "el")?;
        let er = self.builder.build_int_z_extend(rhs, wide, "er")?;
        let one = self.const_splat(wide, 1);
        let sum = self.builder.build_int_add(el, er, "sum")?;
        let sum = self.builder.build_int_add(sum, one, "sum1")?;
        let avg = self.builder.build_right_shift(sum, one, false, "avg")?;
        let v = self.builder.build_int_truncate(avg, ty, "avg_narrow")?;
        self.push_canonical(v)
    }

    fn vec_shift(&mut self, ty: VectorType<'ctx>, kind: ShiftKind) -> Result<()> {
        let lane_bits = ty.get_element_type().into_int_type().get_bit_width();
        let count = self.pop_int()?;
        let count = self.builder.build_and(
            count,
            self.ctx.i32_ty.const_int(u64::from(lane_bits) - 1, false),
            "shift_amt",
        )?;
        let elem = ty.get_element_type().into_int_type();
        let count = if elem.get_bit_width() < 32 {
            self.builder.build_int_truncate(count, elem, "amt")?
        } else if elem.get_bit_width() > 32 {
            self.builder.build_int_z_extend(count, elem, "amt")?
        } else {
            count
        };
        let amount = self.splat_scalar(count.into(), ty.get_size())?;
        let v = self.pop_vec(ty)?;
        let v = match kind {
            ShiftKind::Left => self.builder.build_left_shift(v, amount, "shl")?,
            ShiftKind::ArithRight => self.builder.build_right_shift(v, amount, true, "shr_s")?,
            ShiftKind::LogicalRight => self.builder.build_right_shift(v, amount, false, "shr_u")?,
        };
        self.push_canonical(v)
    }

    // ── Swizzle ──

    /// Lane shuffle by dynamic indices: pshufb on SSSE3 (after clamping the
    /// index bytes so out-of-range lanes pick zero), tbl1 on NEON, and a
    /// 16-byte scratch array otherwise.
    fn swizzle(&mut self) -> Result<()> {
        let i8x16 = self.ctx.i8x16_ty;
        let index = self.pop_vec(i8x16)?;
        let vector = self.pop_vec(i8x16)?;

        if self.ctx.arch == TargetArch::X86_64 && self.ctx.subtarget.ssse3 {
            // pshufb only looks at bit 7; 112 + n pushes every index >= 16
            // into the top bit while the wrap-around check catches >= 144.
            let magic = self.const_splat(i8x16, 112);
            let added = self.builder.build_int_add(index, magic, "marked")?;
            let wrapped = self
                .builder
                .build_int_compare(IntPredicate::UGT, index, added, "wrapped")?;
            let all_ones = self.const_splat(i8x16, 0xFF);
            let clamped = self
                .builder
                .build_select(wrapped, all_ones, added, "clamped")?
                .into_vector_value();
            let f = self.ctx.llvm_intrinsic(
                "llvm.x86.ssse3.pshuf.b.128",
                i8x16.fn_type(&[i8x16.into(), i8x16.into()], false),
            );
            let v = self.call_value(f, &[vector.into(), clamped.into()])?;
            return self.push_canonical(v.into_vector_value());
        }

        if self.ctx.arch == TargetArch::Aarch64 && self.ctx.subtarget.neon {
            let f = self.ctx.llvm_intrinsic(
                "llvm.aarch64.neon.tbl1.v16i8",
                i8x16.fn_type(&[i8x16.into(), i8x16.into()], false),
            );
            let v = self.call_value(f, &[vector.into(), index.into()])?;
            return self.push_canonical(v.into_vector_value());
        }

        // Portable fallback: spill the vector to a byte array and gather
        // through clamped indices, then zero lanes whose index overflowed.
        let fifteen = self.const_splat(i8x16, 15);
        let zero = self.const_splat(i8x16, 0);
        let over = self
            .builder
            .build_int_compare(IntPredicate::UGT, index, fifteen, "over")?;
        let inbound = self.builder.build_and(index, fifteen, "inbound")?;
        let array_ty = self.ctx.i8_ty.array_type(16);
        let array = self.builder.build_alloca(array_ty, "swizzle_buf")?;
        for i in 0..16u64 {
            let lane = self.builder.build_extract_element(
                vector,
                self.ctx.i64_ty.const_int(i, false),
                "byte",
            )?;
            let slot = unsafe {
                self.builder.build_in_bounds_gep(
                    self.ctx.i8_ty,
                    array,
                    &[self.ctx.i64_ty.const_int(i, false)],
                    "slot",
                )?
            };
            self.builder.build_store(slot, lane)?;
        }
        let mut gathered = i8x16.get_undef();
        for i in 0..16u64 {
            let idx = self.builder.build_extract_element(
                inbound,
                self.ctx.i64_ty.const_int(i, false),
                "idx",
            )?;
            let slot = unsafe {
                self.builder.build_in_bounds_gep(
                    self.ctx.i8_ty,
                    array,
                    &[idx.into_int_value()],
                    "slot",
                )?
            };
            let byte = self.builder.build_load(self.ctx.i8_ty, slot, "byte")?;
            gathered = self
                .builder
                .build_insert_element(
                    gathered,
                    byte,
                    self.ctx.i64_ty.const_int(i, false),
                    "gather",
                )?;
        }
        let v = self
            .builder
            .build_select(over, zero, gathered, "swizzle")?
            .into_vector_value();
        self.push_canonical(v)
    }

    // ── Narrow / extend ──

    fn narrow(&mut self, from: VectorType<'ctx>, signed: bool) -> Result<()> {
        let lane_bits = from.get_element_type().into_int_type().get_bit_width();
        let (min, max): (i64, i64) = match (lane_bits, signed) {
            (16, true) => (i64::from(i8::MIN), i64::from(i8::MAX)),
            (16, false) => (0, i64::from(u8::MAX)),
            (32, true) => (i64::from(i16::MIN), i64::from(i16::MAX)),
            _ => (0, i64::from(u16::MAX)),
        };
        let count = from.get_size();
        let vmin = self.const_splat(from, min as u64);
        let vmax = self.const_splat(from, max as u64);
        let trunc_ty = self
            .ctx
            .ll
            .custom_width_int_type(lane_bits / 2)
            .vec_type(count);

        let mut clamp = |this: &mut Self, v: VectorValue<'ctx>| -> Result<VectorValue<'ctx>> {
            let low = this
                .builder
                .build_int_compare(IntPredicate::SLT, v, vmin, "under")?;
            let v = this
                .builder
                .build_select(low, vmin, v, "clamp_lo")?
                .into_vector_value();
            let high = this
                .builder
                .build_int_compare(IntPredicate::SGT, v, vmax, "over")?;
            let v = this
                .builder
                .build_select(high, vmax, v, "clamp_hi")?
                .into_vector_value();
            Ok(this.builder.build_int_truncate(v, trunc_ty, "narrowed")?)
        };

        let hi_src = self.pop_vec(from)?;
        let hi = clamp(self, hi_src)?;
        let lo_src = self.pop_vec(from)?;
        let lo = clamp(self, lo_src)?;

        let mask: Vec<u32> = (0..count * 2).collect();
        let mask = self.const_mask(&mask);
        let v = self.builder.build_shuffle_vector(lo, hi, mask, "narrow")?;
        self.push_canonical(v)
    }

    /// Widen the vector, then pick the requested half with a shuffle.
    fn extend_vector(
        &mut self,
        v: VectorValue<'ctx>,
        from: VectorType<'ctx>,
        signed: bool,
        low: bool,
    ) -> Result<VectorValue<'ctx>> {
        let lane_bits = from.get_element_type().into_int_type().get_bit_width();
        let count = from.get_size();
        let wide_full = self
            .ctx
            .ll
            .custom_width_int_type(lane_bits * 2)
            .vec_type(count);
        let widened = if signed {
            self.builder.build_int_s_extend(v, wide_full, "sext")?
        } else {
            self.builder.build_int_z_extend(v, wide_full, "zext")?
        };
        let start = if low { 0 } else { count / 2 };
        let mask: Vec<u32> = (start..start + count / 2).collect();
        let mask = self.const_mask(&mask);
        Ok(self.builder.build_shuffle_vector(
            widened,
            wide_full.get_undef(),
            mask,
            "half",
        )?)
    }

    fn extend_half(&mut self, from: VectorType<'ctx>, signed: bool, low: bool) -> Result<()> {
        let v = self.pop_vec(from)?;
        let v = self.extend_vector(v, from, signed, low)?;
        self.push_canonical(v)
    }

    fn ext_mul(&mut self, from: VectorType<'ctx>, signed: bool, low: bool) -> Result<()> {
        let rhs = self.pop_vec(from)?;
        let lhs = self.pop_vec(from)?;
        let rhs = self.extend_vector(rhs, from, signed, low)?;
        let lhs = self.extend_vector(lhs, from, signed, low)?;
        let v = self.builder.build_int_mul(lhs, rhs, "ext_mul")?;
        self.push_canonical(v)
    }

    /// Pairwise widening add: XOP/SSSE3/SSE2/NEON instructions where they
    /// fit, otherwise splitting even/odd lanes with shifts on the widened
    /// view and adding the halves.
    fn ext_add_pairwise(&mut self, ty: VectorType<'ctx>, signed: bool) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let count = ty.get_size();
        let lane_bits = ty.get_element_type().into_int_type().get_bit_width();
        let wide = self
            .ctx
            .ll
            .custom_width_int_type(lane_bits * 2)
            .vec_type(count / 2);

        if self.ctx.arch == TargetArch::X86_64 {
            if self.ctx.subtarget.xop {
                let name = match (count, signed) {
                    (8, true) => "llvm.x86.xop.vphaddwd",
                    (8, false) => "llvm.x86.xop.vphadduwd",
                    (16, true) => "llvm.x86.xop.vphaddbw",
                    _ => "llvm.x86.xop.vphaddubw",
                };
                let f = self
                    .ctx
                    .llvm_intrinsic(name, wide.fn_type(&[ty.into()], false));
                let v = self.call_value(f, &[v.into()])?;
                return self.push_canonical(v.into_vector_value());
            }
            if self.ctx.subtarget.ssse3 && count == 16 {
                let ones = self.const_splat(ty, 1);
                let f = self.ctx.llvm_intrinsic(
                    "llvm.x86.ssse3.pmadd.ub.sw.128",
                    wide.fn_type(&[ty.into(), ty.into()], false),
                );
                // pmaddubsw is unsigned×signed, so which side carries the
                // data depends on the requested signedness.
                let args = if signed {
                    [ones.into(), v.into()]
                } else {
                    [v.into(), ones.into()]
                };
                let v = self.call_value(f, &args)?;
                return self.push_canonical(v.into_vector_value());
            }
            if self.ctx.subtarget.sse2 && count == 8 {
                let ones = self.const_splat(ty, 1);
                let f = self.ctx.llvm_intrinsic(
                    "llvm.x86.sse2.pmadd.wd",
                    wide.fn_type(&[ty.into(), ty.into()], false),
                );
                if signed {
                    let v = self.call_value(f, &[v.into(), ones.into()])?;
                    return self.push_canonical(v.into_vector_value());
                }
                // Unsigned via bias: flip the sign bits, multiply-add, then
                // add back 2 * 0x8000 per pair.
                let bias = self.const_splat(ty, 0x8000);
                let flipped = self.builder.build_xor(v, bias, "biased")?;
                let summed = self
                    .call_value(f, &[flipped.into(), ones.into()])?
                    .into_vector_value();
                let unbias = self.const_splat(wide, 0x10000);
                let v = self.builder.build_int_add(summed, unbias, "unbiased")?;
                return self.push_canonical(v);
            }
        }
        if self.ctx.arch == TargetArch::Aarch64 && self.ctx.subtarget.neon {
            let name = match (count, signed) {
                (16, true) => "llvm.aarch64.neon.saddlp.v8i16.v16i8",
                (16, false) => "llvm.aarch64.neon.uaddlp.v8i16.v16i8",
                (8, true) => "llvm.aarch64.neon.saddlp.v4i32.v8i16",
                _ => "llvm.aarch64.neon.uaddlp.v4i32.v8i16",
            };
            let f = self
                .ctx
                .llvm_intrinsic(name, wide.fn_type(&[ty.into()], false));
            let v = self.call_value(f, &[v.into()])?;
            return self.push_canonical(v.into_vector_value());
        }

        let width = self.const_splat(wide, u64::from(lane_bits));
        let ev = self
            .builder
            .build_bit_cast(v, wide, "pairs")?
            .into_vector_value();
        let (high, low) = if signed {
            let high = self.builder.build_right_shift(ev, width, true, "odd")?;
            let shifted = self.builder.build_left_shift(ev, width, "even_up")?;
            let low = self
                .builder
                .build_right_shift(shifted, width, true, "even")?;
            (high, low)
        } else {
            let high = self.builder.build_right_shift(ev, width, false, "odd")?;
            let shifted = self.builder.build_left_shift(ev, width, "even_up")?;
            let low = self
                .builder
                .build_right_shift(shifted, width, false, "even")?;
            (high, low)
        };
        let v = self.builder.build_int_add(high, low, "pairwise")?;
        self.push_canonical(v)
    }

    /// Q15 multiply with rounding and saturation: pmulhrsw/sqrdmulh, or the
    /// widened multiply-round-shift with a saturation fix-up.
    fn q15_mul_sat(&mut self) -> Result<()> {
        let i16x8 = self.ctx.i16x8_ty;
        let (lhs, rhs) = self.pop_vec_pair(i16x8)?;

        if self.ctx.arch == TargetArch::X86_64 && self.ctx.subtarget.ssse3 {
            let f = self.ctx.llvm_intrinsic(
                "llvm.x86.ssse3.pmul.hr.sw.128",
                i16x8.fn_type(&[i16x8.into(), i16x8.into()], false),
            );
            let result = self
                .call_value(f, &[lhs.into(), rhs.into()])?
                .into_vector_value();
            let v = self.q15_overflow_fixup(result)?;
            return self.push_canonical(v);
        }
        if self.ctx.arch == TargetArch::Aarch64 && self.ctx.subtarget.neon {
            let f = self.ctx.llvm_intrinsic(
                "llvm.aarch64.neon.sqrdmulh.v8i16",
                i16x8.fn_type(&[i16x8.into(), i16x8.into()], false),
            );
            let v = self.call_value(f, &[lhs.into(), rhs.into()])?;
            return self.push_canonical(v.into_vector_value());
        }

        let wide = self.ctx.i32_ty.vec_type(8);
        let el = self.builder.build_int_s_extend(lhs, wide, "el")?;
        let er = self.builder.build_int_s_extend(rhs, wide, "er")?;
        let product = self.builder.build_int_mul(el, er, "prod")?;
        let rounding = self.const_splat(wide, 0x4000);
        let rounded = self.builder.build_int_add(product, rounding, "rounded")?;
        let fifteen = self.const_splat(wide, 15);
        let shifted = self
            .builder
            .build_right_shift(rounded, fifteen, true, "q15")?;
        let result = self
            .builder
            .build_int_truncate(shifted, i16x8, "q15_narrow")?;
        let v = self.q15_overflow_fixup(result)?;
        self.push_canonical(v)
    }

    /// `INT16_MIN * INT16_MIN` is the only overflowing product; it yields
    /// 0x8000, which an xor with its own comparison mask flips to INT16_MAX.
    fn q15_overflow_fixup(&mut self, result: VectorValue<'ctx>) -> Result<VectorValue<'ctx>> {
        let i16x8 = self.ctx.i16x8_ty;
        let int_min = self.const_splat(i16x8, 0x8000);
        let overflowed = self
            .builder
            .build_int_compare(IntPredicate::EQ, result, int_min, "overflow")?;
        let mask = self.builder.build_int_s_extend(overflowed, i16x8, "mask")?;
        Ok(self.builder.build_xor(result, mask, "saturated")?)
    }

    fn dot_i16x8(&mut self) -> Result<()> {
        let i16x8 = self.ctx.i16x8_ty;
        let i32x4 = self.ctx.i32x4_ty;
        let (lhs, rhs) = self.pop_vec_pair(i16x8)?;
        if self.ctx.arch == TargetArch::X86_64 && self.ctx.subtarget.sse2 {
            let f = self.ctx.llvm_intrinsic(
                "llvm.x86.sse2.pmadd.wd",
                i32x4.fn_type(&[i16x8.into(), i16x8.into()], false),
            );
            let v = self.call_value(f, &[lhs.into(), rhs.into()])?;
            return self.push_canonical(v.into_vector_value());
        }
        let width = self.const_splat(i32x4, 16);
        let ea = self
            .builder
            .build_bit_cast(lhs, i32x4, "ea")?
            .into_vector_value();
        let eb = self
            .builder
            .build_bit_cast(rhs, i32x4, "eb")?
            .into_vector_value();
        let al = self.builder.build_right_shift(ea, width, true, "al")?;
        let ar_shift = self.builder.build_left_shift(ea, width, "ar_up")?;
        let ar = self.builder.build_right_shift(ar_shift, width, true, "ar")?;
        let bl = self.builder.build_right_shift(eb, width, true, "bl")?;
        let br_shift = self.builder.build_left_shift(eb, width, "br_up")?;
        let br = self.builder.build_right_shift(br_shift, width, true, "br")?;
        let hi = self.builder.build_int_mul(al, bl, "hi")?;
        let lo = self.builder.build_int_mul(ar, br, "lo")?;
        let v = self.builder.build_int_add(hi, lo, "dot")?;
        self.push_canonical(v)
    }

    /// Relaxed i8 dot product into i16 lanes. The SSSE3 path matches
    /// pmaddubsw with the operands swapped into the WebAssembly
    /// signed×unsigned order; the fallback sign-extends both sides.
    fn relaxed_dot_product(
        &mut self,
        lhs: VectorValue<'ctx>,
        rhs: VectorValue<'ctx>,
    ) -> Result<VectorValue<'ctx>> {
        let i8x16 = self.ctx.i8x16_ty;
        let i16x8 = self.ctx.i16x8_ty;
        if self.ctx.arch == TargetArch::X86_64 && self.ctx.subtarget.ssse3 {
            let f = self.ctx.llvm_intrinsic(
                "llvm.x86.ssse3.pmadd.ub.sw.128",
                i16x8.fn_type(&[i8x16.into(), i8x16.into()], false),
            );
            return Ok(self
                .call_value(f, &[rhs.into(), lhs.into()])?
                .into_vector_value());
        }
        let width = self.const_splat(i16x8, 8);
        let ea = self
            .builder
            .build_bit_cast(lhs, i16x8, "ea")?
            .into_vector_value();
        let eb = self
            .builder
            .build_bit_cast(rhs, i16x8, "eb")?
            .into_vector_value();
        let al = self.builder.build_right_shift(ea, width, true, "al")?;
        let ar_up = self.builder.build_left_shift(ea, width, "ar_up")?;
        let ar = self.builder.build_right_shift(ar_up, width, true, "ar")?;
        let bl = self.builder.build_right_shift(eb, width, true, "bl")?;
        let br_up = self.builder.build_left_shift(eb, width, "br_up")?;
        let br = self.builder.build_right_shift(br_up, width, true, "br")?;
        let hi = self.builder.build_int_mul(al, bl, "hi")?;
        let lo = self.builder.build_int_mul(ar, br, "lo")?;
        Ok(self.builder.build_int_add(hi, lo, "dot")?)
    }

    fn relaxed_dot(&mut self) -> Result<()> {
        let i8x16 = self.ctx.i8x16_ty;
        let (lhs, rhs) = self.pop_vec_pair(i8x16)?;
        let v = self.relaxed_dot_product(lhs, rhs)?;
        self.push_canonical(v)
    }

    fn relaxed_dot_add(&mut self) -> Result<()> {
        let i8x16 = self.ctx.i8x16_ty;
        let i32x4 = self.ctx.i32x4_ty;
        let acc = self.pop_vec(i32x4)?;
        let (lhs, rhs) = self.pop_vec_pair(i8x16)?;
        let pairs = self.relaxed_dot_product(lhs, rhs)?;

        let width = self.const_splat(i32x4, 16);
        let wide = self
            .builder
            .build_bit_cast(pairs, i32x4, "wide")?
            .into_vector_value();
        let hi = self.builder.build_right_shift(wide, width, true, "hi")?;
        let lo_up = self.builder.build_left_shift(wide, width, "lo_up")?;
        let lo = self.builder.build_right_shift(lo_up, width, true, "lo")?;
        let sum = self.builder.build_int_add(hi, lo, "sum")?;
        let v = self.builder.build_int_add(sum, acc, "dot_add")?;
        self.push_canonical(v)
    }

    // ── Float lanewise ──

    fn vec_float_unary(
        &mut self,
        ty: VectorType<'ctx>,
        base: &str,
        suffix: &str,
    ) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.{base}.{suffix}"),
            ty.fn_type(&[ty.into()], false),
        );
        let v = self.call_value(f, &[v.into()])?;
        self.push_canonical(v.into_vector_value())
    }

    fn vec_nearest(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let is_f32 = ty.get_size() == 4;
        if self.ctx.has_roundeven() {
            let suffix = if is_f32 { "v4f32" } else { "v2f64" };
            return self.vec_float_unary(ty, "roundeven", suffix);
        }
        let v = self.pop_vec(ty)?;
        if self.ctx.arch == TargetArch::X86_64 && self.ctx.subtarget.sse4_1 {
            let name = if is_f32 {
                "llvm.x86.sse41.round.ps"
            } else {
                "llvm.x86.sse41.round.pd"
            };
            let f = self.ctx.llvm_intrinsic(
                name,
                ty.fn_type(&[ty.into(), self.ctx.i32_ty.into()], false),
            );
            let v = self.call_value(
                f,
                &[v.into(), self.ctx.i32_ty.const_int(8, false).into()],
            )?;
            return self.push_canonical(v.into_vector_value());
        }
        if self.ctx.arch == TargetArch::Aarch64 && self.ctx.subtarget.neon {
            let name = if is_f32 {
                "llvm.aarch64.neon.frintn.v4f32"
            } else {
                "llvm.aarch64.neon.frintn.v2f64"
            };
            let f = self
                .ctx
                .llvm_intrinsic(name, ty.fn_type(&[ty.into()], false));
            let v = self.call_value(f, &[v.into()])?;
            return self.push_canonical(v.into_vector_value());
        }
        let suffix = if is_f32 { "v4f32" } else { "v2f64" };
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.nearbyint.{suffix}"),
            ty.fn_type(&[ty.into()], false),
        );
        let v = self.call_value(f, &[v.into()])?;
        self.push_canonical(v.into_vector_value())
    }

    fn vec_fadd(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let v = self.builder.build_float_add(lhs, rhs, "fadd")?;
        self.push_canonical(v)
    }

    fn vec_fsub(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let v = self.builder.build_float_sub(lhs, rhs, "fsub")?;
        self.push_canonical(v)
    }

    fn vec_fmul(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let v = self.builder.build_float_mul(lhs, rhs, "fmul")?;
        self.push_canonical(v)
    }

    fn vec_fdiv(&mut self, ty: VectorType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let v = self.builder.build_float_div(lhs, rhs, "fdiv")?;
        self.push_canonical(v)
    }

    /// NaN-propagating lanewise min/max with sign-correct zeros, built from
    /// selects so each lane resolves independently.
    fn vec_fmin_fmax(&mut self, ty: VectorType<'ctx>, is_min: bool) -> Result<()> {
        let i64x2 = self.ctx.i64x2_ty;
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let lhs_nan = self
            .builder
            .build_float_compare(FloatPredicate::UNO, lhs, lhs, "lhs_nan")?;
        let rhs_nan = self
            .builder
            .build_float_compare(FloatPredicate::UNO, rhs, rhs, "rhs_nan")?;
        let lt = self
            .builder
            .build_float_compare(FloatPredicate::OLT, lhs, rhs, "lt")?;
        let gt = self
            .builder
            .build_float_compare(FloatPredicate::OGT, lhs, rhs, "gt")?;

        let lhs_bits = self.builder.build_bit_cast(lhs, i64x2, "lhs_bits")?;
        let rhs_bits = self.builder.build_bit_cast(rhs, i64x2, "rhs_bits")?;
        let merged = if is_min {
            self.builder.build_or(
                lhs_bits.into_vector_value(),
                rhs_bits.into_vector_value(),
                "or",
            )?
        } else {
            self.builder.build_and(
                lhs_bits.into_vector_value(),
                rhs_bits.into_vector_value(),
                "and",
            )?
        };
        let mut v = self
            .builder
            .build_bit_cast(merged, ty, "zeros")?
            .into_vector_value();

        let (near, far) = if is_min { (lt, gt) } else { (gt, lt) };
        v = self
            .builder
            .build_select(far, rhs, v, "far")?
            .into_vector_value();
        v = self
            .builder
            .build_select(near, lhs, v, "near")?
            .into_vector_value();
        v = self
            .builder
            .build_select(rhs_nan, rhs, v, "rhs_nan_sel")?
            .into_vector_value();
        v = self
            .builder
            .build_select(lhs_nan, lhs, v, "lhs_nan_sel")?
            .into_vector_value();
        self.push_canonical(v)
    }

    fn vec_pmin_pmax(&mut self, ty: VectorType<'ctx>, is_min: bool) -> Result<()> {
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let pred = if is_min {
            FloatPredicate::OLT
        } else {
            FloatPredicate::OGT
        };
        let pick_rhs = self.builder.build_float_compare(pred, rhs, lhs, "pick")?;
        let v = self
            .builder
            .build_select(pick_rhs, rhs, lhs, "pminmax")?
            .into_vector_value();
        self.push_canonical(v)
    }

    fn vec_madd(&mut self, ty: VectorType<'ctx>, negate: bool) -> Result<()> {
        let addend = self.pop_vec(ty)?;
        let (lhs, rhs) = self.pop_vec_pair(ty)?;
        let lhs = if negate {
            self.builder.build_float_neg(lhs, "neg")?
        } else {
            lhs
        };
        let product = self.builder.build_float_mul(lhs, rhs, "prod")?;
        let v = self.builder.build_float_add(product, addend, "madd")?;
        self.push_canonical(v)
    }

    fn low_half(&mut self, ty: VectorType<'ctx>) -> Result<VectorValue<'ctx>> {
        let v = self.pop_vec(ty)?;
        let mask: Vec<u32> = (0..ty.get_size() / 2).collect();
        let mask = self.const_mask(&mask);
        Ok(self
            .builder
            .build_shuffle_vector(v, ty.get_undef(), mask, "low")?)
    }

    /// NaN-safe saturating float→i32 lanes; `_zero` variants pad with zeros.
    fn vec_trunc_sat_s(&mut self, ty: VectorType<'ctx>, pad_zero: bool) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let size = ty.get_size();
        let int_vec = self.ctx.i32_ty.vec_type(size);
        let fp_elem = ty.get_element_type().into_float_type();

        let int_min = self.const_splat(int_vec, u64::from(i32::MIN as u32));
        let int_max = self.const_splat(int_vec, u64::from(i32::MAX as u32));
        let int_zero = int_vec.const_zero();
        let fp_min = self.float_splat(fp_elem, f64::from(i32::MIN), size);
        let fp_max = self.float_splat(fp_elem, f64::from(i32::MAX), size);

        let normal = self
            .builder
            .build_float_compare(FloatPredicate::ORD, v, v, "ord")?;
        let not_under = self
            .builder
            .build_float_compare(FloatPredicate::UGE, v, fp_min, "not_under")?;
        let not_over = self
            .builder
            .build_float_compare(FloatPredicate::ULT, v, fp_max, "not_over")?;
        let converted = self
            .builder
            .build_float_to_signed_int(v, int_vec, "fptosi")?;
        let r = self
            .builder
            .build_select(normal, converted, int_zero, "nan_zero")?
            .into_vector_value();
        let r = self
            .builder
            .build_select(not_under, r, int_min, "underflow")?
            .into_vector_value();
        let r = self
            .builder
            .build_select(not_over, r, int_max, "overflow")?
            .into_vector_value();
        self.finish_trunc_sat(r, size, pad_zero)
    }

    fn vec_trunc_sat_u(&mut self, ty: VectorType<'ctx>, pad_zero: bool) -> Result<()> {
        let v = self.pop_vec(ty)?;
        let size = ty.get_size();
        let int_vec = self.ctx.i32_ty.vec_type(size);
        let fp_elem = ty.get_element_type().into_float_type();

        let int_min = int_vec.const_zero();
        let int_max = self.const_splat(int_vec, u64::from(u32::MAX));
        let fp_min = self.float_splat(fp_elem, 0.0, size);
        let fp_max = self.float_splat(fp_elem, f64::from(u32::MAX), size);

        let not_under = self
            .builder
            .build_float_compare(FloatPredicate::OGE, v, fp_min, "not_under")?;
        let not_over = self
            .builder
            .build_float_compare(FloatPredicate::ULT, v, fp_max, "not_over")?;
        let converted = self
            .builder
            .build_float_to_unsigned_int(v, int_vec, "fptoui")?;
        let r = self
            .builder
            .build_select(not_under, converted, int_min, "underflow")?
            .into_vector_value();
        let r = self
            .builder
            .build_select(not_over, r, int_max, "overflow")?
            .into_vector_value();
        self.finish_trunc_sat(r, size, pad_zero)
    }

    fn finish_trunc_sat(
        &mut self,
        v: VectorValue<'ctx>,
        size: u32,
        pad_zero: bool,
    ) -> Result<()> {
        if !pad_zero {
            return self.push_canonical(v);
        }
        let int_vec = self.ctx.i32_ty.vec_type(size);
        let mask: Vec<u32> = (0..size * 2).collect();
        let mask = self.const_mask(&mask);
        let v = self
            .builder
            .build_shuffle_vector(v, int_vec.const_zero(), mask, "padded")?;
        self.push_canonical(v)
    }

    fn float_splat(
        &self,
        elem: inkwell::types::FloatType<'ctx>,
        value: f64,
        count: u32,
    ) -> VectorValue<'ctx> {
        let consts: Vec<BasicValueEnum> =
            (0..count).map(|_| elem.const_float(value).into()).collect();
        VectorType::const_vector(&consts)
    }
}

#[derive(Clone, Copy)]
enum ShiftKind {
    Left,
    ArithRight,
    LogicalRight,
}
