//! Numeric opcode lowering.
//!
//! Divisions carry explicit zero/overflow trap checks, shifts mask their
//! count, rotations go through the funnel-shift intrinsics, and float min/max
//! and the float→int truncations implement the WebAssembly-specified edge
//! cases rather than the hardware defaults.

use anyhow::{anyhow, Result};
use inkwell::types::IntType;
use inkwell::values::{BasicValueEnum, FloatValue, IntValue};
use inkwell::{FloatPredicate, IntPredicate};
use wasmparser::Operator;

use crate::codegen::context::TargetArch;
use crate::codegen::function::FunctionCompiler;
use crate::error::TrapCode;

impl<'a, 'ctx> FunctionCompiler<'a, 'ctx> {
    pub(crate) fn translate_numeric(&mut self, op: &Operator) -> Result<bool> {
        match op {
            Operator::I32Const { value } => {
                self.push(self.ctx.i32_ty.const_int(*value as u32 as u64, false));
            }
            Operator::I64Const { value } => {
                self.push(self.ctx.i64_ty.const_int(*value as u64, false));
            }
            Operator::F32Const { value } => {
                // Bit-pattern emission keeps exotic NaN payloads intact.
                let bits = self.ctx.i32_ty.const_int(u64::from(value.bits()), false);
                let v = self.builder.build_bit_cast(bits, self.ctx.f32_ty, "f32c")?;
                self.push(v);
            }
            Operator::F64Const { value } => {
                let bits = self.ctx.i64_ty.const_int(value.bits(), false);
                let v = self.builder.build_bit_cast(bits, self.ctx.f64_ty, "f64c")?;
                self.push(v);
            }

            Operator::I32Eqz => self.int_eqz(self.ctx.i32_ty)?,
            Operator::I64Eqz => self.int_eqz(self.ctx.i64_ty)?,

            Operator::I32Eq | Operator::I64Eq => self.icmp(IntPredicate::EQ)?,
            Operator::I32Ne | Operator::I64Ne => self.icmp(IntPredicate::NE)?,
            Operator::I32LtS | Operator::I64LtS => self.icmp(IntPredicate::SLT)?,
            Operator::I32LtU | Operator::I64LtU => self.icmp(IntPredicate::ULT)?,
            Operator::I32GtS | Operator::I64GtS => self.icmp(IntPredicate::SGT)?,
            Operator::I32GtU | Operator::I64GtU => self.icmp(IntPredicate::UGT)?,
            Operator::I32LeS | Operator::I64LeS => self.icmp(IntPredicate::SLE)?,
            Operator::I32LeU | Operator::I64LeU => self.icmp(IntPredicate::ULE)?,
            Operator::I32GeS | Operator::I64GeS => self.icmp(IntPredicate::SGE)?,
            Operator::I32GeU | Operator::I64GeU => self.icmp(IntPredicate::UGE)?,

            Operator::F32Eq | Operator::F64Eq => self.fcmp(FloatPredicate::OEQ)?,
            Operator::F32Ne | Operator::F64Ne => self.fcmp(FloatPredicate::UNE)?,
            Operator::F32Lt | Operator::F64Lt => self.fcmp(FloatPredicate::OLT)?,
            Operator::F32Gt | Operator::F64Gt => self.fcmp(FloatPredicate::OGT)?,
            Operator::F32Le | Operator::F64Le => self.fcmp(FloatPredicate::OLE)?,
            Operator::F32Ge | Operator::F64Ge => self.fcmp(FloatPredicate::OGE)?,

            Operator::I32Clz => self.count_bits("ctlz", self.ctx.i32_ty)?,
            Operator::I64Clz => self.count_bits("ctlz", self.ctx.i64_ty)?,
            Operator::I32Ctz => self.count_bits("cttz", self.ctx.i32_ty)?,
            Operator::I64Ctz => self.count_bits("cttz", self.ctx.i64_ty)?,
            Operator::I32Popcnt => self.popcnt(self.ctx.i32_ty)?,
            Operator::I64Popcnt => self.popcnt(self.ctx.i64_ty)?,

            Operator::I32Add | Operator::I64Add => {
                let (lhs, rhs) = self.pop_int_pair()?;
                let v = self.builder.build_int_add(lhs, rhs, "add")?;
                self.push(v);
            }
            Operator::I32Sub | Operator::I64Sub => {
                let (lhs, rhs) = self.pop_int_pair()?;
                let v = self.builder.build_int_sub(lhs, rhs, "sub")?;
                self.push(v);
            }
            Operator::I32Mul | Operator::I64Mul => {
                let (lhs, rhs) = self.pop_int_pair()?;
                let v = self.builder.build_int_mul(lhs, rhs, "mul")?;
                self.push(v);
            }
            Operator::I32DivS => self.int_div_s(self.ctx.i32_ty)?,
            Operator::I64DivS => self.int_div_s(self.ctx.i64_ty)?,
            Operator::I32DivU | Operator::I64DivU => self.int_div_u()?,
            Operator::I32RemS => self.int_rem_s(self.ctx.i32_ty)?,
            Operator::I64RemS => self.int_rem_s(self.ctx.i64_ty)?,
            Operator::I32RemU | Operator::I64RemU => self.int_rem_u()?,

            Operator::I32And | Operator::I64And => {
                let (lhs, rhs) = self.pop_int_pair()?;
                let v = self.builder.build_and(lhs, rhs, "and")?;
                self.push(v);
            }
            Operator::I32Or | Operator::I64Or => {
                let (lhs, rhs) = self.pop_int_pair()?;
                let v = self.builder.build_or(lhs, rhs, "or")?;
                self.push(v);
            }
            Operator::I32Xor | Operator::I64Xor => {
                let (lhs, rhs) = self.pop_int_pair()?;
                let v = self.builder.build_xor(lhs, rhs, "xor")?;
                self.push(v);
            }

            Operator::I32Shl | Operator::I64Shl => {
                let (lhs, rhs) = self.masked_shift_pair()?;
                let v = self.builder.build_left_shift(lhs, rhs, "shl")?;
                self.push(v);
            }
            Operator::I32ShrS | Operator::I64ShrS => {
                let (lhs, rhs) = self.masked_shift_pair()?;
                let v = self.builder.build_right_shift(lhs, rhs, true, "shr_s")?;
                self.push(v);
            }
            Operator::I32ShrU | Operator::I64ShrU => {
                let (lhs, rhs) = self.masked_shift_pair()?;
                let v = self.builder.build_right_shift(lhs, rhs, false, "shr_u")?;
                self.push(v);
            }
            Operator::I32Rotl => self.rotate("fshl", self.ctx.i32_ty)?,
            Operator::I32Rotr => self.rotate("fshr", self.ctx.i32_ty)?,
            Operator::I64Rotl => self.rotate("fshl", self.ctx.i64_ty)?,
            Operator::I64Rotr => self.rotate("fshr", self.ctx.i64_ty)?,

            Operator::F32Abs | Operator::F64Abs => self.unary_float_intrinsic("fabs")?,
            Operator::F32Neg | Operator::F64Neg => {
                let v = self.pop()?.into_float_value();
                let v = self.builder.build_float_neg(v, "fneg")?;
                self.push(v);
            }
            Operator::F32Ceil | Operator::F64Ceil => self.unary_float_intrinsic("ceil")?,
            Operator::F32Floor | Operator::F64Floor => self.unary_float_intrinsic("floor")?,
            Operator::F32Trunc | Operator::F64Trunc => self.unary_float_intrinsic("trunc")?,
            Operator::F32Nearest | Operator::F64Nearest => self.float_nearest()?,
            Operator::F32Sqrt | Operator::F64Sqrt => self.unary_float_intrinsic("sqrt")?,

            Operator::F32Add | Operator::F64Add => {
                let (lhs, rhs) = self.pop_float_pair()?;
                let v = self.builder.build_float_add(lhs, rhs, "fadd")?;
                self.push(v);
            }
            Operator::F32Sub | Operator::F64Sub => {
                let (lhs, rhs) = self.pop_float_pair()?;
                let v = self.builder.build_float_sub(lhs, rhs, "fsub")?;
                self.push(v);
            }
            Operator::F32Mul | Operator::F64Mul => {
                let (lhs, rhs) = self.pop_float_pair()?;
                let v = self.builder.build_float_mul(lhs, rhs, "fmul")?;
                self.push(v);
            }
            Operator::F32Div | Operator::F64Div => {
                let (lhs, rhs) = self.pop_float_pair()?;
                let v = self.builder.build_float_div(lhs, rhs, "fdiv")?;
                self.push(v);
            }
            Operator::F32Min | Operator::F64Min => self.float_min_max(true)?,
            Operator::F32Max | Operator::F64Max => self.float_min_max(false)?,
            Operator::F32Copysign | Operator::F64Copysign => {
                let (lhs, rhs) = self.pop_float_pair()?;
                let ty = lhs.get_type();
                let f = self.ctx.llvm_intrinsic(
                    &format!("llvm.copysign.{}", float_suffix(self, ty)),
                    ty.fn_type(&[ty.into(), ty.into()], false),
                );
                let v = self.call_value(f, &[lhs.into(), rhs.into()])?;
                self.push(v);
            }

            Operator::I32WrapI64 => {
                let v = self.pop_int()?;
                let v = self.builder.build_int_truncate(v, self.ctx.i32_ty, "wrap")?;
                self.push(v);
            }
            Operator::I64ExtendI32S => {
                let v = self.pop_int()?;
                let v = self.builder.build_int_s_extend(v, self.ctx.i64_ty, "sext")?;
                self.push(v);
            }
            Operator::I64ExtendI32U => {
                let v = self.pop_int()?;
                let v = self.builder.build_int_z_extend(v, self.ctx.i64_ty, "zext")?;
                self.push(v);
            }

            Operator::I32TruncF32S | Operator::I32TruncF64S => {
                self.trunc_to_int(self.ctx.i32_ty, true)?
            }
            Operator::I32TruncF32U | Operator::I32TruncF64U => {
                self.trunc_to_int(self.ctx.i32_ty, false)?
            }
            Operator::I64TruncF32S | Operator::I64TruncF64S => {
                self.trunc_to_int(self.ctx.i64_ty, true)?
            }
            Operator::I64TruncF32U | Operator::I64TruncF64U => {
                self.trunc_to_int(self.ctx.i64_ty, false)?
            }
            Operator::I32TruncSatF32S | Operator::I32TruncSatF64S => {
                self.trunc_sat_to_int(self.ctx.i32_ty, true)?
            }
            Operator::I32TruncSatF32U | Operator::I32TruncSatF64U => {
                self.trunc_sat_to_int(self.ctx.i32_ty, false)?
            }
            Operator::I64TruncSatF32S | Operator::I64TruncSatF64S => {
                self.trunc_sat_to_int(self.ctx.i64_ty, true)?
            }
            Operator::I64TruncSatF32U | Operator::I64TruncSatF64U => {
                self.trunc_sat_to_int(self.ctx.i64_ty, false)?
            }

            Operator::F32ConvertI32S | Operator::F32ConvertI64S => {
                let v = self.pop_int()?;
                let v = self
                    .builder
                    .build_signed_int_to_float(v, self.ctx.f32_ty, "sitofp")?;
                self.push(v);
            }
            Operator::F32ConvertI32U | Operator::F32ConvertI64U => {
                let v = self.pop_int()?;
                let v = self
                    .builder
                    .build_unsigned_int_to_float(v, self.ctx.f32_ty, "uitofp")?;
                self.push(v);
            }
            Operator::F64ConvertI32S | Operator::F64ConvertI64S => {
                let v = self.pop_int()?;
                let v = self
                    .builder
                    .build_signed_int_to_float(v, self.ctx.f64_ty, "sitofp")?;
                self.push(v);
            }
            Operator::F64ConvertI32U | Operator::F64ConvertI64U => {
                let v = self.pop_int()?;
                let v = self
                    .builder
                    .build_unsigned_int_to_float(v, self.ctx.f64_ty, "uitofp")?;
                self.push(v);
            }
            Operator::F32DemoteF64 => {
                let v = self.pop()?.into_float_value();
                let v = self.builder.build_float_trunc(v, self.ctx.f32_ty, "demote")?;
                self.push(v);
            }
            Operator::F64PromoteF32 => {
                let v = self.pop()?.into_float_value();
                let v = self.builder.build_float_ext(v, self.ctx.f64_ty, "promote")?;
                self.push(v);
            }
            Operator::I32ReinterpretF32 => {
                let v = self.pop()?;
                let v = self.builder.build_bit_cast(v, self.ctx.i32_ty, "bits")?;
                self.push(v);
            }
            Operator::I64ReinterpretF64 => {
                let v = self.pop()?;
                let v = self.builder.build_bit_cast(v, self.ctx.i64_ty, "bits")?;
                self.push(v);
            }
            Operator::F32ReinterpretI32 => {
                let v = self.pop()?;
                let v = self.builder.build_bit_cast(v, self.ctx.f32_ty, "bits")?;
                self.push(v);
            }
            Operator::F64ReinterpretI64 => {
                let v = self.pop()?;
                let v = self.builder.build_bit_cast(v, self.ctx.f64_ty, "bits")?;
                self.push(v);
            }

            Operator::I32Extend8S => self.sign_extend_narrow(self.ctx.i8_ty, self.ctx.i32_ty)?,
            Operator::I32Extend16S => self.sign_extend_narrow(self.ctx.i16_ty, self.ctx.i32_ty)?,
            Operator::I64Extend8S => self.sign_extend_narrow(self.ctx.i8_ty, self.ctx.i64_ty)?,
            Operator::I64Extend16S => self.sign_extend_narrow(self.ctx.i16_ty, self.ctx.i64_ty)?,
            Operator::I64Extend32S => self.sign_extend_narrow(self.ctx.i32_ty, self.ctx.i64_ty)?,

            _ => return Ok(false),
        }
        Ok(true)
    }

    // ── Shared shapes ──

    pub(crate) fn pop_int_pair(&mut self) -> Result<(IntValue<'ctx>, IntValue<'ctx>)> {
        let rhs = self.pop_int()?;
        let lhs = self.pop_int()?;
        Ok((lhs, rhs))
    }

    fn pop_float_pair(&mut self) -> Result<(FloatValue<'ctx>, FloatValue<'ctx>)> {
        let rhs = self.pop()?.into_float_value();
        let lhs = self.pop()?.into_float_value();
        Ok((lhs, rhs))
    }

    /// Comparison results are i32 0/1 on the WebAssembly stack.
    fn icmp(&mut self, pred: IntPredicate) -> Result<()> {
        let (lhs, rhs) = self.pop_int_pair()?;
        let cmp = self.builder.build_int_compare(pred, lhs, rhs, "cmp")?;
        let v = self
            .builder
            .build_int_z_extend(cmp, self.ctx.i32_ty, "cmp32")?;
        self.push(v);
        Ok(())
    }

    fn fcmp(&mut self, pred: FloatPredicate) -> Result<()> {
        let (lhs, rhs) = self.pop_float_pair()?;
        let cmp = self.builder.build_float_compare(pred, lhs, rhs, "fcmp")?;
        let v = self
            .builder
            .build_int_z_extend(cmp, self.ctx.i32_ty, "cmp32")?;
        self.push(v);
        Ok(())
    }

    fn int_eqz(&mut self, ty: IntType<'ctx>) -> Result<()> {
        let v = self.pop_int()?;
        let cmp =
            self.builder
                .build_int_compare(IntPredicate::EQ, v, ty.const_zero(), "eqz")?;
        let v = self
            .builder
            .build_int_z_extend(cmp, self.ctx.i32_ty, "eqz32")?;
        self.push(v);
        Ok(())
    }

    fn count_bits(&mut self, base: &str, ty: IntType<'ctx>) -> Result<()> {
        let v = self.pop_int()?;
        let i1 = self.ctx.ll.bool_type();
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.{base}.i{}", ty.get_bit_width()),
            ty.fn_type(&[ty.into(), i1.into()], false),
        );
        let v = self.call_value(f, &[v.into(), i1.const_zero().into()])?;
        self.push(v);
        Ok(())
    }

    fn popcnt(&mut self, ty: IntType<'ctx>) -> Result<()> {
        let v = self.pop_int()?;
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.ctpop.i{}", ty.get_bit_width()),
            ty.fn_type(&[ty.into()], false),
        );
        let v = self.call_value(f, &[v.into()])?;
        self.push(v);
        Ok(())
    }

    /// Shift counts are masked to the operand width.
    fn masked_shift_pair(&mut self) -> Result<(IntValue<'ctx>, IntValue<'ctx>)> {
        let (lhs, rhs) = self.pop_int_pair()?;
        let ty = lhs.get_type();
        let mask = ty.const_int(u64::from(ty.get_bit_width()) - 1, false);
        let rhs = self.builder.build_and(rhs, mask, "shift_amt")?;
        Ok((lhs, rhs))
    }

    /// Rotation is a funnel shift with the operand doubled.
    fn rotate(&mut self, base: &str, ty: IntType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_int_pair()?;
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.{base}.i{}", ty.get_bit_width()),
            ty.fn_type(&[ty.into(), ty.into(), ty.into()], false),
        );
        let v = self.call_value(f, &[lhs.into(), lhs.into(), rhs.into()])?;
        self.push(v);
        Ok(())
    }

    pub(crate) fn unary_float_intrinsic(&mut self, base: &str) -> Result<()> {
        let v = self.pop()?.into_float_value();
        let ty = v.get_type();
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.{base}.{}", float_suffix(self, ty)),
            ty.fn_type(&[ty.into()], false),
        );
        let v = self.call_value(f, &[v.into()])?;
        self.push(v);
        Ok(())
    }

    /// Round-to-nearest-even. `roundeven` is exact; the subtarget and
    /// `nearbyint` paths cover toolchains without it.
    fn float_nearest(&mut self) -> Result<()> {
        if self.ctx.has_roundeven() {
            return self.unary_float_intrinsic("roundeven");
        }
        let v = self.pop()?.into_float_value();
        let ty = v.get_type();
        let is_f32 = ty == self.ctx.f32_ty;
        if self.ctx.arch == TargetArch::X86_64 && self.ctx.subtarget.sse4_1 {
            let (name, vec_ty) = if is_f32 {
                ("llvm.x86.sse41.round.ss", self.ctx.f32x4_ty)
            } else {
                ("llvm.x86.sse41.round.sd", self.ctx.f64x2_ty)
            };
            let zero = self.ctx.i64_ty.const_zero();
            let lanes = self
                .builder
                .build_insert_element(vec_ty.get_undef(), v, zero, "lane0")?;
            let f = self.ctx.llvm_intrinsic(
                name,
                vec_ty.fn_type(
                    &[vec_ty.into(), vec_ty.into(), self.ctx.i32_ty.into()],
                    false,
                ),
            );
            // Rounding mode 8: round to nearest, ties to even.
            let rounded = self.call_value(
                f,
                &[
                    lanes.into(),
                    lanes.into(),
                    self.ctx.i32_ty.const_int(8, false).into(),
                ],
            )?;
            let v = self.builder.build_extract_element(
                rounded.into_vector_value(),
                zero,
                "rounded",
            )?;
            self.push(v);
            return Ok(());
        }
        if self.ctx.arch == TargetArch::Aarch64 && self.ctx.subtarget.neon {
            let (name, vec_ty) = if is_f32 {
                ("llvm.aarch64.neon.frintn.v4f32", self.ctx.f32x4_ty)
            } else {
                ("llvm.aarch64.neon.frintn.v2f64", self.ctx.f64x2_ty)
            };
            let zero = self.ctx.i64_ty.const_zero();
            let lanes = self
                .builder
                .build_insert_element(vec_ty.get_undef(), v, zero, "lane0")?;
            let f = self
                .ctx
                .llvm_intrinsic(name, vec_ty.fn_type(&[vec_ty.into()], false));
            let rounded = self.call_value(f, &[lanes.into()])?;
            let v = self.builder.build_extract_element(
                rounded.into_vector_value(),
                zero,
                "rounded",
            )?;
            self.push(v);
            return Ok(());
        }
        self.push(v);
        self.unary_float_intrinsic("nearbyint")
    }

    fn int_div_s(&mut self, ty: IntType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_int_pair()?;
        let zero = ty.const_zero();
        let minus_one = ty.const_all_ones();
        let int_min = ty.const_int(1u64 << (ty.get_bit_width() - 1), false);

        let not_zero =
            self.builder
                .build_int_compare(IntPredicate::NE, rhs, zero, "div_nonzero")?;
        self.trap_unless(not_zero, TrapCode::DivideByZero)?;

        let lhs_not_min =
            self.builder
                .build_int_compare(IntPredicate::NE, lhs, int_min, "lhs_not_min")?;
        let rhs_not_m1 =
            self.builder
                .build_int_compare(IntPredicate::NE, rhs, minus_one, "rhs_not_m1")?;
        let no_overflow = self
            .builder
            .build_or(lhs_not_min, rhs_not_m1, "no_overflow")?;
        self.trap_unless(no_overflow, TrapCode::IntegerOverflow)?;

        let v = self.builder.build_int_signed_div(lhs, rhs, "div_s")?;
        self.push(v);
        Ok(())
    }

    fn int_div_u(&mut self) -> Result<()> {
        let (lhs, rhs) = self.pop_int_pair()?;
        let not_zero = self.builder.build_int_compare(
            IntPredicate::NE,
            rhs,
            rhs.get_type().const_zero(),
            "div_nonzero",
        )?;
        self.trap_unless(not_zero, TrapCode::DivideByZero)?;
        let v = self.builder.build_int_unsigned_div(lhs, rhs, "div_u")?;
        self.push(v);
        Ok(())
    }

    /// `INT_MIN % -1` is 0 by definition; the hardware instruction would
    /// fault, so that case bypasses it through a φ.
    fn int_rem_s(&mut self, ty: IntType<'ctx>) -> Result<()> {
        let (lhs, rhs) = self.pop_int_pair()?;
        let zero = ty.const_zero();
        let minus_one = ty.const_all_ones();
        let int_min = ty.const_int(1u64 << (ty.get_bit_width() - 1), false);

        let not_zero =
            self.builder
                .build_int_compare(IntPredicate::NE, rhs, zero, "rem_nonzero")?;
        self.trap_unless(not_zero, TrapCode::DivideByZero)?;

        let curr = self.current_block()?;
        let no_overflow_bb = self.append_block("rem.norm");
        let end = self.append_block("rem.end");

        let lhs_not_min =
            self.builder
                .build_int_compare(IntPredicate::NE, lhs, int_min, "lhs_not_min")?;
        let rhs_not_m1 =
            self.builder
                .build_int_compare(IntPredicate::NE, rhs, minus_one, "rhs_not_m1")?;
        let no_overflow = self
            .builder
            .build_or(lhs_not_min, rhs_not_m1, "no_overflow")?;
        let no_overflow = self.likely(no_overflow)?;
        self.builder
            .build_conditional_branch(no_overflow, no_overflow_bb, end)?;

        self.builder.position_at_end(no_overflow_bb);
        let rem = self.builder.build_int_signed_rem(lhs, rhs, "rem_s")?;
        self.builder.build_unconditional_branch(end)?;

        self.builder.position_at_end(end);
        let phi = self.builder.build_phi(ty, "rem")?;
        phi.add_incoming(&[(&rem, no_overflow_bb), (&zero, curr)]);
        self.push(phi.as_basic_value());
        Ok(())
    }

    fn int_rem_u(&mut self) -> Result<()> {
        let (lhs, rhs) = self.pop_int_pair()?;
        let not_zero = self.builder.build_int_compare(
            IntPredicate::NE,
            rhs,
            rhs.get_type().const_zero(),
            "rem_nonzero",
        )?;
        self.trap_unless(not_zero, TrapCode::DivideByZero)?;
        let v = self.builder.build_int_unsigned_rem(lhs, rhs, "rem_u")?;
        self.push(v);
        Ok(())
    }

    /// WebAssembly float min/max: NaN wins (with payload propagation via
    /// `lhs + rhs`), equal operands resolve signed zeros through bitwise
    /// or/and, and the common case uses `minnum`/`maxnum`.
    fn float_min_max(&mut self, is_min: bool) -> Result<()> {
        let (lhs, rhs) = self.pop_float_pair()?;
        let fp_ty = lhs.get_type();
        let int_ty = if fp_ty == self.ctx.f32_ty {
            self.ctx.i32_ty
        } else {
            self.ctx.i64_ty
        };

        let ueq = self
            .builder
            .build_float_compare(FloatPredicate::UEQ, lhs, rhs, "ueq")?;
        let uno = self
            .builder
            .build_float_compare(FloatPredicate::UNO, lhs, rhs, "uno")?;

        let lhs_bits = self
            .builder
            .build_bit_cast(lhs, int_ty, "lhs_bits")?
            .into_int_value();
        let rhs_bits = self
            .builder
            .build_bit_cast(rhs, int_ty, "rhs_bits")?
            .into_int_value();
        let merged_bits = if is_min {
            self.builder.build_or(lhs_bits, rhs_bits, "sign_or")?
        } else {
            self.builder.build_and(lhs_bits, rhs_bits, "sign_and")?
        };
        let signed_zero = self
            .builder
            .build_bit_cast(merged_bits, fp_ty, "signed_zero")?;

        let nan = self.builder.build_float_add(lhs, rhs, "nan")?;

        let base = if is_min { "minnum" } else { "maxnum" };
        let f = self.ctx.llvm_intrinsic(
            &format!("llvm.{base}.{}", float_suffix(self, fp_ty)),
            fp_ty.fn_type(&[fp_ty.into(), fp_ty.into()], false),
        );
        let num = self.call_value(f, &[lhs.into(), rhs.into()])?;

        let on_equal = self
            .builder
            .build_select(uno, nan.into(), signed_zero, "nan_or_zero")?;
        let v = self.builder.build_select(ueq, on_equal, num, "minmax")?;
        self.push(v);
        Ok(())
    }

    fn trunc_bounds(
        &self,
        int_ty: IntType<'ctx>,
        fp_ty: inkwell::types::FloatType<'ctx>,
        signed: bool,
    ) -> (bool, FloatValue<'ctx>, FloatValue<'ctx>, u64, u64) {
        let bit_width = int_ty.get_bit_width();
        let (min, max) = if signed {
            match bit_width {
                32 => (i64::from(i32::MIN) as f64, i64::from(i32::MAX) as f64),
                _ => (i64::MIN as f64, i64::MAX as f64),
            }
        } else {
            match bit_width {
                32 => (0.0, u64::from(u32::MAX) as f64),
                _ => (0.0, u64::MAX as f64),
            }
        };
        let (min_int, max_int) = if signed {
            match bit_width {
                32 => (i64::from(i32::MIN) as u64, i64::from(i32::MAX) as u64),
                _ => (i64::MIN as u64, i64::MAX as u64),
            }
        } else {
            match bit_width {
                32 => (0, u64::from(u32::MAX)),
                _ => (0, u64::MAX),
            }
        };
        let mantissa = if fp_ty == self.ctx.f32_ty { 24 } else { 53 };
        let precise = bit_width <= mantissa;
        (
            precise,
            fp_ty.const_float(min),
            fp_ty.const_float(max),
            min_int,
            max_int,
        )
    }

    /// Trapping float→int truncation: NaN traps conversion, out-of-range
    /// traps overflow. When the integer is wider than the mantissa the upper
    /// bound constant rounds up, so the comparison must be strict.
    fn trunc_to_int(&mut self, int_ty: IntType<'ctx>, signed: bool) -> Result<()> {
        let value = self.pop()?.into_float_value();
        let fp_ty = value.get_type();
        let (precise, min_fp, max_fp, _, _) = self.trunc_bounds(int_ty, fp_ty, signed);

        let ord = self
            .builder
            .build_float_compare(FloatPredicate::ORD, value, value, "not_nan")?;
        self.trap_unless(ord, TrapCode::InvalidConvToInt)?;

        let trunc_f = self.ctx.llvm_intrinsic(
            &format!("llvm.trunc.{}", float_suffix(self, fp_ty)),
            fp_ty.fn_type(&[fp_ty.into()], false),
        );
        let trunc = self
            .call_value(trunc_f, &[value.into()])?
            .into_float_value();

        let not_under =
            self.builder
                .build_float_compare(FloatPredicate::OGE, trunc, min_fp, "not_under")?;
        self.trap_unless(not_under, TrapCode::IntegerOverflow)?;

        let upper_pred = if precise {
            FloatPredicate::OLE
        } else {
            FloatPredicate::OLT
        };
        let not_over = self
            .builder
            .build_float_compare(upper_pred, trunc, max_fp, "not_over")?;
        self.trap_unless(not_over, TrapCode::IntegerOverflow)?;

        let v = if signed {
            self.builder.build_float_to_signed_int(trunc, int_ty, "fptosi")?
        } else {
            self.builder
                .build_float_to_unsigned_int(trunc, int_ty, "fptoui")?
        };
        self.push(v);
        Ok(())
    }

    /// Saturating truncation: total, merging `{NaN → 0, under → MIN,
    /// over → MAX, normal → trunc}` through a φ.
    fn trunc_sat_to_int(&mut self, int_ty: IntType<'ctx>, signed: bool) -> Result<()> {
        let value = self.pop()?.into_float_value();
        let fp_ty = value.get_type();
        let (precise, min_fp, max_fp, min_int, max_int) =
            self.trunc_bounds(int_ty, fp_ty, signed);
        let upper_pred = if precise {
            FloatPredicate::OLE
        } else {
            FloatPredicate::OLT
        };

        let curr = self.current_block()?;
        let trunc_f = self.ctx.llvm_intrinsic(
            &format!("llvm.trunc.{}", float_suffix(self, fp_ty)),
            fp_ty.fn_type(&[fp_ty.into()], false),
        );

        if signed {
            let norm = self.append_block("sat.norm");
            let not_min = self.append_block("sat.notmin");
            let not_max = self.append_block("sat.notmax");
            let end = self.append_block("sat.end");

            let ord = self
                .builder
                .build_float_compare(FloatPredicate::ORD, value, value, "not_nan")?;
            let ord = self.likely(ord)?;
            self.builder.build_conditional_branch(ord, norm, end)?;

            self.builder.position_at_end(norm);
            let trunc = self
                .call_value(trunc_f, &[value.into()])?
                .into_float_value();
            let not_under = self.builder.build_float_compare(
                FloatPredicate::OGE,
                trunc,
                min_fp,
                "not_under",
            )?;
            let not_under = self.likely(not_under)?;
            self.builder
                .build_conditional_branch(not_under, not_min, end)?;

            self.builder.position_at_end(not_min);
            let not_over =
                self.builder
                    .build_float_compare(upper_pred, trunc, max_fp, "not_over")?;
            let not_over = self.likely(not_over)?;
            self.builder
                .build_conditional_branch(not_over, not_max, end)?;

            self.builder.position_at_end(not_max);
            let converted = self
                .builder
                .build_float_to_signed_int(trunc, int_ty, "fptosi")?;
            self.builder.build_unconditional_branch(end)?;

            self.builder.position_at_end(end);
            let phi = self.builder.build_phi(int_ty, "sat")?;
            let zero = int_ty.const_zero();
            let min = int_ty.const_int(min_int, false);
            let max = int_ty.const_int(max_int, false);
            phi.add_incoming(&[
                (&zero, curr),
                (&min, norm),
                (&max, not_min),
                (&converted, not_max),
            ]);
            self.push(phi.as_basic_value());
        } else {
            let norm = self.append_block("sat.norm");
            let not_max = self.append_block("sat.notmax");
            let end = self.append_block("sat.end");

            // An unordered-or-underflow input saturates to zero; the OGE
            // comparison sends NaN there too.
            let trunc = self
                .call_value(trunc_f, &[value.into()])?
                .into_float_value();
            let not_under = self.builder.build_float_compare(
                FloatPredicate::OGE,
                trunc,
                min_fp,
                "not_under",
            )?;
            let not_under = self.likely(not_under)?;
            self.builder.build_conditional_branch(not_under, norm, end)?;

            self.builder.position_at_end(norm);
            let not_over =
                self.builder
                    .build_float_compare(upper_pred, trunc, max_fp, "not_over")?;
            let not_over = self.likely(not_over)?;
            self.builder
                .build_conditional_branch(not_over, not_max, end)?;

            self.builder.position_at_end(not_max);
            let converted = self
                .builder
                .build_float_to_unsigned_int(trunc, int_ty, "fptoui")?;
            self.builder.build_unconditional_branch(end)?;

            self.builder.position_at_end(end);
            let phi = self.builder.build_phi(int_ty, "sat")?;
            let min = int_ty.const_int(min_int, false);
            let max = int_ty.const_int(max_int, false);
            phi.add_incoming(&[(&min, curr), (&max, norm), (&converted, not_max)]);
            self.push(phi.as_basic_value());
        }
        Ok(())
    }

    fn sign_extend_narrow(&mut self, narrow: IntType<'ctx>, wide: IntType<'ctx>) -> Result<()> {
        let v = self.pop_int()?;
        let v = self.builder.build_int_truncate(v, narrow, "narrow")?;
        let v = self.builder.build_int_s_extend(v, wide, "sext")?;
        self.push(v);
        Ok(())
    }

    /// Call a declared function and take its single result.
    pub(crate) fn call_value(
        &mut self,
        f: inkwell::values::FunctionValue<'ctx>,
        args: &[inkwell::values::BasicMetadataValueEnum<'ctx>],
    ) -> Result<BasicValueEnum<'ctx>> {
        self.builder
            .build_call(f, args, "")?
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| anyhow!("intrinsic call returned no value"))
    }
}

fn float_suffix<'a, 'ctx>(
    fc: &FunctionCompiler<'a, 'ctx>,
    ty: inkwell::types::FloatType<'ctx>,
) -> &'static str {
    if ty == fc.ctx.f32_ty {
        "f32"
    } else {
        "f64"
    }
}
