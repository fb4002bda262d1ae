//! Per-function lowering.
//!
//! One `FunctionCompiler` turns one code-section entry into a fully formed
//! LLVM function. It simulates the WebAssembly operand stack at build time,
//! materialises structured control flow into basic blocks with φ-merges,
//! keeps a lazy cache of trap blocks, and threads the optional
//! instrumentation (instruction counting, gas metering, stop-token polling)
//! through every block boundary.

use anyhow::{anyhow, bail, Result};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::types::{BasicTypeEnum, FunctionType};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, IntValue, PhiValue,
    PointerValue, StructValue,
};
use inkwell::{AtomicOrdering, AtomicRMWBinOp, IntPredicate};
use wasmparser::{BlockType, FunctionBody, Operator, ValType};

use crate::codegen::context::CompileContext;
use crate::codegen::types::{const_zero, rets_type, undef_value, value_type};
use crate::error::{CompileError, TrapCode};
use crate::intrinsics::Intrinsic;
use crate::opcode::cost_index;

/// Compile-time record of one enclosing structured-control construct.
pub(crate) struct ControlFrame<'ctx> {
    /// Operand-stack depth at frame entry.
    pub stack_size: usize,
    /// Set once the frame's tail is statically dead.
    pub unreachable: bool,
    /// Target of a `br` to this frame: loop header, or the merge block.
    pub jump_block: BasicBlock<'ctx>,
    /// Loop frames carry a distinct exit block.
    pub next_block: Option<BasicBlock<'ctx>>,
    /// If frames carry the unvisited false arm until `else`/`end`.
    pub else_block: Option<BasicBlock<'ctx>>,
    /// Header φ-nodes fed by back-edges (loop frames only).
    pub loop_phis: Vec<PhiValue<'ctx>>,
    /// Incoming argument values, re-pushed on frame entry.
    pub args: Vec<BasicValueEnum<'ctx>>,
    pub param_types: Vec<ValType>,
    pub result_types: Vec<ValType>,
    /// `(values, origin)` pairs accumulated by branches and fall-through,
    /// merged into φ-nodes when the frame closes.
    pub return_edges: Vec<(Vec<BasicValueEnum<'ctx>>, BasicBlock<'ctx>)>,
}

pub struct FunctionCompiler<'a, 'ctx> {
    pub(crate) ctx: &'a CompileContext<'ctx>,
    pub(crate) builder: Builder<'ctx>,
    pub(crate) function: FunctionValue<'ctx>,
    pub(crate) exec_ctx: StructValue<'ctx>,
    /// One `(type, slot)` per local; parameters first.
    pub(crate) locals: Vec<(BasicTypeEnum<'ctx>, PointerValue<'ctx>)>,
    pub(crate) stack: Vec<BasicValueEnum<'ctx>>,
    pub(crate) control: Vec<ControlFrame<'ctx>>,
    trap_blocks: Vec<(TrapCode, BasicBlock<'ctx>)>,
    /// Unreachable flag for the (synthetic) outermost scope.
    is_unreachable: bool,
    interruptible: bool,
    local_instr_count: Option<PointerValue<'ctx>>,
    local_gas: Option<PointerValue<'ctx>>,
}

impl<'a, 'ctx> FunctionCompiler<'a, 'ctx> {
    pub fn new(
        ctx: &'a CompileContext<'ctx>,
        function: FunctionValue<'ctx>,
        locals: &[ValType],
        interruptible: bool,
        instruction_counting: bool,
        gas_measuring: bool,
    ) -> Result<Self> {
        let builder = ctx.ll.create_builder();
        builder.position_at_end(ctx.ll.append_basic_block(function, "entry"));

        let exec_ctx_ptr = function
            .get_nth_param(0)
            .ok_or_else(|| anyhow!("compiled function lost its context parameter"))?
            .into_pointer_value();
        let exec_ctx = builder
            .build_load(ctx.exec_ctx_ty, exec_ctx_ptr, "exec_ctx")?
            .into_struct_value();

        let local_instr_count = if instruction_counting {
            let cell = builder.build_alloca(ctx.i64_ty, "instr_acc")?;
            builder.build_store(cell, ctx.i64_ty.const_zero())?;
            Some(cell)
        } else {
            None
        };
        let local_gas = if gas_measuring {
            let cell = builder.build_alloca(ctx.i64_ty, "gas_acc")?;
            builder.build_store(cell, ctx.i64_ty.const_zero())?;
            Some(cell)
        } else {
            None
        };

        // Every parameter and declared local lives in a stack slot; reads
        // and writes become load/store and mem2reg cleans them up.
        let mut local_slots = Vec::new();
        for (i, param) in function.get_param_iter().enumerate().skip(1) {
            let ty = param.get_type();
            let slot = builder.build_alloca(ty, &format!("l{}", i - 1))?;
            builder.build_store(slot, param)?;
            local_slots.push((ty, slot));
        }
        for vt in locals {
            let ty = value_type(ctx.ll, *vt);
            let slot = builder.build_alloca(ty, &format!("l{}", local_slots.len()))?;
            builder.build_store(slot, const_zero(ctx.ll, *vt))?;
            local_slots.push((ty, slot));
        }

        Ok(Self {
            ctx,
            builder,
            function,
            exec_ctx,
            locals: local_slots,
            stack: Vec::new(),
            control: Vec::new(),
            trap_blocks: Vec::new(),
            is_unreachable: false,
            interruptible,
            local_instr_count,
            local_gas,
        })
    }

    /// Lower the whole body. `result_types` are the function's return types;
    /// validation guarantees the initial stack state, so the synthetic
    /// outermost frame takes no parameters.
    pub fn compile(&mut self, body: &FunctionBody, result_types: Vec<ValType>) -> Result<()> {
        let ret_block = self.append_block("ret");
        self.enter_block(
            ret_block,
            None,
            None,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            result_types,
            Vec::new(),
        );

        for op in body.get_operators_reader()? {
            let op = op?;
            self.accumulate_instrumentation(&op)?;
            self.translate_operator(&op)?;
        }
        debug_assert!(self.control.is_empty());
        self.compile_return()?;

        for (code, bb) in std::mem::take(&mut self.trap_blocks) {
            self.builder.position_at_end(bb);
            self.update_instr_count()?;
            self.update_gas_at_trap()?;
            let call = self.builder.build_call(
                self.ctx.trap_fn,
                &[self
                    .ctx
                    .i32_ty
                    .const_int(u64::from(code.as_u32()), false)
                    .into()],
                "",
            )?;
            call.add_attribute(
                inkwell::attributes::AttributeLoc::Function,
                self.ctx.noreturn,
            );
            self.builder.build_unreachable()?;
        }
        Ok(())
    }

    // ── Per-instruction instrumentation accumulation ──

    fn accumulate_instrumentation(&mut self, op: &Operator) -> Result<()> {
        if let Some(cell) = self.local_instr_count {
            let count = self
                .builder
                .build_load(self.ctx.i64_ty, cell, "ic")?
                .into_int_value();
            let next = self
                .builder
                .build_int_add(count, self.ctx.i64_ty.const_int(1, false), "ic_next")?;
            self.builder.build_store(cell, next)?;
        }
        if let Some(cell) = self.local_gas {
            let table = self.ctx.get_cost_table(&self.builder, self.exec_ctx)?;
            let slot = unsafe {
                self.builder.build_in_bounds_gep(
                    self.ctx.cost_table_ty,
                    table,
                    &[
                        self.ctx.i64_ty.const_zero(),
                        self.ctx
                            .i64_ty
                            .const_int(u64::from(cost_index(op)), false),
                    ],
                    "cost_slot",
                )?
            };
            let cost = self
                .builder
                .build_load(self.ctx.i64_ty, slot, "cost")?
                .into_int_value();
            let acc = self
                .builder
                .build_load(self.ctx.i64_ty, cell, "gas")?
                .into_int_value();
            let next = self.builder.build_int_add(acc, cost, "gas_next")?;
            self.builder.build_store(cell, next)?;
        }
        Ok(())
    }

    // ── Operand-stack contract ──

    pub(crate) fn push(&mut self, value: impl BasicValue<'ctx>) {
        self.stack.push(value.as_basic_value_enum());
    }

    pub(crate) fn pop(&mut self) -> Result<BasicValueEnum<'ctx>> {
        if let Some(frame) = self.control.last() {
            if self.stack.len() <= frame.stack_size {
                bail!("operand stack underflow below the frame floor");
            }
        }
        self.stack
            .pop()
            .ok_or_else(|| anyhow!("operand stack underflow"))
    }

    pub(crate) fn pop_int(&mut self) -> Result<IntValue<'ctx>> {
        Ok(self.pop()?.into_int_value())
    }

    pub(crate) fn top(&self) -> Result<BasicValueEnum<'ctx>> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| anyhow!("operand stack is empty"))
    }

    /// Pop `n` values, restoring source order.
    pub(crate) fn pop_n(&mut self, n: usize) -> Result<Vec<BasicValueEnum<'ctx>>> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.pop()?);
        }
        values.reverse();
        Ok(values)
    }

    // ── Control-stack plumbing ──

    pub(crate) fn append_block(&self, name: &str) -> BasicBlock<'ctx> {
        self.ctx.ll.append_basic_block(self.function, name)
    }

    pub(crate) fn current_block(&self) -> Result<BasicBlock<'ctx>> {
        self.builder
            .get_insert_block()
            .ok_or_else(|| anyhow!("builder is not positioned"))
    }

    pub(crate) fn is_unreachable(&self) -> bool {
        match self.control.last() {
            Some(frame) => frame.unreachable,
            None => self.is_unreachable,
        }
    }

    pub(crate) fn set_unreachable(&mut self) {
        match self.control.last_mut() {
            Some(frame) => frame.unreachable = true,
            None => self.is_unreachable = true,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn enter_block(
        &mut self,
        jump_block: BasicBlock<'ctx>,
        next_block: Option<BasicBlock<'ctx>>,
        else_block: Option<BasicBlock<'ctx>>,
        loop_phis: Vec<PhiValue<'ctx>>,
        args: Vec<BasicValueEnum<'ctx>>,
        param_types: Vec<ValType>,
        result_types: Vec<ValType>,
        return_edges: Vec<(Vec<BasicValueEnum<'ctx>>, BasicBlock<'ctx>)>,
    ) {
        for arg in &args {
            self.stack.push(*arg);
        }
        let unreachable = self.is_unreachable();
        self.control.push(ControlFrame {
            stack_size: self.stack.len() - args.len(),
            unreachable,
            jump_block,
            next_block,
            else_block,
            loop_phis,
            args,
            param_types,
            result_types,
            return_edges,
        });
    }

    /// Close the top frame: record the fall-through edge (if live), branch to
    /// the frame's continuation, and reposition there with the stack cut back
    /// to the frame floor.
    fn leave_block(&mut self) -> Result<ControlFrame<'ctx>> {
        let mut entry = self
            .control
            .pop()
            .ok_or_else(|| anyhow!("control stack underflow"))?;
        let next_block = entry.next_block.unwrap_or(entry.jump_block);
        if !entry.unreachable {
            if !entry.result_types.is_empty() {
                let rets = self.pop_n(entry.result_types.len())?;
                entry.return_edges.push((rets, self.current_block()?));
            }
            self.builder.build_unconditional_branch(next_block)?;
        } else {
            self.builder.build_unreachable()?;
        }
        self.builder.position_at_end(next_block);
        self.stack.truncate(entry.stack_size);
        Ok(entry)
    }

    /// Build the merge φ-nodes for a closed frame and push the results.
    fn build_merge_phi(
        &mut self,
        result_types: &[ValType],
        incomings: &[(Vec<BasicValueEnum<'ctx>>, BasicBlock<'ctx>)],
    ) -> Result<()> {
        if result_types.is_empty() {
            return Ok(());
        }
        match incomings {
            [] => {
                for vt in result_types {
                    let undef = undef_value(value_type(self.ctx.ll, *vt));
                    self.push(undef);
                }
            }
            [(values, _)] => {
                for value in values {
                    self.push(*value);
                }
            }
            many => {
                for (i, vt) in result_types.iter().enumerate() {
                    let phi = self
                        .builder
                        .build_phi(value_type(self.ctx.ll, *vt), "merge")?;
                    for (values, bb) in many {
                        phi.add_incoming(&[(&values[i], *bb)]);
                    }
                    self.push(phi.as_basic_value());
                }
            }
        }
        Ok(())
    }

    /// Feed a branch's values into the frame at relative depth `index`:
    /// loop headers receive φ incomings, merge blocks record return edges.
    /// The operand stack is left unchanged.
    pub(crate) fn set_label_jump_phi(&mut self, index: u32) -> Result<()> {
        let frame_idx = self
            .control
            .len()
            .checked_sub(index as usize + 1)
            .ok_or_else(|| anyhow!("branch depth {index} exceeds the control stack"))?;
        let current = self.current_block()?;
        if self.control[frame_idx].next_block.is_some() {
            let params = self.control[frame_idx].param_types.len();
            let values = self.pop_n(params)?;
            let phis = self.control[frame_idx].loop_phis.clone();
            for (phi, value) in phis.iter().zip(&values) {
                phi.add_incoming(&[(value, current)]);
            }
            for value in values {
                self.push(value);
            }
        } else if !self.control[frame_idx].result_types.is_empty() {
            let rets = self.pop_n(self.control[frame_idx].result_types.len())?;
            for value in &rets {
                self.push(*value);
            }
            self.control[frame_idx].return_edges.push((rets, current));
        }
        Ok(())
    }

    pub(crate) fn label(&self, index: u32) -> Result<BasicBlock<'ctx>> {
        let frame_idx = self
            .control
            .len()
            .checked_sub(index as usize + 1)
            .ok_or_else(|| anyhow!("branch depth {index} exceeds the control stack"))?;
        Ok(self.control[frame_idx].jump_block)
    }

    /// Block arguments at frame entry: popped from the stack, or undef when
    /// entering from dead code.
    fn block_args(&mut self, params: &[ValType]) -> Result<Vec<BasicValueEnum<'ctx>>> {
        if self.is_unreachable() {
            Ok(params
                .iter()
                .map(|vt| undef_value(value_type(self.ctx.ll, *vt)))
                .collect())
        } else {
            self.pop_n(params.len())
        }
    }

    // ── Trap paths ──

    pub(crate) fn trap_block(&mut self, code: TrapCode) -> BasicBlock<'ctx> {
        if let Some((_, bb)) = self.trap_blocks.iter().find(|(c, _)| *c == code) {
            return *bb;
        }
        let bb = self.append_block("trap");
        self.trap_blocks.push((code, bb));
        bb
    }

    /// Branch to the trap path when `cond` is false.
    pub(crate) fn trap_unless(&mut self, cond: IntValue<'ctx>, code: TrapCode) -> Result<()> {
        let ok = self.append_block("ok");
        let cond = self.likely(cond)?;
        let trap = self.trap_block(code);
        self.builder.build_conditional_branch(cond, ok, trap)?;
        self.builder.position_at_end(ok);
        Ok(())
    }

    /// `llvm.expect` hint that `cond` holds.
    pub(crate) fn likely(&self, cond: IntValue<'ctx>) -> Result<IntValue<'ctx>> {
        let i1 = self.ctx.ll.bool_type();
        let expect = self
            .ctx
            .llvm_intrinsic("llvm.expect.i1", i1.fn_type(&[i1.into(), i1.into()], false));
        let call = self.builder.build_call(
            expect,
            &[cond.into(), i1.const_int(1, false).into()],
            "expect",
        )?;
        call.try_as_basic_value()
            .basic()
            .map(|v| v.into_int_value())
            .ok_or_else(|| anyhow!("llvm.expect returned no value"))
    }

    // ── Instrumentation flushes ──

    /// Flush the local instruction counter into the execution context.
    pub(crate) fn update_instr_count(&mut self) -> Result<()> {
        if let Some(cell) = self.local_instr_count {
            let count = self
                .builder
                .build_load(self.ctx.i64_ty, cell, "ic")?
                .into_int_value();
            let target = self.ctx.get_instr_count(&self.builder, self.exec_ctx)?;
            self.builder.build_atomicrmw(
                AtomicRMWBinOp::Add,
                target,
                count,
                AtomicOrdering::Monotonic,
            )?;
            self.builder.build_store(cell, self.ctx.i64_ty.const_zero())?;
        }
        Ok(())
    }

    /// Publish accumulated gas through a CAS retry loop, trapping once the
    /// new total exceeds the limit.
    pub(crate) fn update_gas(&mut self) -> Result<()> {
        let Some(cell) = self.local_gas else {
            return Ok(());
        };
        let curr = self.current_block()?;
        let check = self.append_block("gas_check");
        let ok = self.append_block("gas_ok");
        let end = self.append_block("gas_end");

        let cost = self
            .builder
            .build_load(self.ctx.i64_ty, cell, "gas_cost")?
            .into_int_value();
        let gas_ptr = self.ctx.get_gas(&self.builder, self.exec_ctx)?;
        let gas_limit = self.ctx.get_gas_limit(&self.builder, self.exec_ctx)?;
        let gas = self
            .builder
            .build_load(self.ctx.i64_ty, gas_ptr, "gas_now")?;
        if let Some(inst) = gas.as_instruction_value() {
            inst.set_alignment(8)
                .map_err(|e| anyhow!("gas load alignment: {e}"))?;
            inst.set_atomic_ordering(AtomicOrdering::Monotonic)
                .map_err(|e| anyhow!("gas load ordering: {e}"))?;
        }
        self.builder.build_unconditional_branch(check)?;

        self.builder.position_at_end(check);
        let old_gas = self.builder.build_phi(self.ctx.i64_ty, "gas_old")?;
        let new_gas = self.builder.build_int_add(
            old_gas.as_basic_value().into_int_value(),
            cost,
            "gas_new",
        )?;
        let within = self
            .builder
            .build_int_compare(IntPredicate::ULE, new_gas, gas_limit, "gas_within")?;
        let within = self.likely(within)?;
        let trap = self.trap_block(TrapCode::CostLimitExceeded);
        self.builder.build_conditional_branch(within, ok, trap)?;

        self.builder.position_at_end(ok);
        let exchanged = self.builder.build_cmpxchg(
            gas_ptr,
            old_gas.as_basic_value().into_int_value(),
            new_gas,
            AtomicOrdering::Monotonic,
            AtomicOrdering::Monotonic,
        )?;
        let seen = self
            .builder
            .build_extract_value(exchanged, 0, "gas_seen")?;
        let succeeded = self
            .builder
            .build_extract_value(exchanged, 1, "gas_written")?
            .into_int_value();
        let succeeded = self.likely(succeeded)?;
        self.builder.build_conditional_branch(succeeded, end, check)?;

        self.builder.position_at_end(end);
        self.builder.build_store(cell, self.ctx.i64_ty.const_zero())?;

        old_gas.add_incoming(&[(&gas, curr), (&seen, ok)]);
        Ok(())
    }

    /// On trap paths the accumulator is published unconditionally; the limit
    /// no longer matters once execution aborts.
    fn update_gas_at_trap(&mut self) -> Result<()> {
        if let Some(cell) = self.local_gas {
            let cost = self
                .builder
                .build_load(self.ctx.i64_ty, cell, "gas_cost")?
                .into_int_value();
            let gas_ptr = self.ctx.get_gas(&self.builder, self.exec_ctx)?;
            self.builder.build_atomicrmw(
                AtomicRMWBinOp::Add,
                gas_ptr,
                cost,
                AtomicOrdering::Monotonic,
            )?;
        }
        Ok(())
    }

    /// Poll the stop token (atomic exchange with zero) and trap when it was
    /// set. Emitted at block entries when the module is interruptible.
    pub(crate) fn check_stop(&mut self) -> Result<()> {
        if !self.interruptible {
            return Ok(());
        }
        let token_ptr = self.ctx.get_stop_token(&self.builder, self.exec_ctx)?;
        let token = self.builder.build_atomicrmw(
            AtomicRMWBinOp::Xchg,
            token_ptr,
            self.ctx.i32_ty.const_zero(),
            AtomicOrdering::Monotonic,
        )?;
        let not_stopped = self.builder.build_int_compare(
            IntPredicate::EQ,
            token,
            self.ctx.i32_ty.const_zero(),
            "not_stopped",
        )?;
        self.trap_unless(not_stopped, TrapCode::Interrupted)
    }

    // ── Function return ──

    pub(crate) fn compile_return(&mut self) -> Result<()> {
        self.update_instr_count()?;
        self.update_gas()?;
        match self.function.get_type().get_return_type() {
            None => {
                self.builder.build_return(None)?;
            }
            Some(ty) if ty.is_struct_type() => {
                let count = ty.into_struct_type().count_fields() as usize;
                let values = self.pop_n(count)?;
                self.builder.build_aggregate_return(&values)?;
            }
            Some(_) => {
                let value = self.pop()?;
                self.builder.build_return(Some(&value))?;
            }
        }
        Ok(())
    }

    // ── Control opcodes ──

    fn op_block(&mut self, blockty: BlockType) -> Result<()> {
        let body = self.append_block("block");
        let end = self.append_block("block.end");
        self.builder.build_unconditional_branch(body)?;
        self.builder.position_at_end(body);
        let (params, results) = self.ctx.resolve_block_type(blockty)?;
        let args = self.block_args(&params)?;
        self.enter_block(end, None, None, Vec::new(), args, params, results, Vec::new());
        self.update_instr_count()?;
        self.check_stop()?;
        self.update_gas()
    }

    fn op_loop(&mut self, blockty: BlockType) -> Result<()> {
        let curr = self.current_block()?;
        let header = self.append_block("loop");
        let end = self.append_block("loop.end");
        self.builder.build_unconditional_branch(header)?;
        self.builder.position_at_end(header);
        let (params, results) = self.ctx.resolve_block_type(blockty)?;
        let args = self.block_args(&params)?;
        let mut phis = Vec::with_capacity(args.len());
        let mut phi_args = Vec::with_capacity(args.len());
        for value in &args {
            let phi = self.builder.build_phi(value.get_type(), "loop_arg")?;
            phi.add_incoming(&[(value, curr)]);
            phis.push(phi);
            phi_args.push(phi.as_basic_value());
        }
        self.enter_block(
            header,
            Some(end),
            None,
            phis,
            phi_args,
            params,
            results,
            Vec::new(),
        );
        self.update_instr_count()?;
        self.check_stop()?;
        self.update_gas()
    }

    fn op_if(&mut self, blockty: BlockType) -> Result<()> {
        let then_bb = self.append_block("then");
        let else_bb = self.append_block("else");
        let end = self.append_block("if.end");
        let cond = if self.is_unreachable() {
            self.ctx.ll.bool_type().get_undef()
        } else {
            let value = self.pop_int()?;
            self.builder.build_int_compare(
                IntPredicate::NE,
                value,
                self.ctx.i32_ty.const_zero(),
                "if_cond",
            )?
        };
        self.builder.build_conditional_branch(cond, then_bb, else_bb)?;
        self.builder.position_at_end(then_bb);
        let (params, results) = self.ctx.resolve_block_type(blockty)?;
        let args = self.block_args(&params)?;
        self.enter_block(
            end,
            None,
            Some(else_bb),
            Vec::new(),
            args,
            params,
            results,
            Vec::new(),
        );
        self.check_stop()
    }

    fn op_else(&mut self) -> Result<()> {
        let entry = self.leave_block()?;
        let else_bb = entry
            .else_block
            .ok_or_else(|| anyhow!("else outside an if frame"))?;
        self.builder.position_at_end(else_bb);
        self.enter_block(
            entry.jump_block,
            None,
            None,
            Vec::new(),
            entry.args,
            entry.param_types,
            entry.result_types,
            entry.return_edges,
        );
        Ok(())
    }

    fn op_end(&mut self) -> Result<()> {
        let mut entry = self.leave_block()?;
        if let Some(else_bb) = entry.else_block {
            // An if with no taken else: synthesise the empty false arm, which
            // forwards the block inputs straight to the merge.
            let merge = self.current_block()?;
            self.builder.position_at_end(else_bb);
            self.enter_block(
                merge,
                None,
                None,
                Vec::new(),
                entry.args,
                entry.param_types,
                entry.result_types,
                entry.return_edges,
            );
            entry = self.leave_block()?;
        }
        // The flush goes after the merge φs so they stay at the block head.
        self.build_merge_phi(&entry.result_types, &entry.return_edges)?;
        self.update_instr_count()
    }

    fn op_br(&mut self, depth: u32) -> Result<()> {
        self.set_label_jump_phi(depth)?;
        let target = self.label(depth)?;
        self.builder.build_unconditional_branch(target)?;
        self.set_unreachable();
        let dead = self.append_block("br.end");
        self.builder.position_at_end(dead);
        Ok(())
    }

    fn op_br_if(&mut self, depth: u32) -> Result<()> {
        let value = self.pop_int()?;
        let cond = self.builder.build_int_compare(
            IntPredicate::NE,
            value,
            self.ctx.i32_ty.const_zero(),
            "br_cond",
        )?;
        self.set_label_jump_phi(depth)?;
        let next = self.append_block("br_if.end");
        let target = self.label(depth)?;
        self.builder.build_conditional_branch(cond, target, next)?;
        self.builder.position_at_end(next);
        Ok(())
    }

    fn op_br_table(&mut self, targets: &wasmparser::BrTable) -> Result<()> {
        let selector = self.pop_int()?;
        let default_depth = targets.default();
        self.set_label_jump_phi(default_depth)?;
        let default_bb = self.label(default_depth)?;
        let mut cases = Vec::with_capacity(targets.len() as usize);
        for (i, depth) in targets.targets().enumerate() {
            let depth = depth?;
            self.set_label_jump_phi(depth)?;
            cases.push((
                self.ctx.i32_ty.const_int(i as u64, false),
                self.label(depth)?,
            ));
        }
        self.builder.build_switch(selector, default_bb, &cases)?;
        self.set_unreachable();
        let dead = self.append_block("br_table.end");
        self.builder.position_at_end(dead);
        Ok(())
    }

    // ── Calls ──

    /// Pop call arguments and prepend the execution-context parameter.
    /// Returns both the call-site argument list and the raw popped values.
    #[allow(clippy::type_complexity)]
    fn call_args(
        &mut self,
        count: usize,
    ) -> Result<(Vec<BasicMetadataValueEnum<'ctx>>, Vec<BasicValueEnum<'ctx>>)> {
        let values = self.pop_n(count)?;
        let mut args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(count + 1);
        args.push(
            self.function
                .get_nth_param(0)
                .ok_or_else(|| anyhow!("missing context parameter"))?
                .into(),
        );
        args.extend(values.iter().map(|v| (*v).into()));
        Ok((args, values))
    }

    fn push_call_results(&mut self, ret: Option<BasicValueEnum<'ctx>>) -> Result<()> {
        match ret {
            None => {}
            Some(value) if value.is_struct_value() => {
                let agg = value.into_struct_value();
                for i in 0..agg.get_type().count_fields() {
                    let field = self.builder.build_extract_value(agg, i, "ret")?;
                    self.push(field);
                }
            }
            Some(value) => self.push(value),
        }
        Ok(())
    }

    fn op_call(&mut self, func_idx: u32) -> Result<()> {
        self.update_instr_count()?;
        self.update_gas()?;
        let (type_idx, callee) = self.ctx.functions[func_idx as usize];
        let param_count = self.ctx.func_type_of(type_idx)?.params().len();
        let (args, _) = self.call_args(param_count)?;
        let ret = self
            .builder
            .build_call(callee, &args, "call")?
            .try_as_basic_value()
            .basic();
        self.push_call_results(ret)
    }

    fn op_return_call(&mut self, func_idx: u32) -> Result<()> {
        self.update_instr_count()?;
        self.update_gas()?;
        let (type_idx, callee) = self.ctx.functions[func_idx as usize];
        let param_count = self.ctx.func_type_of(type_idx)?.params().len();
        let (args, _) = self.call_args(param_count)?;
        let ret = self
            .builder
            .build_call(callee, &args, "tail")?
            .try_as_basic_value()
            .basic();
        match ret {
            None => self.builder.build_return(None)?,
            Some(value) => self.builder.build_return(Some(&value))?,
        };
        self.set_unreachable();
        let dead = self.append_block("ret_call.end");
        self.builder.position_at_end(dead);
        Ok(())
    }

    /// ValVariant scratch buffer of `count` 16-byte slots.
    pub(crate) fn val_buffer(&mut self, count: usize) -> Result<PointerValue<'ctx>> {
        let ty = self.ctx.i64x2_ty.array_type(count as u32);
        Ok(self.builder.build_alloca(ty, "val_buf")?)
    }

    pub(crate) fn store_val_slot(
        &mut self,
        buf: PointerValue<'ctx>,
        count: usize,
        index: usize,
        value: BasicValueEnum<'ctx>,
    ) -> Result<()> {
        let ty = self.ctx.i64x2_ty.array_type(count as u32);
        let slot = unsafe {
            self.builder.build_in_bounds_gep(
                ty,
                buf,
                &[
                    self.ctx.i64_ty.const_zero(),
                    self.ctx.i64_ty.const_int(index as u64, false),
                ],
                "slot",
            )?
        };
        self.builder.build_store(slot, value)?;
        Ok(())
    }

    pub(crate) fn load_val_slot(
        &mut self,
        buf: PointerValue<'ctx>,
        count: usize,
        index: usize,
        ty: BasicTypeEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>> {
        let buf_ty = self.ctx.i64x2_ty.array_type(count as u32);
        let slot = unsafe {
            self.builder.build_in_bounds_gep(
                buf_ty,
                buf,
                &[
                    self.ctx.i64_ty.const_zero(),
                    self.ctx.i64_ty.const_int(index as u64, false),
                ],
                "slot",
            )?
        };
        Ok(self.builder.build_load(ty, slot, "val")?)
    }

    /// Shared tail of `call_indirect`/`call_ref`: branch on whether a direct
    /// function pointer is available, call it directly when it is, and fall
    /// back to the generic dispatch intrinsic otherwise. `tail_call` turns
    /// both arms into returns instead of a φ-merge.
    #[allow(clippy::too_many_arguments)]
    fn dispatch_maybe_direct(
        &mut self,
        fn_ty: FunctionType<'ctx>,
        fn_ptr: PointerValue<'ctx>,
        args: Vec<BasicMetadataValueEnum<'ctx>>,
        arg_values: Vec<BasicValueEnum<'ctx>>,
        result_types: &[ValType],
        generic: Intrinsic,
        generic_ty: FunctionType<'ctx>,
        generic_args_head: Vec<BasicMetadataValueEnum<'ctx>>,
        tail_call: bool,
    ) -> Result<()> {
        let not_null_bb = self.append_block("dispatch.direct");
        let is_null_bb = self.append_block("dispatch.generic");
        let ret_size = result_types.len();

        let is_null = self.builder.build_is_null(fn_ptr, "fn_missing")?;
        let have_symbol = self.builder.build_not(is_null, "fn_present")?;
        let have_symbol = self.likely(have_symbol)?;
        self.builder
            .build_conditional_branch(have_symbol, not_null_bb, is_null_bb)?;

        // Direct path: an in-module target, called on the native signature.
        self.builder.position_at_end(not_null_bb);
        let direct_ret = self
            .builder
            .build_indirect_call(fn_ty, fn_ptr, &args, "direct")?
            .try_as_basic_value()
            .basic();
        let mut direct_rets = Vec::with_capacity(ret_size);
        match direct_ret {
            None => {}
            Some(value) if value.is_struct_value() => {
                let agg = value.into_struct_value();
                for i in 0..agg.get_type().count_fields() {
                    direct_rets.push(self.builder.build_extract_value(agg, i, "ret")?);
                }
            }
            Some(value) => direct_rets.push(value),
        }
        let direct_end = self.current_block()?;
        if tail_call {
            match direct_ret {
                None => self.builder.build_return(None)?,
                Some(value) => self.builder.build_return(Some(&value))?,
            };
        }

        // Generic path: marshal through ValVariant buffers and let the host
        // dispatch.
        self.builder.position_at_end(is_null_bb);
        let arg_count = arg_values.len();
        let args_buf = self.val_buffer(arg_count)?;
        let rets_buf = self.val_buffer(ret_size)?;
        for (i, value) in arg_values.iter().enumerate() {
            self.store_val_slot(args_buf, arg_count, i, *value)?;
        }
        let mut intr_args = generic_args_head;
        intr_args.push(args_buf.into());
        intr_args.push(rets_buf.into());
        self.ctx
            .call_intrinsic(&self.builder, generic, generic_ty, &intr_args)?;
        let mut generic_rets = Vec::with_capacity(ret_size);
        for (i, vt) in result_types.iter().enumerate() {
            let ty = value_type(self.ctx.ll, *vt);
            generic_rets.push(self.load_val_slot(rets_buf, ret_size, i, ty)?);
        }
        let generic_end = self.current_block()?;

        if tail_call {
            match rets_type(self.ctx.ll, result_types) {
                None => {
                    self.builder.build_return(None)?;
                }
                Some(ty) if ty.is_struct_type() => {
                    self.builder.build_aggregate_return(&generic_rets)?;
                }
                Some(_) => {
                    self.builder.build_return(Some(&generic_rets[0]))?;
                }
            }
            return Ok(());
        }

        let end = self.append_block("dispatch.end");
        self.builder.build_unconditional_branch(end)?;
        self.builder.position_at_end(direct_end);
        self.builder.build_unconditional_branch(end)?;
        self.builder.position_at_end(end);
        for i in 0..ret_size {
            let phi = self
                .builder
                .build_phi(direct_rets[i].get_type(), "dispatch_ret")?;
            phi.add_incoming(&[(&direct_rets[i], direct_end), (&generic_rets[i], generic_end)]);
            self.push(phi.as_basic_value());
        }
        Ok(())
    }

    fn op_call_indirect(&mut self, table_idx: u32, type_idx: u32, tail_call: bool) -> Result<()> {
        self.update_instr_count()?;
        self.update_gas()?;
        let func_idx = self.pop_int()?;
        let func_ty = self.ctx.func_type_of(type_idx)?.clone();
        let fn_ty = crate::codegen::types::function_type(self.ctx.ll, &func_ty);
        let (args, arg_values) = self.call_args(func_ty.params().len())?;

        let lookup_ty = self.ctx.ptr_ty.fn_type(
            &[
                self.ctx.i32_ty.into(),
                self.ctx.i32_ty.into(),
                self.ctx.i32_ty.into(),
            ],
            false,
        );
        let fn_ptr = self
            .ctx
            .call_intrinsic(
                &self.builder,
                Intrinsic::TableGetFuncSymbol,
                lookup_ty,
                &[
                    self.ctx.i32_ty.const_int(u64::from(table_idx), false).into(),
                    self.ctx.i32_ty.const_int(u64::from(type_idx), false).into(),
                    func_idx.into(),
                ],
            )?
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| anyhow!("table lookup returned no value"))?
            .into_pointer_value();

        let generic_ty = self.ctx.ll.void_type().fn_type(
            &[
                self.ctx.i32_ty.into(),
                self.ctx.i32_ty.into(),
                self.ctx.i32_ty.into(),
                self.ctx.ptr_ty.into(),
                self.ctx.ptr_ty.into(),
            ],
            false,
        );
        self.dispatch_maybe_direct(
            fn_ty,
            fn_ptr,
            args,
            arg_values,
            func_ty.results(),
            Intrinsic::CallIndirect,
            generic_ty,
            vec![
                self.ctx.i32_ty.const_int(u64::from(table_idx), false).into(),
                self.ctx.i32_ty.const_int(u64::from(type_idx), false).into(),
                func_idx.into(),
            ],
            tail_call,
        )?;
        if tail_call {
            self.set_unreachable();
            let dead = self.append_block("ret_call_indirect.end");
            self.builder.position_at_end(dead);
        }
        Ok(())
    }

    fn op_call_ref(&mut self, type_idx: u32, tail_call: bool) -> Result<()> {
        self.update_instr_count()?;
        self.update_gas()?;
        let reference = self.pop()?.into_vector_value();
        let payload = self
            .builder
            .build_extract_element(reference, self.ctx.i64_ty.const_int(1, false), "ref_ptr")?
            .into_int_value();
        let non_null = self.builder.build_int_compare(
            IntPredicate::NE,
            payload,
            self.ctx.i64_ty.const_zero(),
            "ref_non_null",
        )?;
        self.trap_unless(non_null, TrapCode::AccessNullFunc)?;

        let func_ty = self.ctx.func_type_of(type_idx)?.clone();
        let fn_ty = crate::codegen::types::function_type(self.ctx.ll, &func_ty);
        let (args, arg_values) = self.call_args(func_ty.params().len())?;

        let lookup_ty = self
            .ctx
            .ptr_ty
            .fn_type(&[self.ctx.i64x2_ty.into()], false);
        let fn_ptr = self
            .ctx
            .call_intrinsic(
                &self.builder,
                Intrinsic::RefGetFuncSymbol,
                lookup_ty,
                &[reference.into()],
            )?
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| anyhow!("ref lookup returned no value"))?
            .into_pointer_value();

        let generic_ty = self.ctx.ll.void_type().fn_type(
            &[
                self.ctx.i64x2_ty.into(),
                self.ctx.ptr_ty.into(),
                self.ctx.ptr_ty.into(),
            ],
            false,
        );
        self.dispatch_maybe_direct(
            fn_ty,
            fn_ptr,
            args,
            arg_values,
            func_ty.results(),
            Intrinsic::CallRef,
            generic_ty,
            vec![reference.into()],
            tail_call,
        )?;
        if tail_call {
            self.set_unreachable();
            let dead = self.append_block("ret_call_ref.end");
            self.builder.position_at_end(dead);
        }
        Ok(())
    }

    // ── Dispatch ──

    fn translate_operator(&mut self, op: &Operator) -> Result<()> {
        // Structural opcodes run even in dead code so nesting stays matched.
        match op {
            Operator::Block { blockty } => return self.op_block(*blockty),
            Operator::Loop { blockty } => return self.op_loop(*blockty),
            Operator::If { blockty } => return self.op_if(*blockty),
            Operator::Else => return self.op_else(),
            Operator::End => {
                return if self.control.is_empty() {
                    // Closing `end` of the body; the return is emitted by
                    // `compile` after the stream.
                    Ok(())
                } else {
                    self.op_end()
                }
            }
            _ => {}
        }

        if self.is_unreachable() {
            return Ok(());
        }

        match op {
            Operator::TryTable { .. } | Operator::Throw { .. } | Operator::ThrowRef => {
                bail!(CompileError::InvalidConfigure(
                    "exception handling is not supported".into()
                ))
            }
            Operator::Unreachable => {
                let trap = self.trap_block(TrapCode::Unreachable);
                self.builder.build_unconditional_branch(trap)?;
                self.set_unreachable();
                let dead = self.append_block("unreachable.end");
                self.builder.position_at_end(dead);
                Ok(())
            }
            Operator::Nop => Ok(()),
            Operator::Br { relative_depth } => self.op_br(*relative_depth),
            Operator::BrIf { relative_depth } => self.op_br_if(*relative_depth),
            Operator::BrTable { targets } => self.op_br_table(targets),
            Operator::Return => {
                self.compile_return()?;
                self.set_unreachable();
                let dead = self.append_block("ret.end");
                self.builder.position_at_end(dead);
                Ok(())
            }
            Operator::Call { function_index } => self.op_call(*function_index),
            Operator::ReturnCall { function_index } => self.op_return_call(*function_index),
            Operator::CallIndirect {
                type_index,
                table_index,
            } => self.op_call_indirect(*table_index, *type_index, false),
            Operator::ReturnCallIndirect {
                type_index,
                table_index,
            } => self.op_call_indirect(*table_index, *type_index, true),
            Operator::CallRef { type_index } => self.op_call_ref(*type_index, false),
            Operator::ReturnCallRef { type_index } => self.op_call_ref(*type_index, true),

            Operator::Drop => {
                self.pop()?;
                Ok(())
            }
            Operator::Select | Operator::TypedSelect { .. } => {
                let cond_value = self.pop_int()?;
                let cond = self.builder.build_int_compare(
                    IntPredicate::NE,
                    cond_value,
                    self.ctx.i32_ty.const_zero(),
                    "sel_cond",
                )?;
                let on_false = self.pop()?;
                let on_true = self.pop()?;
                let value = self
                    .builder
                    .build_select(cond, on_true, on_false, "select")?;
                self.push(value);
                Ok(())
            }

            Operator::LocalGet { local_index } => {
                let (ty, slot) = self.locals[*local_index as usize];
                let value = self.builder.build_load(ty, slot, "local")?;
                self.push(value);
                Ok(())
            }
            Operator::LocalSet { local_index } => {
                let value = self.pop()?;
                let (_, slot) = self.locals[*local_index as usize];
                self.builder.build_store(slot, value)?;
                Ok(())
            }
            Operator::LocalTee { local_index } => {
                let value = self.top()?;
                let (_, slot) = self.locals[*local_index as usize];
                self.builder.build_store(slot, value)?;
                Ok(())
            }
            Operator::GlobalGet { global_index } => {
                let (ty, ptr) = self
                    .ctx
                    .get_global(&self.builder, self.exec_ctx, *global_index)?;
                let value = self.builder.build_load(ty, ptr, "global")?;
                self.push(value);
                Ok(())
            }
            Operator::GlobalSet { global_index } => {
                let value = self.pop()?;
                let (_, ptr) = self
                    .ctx
                    .get_global(&self.builder, self.exec_ctx, *global_index)?;
                self.builder.build_store(ptr, value)?;
                Ok(())
            }

            _ => {
                if self.translate_numeric(op)?
                    || self.translate_memory(op)?
                    || self.translate_atomic(op)?
                    || self.translate_reference(op)?
                    || self.translate_simd(op)?
                {
                    Ok(())
                } else {
                    bail!(CompileError::Unsupported(format!("{op:?}")))
                }
            }
        }
    }
}
