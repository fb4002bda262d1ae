//! End-to-end tests for the compilation pipeline: WAT → validated module →
//! LLVM IR. Assertions run against the verified module and its printed IR,
//! pinning the lowering contracts (trap paths, φ-merges, masked shifts,
//! instrumentation shapes) rather than executing native code.

use anyhow::{Context, Result};
use ingot::{compile, CompileOptions, CompiledModule, OptimizationLevel};

/// Compile WAT at O0 so the emitted shapes survive into the printed IR.
fn compile_wat<'ctx>(
    ll: &'ctx inkwell::context::Context,
    wat_source: &str,
    options: &CompileOptions,
) -> Result<CompiledModule<'ctx>> {
    let wasm = wat::parse_str(wat_source).context("failed to parse WAT")?;
    compile(ll, "test", &wasm, options)
}

fn o0() -> CompileOptions {
    CompileOptions {
        optimization_level: OptimizationLevel::O0,
        is_generic_binary: true,
        ..CompileOptions::default()
    }
}

/// Every block of every emitted function must carry exactly one terminator;
/// `Module::verify` (run inside `compile`) checks the rest, this checks that
/// no block was left open before verification.
fn assert_blocks_terminated(compiled: &CompiledModule) {
    let mut f = compiled.module.get_first_function();
    while let Some(func) = f {
        for bb in func.get_basic_blocks() {
            assert!(
                bb.get_terminator().is_some(),
                "unterminated block in {:?}",
                func.get_name()
            );
        }
        f = func.get_next_function();
    }
}

#[test]
fn plain_add() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add
            )
        )
    "#,
        &o0(),
    )?;
    assert_blocks_terminated(&compiled);

    let ir = compiled.print_ir();
    assert!(compiled.module.get_function("f0").is_some());
    assert!(compiled.module.get_function("t0").is_some());
    assert!(compiled.module.get_global("intrinsics").is_some());
    assert!(compiled.module.get_global("version").is_some());
    assert!(ir.contains("add i32"));
    Ok(())
}

#[test]
fn function_signature_carries_exec_ctx_first() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"(module (func (param f64) (result f64) local.get 0))"#,
        &o0(),
    )?;
    let f0 = compiled.module.get_function("f0").unwrap();
    assert_eq!(f0.count_params(), 2);
    assert!(f0.get_nth_param(0).unwrap().is_pointer_value());
    assert!(f0.get_nth_param(1).unwrap().is_float_value());
    Ok(())
}

#[test]
fn loop_sum_builds_header_phis() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                (local i32 i32)
                (block
                    (loop
                        local.get 1
                        local.get 0
                        i32.ge_u
                        br_if 1
                        local.get 2
                        local.get 1
                        i32.add
                        local.set 2
                        local.get 1
                        i32.const 1
                        i32.add
                        local.set 1
                        br 0
                    )
                )
                local.get 2
            )
        )
    "#,
        &o0(),
    )?;
    assert_blocks_terminated(&compiled);
    let ir = compiled.print_ir();
    assert!(ir.contains("loop"));
    assert!(ir.contains("br i1"));
    Ok(())
}

#[test]
fn block_results_merge_through_phi() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                (block (result i32)
                    i32.const 7
                    local.get 0
                    br_if 0
                    drop
                    i32.const 9
                )
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("phi i32"), "merge point must build a φ:\n{ir}");
    Ok(())
}

#[test]
fn signed_division_emits_both_trap_checks() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.div_s
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    // DivideByZero (140) and IntegerOverflow (141) trap blocks, each ending
    // in the no-return trap helper.
    assert!(ir.contains("i32 140"));
    assert!(ir.contains("i32 141"));
    assert!(ir.contains("call void @trap"));
    assert!(ir.contains("unreachable"));
    assert!(ir.contains("sdiv i32"));
    Ok(())
}

#[test]
fn rem_s_overflow_pattern_yields_zero_without_trapping() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.rem_s
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("srem i32"));
    // Only the zero-divisor trap; INT_MIN % -1 merges a 0 through a φ.
    assert!(ir.contains("i32 140"));
    assert!(!ir.contains("i32 141"));
    assert!(ir.contains("phi i32"));
    Ok(())
}

#[test]
fn shifts_mask_their_count() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.shl
            )
            (func (param i64 i64) (result i64)
                local.get 0
                local.get 1
                i64.rotl
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains(", 31"));
    assert!(ir.contains("llvm.fshl.i64"));
    Ok(())
}

#[test]
fn trapping_trunc_checks_nan_and_range() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param f32) (result i32)
                local.get 0
                i32.trunc_f32_s
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    // InvalidConvToInt (142) on NaN, IntegerOverflow (141) out of range.
    assert!(ir.contains("i32 142"));
    assert!(ir.contains("i32 141"));
    assert!(ir.contains("fptosi"));
    Ok(())
}

#[test]
fn saturating_trunc_is_total() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param f32) (result i32)
                local.get 0
                i32.trunc_sat_f32_s
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(!ir.contains("call void @trap"), "saturating trunc never traps");
    assert!(ir.contains("phi i32"));
    assert!(ir.contains("fptosi"));
    Ok(())
}

#[test]
fn float_min_handles_nan_and_signed_zero() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param f32 f32) (result f32)
                local.get 0
                local.get 1
                f32.min
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("llvm.minnum.f32"));
    assert!(ir.contains("fcmp ueq"));
    assert!(ir.contains("fcmp uno"));
    // The signed-zero merge goes through integer or.
    assert!(ir.contains("or i32"));
    Ok(())
}

#[test]
fn memory_access_is_volatile_unaligned() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (memory 1)
            (func (param i32) (result i32)
                local.get 0
                i32.load offset=16
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("load volatile i32"));
    assert!(ir.contains("align 1"));
    assert!(ir.contains("!invariant.group"));
    Ok(())
}

#[test]
fn indirect_call_takes_fast_and_generic_paths() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (type $binop (func (param i32 i32) (result i32)))
            (table 2 funcref)
            (func $add (type $binop) local.get 0 local.get 1 i32.add)
            (elem (i32.const 0) $add)
            (func (param i32) (result i32)
                i32.const 7
                i32.const 35
                local.get 0
                call_indirect (type $binop)
            )
        )
    "#,
        &o0(),
    )?;
    assert_blocks_terminated(&compiled);
    let ir = compiled.print_ir();
    // One arm calls the resolved pointer directly, the other marshals
    // through the generic dispatch intrinsic; a φ merges the results.
    assert!(ir.contains("dispatch.direct"));
    assert!(ir.contains("dispatch.generic"));
    assert!(ir.contains("phi i32"));
    assert!(ir.contains("@intrinsics"));
    Ok(())
}

#[test]
fn import_thunk_marshals_through_call_intrinsic() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (import "env" "log" (func $log (param i32)))
            (func (export "run") i32.const 3 call $log)
        )
    "#,
        &o0(),
    )?;
    let f0 = compiled.module.get_function("f0").unwrap();
    assert_eq!(
        f0.get_linkage(),
        inkwell::module::Linkage::Internal,
        "import thunks are internal"
    );
    assert!(compiled.module.get_function("f1").is_some());
    Ok(())
}

#[test]
fn atomic_rmw_is_seq_cst_with_alignment_trap() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (memory 1 1 shared)
            (func (param i32) (result i32)
                local.get 0
                i32.const 3
                i32.atomic.rmw.add
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("atomicrmw add"));
    assert!(ir.contains("seq_cst"));
    // UnalignedAtomicAccess trap code.
    assert!(ir.contains("i32 154"));
    Ok(())
}

#[test]
fn swizzle_generic_binary_uses_portable_fallback() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param v128 v128) (result v128)
                local.get 0
                local.get 1
                i8x16.swizzle
            )
        )
    "#,
        &o0(),
    )?;
    assert_blocks_terminated(&compiled);
    let ir = compiled.print_ir();
    // Generic binaries must not touch pshufb/tbl1.
    assert!(!ir.contains("pshuf"));
    assert!(!ir.contains("tbl1"));
    assert!(ir.contains("select"));
    Ok(())
}

#[test]
fn simd_stays_canonical_on_the_stack() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param v128 v128) (result v128)
                local.get 0
                local.get 1
                i32x4.add
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("<4 x i32>"));
    assert!(ir.contains("<2 x i64>"));
    Ok(())
}

#[test]
fn gas_metering_emits_cas_loop_and_limit_trap() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let options = CompileOptions {
        cost_measuring: true,
        ..o0()
    };
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                (local i32)
                (block
                    (loop
                        local.get 1
                        local.get 0
                        i32.ge_u
                        br_if 1
                        local.get 1
                        i32.const 1
                        i32.add
                        local.set 1
                        br 0
                    )
                )
                local.get 1
            )
        )
    "#,
        &options,
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("cmpxchg"));
    // CostLimitExceeded trap code.
    assert!(ir.contains("i32 160"));
    // The accumulator reads costs from the execution context's table.
    assert!(ir.contains("gas"));
    Ok(())
}

#[test]
fn gas_metering_off_leaves_no_cas() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"(module (func (param i32) (result i32) local.get 0))"#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(!ir.contains("cmpxchg"));
    assert!(!ir.contains("atomicrmw"));
    Ok(())
}

#[test]
fn instruction_counting_flushes_with_atomic_add() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let options = CompileOptions {
        instruction_counting: true,
        ..o0()
    };
    let compiled = compile_wat(
        &ll,
        r#"(module (func (param i32) (result i32) local.get 0))"#,
        &options,
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("atomicrmw add"));
    assert!(ir.contains("monotonic"));
    Ok(())
}

#[test]
fn instruction_counting_flushes_at_block_boundaries() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let options = CompileOptions {
        instruction_counting: true,
        ..o0()
    };
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                (local i32 i32)
                (block
                    (loop
                        local.get 1
                        local.get 0
                        i32.ge_u
                        br_if 1
                        local.get 2
                        local.get 1
                        i32.add
                        local.set 2
                        local.get 1
                        i32.const 1
                        i32.add
                        local.set 1
                        br 0
                    )
                )
                local.get 2
            )
        )
    "#,
        &options,
    )?;
    let ir = compiled.print_ir();
    // One flush per block/loop entry and per `end` merge, plus the return:
    // a straight-line body would carry at most two. The loop-entry flush in
    // particular puts an atomicrmw inside the loop body, not just at the
    // final return block.
    let flushes = ir.matches("atomicrmw add").count();
    assert!(
        flushes >= 4,
        "expected boundary flushes inside the loop, found {flushes}:\n{ir}"
    );
    let loop_header = ir.find("loop").expect("loop header label in IR");
    let last_flush = ir.rfind("atomicrmw add").expect("counter flush in IR");
    assert!(loop_header < last_flush, "no flush after the loop header");
    Ok(())
}

#[test]
fn interruptible_polls_the_stop_token() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let options = CompileOptions {
        interruptible: true,
        ..o0()
    };
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                (block (result i32) local.get 0)
            )
        )
    "#,
        &options,
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("atomicrmw xchg"));
    // Interrupted trap code.
    assert!(ir.contains("i32 161"));
    Ok(())
}

#[test]
fn unreachable_code_is_skipped_cleanly() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                local.get 0
                return
                i32.const 5
                i32.add
            )
        )
    "#,
        &o0(),
    )?;
    assert_blocks_terminated(&compiled);
    Ok(())
}

#[test]
fn br_table_lowers_to_switch() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                (block
                    (block
                        local.get 0
                        br_table 0 1
                    )
                    i32.const 1
                    return
                )
                i32.const 2
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("switch i32"));
    Ok(())
}

#[test]
fn if_without_else_still_merges() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32) (result i32)
                (local i32)
                local.get 0
                (if (then i32.const 42 local.set 1))
                local.get 1
            )
        )
    "#,
        &o0(),
    )?;
    assert_blocks_terminated(&compiled);
    Ok(())
}

#[test]
fn duplicate_function_types_share_one_wrapper() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (type (func (param i32) (result i32)))
            (type (func (param i32) (result i32)))
            (func (type 0) local.get 0)
            (func (type 1) local.get 0)
        )
    "#,
        &o0(),
    )?;
    assert!(compiled.module.get_function("t0").is_some());
    // The duplicate signature aliases to t0 instead of minting t1.
    assert!(compiled.module.get_function("t1").is_none());
    Ok(())
}

#[test]
fn ref_func_and_null_checks_lower() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func $f)
            (elem declare func $f)
            (func (result i32)
                ref.func $f
                ref.is_null
            )
        )
    "#,
        &o0(),
    )?;
    let ir = compiled.print_ir();
    assert!(ir.contains("extractelement <2 x i64>"));
    Ok(())
}

#[test]
fn exception_handling_is_refused() {
    let ll = inkwell::context::Context::create();
    let wasm = wat::parse_str(
        r#"
        (module
            (tag $e (param i32))
            (func (throw $e (i32.const 1)))
        )
    "#,
    );
    // Either the WAT toolchain rejects it outright or the compiler refuses
    // with a configuration error; it must never lower.
    if let Ok(wasm) = wasm {
        let err = compile(&ll, "test", &wasm, &o0()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains("not validated") || msg.contains("unsupported configuration"),
            "unexpected error: {msg}"
        );
    }
}

#[test]
fn garbage_input_is_not_validated() {
    let ll = inkwell::context::Context::create();
    let err = compile(&ll, "test", b"\0asm\x01\0\0\0junk", &o0()).unwrap_err();
    assert!(format!("{err:#}").contains("not validated"));
}

#[test]
fn multi_value_returns_use_an_aggregate() -> Result<()> {
    let ll = inkwell::context::Context::create();
    let compiled = compile_wat(
        &ll,
        r#"
        (module
            (func (param i32 i64) (result i32 i64)
                local.get 0
                local.get 1
            )
        )
    "#,
        &o0(),
    )?;
    let f0 = compiled.module.get_function("f0").unwrap();
    let ret = f0.get_type().get_return_type().unwrap();
    assert!(ret.is_struct_type());
    Ok(())
}
