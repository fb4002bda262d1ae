//! Compile-throughput benchmark: WAT fixtures through the full pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ingot::{compile, CompileOptions, OptimizationLevel};

const LOOP_SUM: &str = r#"
(module
    (memory 1)
    (func (export "sum") (param i32) (result i32)
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
    (func (export "store") (param i32 i32)
        local.get 0
        local.get 1
        i32.store
    )
)
"#;

fn bench_compile(c: &mut Criterion) {
    let wasm = wat::parse_str(LOOP_SUM).expect("fixture parses");

    let mut group = c.benchmark_group("compile");
    for (name, level) in [("O0", OptimizationLevel::O0), ("O2", OptimizationLevel::O2)] {
        let options = CompileOptions {
            optimization_level: level,
            is_generic_binary: true,
            ..CompileOptions::default()
        };
        group.bench_function(name, |b| {
            b.iter(|| {
                let ll = inkwell::context::Context::create();
                let compiled =
                    compile(&ll, "bench", black_box(&wasm), &options).expect("compiles");
                black_box(compiled.print_ir().len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
