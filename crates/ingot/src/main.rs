use anyhow::{Context, Result};
use clap::Parser;
use ingot::{compile, CompileOptions, OptimizationLevel};
use inkwell::targets::FileType;
use std::fs;
use std::path::PathBuf;

/// ingot — ahead-of-time WebAssembly compiler (Wasm in, native objects out).
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly binary (.wasm)
    input: PathBuf,

    /// Output file (.o object, or .ll textual IR)
    #[arg(long, short)]
    output: PathBuf,

    /// Optimization level
    #[arg(long, default_value = "O2")]
    opt: OptimizationLevel,

    /// Target a generic CPU instead of the host CPU
    #[arg(long)]
    generic: bool,

    /// Inject cooperative stop-token checks
    #[arg(long)]
    interruptible: bool,

    /// Inject instruction counting
    #[arg(long)]
    count_instructions: bool,

    /// Inject gas metering against the execution context's cost table
    #[arg(long)]
    measure_gas: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let wasm_bytes = fs::read(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let options = CompileOptions {
        optimization_level: cli.opt,
        is_generic_binary: cli.generic,
        interruptible: cli.interruptible,
        instruction_counting: cli.count_instructions,
        cost_measuring: cli.measure_gas,
    };

    let ll = inkwell::context::Context::create();
    let name = cli
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    let compiled = compile(&ll, &name, &wasm_bytes, &options).context("compilation failed")?;

    match cli.output.extension().and_then(|e| e.to_str()) {
        Some("ll") => {
            fs::write(&cli.output, compiled.print_ir())
                .with_context(|| format!("failed to write {}", cli.output.display()))?;
        }
        _ => {
            compiled
                .target_machine
                .write_to_file(&compiled.module, FileType::Object, &cli.output)
                .map_err(|e| anyhow::anyhow!("object emission failed: {}", e.to_string()))?;
        }
    }
    tracing::info!(output = %cli.output.display(), "wrote artifact");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::parse_from(["ingot", "input.wasm", "-o", "out.o"]);
        assert_eq!(cli.opt, OptimizationLevel::O2);
        assert!(!cli.generic);
        assert!(!cli.measure_gas);
    }
}
