use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use stagir::config::TargetConfig;
use stagir::demos::{self, DEMOS};
use stagir::kernel::{program_build, program_build_all, program_build_for, IntoKernel, Kernel};

#[derive(Parser)]
#[command(
    name = "stagir",
    version,
    about = "stagir: staged tensor IR builder and kernel lowering"
)]
struct Cli {
    /// Log lowering and codegen progress (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List built-in codegen targets
    Targets,
    /// Print the lowered IR of a demo kernel
    Show {
        /// Demo kernel name (fill, relu, gemm, zigzag)
        demo: String,
        /// Problem size for fixed-shape demos
        #[arg(long, default_value_t = 4)]
        size: i64,
    },
    /// Lower a demo kernel and emit target source
    Build {
        /// Demo kernel name (fill, relu, gemm, zigzag)
        demo: String,
        /// Built-in target (c, arm_m)
        #[arg(long, default_value = "c")]
        target: String,
        /// JSON target description (overrides --target)
        #[arg(long, value_name = "PATH")]
        target_config: Option<PathBuf>,
        /// Problem size for fixed-shape demos
        #[arg(long, default_value_t = 4)]
        size: i64,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the kernel artifact as JSON instead of source
        #[arg(long)]
        json: bool,
    },
    /// Build every demo kernel in parallel and print content hashes
    BuildAll {
        /// Built-in target (c, arm_m)
        #[arg(long, default_value = "c")]
        target: String,
        /// Problem size for fixed-shape demos
        #[arg(long, default_value_t = 4)]
        size: i64,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Targets => cmd_targets(),
        Command::Show { demo, size } => cmd_show(&demo, size),
        Command::Build {
            demo,
            target,
            target_config,
            size,
            output,
            json,
        } => cmd_build(&demo, &target, target_config, size, output, json),
        Command::BuildAll { target, size } => cmd_build_all(&target, size),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", e);
    process::exit(1);
}

// --- stagir targets ---

fn cmd_targets() {
    for name in TargetConfig::builtin_names() {
        match TargetConfig::resolve(name) {
            Ok(config) => println!(
                "{:<8} {} (zigzag: {})",
                config.name,
                config.display_name,
                if config.supports_zigzag { "yes" } else { "no" }
            ),
            Err(e) => fail(e),
        }
    }
}

// --- stagir show ---

fn lower_demo(name: &str, size: i64) -> Kernel {
    demos::demo(name, size)
        .and_then(IntoKernel::into_kernel)
        .unwrap_or_else(|e| fail(e))
}

fn cmd_show(name: &str, size: i64) {
    let kernel = lower_demo(name, size);
    println!("// kernel {} ({})", kernel.name(), kernel.content_hash());
    print!("{}", kernel.body);
}

// --- stagir build ---

fn cmd_build(
    name: &str,
    target: &str,
    target_config: Option<PathBuf>,
    size: i64,
    output: Option<PathBuf>,
    json: bool,
) {
    let kernel = demos::demo(name, size).unwrap_or_else(|e| fail(e));
    let built = match target_config {
        Some(path) => {
            let config = TargetConfig::load(&path).unwrap_or_else(|e| fail(e));
            program_build_for(kernel, config)
        }
        None => program_build(kernel, target),
    };
    let built = built.unwrap_or_else(|e| fail(e));

    let text = if json {
        built.to_json().unwrap_or_else(|e| fail(e))
    } else {
        built.source.clone().unwrap_or_default()
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &text) {
                fail(format!("cannot write '{}': {}", path.display(), e));
            }
            eprintln!("Built {} -> {}", built.name(), path.display());
        }
        None => print!("{}", text),
    }
}

// --- stagir build-all ---

fn cmd_build_all(target: &str, size: i64) {
    let kernels = DEMOS
        .iter()
        .map(|name| demos::demo(name, size))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|e| fail(e));

    let mut failed = false;
    for (name, result) in DEMOS.iter().zip(program_build_all(kernels, target)) {
        match result {
            Ok(kernel) => println!("{:<8} {}", name, kernel.content_hash()),
            Err(e) => {
                println!("{:<8} error: {}", name, e);
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}
