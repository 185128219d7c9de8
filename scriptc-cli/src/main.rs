use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use scriptc_core::runtime::default_runtime_root;
use scriptc_core::{FileType, ScriptDriver, parse_script};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wasmi::{Engine, Linker, Module, Store};

/// Compile a compute script (textual IR) for a target.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Script to compile; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_name = "TRIPLE", default_value = "wasm32-unknown-unknown")]
    target: String,

    #[arg(long, value_enum, default_value_t = Emit::Obj)]
    emit: Emit,

    #[arg(
        long,
        value_name = "DIR",
        help = "Runtime library root (defaults to the bundled runtime)"
    )]
    runtime: Option<PathBuf>,

    #[arg(long, help = "Skip the LTO stage (no internalization or foreach expansion)")]
    no_lto: bool,

    #[arg(long, help = "Run `root` from the emitted object and print its result")]
    run: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Obj,
    Asm,
}

impl From<Emit> for FileType {
    fn from(emit: Emit) -> Self {
        match emit {
            Emit::Obj => FileType::Object,
            Emit::Asm => FileType::Assembly,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read script from stdin")?;
            buffer
        }
    };
    let mut script = parse_script(&source).context("failed to parse script")?;

    let runtime_root = cli.runtime.clone().unwrap_or_else(default_runtime_root);
    let mut driver = ScriptDriver::new(runtime_root);
    driver.compiler_mut().enable_lto(!cli.no_lto);

    prepare_output_dir(&cli.output)?;
    let file_type = FileType::from(cli.emit);
    driver
        .build(&mut script, &cli.target, file_type, &cli.output)
        .with_context(|| {
            format!(
                "failed to compile '{}' for {}",
                script.module().id,
                cli.target
            )
        })?;
    info!(output = %cli.output.display(), "wrote artifact");

    if cli.run {
        if file_type != FileType::Object {
            warn!("--run is ignored for assembly output");
            return Ok(());
        }
        let bytes = fs::read(&cli.output)
            .with_context(|| format!("failed to read back {}", cli.output.display()))?;
        let result = run_root(&bytes)?;
        println!("root returned {result}");
    }

    Ok(())
}

fn prepare_output_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn run_root(wasm: &[u8]) -> Result<i32> {
    let engine = Engine::default();
    let module = Module::new(&engine, wasm).context("failed to compile wasm artifact")?;
    let linker = Linker::new(&engine);
    let mut store = Store::new(&engine, ());
    let instance = linker
        .instantiate_and_start(&mut store, &module)
        .context("failed to instantiate module")?;
    let Some(root) = instance.get_func(&store, "root") else {
        bail!("the script does not export a `root` function");
    };
    let root = root
        .typed::<(), i32>(&store)
        .context("`root` must take no arguments and return an i32")?;
    let result = root.call(&mut store, ()).context("failed to execute root")?;
    Ok(result)
}
