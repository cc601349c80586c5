#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, NamedSource};
use tracing_subscriber::EnvFilter;

use deepppl::report::{display_path, CheckReport};
use deepppl::{check_source, compile_source, load_config, read_source, CompileError};

#[derive(Parser, Debug)]
#[command(name = "deepppl", version, about = "Compiles probabilistic models to Pyro")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compile a model to a Python module.
    Compile {
        path: PathBuf,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Annotate local declarations with Python types. Also configurable via `deepppl.toml`.
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },

    /// Parse and validate a model without generating code.
    Check {
        path: PathBuf,

        /// Print a JSON report instead of a diagnostic.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deepppl=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn with_source(err: CompileError, path: &Path, src: &str) -> miette::Report {
    miette::Report::new(err).with_source_code(NamedSource::new(display_path(path), src.to_string()))
}

fn main() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Compile {
            path,
            output,
            verbose,
        } => {
            let mut config = load_config(&path)?;
            config.verbose |= verbose;
            let src = read_source(&path)?;
            let python = compile_source(&src, &config).map_err(|e| with_source(e, &path, &src))?;
            match output {
                Some(out) => fs::write(&out, python).into_diagnostic()?,
                None => print!("{python}"),
            }
            Ok(())
        }
        Cmd::Check { path, json } => {
            let src = read_source(&path)?;
            let result = check_source(&src);
            if json {
                let report = CheckReport::new(&path, &result);
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                if !report.ok {
                    std::process::exit(1);
                }
                return Ok(());
            }
            result.map_err(|e| with_source(e, &path, &src))?;
            eprintln!("{}: ok", display_path(&path));
            Ok(())
        }
    }
}
