use anyhow::{anyhow, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;

use tsb_cli::args::{CliArgs, Command};
use tsb_cli::{driver, tracing_config};
use tsb_modules::{FsHost, SourceHost};

fn main() -> ExitCode {
    tracing_config::init();
    let args = CliArgs::parse();
    match run(args) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{} {message}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<ExitCode> {
    match args.command {
        Command::Build {
            entry,
            out,
            print_il,
        } => {
            let entry_str = entry.to_string_lossy().to_string();
            let (program, _line_maps) = driver::compile(&FsHost, &entry_str)
                .map_err(|d| anyhow!(render_diagnostic(&FsHost, d)))?;
            if print_il {
                let rendered = serde_json::to_string_pretty(&program)
                    .map_err(|e| anyhow!("cannot serialize IL: {e}"))?;
                println!("{rendered}");
                return Ok(ExitCode::SUCCESS);
            }
            let out = out.unwrap_or_else(|| default_artifact_path(&entry));
            tsb_emitter::write_artifact(program, &out)
                .map_err(|d| anyhow!(render_diagnostic(&FsHost, d)))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { input } => {
            let is_artifact = input
                .extension()
                .is_some_and(|e| e == "tsbc" || e == "tsb");
            let bytes = if is_artifact {
                std::fs::read(&input).map_err(|e| anyhow!("cannot read artifact: {e}"))?
            } else {
                let entry = input.to_string_lossy().to_string();
                let (program, _) = driver::compile(&FsHost, &entry)
                    .map_err(|d| anyhow!(render_diagnostic(&FsHost, d)))?;
                tsb_emitter::encode_artifact(program)
                    .map_err(|d| anyhow!(render_diagnostic(&FsHost, d)))?
            };
            let outcome = tsb_vm::run_artifact_bytes(
                &bytes,
                Box::new(std::io::stdout()),
                Box::new(std::io::stderr()),
            )
            .map_err(|d| anyhow!(render_diagnostic(&FsHost, d)))?;
            match outcome.error {
                None => Ok(ExitCode::SUCCESS),
                Some(error) => {
                    // Escaped runtime exceptions print stringified, exit 1.
                    eprintln!("{}", tsb_vm::error_to_string(&error));
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn default_artifact_path(entry: &Path) -> std::path::PathBuf {
    entry.with_extension("tsbc")
}

/// Render with `file:line:col` context when the failing file is readable.
fn render_diagnostic(host: &dyn SourceHost, d: tsb_common::Diagnostic) -> String {
    if !d.file.is_empty() {
        if let Ok(source) = host.read(&d.file) {
            let map = tsb_common::LineMap::new(&source);
            return d.render(Some(&map));
        }
    }
    d.render(None)
}
