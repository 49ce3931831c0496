//! One command-line analysis: read input, resolve config, detect, report.

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::detector::{DetectionResult, Orchestrator};
use crate::error::{HalluscanError, Result};
use crate::language::Language;
use crate::reporter::{JsonReporter, Reporter, TerminalReporter};
use crate::sandbox::ExecutionSandbox;
use std::fs;
use std::io::Read;
use tracing::debug;

/// Runs the analysis the command line asks for and writes the report.
pub async fn run_analysis(cli: &Cli) -> Result<DetectionResult> {
    let language: Language = cli.language.parse()?;
    let config = resolve_config(cli)?;
    let code = read_input(cli)?;

    let sandbox = ExecutionSandbox::new()
        .with_interpreter(config.sandbox.interpreter.clone())
        .with_limits(config.effective_limits());
    let result = Orchestrator::new()
        .with_sandbox(sandbox)
        .detect_hallucinations(&code, language, Some(&config.detection))
        .await?;

    let report = render(cli, &code, &result);
    write_report(cli, &report)?;
    Ok(result)
}

/// Explicit `--config` file, else project/global discovery, then CLI flags.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load(cli.project_root()),
    };
    cli.apply(&mut config);
    config.validate()?;
    debug!(?config, "Resolved configuration");
    Ok(config)
}

fn read_input(cli: &Cli) -> Result<String> {
    if cli.reads_stdin() {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .map_err(|source| HalluscanError::Io {
                path: "<stdin>".to_string(),
                source,
            })?;
        return Ok(code);
    }
    fs::read_to_string(&cli.file).map_err(|source| HalluscanError::Io {
        path: cli.file.display().to_string(),
        source,
    })
}

fn render(cli: &Cli, code: &str, result: &DetectionResult) -> String {
    match cli.format {
        OutputFormat::Terminal => TerminalReporter::new(cli.verbose)
            .with_source(cli.input_name(), code)
            .report(result),
        OutputFormat::Json => JsonReporter::new().report(result),
    }
}

fn write_report(cli: &Cli, report: &str) -> Result<()> {
    match &cli.output {
        Some(path) => {
            fs::write(path, report).map_err(|source| HalluscanError::Io {
                path: path.display().to_string(),
                source,
            })?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{}", report),
    }
    Ok(())
}
