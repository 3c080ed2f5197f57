use anyhow::Context;
use clap::{Parser, ValueEnum};
use faireval::{evaluate_files, FairEvalConfig, OutputTarget, Reporter};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fair evaluation of span annotations against a gold standard
#[derive(Parser, Debug)]
#[command(name = "faireval", version, about, long_about = None)]
struct Cli {
    /// Configuration file (`key = value` lines)
    #[arg(short, long)]
    config: PathBuf,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Evaluate sentences on all cores
    #[arg(long)]
    parallel: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn render(reporter: &Reporter, format: Format) -> anyhow::Result<String> {
    match format {
        Format::Text => Ok(reporter.to_string()),
        Format::Json => {
            let mut json = serde_json::to_string_pretty(reporter)?;
            json.push('\n');
            Ok(json)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = FairEvalConfig::from_file(&cli.config)
        .with_context(|| format!("Invalid configuration {}", cli.config.display()))?;
    if cli.parallel {
        config = config.with_parallel(true);
    }
    info!("Evaluation settings:\n{}", config);

    let reporter = evaluate_files(&config)?;
    let report = render(&reporter, cli.format)?;
    match config.eval_out() {
        OutputTarget::Stdout => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(report.as_bytes())?;
            stdout.flush()?;
        }
        OutputTarget::File(path) => {
            fs::write(path, report)
                .with_context(|| format!("Cannot write the report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
    }
    Ok(())
}
