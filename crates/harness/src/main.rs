// xlbench: run the spreadsheet fidelity benchmark and write the report.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;
use xlbench_adapters::AdapterRegistry;
use xlbench_harness::exit_codes::{exit_code_for, EXIT_SUCCESS, EXIT_USAGE};
use xlbench_harness::report::write_report;
use xlbench_harness::{logger, BenchConfig, HarnessError, Orchestrator};
use xlbench_model::{BenchmarkResults, OperationType};

#[derive(Parser)]
#[command(name = "xlbench")]
#[command(about = "Score spreadsheet libraries against Excel-generated fixtures")]
#[command(version)]
struct Cli {
    /// Fixture directory containing manifest.json
    #[arg(long, short = 't', env = "XLBENCH_TESTS", default_value = "fixtures")]
    tests: PathBuf,

    /// Where to write the JSON report
    #[arg(long, short = 'o', default_value = "results/results.json")]
    output: PathBuf,

    /// TOML config file
    #[arg(long, short = 'c', env = "XLBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Only run these features (repeatable)
    #[arg(long = "feature", short = 'f', value_name = "FEATURE")]
    features: Vec<String>,

    /// Only run these adapters (repeatable)
    #[arg(long = "adapter", short = 'a', value_name = "NAME")]
    adapters: Vec<String>,

    /// Worker threads (overrides config)
    #[arg(long, short = 'j')]
    workers: Option<usize>,

    /// Per-unit timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the compiled-in adapters and exit
    #[arg(long)]
    list_adapters: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let registry = AdapterRegistry::builtin();
    if cli.list_adapters {
        for adapter in registry.iter() {
            let info = adapter.info();
            println!("{:<20} {:<10} {}", info.name, info.version, capabilities(adapter.as_ref()));
        }
        return ExitCode::from(EXIT_SUCCESS);
    }

    if cli.workers == Some(0) || cli.timeout == Some(0) {
        eprintln!("error: --workers and --timeout must be at least 1");
        return ExitCode::from(EXIT_USAGE);
    }

    match run(cli, registry) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(cli: Cli, registry: AdapterRegistry) -> Result<(), HarnessError> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    if !cli.features.is_empty() {
        config.run.features = cli.features;
    }
    if !cli.adapters.is_empty() {
        config.run.libraries = cli.adapters;
    }
    if let Some(workers) = cli.workers {
        config.run.workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        config.run.unit_timeout_secs = timeout;
    }

    let results = Orchestrator::new(registry, config, &cli.tests).run()?;
    write_report(&results, &cli.output)?;
    info!("report written to {}", cli.output.display());

    print_summary(&results);
    Ok(())
}

fn capabilities(adapter: &dyn xlbench_adapters::Adapter) -> String {
    [OperationType::Read, OperationType::Write]
        .into_iter()
        .filter(|op| adapter.can(*op))
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn print_summary(results: &BenchmarkResults) {
    let fmt = |s: Option<u8>| s.map_or_else(|| "-".to_string(), |v| v.to_string());
    println!("{:<24} {:<18} {:>5} {:>6}", "feature", "library", "read", "write");
    for r in &results.results {
        println!(
            "{:<24} {:<18} {:>5} {:>6}",
            r.feature,
            r.library,
            fmt(r.read_score),
            fmt(r.write_score)
        );
    }
}
