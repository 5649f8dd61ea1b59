mod doubles;
mod reports;
mod scenarios;
mod simulation;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;
use stepcoin_game::RewardConfig;

use reports::ScenarioResult;
use scenarios::{Scenario, ScenarioCtx, expand_scenarios, list_scenarios};
use simulation::{SimulationPlan, SimulationSummary, run_simulation};
use util::{load_config, parse_seeds, parse_start_date, split_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Console,
    Json,
    Markdown,
}

#[derive(Debug, Parser)]
#[command(name = "stepcoin-tester", version)]
#[command(about = "Headless scenario runner and multi-day simulator for the Stepcoin reward engine")]
struct Args {
    /// Scenarios to run (comma-separated, `smoke` or `all`)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Days to simulate per seed (0 skips the simulation)
    #[arg(long, default_value_t = 0)]
    simulate_days: u32,

    /// Seeds to run (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Persist state as JSON files under this directory instead of in memory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// JSON reward config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// First simulated calendar day (YYYY-MM-DD)
    #[arg(long, default_value = "2024-01-01")]
    start_date: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let config = load_config(args.config.as_deref())?;
    let seeds = parse_seeds(&args.seeds)?;
    let start_date = parse_start_date(&args.start_date)?;
    log::debug!("reward config: {config:?}");

    let (scenarios, unknown) = expand_scenarios(&split_csv(&args.scenarios));
    for name in &unknown {
        eprintln!("⚠️  Unknown scenario: {}", name.yellow());
    }

    let results = run_scenarios(&args, &config, &scenarios, &seeds, start_date).await;
    let simulations = run_simulations(&args, &config, &seeds, start_date).await?;

    write_reports(&args, &results, &simulations, start_time)?;

    if results.iter().any(|r| !r.passed) || simulations.iter().any(|s| !s.passed()) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    writeln!(output_target.writer(), "  {:25} - Every scenario above", "all")?;
    writeln!(output_target.writer(), "  {:25} - The six basic walkthroughs", "smoke")?;
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🪙 Stepcoin Reward Tester".bright_cyan().bold());
    println!("{}", "=========================".cyan());
}

async fn run_scenarios(
    args: &Args,
    config: &RewardConfig,
    scenarios: &[Scenario],
    seeds: &[u64],
    start_date: chrono::NaiveDate,
) -> Vec<ScenarioResult> {
    let mut results = Vec::new();
    if scenarios.is_empty() {
        return results;
    }

    println!("{}", "🧠 Running Reward Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    for &seed in seeds {
        let ctx = ScenarioCtx {
            config: config.clone(),
            start_date,
            state_dir: args.state_dir.clone(),
            seed,
        };
        for scenario in scenarios {
            let scenario_start = Instant::now();
            let outcome = scenario.run(&ctx).await;
            let duration = scenario_start.elapsed();
            if args.verbose {
                match &outcome {
                    Ok(()) => println!(
                        "✅ [seed {seed}] {} - {duration:?}",
                        scenario.key().green()
                    ),
                    Err(err) => eprintln!(
                        "❌ [seed {seed}] {} - {duration:?}: {err:#}",
                        scenario.key().red()
                    ),
                }
            }
            results.push(ScenarioResult {
                scenario_name: scenario.key().to_string(),
                seed,
                passed: outcome.is_ok(),
                failure: outcome.err().map(|err| format!("{err:#}")),
                duration,
            });
        }
    }

    results
}

async fn run_simulations(
    args: &Args,
    config: &RewardConfig,
    seeds: &[u64],
    start_date: chrono::NaiveDate,
) -> Result<Vec<SimulationSummary>> {
    let mut summaries = Vec::new();
    if args.simulate_days == 0 {
        return Ok(summaries);
    }

    println!("{}", "🚶 Running Simulations".bright_blue().bold());
    println!("{}", "-".repeat(30).blue());

    let plan = SimulationPlan {
        days: args.simulate_days,
        start_date,
        config: config.clone(),
        state_dir: args.state_dir.clone(),
        verbose: args.verbose,
    };
    for &seed in seeds {
        let summary = run_simulation(&plan, seed)
            .await
            .with_context(|| format!("simulation for seed {seed} aborted"))?;
        summaries.push(summary);
    }
    Ok(summaries)
}

fn write_reports(
    args: &Args,
    results: &[ScenarioResult],
    simulations: &[SimulationSummary],
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report {
        ReportFormat::Json => {
            reports::generate_json_report(&mut output_target, results, simulations)?;
        }
        ReportFormat::Markdown => {
            if results.is_empty() && simulations.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Stepcoin Reward Test Results\n\n_Nothing executed._"
                )?;
            } else {
                reports::generate_markdown_report(&mut output_target, results, simulations)?;
            }
        }
        ReportFormat::Console => {
            let duration = start_time.elapsed();
            if results.is_empty() && simulations.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                reports::generate_console_report(
                    &mut output_target,
                    results,
                    simulations,
                    duration,
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
