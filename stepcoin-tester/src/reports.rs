use anyhow::Result;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;

use crate::simulation::SimulationSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub seed: u64,
    pub passed: bool,
    pub failure: Option<String>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    scenarios: &'a [ScenarioResult],
    simulations: &'a [SimulationSummary],
}

fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = (passed as f64 / total as f64) * 100.0;
    rate
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    simulations: &[SimulationSummary],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Reward Test Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "===============================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    // Overall stats
    writeln!(out, "Total scenarios: {total_tests}")?;
    writeln!(out, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(out, "Failed: {}", failed_tests.to_string().red())?;
    writeln!(
        out,
        "Success rate: {:.1}%",
        success_rate(passed_tests, total_tests)
    )?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(
            out,
            "{status} {} (seed {}, {:?})",
            result.scenario_name.bold(),
            result.seed,
            result.duration
        )?;
        if let Some(failure) = &result.failure {
            writeln!(out, "     • {}", failure.red())?;
        }
    }

    if !simulations.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", "🚶 Simulation Summary".bright_yellow().bold())?;
        writeln!(out, "{}", "====================".yellow())?;
        for summary in simulations {
            let status = if summary.passed() {
                "✅".green()
            } else {
                "❌".red()
            };
            writeln!(
                out,
                "{status} seed {} ({} store): {} days, {} coins, {}/{} boxes, {} multipliers ({} declined, {} failed), {} notifications, {} background checks",
                summary.seed,
                summary.store,
                summary.days.len(),
                summary.coins,
                summary.boxes_collected,
                summary.boxes_earned,
                summary.multipliers_granted,
                summary.ads_declined,
                summary.ads_failed,
                summary.notifications,
                summary.background_checks
            )?;
            for failure in &summary.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
    }
    Ok(())
}

pub fn generate_json_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    simulations: &[SimulationSummary],
) -> Result<()> {
    let report = JsonReport {
        scenarios: results,
        simulations,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate_markdown_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    simulations: &[SimulationSummary],
) -> Result<()> {
    writeln!(out, "# Stepcoin Reward Test Results\n")?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenarios**: {total_tests}")?;
    writeln!(out, "- **Passed**: {passed_tests}")?;
    writeln!(out, "- **Failed**: {}", total_tests - passed_tests)?;
    writeln!(
        out,
        "- **Success rate**: {:.1}%\n",
        success_rate(passed_tests, total_tests)
    )?;

    if !results.is_empty() {
        writeln!(out, "## Scenarios\n")?;
        writeln!(out, "| Status | Scenario | Seed | Time | Failure |")?;
        writeln!(out, "|---|---|---|---|---|")?;
        for result in results {
            let status = if result.passed { "✅" } else { "❌" };
            writeln!(
                out,
                "| {status} | {} | {} | {:?} | {} |",
                result.scenario_name,
                result.seed,
                result.duration,
                result.failure.as_deref().unwrap_or("-")
            )?;
        }
        writeln!(out)?;
    }

    if !simulations.is_empty() {
        writeln!(out, "## Simulations\n")?;
        writeln!(
            out,
            "| Status | Seed | Days | Coins | Boxes | Multipliers | Notifications | Background |"
        )?;
        writeln!(out, "|---|---|---|---|---|---|---|---|")?;
        for summary in simulations {
            let status = if summary.passed() { "✅" } else { "❌" };
            writeln!(
                out,
                "| {status} | {} | {} | {} | {}/{} | {} | {} | {} |",
                summary.seed,
                summary.days.len(),
                summary.coins,
                summary.boxes_collected,
                summary.boxes_earned,
                summary.multipliers_granted,
                summary.notifications,
                summary.background_checks
            )?;
        }
        for summary in simulations.iter().filter(|s| !s.passed()) {
            writeln!(out, "\n### Seed {} failures\n", summary.seed)?;
            for failure in &summary.failures {
                writeln!(out, "- {failure}")?;
            }
        }
    }
    Ok(())
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}
