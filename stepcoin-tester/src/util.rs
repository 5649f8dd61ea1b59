use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use stepcoin_game::RewardConfig;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse comma-separated numeric seeds, keeping their order and dropping repeats.
pub fn parse_seeds(s: &str) -> Result<Vec<u64>> {
    let mut seeds = Vec::new();
    for token in split_csv(s) {
        let seed = token
            .parse::<u64>()
            .with_context(|| format!("invalid seed {token:?}"))?;
        if !seeds.contains(&seed) {
            seeds.push(seed);
        }
    }
    if seeds.is_empty() {
        bail!("at least one seed is required");
    }
    Ok(seeds)
}

pub fn parse_start_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("start date {s:?} is not YYYY-MM-DD"))
}

/// Load and validate a reward config file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<RewardConfig> {
    let Some(path) = path else {
        return Ok(RewardConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    RewardConfig::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
}

/// Per-run state directory for file-backed stores.
pub fn state_dir_for(base: &Path, label: &str, seed: u64) -> PathBuf {
    base.join(label).join(format!("seed-{seed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "stepcoin-util-{label}-{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" alpha, ,beta,  gamma ");
        assert_eq!(parts, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn parse_seeds_dedupes_and_rejects_garbage() {
        assert_eq!(parse_seeds("7, 3,7").unwrap(), vec![7, 3]);
        assert!(parse_seeds("7,x").is_err());
        assert!(parse_seeds(" , ").is_err());
    }

    #[test]
    fn start_date_must_be_iso() {
        assert_eq!(
            parse_start_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_start_date("02/29/2024").is_err());
    }

    #[test]
    fn load_config_reads_and_validates_files() {
        assert_eq!(load_config(None).unwrap(), RewardConfig::default());

        let good = temp_file("good");
        std::fs::write(&good, r#"{"step_poll_interval_secs": 60}"#).unwrap();
        assert_eq!(load_config(Some(&good)).unwrap().step_poll_interval_secs, 60);

        let bad = temp_file("bad");
        std::fs::write(&bad, r#"{"step_poll_interval_secs": 1}"#).unwrap();
        assert!(load_config(Some(&bad)).is_err());
    }

    #[test]
    fn state_dir_includes_label_and_seed() {
        let dir = state_dir_for(Path::new("target/state"), "restart", 42);
        assert!(dir.ends_with("restart/seed-42"));
    }
}
