//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use regwatch_infra_system::DEFAULT_MAX_BACKUPS;

#[derive(Parser, Debug)]
#[command(name = "regwatch")]
#[command(about = "Run regulatory news scrapers as one supervised batch", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
#[command(after_help = "Examples:
  regwatch                                  Run all scrapers sequentially
  regwatch --parallel --max-workers 3       Run in parallel with 3 workers
  regwatch --category heavy                 Run only heavy scrapers
  regwatch --dry-run                        Show the plan without running anything
  regwatch --timeout-multiplier 2.0         Double all timeouts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge a JSON array of scraped records into a record store
    MergeRecords {
        /// Store file (created when missing)
        #[arg(long, value_name = "FILE")]
        store: PathBuf,

        /// JSON array of new records
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Timestamped backups to keep next to the store
        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_BACKUPS)]
        max_backups: usize,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Run scrapers in parallel (default: sequential)
    #[arg(long)]
    pub parallel: bool,

    /// Maximum number of parallel workers (default from config: 3)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_workers: Option<u64>,

    /// Show what would be executed without running scrapers
    #[arg(long)]
    pub dry_run: bool,

    /// Base directory containing scraper folders
    #[arg(long, value_name = "PATH")]
    pub base_dir: Option<PathBuf>,

    /// Run only scrapers in these categories (repeatable)
    #[arg(long = "category", value_name = "C", num_args = 1..)]
    pub categories: Vec<String>,

    /// Multiply all timeouts by this factor
    #[arg(long, value_name = "F", default_value_t = 1.0, value_parser = parse_multiplier)]
    pub timeout_multiplier: f64,

    /// Include only regulators whose name contains a pattern (repeatable)
    #[arg(long, value_name = "P", num_args = 1..)]
    pub include: Vec<String>,

    /// Exclude regulators whose name contains a pattern (repeatable)
    #[arg(long, value_name = "P", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress console logging (log file only)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable the report email
    #[arg(long)]
    pub no_email: bool,

    /// Configuration file
    #[arg(long, value_name = "PATH", env = "REGWATCH_CONFIG")]
    pub config: Option<PathBuf>,
}

fn parse_multiplier(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("not a number: {}", raw))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("timeout multiplier must be a positive number".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["regwatch"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.run.parallel);
        assert_eq!(cli.run.timeout_multiplier, 1.0);
        assert!(cli.run.categories.is_empty());
        assert!(cli.run.max_workers.is_none());
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "regwatch",
            "--parallel",
            "--max-workers",
            "5",
            "--category",
            "standard",
            "quick",
            "--category",
            "heavy",
            "--include",
            "APRA",
            "--exclude",
            "letters",
            "--timeout-multiplier",
            "1.5",
            "--no-email",
            "-v",
        ])
        .unwrap();

        assert!(cli.run.parallel);
        assert_eq!(cli.run.max_workers, Some(5));
        assert_eq!(cli.run.categories, vec!["standard", "quick", "heavy"]);
        assert_eq!(cli.run.include, vec!["APRA"]);
        assert_eq!(cli.run.exclude, vec!["letters"]);
        assert_eq!(cli.run.timeout_multiplier, 1.5);
        assert!(cli.run.no_email);
        assert!(cli.run.verbose);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["regwatch", "--timeout-multiplier", "0"]).is_err());
        assert!(Cli::try_parse_from(["regwatch", "--timeout-multiplier", "abc"]).is_err());
        assert!(Cli::try_parse_from(["regwatch", "--max-workers", "0"]).is_err());
        assert!(Cli::try_parse_from(["regwatch", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_merge_records_subcommand() {
        let cli = Cli::try_parse_from([
            "regwatch",
            "merge-records",
            "--store",
            "data/news.json",
            "--input",
            "new.json",
        ])
        .unwrap();

        match cli.command {
            Some(Command::MergeRecords {
                store,
                input,
                max_backups,
            }) => {
                assert_eq!(store, PathBuf::from("data/news.json"));
                assert_eq!(input, PathBuf::from("new.json"));
                assert_eq!(max_backups, DEFAULT_MAX_BACKUPS);
            }
            None => panic!("expected merge-records"),
        }
    }
}
