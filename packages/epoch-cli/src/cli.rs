use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "epochs",
    version,
    about = "Marker-aligned trial extraction for eye-tracking recordings",
    long_about = "Cut trials around event markers in eye-tracking streams and compute\n\
                  baseline-corrected and percent-change views.\n\
                  Recordings and configuration files are JSON."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract trials from one or more recordings
    Run(RunArgs),
    /// Extract trials from many recordings, one report per recording
    Batch(BatchArgs),
    /// Align markers only and report where they landed
    Markers(MarkersArgs),
    /// Validate a configuration file and optionally a recording
    Validate(ValidateArgs),
    /// List available trial filters and trigger stages
    Processors(ProcessorsArgs),
}

/// Settings shared by every command that runs the pipeline.
///
/// Flags override the values of `--config`.
#[derive(Args, Clone, Default)]
pub struct PipelineArgs {
    /// Pipeline configuration file (JSON)
    #[arg(short, long, env = "EPOCHS_CONFIG")]
    pub config: Option<String>,

    /// Trigger names to extract
    #[arg(long, num_args = 1..)]
    pub triggers: Vec<String>,

    /// Seconds before each marker
    #[arg(long, allow_hyphen_values = true)]
    pub baseline_time: Option<f64>,

    /// Seconds after each marker
    #[arg(long, allow_hyphen_values = true)]
    pub trial_time: Option<f64>,

    /// Resample trials to this rate in Hz
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Baseline window as "start,end" seconds from the trial start
    #[arg(long)]
    pub baseline_range: Option<String>,

    /// Worker thread budget (0 or 1 runs sequentially)
    #[arg(long)]
    pub max_workers: Option<usize>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Recording files (JSON)
    #[arg(long = "recording", num_args = 1.., required = true)]
    pub recordings: Vec<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Merge all recordings into the first dataset
    #[arg(long, default_value_t = false)]
    pub merge: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern for recording files
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of recording files
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Directory for per-recording reports (default: JSON lines on stdout)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Keep going after a recording fails
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// List matched files and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct MarkersArgs {
    /// Recording file (JSON)
    #[arg(long)]
    pub recording: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Pipeline configuration file (JSON)
    #[arg(long)]
    pub config: String,

    /// Recording to check against the configuration
    #[arg(long)]
    pub recording: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ProcessorsArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Parse a baseline range "start,end" into `[start, end]`.
pub fn parse_range(s: &str) -> Result<[f64; 2], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid range '{}': expected 'start,end' in seconds",
            s
        ));
    }
    let start = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid range '{}': '{}' is not a number", s, parts[0]))?;
    let end = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid range '{}': '{}' is not a number", s, parts[1]))?;
    Ok([start, end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_valid() {
        assert_eq!(parse_range("0,0.5").unwrap(), [0.0, 0.5]);
        assert_eq!(parse_range("0.25, 1").unwrap(), [0.25, 1.0]);
    }

    #[test]
    fn test_parse_range_invalid() {
        assert!(parse_range("0.5").is_err());
        assert!(parse_range("0,1,2").is_err());
        assert!(parse_range("a,b").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "epochs",
            "run",
            "--recording",
            "a.json",
            "b.json",
            "--triggers",
            "go",
            "--baseline-time",
            "-0.2",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.recordings, vec!["a.json", "b.json"]);
                assert_eq!(args.pipeline.triggers, vec!["go"]);
                assert_eq!(args.pipeline.baseline_time, Some(-0.2));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_batch_glob_conflicts_with_files() {
        let result = Cli::try_parse_from([
            "epochs", "batch", "--glob", "*.json", "--files", "a.json",
        ]);
        assert!(result.is_err());
    }
}
