use crate::cli::{self, PipelineArgs};
use epoch_rs::{PipelineConfig, Recording};
use std::path::Path;

/// Build a validated pipeline configuration from `--config` and flags.
pub fn build_config(args: &PipelineArgs) -> Result<PipelineConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(format!("Config file not found: {}", path));
            }
            PipelineConfig::load(path)
                .map_err(|e| format!("Failed to read config '{}': {}", path, e))?
        }
        None => {
            if args.triggers.is_empty() {
                return Err("Either --config or --triggers must be specified".to_string());
            }
            PipelineConfig::new(Vec::new(), 1.0, 1.0)
        }
    };

    if !args.triggers.is_empty() {
        config.triggers = args.triggers.clone();
    }
    if let Some(b) = args.baseline_time {
        config.baseline_time = b;
    }
    if let Some(t) = args.trial_time {
        config.trial_time = t;
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = Some(rate);
    }
    if let Some(ref range) = args.baseline_range {
        config.baseline_range = Some(cli::parse_range(range)?);
    }
    if let Some(n) = args.max_workers {
        config.max_workers = Some(n);
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Check that a recording path exists and looks like JSON.
pub fn validate_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("Recording not found: {}", file_path));
    }
    if !is_supported_extension(path) {
        return Err(format!(
            "Unsupported recording '{}': expected a .json file",
            file_path
        ));
    }
    Ok(())
}

pub fn load_recording(file_path: &str) -> Result<Recording, String> {
    validate_file(file_path)?;
    Recording::load(file_path).map_err(|e| format!("Failed to read '{}': {}", file_path, e))
}

pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
