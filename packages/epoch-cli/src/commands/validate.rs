use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use epoch_rs::{PipelineConfig, Recording};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct StreamCheck {
    name: String,
    samples: usize,
    sample_rate: Option<f64>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ValidateOutput {
    config: String,
    valid: bool,
    triggers: Vec<String>,
    recording: Option<String>,
    streams: Vec<StreamCheck>,
    missing_triggers: Vec<String>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let mut result = ValidateOutput {
        config: args.config.clone(),
        valid: false,
        triggers: Vec::new(),
        recording: args.recording.clone(),
        streams: Vec::new(),
        missing_triggers: Vec::new(),
        error: None,
    };

    let config = if !Path::new(&args.config).exists() {
        Err(format!("Config file not found: {}", args.config))
    } else {
        PipelineConfig::load(&args.config)
            .and_then(|c| c.validate().map(|_| c))
            .map_err(|e| e.to_string())
    };

    match config {
        Ok(config) => {
            result.triggers = config.triggers.clone();
            result.valid = true;
            if let Some(ref path) = args.recording {
                match params::load_recording(path) {
                    Ok(recording) => check_recording(&config, recording, &mut result),
                    Err(msg) => {
                        result.valid = false;
                        result.error = Some(msg);
                    }
                }
            }
        }
        Err(msg) => result.error = Some(msg),
    }

    if args.json {
        if let Err(e) = output::emit(&result, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "Config '{}' is valid ({} trigger(s))",
            result.config,
            result.triggers.len()
        );
        for stream in &result.streams {
            match &stream.error {
                None => println!(
                    "  stream '{}': {} samples at {:.3} Hz",
                    stream.name,
                    stream.samples,
                    stream.sample_rate.unwrap_or(0.0)
                ),
                Some(err) => println!("  stream '{}': rejected ({})", stream.name, err),
            }
        }
        for trigger in &result.missing_triggers {
            println!("  trigger '{}' has no markers in the recording", trigger);
        }
    }

    if result.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::INPUT_ERROR
    }
}

fn check_recording(config: &PipelineConfig, recording: Recording, result: &mut ValidateOutput) {
    for (name, record) in recording.streams {
        let samples = record.timestamps.len();
        let check = match record.into_signal() {
            Ok(stream) => StreamCheck {
                name,
                samples,
                sample_rate: Some(stream.sample_rate()),
                error: None,
            },
            Err(e) => StreamCheck {
                name,
                samples,
                sample_rate: None,
                error: Some(e.to_string()),
            },
        };
        result.streams.push(check);
    }

    result.missing_triggers = config
        .triggers
        .iter()
        .filter(|t| !recording.markers.contains(t))
        .cloned()
        .collect();

    if !result.streams.iter().any(|s| s.error.is_none()) {
        result.valid = false;
        result.error = Some(format!("Recording '{}' has no usable streams", recording.name));
    }
}
