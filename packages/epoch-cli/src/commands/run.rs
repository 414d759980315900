use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use epoch_rs::{EpochRunner, RunReport};
use std::time::Instant;

pub fn execute(args: RunArgs) -> i32 {
    let config = match params::build_config(&args.pipeline) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut recordings = Vec::with_capacity(args.recordings.len());
    for path in &args.recordings {
        match params::load_recording(path) {
            Ok(r) => recordings.push(r),
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return exit_codes::INPUT_ERROR;
            }
        }
    }

    let runner = match EpochRunner::new(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if !args.quiet {
        eprintln!("Extracting trials from {} recording(s)...", recordings.len());
    }
    let start_time = Instant::now();

    let mut report = match runner.run(recordings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: Extraction failed: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if args.merge {
        merge_datasets(&mut report);
    }

    if let Err(e) = output::emit(&report, args.compact, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if !args.quiet {
        eprintln!(
            "Extracted {} trial(s) from {} dataset(s) in {:.2}s",
            report.trial_count(),
            report.datasets.len(),
            start_time.elapsed().as_secs_f64()
        );
        for failure in &report.failures {
            eprintln!("  Failed: {}", failure);
        }
        if let Some(ref path) = args.output {
            eprintln!("Report written to {}", path);
        }
    }

    if report.failures.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    }
}

/// Fold every dataset into the first one.
fn merge_datasets(report: &mut RunReport) {
    let mut datasets = std::mem::take(&mut report.datasets).into_iter();
    if let Some(mut merged) = datasets.next() {
        for other in datasets {
            merged.merge(other);
        }
        report.datasets = vec![merged];
    }
}
