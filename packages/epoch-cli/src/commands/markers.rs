use crate::cli::MarkersArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use epoch_rs::{EpochRunner, RunReport};
use serde::Serialize;

#[derive(Serialize)]
struct MarkerRow {
    stream: String,
    trigger: String,
    located: usize,
    missing: usize,
    data_indices: Vec<usize>,
    data_times: Vec<f64>,
    data_errors: Vec<f64>,
    took_previous: Vec<bool>,
}

pub fn execute(args: MarkersArgs) -> i32 {
    let recording = match params::load_recording(&args.recording) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    // Without a config or trigger list, every event name in the recording is scanned
    let mut pipeline = args.pipeline.clone();
    if pipeline.config.is_none() && pipeline.triggers.is_empty() {
        pipeline.triggers = recording.markers.names();
    }

    let mut config = match params::build_config(&pipeline) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    config.markers_only = true;

    let report = match EpochRunner::new(config).and_then(|r| r.run(vec![recording])) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let rows = collect_rows(&report);

    if args.json {
        if let Err(e) = output::emit(&rows, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!(
            "{:<16} {:<16} {:>8} {:>8} {:>12}",
            "STREAM", "TRIGGER", "LOCATED", "MISSING", "MAX |ERR|"
        );
        for row in &rows {
            let max_err = row
                .data_errors
                .iter()
                .fold(0.0f64, |acc, e| acc.max(e.abs()));
            println!(
                "{:<16} {:<16} {:>8} {:>8} {:>12.6}",
                row.stream, row.trigger, row.located, row.missing, max_err
            );
        }
    }

    if report.failures.is_empty() {
        exit_codes::SUCCESS
    } else {
        for failure in &report.failures {
            eprintln!("Failed: {}", failure);
        }
        exit_codes::PARTIAL_FAILURE
    }
}

fn collect_rows(report: &RunReport) -> Vec<MarkerRow> {
    report
        .datasets
        .iter()
        .flat_map(|d| d.streams.values())
        .flat_map(|s| {
            s.triggers.values().map(move |t| MarkerRow {
                stream: s.name.clone(),
                trigger: t.name.clone(),
                located: t.audit.len(),
                missing: t.missing_markers,
                data_indices: t.audit.data_indices.clone(),
                data_times: t.audit.data_times.clone(),
                data_errors: t.audit.data_errors.clone(),
                took_previous: t.audit.took_previous.clone(),
            })
        })
        .collect()
}
