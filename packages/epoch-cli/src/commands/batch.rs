use crate::cli::BatchArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use epoch_rs::EpochRunner;
use std::path::Path;
use std::time::Instant;

pub fn execute(args: BatchArgs) -> i32 {
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    // Configuration is shared, so it is checked once up front
    let runner = match params::build_config(&args.pipeline)
        .and_then(|c| EpochRunner::new(c).map_err(|e| e.to_string()))
    {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let total = files.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut with_unit_failures = 0usize;
    let start_time = Instant::now();

    for (i, file_path) in files.iter().enumerate() {
        if !args.quiet {
            eprintln!("[{}/{}] {}...", i + 1, total, file_path);
        }

        let recording = match params::load_recording(file_path) {
            Ok(r) => r,
            Err(msg) => {
                eprintln!("  Error: {}", msg);
                failed += 1;
                if !args.continue_on_error {
                    break;
                }
                continue;
            }
        };

        let report = match runner.run(vec![recording]) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("  Extraction failed: {}", e);
                failed += 1;
                if !args.continue_on_error {
                    break;
                }
                continue;
            }
        };

        let written = match args.output_dir {
            Some(ref dir) => {
                let stem = Path::new(file_path)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("output");
                let out_path = Path::new(dir).join(format!("{}_epochs.json", stem));
                output::emit(&report, args.compact, out_path.to_str())
            }
            // JSON lines on stdout
            None => output::emit(&report, true, None),
        };
        if let Err(e) = written {
            eprintln!("  Error writing output: {}", e);
            failed += 1;
            if !args.continue_on_error {
                break;
            }
            continue;
        }

        if !report.failures.is_empty() {
            with_unit_failures += 1;
            for failure in &report.failures {
                eprintln!("  Failed: {}", failure);
            }
        }
        succeeded += 1;
    }

    let elapsed = start_time.elapsed();

    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            succeeded,
            total,
            failed,
            total,
            elapsed.as_secs_f64()
        );
    }

    if failed == 0 && with_unit_failures == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else {
        Err("One of --glob or --files must be specified".to_string())
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths =
        glob::glob(pattern).map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() && params::is_supported_extension(&path) {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}
