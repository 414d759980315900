use crate::cli::ProcessorsArgs;
use crate::exit_codes;
use crate::output;
use epoch_rs::processing::PROCESSOR_REGISTRY;
use epoch_rs::ProcessorKind;
use serde::Serialize;

#[derive(Serialize)]
struct ProcessorRow {
    name: &'static str,
    kind: ProcessorKind,
    params: &'static [&'static str],
    documentation: &'static str,
}

pub fn execute(args: ProcessorsArgs) -> i32 {
    let rows: Vec<ProcessorRow> = PROCESSOR_REGISTRY
        .iter()
        .map(|p| ProcessorRow {
            name: p.name,
            kind: p.kind,
            params: p.params,
            documentation: p.documentation,
        })
        .collect();

    if args.json {
        if let Err(e) = output::emit(&rows, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        return exit_codes::SUCCESS;
    }

    println!("{:<22} {:<14} {:<32}", "NAME", "KIND", "PARAMS");
    for row in &rows {
        let kind = match row.kind {
            ProcessorKind::TrialFilter => "trial filter",
            ProcessorKind::TriggerStage => "trigger stage",
        };
        println!("{:<22} {:<14} {:<32}", row.name, kind, row.params.join(", "));
        println!("    {}", row.documentation);
    }
    println!();
    println!("Trigger stages run in the order resample, rm_baseline, percent_change.");

    exit_codes::SUCCESS
}
