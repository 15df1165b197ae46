// xlbench-unit: run one benchmark unit in an isolated process.
//
// Reads a UnitRequest as JSON on stdin and writes the FeatureScore as JSON
// on stdout. A crash here only loses this unit.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use xlbench_adapters::registry::builtin;
use xlbench_harness::exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};
use xlbench_harness::{run_unit, UnitRequest};

fn main() -> ExitCode {
    let verbosity = std::env::var("XLBENCH_UNIT_VERBOSE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    xlbench_harness::logger::init(verbosity);

    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("error: reading request: {e}");
        return ExitCode::from(EXIT_USAGE);
    }
    let request: UnitRequest = match serde_json::from_str(&input) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: malformed request: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let Some(adapter) = builtin(&request.library) else {
        eprintln!("error: adapter '{}' is not compiled into this build", request.library);
        return ExitCode::from(EXIT_USAGE);
    };
    let reference = builtin(&request.reference_reader);

    let score = run_unit(adapter.as_ref(), reference.as_deref(), &request);
    let out = match serde_json::to_string(&score) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: encoding result: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let mut stdout = io::stdout().lock();
    if writeln!(stdout, "{out}").and_then(|_| stdout.flush()).is_err() {
        return ExitCode::from(EXIT_ERROR);
    }
    ExitCode::from(EXIT_SUCCESS)
}
