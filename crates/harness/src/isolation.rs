//! Run a unit in a child `xlbench-unit` process.
//!
//! The request goes to the child's stdin as JSON; the child answers with a
//! [`FeatureScore`] as JSON on stdout. A crash or hang only loses that unit.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use xlbench_model::FeatureScore;

use crate::unit::UnitRequest;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// `xlbench-unit` next to the running executable, or on `PATH` when the
/// executable location is unknown.
pub fn default_unit_binary() -> PathBuf {
    let name = format!("xlbench-unit{}", std::env::consts::EXE_SUFFIX);
    match std::env::current_exe() {
        Ok(exe) => exe.with_file_name(name),
        Err(_) => PathBuf::from(name),
    }
}

/// Run `request` in a child process. `Err` carries the note for the unit.
pub fn run_isolated(
    binary: &Path,
    request: &UnitRequest,
    timeout: Duration,
) -> Result<FeatureScore, String> {
    let input = serde_json::to_vec(request).map_err(|e| format!("Failed to encode unit request: {e}"))?;

    let mut child = Command::new(binary)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| format!("Failed to start {}: {e}", binary.display()))?;
    debug!("{}: spawned pid {} for {}", request.library, child.id(), request.file.feature);

    let stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(&input) {
            // The child may already have died; its exit status says why.
            debug!("{}: writing unit request failed: {e}", request.library);
        }
    }

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                warn!(
                    "{}: killing unit process for {} after {}s",
                    request.library,
                    request.file.feature,
                    timeout.as_secs()
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("Timed out after {}s", timeout.as_secs()));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(format!("Failed to wait for unit process: {e}")),
        }
    };

    let output = reader.join().unwrap_or_default();
    if !status.success() {
        warn!("{}: unit process exited with {status}", request.library);
        return Err(format!("Adapter process exited with {status}"));
    }

    serde_json::from_slice(&output).map_err(|e| format!("Malformed unit response: {e}"))
}
