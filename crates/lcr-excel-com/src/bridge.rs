//! Subprocess management for the PowerShell automation host.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lcr_core::SheetLayout;
use tempfile::TempPath;

use crate::script::CONTROL_SCRIPT;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FALLBACK_DIAGNOSTIC: &str = "Excel processing failed";

/// Errors from the Excel COM bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn PowerShell: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("PowerShell not found at '{0}'")]
    PowerShellNotFound(String),

    #[error("Failed to write control script: {0}")]
    ScriptWrite(#[source] std::io::Error),

    #[error("Failed to wait for PowerShell: {0}")]
    WaitFailed(#[source] std::io::Error),

    /// The automation host exited non-zero; `diagnostics` is its output verbatim
    #[error("{diagnostics}")]
    ProcessFailed {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("Excel automation timed out after {0} s")]
    Timeout(u64),
}

/// Configuration for the Excel COM bridge.
#[derive(Debug, Clone)]
pub struct ExcelComConfig {
    /// PowerShell executable. Defaults to "powershell".
    pub powershell_path: PathBuf,

    /// Upper bound for one automation run; the host is killed after it.
    pub timeout: Duration,
}

impl Default for ExcelComConfig {
    fn default() -> Self {
        Self {
            powershell_path: PathBuf::from("powershell"),
            timeout: Duration::from_secs(300),
        }
    }
}

/// One copy-and-recalculate request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationJob {
    pub template_path: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub date_serial: i64,
    /// Sheet geometry the control script copies between
    pub layout: SheetLayout,
}

/// Runs automation jobs, one PowerShell process per job.
#[derive(Debug, Clone, Default)]
pub struct ExcelComBridge {
    config: ExcelComConfig,
}

impl ExcelComBridge {
    pub fn new(config: ExcelComConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExcelComConfig {
        &self.config
    }

    /// Run `job` to completion.
    ///
    /// The control script and pid file are temp files removed when this
    /// returns, on every path. On timeout PowerShell is killed, then the Excel
    /// process it recorded.
    pub fn run(&self, job: &AutomationJob) -> Result<(), BridgeError> {
        let script = write_temp(".ps1", CONTROL_SCRIPT.as_bytes())?;
        let pid_file = write_temp(".pid", b"")?;

        let mut cmd = self.command(job, &script, &pid_file);
        tracing::info!(
            output = %job.output_path.display(),
            date_serial = job.date_serial,
            "starting Excel automation"
        );

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BridgeError::PowerShellNotFound(self.config.powershell_path.display().to_string())
            } else {
                BridgeError::SpawnFailed(e)
            }
        })?;

        let stdout = child.stdout.take().map(collect_output);
        let stderr = child.stderr.take().map(collect_output);

        let deadline = started + self.config.timeout;
        let status: ExitStatus = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    terminate_recorded_host(&pid_file);
                    return Err(BridgeError::WaitFailed(e));
                }
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_secs = self.config.timeout.as_secs(),
                    "Excel automation timed out, terminating"
                );
                if let Err(e) = child.kill() {
                    tracing::warn!("failed to kill PowerShell: {e}");
                }
                let _ = child.wait();
                terminate_recorded_host(&pid_file);
                return Err(BridgeError::Timeout(self.config.timeout.as_secs()));
            }

            thread::sleep(POLL_INTERVAL);
        };

        let stdout = join_output(stdout);
        let stderr = join_output(stderr);

        if !status.success() {
            let diagnostics = diagnostics(&stdout, &stderr);
            tracing::warn!(code = ?status.code(), "Excel automation failed: {diagnostics}");
            return Err(BridgeError::ProcessFailed {
                code: status.code(),
                diagnostics,
            });
        }

        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Excel automation finished");
        Ok(())
    }

    fn command(&self, job: &AutomationJob, script: &Path, pid_file: &Path) -> Command {
        let layout = &job.layout;
        let source = layout.source_range;

        let mut cmd = Command::new(&self.config.powershell_path);
        cmd.args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"])
            .arg(script)
            .arg("-TemplatePath")
            .arg(&job.template_path)
            .arg("-InputPath")
            .arg(&job.input_path)
            .arg("-OutputPath")
            .arg(&job.output_path)
            .arg("-DateSerial")
            .arg(job.date_serial.to_string())
            .arg("-SheetName")
            .arg(&layout.target_sheet)
            .arg("-ClearRange")
            .arg(layout.target_clear_range().to_a1_string())
            .arg("-TargetAnchor")
            .arg(layout.target_anchor.to_a1_string())
            .arg("-DateCell")
            .arg(layout.date_cell.to_a1_string())
            .arg("-FirstRow")
            .arg(source.start.row_number().to_string())
            .arg("-FirstColumn")
            .arg((u32::from(source.start.col) + 1).to_string())
            .arg("-ColumnCount")
            .arg(layout.col_count().to_string())
            .arg("-PidFile")
            .arg(pid_file);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

/// Write `contents` to a closed temp file that is deleted when dropped
fn write_temp(suffix: &str, contents: &[u8]) -> Result<TempPath, BridgeError> {
    let mut file = tempfile::Builder::new()
        .prefix("lcr-excel-")
        .suffix(suffix)
        .tempfile()
        .map_err(BridgeError::ScriptWrite)?;
    file.write_all(contents).map_err(BridgeError::ScriptWrite)?;
    file.flush().map_err(BridgeError::ScriptWrite)?;
    Ok(file.into_temp_path())
}

fn collect_output<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

/// stderr if the host wrote anything there, else stdout, trimmed; a fixed
/// message when that is blank
fn diagnostics(stdout: &str, stderr: &str) -> String {
    let chosen = if stderr.is_empty() { stdout } else { stderr };
    match chosen.trim() {
        "" => FALLBACK_DIAGNOSTIC.to_string(),
        text => text.to_string(),
    }
}

/// Kill the Excel process whose id the control script recorded, if any
fn terminate_recorded_host(pid_file: &Path) {
    let pid = match std::fs::read_to_string(pid_file) {
        Ok(text) => match text.trim().parse::<u32>() {
            Ok(pid) if pid > 0 => pid,
            _ => return,
        },
        Err(e) => {
            tracing::warn!("could not read automation pid file: {e}");
            return;
        }
    };

    tracing::warn!(pid, "terminating orphaned Excel process");
    let result = kill_command(pid)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!(pid, code = ?status.code(), "Excel process kill failed"),
        Err(e) => tracing::warn!(pid, "Excel process kill failed: {e}"),
    }
}

#[cfg(windows)]
fn kill_command(pid: u32) -> Command {
    let mut cmd = Command::new("taskkill");
    cmd.args(["/F", "/PID"]).arg(pid.to_string());
    cmd
}

#[cfg(not(windows))]
fn kill_command(pid: u32) -> Command {
    let mut cmd = Command::new("kill");
    cmd.arg("-KILL").arg(pid.to_string());
    cmd
}
