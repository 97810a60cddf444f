//! Analysis executors: an external fit process and a log-only fallback.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::core::dispatcher::{AnalysisContext, AnalysisExecutor, AnalysisJob, AnalysisReport};
use crate::core::error::{AnalysisError, StationError};

/// Payload written to the analysis process's stdin.
#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    scan_no: u64,
    locator: &'a PathBuf,
    failed_reads: usize,
    context: &'a AnalysisContext,
}

/// Runs a configured command once per scan.
///
/// The artifact locator is appended as the last argument; the request is
/// written to stdin as JSON. A zero exit is success and the last line of
/// stdout becomes the report summary.
#[derive(Debug, Clone)]
pub struct ProcessAnalysisExecutor {
    program: String,
    args: Arc<[String]>,
}

impl ProcessAnalysisExecutor {
    /// Build from `program arg...`.
    ///
    /// # Errors
    ///
    /// Returns `StationError::Config` if `command` is empty.
    pub fn new(command: &[String]) -> Result<Self, StationError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| StationError::Config("analysis.command must not be empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.into(),
        })
    }

    /// Program being run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AnalysisExecutor for ProcessAnalysisExecutor {
    async fn analyse(&self, job: AnalysisJob) -> Result<AnalysisReport, AnalysisError> {
        let request = AnalysisRequest {
            scan_no: job.scan_no,
            locator: &job.locator,
            failed_reads: job.dataset.failed_reads(),
            context: &job.context,
        };
        let payload = serde_json::to_vec(&request).map_err(|e| AnalysisError::Failed(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(self.args.iter())
            .arg(&job.locator)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AnalysisError::Launch(format!("{}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The process may exit without reading its input; that is judged by the exit status.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(scan_no = job.scan_no, error = %e, "Analysis process closed stdin early");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AnalysisError::Failed(e.to_string()))?;

        if !output.status.success() {
            return Err(AnalysisError::Exited {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let summary = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map_or_else(|| format!("scan {} analysed", job.scan_no), |line| line.trim().to_string());
        Ok(AnalysisReport { summary })
    }
}

/// Logs each scan and reports success. Used when no command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyExecutor;

#[async_trait]
impl AnalysisExecutor for LogOnlyExecutor {
    async fn analyse(&self, job: AnalysisJob) -> Result<AnalysisReport, AnalysisError> {
        let samples = job.dataset.samples.len();
        let failed_reads = job.dataset.failed_reads();
        info!(
            scan_no = job.scan_no,
            samples,
            failed_reads,
            locator = %job.locator.display(),
            "Scan recorded without analysis"
        );
        Ok(AnalysisReport {
            summary: format!("scan {} recorded ({samples} samples)", job.scan_no),
        })
    }
}

/// Executor chosen from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredExecutor {
    /// `analysis.command` is set.
    Process(ProcessAnalysisExecutor),
    /// No command configured.
    LogOnly(LogOnlyExecutor),
}

impl ConfiguredExecutor {
    /// Pick the executor for `config`.
    ///
    /// # Errors
    ///
    /// Returns `StationError::Config` if the configured command is empty.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, StationError> {
        match config.command.as_deref() {
            Some(command) => ProcessAnalysisExecutor::new(command).map(Self::Process),
            None => Ok(Self::LogOnly(LogOnlyExecutor)),
        }
    }
}

#[async_trait]
impl AnalysisExecutor for ConfiguredExecutor {
    async fn analyse(&self, job: AnalysisJob) -> Result<AnalysisReport, AnalysisError> {
        match self {
            Self::Process(executor) => executor.analyse(job).await,
            Self::LogOnly(executor) => executor.analyse(job).await,
        }
    }
}
