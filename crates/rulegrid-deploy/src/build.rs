//! External build invocation.
//!
//! The rule project is compiled by an external tool (`mvn clean install
//! -DskipTests` by default). The invocation is fail-closed: a missing
//! binary, a non-zero exit, or blowing the wall-clock budget all surface as
//! a build failure with the captured output attached.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use rulegrid_core::BuildConfig;

use crate::error::{PipelineError, PipelineResult};

/// Arguments appended to the configured build command.
const BUILD_ARGS: [&str; 3] = ["clean", "install", "-DskipTests"];

/// Captured output of a successful build.
#[derive(Debug)]
pub struct BuildOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run the build tool in `project_dir` and wait for it, bounded by the
/// configured timeout.
pub async fn run_build(config: &BuildConfig, project_dir: &Path) -> PipelineResult<BuildOutput> {
    let timeout = Duration::from_secs(config.timeout_secs);
    debug!(
        command = %config.command,
        dir = %project_dir.display(),
        timeout_secs = config.timeout_secs,
        "starting rule project build"
    );

    let started = std::time::Instant::now();
    let child = Command::new(&config.command)
        .args(BUILD_ARGS)
        .current_dir(project_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::Build {
            detail: format!("cannot start {}: {e}", config.command),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(PipelineError::Build {
                detail: format!("build process error: {e}"),
            });
        }
        Err(_) => {
            warn!(timeout_secs = config.timeout_secs, "build timed out, killing");
            return Err(PipelineError::Build {
                detail: format!("build exceeded {}s", config.timeout_secs),
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(PipelineError::Build {
            detail: format!(
                "{} exited with {}: {}",
                config.command,
                output.status,
                tail(&stderr, &stdout)
            ),
        });
    }

    let duration = started.elapsed();
    info!(duration_ms = duration.as_millis() as u64, "rule project built");
    Ok(BuildOutput {
        stdout,
        stderr,
        duration,
    })
}

/// Last few lines of build output, preferring stderr.
fn tail(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = source.lines().rev().take(5).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &str, timeout_secs: u64) -> BuildConfig {
        BuildConfig {
            command: command.into(),
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn missing_tool_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_build(&config("definitely-not-a-build-tool", 5), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Build { .. }));
        assert!(err.to_string().contains("cannot start"));
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_output() {
        let dir = tempfile::tempdir().unwrap();
        // `false` ignores the standard args and exits 1.
        let err = run_build(&config("false", 5), dir.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Build { .. }));
    }

    #[tokio::test]
    async fn successful_run_reports_duration() {
        let dir = tempfile::tempdir().unwrap();
        // `true` ignores the standard args and exits 0.
        let output = run_build(&config("true", 5), dir.path()).await.unwrap();
        assert!(output.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn overlong_build_times_out() {
        let dir = tempfile::tempdir().unwrap();
        // `sleep` and `yes` treat the standard args as bad operands and may
        // exit fast; `watch` re-runs the (failing) command forever.
        let err = run_build(&config("watch", 1), dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("exceeded"));
    }

    #[test]
    fn tail_prefers_stderr() {
        assert_eq!(tail("boom", "ok"), "boom");
        assert_eq!(tail("", "a\nb"), "a | b");
    }
}
