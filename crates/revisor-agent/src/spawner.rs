use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::{AgentConfig, AgentError, AgentOutput};

/// Utility for spawning CLI agent processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process, wait for it (bounded by `config.timeout`) and capture its output
    pub async fn spawn(
        binary: &Path,
        args: &[&str],
        config: &AgentConfig,
    ) -> Result<AgentOutput, AgentError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            arg_count = args.len(),
            working_dir = %config.working_dir.display(),
            "Spawning agent process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AgentError::NotFound(binary.display().to_string()),
            _ => AgentError::SpawnFailed(e),
        })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = match config.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| AgentError::Timeout(limit))??,
            None => child.wait_with_output().await?,
        };

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        trace!(stdout_len = stdout.len(), stderr_len = stderr.len(), "Captured output");

        debug!(
            exit_code = output.status.code().unwrap_or(-1),
            duration_ms = duration.as_millis(),
            "Agent process completed"
        );

        Ok(AgentOutput::new(
            stdout,
            stderr,
            output.status.code().unwrap_or(-1),
            duration,
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_captures_stdout() {
        let config = AgentConfig::new(std::env::temp_dir());
        let output = ProcessSpawner::spawn(Path::new("echo"), &["hello"], &config)
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.text, "hello");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let config = AgentConfig::new(std::env::temp_dir());
        let result =
            ProcessSpawner::spawn(&PathBuf::from("definitely-not-a-binary-xyz"), &[], &config)
                .await;
        assert!(matches!(result, Err(AgentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_spawn_times_out() {
        let config =
            AgentConfig::new(std::env::temp_dir()).with_timeout(Duration::from_millis(50));
        let result = ProcessSpawner::spawn(Path::new("sleep"), &["5"], &config).await;
        assert!(matches!(result, Err(AgentError::Timeout(_))));
    }
}
