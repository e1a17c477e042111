use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

use crate::repo_tools::safety::truncate_string;
use crate::repo_tools::ToolError;
use crate::workspace::CommandRunner;

const MAX_OUTPUT_CHARS: usize = 200_000;

/// Runs a command to completion and returns its interleaved output.
pub async fn run_command(
    runner: &dyn CommandRunner,
    cmd: &str,
    args: &[String],
    cwd: &Path,
    limit: Duration,
) -> Result<String, ToolError> {
    if cmd.trim().is_empty() {
        return Err(ToolError::Argument("Missing command".to_string()));
    }

    let start = Instant::now();
    let stream = runner.run(cmd, args, cwd).await
        .map_err(|e| ToolError::Execution(format!("Command failed: {}", e)))?;

    // Dropping the stream on timeout kills the process.
    let output = timeout(limit, stream.collect_text()).await
        .map_err(|_| ToolError::Execution("Timeout".to_string()))?;

    let duration_ms = start.elapsed().as_millis() as u64;
    let (text, truncated) = truncate_string(&output, MAX_OUTPUT_CHARS);
    debug!(%cmd, duration_ms, truncated, "command finished");

    if truncated {
        Ok(format!("{}\n[output truncated]", text))
    } else {
        Ok(text)
    }
}
