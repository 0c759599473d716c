//! Blocking invocation of external command-line tools

use crate::error::{Result, ToolkitError};
use std::ffi::OsStr;
use std::process::Command;

/// Captured result of a successful tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args`, waiting for it to finish.
///
/// A spawn failure or non-zero exit becomes [`ToolkitError::ExternalTool`]
/// carrying the tail of stderr.
pub fn run_tool<I, S>(program: &str, args: I) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    tracing::debug!(
        "running {} {}",
        program,
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| ToolkitError::tool(program, format!("failed to start: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        return Err(ToolkitError::tool(
            program,
            format!("exited with status {}: {}", code, tail(&stderr, 20)),
        ));
    }

    Ok(ToolOutput { stdout, stderr })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
