// External command-line tools
// Blocking subprocess invocation with captured output

use std::ffi::OsStr;
use std::process::{Command, Output};
use thiserror::Error;

/// Longest stderr excerpt kept in an error message
const STDERR_EXCERPT: usize = 2000;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to execute {program}: {source}. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Run `program` with `args`, wait for it, and require a zero exit status
pub fn run<I, S>(program: &str, args: I) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: excerpt(&String::from_utf8_lossy(&output.stderr)),
        });
    }

    Ok(output)
}

// Tail of stderr; tools print the actual error last
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_EXCERPT).collect()
}
