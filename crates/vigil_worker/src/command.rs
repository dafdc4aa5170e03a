//! External command runner
//!
//! Backends, motion control, blink and notification hooks are all plain
//! commands from the config file. Templates are split on whitespace and
//! placeholders (`{file}`, `{color}`, ...) are substituted per argument, so
//! values from the bus are never interpreted by a shell.

use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried in an error.
const MAX_STDERR_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Empty command template")]
    Empty,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A parsed command line with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn parse(template: &str) -> Result<Self, CommandError> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(CommandError::Empty)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with every `{key}` replaced.
    pub fn render_args(&self, substitutions: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                substitutions.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }

    /// Run to completion and capture output, whatever the exit status.
    pub async fn run(&self, substitutions: &[(&str, &str)]) -> Result<CommandOutput, CommandError> {
        self.run_with_extra(substitutions, &[]).await
    }

    /// Like [`run`](Self::run) with trailing arguments appended verbatim.
    pub async fn run_with_extra(
        &self,
        substitutions: &[(&str, &str)],
        extra: &[&str],
    ) -> Result<CommandOutput, CommandError> {
        let args = self.render_args(substitutions);
        debug!("Running {} {:?} {:?}", self.program, args, extra);

        let output = Command::new(&self.program)
            .args(&args)
            .args(extra)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(CommandOutput::from(output))
    }

    /// Run and treat a non-zero exit as an error.
    pub async fn run_checked(&self, substitutions: &[(&str, &str)]) -> Result<CommandOutput, CommandError> {
        let output = self.run(substitutions).await?;
        self.check(output)
    }

    fn check(&self, output: CommandOutput) -> Result<CommandOutput, CommandError> {
        if output.success {
            Ok(output)
        } else {
            Err(CommandError::Failed {
                program: self.program.clone(),
                code: output.code,
                stderr: truncate(&output.stderr),
            })
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

fn truncate(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.chars().count() > MAX_STDERR_CHARS {
        let head: String = trimmed.chars().take(MAX_STDERR_CHARS).collect();
        format!("{}... (truncated)", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let tpl = CommandTemplate::parse("rclone copy /var/motion/{file} remote:{file}").unwrap();
        assert_eq!(tpl.program(), "rclone");
        assert_eq!(
            tpl.render_args(&[("file", "cam1-0001.mkv")]),
            vec!["copy", "/var/motion/cam1-0001.mkv", "remote:cam1-0001.mkv"]
        );
    }

    #[test]
    fn test_substitution_is_not_reparsed() {
        let tpl = CommandTemplate::parse("rm {file}").unwrap();
        assert_eq!(tpl.render_args(&[("file", "a; rm -rf /")]), vec!["a; rm -rf /"]);
    }

    #[test]
    fn test_empty_template() {
        assert!(matches!(CommandTemplate::parse("   "), Err(CommandError::Empty)));
    }

    #[test]
    fn test_truncate_long_stderr() {
        let long = "x".repeat(800);
        let truncated = truncate(&long);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() < 520);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout() {
        let tpl = CommandTemplate::parse("echo {word}").unwrap();
        let output = tpl.run(&[("word", "hello")]).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_checked_reports_failure() {
        let tpl = CommandTemplate::parse("false").unwrap();
        let err = tpl.run_checked(&[]).await.unwrap_err();
        assert!(matches!(err, CommandError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let tpl = CommandTemplate::parse("vigil-definitely-not-installed").unwrap();
        assert!(matches!(tpl.run(&[]).await, Err(CommandError::Spawn { .. })));
    }
}
