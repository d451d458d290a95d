//! Shell command execution for execute steps and external collaborators.
//! CommandGate runs a command line, captures its output, and applies the
//! step's failure policy.

use crate::error::{Error, Result};
use log::{debug, info};
use std::path::Path;
use std::process::Command;

/// Captured result of one shell invocation.
#[derive(Debug)]
pub struct CommandOutcome {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub status: String,
}

/// Executes literal shell command strings and captures their output.
pub struct CommandGate;

impl CommandGate {
    pub fn new() -> Self {
        Self
    }

    /// Runs `command` through the shell, blocking until it exits.
    pub fn run(&self, command: &str) -> Result<CommandOutcome> {
        debug!("Running {}", command);
        let output = Command::new("sh").arg("-c").arg(command).output()?;
        Ok(CommandOutcome {
            command: command.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            status: output.status.to_string(),
        })
    }

    /// Runs a command under a fatal error policy: a non-zero exit re-raises
    /// as `CommandFailed`.
    pub fn run_fatal(&self, command: &str) -> Result<CommandOutcome> {
        let outcome = self.run(command)?;
        if !outcome.success {
            return Err(Error::CommandFailed {
                command: outcome.command,
                status: outcome.status,
            });
        }
        Ok(outcome)
    }
}

impl Default for CommandGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandOutcome {
    /// Writes captured stdout to a file, with optional prepend/append text.
    pub fn write_outfile(
        &self,
        path: &Path,
        prepend: Option<&str>,
        append: Option<&str>,
    ) -> Result<()> {
        let mut content = String::new();
        if let Some(text) = prepend {
            content.push_str(text);
            content.push('\n');
        }
        content.push_str(&self.stdout);
        if let Some(text) = append {
            content.push_str(text);
            content.push('\n');
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        info!("Command output written to {}", path.display());
        Ok(())
    }

    /// Echoes captured output to the console.
    pub fn echo(&self) {
        if !self.stdout.is_empty() {
            println!("{}", self.stdout.trim_end());
        }
        if !self.stderr.is_empty() {
            eprintln!("{}", self.stderr.trim_end());
        }
    }
}
