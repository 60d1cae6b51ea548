//! Collaborators backed by external commands
//!
//! The generator receives a [`GenerationHint`] as JSON on stdin and prints a
//! candidate as JSON on stdout. The publisher receives the candidate on stdin
//! and may print a [`PublishReceipt`]; empty output counts as success.

use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::models::ContentCandidate;

use super::collaborator::{
    CollaboratorError, ContentSource, GenerationHint, PublishReceipt, PublishTarget,
};

/// Program plus arguments, split on whitespace
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Run with `input` as JSON on stdin, returning stdout
    async fn run<T: Serialize>(&self, role: &'static str, input: &T) -> Result<String, CollaboratorError> {
        let payload = serde_json::to_vec(input).map_err(|e| CollaboratorError::InvalidOutput {
            role,
            detail: format!("could not encode input: {e}"),
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CollaboratorError::Io { role, source })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // The command exited without reading its input; its status decides
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(source) => return Err(CollaboratorError::Io { role, source }),
            }
            // Close stdin so the child sees EOF
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| CollaboratorError::Io { role, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::Command {
                role,
                detail: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| CollaboratorError::InvalidOutput {
            role,
            detail: e.to_string(),
        })
    }
}

/// Generator run as a child process per request
#[derive(Debug, Clone)]
pub struct CommandSource {
    command: CommandLine,
}

impl CommandSource {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ContentSource for CommandSource {
    async fn generate(&self, hint: &GenerationHint) -> Result<ContentCandidate, CollaboratorError> {
        let stdout = self.command.run("generator", hint).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| CollaboratorError::InvalidOutput {
            role: "generator",
            detail: e.to_string(),
        })
    }
}

/// Publisher run as a child process per post
#[derive(Debug, Clone)]
pub struct CommandTarget {
    command: CommandLine,
}

impl CommandTarget {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

#[async_trait]
impl PublishTarget for CommandTarget {
    async fn publish(&self, post: &ContentCandidate) -> Result<PublishReceipt, CollaboratorError> {
        let stdout = self.command.run("publisher", post).await?;
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(PublishReceipt::default());
        }
        serde_json::from_str(stdout).map_err(|e| CollaboratorError::InvalidOutput {
            role: "publisher",
            detail: e.to_string(),
        })
    }
}
