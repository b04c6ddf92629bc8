use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use super::{EngineFactory, EngineOptions, EngineSession};
use crate::config::EngineCommand;

/// Launches an external speech-to-text command per session.
///
/// The command is expected to transcribe continuously and print one
/// finalized segment per stdout line; EOF ends the session.
pub struct ProcessEngineFactory {
    program: String,
    args: Vec<String>,
}

impl ProcessEngineFactory {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_command(command: &EngineCommand) -> Self {
        Self::new(command.program.clone(), command.args.clone())
    }
}

#[async_trait]
impl EngineFactory for ProcessEngineFactory {
    async fn open(&self, options: EngineOptions) -> Result<Box<dyn EngineSession>> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{model}", &options.model)
                    .replace("{language}", &options.language)
            })
            .collect();

        debug!("Launching engine process: {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to launch engine process: {}", self.program))?;

        let stdout = child
            .stdout
            .take()
            .context("Engine process has no stdout handle")?;

        Ok(Box::new(ProcessSession {
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

struct ProcessSession {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl EngineSession for ProcessSession {
    async fn next_segment(&mut self) -> Result<Option<String>> {
        loop {
            match self
                .lines
                .next_line()
                .await
                .context("Failed to read from engine process")?
            {
                Some(line) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    return Ok(Some(text.to_string()));
                }
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // The process may already have exited on its own.
        if let Err(e) = self.child.start_kill() {
            debug!("Engine process already gone: {}", e);
        }
        match self.child.wait().await {
            Ok(status) => debug!("Engine process exited: {}", status),
            Err(e) => warn!("Failed to reap engine process: {}", e),
        }
        Ok(())
    }
}
