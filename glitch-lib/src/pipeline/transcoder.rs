//! External encoder process fed with raw PCM on stdin.

use log::{info, warn};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use crate::error::PipelineError;
use crate::settings::{RenderSettings, TranscoderSettings};

/// A running transcoder child process.
pub struct Transcoder {
    program: String,
    child: Child,
    stderr: Option<JoinHandle<usize>>,
}

impl Transcoder {
    /// Spawn the configured command with piped stdin and stdout.
    ///
    /// The PCM format placeholders in the arguments are taken from `render`.
    /// Anything the process prints on stderr is forwarded to the log.
    pub fn spawn(
        settings: &TranscoderSettings,
        render: &RenderSettings,
    ) -> Result<(Self, ChildStdin, ChildStdout), PipelineError> {
        let spawn_error = |source| PipelineError::Spawn {
            program: settings.program.clone(),
            source,
        };
        let mut child = Command::new(&settings.program)
            .args(settings.command_args(render))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        info!("Started transcoder `{}` (pid {})", settings.program, child.id());

        let stderr = match child.stderr.take() {
            Some(stderr) => {
                let program = settings.program.clone();
                let forwarder = thread::Builder::new()
                    .name("glitch-transcoder-log".to_string())
                    .spawn(move || forward_stderr(stderr, &program));
                match forwarder {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        warn!("Could not forward transcoder stderr: {}", err);
                        None
                    }
                }
            }
            None => None,
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let transcoder = Self {
            program: settings.program.clone(),
            child,
            stderr,
        };
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok((transcoder, stdin, stdout)),
            _ => Err(PipelineError::Transcoder(format!(
                "`{}` did not expose its pipes",
                transcoder.program
            ))),
        }
    }

    /// Wait for the process to exit; a non-zero status is an error.
    pub fn wait(&mut self) -> Result<(), PipelineError> {
        let status = self.child.wait()?;
        if let Some(forwarder) = self.stderr.take() {
            let _ = forwarder.join();
        }
        if status.success() {
            info!("Transcoder `{}` finished", self.program);
            Ok(())
        } else {
            Err(PipelineError::Transcoder(format!("`{}` {}", self.program, status)))
        }
    }
}

/// Log every non-empty line of `stderr` until it closes. Returns the line count.
fn forward_stderr(stderr: impl Read, program: &str) -> usize {
    let mut forwarded = 0;
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => {
                warn!("{}: {}", program, line.trim_end());
                forwarded += 1;
            }
            Err(_) => break,
        }
    }
    forwarded
}
