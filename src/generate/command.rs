//! Local LM command backend.
//!
//! Invokes a user-configured command with the rendered request on stdin and
//! takes stdout as the generated text. Any tool that reads a prompt and prints
//! a reply works (`llm`, `ollama run <model>`, a wrapper script), which keeps
//! provider choice, cost, and privacy with the user.
//!
//! # Request format
//!
//! ```text
//! # Instructions
//!
//! <stage instructions>
//!
//! # Input
//!
//! <payload text blocks, in order>
//! ```
//!
//! Images cannot be sent over stdin and are reduced to one descriptive line.
use super::{describe_timeout, non_empty_reply, render_request_text, ContentItem, GenerationClient, ServiceError};
use crate::pipeline::PipelineError;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Generation client that shells out to a local command.
#[derive(Debug, Clone)]
pub struct CommandClient {
    command: String,
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandClient {
    /// Parse `command` with shell quoting rules and check the program exists.
    pub fn new(command: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let argv = shell_words::split(command).map_err(|err| {
            PipelineError::Configuration(format!("parse LM command {command:?}: {err}"))
        })?;
        let Some(program) = argv.first() else {
            return Err(PipelineError::Configuration("LM command is empty".to_string()));
        };
        which::which(program).map_err(|err| {
            PipelineError::Configuration(format!("LM command program {program:?} not found: {err}"))
        })?;
        Ok(Self {
            command: command.to_string(),
            argv,
            timeout,
        })
    }
}

impl GenerationClient for CommandClient {
    fn generate(&self, instructions: &str, payload: &[ContentItem]) -> Result<String, ServiceError> {
        let images = payload
            .iter()
            .filter(|item| matches!(item, ContentItem::Image { .. }))
            .count();
        if images > 0 {
            tracing::warn!(images, "LM command backend cannot forward images; sending placeholders");
        }
        let prompt = render_request_text(instructions, payload);

        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ServiceError::new(format!("spawn LM command {}: {err}", self.argv[0])))?;

        // Feed stdin and drain both pipes on their own threads so a chatty
        // command can never block on a full pipe while we wait on it.
        let stdin = child.stdin.take();
        let prompt_bytes = prompt.len();
        let writer = thread::spawn(move || write_prompt(stdin, prompt));
        let (tx, rx) = mpsc::channel();
        spawn_reader(Pipe::Stdout, child.stdout.take(), tx.clone());
        spawn_reader(Pipe::Stderr, child.stderr.take(), tx);

        let status = wait_with_deadline(&mut child, deadline, self.timeout)?;
        // A process the command left behind can hold the pipes open after it exits.
        let (stdout, stderr) = collect_output(&rx, deadline, self.timeout)?;
        let stdout = stdout.map_err(|err| ServiceError::new(format!("read LM stdout: {err}")))?;
        let stderr = stderr.unwrap_or_default();
        if writer.is_finished() {
            if let Ok(Err(err)) = writer.join() {
                tracing::debug!(%err, "LM command did not read the whole prompt");
            }
        }

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes,
            response_bytes = stdout.len(),
            "lm invoke complete"
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(ServiceError::new(format!(
                "LM command failed with status {status}: {}",
                stderr.trim()
            )));
        }
        let text = String::from_utf8(stdout)
            .map_err(|err| ServiceError::new(format!("decode LM stdout as UTF-8: {err}")))?;
        non_empty_reply(text)
    }

    fn describe(&self) -> String {
        format!("command: {}", self.command)
    }
}

fn write_prompt(stdin: Option<std::process::ChildStdin>, prompt: String) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(prompt.as_bytes()) {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

type PipeOutput = (Pipe, io::Result<Vec<u8>>);

fn spawn_reader<R: Read + Send + 'static>(pipe: Pipe, source: Option<R>, tx: Sender<PipeOutput>) {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let result = match source {
            Some(mut source) => source.read_to_end(&mut bytes).map(|_| bytes),
            None => Ok(bytes),
        };
        // The receiver is gone once the call has timed out.
        let _ = tx.send((pipe, result));
    });
}

/// Wait for both pipes to reach end of file, up to `deadline`.
fn collect_output(
    rx: &Receiver<PipeOutput>,
    deadline: Instant,
    timeout: Duration,
) -> Result<(io::Result<Vec<u8>>, io::Result<Vec<u8>>), ServiceError> {
    let mut stdout = None;
    let mut stderr = None;
    loop {
        match (stdout, stderr) {
            (Some(out), Some(err)) => return Ok((out, err)),
            (out, err) => {
                stdout = out;
                stderr = err;
            }
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Pipe::Stdout, result)) => stdout = Some(result),
            Ok((Pipe::Stderr, result)) => stderr = Some(result),
            Err(RecvTimeoutError::Timeout) => {
                return Err(ServiceError::new(format!(
                    "LM command output {}",
                    describe_timeout(timeout)
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ServiceError::new("LM output reader stopped unexpectedly"));
            }
        }
    }
}

/// Wait for the child, killing it once `deadline` has passed.
fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
    timeout: Duration,
) -> Result<ExitStatus, ServiceError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ServiceError::new(format!(
                    "LM command {}",
                    describe_timeout(timeout)
                )));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => return Err(ServiceError::new(format!("wait for LM command: {err}"))),
        }
    }
}
