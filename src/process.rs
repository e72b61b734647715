//! External command execution
//!
//! All side effects on the target machine go through a [`CommandRunner`].
//! [`SystemRunner`] spawns real processes (isolated in their own process group
//! and tracked for cleanup), echoes each command line and streams its output.
//! [`RecordingRunner`] is an in-memory fake that records every command and
//! answers with scripted output, so planning and bootloader logic can be
//! exercised without a disk.

use crate::error::{InstallerError, Result};
use crate::process_guard::{track_child, untrack_child, CommandProcessGroup};
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

/// A command line to execute.
///
/// `stdin` is fed to the process and never logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// The command line as echoed to the operator.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`InstallerError::Exec`].
    pub fn ensure_success(self, spec: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(InstallerError::Exec {
                command: spec.program.clone(),
                args: spec.args.clone(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Executes external commands on behalf of the installer.
pub trait CommandRunner {
    /// Run `spec` to completion and return its output, whatever the exit code.
    ///
    /// Errors only when the process could not be run at all.
    fn execute(&mut self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run `spec` and fail on a non-zero exit. Returns trimmed stdout.
    fn run_spec(&mut self, spec: &CommandSpec) -> Result<String> {
        let output = self.execute(spec)?.ensure_success(spec)?;
        Ok(output.stdout.trim().to_string())
    }

    /// Shorthand for [`run_spec`](Self::run_spec) with plain arguments.
    fn run(&mut self, program: &str, args: &[&str]) -> Result<String> {
        self.run_spec(&CommandSpec::new(program).args(args.iter().copied()))
    }

    /// Run a command whose failure is tolerated. Returns whether it succeeded.
    fn run_lenient(&mut self, program: &str, args: &[&str]) -> bool {
        let spec = CommandSpec::new(program).args(args.iter().copied());
        match self.execute(&spec) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!(command = %spec.display(), code = ?output.code, "command failed (tolerated)");
                false
            }
            Err(e) => {
                warn!(command = %spec.display(), "command could not run (tolerated): {}", e);
                false
            }
        }
    }
}

// ============================================================================
// SystemRunner
// ============================================================================

/// Runs commands on the live system.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// In dry-run mode commands are echoed and logged but never spawned.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

impl CommandRunner for SystemRunner {
    fn execute(&mut self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.display();
        println!("$ {}", line);
        info!(command = %line, "executing");

        if self.dry_run {
            info!(command = %line, "dry-run: not executed");
            return Ok(CommandOutput::ok(""));
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .in_new_process_group();

        let mut child = cmd.spawn().map_err(|e| InstallerError::Exec {
            command: spec.program.clone(),
            args: spec.args.clone(),
            code: None,
            stderr: format!("failed to spawn: {}", e),
        })?;
        let pid = child.id();
        track_child(pid);

        if let (Some(input), Some(mut pipe)) = (spec.stdin.as_ref(), child.stdin.take()) {
            if let Err(e) = pipe.write_all(input.as_bytes()) {
                drop(pipe);
                warn!(command = %line, error = %e, "could not feed stdin, stopping the process");
                if let Err(kill_err) = child.kill() {
                    debug!(pid, error = %kill_err, "process already gone");
                }
                let reaped = child.wait();
                untrack_child(pid);
                if let Err(wait_err) = reaped {
                    debug!(pid, error = %wait_err, "wait after failed stdin write");
                }
                return Err(e.into());
            }
        }

        let stderr_reader = child.stderr.take().map(|pipe| {
            thread::spawn(move || {
                let mut collected = String::new();
                for line in BufReader::new(pipe).lines().map_while(|l| l.ok()) {
                    eprintln!("{}", line);
                    collected.push_str(&line);
                    collected.push('\n');
                }
                collected
            })
        });

        let mut stdout = String::new();
        if let Some(pipe) = child.stdout.take() {
            for line in BufReader::new(pipe).lines().map_while(|l| l.ok()) {
                println!("{}", line);
                stdout.push_str(&line);
                stdout.push('\n');
            }
        }

        let status = child.wait();
        untrack_child(pid);
        let status = status?;

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        debug!(command = %line, code = ?status.code(), "finished");

        Ok(CommandOutput {
            stdout,
            stderr,
            code: status.code(),
        })
    }
}

// ============================================================================
// RecordingRunner
// ============================================================================

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    output: CommandOutput,
    remaining: Option<usize>,
}

/// In-memory runner that records commands and replays scripted output.
///
/// A rule matches when its needle is a substring of the echoed command line.
/// Rules are tried in insertion order; commands with no matching rule succeed
/// with empty output.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    pub commands: Vec<CommandSpec>,
    rules: Vec<Rule>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching command with `stdout`.
    pub fn respond(&mut self, needle: &str, stdout: &str) -> &mut Self {
        self.push_rule(needle, CommandOutput::ok(stdout), None)
    }

    /// Answer the next matching command only.
    pub fn respond_once(&mut self, needle: &str, stdout: &str) -> &mut Self {
        self.push_rule(needle, CommandOutput::ok(stdout), Some(1))
    }

    /// Make every matching command exit with `code`.
    pub fn fail(&mut self, needle: &str, code: i32, stderr: &str) -> &mut Self {
        self.push_rule(needle, CommandOutput::failed(code, stderr), None)
    }

    fn push_rule(&mut self, needle: &str, output: CommandOutput, remaining: Option<usize>) -> &mut Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            output,
            remaining,
        });
        self
    }

    /// Echoed command lines, in execution order.
    pub fn command_lines(&self) -> Vec<String> {
        self.commands.iter().map(CommandSpec::display).collect()
    }

    /// True if any executed command line contains `needle`.
    pub fn ran(&self, needle: &str) -> bool {
        self.commands.iter().any(|c| c.display().contains(needle))
    }

    /// Index of the first command line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.display().contains(needle))
    }
}

impl CommandRunner for RecordingRunner {
    fn execute(&mut self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.display();
        self.commands.push(spec.clone());

        for rule in self.rules.iter_mut() {
            if !line.contains(&rule.needle) || rule.remaining == Some(0) {
                continue;
            }
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return Ok(rule.output.clone());
        }

        Ok(CommandOutput::ok(""))
    }
}
