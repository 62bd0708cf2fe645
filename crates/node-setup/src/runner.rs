//! External process execution.
//!
//! Every OS mutation (package installs, service restarts, git, docker) goes
//! through a [`ShellRunner`]. Commands are argument vectors, never shell
//! strings, so nothing is re-parsed by `/bin/sh` on the way out.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, error};

use crate::error::{Result, SetupError};

/// A single external command: program, arguments, working directory and
/// environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
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

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(line) => f.write_str(&line),
            Err(_) => write!(f, "{} {}", self.program, self.args.join(" ")),
        }
    }
}

/// Captured result of a command run with [`ShellRunner::output`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait ShellRunner {
    /// Run with inherited stdio and return the exit code.
    fn status(&self, inv: &Invocation) -> Result<i32>;

    /// Run with captured stdout/stderr.
    fn output(&self, inv: &Invocation) -> Result<CommandOutput>;
}

/// Run `inv`; a non-zero exit is fatal.
pub fn run_checked(runner: &dyn ShellRunner, inv: &Invocation) -> Result<()> {
    debug!("running: {}", inv);
    let code = runner.status(inv)?;
    if code != 0 {
        error!("command failed: '{}'", inv);
        return Err(SetupError::CommandFailed {
            command: inv.to_string(),
            code,
        });
    }
    Ok(())
}

/// Run `inv` and ignore a non-zero exit (e.g. stopping a service that may not
/// exist). Spawn failures are ignored too.
pub fn run_tolerant(runner: &dyn ShellRunner, inv: &Invocation) {
    debug!("running (tolerant): {}", inv);
    match runner.status(inv) {
        Ok(0) => {}
        Ok(code) => debug!("ignoring exit {} from '{}'", code, inv),
        Err(e) => debug!("ignoring failure of '{}': {}", inv, e),
    }
}

/// Run `inv` capturing stdout; a non-zero exit is fatal.
pub fn capture_checked(runner: &dyn ShellRunner, inv: &Invocation) -> Result<String> {
    debug!("capturing: {}", inv);
    let out = runner.output(inv)?;
    if !out.success() {
        error!("command failed: '{}': {}", inv, out.stderr.trim());
        return Err(SetupError::CommandFailed {
            command: inv.to_string(),
            code: out.code,
        });
    }
    Ok(out.stdout)
}

// ---------------------------------------------------------------------------
// Real runner
// ---------------------------------------------------------------------------

/// Runs commands on the host with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(inv: &Invocation) -> Command {
        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args);
        if let Some(dir) = &inv.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &inv.env {
            cmd.env(k, v);
        }
        cmd
    }

    fn spawn_error(inv: &Invocation, source: std::io::Error) -> SetupError {
        SetupError::Spawn {
            command: inv.to_string(),
            source,
        }
    }
}

impl ShellRunner for SystemRunner {
    fn status(&self, inv: &Invocation) -> Result<i32> {
        let status = Self::command(inv)
            .status()
            .map_err(|e| Self::spawn_error(inv, e))?;
        // Killed by a signal: no exit code.
        Ok(status.code().unwrap_or(-1))
    }

    fn output(&self, inv: &Invocation) -> Result<CommandOutput> {
        let out = Self::command(inv)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Self::spawn_error(inv, e))?;
        Ok(CommandOutput {
            code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Recording runner (test double)
// ---------------------------------------------------------------------------

/// Records every invocation instead of executing it. Responses are scripted
/// by command-line prefix; unscripted commands succeed with empty output.
/// Available to other crates' tests through the `testing` feature.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: std::cell::RefCell<Vec<Invocation>>,
    responses: std::cell::RefCell<Vec<(String, CommandOutput)>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result for any command line starting with `prefix`.
    /// Later entries take precedence over earlier ones.
    pub fn respond(&self, prefix: &str, code: i32, stdout: &str) {
        self.responses.borrow_mut().push((
            prefix.to_string(),
            CommandOutput {
                code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Recorded command lines, as they would appear in the debug log.
    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    fn lookup(&self, inv: &Invocation) -> CommandOutput {
        self.calls.borrow_mut().push(inv.clone());
        let line = inv.to_string();
        self.responses
            .borrow()
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "testing"))]
impl ShellRunner for RecordingRunner {
    fn status(&self, inv: &Invocation) -> Result<i32> {
        Ok(self.lookup(inv).code)
    }

    fn output(&self, inv: &Invocation) -> Result<CommandOutput> {
        Ok(self.lookup(inv))
    }
}
