use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use compio::io::compat::AsyncStream;
use compio::process::{ChildStderr, ChildStdout, Command};
use compio::runtime::spawn;
use futures::{AsyncBufReadExt, StreamExt, io::BufReader};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

/// An external tool invocation (`unzip`, `zip`) whose output is forwarded to the log.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    stdin_file: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdin_file: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Feeds the contents of `path` to the process on stdin.
    pub fn stdin_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Command line as it would be typed, for log and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs to completion, streaming stdout and stderr lines into the log.
    pub async fn run(&self) -> Result<(), CommandError> {
        let mut cmd = self.create_command()?;
        let _ = cmd.stdout(Stdio::piped());
        let _ = cmd.stderr(Stdio::piped());

        debug!("Running '{}'", self.command_line());
        let mut handle = cmd.spawn().context(SpawnSnafu {
            command: self.command_line(),
        })?;

        if let Some(stdout) = handle.stdout.take() {
            Self::spawn_stdout_handler(stdout, self.program.clone());
        }
        if let Some(stderr) = handle.stderr.take() {
            Self::spawn_stderr_handler(stderr, self.program.clone());
        }

        let status = handle.wait().await.context(WaitSnafu {
            command: self.command_line(),
        })?;

        if status.success() {
            info!("'{}' completed successfully", self.program);
            Ok(())
        } else {
            UnsuccessfulExecutionSnafu {
                command: self.command_line(),
                status: status.code().unwrap_or(-1),
            }
            .fail()
        }
    }

    /// Runs to completion and returns stdout as text.
    pub async fn capture(&self) -> Result<String, CommandError> {
        let mut cmd = self.create_command()?;
        let _ = cmd.stdout(Stdio::piped());
        let _ = cmd.stderr(Stdio::piped());

        debug!("Capturing output of '{}'", self.command_line());
        let output = cmd.output().await.context(SpawnSnafu {
            command: self.command_line(),
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            debug!("[{}] {}", self.program, line.trim());
        }

        if !output.status.success() {
            return UnsuccessfulExecutionSnafu {
                command: self.command_line(),
                status: output.status.code().unwrap_or(-1),
            }
            .fail();
        }

        String::from_utf8(output.stdout).context(OutputEncodingSnafu {
            command: self.command_line(),
        })
    }

    fn create_command(&self) -> Result<Command, CommandError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        match &self.stdin_file {
            Some(path) => {
                let file = File::open(path).context(StdinSnafu { path: path.clone() })?;
                let _ = cmd.stdin(file);
            }
            None => {
                let _ = cmd.stdin(Stdio::null());
            }
        }
        Ok(cmd)
    }

    fn spawn_stdout_handler(stdout: ChildStdout, program: String) {
        let stream = AsyncStream::new(stdout);
        spawn(async move {
            let mut lines = BufReader::new(stream).lines();

            while let Some(line_result) = lines.next().await {
                match line_result {
                    Ok(line) if !line.trim().is_empty() => debug!("[{}] {}", program, line.trim()),
                    Ok(_) => {}
                    Err(e) => debug!("Error reading stdout of '{}': {}", program, e),
                }
            }
        })
        .detach();
    }

    fn spawn_stderr_handler(stderr: ChildStderr, program: String) {
        let stream = AsyncStream::new(stderr);
        spawn(async move {
            let mut lines = BufReader::new(stream).lines();

            while let Some(line_result) = lines.next().await {
                match line_result {
                    Ok(line) if !line.trim().is_empty() => info!("[{}] {}", program, line.trim()),
                    Ok(_) => {}
                    Err(e) => debug!("Error reading stderr of '{}': {}", program, e),
                }
            }
        })
        .detach();
    }
}

#[derive(Debug, Snafu)]
pub enum CommandError {
    #[snafu(display("Failed to open {} as process input", path.display()))]
    StdinError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to spawn '{}'", command))]
    SpawnError {
        command: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to wait for '{}'", command))]
    WaitError {
        command: String,
        source: std::io::Error,
    },
    #[snafu(display("'{}' failed with exit code {}", command, status))]
    UnsuccessfulExecution { command: String, status: i32 },
    #[snafu(display("'{}' produced output that is not valid UTF-8", command))]
    OutputEncodingError {
        command: String,
        source: std::string::FromUtf8Error,
    },
}
