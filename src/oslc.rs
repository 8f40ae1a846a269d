//! External OSL compiler invocation.
//!
//! The compiler is an opaque subprocess. Its stdout and stderr are drained by
//! reader threads into a channel so the pipes never fill up, and the child is
//! killed if it runs past the configured timeout.

use std::{
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use thiserror::Error;

use crate::naming::OBJECT_EXTENSION;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to launch OSL compiler {}: {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("OSL compiler failed on {} ({status})", file.display())]
    Rejected {
        file: PathBuf,
        status: ExitStatus,
        diagnostics: Vec<String>,
    },
    #[error("OSL compiler timed out after {}s on {}", timeout.as_secs_f32(), file.display())]
    TimedOut {
        file: PathBuf,
        timeout: Duration,
        diagnostics: Vec<String>,
    },
    #[error("OSL compiler reported success but {} was not written", object.display())]
    MissingObject { object: PathBuf },
    #[error("I/O error while waiting for the OSL compiler: {0}")]
    Io(#[from] io::Error),
}

impl CompileError {
    /// Compiler output captured for the failed run.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            CompileError::Rejected { diagnostics, .. } | CompileError::TimedOut { diagnostics, .. } => {
                diagnostics
            }
            _ => &[],
        }
    }
}

/// Compiles a generated source file into a shader object.
pub trait ShaderCompiler {
    /// `search_path` is a comma-joined list of include directories or files; a
    /// file contributes its parent directory. Returns the object path.
    fn compile(&self, source: &Path, search_path: &str) -> Result<PathBuf, CompileError>;
}

#[derive(Debug, Clone)]
pub struct OslcCompiler {
    executable: PathBuf,
    timeout: Duration,
}

impl OslcCompiler {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

/// Include directories named by a comma-joined search path, deduplicated in
/// first-seen order.
pub fn include_dirs(search_path: &str) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in search_path.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let path = PathBuf::from(entry);
        // Implementation files may not exist yet; anything that is not a
        // directory and looks like a file contributes its parent.
        let names_file = path.is_file() || (!path.is_dir() && path.extension().is_some());
        let dir = if names_file {
            path.parent().map(Path::to_path_buf).unwrap_or(path)
        } else {
            path
        };
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

impl ShaderCompiler for OslcCompiler {
    fn compile(&self, source: &Path, search_path: &str) -> Result<PathBuf, CompileError> {
        let object = source.with_extension(OBJECT_EXTENSION);

        let mut cmd = Command::new(&self.executable);
        cmd.arg("-q");
        for dir in include_dirs(search_path) {
            let dir = std::path::absolute(&dir).unwrap_or(dir);
            let mut flag = std::ffi::OsString::from("-I");
            flag.push(dir.as_os_str());
            cmd.arg(flag);
        }
        // Runs inside the source's directory, so both files are named relative to it.
        match (source.parent().filter(|d| !d.as_os_str().is_empty()), source.file_name(), object.file_name()) {
            (Some(dir), Some(src_name), Some(obj_name)) => {
                cmd.arg("-o").arg(obj_name).arg(src_name).current_dir(dir);
            }
            _ => {
                cmd.arg("-o").arg(&object).arg(source);
            }
        }

        log::debug!("[oslc] {cmd:?}");

        let outcome = run_with_timeout(&mut cmd, self.timeout).map_err(|e| CompileError::Spawn {
            executable: self.executable.clone(),
            source: e,
        })?;

        match outcome.status {
            None => Err(CompileError::TimedOut {
                file: source.to_path_buf(),
                timeout: self.timeout,
                diagnostics: outcome.lines,
            }),
            Some(status) if !status.success() => Err(CompileError::Rejected {
                file: source.to_path_buf(),
                status,
                diagnostics: outcome.lines,
            }),
            Some(_) if !object.exists() => Err(CompileError::MissingObject { object }),
            Some(_) => {
                for line in &outcome.lines {
                    log::debug!("[oslc] {line}");
                }
                Ok(object)
            }
        }
    }
}

#[derive(Debug)]
pub struct ProcessOutcome {
    /// `None` when the process was killed after the timeout.
    pub status: Option<ExitStatus>,
    /// Non-empty stdout and stderr lines.
    pub lines: Vec<String>,
}

fn spawn_line_reader<R>(reader: R, tx: Sender<String>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

/// Run `cmd` to completion, killing it once `timeout` has elapsed.
///
/// Errors only when the process cannot be spawned or polled.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> io::Result<ProcessOutcome> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    let mut readers = Vec::new();
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_line_reader(out, tx.clone()));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_line_reader(err, tx.clone()));
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let mut lines = Vec::new();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => lines.push(line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }
    };

    // A killed child may leave grandchildren holding the pipes; don't wait on them.
    if status.is_some() {
        for reader in readers {
            let _ = reader.join();
        }
    }
    lines.extend(rx.try_iter());
    lines.retain(|l| !l.trim().is_empty());

    Ok(ProcessOutcome { status, lines })
}
