//! Per-run diagnostic log written next to the generated files.
//!
//! One block per skipped or failed definition. The sink stays open for the
//! whole batch and is flushed once by [`BatchLog::close`].

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use crate::driver::{FailureKind, NodeFailure};

pub const LOG_FILE_NAME: &str = "genoslnodes_libs_to_oso.txt";

pub const SKIP_HEADER: &str = "No implementation for target, skipping node definition:";
pub const GENERATION_FAILURE_HEADER: &str = "Failed to generate OSL for node:";
pub const COMPILE_FAILURE_HEADER: &str = "Failed to compile generated OSL for node:";

#[derive(Debug)]
pub struct BatchLog<W: Write> {
    out: W,
}

impl BatchLog<BufWriter<File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> BatchLog<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn skipped(&mut self, node: &str, target: &str) -> io::Result<()> {
        writeln!(self.out, "{SKIP_HEADER} {node} (target {target})")
    }

    pub fn failure(&mut self, failure: &NodeFailure) -> io::Result<()> {
        let header = match failure.kind {
            FailureKind::Generation => GENERATION_FAILURE_HEADER,
            FailureKind::CompilerDiagnostic => COMPILE_FAILURE_HEADER,
        };
        writeln!(self.out, "{header} {}", failure.node)?;
        writeln!(self.out, "{}", failure.message)?;
        for line in &failure.diagnostics {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn close(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
