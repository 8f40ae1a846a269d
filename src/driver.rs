//! Batch generation and compilation over every definition of a library.
//!
//! Each definition is handled in isolation: a transient instance is inserted
//! into the document, turned into a one-node graph, generated, written and
//! compiled, then removed again. Failures are recorded and the batch moves on.

use std::{
    collections::HashSet,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
    batch_log::{BatchLog, LOG_FILE_NAME},
    codegen::{self, CodegenOptions, GeneratedUnit},
    graph::{GraphOptions, ShadingGraph},
    library::{LibraryDocument, OSL_TARGET, TransientInstance},
    naming,
    oslc::ShaderCompiler,
};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub output_path: PathBuf,
    pub target: String,
    /// Prepended to every instance name as `<prefix>_`.
    pub prefix: Option<String>,
    /// Include paths handed to the compiler ahead of the unit's own paths.
    pub include_paths: Vec<PathBuf>,
    pub codegen: CodegenOptions,
    pub graph: GraphOptions,
}

impl DriverConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            target: OSL_TARGET.to_string(),
            prefix: None,
            include_paths: Vec::new(),
            codegen: CodegenOptions::default(),
            graph: GraphOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Generation,
    CompilerDiagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: String,
    pub kind: FailureKind,
    pub message: String,
    pub diagnostics: Vec<String>,
}

impl NodeFailure {
    fn generation(node: &str, message: impl Into<String>) -> Self {
        Self {
            node: node.to_string(),
            kind: FailureKind::Generation,
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Compiled { object: PathBuf },
    /// No implementation for the active target.
    Skipped,
    Failed(NodeFailure),
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub compiled: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<NodeFailure>,
}

impl BatchReport {
    /// True if any definition failed to generate or compile. Skips don't count.
    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.compiled.len() + self.skipped.len() + self.failures.len()
    }
}

pub struct LibraryCodegenDriver<'a, C: ShaderCompiler + ?Sized> {
    config: &'a DriverConfig,
    compiler: &'a C,
}

impl<'a, C: ShaderCompiler + ?Sized> LibraryCodegenDriver<'a, C> {
    pub fn new(config: &'a DriverConfig, compiler: &'a C) -> Self {
        Self { config, compiler }
    }

    /// Run the batch with the log file in the output directory.
    pub fn run_to_file(&self, doc: &mut LibraryDocument) -> Result<BatchReport> {
        let log_path = self.config.output_path.join(LOG_FILE_NAME);
        let mut log = BatchLog::create(&log_path)
            .with_context(|| format!("failed to create log file {}", log_path.display()))?;
        let report = self
            .run(doc, &mut log)
            .with_context(|| format!("failed to write log file {}", log_path.display()))?;
        log.close()
            .with_context(|| format!("failed to flush log file {}", log_path.display()))?;
        Ok(report)
    }

    /// Process every definition in stored order. Only log I/O errors abort.
    pub fn run<W: Write>(
        &self,
        doc: &mut LibraryDocument,
        log: &mut BatchLog<W>,
    ) -> io::Result<BatchReport> {
        let mut report = BatchReport::default();
        let prefix = self.config.prefix.as_deref();
        let mut used_names: HashSet<String> = HashSet::new();

        for nodedef in doc.nodedef_names() {
            let instance = naming::instance_name(&nodedef, prefix);

            // A repeated name would overwrite the earlier unit's files.
            let outcome = if used_names.insert(instance.clone()) {
                self.process_definition(doc, &nodedef, &instance)
            } else {
                NodeOutcome::Failed(NodeFailure::generation(
                    &instance,
                    format!("instance name {instance} of {nodedef} is already used by another definition"),
                ))
            };

            match outcome {
                NodeOutcome::Compiled { object } => {
                    log::info!("[batch] {instance}: {}", object.display());
                    report.compiled.push(instance);
                }
                NodeOutcome::Skipped => {
                    log::info!(
                        "[batch] {instance}: no implementation for target {}, skipping",
                        self.config.target
                    );
                    log.skipped(&instance, &self.config.target)?;
                    report.skipped.push(instance);
                }
                NodeOutcome::Failed(failure) => {
                    log::warn!("[batch] {instance}: {}", failure.message);
                    log.failure(&failure)?;
                    report.failures.push(failure);
                }
            }
        }

        log::info!(
            "[batch] {} compiled, {} skipped, {} failed",
            report.compiled.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    pub fn process_definition(
        &self,
        doc: &mut LibraryDocument,
        nodedef: &str,
        instance: &str,
    ) -> NodeOutcome {
        if doc
            .resolve_implementation(nodedef, &self.config.target)
            .is_none()
        {
            return NodeOutcome::Skipped;
        }

        match self.generate_and_compile(doc, nodedef, instance) {
            Ok(object) => NodeOutcome::Compiled { object },
            Err(failure) => NodeOutcome::Failed(failure),
        }
    }

    /// Generate the unit for a fresh instance of `nodedef`.
    ///
    /// The instance is removed from `doc` before this returns.
    pub fn generate_unit(
        &self,
        doc: &mut LibraryDocument,
        nodedef: &str,
        instance: &str,
    ) -> Result<GeneratedUnit, NodeFailure> {
        let inst = TransientInstance::insert(doc, nodedef, instance)
            .map_err(|e| NodeFailure::generation(instance, format!("{e:#}")))?;
        let graph = ShadingGraph::from_instance(&inst, inst.name(), &self.config.graph)
            .map_err(|e| NodeFailure::generation(instance, format!("{e:#}")))?;
        codegen::generate(&graph, &*inst, &self.config.target, &self.config.codegen)
            .map_err(|e| NodeFailure::generation(instance, e.to_string()))
    }

    fn generate_and_compile(
        &self,
        doc: &mut LibraryDocument,
        nodedef: &str,
        instance: &str,
    ) -> Result<PathBuf, NodeFailure> {
        let unit = self
            .generate_unit(doc, nodedef, instance)
            .inspect_err(|_| remove_outputs(&self.config.output_path, instance))?;

        let source = naming::source_path(&self.config.output_path, instance);
        if let Err(e) = std::fs::write(&source, &unit.source) {
            remove_outputs(&self.config.output_path, instance);
            return Err(NodeFailure::generation(
                instance,
                format!("failed to write {}: {e}", source.display()),
            ));
        }

        let search_path = self.search_path_for(&unit);
        self.compiler.compile(&source, &search_path).map_err(|e| {
            remove_outputs(&self.config.output_path, instance);
            NodeFailure {
                node: instance.to_string(),
                kind: FailureKind::CompilerDiagnostic,
                message: e.to_string(),
                diagnostics: e.diagnostics().to_vec(),
            }
        })
    }

    /// Configured include paths followed by the unit's object paths.
    pub fn search_path_for(&self, unit: &GeneratedUnit) -> String {
        self.config
            .include_paths
            .iter()
            .map(|p| p.display().to_string())
            .chain(
                unit.search_path
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn remove_outputs(output_dir: &Path, instance: &str) {
    for path in [
        naming::source_path(output_dir, instance),
        naming::object_path(output_dir, instance),
    ] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("[batch] failed to remove {}: {e}", path.display());
            }
        }
    }
}
