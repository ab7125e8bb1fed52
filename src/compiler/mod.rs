//! Incremental compiler.
//!
//! Walks the manifest in dependency order, decides per file whether its
//! output is stale, runs the transformation pipeline for stale sources and
//! writes outputs atomically. Modules in the same dependency level compile
//! in parallel on a bounded worker pool; files within one module compile
//! sequentially so a module's output tree only ever has one writer.

mod error;
mod output;
mod records;
mod result;

pub use error::CompileError;
pub use output::{OutputStore, SIDECAR_SUFFIX, sidecar_path};
pub use records::{BuildRecords, FailureRecord, FileRecord, RECORDS_FILE, RecordState, record_key};
pub use result::{BuildResult, FileState};

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::delta::{DeltaEvent, DeltaKind};
use crate::hash::{ContentHash, Fingerprint};
use crate::manifest::{FileKind, Manifest, Module};
use crate::metadata::MetadataSidecar;
use crate::pipeline::{Pipeline, SourceParser, SourceUnit, TransformError};
use crate::{debug_event, log_event};

/// Work for one file, decided before any worker runs.
#[derive(Debug, Clone)]
enum Plan {
    Compile,
    Skip,
    /// Content unchanged, only the fingerprint moved.
    Touch,
    /// Failed before with the same source; report again without retrying.
    ReportFailure(FailureRecord),
}

#[derive(Debug, Clone)]
struct FileJob {
    key: String,
    kind: FileKind,
    /// Workspace-relative.
    source: PathBuf,
    /// Workspace-relative.
    output: PathBuf,
    fingerprint: Fingerprint,
    previous_output: Option<ContentHash>,
    plan: Plan,
}

#[derive(Debug)]
struct ModuleJob {
    module_id: String,
    files: Vec<FileJob>,
}

#[derive(Debug)]
enum Outcome {
    Compiled {
        source_hash: ContentHash,
        output_hash: ContentHash,
        written: bool,
    },
    Failed {
        source_hash: ContentHash,
        error: CompileError,
    },
    Planned,
    Cancelled,
}

struct FileOutcome {
    job: FileJob,
    outcome: Outcome,
}

pub struct IncrementalCompiler {
    root: PathBuf,
    pipeline: Arc<Pipeline>,
    pool: rayon::ThreadPool,
    records: Option<BuildRecords>,
    states: BTreeMap<String, FileState>,
    force: bool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for IncrementalCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalCompiler")
            .field("root", &self.root)
            .field("hooks", self.pipeline.hooks())
            .field("workers", &self.pool.current_num_threads())
            .field("force", &self.force)
            .finish()
    }
}

impl IncrementalCompiler {
    pub fn new(
        root: impl Into<PathBuf>,
        settings: &Settings,
        pipeline: Arc<Pipeline>,
    ) -> Result<Self, CompileError> {
        let threads = settings.build.parallel_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hotwire-compile-{i}"))
            .build()
            .map_err(|e| CompileError::WorkerPool {
                reason: e.to_string(),
            })?;

        Ok(Self {
            root: root.into(),
            pipeline,
            pool,
            records: None,
            states: BTreeMap::new(),
            force: false,
            cancel: CancellationToken::new(),
        })
    }

    /// Recompile every emitted file regardless of records.
    pub fn set_force(&mut self, force: bool) {
        self.force = force;
    }

    /// Token checked between files. Cancelling stops the running build; the
    /// next build gets a fresh token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// State of a file by module id and source-root-relative path.
    pub fn file_state(&self, module_id: &str, path: &Path) -> FileState {
        let key = record_key(module_id, path);
        if let Some(state) = self.states.get(&key) {
            return *state;
        }
        match self.records.as_ref().and_then(|r| r.get(&key)) {
            Some(r) if r.state == RecordState::Compiled => FileState::Compiled,
            Some(_) => FileState::Failed,
            None => FileState::Unknown,
        }
    }

    /// Current record for a file, if any.
    pub fn record(&self, module_id: &str, path: &Path) -> Option<&FileRecord> {
        self.records.as_ref()?.get(&record_key(module_id, path))
    }

    /// Build every module.
    pub fn build(&mut self, manifest: &Manifest) -> BuildResult {
        self.run(manifest, None)
    }

    /// Build one module and its transitive dependencies.
    pub fn build_target(
        &mut self,
        manifest: &Manifest,
        module_id: &str,
    ) -> Result<BuildResult, CompileError> {
        let closure = manifest
            .dependency_closure(module_id)
            .ok_or_else(|| CompileError::UnknownModule {
                id: module_id.to_string(),
            })?;
        Ok(self.run(manifest, Some(&closure)))
    }

    fn run(&mut self, manifest: &Manifest, selected: Option<&BTreeSet<String>>) -> BuildResult {
        let start = Instant::now();
        let records_path = BuildRecords::path(&self.root, &manifest.build_location);
        let mut records = match self.records.take() {
            Some(records) => records,
            None => BuildRecords::load(&records_path).unwrap_or_default(),
        };

        let mut result = BuildResult::default();
        let mut compiled_modules: BTreeSet<String> = BTreeSet::new();

        for level in manifest.build_levels() {
            let modules: Vec<&Module> = level
                .iter()
                .filter(|id| selected.is_none_or(|s| s.contains(*id)))
                .filter_map(|id| manifest.module(id))
                .collect();
            if modules.is_empty() {
                continue;
            }

            let jobs: Vec<ModuleJob> = modules
                .iter()
                .map(|m| self.plan(m, &records, &compiled_modules))
                .collect();
            for job in &jobs {
                for file in job.files.iter().filter(|f| matches!(f.plan, Plan::Compile)) {
                    self.states.insert(file.key.clone(), FileState::Compiling);
                }
            }

            let root = self.root.as_path();
            let pipeline = self.pipeline.as_ref();
            let cancel = &self.cancel;
            let outcomes: Vec<(String, Vec<FileOutcome>)> = self.pool.install(|| {
                jobs.into_par_iter()
                    .map(|job| {
                        let id = job.module_id.clone();
                        (id, run_module(root, pipeline, cancel, job))
                    })
                    .collect()
            });

            for (module_id, files) in outcomes {
                for file in files {
                    if self.merge(&module_id, file, &mut records, &mut result) {
                        compiled_modules.insert(module_id.clone());
                    }
                }
            }

            if self.cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
        }

        if !result.cancelled {
            self.prune(manifest, selected, &mut records, &mut result);
        }

        if let Err(e) = records.save(&records_path) {
            result.errors.push(CompileError::io(records_path, e));
        }
        self.records = Some(records);

        if result.is_success() && selected.is_none() {
            if let Err(e) = manifest.save() {
                let path = Manifest::persisted_path(&self.root, &manifest.build_location);
                result.errors.push(CompileError::io(path, e));
            }
        }

        if result.cancelled {
            self.cancel = CancellationToken::new();
        }

        result.elapsed = start.elapsed();
        log_event!("compiler", "build finished", "{}", result.summary());
        result
    }

    fn plan(
        &self,
        module: &Module,
        records: &BuildRecords,
        compiled_modules: &BTreeSet<String>,
    ) -> ModuleJob {
        let dependency_compiled = module
            .dependencies
            .iter()
            .any(|d| compiled_modules.contains(d));

        let files = module
            .files
            .iter()
            .filter(|f| f.kind.is_emitted())
            .map(|f| {
                let key = record_key(&module.id, &f.path);
                let source = module.workspace_path(&f.path);
                let output = module.output_path(&f.path);
                let record = records.get(&key);

                let plan = match record {
                    _ if self.force => Plan::Compile,
                    None => Plan::Compile,
                    Some(r) if r.state == RecordState::Failed => {
                        if r.source_hash != f.content_hash || dependency_compiled {
                            Plan::Compile
                        } else {
                            Plan::ReportFailure(r.failure.clone().unwrap_or(FailureRecord {
                                hook: "unknown".to_string(),
                                message: "previous build failed".to_string(),
                            }))
                        }
                    }
                    Some(_) if !self.root.join(&output).is_file() => Plan::Compile,
                    Some(r) if r.fingerprint == f.fingerprint => Plan::Skip,
                    Some(r) if r.source_hash == f.content_hash => Plan::Touch,
                    Some(_) => Plan::Compile,
                };

                FileJob {
                    key,
                    kind: f.kind,
                    source,
                    output,
                    fingerprint: f.fingerprint,
                    previous_output: record.and_then(|r| r.output_hash),
                    plan,
                }
            })
            .collect();

        ModuleJob {
            module_id: module.id.clone(),
            files,
        }
    }

    /// Fold one outcome into records and the result. Returns `true` if the
    /// file was compiled.
    fn merge(
        &mut self,
        module_id: &str,
        file: FileOutcome,
        records: &mut BuildRecords,
        result: &mut BuildResult,
    ) -> bool {
        let FileOutcome { job, outcome } = file;

        match outcome {
            Outcome::Compiled {
                source_hash,
                output_hash,
                written,
            } => {
                let kind = if job.previous_output.is_some() {
                    DeltaKind::Changed
                } else {
                    DeltaKind::Added
                };
                if written {
                    result.deltas.push(DeltaEvent::new(job.source.clone(), kind));
                }
                records.insert(
                    job.key.clone(),
                    FileRecord {
                        module: module_id.to_string(),
                        source: job.source.clone(),
                        output: job.output.clone(),
                        source_hash,
                        fingerprint: job.fingerprint,
                        output_hash: Some(output_hash),
                        state: RecordState::Compiled,
                        failure: None,
                    },
                );
                self.states.insert(job.key, FileState::Compiled);
                result.compiled_files.push(job.source);
                true
            }
            Outcome::Failed { source_hash, error } => {
                tracing::error!("[compiler] {error}");
                let failure = FailureRecord {
                    hook: error.hook().unwrap_or("io").to_string(),
                    message: match &error {
                        CompileError::Transform(e) => e.cause.to_string(),
                        other => other.to_string(),
                    },
                };
                records.insert(
                    job.key.clone(),
                    FileRecord {
                        module: module_id.to_string(),
                        source: job.source.clone(),
                        output: job.output.clone(),
                        source_hash,
                        fingerprint: job.fingerprint,
                        output_hash: None,
                        state: RecordState::Failed,
                        failure: Some(failure),
                    },
                );
                self.states.insert(job.key, FileState::Failed);
                result.errors.push(error);
                false
            }
            Outcome::Planned => {
                match job.plan {
                    Plan::Touch => {
                        if let Some(record) = records.get_mut(&job.key) {
                            record.fingerprint = job.fingerprint;
                        }
                        self.states.insert(job.key, FileState::Compiled);
                        result.skipped_files.push(job.source);
                    }
                    Plan::ReportFailure(failure) => {
                        debug_event!("compiler", "not retrying", "{}", job.source.display());
                        self.states.insert(job.key, FileState::Failed);
                        result.errors.push(CompileError::Transform(TransformError::new(
                            job.source,
                            failure.hook,
                            failure.message,
                        )));
                    }
                    Plan::Skip | Plan::Compile => {
                        self.states.insert(job.key, FileState::Compiled);
                        result.skipped_files.push(job.source);
                    }
                }
                false
            }
            Outcome::Cancelled => {
                self.states.insert(job.key, FileState::Stale);
                result.cancelled = true;
                false
            }
        }
    }

    /// Delete outputs whose source left the manifest.
    fn prune(
        &mut self,
        manifest: &Manifest,
        selected: Option<&BTreeSet<String>>,
        records: &mut BuildRecords,
        result: &mut BuildResult,
    ) {
        let live: BTreeSet<String> = manifest
            .modules
            .values()
            .flat_map(|m| {
                m.files
                    .iter()
                    .filter(|f| f.kind.is_emitted())
                    .map(move |f| record_key(&m.id, &f.path))
            })
            .collect();

        let stale: Vec<String> = records
            .iter()
            .filter(|(key, record)| {
                !live.contains(*key) && selected.is_none_or(|s| s.contains(&record.module))
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in stale {
            let Some(record) = records.remove(&key) else {
                continue;
            };
            match output::remove_output(&self.root.join(&record.output)) {
                Ok(()) => {
                    debug_event!("compiler", "pruned", "{}", record.output.display());
                    self.states.remove(&key);
                    result.deltas.push(DeltaEvent::removed(record.source.clone()));
                    result.removed_files.push(record.source);
                }
                Err(e) => {
                    result.errors.push(e);
                    records.insert(key, record);
                }
            }
        }
    }
}

/// Compile one module's planned files in order. Runs on a pool worker.
fn run_module(
    root: &Path,
    pipeline: &Pipeline,
    cancel: &CancellationToken,
    job: ModuleJob,
) -> Vec<FileOutcome> {
    let mut parser: Option<SourceParser> = None;
    let mut outcomes = Vec::with_capacity(job.files.len());

    for file in job.files {
        if !matches!(file.plan, Plan::Compile) {
            outcomes.push(FileOutcome {
                job: file,
                outcome: Outcome::Planned,
            });
            continue;
        }
        if cancel.is_cancelled() {
            outcomes.push(FileOutcome {
                job: file,
                outcome: Outcome::Cancelled,
            });
            continue;
        }

        let outcome = compile_file(root, pipeline, &mut parser, &job.module_id, &file);
        outcomes.push(FileOutcome { job: file, outcome });
    }

    outcomes
}

fn compile_file(
    root: &Path,
    pipeline: &Pipeline,
    parser: &mut Option<SourceParser>,
    module_id: &str,
    file: &FileJob,
) -> Outcome {
    let source_abs = root.join(&file.source);
    let bytes = match std::fs::read(&source_abs) {
        Ok(b) => b,
        Err(e) => {
            return Outcome::Failed {
                source_hash: ContentHash::from_bytes(&[]),
                error: CompileError::io(file.source.clone(), e),
            };
        }
    };
    let source_hash = ContentHash::from_bytes(&bytes);

    match emit_file(root, pipeline, parser, module_id, file, bytes) {
        Ok((output_hash, written)) => {
            debug_event!("compiler", "compiled", "{}", file.source.display());
            Outcome::Compiled {
                source_hash,
                output_hash,
                written,
            }
        }
        Err(error) => Outcome::Failed { source_hash, error },
    }
}

/// Parsers are created on first use, once per module job.
fn ensure_parser(slot: &mut Option<SourceParser>) -> Result<&mut SourceParser, String> {
    if slot.is_none() {
        *slot = Some(SourceParser::new()?);
    }
    slot.as_mut().ok_or_else(|| "parser unavailable".to_string())
}

/// Produce and write the output (and sidecar) for one file.
/// Returns the combined output hash and whether anything was written.
fn emit_file(
    root: &Path,
    pipeline: &Pipeline,
    parser: &mut Option<SourceParser>,
    module_id: &str,
    file: &FileJob,
    bytes: Vec<u8>,
) -> Result<(ContentHash, bool), CompileError> {
    let (output, sidecar) = if file.kind.is_transformable() {
        let text = String::from_utf8(bytes).map_err(|_| {
            TransformError::new(&file.source, crate::pipeline::PARSER_HOOK, "source is not valid UTF-8")
        })?;
        let parser = ensure_parser(parser).map_err(|reason| {
            TransformError::new(&file.source, crate::pipeline::PARSER_HOOK, reason)
        })?;
        let unit = SourceUnit::new(module_id, file.source.clone(), text);
        let compiled = pipeline.transform(parser, &unit)?;

        let sidecar = MetadataSidecar {
            module: module_id.to_string(),
            origin: file.source.clone(),
            declarations: compiled.declarations,
        };
        let mut json =
            serde_json::to_string_pretty(&sidecar).map_err(|e| CompileError::Serialization {
                what: format!("metadata for {}", file.source.display()),
                reason: e.to_string(),
            })?;
        json.push('\n');
        (compiled.text.into_bytes(), Some(json.into_bytes()))
    } else {
        (bytes, None)
    };

    let mut output_hash = ContentHash::from_bytes(&output);
    if let Some(sidecar) = &sidecar {
        output_hash = output_hash.combine(ContentHash::from_bytes(sidecar));
    }

    let output_abs = root.join(&file.output);
    if file.previous_output == Some(output_hash) && output_abs.is_file() {
        return Ok((output_hash, false));
    }

    // Sidecar first, so a reader that sees the new output also sees its metadata.
    match &sidecar {
        Some(sidecar) => output::write_output(&sidecar_path(&output_abs), sidecar)?,
        None => output::remove_output(&sidecar_path(&output_abs))?,
    }
    output::write_output(&output_abs, &output)?;
    Ok((output_hash, true))
}
