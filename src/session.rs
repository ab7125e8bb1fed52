//! Live session: manifest, compiler and registry driven by one event stream.
//!
//! For every batch of watch events the session refreshes the manifest,
//! runs an incremental build and only then forwards the resulting deltas
//! to the registry, so the registry always reads freshly written sidecars.
//! At startup the registry replays the delta log against the state the
//! previous run left behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::compiler::{BuildResult, IncrementalCompiler, OutputStore};
use crate::config::Settings;
use crate::delta::{DeltaEvent, DeltaKind, DeltaLog};
use crate::error::{HotwireError, HotwireResult};
use crate::manifest::{Manifest, ManifestOptions};
use crate::pipeline::Pipeline;
use crate::registry::{PropagationReport, RegistryFramework, RegistryService};
use crate::{debug_event, log_event};

/// Outcome of one session step.
#[derive(Debug, Default)]
pub struct SessionStep {
    pub build: BuildResult,
    /// Events forwarded to the registry, ordered by path.
    pub forwarded: Vec<DeltaEvent>,
    pub registry: PropagationReport,
}

/// Outcome of opening a session: the first build and what changed since
/// the previous run.
#[derive(Debug)]
pub struct Startup {
    pub build: BuildResult,
    pub delta_log: DeltaLog,
    pub registry: PropagationReport,
}

pub struct LiveSession {
    root: PathBuf,
    options: ManifestOptions,
    manifest: Manifest,
    compiler: IncrementalCompiler,
    store: OutputStore,
    registry: RegistryService,
    channel_size: usize,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("root", &self.root)
            .field("modules", &self.manifest.modules.len())
            .field("registry", self.registry.framework())
            .finish()
    }
}

impl LiveSession {
    /// Load the workspace at `root` and set up the compiler and registry.
    /// Nothing is built until [`start`](Self::start).
    pub fn open(root: impl Into<PathBuf>, settings: &Settings) -> HotwireResult<Self> {
        let root = root.into();
        let options = ManifestOptions::from(settings);
        let manifest = Manifest::load_with(&root, &options)?;
        let pipeline = Pipeline::with_defaults(&settings.build)
            .map_err(|e| HotwireError::Settings(format!("invalid logger pattern: {e}")))?;
        let compiler = IncrementalCompiler::new(&root, settings, Arc::new(pipeline))?;
        let store = OutputStore::new(&manifest);
        let registry = RegistryService::new(RegistryFramework::new(store.clone()));

        Ok(Self {
            root,
            options,
            manifest,
            compiler,
            store,
            registry,
            channel_size: settings.watch.event_channel_size.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn compiler(&self) -> &IncrementalCompiler {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut IncrementalCompiler {
        &mut self.compiler
    }

    pub fn registry(&self) -> &RegistryFramework {
        self.registry.framework()
    }

    pub fn registry_mut(&mut self) -> &mut RegistryFramework {
        self.registry.framework_mut()
    }

    /// Reconcile against the last persisted manifest, build, and bring the
    /// registry up to date.
    ///
    /// After a previous run the registry first installs what that run left
    /// behind and then replays the delta log, so listeners hear about what
    /// changed in between. On a first run every declaration is installed.
    pub fn start(&mut self) -> HotwireResult<Startup> {
        let build_location = self.manifest.build_location.clone();
        let log_path = DeltaLog::path(&self.root, &build_location);
        let persisted = Manifest::load_persisted(&self.root, &build_location);
        let delta_log = match &persisted {
            Some(previous) => DeltaLog::reconcile(previous, &self.manifest),
            None => DeltaLog::new(),
        };
        if delta_log.is_empty() {
            if log_path.exists() {
                std::fs::remove_file(&log_path)?;
            }
        } else {
            log_event!(
                "session",
                "reconciled",
                "{} files changed since last run",
                delta_log.len()
            );
            delta_log.save(&log_path)?;
        }

        if let Some(previous) = &persisted {
            self.registry
                .framework_mut()
                .load_files(all_files(previous))?;
        }

        let build = self.compiler.build(&self.manifest);
        report_build(&build);

        let registry = match persisted {
            Some(_) => {
                let mut report = self.registry.framework_mut().replay(&delta_log)?;
                // Outputs rebuilt for other reasons, e.g. a deleted build tree.
                for event in &build.deltas {
                    report.merge(self.registry.apply(event));
                }
                report
            }
            None => self
                .registry
                .framework_mut()
                .load_files(all_files(&self.manifest))?,
        };
        log_event!(
            "session",
            "ready",
            "{} declarations installed",
            self.registry.framework().len()
        );

        Ok(Startup {
            build,
            delta_log,
            registry,
        })
    }

    /// Handle a batch of watch events as one rebuild.
    pub fn apply(&mut self, events: &[DeltaEvent]) -> HotwireResult<SessionStep> {
        let (build, forwarded) = self.compile(events)?;
        let mut step = SessionStep {
            build,
            ..SessionStep::default()
        };
        for event in forwarded {
            step.registry.merge(self.registry.apply(&event));
            step.forwarded.push(event);
        }
        Ok(step)
    }

    /// Refresh the manifest and build. Returns the events the registry
    /// must see, one per path, ordered by path.
    fn compile(&mut self, events: &[DeltaEvent]) -> HotwireResult<(BuildResult, Vec<DeltaEvent>)> {
        if events.is_empty() {
            return Ok((BuildResult::default(), Vec::new()));
        }
        for event in events {
            debug_event!("session", "event", "{event}");
        }

        let refreshed = Manifest::refresh(&self.root, &self.manifest, &self.options)?;
        let mut forward: BTreeMap<PathBuf, DeltaEvent> = BTreeMap::new();

        // Watcher-only kinds the manifest cannot see.
        for event in events {
            if matches!(event.kind, DeltaKind::Missing | DeltaKind::Dirty) {
                forward.insert(event.path.clone(), event.clone());
            }
        }

        let diff = Manifest::diff(&self.manifest, &refreshed);
        self.manifest = refreshed;
        self.store.update_layout(&self.manifest);

        let build = self.compiler.build(&self.manifest);
        report_build(&build);

        for event in build.deltas.iter().cloned().chain(diff) {
            forward.insert(event.path.clone(), event);
        }
        Ok((build, forward.into_values().collect()))
    }

    /// Process watch events until the channel closes.
    ///
    /// Builds run here; their deltas go to a [`RegistryService`] task, so
    /// the next batch compiles while the registry propagates. Errors are
    /// logged and the session keeps running so the next save can fix them.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DeltaEvent>) -> Self {
        let (registry_tx, registry_rx) = mpsc::channel(self.channel_size);
        // Stand-in while the service task owns the registry.
        let idle = RegistryService::new(RegistryFramework::without_rules(self.store.clone()));
        let service = std::mem::replace(&mut self.registry, idle);
        let registry_task = tokio::spawn(service.run(registry_rx));

        'batches: while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = rx.try_recv() {
                batch.push(next);
            }
            match self.compile(&batch) {
                Ok((_, forwarded)) => {
                    for event in forwarded {
                        if registry_tx.send(event).await.is_err() {
                            tracing::error!("[session] registry task stopped");
                            break 'batches;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("[session] {e}");
                    if let Some(hint) = e.recovery_suggestion() {
                        tracing::info!("[session] {hint}");
                    }
                }
            }
        }

        drop(registry_tx);
        match registry_task.await {
            Ok(framework) => self.registry = RegistryService::new(framework),
            Err(e) => tracing::error!("[session] registry task failed: {e}"),
        }
        debug_event!("session", "event stream closed");
        self
    }
}

fn all_files(manifest: &Manifest) -> Vec<PathBuf> {
    manifest.file_paths().into_values().flatten().collect()
}

fn report_build(result: &BuildResult) {
    for error in &result.errors {
        tracing::error!("[compiler] {error}");
    }
    if result.is_success() {
        log_event!("compiler", "build", "{}", result.summary());
    } else {
        tracing::warn!("[compiler] build finished with errors: {}", result.summary());
    }
}
