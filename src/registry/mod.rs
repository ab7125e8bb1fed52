//! Live metadata registry.
//!
//! Holds one entry per declaration, re-reads metadata when the delta
//! stream says a source file moved, and notifies listeners about the
//! declaration itself and everything depending on it.

pub mod entry;
pub mod error;
pub mod graph;
pub mod handle;
pub mod listener;
pub mod rules;
pub mod service;
pub mod source;

pub use entry::{EntryState, RegistryEntry};
pub use error::{ListenerError, PropagationError, RegistryError};
pub use graph::DeclarationGraph;
pub use handle::DeclarationHandle;
pub use listener::{CallbackListener, ChangeCause, ChangeNotice, ListenerResult, RegistryListener};
pub use rules::{DependencyRule, DependencyTarget, EmbeddedTypes};
pub use service::RegistryService;
pub use source::MetadataSource;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::delta::{DeltaEvent, DeltaKind, DeltaLog};
use crate::metadata::{DeclarationId, DeclarationMetadata};
use crate::{debug_event, log_event};

/// What one delta did to the registry.
#[derive(Debug, Default)]
pub struct PropagationReport {
    pub installed: Vec<DeclarationId>,
    pub changed: Vec<DeclarationId>,
    pub uninstalled: Vec<DeclarationId>,
    /// Dependents notified, with the path that reached them.
    pub propagated: Vec<(DeclarationId, Vec<DeclarationId>)>,
    pub errors: Vec<PropagationError>,
}

impl PropagationReport {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
            && self.changed.is_empty()
            && self.uninstalled.is_empty()
            && self.propagated.is_empty()
    }

    pub fn merge(&mut self, other: PropagationReport) {
        self.installed.extend(other.installed);
        self.changed.extend(other.changed);
        self.uninstalled.extend(other.uninstalled);
        self.propagated.extend(other.propagated);
        self.errors.extend(other.errors);
    }
}

pub struct RegistryFramework {
    source: Box<dyn MetadataSource>,
    entries: BTreeMap<DeclarationId, RegistryEntry>,
    by_file: BTreeMap<PathBuf, BTreeSet<DeclarationId>>,
    graph: DeclarationGraph,
    rules: Vec<Box<dyn DependencyRule>>,
    listeners: Vec<Box<dyn RegistryListener>>,
    handles: HashMap<DeclarationId, DeclarationHandle>,
}

impl std::fmt::Debug for RegistryFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryFramework")
            .field("entries", &self.entries.len())
            .field("files", &self.by_file.len())
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field(
                "listeners",
                &self.listeners.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl RegistryFramework {
    /// A registry reading from `source`, with the embedded-types rule.
    pub fn new(source: impl MetadataSource + 'static) -> Self {
        let mut registry = Self::without_rules(source);
        registry.add_rule(EmbeddedTypes);
        registry
    }

    pub fn without_rules(source: impl MetadataSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            entries: BTreeMap::new(),
            by_file: BTreeMap::new(),
            graph: DeclarationGraph::new(),
            rules: Vec::new(),
            listeners: Vec::new(),
            handles: HashMap::new(),
        }
    }

    pub fn add_rule(&mut self, rule: impl DependencyRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn add_listener(&mut self, listener: impl RegistryListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Register a closure for change notices, both direct and propagated.
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: Fn(&ChangeNotice) + Send + Sync + 'static,
    {
        let name = format!("callback-{}", self.listeners.len());
        self.add_listener(CallbackListener::new(name, callback));
    }

    pub fn get(&self, id: &DeclarationId) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    /// Installed entries, ordered by id.
    pub fn installed(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values().filter(|e| e.is_installed())
    }

    pub fn len(&self) -> usize {
        self.installed().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn declarations_in(&self, file: &Path) -> Vec<&RegistryEntry> {
        self.by_file
            .get(file)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .collect()
    }

    /// Handle for a declaration. It may be taken before the declaration
    /// is installed and stays valid across reinstalls.
    pub fn handle(&mut self, id: &DeclarationId) -> DeclarationHandle {
        let current = self
            .entries
            .get(id)
            .filter(|e| e.is_installed())
            .map(|e| e.metadata.clone());
        self.handles
            .entry(id.clone())
            .or_insert_with(|| {
                let handle = DeclarationHandle::new(id.clone());
                handle.swap(current);
                handle
            })
            .clone()
    }

    /// Load every file's declarations, as on startup.
    pub fn load_files<I, P>(&mut self, files: I) -> Result<PropagationReport, RegistryError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = PropagationReport::default();
        for file in files {
            report.merge(self.refresh_file(file.as_ref())?);
        }
        self.refresh_dependents();
        Ok(report)
    }

    /// Apply one delta. All notifications it causes complete before this
    /// returns.
    pub fn on_delta(&mut self, event: &DeltaEvent) -> Result<PropagationReport, RegistryError> {
        debug_event!("registry", "delta", "{event}");
        let report = match event.kind {
            DeltaKind::Added | DeltaKind::Changed | DeltaKind::Dirty => {
                self.refresh_file(&event.path)?
            }
            DeltaKind::Removed => self.remove_file(&event.path),
            DeltaKind::Missing => {
                tracing::warn!(
                    "[registry] {} is listed in the manifest but absent on disk",
                    event.path.display()
                );
                PropagationReport::default()
            }
        };
        self.refresh_dependents();
        if !report.is_empty() {
            log_event!(
                "registry",
                "applied",
                "{}: {} installed, {} changed, {} uninstalled, {} dependents",
                event.path.display(),
                report.installed.len(),
                report.changed.len(),
                report.uninstalled.len(),
                report.propagated.len()
            );
        }
        Ok(report)
    }

    /// Apply every event of a persisted delta log, module by module.
    pub fn replay(&mut self, log: &DeltaLog) -> Result<PropagationReport, RegistryError> {
        let mut report = PropagationReport::default();
        for (_, events) in log.iter() {
            for event in events {
                report.merge(self.on_delta(event)?);
            }
        }
        Ok(report)
    }

    fn refresh_file(&mut self, file: &Path) -> Result<PropagationReport, RegistryError> {
        let mut report = PropagationReport::default();
        let mut declarations = self.source.declarations(file)?;
        declarations.sort_by(|a, b| a.declaration_id.cmp(&b.declaration_id));

        let current: BTreeSet<DeclarationId> = declarations
            .iter()
            .map(|d| d.declaration_id.clone())
            .collect();
        let previous = self.by_file.remove(file).unwrap_or_default();
        for gone in previous.difference(&current) {
            self.uninstall(gone, &mut report);
        }
        if !current.is_empty() {
            self.by_file.insert(file.to_path_buf(), current);
        }

        for metadata in declarations {
            self.install(Arc::new(metadata), &mut report);
        }
        Ok(report)
    }

    fn remove_file(&mut self, file: &Path) -> PropagationReport {
        let mut report = PropagationReport::default();
        for id in self.by_file.remove(file).unwrap_or_default() {
            self.uninstall(&id, &mut report);
        }
        report
    }

    fn install(&mut self, metadata: Arc<DeclarationMetadata>, report: &mut PropagationReport) {
        let id = metadata.declaration_id.clone();
        let existing = self.entries.get(&id);

        if let Some(entry) = existing {
            if entry.is_installed() && *entry.metadata == *metadata {
                return;
            }
        }

        let (mut entry, previous) = match existing {
            Some(old) => (old.successor(metadata.clone()), Some(old)),
            None => (RegistryEntry::pending(metadata.clone(), 0), None),
        };
        let was_installed = previous.is_some_and(|p| p.is_installed());
        let previous_metadata = previous.map(|p| p.metadata.clone());
        let existed = previous.is_some();

        entry.advance(EntryState::Installed);
        self.entries.insert(id.clone(), entry);

        let targets = self
            .rules
            .iter()
            .flat_map(|rule| rule.dependencies(&metadata))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.graph.set_edges(&id, targets);
        if let Some(handle) = self.handles.get(&id) {
            handle.swap(Some(metadata.clone()));
        }

        if was_installed {
            report.changed.push(id.clone());
            let changed = previous_metadata
                .as_deref()
                .map(|p| metadata.changed_members(p))
                .unwrap_or_default();
            let notice = ChangeNotice {
                declaration_id: id.clone(),
                metadata: metadata.clone(),
                previous: previous_metadata,
                cause: ChangeCause::Direct,
            };
            self.notify_change(&notice, report);
            self.propagate(&id, &metadata.name, Some(&changed), report);
        } else {
            report.installed.push(id.clone());
            for listener in &self.listeners {
                if let Err(cause) = listener.on_install(&id, &metadata) {
                    report.errors.push(failure(listener.as_ref(), &id, cause));
                }
            }
            // A reinstall after removal is news to dependents; first
            // installs are not.
            if existed {
                self.propagate(&id, &metadata.name, None, report);
            }
        }
    }

    fn uninstall(&mut self, id: &DeclarationId, report: &mut PropagationReport) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if !entry.advance(EntryState::Uninstalled) {
            return;
        }
        let name = entry.metadata.name.clone();
        self.graph.remove(id);
        if let Some(handle) = self.handles.get(id) {
            handle.swap(None);
        }
        report.uninstalled.push(id.clone());

        for listener in &self.listeners {
            if let Err(cause) = listener.on_uninstall(id) {
                report.errors.push(failure(listener.as_ref(), id, cause));
            }
        }
        self.propagate(id, &name, None, report);
    }

    fn propagate(
        &self,
        origin: &DeclarationId,
        name: &str,
        changed: Option<&BTreeSet<String>>,
        report: &mut PropagationReport,
    ) {
        let entries = &self.entries;
        let reached = self.graph.propagate(origin, name, changed, |id| {
            entries
                .get(id)
                .filter(|e| e.is_installed())
                .map(|e| e.metadata.name.as_str())
        });

        let members = changed.cloned().unwrap_or_default();
        for hit in reached {
            let Some(entry) = entries.get(&hit.declaration).filter(|e| e.is_installed()) else {
                continue;
            };
            debug_event!(
                "registry",
                "propagate",
                "{} via {}",
                hit.declaration,
                hit.path
                    .iter()
                    .map(DeclarationId::as_str)
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
            let notice = ChangeNotice {
                declaration_id: hit.declaration.clone(),
                metadata: entry.metadata.clone(),
                previous: Some(entry.metadata.clone()),
                cause: ChangeCause::Dependency {
                    path: hit.path.clone(),
                    members: members.clone(),
                },
            };
            self.notify_change(&notice, report);
            report.propagated.push((hit.declaration, hit.path));
        }
    }

    fn notify_change(&self, notice: &ChangeNotice, report: &mut PropagationReport) {
        for listener in &self.listeners {
            if let Err(cause) = listener.on_change(notice) {
                tracing::warn!(
                    "[registry] listener '{}' failed on {}: {cause}",
                    listener.name(),
                    notice.declaration_id
                );
                report
                    .errors
                    .push(failure(listener.as_ref(), &notice.declaration_id, cause));
            }
        }
    }

    fn refresh_dependents(&mut self) {
        let computed: Vec<(DeclarationId, BTreeSet<DeclarationId>)> = self
            .entries
            .values()
            .map(|e| {
                let dependents = if e.is_installed() {
                    self.graph
                        .dependents(&e.declaration_id, &e.metadata.name, None)
                        .into_iter()
                        .filter(|d| self.entries.get(d).is_some_and(|x| x.is_installed()))
                        .collect()
                } else {
                    BTreeSet::new()
                };
                (e.declaration_id.clone(), dependents)
            })
            .collect();
        for (id, dependents) in computed {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.dependents = dependents;
            }
        }
    }
}

fn failure(
    listener: &dyn RegistryListener,
    id: &DeclarationId,
    cause: ListenerError,
) -> PropagationError {
    PropagationError {
        listener: listener.name().to_string(),
        declaration: id.clone(),
        cause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_text;
    use parking_lot::Mutex;

    /// In-memory metadata keyed by source file.
    #[derive(Clone, Default)]
    struct MemorySource {
        files: Arc<Mutex<BTreeMap<PathBuf, Vec<DeclarationMetadata>>>>,
    }

    impl MemorySource {
        fn set(&self, file: &str, declarations: Vec<DeclarationMetadata>) {
            self.files.lock().insert(PathBuf::from(file), declarations);
        }

        fn clear(&self, file: &str) {
            self.files.lock().remove(Path::new(file));
        }
    }

    impl MetadataSource for MemorySource {
        fn declarations(&self, source: &Path) -> Result<Vec<DeclarationMetadata>, RegistryError> {
            Ok(self.files.lock().get(source).cloned().unwrap_or_default())
        }
    }

    fn decl(file: &str, name: &str, methods: &[(&str, &str)], embeds: &[&str]) -> DeclarationMetadata {
        let method_hashes: BTreeMap<String, _> = methods
            .iter()
            .map(|(m, body)| (m.to_string(), hash_text(body)))
            .collect();
        let body: String = methods.iter().map(|(m, b)| format!("{m}{b}")).collect();
        DeclarationMetadata {
            declaration_id: DeclarationId::new("m", Path::new(file), name),
            name: name.to_string(),
            origin_file: PathBuf::from(file),
            class_hash: hash_text(&format!("{name}{body}")),
            method_hashes,
            member_hashes: BTreeMap::new(),
            embeds: embeds.iter().map(|s| s.to_string()).collect(),
            is_abstract: false,
            is_synthetic: false,
        }
    }

    fn recorder(registry: &mut RegistryFramework) -> Arc<Mutex<Vec<ChangeNotice>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.on_change(move |notice| sink.lock().push(notice.clone()));
        seen
    }

    fn id(file: &str, name: &str) -> DeclarationId {
        DeclarationId::new("m", Path::new(file), name)
    }

    #[test]
    fn first_install_notifies_nobody_of_changes() {
        let source = MemorySource::default();
        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("one", "1")], &[])]);
        let mut registry = RegistryFramework::new(source.clone());
        let seen = recorder(&mut registry);

        let report = registry.on_delta(&DeltaEvent::added("m/a.ts")).unwrap();
        assert_eq!(report.installed, vec![id("m/a.ts", "A")]);
        assert!(seen.lock().is_empty());
        let entry = registry.get(&id("m/a.ts", "A")).unwrap();
        assert_eq!(entry.state(), EntryState::Installed);
        assert_eq!(entry.generation, 0);
    }

    #[test]
    fn unchanged_metadata_is_silent() {
        let source = MemorySource::default();
        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("one", "1")], &[])]);
        let mut registry = RegistryFramework::new(source.clone());
        registry.on_delta(&DeltaEvent::added("m/a.ts")).unwrap();
        let seen = recorder(&mut registry);

        let report = registry.on_delta(&DeltaEvent::changed("m/a.ts")).unwrap();
        assert!(report.is_empty());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn change_reaches_embedding_declaration() {
        let source = MemorySource::default();
        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("one", "1")], &[])]);
        source.set("m/b.ts", vec![decl("m/b.ts", "B", &[], &["A"])]);
        let mut registry = RegistryFramework::new(source.clone());
        registry.load_files(["m/a.ts", "m/b.ts"]).unwrap();
        let seen = recorder(&mut registry);

        assert_eq!(
            registry.get(&id("m/a.ts", "A")).unwrap().dependents,
            [id("m/b.ts", "B")].into()
        );

        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("one", "2")], &[])]);
        let report = registry.on_delta(&DeltaEvent::changed("m/a.ts")).unwrap();
        assert_eq!(report.changed, vec![id("m/a.ts", "A")]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_direct());
        assert_eq!(seen[0].declaration_id, id("m/a.ts", "A"));
        assert_eq!(seen[1].declaration_id, id("m/b.ts", "B"));
        assert_eq!(
            seen[1].cause,
            ChangeCause::Dependency {
                path: vec![id("m/a.ts", "A"), id("m/b.ts", "B")],
                members: ["one".to_string()].into(),
            }
        );
        assert_eq!(registry.get(&id("m/a.ts", "A")).unwrap().generation, 1);
    }

    #[test]
    fn member_scoped_rule_filters_unrelated_edits() {
        struct WatchesTwo;
        impl DependencyRule for WatchesTwo {
            fn name(&self) -> &str {
                "watches-two"
            }
            fn dependencies(&self, metadata: &DeclarationMetadata) -> Vec<DependencyTarget> {
                if metadata.name == "C" {
                    vec![DependencyTarget::member("A", "two")]
                } else {
                    Vec::new()
                }
            }
        }

        let source = MemorySource::default();
        source.set(
            "m/a.ts",
            vec![decl("m/a.ts", "A", &[("one", "1"), ("two", "2")], &[])],
        );
        source.set("m/c.ts", vec![decl("m/c.ts", "C", &[], &[])]);
        let mut registry = RegistryFramework::without_rules(source.clone());
        registry.add_rule(WatchesTwo);
        registry.load_files(["m/a.ts", "m/c.ts"]).unwrap();

        source.set(
            "m/a.ts",
            vec![decl("m/a.ts", "A", &[("one", "changed"), ("two", "2")], &[])],
        );
        let report = registry.on_delta(&DeltaEvent::changed("m/a.ts")).unwrap();
        assert!(report.propagated.is_empty());

        source.set(
            "m/a.ts",
            vec![decl("m/a.ts", "A", &[("one", "changed"), ("two", "changed")], &[])],
        );
        let report = registry.on_delta(&DeltaEvent::changed("m/a.ts")).unwrap();
        assert_eq!(report.propagated.len(), 1);
        assert_eq!(report.propagated[0].0, id("m/c.ts", "C"));
    }

    #[test]
    fn removal_uninstalls_and_notifies_dependents() {
        let source = MemorySource::default();
        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[], &[])]);
        source.set("m/b.ts", vec![decl("m/b.ts", "B", &[], &["A"])]);
        let mut registry = RegistryFramework::new(source.clone());
        registry.load_files(["m/a.ts", "m/b.ts"]).unwrap();
        let handle = registry.handle(&id("m/a.ts", "A"));
        assert!(handle.is_live());
        let seen = recorder(&mut registry);

        source.clear("m/a.ts");
        let report = registry.on_delta(&DeltaEvent::removed("m/a.ts")).unwrap();
        assert_eq!(report.uninstalled, vec![id("m/a.ts", "A")]);
        assert_eq!(
            registry.get(&id("m/a.ts", "A")).unwrap().state(),
            EntryState::Uninstalled
        );
        assert!(!handle.is_live());

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].declaration_id, id("m/b.ts", "B"));
        assert_eq!(seen[0].origin(), &id("m/a.ts", "A"));
    }

    #[test]
    fn declaration_dropped_from_file_is_uninstalled() {
        let source = MemorySource::default();
        source.set(
            "m/a.ts",
            vec![decl("m/a.ts", "A", &[], &[]), decl("m/a.ts", "Gone", &[], &[])],
        );
        let mut registry = RegistryFramework::new(source.clone());
        registry.load_files(["m/a.ts"]).unwrap();
        assert_eq!(registry.len(), 2);

        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[], &[])]);
        let report = registry.on_delta(&DeltaEvent::changed("m/a.ts")).unwrap();
        assert_eq!(report.uninstalled, vec![id("m/a.ts", "Gone")]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cycles_notify_each_declaration_once() {
        let source = MemorySource::default();
        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("x", "1")], &["B"])]);
        source.set("m/b.ts", vec![decl("m/b.ts", "B", &[], &["A"])]);
        let mut registry = RegistryFramework::new(source.clone());
        registry.load_files(["m/a.ts", "m/b.ts"]).unwrap();
        let seen = recorder(&mut registry);

        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("x", "2")], &["B"])]);
        registry.on_delta(&DeltaEvent::changed("m/a.ts")).unwrap();

        let ids: Vec<_> = seen.lock().iter().map(|n| n.declaration_id.clone()).collect();
        assert_eq!(ids, vec![id("m/a.ts", "A"), id("m/b.ts", "B")]);
    }

    #[test]
    fn failing_listener_does_not_stop_others() {
        struct Broken;
        impl RegistryListener for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn on_change(&self, _notice: &ChangeNotice) -> ListenerResult {
                Err("boom".into())
            }
        }

        let source = MemorySource::default();
        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("x", "1")], &[])]);
        let mut registry = RegistryFramework::new(source.clone());
        registry.load_files(["m/a.ts"]).unwrap();
        registry.add_listener(Broken);
        let seen = recorder(&mut registry);

        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[("x", "2")], &[])]);
        let report = registry.on_delta(&DeltaEvent::changed("m/a.ts")).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].listener, "broken");
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn missing_files_only_warn() {
        let mut registry = RegistryFramework::new(MemorySource::default());
        let report = registry
            .on_delta(&DeltaEvent::new("m/a.ts", DeltaKind::Missing))
            .unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn replay_applies_logged_events() {
        let source = MemorySource::default();
        source.set("m/a.ts", vec![decl("m/a.ts", "A", &[], &[])]);
        let mut registry = RegistryFramework::new(source.clone());

        let mut log = DeltaLog::new();
        log.record("m", DeltaEvent::added("m/a.ts"));
        let report = registry.replay(&log).unwrap();
        assert_eq!(report.installed.len(), 1);
    }
}
