use tokio::sync::mpsc;

use super::{PropagationReport, RegistryFramework};
use crate::delta::DeltaEvent;

/// Drives a registry from a delta channel.
///
/// Events are applied strictly one at a time; propagation for one event
/// finishes before the next is dequeued.
pub struct RegistryService {
    framework: RegistryFramework,
}

impl RegistryService {
    pub fn new(framework: RegistryFramework) -> Self {
        Self { framework }
    }

    pub fn framework(&self) -> &RegistryFramework {
        &self.framework
    }

    pub fn framework_mut(&mut self) -> &mut RegistryFramework {
        &mut self.framework
    }

    /// Apply one event, logging instead of failing.
    pub fn apply(&mut self, event: &DeltaEvent) -> PropagationReport {
        match self.framework.on_delta(event) {
            Ok(report) => {
                for error in &report.errors {
                    tracing::warn!("[registry] {error}");
                }
                report
            }
            Err(e) => {
                tracing::error!("[registry] {event}: {e}");
                PropagationReport::default()
            }
        }
    }

    /// Consume events until the channel closes, then hand the registry back.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DeltaEvent>) -> RegistryFramework {
        while let Some(event) = rx.recv().await {
            self.apply(&event);
        }
        crate::debug_event!("registry", "channel closed");
        self.framework
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DeclarationMetadata;
    use crate::registry::{MetadataSource, RegistryError};
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::Arc;

    struct Counting(Arc<Mutex<Vec<String>>>);

    impl MetadataSource for Counting {
        fn declarations(&self, source: &Path) -> Result<Vec<DeclarationMetadata>, RegistryError> {
            self.0.lock().push(source.display().to_string());
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn events_are_applied_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = RegistryService::new(RegistryFramework::new(Counting(seen.clone())));
        let (tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(service.run(rx));
        for name in ["a.ts", "b.ts", "c.ts"] {
            tx.send(DeltaEvent::changed(name)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*seen.lock(), vec!["a.ts", "b.ts", "c.ts"]);
    }
}
