pub mod cli;
pub mod compiler;
pub mod config;
pub mod delta;
pub mod error;
pub mod hash;
pub mod logging;
pub mod manifest;
pub mod metadata;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod watcher;

pub use compiler::{BuildResult, FileState, IncrementalCompiler, OutputStore};
pub use config::Settings;
pub use delta::{DeltaEvent, DeltaKind, DeltaLog};
pub use error::{HotwireError, HotwireResult};
pub use hash::{ContentHash, Fingerprint, hash_declaration, hash_text};
pub use manifest::{ConfigurationError, FileKind, Manifest, Module, ModuleFile};
pub use metadata::{DeclarationId, DeclarationMetadata};
pub use pipeline::{HookSet, Pipeline, TransformError, TransformHook};
pub use registry::{
    ChangeCause, ChangeNotice, EntryState, RegistryEntry, RegistryFramework, RegistryListener,
};
pub use session::LiveSession;
pub use watcher::{WatchError, WatchManager};
