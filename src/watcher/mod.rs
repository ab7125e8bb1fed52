//! File presence tracking and the watch manager.
//!
//! ```text
//! notify::RecommendedWatcher (recursive per source root)
//!         |
//!     WatchLoop ── Debouncer (per-path quiet window)
//!         |     └─ PresenceTracker (unseen / seen / removed)
//!         v
//!   mpsc::Receiver<DeltaEvent>
//! ```

mod debouncer;
mod error;
mod manager;
mod presence;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use manager::{WatchLoop, WatchManager};
pub use presence::{PresenceState, PresenceTracker};
