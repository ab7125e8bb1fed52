//! Watch command: initial build, then rebuild and propagate on change.

use std::path::Path;

use console::style;

use crate::config::Settings;
use crate::registry::ChangeCause;
use crate::session::LiveSession;
use crate::watcher::WatchManager;

/// Runs until Ctrl+C.
pub async fn run(root: &Path, settings: &Settings, quiet: bool) -> anyhow::Result<bool> {
    let mut session = LiveSession::open(root, settings)?;

    if !quiet {
        session.registry_mut().on_change(|notice| {
            let tag = match &notice.cause {
                ChangeCause::Direct => style("changed").green().to_string(),
                ChangeCause::Dependency { path, .. } => format!(
                    "{} via {}",
                    style("invalidated").yellow(),
                    path.iter()
                        .map(|id| id.name().to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ")
                ),
            };
            println!("  {} {tag}", notice.declaration_id);
        });
    }

    let startup = session.start()?;
    super::build::print_result(&startup.build, quiet);
    if !startup.delta_log.is_empty() && !quiet {
        for (module, events) in startup.delta_log.iter() {
            for event in events {
                println!("  {} {event}", style(module).dim());
            }
        }
    }

    let mut manager = WatchManager::new(root, settings);
    manager.expect_manifest(session.manifest());
    let roots = WatchManager::module_roots(session.manifest());
    let rx = manager.start(&roots)?;
    for root in manager.unwatched_roots() {
        eprintln!(
            "{} not watching {} (changes there need a manual build)",
            style("warning:").yellow().bold(),
            root.display()
        );
    }
    if !quiet {
        println!(
            "{} {} roots, press Ctrl+C to stop",
            style("Watching").cyan().bold(),
            roots.len() - manager.unwatched_roots().len()
        );
    }

    let session_task = tokio::spawn(session.run(rx));
    tokio::signal::ctrl_c().await?;
    manager.stop();
    session_task.await?;
    Ok(true)
}
