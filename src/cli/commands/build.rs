//! Build command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use console::style;

use crate::compiler::{BuildResult, CompileError, IncrementalCompiler};
use crate::config::Settings;
use crate::manifest::{Manifest, ManifestOptions};
use crate::pipeline::Pipeline;

/// Run one incremental build. Returns `true` when no file failed.
pub fn run(
    root: &Path,
    settings: &Settings,
    force: bool,
    target: Option<&str>,
    quiet: bool,
) -> anyhow::Result<bool> {
    let manifest = Manifest::load_with(root, &ManifestOptions::from(settings))
        .with_context(|| format!("loading workspace at {}", root.display()))?;
    let pipeline = Pipeline::with_defaults(&settings.build).context("invalid logger pattern")?;
    let mut compiler = IncrementalCompiler::new(root, settings, Arc::new(pipeline))?;
    compiler.set_force(force);

    let result = match target {
        Some(module) => compiler.build_target(&manifest, module)?,
        None => compiler.build(&manifest),
    };

    print_result(&result, quiet);
    Ok(result.errors.is_empty())
}

pub(crate) fn print_result(result: &BuildResult, quiet: bool) {
    for error in &result.errors {
        print_error(error);
    }
    if quiet {
        return;
    }
    let summary = result.summary();
    if result.is_success() {
        println!("{} {summary}", style("Built").green().bold());
    } else {
        println!("{} {summary}", style("Failed").red().bold());
    }
}

fn print_error(error: &CompileError) {
    match (error.file(), error.hook()) {
        (Some(file), Some(hook)) => {
            let cause = match error {
                CompileError::Transform(e) => e.cause.to_string(),
                other => other.to_string(),
            };
            eprintln!(
                "{} {} [{}] {cause}",
                style("error:").red().bold(),
                file.display(),
                style(hook).yellow()
            );
        }
        _ => eprintln!("{} {error}", style("error:").red().bold()),
    }
}
