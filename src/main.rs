use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use hotwire::cli::commands;
use hotwire::cli::{Cli, Commands, OutputArgs};
use hotwire::{Settings, logging};

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.map_err(|e| anyhow::anyhow!("failed to load settings: {e}"))
}

fn workspace_root(cli: &Cli, settings: &Settings) -> PathBuf {
    cli.workspace
        .clone()
        .unwrap_or_else(|| settings.resolved_root())
}

fn apply_output(settings: &mut Settings, output: &OutputArgs) {
    if let Some(dir) = &output.out_dir {
        settings.build.output_dir = Some(dir.clone());
    }
    logging::init_for_cli(&settings.logging, output.quiet, output.verbose);
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut settings = load_settings(&cli)?;
    let root = workspace_root(&cli, &settings);

    match &cli.command {
        Commands::Init { force } => {
            commands::init::run_init(&root, *force)?;
            Ok(true)
        }
        Commands::Config => {
            commands::init::run_config(&settings)?;
            Ok(true)
        }
        Commands::Manifest => {
            logging::init_with_config(&settings.logging);
            commands::manifest::run(&root, &settings)?;
            Ok(true)
        }
        Commands::Build {
            output,
            force,
            target,
            threads,
        } => {
            if let Some(threads) = threads {
                settings.build.parallel_threads = *threads;
            }
            apply_output(&mut settings, output);
            commands::build::run(&root, &settings, *force, target.as_deref(), output.quiet)
        }
        Commands::Watch { output, debounce } => {
            if let Some(ms) = debounce {
                settings.watch.debounce_ms = *ms;
            }
            apply_output(&mut settings, output);
            commands::watch::run(&root, &settings, output.quiet).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(hint) = e
                .downcast_ref::<hotwire::HotwireError>()
                .and_then(|e| e.recovery_suggestion())
            {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}
