//! CLI argument parsing using clap.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Incremental TypeScript compiler with live declaration registries
#[derive(Parser, Debug)]
#[command(
    name = "hotwire",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incremental TypeScript compiler with live declaration registries",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  hotwire init\n  hotwire build --out-dir dist\n  hotwire build --target core --verbose\n  hotwire watch\n  hotwire manifest > manifest.json"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "HW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace root (defaults to the nearest directory with hotwire.toml)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output and verbosity flags shared by build and watch.
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Write outputs under <DIR>/<module id> instead of each module's output root
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print debug logs
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Create .hotwire/settings.toml with default configuration")]
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Compile stale files once
    #[command(about = "Compile every stale file in the workspace")]
    Build {
        #[command(flatten)]
        output: OutputArgs,

        /// Recompile everything regardless of recorded hashes
        #[arg(short, long)]
        force: bool,

        /// Build only this module and its dependencies
        #[arg(short, long, value_name = "MODULE")]
        target: Option<String>,

        /// Worker threads (overrides config)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Watch sources, rebuild on change and stream delta events
    #[command(about = "Rebuild on change and keep registries live")]
    Watch {
        #[command(flatten)]
        output: OutputArgs,

        /// Debounce window in milliseconds (overrides config)
        #[arg(long, value_name = "MS")]
        debounce: Option<u64>,
    },

    /// Print the live manifest as JSON
    #[command(about = "Scan the workspace and print the manifest as JSON")]
    Manifest,

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_flags_parse() {
        let cli = Cli::parse_from([
            "hotwire", "build", "--out-dir", "dist", "-q", "--target", "core",
        ]);
        match cli.command {
            Commands::Build { output, target, force, .. } => {
                assert_eq!(output.out_dir, Some(PathBuf::from("dist")));
                assert!(output.quiet);
                assert!(!force);
                assert_eq!(target.as_deref(), Some("core"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["hotwire", "watch", "-q", "-v"]).is_err());
    }
}
