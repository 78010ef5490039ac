//! # pyr CLI Entry Point
//!
//! Parses arguments with clap and drives one build invocation:
//! clean, load, pre-build, build, post-build, run.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;

use pyruvic::build::{self, BuildError, Project};
use pyruvic::config::ConfigErrors;
use pyruvic::history::BuildMode;
use pyruvic::logging;
use pyruvic::platform::Platform;
use pyruvic::templates;
use pyruvic::ui;

#[cfg(windows)]
#[link(name = "kernel32")]
unsafe extern "system" {
    fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
}

#[cfg(windows)]
fn enable_windows_utf8_console() {
    unsafe {
        SetConsoleOutputCP(65001);
    }
}

#[cfg(not(windows))]
fn enable_windows_utf8_console() {}

#[derive(Parser)]
#[command(name = "pyr")]
#[command(about = "Incremental C/C++ build tool", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Build with optimizations
    #[arg(short, long, global = true)]
    release: bool,

    /// Strip symbols and hide visibility (release builds only)
    #[arg(short, long, global = true)]
    obfuscate: bool,

    /// Remove .pyr/ first, forcing a full rebuild
    #[arg(short, long, global = true)]
    clean: bool,

    /// Show commands and staleness decisions
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Compile the project in the current directory
    Build,
    /// Compile, then run the output binary
    Run,
    /// Run the output binary without compiling
    Orun,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project directory
    New {
        /// Project name
        name: String,
    },
    #[command(flatten)]
    Action(Action),
}

fn main() -> ExitCode {
    enable_windows_utf8_console();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    match execute(&cli) {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<ExitCode> {
    let root = Path::new(".");
    match &cli.command {
        Some(Commands::New { name }) => {
            templates::new_project(Path::new(name))?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Action(action)) => {
            if cli.clean {
                build::clean(root)?;
            }
            let mode = BuildMode {
                release: cli.release,
                obfuscate: cli.obfuscate,
            };
            run_action(root, *action, mode)
        }
        None if cli.clean => {
            build::clean(root)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            Cli::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_action(root: &Path, action: Action, mode: BuildMode) -> Result<ExitCode> {
    let mut project = Project::load(root, mode, &Platform::host())?;
    project.pre_build()?;
    if action != Action::Orun {
        project.build()?;
    }
    project.post_build()?;

    if action == Action::Build {
        return Ok(ExitCode::SUCCESS);
    }
    let code = project.run()?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

fn report(e: &anyhow::Error) {
    if let Some(config) = e.downcast_ref::<ConfigErrors>() {
        for error in &config.errors {
            ui::error(error);
        }
        ui::fatal(config);
    } else if let Some(BuildError::Failed(_)) = e.downcast_ref::<BuildError>() {
        ui::error(e);
    } else {
        ui::fatal(format!("{e:#}"));
    }
}
