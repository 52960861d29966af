//! shadec entrypoint: validates shader-test directive files and inspects
//! the profile catalog.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use shade_runner::{SectionContent, ShaderTestFile, parse_file};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "shadec", version, about = "Shader test tooling")]
struct Args {
    /// Optional log file; stderr is used otherwise.
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate shader-test directive files.
    Check {
        /// Files to validate.
        files: Vec<PathBuf>,
    },
    /// List the known target profiles.
    Profiles,
}

fn configure_logging(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(target: "runtime", %info, "panic");
        previous(info);
    }));
}

fn summarize(path: &PathBuf, file: &ShaderTestFile) {
    let mut requires = 0usize;
    let mut resources = 0usize;
    let mut tests = 0usize;
    for block in &file.blocks {
        match &block.content {
            SectionContent::Require(_) => requires += 1,
            SectionContent::Resource(_) => resources += 1,
            SectionContent::Test(commands) => tests += commands.len(),
            _ => {}
        }
    }
    println!(
        "{}: {} sections ({} require, {} resource), {} shaders, {} test commands",
        path.display(),
        file.blocks.len(),
        requires,
        resources,
        file.shaders().count(),
        tests
    );
    if let Some(model) = file.min_shader_model() {
        println!("  requires shader model {}.{}", model.major, model.minor);
    }
    for shader in file.shaders() {
        let q = &shader.qualifiers;
        let mut flags = Vec::new();
        if q.todo {
            flags.push("todo");
        }
        if q.fail {
            flags.push("fail");
        }
        if q.notimpl {
            flags.push("notimpl");
        }
        println!(
            "  [{}] {} lines{}{}",
            shader.stage.name(),
            shader.source.lines().count(),
            if flags.is_empty() { "" } else { ": " },
            flags.join(", "),
        );
    }
}

fn check(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0usize;
    for path in files {
        match parse_file(path) {
            Ok(file) => {
                info!(target: "check", path = %path.display(), blocks = file.blocks.len(), "ok");
                summarize(path, &file);
            }
            Err(err) => {
                failed += 1;
                eprintln!("{}: {err}", path.display());
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} file(s) failed validation");
    }
    Ok(())
}

fn list_profiles() {
    for profile in shade_types::all_profiles() {
        let kind = if profile.software { " (software)" } else { "" };
        let level = if profile.level_major != 0 {
            format!(" level {}.{}", profile.level_major, profile.level_minor)
        } else {
            String::new()
        };
        println!(
            "{:20} {} {}.{}{}{}",
            profile.name,
            profile.stage.name(),
            profile.major,
            profile.minor,
            level,
            kind,
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(args.log_file.as_ref())?;
    install_panic_hook();
    info!(target: "runtime", "startup");

    match &args.command {
        Command::Check { files } => check(files),
        Command::Profiles => {
            list_profiles();
            Ok(())
        }
    }
}
