// Declare modules
pub mod cli;
pub mod commonjs;
pub mod config;
pub mod error;
pub mod formatter;
pub mod models;
pub mod scanner;

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::fs;
use std::path::Path;

use self::cli::{Cli, Command};
use self::config::resolve_config;
use self::formatter::OutputGenerator;
use self::models::{ConfigurationDescriptor, DescriptorFormat, RuntimeConfig};
use self::scanner::Scanner;

/// Initializes components and orchestrates data flow.
pub fn run() -> Result<()> {
    // 1. Parse Args
    let args = Cli::parse();

    // 2. Identify Project Root
    let root = match &args.global.root {
        Some(root) => root.clone(),
        None => env::current_dir().context("Failed to get current directory")?,
    };

    // 3. Resolve Configuration
    let config = resolve_config(&args.global, root)?;

    // 4. Dispatch
    match args.command {
        None => emit(&config, DescriptorFormat::default(), None),
        Some(Command::Emit { format, out }) => emit(&config, format, out.as_deref()),
        Some(Command::Plan { all }) => plan(&config, all),
        Some(Command::Explain { path }) => explain(&config, &path),
        Some(Command::Check { file, format }) => check(&config, &file, format),
    }
}

fn emit(config: &RuntimeConfig, format: DescriptorFormat, out: Option<&Path>) -> Result<()> {
    let text = config.descriptor.serialize_as(format)?;

    match out {
        Some(path) => {
            fs::write(path, &text).context(format!("Failed to write descriptor to {:?}", path))?;
            log::info!("Wrote {} descriptor to {}", format.name(), path.display());
        }
        None => print!("{}", text),
    }

    Ok(())
}

fn plan(config: &RuntimeConfig, include_unmatched: bool) -> Result<()> {
    if config.descriptor.rules().is_empty() {
        log::warn!("💡 Tip: No transform rules configured; every file is bundled as-is.");
    }

    let scanner = Scanner::new(config.root.clone(), &config.descriptor)?;
    let entries = scanner.scan(include_unmatched);

    if entries.is_empty() {
        log::warn!("⚠️ No files matched any transform rule.");
        return Ok(());
    }

    let transformed = entries.iter().filter(|e| e.rule.is_some()).count();
    let tree_str = OutputGenerator::generate_plan(&entries, &config.descriptor);
    let root_str = config.root.to_string_lossy();

    println!(
        "{}",
        OutputGenerator::format_plan_output(&root_str, &tree_str, transformed)
    );

    Ok(())
}

fn explain(config: &RuntimeConfig, path: &Path) -> Result<()> {
    let scanner = Scanner::new(config.root.clone(), &config.descriptor)?;
    let rule = scanner.rule_for(path);

    println!(
        "{}: {}",
        path.display(),
        OutputGenerator::describe_rule(rule, &config.descriptor)
    );

    Ok(())
}

fn check(config: &RuntimeConfig, file: &Path, format: Option<DescriptorFormat>) -> Result<()> {
    let format = format
        .or_else(|| DescriptorFormat::from_path(file))
        .context(format!("Cannot tell the format of {:?}; pass --format", file))?;

    let text =
        fs::read_to_string(file).context(format!("Failed to read descriptor at {:?}", file))?;
    let existing = ConfigurationDescriptor::parse(&text, format)
        .context(format!("Failed to load {:?}", file))?;

    if existing != config.descriptor {
        log::debug!("On disk: {:?}", existing);
        anyhow::bail!(
            "{} is out of date; regenerate it with `packdesc emit --format {} --out {}`",
            file.display(),
            format.name(),
            file.display()
        );
    }

    log::info!("{} is up to date", file.display());
    Ok(())
}
