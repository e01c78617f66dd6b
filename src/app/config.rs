use crate::app::cli::GlobalArgs;
use crate::app::models::{ConfigurationDescriptor, RuntimeConfig, TransformRule};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const PROJECT_FILE: &str = "packdesc.toml";

const DEFAULT_ENTRY: &str = "src/index.jsx";
const DEFAULT_OUTPUT_PATH: &str = "public";
const DEFAULT_FILENAME: &str = "bundle.js";

#[derive(Deserialize, Debug)]
struct PresetsFile {
    #[serde(flatten)]
    presets: HashMap<String, SourceConfig>,
}

/// A partial descriptor as written in `packdesc.toml` or a preset table.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub entry: Option<String>,
    pub output: Option<OutputSource>,
    pub rules: Option<Vec<RuleSource>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputSource {
    pub path: Option<String>,
    pub filename: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RuleSource {
    pub test: String,
    pub exclude: Option<String>,
    pub loader: String,
    #[serde(default)]
    pub presets: Vec<String>,
}

impl From<RuleSource> for TransformRule {
    fn from(src: RuleSource) -> Self {
        TransformRule::new(&src.test, src.exclude.as_deref(), &src.loader, src.presets)
    }
}

/// Values given on the command line; they beat every file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub entry: Option<String>,
    pub output_path: Option<String>,
    pub filename: Option<String>,
}

impl From<&GlobalArgs> for Overrides {
    fn from(args: &GlobalArgs) -> Self {
        Self {
            entry: args.entry.clone(),
            output_path: args.output_path.clone(),
            filename: args.filename.clone(),
        }
    }
}

/// The transform rule the tool falls back to when nothing else defines rules.
pub fn default_rules() -> Vec<TransformRule> {
    vec![TransformRule::new(
        r"\.jsx?$",
        Some("(node_modules|bower_components)"),
        "babel-loader",
        ["@babel/preset-env", "@babel/preset-react"],
    )]
}

fn load_presets_file() -> Result<HashMap<String, SourceConfig>> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let config_path = home.join(".config").join("packdesc").join("presets.toml");
    load_presets_from(&config_path)
}

pub fn load_presets_from(config_path: &Path) -> Result<HashMap<String, SourceConfig>> {
    if !config_path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(config_path)
        .context(format!("Failed to read presets at {:?}", config_path))?;

    let parsed: PresetsFile = toml::from_str(&content).context("Failed to parse presets.toml")?;

    Ok(parsed.presets)
}

/// Reads a project file. A missing file is only an error when `required`.
pub fn load_project_file(path: &Path, required: bool) -> Result<Option<SourceConfig>> {
    if !path.exists() {
        if required {
            anyhow::bail!("Config file {:?} does not exist", path);
        }
        log::debug!("No project file at {:?}, using defaults", path);
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).context(format!("Failed to read config at {:?}", path))?;
    let parsed: SourceConfig =
        toml::from_str(&content).context(format!("Failed to parse {:?}", path))?;

    Ok(Some(parsed))
}

fn merge_rules(
    preset_rules: Option<Vec<RuleSource>>,
    project_rules: Option<Vec<RuleSource>>,
) -> Vec<TransformRule> {
    if preset_rules.is_none() && project_rules.is_none() {
        return default_rules();
    }

    let mut combined: Vec<TransformRule> = preset_rules
        .into_iter()
        .chain(project_rules)
        .flatten()
        .map(TransformRule::from)
        .collect();
    // Deduplicate while keeping order
    let mut seen = HashSet::new();
    combined.retain(|rule| seen.insert(rule.clone()));
    combined
}

/// CLI overrides beat the project file, which beats the preset. Built-in
/// defaults fill whatever is still missing.
pub fn build_descriptor(
    preset: SourceConfig,
    project: SourceConfig,
    overrides: &Overrides,
    resolve_against: Option<&Path>,
) -> Result<ConfigurationDescriptor> {
    let project_output = project.output.unwrap_or_default();
    let preset_output = preset.output.unwrap_or_default();

    let entry = overrides
        .entry
        .clone()
        .or(project.entry)
        .or(preset.entry)
        .unwrap_or_else(|| DEFAULT_ENTRY.to_string());
    let output_path = overrides
        .output_path
        .clone()
        .or(project_output.path)
        .or(preset_output.path)
        .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string());
    let filename = overrides
        .filename
        .clone()
        .or(project_output.filename)
        .or(preset_output.filename)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    let (entry, output_path) = match resolve_against {
        Some(root) => (resolve_path(root, &entry)?, resolve_path(root, &output_path)?),
        None => (entry, output_path),
    };

    let rules = merge_rules(preset.rules, project.rules);
    let descriptor = ConfigurationDescriptor::construct(entry, output_path, filename, rules)?;
    Ok(descriptor)
}

/// Joins `path` onto `root`, anchors the result at the current directory
/// when `root` is relative, and folds `.`/`..` lexically. Symlinks and
/// existence are never checked.
pub fn resolve_path(root: &Path, path: &str) -> Result<String> {
    let joined = std::path::absolute(root.join(path))
        .context(format!("Failed to make {:?} absolute", root.join(path)))?;

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` above the filesystem root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    Ok(normalized.to_string_lossy().into_owned())
}

pub fn resolve_config(args: &GlobalArgs, root: PathBuf) -> Result<RuntimeConfig> {
    let presets = load_presets_file()?;

    // Determine preset to use: CLI flag > Auto-detect > None
    let project_name = root.file_name().and_then(|n| n.to_str());
    let preset_key = args.preset.as_deref().or(project_name);
    let preset = match preset_key.and_then(|k| presets.get(k)) {
        Some(p) => {
            log::info!("Using preset {:?}", preset_key.unwrap_or_default());
            p.clone()
        }
        None => {
            if let Some(name) = &args.preset {
                log::warn!("⚠️ Preset {:?} not found in presets.toml", name);
            }
            SourceConfig::default()
        }
    };

    let (config_path, required) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (root.join(PROJECT_FILE), false),
    };
    let project = load_project_file(&config_path, required)?.unwrap_or_default();

    let descriptor = build_descriptor(
        preset,
        project,
        &Overrides::from(args),
        args.resolve.then_some(root.as_path()),
    )?;
    log::info!(
        "Bundling {} into {}/{} with {} rule(s)",
        descriptor.entry(),
        descriptor.output().path,
        descriptor.output().filename,
        descriptor.rules().len()
    );

    Ok(RuntimeConfig { root, descriptor })
}
