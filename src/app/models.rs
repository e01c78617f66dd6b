use crate::app::commonjs;
use crate::app::error::DescriptorError;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Textual forms a descriptor can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DescriptorFormat {
    #[default]
    Json,
    Toml,
    /// `module.exports = { ... };` with `path.resolve` paths and regex
    /// conditions, loadable by the bundler as its config file.
    Commonjs,
}

impl DescriptorFormat {
    /// Guesses the format from a file extension (`.json`, `.toml`, `.js`/`.cjs`).
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "js" | "cjs" => Some(Self::Commonjs),
            _ => None,
        }
    }

    /// The name accepted by `--format`.
    pub fn name(self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default()
    }
}

/// Match expression as the bundler sees it. Kept as source text; compiled
/// only when this tool has to match paths itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(String);

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoaderOptions {
    #[serde(default)]
    pub presets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleHandler {
    pub loader: String,
    #[serde(default)]
    pub options: LoaderOptions,
}

/// Routes files matching `test` (and not `exclude`) through a loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformRule {
    pub test: Pattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Pattern>,
    #[serde(rename = "use")]
    pub handler: RuleHandler,
}

impl TransformRule {
    pub fn new<I, S>(test: &str, exclude: Option<&str>, loader: &str, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            test: Pattern::new(test),
            exclude: exclude.map(Pattern::new),
            handler: RuleHandler {
                loader: loader.to_string(),
                options: LoaderOptions {
                    presets: presets.into_iter().map(Into::into).collect(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub path: String,
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOptions {
    #[serde(default)]
    pub rules: Vec<TransformRule>,
}

/// The record handed to the bundler: one entry, one output, ordered rules.
///
/// Immutable once constructed. Field names and nesting mirror the bundler's
/// config schema, so they double as the serialized keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorRecord")]
pub struct ConfigurationDescriptor {
    entry: String,
    output: OutputTarget,
    module: ModuleOptions,
}

#[derive(Deserialize)]
struct DescriptorRecord {
    entry: String,
    output: OutputTarget,
    #[serde(default)]
    module: ModuleOptions,
}

impl TryFrom<DescriptorRecord> for ConfigurationDescriptor {
    type Error = DescriptorError;

    fn try_from(record: DescriptorRecord) -> Result<Self, Self::Error> {
        Self::construct(
            record.entry,
            record.output.path,
            record.output.filename,
            record.module.rules,
        )
    }
}

impl ConfigurationDescriptor {
    pub fn construct(
        entry: impl Into<String>,
        output_dir: impl Into<String>,
        output_name: impl Into<String>,
        rules: Vec<TransformRule>,
    ) -> Result<Self, DescriptorError> {
        let entry = entry.into();
        let output_dir = output_dir.into();
        let output_name = output_name.into();

        if entry.trim().is_empty() {
            return Err(DescriptorError::EmptyEntry);
        }
        if output_dir.trim().is_empty() {
            return Err(DescriptorError::EmptyOutputPath);
        }
        if output_name.trim().is_empty() {
            return Err(DescriptorError::EmptyOutputFilename);
        }
        for (idx, rule) in rules.iter().enumerate() {
            if rule.test.as_str().trim().is_empty() {
                return Err(DescriptorError::EmptyTest(idx));
            }
            if rule.handler.loader.trim().is_empty() {
                return Err(DescriptorError::EmptyLoader(idx));
            }
        }

        Ok(Self {
            entry,
            output: OutputTarget {
                path: output_dir,
                filename: output_name,
            },
            module: ModuleOptions { rules },
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    pub fn rules(&self) -> &[TransformRule] {
        &self.module.rules
    }

    /// Renders the descriptor. Output is a pure function of the fields, so
    /// repeated calls are byte-identical.
    pub fn serialize_as(&self, format: DescriptorFormat) -> Result<String> {
        let text = match format {
            DescriptorFormat::Json => {
                let mut json = serde_json::to_string_pretty(self)
                    .context("Failed to serialize descriptor as JSON")?;
                json.push('\n');
                json
            }
            DescriptorFormat::Toml => {
                toml::to_string(self).context("Failed to serialize descriptor as TOML")?
            }
            DescriptorFormat::Commonjs => commonjs::render(self)?,
        };
        Ok(text)
    }

    /// Reads back anything `serialize_as` produced, re-checking the
    /// construction constraints.
    pub fn parse(text: &str, format: DescriptorFormat) -> Result<Self> {
        match format {
            DescriptorFormat::Json => {
                serde_json::from_str(text).context("Failed to parse JSON descriptor")
            }
            DescriptorFormat::Toml => {
                toml::from_str(text).context("Failed to parse TOML descriptor")
            }
            DescriptorFormat::Commonjs => commonjs::parse(text),
        }
    }
}

/// Everything `run` needs after merging presets, project file and CLI args.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub root: PathBuf,
    pub descriptor: ConfigurationDescriptor,
}

/// One file or directory in a rule plan.
#[derive(Debug)]
pub struct PlanEntry {
    pub path: PathBuf,
    pub relative_path: String,
    pub depth: usize,
    pub is_dir: bool,
    pub rule: Option<usize>, // Index of the first rule that applies
}
