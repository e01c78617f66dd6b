use crate::app::models::DescriptorFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Build, inspect and emit bundler configuration descriptors"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Project file to read instead of <root>/packdesc.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use a named preset from presets.toml
    #[arg(long, global = true)]
    pub preset: Option<String>,

    /// Override the entry module path
    #[arg(long, global = true)]
    pub entry: Option<String>,

    /// Override the output directory
    #[arg(long, global = true)]
    pub output_path: Option<String>,

    /// Override the output bundle file name
    #[arg(long, global = true)]
    pub filename: Option<String>,

    /// Make entry and output paths absolute against the project root
    #[arg(long, global = true)]
    pub resolve: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the descriptor (default)
    Emit {
        #[arg(long, value_enum, default_value_t = DescriptorFormat::Json)]
        format: DescriptorFormat,

        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show which loader each project file would go through
    Plan {
        /// Also list files no rule applies to
        #[arg(long)]
        all: bool,
    },

    /// Report the rule that applies to a single file
    Explain { path: PathBuf },

    /// Fail if a previously emitted descriptor no longer matches the configuration
    Check {
        file: PathBuf,

        /// Format of FILE (guessed from its extension when omitted)
        #[arg(long, value_enum)]
        format: Option<DescriptorFormat>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "packdesc",
            "emit",
            "--format",
            "commonjs",
            "--entry",
            "src/app.jsx",
        ])
        .unwrap();

        assert_eq!(cli.global.entry.as_deref(), Some("src/app.jsx"));
        match cli.command {
            Some(Command::Emit { format, out }) => {
                assert_eq!(format, DescriptorFormat::Commonjs);
                assert!(out.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn check_format_is_optional() {
        let cli = Cli::try_parse_from(["packdesc", "check", "webpack.config.json"]).unwrap();
        match cli.command {
            Some(Command::Check { file, format }) => {
                assert_eq!(file, PathBuf::from("webpack.config.json"));
                assert!(format.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn subcommand_is_optional() {
        let cli = Cli::try_parse_from(["packdesc", "--resolve"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.global.resolve);
    }
}
