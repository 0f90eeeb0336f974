use crate::emit::LowerOptions;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use std::path::PathBuf;

/// The form in which `kilnc` writes the lowered module.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmitKind {
    /// Human-readable IR.
    #[default]
    Text,
    /// The compact binary IR format.
    Binary,
    /// Lower and verify only.
    #[value(name = "none")]
    Nothing,
}

/// Lowers a typed syntax tree, given as JSON, into SSA IR.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON syntax tree produced by the type checker.
    pub path: PathBuf,

    /// Output form.
    #[clap(long, value_enum, default_value_t = EmitKind::Text)]
    pub emit: EmitKind,

    /// Write the output to this file instead of standard output.
    #[clap(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// The source file the tree was parsed from. Diagnostics quote it when
    /// given.
    #[clap(long)]
    pub source: Option<PathBuf>,

    /// Number of worker threads. Defaults to one per core.
    #[clap(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Give up after this many diagnostics.
    #[clap(long)]
    pub max_diagnostics: Option<usize>,

    /// Lower functions one after the other on the main thread.
    #[clap(long)]
    pub sequential: bool,

    /// Incremental cache file. Read if it exists, rewritten afterwards.
    #[clap(long)]
    pub cache: Option<PathBuf>,

    /// Print debug logs to standard error. `RUST_LOG` refines the filter.
    #[clap(long)]
    pub verbose: bool,

    /// Report the time taken by each stage.
    #[clap(long)]
    pub profile: bool,
}

impl Args {
    pub fn from_cli() -> Self {
        Self::parse()
    }

    pub fn lower_options(&self) -> LowerOptions {
        LowerOptions {
            parallel: !self.sequential,
            max_diagnostics: self.max_diagnostics,
            verify: true,
        }
    }

    /// Logger writing to standard error: warnings by default, everything
    /// with `--verbose`.
    pub fn logger(&self) -> env_logger::Builder {
        let level = if self.verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Warn
        };
        let mut builder = env_logger::Builder::new();
        builder
            .filter_level(level)
            .format_timestamp(None)
            .format_target(false);
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let args = Args::try_parse_from(["kilnc", "module.json"]).unwrap();
        assert_eq!(args.path, PathBuf::from("module.json"));
        assert_eq!(args.emit, EmitKind::Text);
        assert!(args.lower_options().parallel);
        assert_eq!(args.lower_options().max_diagnostics, None);
        assert_eq!(args.logger().build().filter(), LevelFilter::Warn);
    }

    #[test]
    fn verbose_logs_everything() {
        let args = Args::try_parse_from(["kilnc", "module.json", "--verbose"]).unwrap();
        assert_eq!(args.logger().build().filter(), LevelFilter::Trace);
    }

    #[test]
    fn parses_every_option() {
        let args = Args::try_parse_from([
            "kilnc",
            "module.json",
            "--emit",
            "binary",
            "-o",
            "out.kir",
            "--source",
            "module.kn",
            "-j",
            "4",
            "--max-diagnostics",
            "10",
            "--sequential",
            "--cache",
            "kiln.cache",
            "--verbose",
            "--profile",
        ])
        .unwrap();
        assert_eq!(args.emit, EmitKind::Binary);
        assert_eq!(args.output, Some(PathBuf::from("out.kir")));
        assert_eq!(args.jobs, Some(4));
        assert!(args.verbose && args.profile);

        let options = args.lower_options();
        assert!(!options.parallel);
        assert_eq!(options.max_diagnostics, Some(10));
    }
}
