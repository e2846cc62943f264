use std::path::PathBuf;

use clap::Parser;
use dotstub::{StripConfig, VisibilityPolicy};

/// dotstub - clone the public interface of .NET assemblies into stub assemblies
#[derive(Debug, Parser)]
#[command(
    name = "dotstub",
    about,
    long_about = None,
    disable_version_flag = true,
    override_usage = "dotstub [OPTIONS] <INPUT>... <OUTPUT_DIR>"
)]
pub struct Cli {
    /// Path(s) to the assemblies to clone, followed by the directory to write them to.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Members to keep: strict (public) or extended (public and protected).
    #[arg(short, long, default_value_t = VisibilityPolicy::Strict)]
    pub mode: VisibilityPolicy,

    /// Keep references to the .NET 2.0 mscorlib in extended mode.
    #[arg(long)]
    pub keep_references: bool,

    /// Directory to search for referenced assemblies (repeatable).
    #[arg(short = 'r', long = "search-dir", value_name = "DIR")]
    pub search_dirs: Vec<PathBuf>,

    /// Show the program's version number and exit.
    #[arg(short = 'v', long)]
    pub version: bool,

    #[command(flatten)]
    pub global: GlobalOptions,
}

/// Options that affect output only.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit a JSON report instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// The stripping configuration selected by the flags.
    pub fn strip_config(&self) -> StripConfig {
        let mut config = match self.mode {
            VisibilityPolicy::Strict => StripConfig::strict(),
            VisibilityPolicy::Extended => StripConfig::extended(),
        };
        if self.keep_references {
            config.excluded_reference = None;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_selects_config() {
        let cli = Cli::parse_from(["dotstub", "-m", "extended", "a.dll", "out"]);
        assert_eq!(cli.strip_config(), StripConfig::extended());

        let cli = Cli::parse_from(["dotstub", "--mode", "extended", "--keep-references", "a.dll", "out"]);
        assert!(cli.strip_config().excluded_reference.is_none());

        let cli = Cli::parse_from(["dotstub", "a.dll", "b.dll", "out"]);
        assert_eq!(cli.strip_config(), StripConfig::strict());
        assert_eq!(cli.paths.len(), 3);
    }

    #[test]
    fn search_dirs_repeat() {
        let cli = Cli::parse_from(["dotstub", "-r", "lib", "--search-dir", "ref", "a.dll", "out"]);
        assert_eq!(cli.search_dirs, vec![PathBuf::from("lib"), PathBuf::from("ref")]);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["dotstub", "-m", "loose", "a.dll", "out"]).is_err());
    }
}
