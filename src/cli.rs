//! Command-line definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// plugsort - sort plugin directories into category folders.
#[derive(Parser, Debug)]
#[command(name = "plugsort")]
#[command(
    author,
    version,
    about,
    long_about = r#"plugsort asks a chain of AI and search backends what each plugin directory
is for, maps the answer onto a category vocabulary and moves the directory into
<dest>/<Category>/.

Backends are tried in priority order. Anything no backend can place lands in the
default category for manual review.

Examples:
    plugsort run --source ./plugins --dest ./sorted
    plugsort run --providers gemini,duckduckgo --rpm gemini=15 --dry-run
    plugsort categories add Crypto --alias wallet --alias bitcoin
    plugsort providers test
"#
)]
pub struct Cli {
    /// Settings file (defaults to <config_dir>/plugsort/settings.json).
    #[arg(long, global = true, value_name = "FILE", env = "PLUGSORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose mode (debug logs for plugsort).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Enable debug logging for plugsort. RUST_LOG, when set, takes precedence."
    )]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Categorize and move every plugin directory in the source.
    #[command(
        long_about = "Scan the immediate subdirectories of the source, categorize each one\n\
through the provider chain and move it into <dest>/<Category>/.\n\n\
Ctrl-C stops new items from starting; items already in flight finish.\n\n\
Examples:\n\
  plugsort run --source ./plugins --dest ./sorted\n\
  plugsort run --export report.json --skip-existing\n"
    )]
    Run(RunArgs),

    /// Manage the category vocabulary.
    Categories {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Inspect, test and store keys for the configured providers.
    Providers {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Show or initialize the settings file.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Directory holding the plugin directories to sort.
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Root of the category folders.
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Provider ids in priority order, comma separated.
    #[arg(long, value_name = "LIST")]
    pub providers: Option<String>,

    /// Concurrent workers.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Requests per minute for one provider, e.g. `--rpm gemini=15`. Repeatable.
    #[arg(long = "rpm", value_name = "ID=N", value_parser = parse_rpm)]
    pub rpm: Vec<(String, u32)>,

    /// Category for items nothing could place.
    #[arg(long, value_name = "LABEL")]
    pub default_category: Option<String>,

    /// Fuzzy-match cutoff in [0, 1].
    #[arg(long, value_name = "RATIO")]
    pub threshold: Option<f32>,

    /// Ceiling on distinct categories.
    #[arg(long, value_name = "N")]
    pub max_categories: Option<usize>,

    /// Write the run report as JSON.
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Categorize but do not move anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore the name-to-category cache for this run.
    #[arg(long)]
    pub no_cache: bool,

    /// Leave items whose name already exists under some <dest>/<Category>/.
    #[arg(long)]
    pub skip_existing: bool,
}

#[derive(Subcommand, Debug)]
pub enum CategoryAction {
    /// Print every category with its aliases.
    List,
    /// Add a category.
    Add {
        #[arg(value_name = "LABEL")]
        label: String,
        /// Keyword that maps to this category. Repeatable.
        #[arg(long = "alias", value_name = "ALIAS")]
        aliases: Vec<String>,
    },
    /// Remove a category.
    Remove {
        #[arg(value_name = "LABEL")]
        label: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProviderAction {
    /// Show each known provider with its credential status.
    List,
    /// Send one sample categorization to each enabled provider (or just ID).
    Test {
        #[arg(value_name = "ID")]
        id: Option<String>,
    },
    /// Store an API key for ID in the OS keychain (read from stdin).
    SetKey {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Remove the keychain entry for ID.
    RemoveKey {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the effective settings (keys masked).
    Show,
    /// Write a settings file with the defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Parse `id=N`
fn parse_rpm(raw: &str) -> Result<(String, u32), String> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=N, got {:?}", raw))?;
    let id = id.trim().to_lowercase();
    if id.is_empty() {
        return Err(format!("missing provider id in {:?}", raw));
    }
    let value: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("not a number in {:?}", raw))?;
    if value == 0 {
        return Err(format!("rate must be positive in {:?}", raw));
    }
    Ok((id, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rpm() {
        assert_eq!(parse_rpm("Gemini=15").unwrap(), ("gemini".to_string(), 15));
        assert!(parse_rpm("gemini").is_err());
        assert!(parse_rpm("=3").is_err());
        assert!(parse_rpm("cohere=0").is_err());
        assert!(parse_rpm("cohere=fast").is_err());
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "plugsort",
            "run",
            "--source",
            "/in",
            "--rpm",
            "anthropic=2",
            "--rpm",
            "gemini_2=9",
            "--dry-run",
            "--verbose",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.source, Some(PathBuf::from("/in")));
                assert_eq!(args.rpm.len(), 2);
                assert!(args.dry_run);
                assert!(!args.skip_existing);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_category_add_aliases() {
        let cli = Cli::parse_from(["plugsort", "categories", "add", "Crypto", "--alias", "wallet", "--alias", "coin"]);
        match cli.command {
            Commands::Categories {
                action: CategoryAction::Add { label, aliases },
            } => {
                assert_eq!(label, "Crypto");
                assert_eq!(aliases, vec!["wallet", "coin"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_provider_key_commands() {
        let cli = Cli::parse_from(["plugsort", "providers", "set-key", "gemini_2"]);
        match cli.command {
            Commands::Providers {
                action: ProviderAction::SetKey { id },
            } => assert_eq!(id, "gemini_2"),
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from(["plugsort", "providers", "remove-key", "claude"]);
        assert!(matches!(
            cli.command,
            Commands::Providers {
                action: ProviderAction::RemoveKey { ref id },
            } if id == "claude"
        ));
        assert!(Cli::try_parse_from(["plugsort", "providers", "set-key"]).is_err());
    }
}
