use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use release_comparer::{
    comparer::Comparer,
    config::{load_apps, Config, FailurePolicy},
    exec::SystemRunner,
    model::TrackedApp,
    output::{print_apps_table, print_summary_table},
    resolver::{HttpFetcher, VersionResolver},
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const PARTIAL: u8 = 2;
}

#[derive(Parser)]
#[command(name = "release-comparer")]
#[command(
    author,
    version,
    about = "Compare upstream releases against published container images"
)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, inspect and scan every tracked app and write the reports
    Run {
        /// Apps file to read instead of the configured one
        #[arg(long, value_name = "PATH")]
        apps: Option<PathBuf>,

        /// Directory to write reports to
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,

        /// Only process these apps (repeatable)
        #[arg(long = "app", value_name = "NAME")]
        only: Vec<String>,

        /// Skip apps that fail and keep processing the rest
        #[arg(long, conflicts_with = "fail_fast")]
        keep_going: bool,

        /// Stop at the first app that fails
        #[arg(long)]
        fail_fast: bool,
    },

    /// Print the latest stable upstream version of tracked apps
    Resolve {
        /// Apps file to read instead of the configured one
        #[arg(long, value_name = "PATH")]
        apps: Option<PathBuf>,

        /// Apps to resolve (all when omitted)
        names: Vec<String>,
    },

    /// List tracked apps and their image variants
    List {
        /// Apps file to read instead of the configured one
        #[arg(long, value_name = "PATH")]
        apps: Option<PathBuf>,
    },

    /// Show or create the settings file
    Config {
        /// Generate default settings file
        #[arg(long)]
        init: bool,

        /// Show settings file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,release_comparer={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    // --init must work before the settings file it creates exists
    if let Commands::Config { init: true, .. } = cli.command {
        handle_config(cli.settings, &Config::default(), true, false)?;
        return Ok(exit_codes::SUCCESS);
    }

    let mut config = Config::load(cli.settings.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Run {
            apps,
            data_dir,
            only,
            keep_going,
            fail_fast,
        } => {
            if let Some(apps) = apps {
                config.apps_file = apps;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if keep_going {
                config.failure_policy = FailurePolicy::Skip;
            } else if fail_fast {
                config.failure_policy = FailurePolicy::Abort;
            }

            run_compare(&config, &only).await
        }
        Commands::Resolve { apps, names } => {
            if let Some(apps) = apps {
                config.apps_file = apps;
            }
            run_resolve(&config, &names).await
        }
        Commands::List { apps } => {
            let path = apps.unwrap_or(config.apps_file);
            let apps = load_apps(&path)?;
            print_apps_table(&apps);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(cli.settings, &config, init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_compare(config: &Config, only: &[String]) -> Result<u8> {
    let apps = select_apps(load_apps(&config.apps_file)?, only)?;

    let fetcher = HttpFetcher::new(config.timeouts.http()).context("Failed to build HTTP client")?;
    let comparer = Comparer::new(config, Arc::new(SystemRunner), Box::new(fetcher));

    let summary = comparer.run(&apps).await?;
    print_summary_table(&summary);

    if summary.is_complete() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::PARTIAL)
    }
}

async fn run_resolve(config: &Config, names: &[String]) -> Result<u8> {
    let apps = select_apps(load_apps(&config.apps_file)?, names)?;

    let fetcher = HttpFetcher::new(config.timeouts.http()).context("Failed to build HTTP client")?;
    let resolver = VersionResolver::new(Box::new(fetcher));

    let mut failed = 0;
    for app in &apps {
        match resolver.resolve_latest_version(&app.url, &app.regex).await {
            Ok(version) => println!("{:<24} {}", app.name, version),
            Err(e) => {
                tracing::error!("{}: {}", app.name, e);
                failed += 1;
            }
        }
    }

    if failed == 0 {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::PARTIAL)
    }
}

/// Narrows `apps` to `names`, keeping all apps when `names` is empty.
fn select_apps(apps: Vec<TrackedApp>, names: &[String]) -> Result<Vec<TrackedApp>> {
    if names.is_empty() {
        return Ok(apps);
    }

    if let Some(unknown) = names.iter().find(|n| !apps.iter().any(|a| &a.name == *n)) {
        bail!("Unknown app: {}", unknown);
    }

    Ok(apps
        .into_iter()
        .filter(|app| names.contains(&app.name))
        .collect())
}

/// `config --init` writes defaults; otherwise the effective settings are
/// printed together with the files a `run` would touch.
fn handle_config(
    settings: Option<PathBuf>,
    config: &Config,
    init: bool,
    show_path: bool,
) -> Result<()> {
    let settings_path = settings.unwrap_or_else(Config::config_path);

    if init {
        if settings_path.exists() {
            bail!(
                "{} already exists, remove it to regenerate defaults",
                settings_path.display()
            );
        }

        Config::default()
            .save_to(&settings_path)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        tracing::info!("Wrote default settings to {}", settings_path.display());
        return Ok(());
    }

    if show_path {
        println!("settings  {}", settings_path.display());
        println!("apps      {}", config.apps_file.display());
        println!("reports   {}", config.data_dir.display());
        return Ok(());
    }

    let origin = if settings_path.exists() {
        settings_path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };
    println!("# effective settings ({})", origin);
    print!("{}", config.render()?);

    println!();
    match load_apps(&config.apps_file) {
        Ok(apps) => {
            let images: usize = apps.iter().map(|app| app.variants.len()).sum();
            println!(
                "# {}: {} tracked app(s), {} image variant(s)",
                config.apps_file.display(),
                apps.len(),
                images
            );
        }
        Err(e) => println!("# {}: {}", config.apps_file.display(), e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("nested").join("config.toml");

        handle_config(Some(settings.clone()), &Config::default(), true, false).unwrap();
        assert_eq!(Config::load(Some(&settings)).unwrap(), Config::default());

        let err = handle_config(Some(settings.clone()), &Config::default(), true, false)
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_select_apps_rejects_unknown_name() {
        let apps = release_comparer::config::parse_apps(
            "redis:\n  url: https://example.com\n  regex: 'v(\\d+\\.\\d+\\.\\d+)'\n",
        )
        .unwrap();

        let err = select_apps(apps, &["nginx".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Unknown app: nginx"));
    }
}
