use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repomirror::report::{format_event, format_summary};
use repomirror::{
    Config, GitClient, HealthCheck, LocalState, SourceChoice, SshKeyCredentials, SyncEngine, SyncMode,
    SyncOptions, SyncRequest,
};

#[derive(Parser)]
#[command(name = "repomirror")]
#[command(about = "Bulk repository synchronization with mirror push targets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone configured repositories that are not present locally
    Clone(SyncArgs),

    /// Pull configured repositories, cloning the missing ones
    Pull(SyncArgs),

    /// Show the local state of every configured repository
    Status,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// System health check and diagnostics
    Doctor,
}

#[derive(Args)]
struct SyncArgs {
    /// Provider to clone and pull from
    #[arg(short, long, value_enum, default_value_t = SourceChoice::Origin)]
    source: SourceChoice,

    /// Only process these repositories (repeatable)
    #[arg(short, long = "repo", value_name = "NAME")]
    repos: Vec<String>,

    /// Process repositories in alphabetical order
    #[arg(long)]
    sort: bool,

    /// Print the summary as JSON instead of progress lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write an example configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Print,

    /// Print the configuration file location
    Path,

    /// Open the configuration file in $VISUAL or $EDITOR
    Edit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config { config_command } => {
            // No config is loaded here: `config init` must not find the example written by load_or_default
            init_logging(cli.verbose, "warn")?;
            cmd_config(config_command, config_path)
        }
        Commands::Clone(args) => {
            let config = setup(config_path, cli.verbose)?;
            cmd_sync(SyncMode::Clone, args, &config).await
        }
        Commands::Pull(args) => {
            let config = setup(config_path, cli.verbose)?;
            cmd_sync(SyncMode::Pull, args, &config).await
        }
        Commands::Status => cmd_status(&setup(config_path, cli.verbose)?).await,
        Commands::Doctor => cmd_doctor(&setup(config_path, cli.verbose)?),
    }
}

/// Load configuration, then initialize logging at its level
fn setup(config_path: Option<&Path>, verbose: bool) -> Result<Config> {
    let config = load_config(config_path)?;
    init_logging(verbose, &config.logging.level)?;
    info!("Starting repomirror v{}", env!("CARGO_PKG_VERSION"));
    Ok(config)
}

/// Initialize logging: RUST_LOG wins, then --verbose, then the configured level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(level)
        }
    });

    // stdout is reserved for reports and JSON output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

fn config_location(config_path: Option<&Path>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::default_config_path(),
    }
}

/// Clone or pull the selected repositories
async fn cmd_sync(mode: SyncMode, args: SyncArgs, config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let repositories = config.select_repositories(&args.repos)?;
    let source = config.provider_pair().resolve(args.source);
    let mut options = SyncOptions::from_config(config);
    options.sort |= args.sort;

    let request = SyncRequest {
        mode,
        repositories,
        source,
    };

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let engine = SyncEngine::new(Arc::new(GitClient::new()), options).with_events(sender);

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current repository");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            if json {
                continue;
            }
            if let Some(line) = format_event(&event) {
                println!("{}", line);
            }
        }
    });

    let result = engine.run(&request, &SshKeyCredentials::new()).await;
    // Dropping the engine closes the event channel
    drop(engine);
    printer.await.context("Progress printer failed")?;

    let summary = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!();
        println!("{}", format_summary(&summary));
    }

    if summary.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

/// Show what a sync would find for every configured repository
async fn cmd_status(config: &Config) -> Result<()> {
    let engine = SyncEngine::new(Arc::new(GitClient::new()), SyncOptions::from_config(config));
    let root = config.storage_root();

    println!("📊 Repositories in {} ({})", root.display(), config.repositories.len());

    for name in &config.repositories {
        let path = root.join(name);
        match engine.classify(&path).await {
            Ok(LocalState::Missing) => println!("   📥 {}: not cloned", name),
            Ok(LocalState::Repository(repo)) => println!(
                "   ✅ {}: on {}",
                name,
                repo.head_branch().unwrap_or("detached HEAD")
            ),
            Ok(LocalState::EmptyDirectory) => {
                println!("   🗑️  {}: empty directory, will be replaced by a clone", name)
            }
            Ok(LocalState::NotARepository) => {
                println!("   ⚠️  {}: not a repository and not empty, will be skipped", name)
            }
            Err(e) => println!("   ❌ {}: {:#}", name, e),
        }
    }

    Ok(())
}

/// Handle configuration commands
fn cmd_config(config_command: ConfigCommands, config_path: Option<&Path>) -> Result<()> {
    match config_command {
        ConfigCommands::Init { force } => {
            let path = config_location(config_path)?;
            if path.exists() && !force {
                bail!(
                    "Configuration already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
            Config::example().save(&path)?;

            println!("✅ Example configuration written");
            println!("   Config: {}", path.display());
            println!("   Next: set providers and repositories, then run 'repomirror clone'");
        }
        ConfigCommands::Print => {
            let config = load_config(config_path)?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        ConfigCommands::Path => {
            println!("{}", config_location(config_path)?.display());
        }
        ConfigCommands::Edit => {
            let path = config_location(config_path)?;
            if !path.exists() {
                bail!(
                    "No configuration at {} (run 'repomirror config init' first)",
                    path.display()
                );
            }
            open_in_editor(&path)?;
        }
    }

    Ok(())
}

/// Run the user's editor on `path` and wait for it to exit
fn open_in_editor(path: &Path) -> Result<()> {
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());

    // Editors are often configured with flags, e.g. "code --wait"
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("EDITOR is empty");
    };

    info!("Opening {} with {}", path.display(), editor);
    let status = std::process::Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("Failed to start editor: {}", program))?;

    if !status.success() {
        bail!("Editor {} exited with {}", program, status);
    }
    Ok(())
}

/// System health check and diagnostics
fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config);
    print_health_report(&health);

    if !health.all_passed() {
        std::process::exit(1);
    }

    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    use repomirror::health::CheckResult;

    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 repomirror System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
