use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use modhost::application::errors::{ConfigError, HostError, ModuleError};
use modhost::application::interactions::DispatchOutcome;
use modhost::domain::entities::User;
use modhost::infrastructure::adapters::console::{ConsoleLine, ConsolePlatform, ConsoleParser, MetaCommand};
use modhost::infrastructure::config::{flag_for_module, Config};
use modhost::infrastructure::modules::LoadOutcome;
use modhost::Host;

#[derive(Parser)]
#[command(name = "modhost")]
#[command(about = "A hot-reloadable module host for slash-command bots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host with the console adapter
    Run,
    /// List discovered modules
    Modules,
    /// Load and validate configuration
    CheckConfig,
    /// Write a default config file
    InitConfig,
    /// Show version
    Version,
}

const CONSOLE_HELP: &str = "\
/cmd [sub ...] [key=value ...]           run a command
? cmd option [partial]                   autocomplete
click <message-id> <custom-id>           press a button
select <message-id> <custom-id> a,b      choose from a select menu
modal <message-id> <custom-id> k=v ...   submit a modal
user|message <target-id> <name>          run a context menu command
:load|:unload|:reload <module>           manage modules
:modules  :install  :help  :quit";

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env loaded: {}", e);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => load_config(&cli.config).map_err(HostError::from).and_then(run),
        Commands::Modules => load_config(&cli.config).map_err(HostError::from).and_then(|c| list_modules(&c)),
        Commands::CheckConfig => check_config(&cli.config),
        Commands::InitConfig => init_config(&cli.config),
        Commands::Version => {
            println!("modhost v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// File (when present) -> environment overrides -> validation
fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut config = if Path::new(path).exists() {
        Config::load(path)?
    } else {
        tracing::info!("No config at {}, using defaults", path);
        Config::default()
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn check_config(path: &str) -> Result<(), HostError> {
    let config = load_config(path)?;
    println!("Configuration OK");
    println!("  bot:      {}", config.bot.name);
    println!("  modules:  {}", config.modules.directory.display());
    println!("  install:  {}", config.install_scope()?);
    println!("  watch:    {}", config.modules.watch);
    Ok(())
}

fn init_config(path: &str) -> Result<(), HostError> {
    if Path::new(path).exists() {
        return Err(HostError::Internal(format!("{} already exists", path)));
    }
    Config::default().save(path)?;
    println!("Wrote default configuration to {}", path);
    Ok(())
}

fn list_modules(config: &Config) -> Result<(), HostError> {
    let host = Host::builder(config.clone(), Arc::new(ConsolePlatform::default())).build()?;
    let modules = host.manager().discover()?;
    if modules.is_empty() {
        println!("No modules in {}", config.modules.directory.display());
    }
    for module in modules {
        let format = module
            .entry
            .as_ref()
            .map(|e| e.format.to_string())
            .unwrap_or_else(|| "no entry".to_string());
        let state = if host.flags().module_enabled(&module.name) { "on" } else { "off" };
        println!("{:<20} {:<10} {}={}", module.name, format, module.flag, state);
    }
    Ok(())
}

fn run(config: Config) -> Result<(), HostError> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| HostError::Internal(e.to_string()))?;
    runtime.block_on(run_console(config))
}

async fn run_console(config: Config) -> Result<(), HostError> {
    tracing::info!("Starting modhost: {}", config.bot.name);

    let platform = Arc::new(ConsolePlatform::new(config.bot.name.clone()));
    let host = Host::builder(config, platform.clone()).build()?;

    let summary = host.start().await?;
    for (name, error) in &summary.failed {
        tracing::warn!(module = %name, "Not loaded: {}", error);
    }
    if let Some(Err(e)) = &summary.install {
        println!("Command install failed: {}. Retry with :install", e);
    }

    platform.set_ready(true);
    host.ready().await;

    let sweeper = host.spawn_session_sweeper();
    let watcher = host.spawn_watcher();

    println!("modhost ready. Type :help for console commands.");
    let parser = ConsoleParser::new(User::new("console").with_username("console"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read console input: {}", e);
                break;
            }
        };

        match parser.parse(&line) {
            Ok(ConsoleLine::Empty) => {}
            Ok(ConsoleLine::Interaction(interaction)) => {
                let handle = host.spawn_dispatch(*interaction);
                tokio::spawn(async move {
                    match handle.await {
                        Ok(DispatchOutcome::Handled) => {}
                        Ok(outcome) => tracing::debug!(?outcome, "Interaction not handled"),
                        Err(e) => tracing::error!("Dispatch task failed: {}", e),
                    }
                });
            }
            Ok(ConsoleLine::Meta(MetaCommand::Quit)) => break,
            Ok(ConsoleLine::Meta(meta)) => run_meta(&host, meta).await,
            Err(e) => println!("{}", e),
        }
    }

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    sweeper.abort();
    host.shutdown().await;
    Ok(())
}

async fn run_meta(host: &Host, meta: MetaCommand) {
    let manager = host.manager();
    match meta {
        MetaCommand::Load(name) => report(&name, manager.load(&name).await),
        MetaCommand::Reload(name) => report(&name, manager.reload(&name).await),
        MetaCommand::Unload(name) => match manager.unload(&name).await {
            Ok(true) => println!("Unloaded {}", name),
            Ok(false) => println!("{} was not loaded", name),
            Err(e) => println!("Failed to unload {}: {}", name, e),
        },
        MetaCommand::Modules => {
            let loaded = manager.loaded();
            if loaded.is_empty() {
                println!("No modules loaded");
            }
            for module in loaded {
                println!(
                    "{:<20} gen {:<4} {:<10} {}",
                    module.name,
                    module.generation,
                    module.format.to_string(),
                    host.registry()
                        .commands_for(&module.name)
                        .iter()
                        .map(|c| format!("/{}", c))
                        .collect::<Vec<_>>()
                        .join(" ")
                );
            }
        }
        MetaCommand::Install => match manager.install().await {
            Ok(count) => println!("Installed {} commands", count),
            Err(e) => println!("Install failed: {}", e),
        },
        MetaCommand::Help => println!("{}", CONSOLE_HELP),
        MetaCommand::Quit => {}
    }
}

fn report(name: &str, result: Result<LoadOutcome, ModuleError>) {
    match result {
        Ok(LoadOutcome::Loaded { generation }) => println!("Loaded {} (generation {})", name, generation),
        Ok(LoadOutcome::Disabled) => println!("{} is disabled by {}", name, flag_for_module(name)),
        Err(e) => println!("Failed to load {}: {}", name, e),
    }
}
