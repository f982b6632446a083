use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devloop::bundler::CommandBundler;
use devloop::discovery::parse_tools_dirs;
use devloop::orchestrator::{DevOrchestrator, DevSession, shutdown_signal};
use devloop::supervisor::ProcessSupervisor;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, DevArgs, SourceArgs};
use config::Config;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("devloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // info by default, RUST_LOG overrides
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn source_dir(cwd: &Path, args: &SourceArgs) -> PathBuf {
    match &args.dir {
        Some(dir) => cwd.join(dir),
        None => cwd.join("src").join("mastra"),
    }
}

fn extra_tools_dirs(cwd: &Path, args: &SourceArgs) -> Vec<PathBuf> {
    args.tools_dirs
        .as_deref()
        .map(|list| parse_tools_dirs(list, cwd))
        .unwrap_or_default()
}

fn build_session(cwd: &Path, args: &DevArgs, config: &Config) -> Result<DevSession> {
    let mut session = DevSession::new(cwd, source_dir(cwd, &args.source), args.port.unwrap_or(config.default_port))
        .work_dir(cwd.join(&config.work_dir))
        .extra_tools_dirs(extra_tools_dirs(cwd, &args.source))
        .runtime(&config.server.runtime)
        .server_template(config.server.template()?)
        .extension(&config.bundler.extension)
        .main_build_name(&config.bundler.main_build_name)
        .debounce(Duration::from_millis(config.watch.debounce_ms));

    if let Some((key, value)) = args.env.first() {
        session = session.initial_env(key, value);
    }
    for prefix in &config.watch.ignore {
        session = session.ignore(cwd.join(prefix));
    }
    Ok(session)
}

async fn run_dev(args: &DevArgs, config: &Config) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    let session = build_session(&cwd, args, config)?;
    info!(
        "Dev session: source={} work={} port={}",
        session.source_dir.display(),
        session.work_dir.display(),
        session.port
    );

    let bundler =
        CommandBundler::new(config.bundler.clone(), &session.work_dir).with_server_name(&config.server.executable);
    let supervisor = ProcessSupervisor::new(config.supervisor.clone());
    let mut orchestrator = DevOrchestrator::new(session, bundler, supervisor);

    orchestrator.run(shutdown_signal()).await.context("Dev session failed")?;
    println!("{}", "Stopped".green());
    Ok(())
}

async fn list_tools(args: &SourceArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    let session = DevSession::new(&cwd, source_dir(&cwd, args), 0).extra_tools_dirs(extra_tools_dirs(&cwd, args));
    let report = session.discovery().discover().await;

    for warning in &report.warnings {
        println!("{} {}: {}", "Warning:".yellow(), warning.dir.display(), warning.message);
    }
    if report.tools.is_empty() {
        println!("{}", "No tools found".yellow());
        return Ok(());
    }
    for tool in &report.tools {
        println!("{} {}", tool.logical_name().green(), tool.source_dir.display());
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => run_dev(&DevArgs::default(), config).await,
        Some(Commands::Dev(args)) => run_dev(args, config).await,
        Some(Commands::Tools(args)) => list_tools(args).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
