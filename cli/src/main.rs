// radiod: adapter lifecycle controller CLI
//
// Runs the controller against a simulated radio stack, and inspects or
// edits its configuration and persisted preference.

mod config;
mod sim;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use radiod_core::{
    spawn_controller, AirplaneModeSwitch, BdAddr, Collaborators, Credential, JsonFileSettings,
    LifecycleEvent, ProfileServices, SettingsStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const SIM_ADDRESS: BdAddr = BdAddr([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]);

#[derive(Parser)]
#[command(name = "radiod")]
#[command(about = "radiod: adapter lifecycle controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against the simulated radio
    Run(RunArgs),
    /// Show persisted preference and airplane mode policy
    Status,
    /// Show profile start and stop order
    Profiles,
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Enable the adapter even if the saved preference is off
    #[arg(long)]
    enable: bool,

    /// Start with airplane mode on
    #[arg(long)]
    airplane: bool,

    /// Switch airplane mode on after this many seconds
    #[arg(long, value_name = "SECS")]
    airplane_after: Option<u64>,

    /// Switch airplane mode back off this many seconds after it went on
    #[arg(long, value_name = "SECS", requires = "airplane_after")]
    airplane_for: Option<u64>,

    /// Disable the adapter after this many seconds
    #[arg(long, value_name = "SECS")]
    disable_after: Option<u64>,

    /// Clear the saved preference when disabling
    #[arg(long)]
    persist: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Status => cmd_status(),
        Commands::Profiles => cmd_profiles(),
        Commands::Config { action } => cmd_config(action),
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = config::Config::load()?;

    let settings_file = config.settings_file()?;
    let settings = Arc::new(
        JsonFileSettings::open(&settings_file).context("Failed to open settings file")?,
    );
    let airplane = AirplaneModeSwitch::new(args.airplane);

    let delay = Duration::from_millis(config.profile_delay_ms);
    let mut profiles = ProfileServices::new();
    for id in &config.controller.profiles {
        profiles.insert(*id, Arc::new(sim::SimulatedProfile::new(*id, delay)));
    }

    let want_on = args.enable || settings.radio_should_be_on();
    let handle = spawn_controller(
        config.controller.clone(),
        Collaborators {
            profiles,
            gateway: Arc::new(sim::LoopbackGateway::new(
                SIM_ADDRESS,
                config.adapter_name.clone(),
            )),
            settings: settings.clone(),
            ambient: Arc::new(airplane.clone()),
        },
    )
    .context("Failed to start adapter controller")?;

    let control = handle.control();
    let mut events = handle.subscribe();

    println!("{}", "radiod".bold());
    if let (Some(addr), Some(name)) = (
        control.address(Credential::Use)?,
        control.name(Credential::Use)?,
    ) {
        println!("  Adapter:  {} ({})", name.bright_cyan(), addr);
    }
    println!("  Settings: {}", settings_file.display());
    println!();

    if want_on {
        if !control.request_enable(Credential::Admin)? {
            println!("{} Enable refused: airplane mode is on", "✗".red());
        }
    } else {
        println!(
            "{} Radio preference is off (use {} to turn it on)",
            "•".dimmed(),
            "--enable".bright_green()
        );
    }

    if let Some(after) = args.airplane_after {
        let airplane = airplane.clone();
        let duration = args.airplane_for;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(after)).await;
            info!("Airplane mode on");
            airplane.set(true);

            if let Some(secs) = duration {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                info!("Airplane mode off");
                airplane.set(false);
            }
        });
    }

    if let Some(after) = args.disable_after {
        let control = control.clone();
        let persist = args.persist;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(after)).await;
            if let Err(e) = control.request_disable(Credential::Admin, persist) {
                warn!("Scripted disable failed: {}", e);
            }
        });
    }

    let mut printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    print_event(&event);
                    if event == LifecycleEvent::Finalized {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} lifecycle events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let printer_done = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("{}", "Shutting down...".dimmed());
            if let Err(e) = control.request_disable(Credential::Admin, args.persist) {
                warn!("Disable on shutdown failed: {}", e);
            }
            false
        }
        result = &mut printer => {
            result.context("Event printer failed")?;
            true
        }
    };

    handle.finished().await?;
    if !printer_done {
        printer.await.context("Event printer failed")?;
    }

    println!("{} Controller finalized", "✓".green());
    Ok(())
}

fn print_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::StateChanged(state) => {
            println!("  {} {}", "state".dimmed(), state.to_string().bright_yellow())
        }
        LifecycleEvent::Started => println!("{} All profiles running", "✓".green()),
        LifecycleEvent::Stopped => println!("{} All profiles stopped", "✓".green()),
        LifecycleEvent::Finalized => println!("{} Native resources released", "✓".green()),
    }
}

fn cmd_status() -> Result<()> {
    let config = config::Config::load()?;
    let settings_file = config.settings_file()?;
    let settings =
        JsonFileSettings::open(&settings_file).context("Failed to open settings file")?;
    let policy = config.controller.airplane_policy();

    let on_off = |on: bool| if on { "on".green() } else { "off".red() };

    println!("{}", "Adapter Status".bold());
    println!("  Preference:        {}", on_off(settings.radio_should_be_on()));
    println!("  Settings file:     {}", settings_file.display());
    println!("  Airplane affected: {}", on_off(policy.sensitive));
    println!("  Airplane toggle:   {}", on_off(policy.toggleable));
    println!(
        "  Convergence:       {}",
        config
            .controller
            .convergence_timeout_ms
            .map_or_else(|| "unbounded".to_string(), |ms| format!("{}ms", ms))
    );

    Ok(())
}

fn cmd_profiles() -> Result<()> {
    let config = config::Config::load()?;
    let registry = config.controller.registry()?;

    println!("{}", "Profiles".bold());
    println!();
    println!("{}", "Start order:".bold());
    for (i, id) in registry.start_order().enumerate() {
        println!("  {}. {}", i + 1, id.to_string().bright_cyan());
    }

    println!();
    println!("{}", "Stop order:".bold());
    for (i, id) in registry.stop_order().enumerate() {
        println!("  {}. {}", i + 1, id.to_string().bright_cyan());
    }

    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<28} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}
