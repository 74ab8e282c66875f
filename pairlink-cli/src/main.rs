mod account;

use account::LocalAccount;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pairlink_core::events::PairingEvent;
use pairlink_core::{
    platform, AccountBridge, ConnectionError, PairingConfig, PairingConnectionController,
    PairingDelegate, PairingError, RecoveryKey, RegisteredDevice, RelayDependencies,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pairlink CLI - pair devices to a sync account through a relay
#[derive(Parser)]
#[command(name = "pairlink")]
#[command(about = "Pair devices to a sync account through an untrusted relay", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay URL override
    #[arg(short, long)]
    relay: Option<String>,

    /// Path to the local account file
    #[arg(short, long)]
    account: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new sync account on this device
    Init,

    /// Show the account and registered devices
    Status,

    /// Print the recovery code for this account
    RecoveryCode,

    /// Display an exchange code and send the recovery key to whoever scans it
    Exchange,

    /// Display a connect code and wait for a signed-in device to send its key
    Connect,

    /// Enter a code displayed by another device, or a recovery code
    Enter {
        /// Exchange, connect or recovery code
        code: String,
    },
}

/// Which event ends a displayed-code flow.
#[derive(Clone, Copy)]
enum WaitFor {
    FinishedTransmitting,
    LoggedIn,
}

/// Prints pairing events for a terminal user.
struct ConsoleDelegate;

impl PairingDelegate for ConsoleDelegate {
    fn will_begin_transmitting_recovery_key(&mut self) {
        println!("Other device found, sending recovery key...");
    }

    fn did_finish_transmitting_recovery_key(&mut self) {
        println!("Done.");
    }

    fn did_receive_recovery_key(&mut self) {
        println!("Recovery key received, signing in...");
    }

    fn did_recognize_scanned_code(&mut self) {
        println!("Code recognized.");
    }

    fn did_create_sync_account(&mut self) {
        println!("Created a new sync account.");
    }

    fn did_complete_account_connection(&mut self, should_show_sync_enabled: bool) {
        if should_show_sync_enabled {
            println!("Sync enabled on the other device.");
        } else {
            println!("Recovery key sent to the other device.");
        }
    }

    fn did_complete_login(&mut self, registered_devices: &[RegisteredDevice], is_recovery: bool) {
        if is_recovery {
            println!("Account recovered.");
        } else {
            println!("Device connected.");
        }
        print_devices(registered_devices);
    }

    fn did_find_two_accounts_during_recovery(&mut self, recovery_key: &RecoveryKey) {
        println!(
            "This device is already signed in to another account; not switching to {}.",
            recovery_key.user_id
        );
    }

    fn did_error(&mut self, error: ConnectionError, underlying: Option<&PairingError>) {
        match underlying {
            Some(cause) => eprintln!("Pairing failed: {} ({})", error, cause),
            None => eprintln!("Pairing failed: {}", error),
        }
    }
}

fn print_devices(devices: &[RegisteredDevice]) {
    println!("Registered devices:");
    for device in devices {
        println!("  {} ({}) [{}]", device.name, device.device_type, device.id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(platform::get_default_config_path);
    let mut config = PairingConfig::load_or_default(&config_path)
        .with_context(|| format!("Loading {}", config_path.display()))?;
    if let Some(relay) = cli.relay {
        config.relay_url = relay;
    }

    let deps = RelayDependencies::from_config(&config).context("Configuring relay")?;
    let account_path = cli
        .account
        .unwrap_or_else(platform::get_default_account_path);
    let account = Arc::new(
        LocalAccount::open(&account_path, deps.transport())
            .with_context(|| format!("Opening {}", account_path.display()))?,
    );

    info!("Using relay {}", config.relay_url);

    match cli.command {
        Commands::Init => {
            account
                .create_account(&config.device_name, &config.device_type)
                .await?;
            println!("Account created.");
            print_devices(&account.devices());
        }
        Commands::Status => match account.recovery_key() {
            Some(key) => {
                println!("Signed in to account {}", key.user_id);
                print_devices(&account.devices());
            }
            None => println!("No sync account on this device."),
        },
        Commands::RecoveryCode => {
            let key = account
                .recovery_key()
                .context("No sync account on this device")?;
            println!("{}", key.to_code()?);
        }
        Commands::Exchange => {
            let (controller, events) = build_controller(&config, account, deps);
            let code = controller.start_exchange_mode()?;
            println!("Enter this code on the other device:\n\n{}\n", code);
            wait_for_flow(events, WaitFor::FinishedTransmitting).await?;
            controller.stop_exchange_mode();
        }
        Commands::Connect => {
            let (controller, events) = build_controller(&config, account, deps);
            let code = controller.start_connect_mode()?;
            println!("Enter this code on a signed-in device:\n\n{}\n", code);
            wait_for_flow(events, WaitFor::LoggedIn).await?;
            controller.stop_connect_mode();
        }
        Commands::Enter { code } => {
            let (controller, events) = build_controller(&config, account, deps);
            let printer = tokio::spawn(async move {
                let mut delegate = ConsoleDelegate;
                pairlink_core::dispatch_events(events, &mut delegate).await;
            });

            let succeeded = tokio::select! {
                result = controller.sync_code_entered(&code) => result,
                _ = tokio::signal::ctrl_c() => false,
            };
            drop(controller);
            printer.await?;

            if !succeeded {
                anyhow::bail!("Pairing did not complete");
            }
        }
    }

    Ok(())
}

fn build_controller(
    config: &PairingConfig,
    account: Arc<LocalAccount>,
    deps: RelayDependencies,
) -> (
    PairingConnectionController,
    tokio::sync::mpsc::UnboundedReceiver<PairingEvent>,
) {
    PairingConnectionController::new(
        config.device_name.clone(),
        config.device_type.clone(),
        account,
        Arc::new(deps),
    )
}

/// Print events until the displayed-code flow ends, fails or is interrupted.
async fn wait_for_flow(
    mut events: tokio::sync::mpsc::UnboundedReceiver<PairingEvent>,
    until: WaitFor,
) -> Result<()> {
    let mut delegate = ConsoleDelegate;
    let mut failed = false;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelled.");
                return Ok(());
            }
        };
        let Some(event) = event else {
            break;
        };

        event.deliver(&mut delegate);
        match (&event, until) {
            // A failed exchange transmit is still followed by the finish event.
            (
                PairingEvent::DidError {
                    error: ConnectionError::FailedToTransmitExchangeRecoveryKey,
                    ..
                },
                WaitFor::FinishedTransmitting,
            ) => failed = true,
            (PairingEvent::DidError { .. }, _) => {
                failed = true;
                break;
            }
            (PairingEvent::DidFinishTransmittingRecoveryKey, WaitFor::FinishedTransmitting)
            | (PairingEvent::DidCompleteLogin { .. }, WaitFor::LoggedIn) => break,
            _ => {}
        }
    }

    if failed {
        anyhow::bail!("Pairing did not complete");
    }
    Ok(())
}
