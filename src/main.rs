mod agent;
mod auth;
mod config;
mod dispatch;
mod mqtt;
mod panel;
mod signal;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::panel::{SignalsPanel, StderrNotifier};
use crate::signal::{Signal, SignalCatalog};
use crate::store::{ConfigStore, FileStore, KEY_DEVICE_ID, KEY_ENDPOINT, SubmitEvent};

/// Remote-control signal sender and device agent.
#[derive(Debug, Parser)]
#[command(name = "remocon", version)]
struct Cli {
    /// File the endpoint and device id are persisted in.
    #[arg(long, env = "REMOCON_STORE", default_value = "remocon.json", global = true)]
    store: PathBuf,

    /// Request timeout in seconds. Requests never time out when unset.
    #[arg(long, env = "REMOCON_TIMEOUT_SECS", global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(flatten)]
    Panel(PanelCommand),
    /// Run the device agent: forward broker commands to a local endpoint.
    Agent,
}

#[derive(Debug, Subcommand)]
enum PanelCommand {
    /// Print the signal catalog.
    Signals,
    /// Save the endpoint URL and device id.
    Configure(ConfigureArgs),
    /// Show the saved endpoint URL and device id.
    Show,
    /// Send a signal to the saved endpoint.
    Send(SendArgs),
}

#[derive(Debug, Args)]
struct ConfigureArgs {
    #[arg(long)]
    endpoint: String,
    #[arg(long)]
    device_id: String,
}

#[derive(Debug, Args)]
struct SendArgs {
    remote: String,
    name: String,
    #[arg(long)]
    duration: Option<i64>,
    /// Exit non-zero when the send fails.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Agent => run_agent(cli.timeout).await,
        Command::Panel(command) => run_panel(cli.store, cli.timeout, command).await,
    };
    std::process::exit(code);
}

async fn run_panel(store: PathBuf, timeout: Option<u64>, command: PanelCommand) -> i32 {
    let dispatcher = match dispatch::Dispatcher::with_timeout(timeout.map(Duration::from_secs)) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return 1;
        }
    };
    let panel = SignalsPanel::mount(
        SignalCatalog::builtin(),
        FileStore::new(store),
        dispatcher,
        StderrNotifier,
    );

    match command {
        PanelCommand::Signals => match serde_json::to_string_pretty(panel.api()) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                error!("Failed to render catalog: {}", e);
                1
            }
        },
        PanelCommand::Configure(args) => {
            let mut event = SubmitEvent::new(args.endpoint, args.device_id);
            match panel.store_endpoint(&mut event) {
                Ok(()) => {
                    info!("Saved settings to {}", panel.store().path().display());
                    0
                }
                Err(e) => {
                    error!("{}", e);
                    1
                }
            }
        }
        PanelCommand::Show => {
            let store = panel.store();
            for key in [KEY_ENDPOINT, KEY_DEVICE_ID] {
                let value = store.get(key).unwrap_or_else(|| "<unset>".to_string());
                println!("{key}: {value}");
            }
            0
        }
        PanelCommand::Send(args) => {
            let item = match panel.api().find(&args.remote, &args.name) {
                Some(signal) => signal.clone(),
                None => {
                    warn!("{}/{} is not in the catalog", args.remote, args.name);
                    Signal::new(args.remote, args.name)
                }
            };
            match panel.send(&item, args.duration).await {
                Some(_) => 0,
                None if args.strict => 1,
                None => 0,
            }
        }
    }
}

async fn run_agent(timeout: Option<u64>) -> i32 {
    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return 1;
        }
    };

    info!(
        "Starting remocon agent (broker={}:{}, client_id={})",
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        config.client_id(),
    );

    let signer = match auth::TokenSigner::from_pem_file(
        &config.mqtt.private_key_file,
        &config.device.project_id,
        config.jwt_lifetime(),
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let mqtt_client = match mqtt::client::MqttClient::new(&config, signer) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };
    let handle = mqtt_client.handle();

    let (message_tx, mut message_rx) = mpsc::channel::<mqtt::MqttMessage>(100);
    let mut mqtt_handle = tokio::spawn(async move {
        mqtt_client.run(message_tx).await;
    });

    let forwarder = match agent::Forwarder::with_timeout(
        config.forward.endpoint.clone(),
        timeout.map(Duration::from_secs),
    ) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            mqtt_handle.abort();
            return 1;
        }
    };
    let agent = agent::Agent::new(config.device.device_id.clone(), forwarder);

    let mut sigterm = match tokio::signal::unix::signal(
        tokio::signal::unix::SignalKind::terminate(),
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            mqtt_handle.abort();
            return 1;
        }
    };

    loop {
        tokio::select! {
            Some(msg) = message_rx.recv() => {
                agent.handle(msg);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    let state_topic = mqtt::state_topic(&config.device.device_id);
    if let Err(e) = handle
        .publish(&state_topic, rumqttc::QoS::AtLeastOnce, false, "stopped")
        .await
    {
        warn!("Failed to publish stopped state: {}", e);
    }
    if let Err(e) = handle.disconnect().await {
        warn!("Failed to request disconnect: {}", e);
    }
    if tokio::time::timeout(Duration::from_millis(250), &mut mqtt_handle)
        .await
        .is_err()
    {
        mqtt_handle.abort();
    }

    info!("remocon agent stopped");
    0
}
