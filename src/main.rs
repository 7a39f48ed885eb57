use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fcm_client::config::Configuration;
use fcm_client::controller::{PageController, TOKEN_ERROR_MESSAGE};
use fcm_client::environment::{HostEnvironment, PermissionPolicy, SystemClipboard};
use fcm_client::gateway::MessagingGateway;
use fcm_client::logging::{init_logging, LogError};
use fcm_client::loopback::LoopbackBackend;
use fcm_client::notification::TracingNotificationSurface;
use fcm_client::server::serve;
use fcm_client::worker::WorkerHost;
use tokio::io::BufReader;

#[derive(Parser)]
struct Opts {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Serve the page over HTTP; stdin drives the loopback transport.
    Serve {
        #[clap(short, long)]
        port: Option<u16>,

        #[clap(long, value_enum, default_value = "grant")]
        permission: PermissionPolicy,
    },
    /// Request a registration token and print it.
    Token {
        #[clap(long, value_enum, default_value = "ask")]
        permission: PermissionPolicy,
    },
    /// Show which credentials are configured.
    Status,
}

fn gateway(
    config: &Configuration,
    backend: &LoopbackBackend,
    permission: PermissionPolicy,
) -> Arc<MessagingGateway> {
    let environment = Arc::new(HostEnvironment::new(permission));
    Arc::new(MessagingGateway::initialize(config, backend, environment))
}

async fn run_token(config: Configuration, permission: PermissionPolicy) -> Result<()> {
    let backend = LoopbackBackend::new();
    let gateway = gateway(&config, &backend, permission);

    match gateway.request_permission().await? {
        Some(token) => {
            println!("{}", token);
            Ok(())
        }
        None => anyhow::bail!(TOKEN_ERROR_MESSAGE),
    }
}

/// In `serve`, stdin carries transport commands, so it cannot also answer
/// the permission prompt.
fn serve_permission(permission: PermissionPolicy) -> Result<PermissionPolicy> {
    if permission == PermissionPolicy::Ask {
        anyhow::bail!("--permission ask is not available with serve, use grant or deny");
    }

    Ok(permission)
}

async fn run_serve(
    config: Configuration,
    port: Option<u16>,
    permission: PermissionPolicy,
) -> Result<()> {
    let permission = serve_permission(permission)?;
    let backend = LoopbackBackend::new();
    let gateway = gateway(&config, &backend, permission);
    let workers = WorkerHost::new(
        Arc::new(backend.new_context()),
        Arc::new(TracingNotificationSurface),
    );
    let controller = Arc::new(PageController::new(
        gateway,
        config,
        workers,
        Arc::new(SystemClipboard),
    ));

    controller.mount().await;

    tokio::spawn(async move {
        backend
            .feed(BufReader::new(tokio::io::stdin()))
            .await
            .log_error("Reading transport commands failed");
    });

    serve(port, controller).await
}

fn print_status(config: &Configuration) {
    for status in config.status() {
        let mark = if status.is_set { "set" } else { "missing" };
        println!("{}: {}", status.label, mark);
    }

    if let Err(missing) = config.validate() {
        println!("Missing credentials: {}", missing.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let opts = Opts::parse();
    let config = Configuration::from_env();

    match opts.subcmd {
        SubCommand::Serve { port, permission } => {
            run_serve(config, port, permission).await?;
        }
        SubCommand::Token { permission } => {
            run_token(config, permission).await?;
        }
        SubCommand::Status => print_status(&config),
    }

    Ok(())
}
