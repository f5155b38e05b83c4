use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, error::ErrorKind};
use tcp_bouncer::{Config, Server};
use tracing::info;

/// tcp-bouncer: transparent TCP forwarder
#[derive(Parser, Debug)]
#[command(
    name = "tcp-bouncer",
    version,
    about = "Transparent TCP forwarder with an optional shared-secret gate"
)]
struct Cli {
    /// Address to accept connections on, e.g. 127.0.0.1:8080
    listen_addr: String,

    /// Address every connection is forwarded to, e.g. 192.168.0.1:80
    remote_addr: String,

    /// Secret a new client IP must send once before it is forwarded
    #[arg(allow_hyphen_values = true)]
    secret: Option<String>,
}

fn print_usage() {
    let usage = Cli::command().render_usage();
    println!("{usage}\nEg:\n  tcp-bouncer 127.0.0.1:8080 192.168.0.1:80 [SECRET]");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => {
            print_usage();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt::init();

    let config = Config::new(cli.listen_addr, cli.remote_addr, cli.secret);
    info!(
        listen_addr = %config.listen_addr,
        remote_addr = %config.remote_addr,
        auth_enabled = config.auth_enabled(),
        "Configuration loaded"
    );

    let server = Server::new(config);
    let listener = server.bind().await?;

    let local_addr = listener
        .local_addr()
        .context("Failed to get listener local address")?;
    info!(listen_addr = %local_addr, "TCP bouncer listening");

    tokio::select! {
        () = server.serve(listener) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}
