use std::io::Write;

use clap::Parser;
use futures_util::StreamExt;
use tracing::info;

use wayfinder::{Gateway, RequestOptions, WayfinderClientBuilder, WayfinderConfig};

#[derive(Parser, Debug)]
#[command(name = "wayfinder", version, about = "Fetch and verify an ar:// address")]
struct Cli {
    /// ar://<txId or ArNS name>[/path] address to fetch
    uri: String,

    /// Gateway URLs to route through, comma-separated
    #[arg(long, default_value = "https://arweave.net", value_delimiter = ',')]
    gateway: Vec<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON instead of plain text
    #[arg(long)]
    json_logs: bool,

    /// Fail the fetch outright if verification fails, instead of delivering
    /// the bytes with a warning
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    wayfinder_observability::init(cli.json_logs, &cli.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "wayfinder starting");

    let gateways: Vec<Gateway> = cli
        .gateway
        .iter()
        .map(|url| Gateway::parse(url))
        .collect::<Result<_, _>>()
        .map_err(anyhow::Error::msg)?;

    let config = WayfinderConfig::from_env().unwrap_or_default();
    let client = WayfinderClientBuilder::default()
        .with_static_gateways(gateways)
        .with_config(config)
        .build()?;

    let opts = RequestOptions {
        strict: Some(cli.strict),
        ..Default::default()
    };

    info!(uri = %cli.uri, "routing request");
    let mut response = client.request(&cli.uri, opts).await?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    while let Some(chunk) = response.body.next().await {
        handle.write_all(&chunk?)?;
    }
    handle.flush()?;

    info!(status = response.status, gateway = %response.gateway, "request complete");
    Ok(())
}
