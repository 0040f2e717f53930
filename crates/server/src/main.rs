use clap::Parser;
use routeguide_server::{Handler, ServerConfig, serve};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,

    /// JSON feature dataset (defaults to the bundled dataset)
    #[arg(short, long)]
    features: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routeguide_server=info,routeguide=info,info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Reading config from {}", path.display());
            ServerConfig::from_path(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(features) = args.features {
        config = config.with_features_path(features);
    }

    match &config.features_path {
        Some(path) => info!("Loading features from {}", path.display()),
        None => info!("Loading bundled features"),
    };
    let store = config.load_features()?;
    info!("Serving {} features", store.len());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl_c signal: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    serve(
        listener,
        Handler::new(Arc::new(store)),
        config.transport,
        Box::pin(shutdown),
    )
    .await?;

    Ok(())
}
