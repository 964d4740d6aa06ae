use std::net::IpAddr;

use clap::Parser;
use tracing::info;

use cors_relay::RelayConfig;

/// Forwarding relay that lets browser code reach third-party origins.
#[derive(Debug, Parser)]
#[command(name = "cors-relay", version, about)]
struct Args {
    /// Listen port
    #[arg(long, short, default_value_t = 3001, env = "PORT")]
    port: u16,

    /// Listen address
    #[arg(long, default_value = "127.0.0.1", env = "BIND_ADDR")]
    bind: IpAddr,

    /// Path prefix relayed requests are served under
    #[arg(long, default_value = "proxy", env = "MOUNT_PATH")]
    mount_path: String,

    /// Accept invalid upstream TLS certificates (self-signed origins).
    /// Weakens transport security toward the upstream.
    #[arg(long, env = "INSECURE_UPSTREAM_TLS")]
    insecure: bool,

    /// Seconds allowed to connect to an upstream
    #[arg(long, default_value_t = 10, env = "CONNECT_TIMEOUT")]
    connect_timeout: u64,

    /// Seconds allowed for an upstream to start responding
    #[arg(long, default_value_t = 30, env = "RESPONSE_TIMEOUT")]
    response_timeout: u64,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind_addr: self.bind,
            port: self.port,
            mount_path: self.mount_path,
            insecure_upstream_tls: self.insecure,
            connect_timeout_secs: self.connect_timeout,
            response_timeout_secs: self.response_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cors_relay::logging::init_tracing("cors_relay=info,tower_http=info", args.log_json);

    let config = args.into_config();
    config.validate()?;
    let listener = cors_relay::bind(&config).await?;
    let addr = listener.local_addr()?;

    info!("Proxy server running on http://{}", addr);
    info!(
        "Use endpoint: http://{}/{}?target=YOUR_TARGET_URL",
        addr,
        config.mount()
    );

    cors_relay::serve_with_shutdown(listener, config, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Proxy server shutting down");
    }
}
