use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use store_common::config::LocalConfig;
use tracing::info;

mod bucket_ops;
mod election;
mod forward;
mod http_server;
mod keepalive;
mod metasync;
mod routing;
mod runner;
mod txn_coordinator;

use keepalive::KeepaliveTracker;
use runner::ProxyRunner;

#[derive(Debug, Parser)]
#[command(version)]
struct Opt {
    /// Path to this node's local config file (`local.json`-style).
    #[arg(long, short, default_value = "local.json")]
    config: String,

    /// Address to bind the `/v1` HTTP server on.
    #[arg(long, default_value = "0.0.0.0:51080")]
    bind: SocketAddr,

    /// Opentelemetry endpoint (http://ip:port)
    #[arg(long)]
    otlp_endpoint: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    store_common::logging::setup_tracing(opt.otlp_endpoint.as_deref(), "store-proxy")?;

    let local = LocalConfig::load(&opt.config)?;
    let runner = ProxyRunner::init(local).await?;
    let tracker = Arc::new(KeepaliveTracker::new());

    info!(node = %runner.node.id, primary = runner.is_primary(), "proxy starting");

    let keepalive_task = tokio::spawn(keepalive::run(runner.clone(), tracker.clone()));
    let txn_gc_task = tokio::spawn(run_txn_gc(runner.clone()));

    let serve_result = http_server::serve(runner.clone(), tracker.clone(), opt.bind);

    tokio::select! {
        res = serve_result => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    runner.request_stop();
    keepalive_task.abort();
    txn_gc_task.abort();
    Ok(())
}

/// Periodically clears txns past `max_host_busy` with no commit (spec
/// §4.6 invariant: "begin without a subsequent commit or abort within
/// max_host_busy is garbage-collected").
async fn run_txn_gc(runner: Arc<ProxyRunner>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    loop {
        ticker.tick().await;
        if runner.is_stopping() {
            return;
        }
        let max_host_busy = runner.config.get().timeouts.max_host_busy();
        runner.txns.gc_expired(max_host_busy).await;
    }
}
