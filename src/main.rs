use chainkv::coordination::{Coordinator, HttpCoordinator};
use chainkv::membership::MembershipWatcher;
use chainkv::replica::handlers;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut listen_addr: Option<SocketAddr> = None;
    let mut advertise_addr: Option<SocketAddr> = None;
    let mut coord_url: Option<String> = None;
    let mut group_path: Option<String> = None;

    let mut i = 1;
    while i + 1 < args.len() {
        match args[i].as_str() {
            "--listen" => {
                listen_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--advertise" => {
                advertise_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--coord" => {
                coord_url = Some(args[i + 1].clone());
                i += 2;
            }
            "--group" => {
                group_path = Some(args[i + 1].clone());
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let (Some(listen_addr), Some(coord_url), Some(group_path)) =
        (listen_addr, coord_url, group_path)
    else {
        eprintln!(
            "Usage: {} --listen <addr:port> --coord <http://addr:port> --group </path> [--advertise <addr:port>]",
            args[0]
        );
        eprintln!(
            "Example: {} --listen 127.0.0.1:9090 --coord http://127.0.0.1:2181 --group /kv",
            args[0]
        );
        std::process::exit(1);
    };
    let advertise_addr = advertise_addr.unwrap_or(listen_addr);

    tracing::info!(
        "starting node on {} (advertising {})",
        listen_addr,
        advertise_addr
    );

    // 1. Coordination session. An unreachable service is fatal at startup.
    let coord: Arc<dyn Coordinator> = Arc::new(HttpCoordinator::connect(&coord_url).await?);

    // 2. Register and prepare role orchestration.
    let (watcher, handler) = MembershipWatcher::register(coord, group_path, advertise_addr).await?;

    // 3. RPC surface, served to clients and peers alike.
    let app = handlers::router(handler);

    // 4. The watcher runs beside the server; its fatal errors (e.g. own
    //    registration missing from the listing) take the process down.
    tokio::spawn(async move {
        if let Err(e) = watcher.run().await {
            tracing::error!("membership watcher failed: {}", e);
            std::process::exit(1);
        }
    });

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("serving on {}", listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
