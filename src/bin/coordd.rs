use chainkv::coordination::CoordServer;
use chainkv::coordination::server::DEFAULT_SESSION_TTL;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut bind_addr: Option<SocketAddr> = None;
    let mut i = 1;
    while i + 1 < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let Some(bind_addr) = bind_addr else {
        eprintln!("Usage: {} --bind <addr:port>", args[0]);
        eprintln!("Example: {} --bind 127.0.0.1:2181", args[0]);
        std::process::exit(1);
    };

    let server = CoordServer::new(DEFAULT_SESSION_TTL);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("coordination daemon listening on {}", bind_addr);
    axum::serve(listener, server.router()).await?;

    Ok(())
}
