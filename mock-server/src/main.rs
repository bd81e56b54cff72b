use tokio::net::TcpListener;

/// Serves the fake API on `127.0.0.1:$PORT` (default 3000) for manual runs
/// against the client.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("mock API listening on http://{addr} (bearer token {})", mock_server::TX_TOKEN);
    mock_server::run(listener).await
}
