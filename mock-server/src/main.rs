use mock_server::Account;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let username = std::env::var("PINRY_USER").unwrap_or_else(|_| "yizmeng".to_string());
    let token = std::env::var("PINRY_TOKEN").unwrap_or_else(|_| "secret-token".to_string());

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %username, "listening");
    mock_server::run_with_accounts(listener, vec![Account::new(&username, &token)]).await
}
