use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "10260".to_string());
    let username = std::env::var("DOCDB_USERNAME").unwrap_or_else(|_| docdb_mock::DEFAULT_USERNAME.to_string());
    let password = std::env::var("DOCDB_PASSWORD").unwrap_or_else(|_| docdb_mock::DEFAULT_PASSWORD.to_string());

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, user = %username, "DocumentDB mock API listening");
    docdb_mock::run_with(listener, docdb_mock::app_with_credentials(&username, &password)).await
}
