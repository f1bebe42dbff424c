use slither_server::{ServerError, SlitherServer};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slither_server=debug,slither_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("SLITHER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let server = SlitherServer::builder().bind(&addr).build().await?;
    server.run().await
}
