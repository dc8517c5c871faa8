use std::net::SocketAddr;
use std::sync::Arc;

use webhook_store::{http_server, KvStore, MemoryKv, StoreConfig, WebhookStore};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_store=info".into()),
        )
        .init();

    let config = StoreConfig::from_env()?;
    let addr: SocketAddr = std::env::var("WEBHOOK_BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()?;

    let kv = connect_backend().await?;
    tracing::info!(
        default_ttl = config.default_ttl,
        max_payload_bytes = config.max_payload_bytes,
        total_payload_limit = config.total_payload_limit,
        "store configured"
    );

    let store = Arc::new(WebhookStore::new(kv, config));
    http_server::serve(store, addr).await?;
    Ok(())
}

#[cfg(feature = "redis")]
async fn connect_backend() -> Result<Arc<dyn KvStore>, Box<dyn std::error::Error>> {
    match std::env::var("REDIS_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let kv = webhook_store::kv::RedisKv::connect(url.trim()).await?;
            tracing::info!("using redis backend");
            Ok(Arc::new(kv))
        }
        _ => Ok(in_process()),
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_backend() -> Result<Arc<dyn KvStore>, Box<dyn std::error::Error>> {
    Ok(in_process())
}

fn in_process() -> Arc<dyn KvStore> {
    tracing::warn!("using in-process backend; data is lost on restart");
    Arc::new(MemoryKv::new())
}
