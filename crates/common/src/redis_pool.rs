use redis::Client;
use redis::aio::ConnectionManager;

/// Open a Redis client and a connection manager for async commands.
///
/// The client is kept alongside the manager because pub/sub listeners need a
/// dedicated connection of their own.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<(Client, ConnectionManager)> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client.clone()).await?;

    tracing::info!("Connected to Redis");
    Ok((client, manager))
}
