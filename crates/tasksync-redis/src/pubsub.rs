//! Redis pub/sub primitives.
//!
//! Publishing goes through the multiplexed pool. Subscribing opens a
//! dedicated connection that stays in subscriber mode for its lifetime.

use futures::{Stream, StreamExt};

use crate::client::{RedisError, RedisPool, RedisResult};
use redis::{AsyncCommands, Msg};

/// Publish a payload on a channel. Returns how many subscribers received it.
pub async fn publish(pool: &RedisPool, channel: &str, payload: &str) -> RedisResult<i64> {
    let mut conn = pool.clone();
    let receivers: i64 = conn.publish(channel, payload).await?;
    Ok(receivers)
}

/// Subscribe to a channel.
///
/// The returned stream yields one item per message and ends when the
/// underlying connection drops. It cannot be restarted. A message whose
/// payload is not UTF-8 comes through as [`RedisError::Payload`] and does
/// not end the stream.
pub async fn subscribe(
    client: &redis::Client,
    channel: &str,
) -> RedisResult<impl Stream<Item = RedisResult<String>> + Send + 'static> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    tracing::debug!(channel, "Subscribed to Redis channel");
    Ok(pubsub.into_on_message().map(|msg| decode_message(&msg)))
}

fn decode_message(msg: &Msg) -> RedisResult<String> {
    msg.get_payload::<String>().map_err(|e| RedisError::Payload {
        channel: msg.get_channel_name().to_string(),
        reason: e.to_string(),
    })
}
