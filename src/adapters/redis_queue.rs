use async_trait::async_trait;
use std::time::Duration;

use crate::ports::{MessageQueue, QueuePublisher, QueueResult};

/// Redis list queues: producers `LPUSH`, consumers `BRPOP`, so each list is FIFO.
#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn len(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len = redis::cmd("LLEN")
            .arg(queue)
            .query_async::<_, usize>(&mut conn)
            .await?;
        Ok(len)
    }
}

#[async_trait]
impl QueuePublisher for RedisQueue {
    async fn publish(&self, queue: &str, message: &serde_json::Value) -> QueueResult<()> {
        let raw = serde_json::to_string(message)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(raw)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn receive(&self, queue: &str, wait: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let popped = redis::cmd("BRPOP")
            .arg(queue)
            .arg(wait.as_secs().max(1))
            .query_async::<_, Option<(String, String)>>(&mut conn)
            .await?;
        Ok(popped.map(|(_, raw)| raw))
    }
}
