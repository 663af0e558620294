//! Remote client facade over a single node or a cluster

use redis::aio::{ConnectionManager, PubSubSink, PubSubStream};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::FromRedisValue;
use std::collections::HashMap;

use crate::config::Endpoint;
use crate::error::CacheError;

/// The multiplexed command connection
#[derive(Clone)]
enum RemoteConnection {
  Single(ConnectionManager),
  Cluster(ClusterConnection),
}

/// Facade over the remote backend. Hides whether commands and subscriptions
/// share a connection: single-node mode opens a dedicated subscription
/// connection, cluster mode subscribes through the first endpoint because
/// the cluster connection multiplexes commands only.
#[derive(Clone)]
pub struct RemoteClient {
  conn: RemoteConnection,
  subscription_source: redis::Client,
}

impl RemoteClient {
  /// Connect to a single node
  pub async fn connect_single(endpoint: &Endpoint) -> Result<Self, CacheError> {
    let client = redis::Client::open(endpoint.connection_url())?;
    let conn = ConnectionManager::new(client.clone()).await?;
    tracing::debug!("Connected to {} (single-node mode)", endpoint.connection_url());
    Ok(Self {
      conn: RemoteConnection::Single(conn),
      subscription_source: client,
    })
  }

  /// Connect to a cluster
  pub async fn connect_cluster(endpoints: &[Endpoint]) -> Result<Self, CacheError> {
    let urls: Vec<String> = endpoints.iter().map(Endpoint::connection_url).collect();
    let first = endpoints
      .first()
      .ok_or_else(|| CacheError::InvalidArgument("cluster requires at least one endpoint".to_string()))?;

    let client = ClusterClient::new(urls.clone())?;
    let conn = client.get_async_connection().await?;
    let subscription_source = redis::Client::open(first.connection_url())?;
    tracing::debug!("Connected to {} cluster endpoints", urls.len());
    Ok(Self {
      conn: RemoteConnection::Cluster(conn),
      subscription_source,
    })
  }

  fn is_cluster(&self) -> bool {
    matches!(self.conn, RemoteConnection::Cluster(_))
  }

  async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, CacheError> {
    match self.conn.clone() {
      RemoteConnection::Single(mut conn) => Ok(cmd.query_async(&mut conn).await?),
      RemoteConnection::Cluster(mut conn) => Ok(cmd.query_async(&mut conn).await?),
    }
  }

  async fn run_pipeline(&self, pipe: &redis::Pipeline) -> Result<(), CacheError> {
    match self.conn.clone() {
      RemoteConnection::Single(mut conn) => Ok(pipe.query_async(&mut conn).await?),
      RemoteConnection::Cluster(mut conn) => Ok(pipe.query_async(&mut conn).await?),
    }
  }

  /// Test the connection
  pub async fn ping(&self) -> Result<(), CacheError> {
    self.query::<()>(&redis::cmd("PING")).await
  }

  pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
    self.query(redis::cmd("GET").arg(key)).await
  }

  pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
    self.query(redis::cmd("HGETALL").arg(key)).await
  }

  /// Delete one or more keys. Cluster mode deletes key by key because a
  /// multi-key DEL can cross hash slots.
  pub async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
    if keys.is_empty() {
      return Ok(());
    }
    if self.is_cluster() {
      for key in keys {
        self.query::<()>(redis::cmd("DEL").arg(key)).await?;
      }
      return Ok(());
    }
    self.query::<()>(redis::cmd("DEL").arg(keys)).await
  }

  /// Atomic DEL + SET + optional EXPIRE for a scalar payload
  pub async fn write_scalar(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
    let mut pipe = redis::pipe();
    pipe.atomic().del(key).ignore().set(key, value).ignore();
    if ttl_secs > 0 {
      pipe.expire(key, ttl_secs as i64).ignore();
    }
    self.run_pipeline(&pipe).await
  }

  /// Atomic DEL + HMSET + optional EXPIRE for a hash payload
  pub async fn write_hash(
    &self,
    key: &str,
    fields: &[(String, String)],
    ttl_secs: u64,
  ) -> Result<(), CacheError> {
    let mut pipe = redis::pipe();
    pipe
      .atomic()
      .del(key)
      .ignore()
      .hset_multiple(key, fields)
      .ignore();
    if ttl_secs > 0 {
      pipe.expire(key, ttl_secs as i64).ignore();
    }
    self.run_pipeline(&pipe).await
  }

  /// One SCAN step; a returned cursor of 0 terminates iteration
  pub async fn scan(
    &self,
    cursor: u64,
    pattern: &str,
    count: usize,
  ) -> Result<(u64, Vec<String>), CacheError> {
    self
      .query(
        redis::cmd("SCAN")
          .arg(cursor)
          .arg("MATCH")
          .arg(pattern)
          .arg("COUNT")
          .arg(count),
      )
      .await
  }

  /// Ask the server to emit keyspace events for all operations
  pub async fn enable_keyspace_events(&self) -> Result<(), CacheError> {
    self
      .query::<()>(
        redis::cmd("CONFIG")
          .arg("SET")
          .arg("notify-keyspace-events")
          .arg("KEA"),
      )
      .await
  }

  /// Open the subscription connection and split it into the sink used for
  /// subscribe/unsubscribe and the inbound message stream
  pub async fn open_subscription(&self) -> Result<(PubSubSink, PubSubStream), CacheError> {
    let pubsub = self.subscription_source.get_async_pubsub().await?;
    Ok(pubsub.split())
  }
}
