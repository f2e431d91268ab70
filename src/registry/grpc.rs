// src/registry/grpc.rs

//! gRPC registry client
//!
//! Connections are established with a readiness timeout and, unless disabled,
//! kept in a pool keyed by address. A pooled channel is evicted as soon as an
//! RPC over it fails, so the next sync reconnects from scratch.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::BoxStream;
use hyper_util::rt::TokioIo;
use tonic::transport::{Channel, Endpoint, Uri};
use tracing::{debug, info, warn};

use super::api::{Bundle, GetPackageRequest, ListBundlesRequest, Package, RegistryGrpcClient};
use super::proxy::{self, ProxyConfig};
use super::{RegistryApi, RegistryClient, fetch_entities};
use crate::catalog::CatalogSource;
use crate::entity::Entity;
use crate::error::{Error, Result};

/// Readiness timeout used when none (or zero) is configured
pub const DEFAULT_GRPC_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Registry client speaking the catalog registry gRPC API
pub struct GrpcRegistryClient {
    timeout: Duration,
    reuse_connections: bool,
    proxy: ProxyConfig,
    pool: DashMap<String, Channel>,
}

impl GrpcRegistryClient {
    /// Create a client; a zero timeout means [`DEFAULT_GRPC_TIMEOUT`]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: if timeout.is_zero() {
                DEFAULT_GRPC_TIMEOUT
            } else {
                timeout
            },
            reuse_connections: true,
            proxy: ProxyConfig::from_env(),
            pool: DashMap::new(),
        }
    }

    /// Enable or disable keeping channels between syncs
    pub fn with_connection_reuse(mut self, reuse: bool) -> Self {
        self.reuse_connections = reuse;
        self
    }

    /// Override the proxy settings read from the environment
    pub fn with_proxy_config(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    /// Effective readiness timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of pooled channels
    pub fn pooled_connections(&self) -> usize {
        self.pool.len()
    }

    async fn channel(&self, address: &str) -> Result<Channel> {
        if self.reuse_connections {
            if let Some(channel) = self.pool.get(address) {
                debug!(address, "Reusing registry connection");
                return Ok(channel.value().clone());
            }
        }

        let channel = self.connect(address).await?;
        if self.reuse_connections {
            self.pool.insert(address.to_string(), channel.clone());
        }
        Ok(channel)
    }

    async fn connect(&self, address: &str) -> Result<Channel> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| Error::Connection(format!("{address}: {e}")))?
            .connect_timeout(self.timeout);
        let proxy_url = self.proxy.proxy_for(address)?;

        let connecting = async {
            match proxy_url {
                Some(proxy_url) => {
                    info!(address, proxy = %proxy_url, "Connecting to registry through proxy");
                    let target = address.to_string();
                    let connector = tower::service_fn(move |_: Uri| {
                        let proxy_url = proxy_url.clone();
                        let target = target.clone();
                        async move {
                            let stream = proxy::connect_via_proxy(&proxy_url, &target).await?;
                            Ok::<_, std::io::Error>(TokioIo::new(stream))
                        }
                    });
                    endpoint.connect_with_connector(connector).await
                }
                None => endpoint.connect().await,
            }
        };

        match tokio::time::timeout(self.timeout, connecting).await {
            Ok(Ok(channel)) => {
                debug!(address, "Registry connection ready");
                Ok(channel)
            }
            Ok(Err(e)) => Err(Error::Connection(format!("{address}: {e}"))),
            Err(_) => Err(Error::Timeout {
                address: address.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    fn evict(&self, address: &str) {
        if self.pool.remove(address).is_some() {
            warn!(address, "Evicted registry connection after failed request");
        }
    }
}

impl Default for GrpcRegistryClient {
    fn default() -> Self {
        Self::new(DEFAULT_GRPC_TIMEOUT)
    }
}

#[async_trait]
impl RegistryClient for GrpcRegistryClient {
    async fn list_entities(&self, source: &CatalogSource) -> Result<Vec<Entity>> {
        let address = source.registry_address().ok_or_else(|| {
            Error::Connection(format!(
                "catalog source {} has no registry address",
                source.key()
            ))
        })?;

        let channel = self.channel(&address).await?;
        let mut client = RegistryGrpcClient::new(channel);
        let result = fetch_entities(&mut client, &source.key()).await;

        if let Err(Error::Rpc(_)) = &result {
            self.evict(&address);
        }
        result
    }
}

#[async_trait]
impl RegistryApi for RegistryGrpcClient {
    async fn list_bundles(&mut self) -> Result<BoxStream<'static, Result<Bundle>>> {
        let stream = RegistryGrpcClient::list_bundles(self, ListBundlesRequest {}).await?;
        Ok(stream.map(|bundle| bundle.map_err(Error::from)).boxed())
    }

    async fn get_package(&mut self, name: &str) -> Result<Package> {
        let request = GetPackageRequest {
            name: name.to_string(),
        };
        Ok(RegistryGrpcClient::get_package(self, request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_uses_default() {
        assert_eq!(
            GrpcRegistryClient::new(Duration::ZERO).timeout(),
            DEFAULT_GRPC_TIMEOUT
        );
        assert_eq!(
            GrpcRegistryClient::new(Duration::from_secs(5)).timeout(),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_missing_address() {
        let client = GrpcRegistryClient::default().with_proxy_config(ProxyConfig::disabled());
        let err = client
            .list_entities(&CatalogSource::new("local", "olm", ""))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GRPC connection failed: catalog source olm/local has no registry address"
        );
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_not_pooled() {
        // Bind then drop to get a local port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = GrpcRegistryClient::new(Duration::from_secs(5))
            .with_proxy_config(ProxyConfig::disabled());
        let err = client
            .list_entities(&CatalogSource::new("down", "olm", address))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_) | Error::Timeout { .. }));
        assert_eq!(client.pooled_connections(), 0);
    }
}
