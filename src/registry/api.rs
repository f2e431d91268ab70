// src/registry/api.rs

//! Catalog registry gRPC messages and client
//!
//! Mirrors the `api.Registry` service exposed by catalog registry servers.
//! Only the two calls needed for entity synchronization are provided:
//! `ListBundles` (server streaming) and `GetPackage` (unary).

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

/// Empty request for the full bundle listing
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListBundlesRequest {}

/// Request for one package by name
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPackageRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

/// API group/version/kind reference
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct GroupVersionKind {
    #[prost(string, tag = "1")]
    pub group: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(string, tag = "3")]
    pub kind: String,
    #[prost(string, tag = "4")]
    pub plural: String,
}

/// Legacy dependency declaration
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Dependency {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// Free-form bundle property
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Property {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// One bundle in one channel
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Bundle {
    #[prost(string, tag = "1")]
    pub csv_name: String,
    #[prost(string, tag = "2")]
    pub package_name: String,
    #[prost(string, tag = "3")]
    pub channel_name: String,
    #[prost(string, tag = "4")]
    pub csv_json: String,
    #[prost(string, repeated, tag = "5")]
    pub object: Vec<String>,
    #[prost(string, tag = "6")]
    pub bundle_path: String,
    #[prost(message, repeated, tag = "7")]
    pub provided_apis: Vec<GroupVersionKind>,
    #[prost(message, repeated, tag = "8")]
    pub required_apis: Vec<GroupVersionKind>,
    #[prost(string, tag = "9")]
    pub version: String,
    #[prost(string, tag = "10")]
    pub skip_range: String,
    #[prost(message, repeated, tag = "11")]
    pub dependencies: Vec<Dependency>,
    #[prost(message, repeated, tag = "12")]
    pub properties: Vec<Property>,
    #[prost(string, tag = "13")]
    pub replaces: String,
    #[prost(string, repeated, tag = "14")]
    pub skips: Vec<String>,
}

/// Channel head reference
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PackageChannel {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub csv_name: String,
}

/// Package metadata
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Package {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub channels: Vec<PackageChannel>,
    #[prost(string, tag = "3")]
    pub default_channel_name: String,
}

/// Thin client for the `api.Registry` service
#[derive(Debug, Clone)]
pub struct RegistryGrpcClient {
    inner: tonic::client::Grpc<Channel>,
}

impl RegistryGrpcClient {
    /// Wrap an established channel
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Stream every bundle served by the registry
    pub async fn list_bundles(
        &mut self,
        request: ListBundlesRequest,
    ) -> Result<tonic::codec::Streaming<Bundle>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/api.Registry/ListBundles");
        let response = self
            .inner
            .server_streaming(tonic::Request::new(request), path, codec)
            .await?;
        Ok(response.into_inner())
    }

    /// Fetch one package's channel metadata
    pub async fn get_package(
        &mut self,
        request: GetPackageRequest,
    ) -> Result<Package, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/api.Registry/GetPackage");
        let response = self
            .inner
            .unary(tonic::Request::new(request), path, codec)
            .await?;
        Ok(response.into_inner())
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("service was not ready: {e}")))
    }
}
