//! Transport builder for creating memory transport nodes.
//!
//! Provides a fluent builder API with clear separation between required and
//! optional configuration. Validation happens in [`TransportBuilder::build`].

use std::sync::Arc;

use crate::transport::{create_memory_transport_with_hub, global_hub};
use crate::{EndpointId, EndpointInfo, MemoryHub, MemoryTransport, Result, RpcError, TransportConfig};

/// Realm used when none is configured.
pub const DEFAULT_REALM: &str = "default";

/// Builder for memory transport nodes.
///
/// The returned `Arc<MemoryTransport>` coerces to both
/// [`TransportPtr`](crate::TransportPtr) and
/// [`DirectoryPtr`](crate::DirectoryPtr).
///
/// # Examples
///
/// ## Endpoint-less context (background page)
/// ```no_run
/// use chan_rpc::TransportBuilder;
///
/// # async fn example() -> chan_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .node_id("background")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Addressable endpoint (tab)
/// ```no_run
/// use chan_rpc::{MemoryHub, TransportBuilder};
///
/// # async fn example() -> chan_rpc::Result<()> {
/// let hub = MemoryHub::new();
///
/// let tab = TransportBuilder::new()
///     .node_id("tab-7")
///     .realm("my-extension")
///     .endpoint(7)
///     .url("https://example.org/")
///     .active(true)
///     .hub(hub)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct TransportBuilder {
    node_id: Option<String>,
    realm: Option<String>,
    endpoint: Option<EndpointId>,
    url: Option<String>,
    active: Option<bool>,
    hub: Option<Arc<MemoryHub>>,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node ID (required). Must be unique on the hub.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set the realm the node joins.
    ///
    /// Default: [`DEFAULT_REALM`].
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Make the node an addressable endpoint.
    ///
    /// Endpoint nodes receive only explicitly addressed traffic, never
    /// messages sent to the default destination.
    pub fn endpoint(mut self, id: impl Into<EndpointId>) -> Self {
        self.endpoint = Some(id.into());
        self
    }

    /// Url advertised to endpoint queries. Requires [`endpoint`](Self::endpoint).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Active flag advertised to endpoint queries. Requires
    /// [`endpoint`](Self::endpoint).
    ///
    /// Default: `false`.
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Attach to `hub` instead of the process-global hub.
    ///
    /// Tests should use one hub each so they can run in parallel.
    pub fn hub(mut self, hub: Arc<MemoryHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `node_id` is missing
    /// - `url` or `active` is set without an `endpoint`
    /// - the node id, or the endpoint id within the realm, is already attached
    pub async fn build(self) -> Result<Arc<MemoryTransport>> {
        // ---
        let node_id = self
            .node_id
            .ok_or_else(|| RpcError::MissingConfig("node_id".into()))?;

        if self.endpoint.is_none() && (self.url.is_some() || self.active.is_some()) {
            return Err(RpcError::ConfigConflict(
                "url and active describe an endpoint; set endpoint() as well".into(),
            ));
        }

        let config = TransportConfig {
            node_id,
            realm: self.realm.unwrap_or_else(|| DEFAULT_REALM.to_string()),
            endpoint: self.endpoint,
            info: EndpointInfo {
                url: self.url,
                active: self.active.unwrap_or(false),
            },
        };

        let hub = self.hub.unwrap_or_else(global_hub);
        create_memory_transport_with_hub(config, hub).await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Transport;

    #[tokio::test]
    async fn test_defaults() {
        // ---
        let transport = TransportBuilder::new()
            .node_id("n")
            .hub(MemoryHub::new())
            .build()
            .await
            .unwrap();

        assert_eq!(transport.transport_id(), "n");
        assert_eq!(transport.realm(), DEFAULT_REALM);
        assert_eq!(transport.base().endpoint, None);
    }

    #[tokio::test]
    async fn test_missing_node_id() {
        // ---
        let err = TransportBuilder::new().build().await.err().unwrap();
        assert!(matches!(err, RpcError::MissingConfig(ref f) if f == "node_id"), "{err}");
    }

    #[tokio::test]
    async fn test_endpoint_attributes_need_endpoint() {
        // ---
        let err = TransportBuilder::new()
            .node_id("n")
            .url("https://example.org")
            .hub(MemoryHub::new())
            .build()
            .await
            .err()
            .unwrap();

        assert!(matches!(err, RpcError::ConfigConflict(_)), "{err}");
    }
}
