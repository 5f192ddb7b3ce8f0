//! Requester builder.
//!
//! Provides a fluent builder API for configuring where a [`Requester`]
//! sends its calls: the default destination, the default context of another
//! realm, or a broadcast to every endpoint matching a [`TargetQuery`].

use crate::client::Fanout;
use crate::{Destination, DirectoryPtr, Requester, Result, RpcError, TargetQuery, TransportPtr};

/// Builder for [`Requester`] instances.
///
/// # Examples
///
/// ## Point-to-point
/// ```no_run
/// use chan_rpc::{RequesterBuilder, TransportBuilder};
///
/// # async fn example() -> chan_rpc::Result<()> {
/// let transport = TransportBuilder::new().node_id("popup").build().await?;
///
/// let requester = RequesterBuilder::new(transport).channel("ext").build()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Broadcast to active endpoints
/// ```no_run
/// use chan_rpc::{RequesterBuilder, TargetQuery, TransportBuilder};
///
/// # async fn example() -> chan_rpc::Result<()> {
/// let transport = TransportBuilder::new().node_id("background").build().await?;
///
/// let requester = RequesterBuilder::new(transport.clone())
///     .channel("ext")
///     .broadcast(TargetQuery::new().active(true))
///     .directory(transport)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RequesterBuilder {
    // ---
    transport: TransportPtr,
    channel: Option<String>,
    broadcast: Option<TargetQuery>,
    directory: Option<DirectoryPtr>,
    remote_realm: Option<String>,
}

impl RequesterBuilder {
    /// Create a new requester builder for `transport`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            channel: None,
            broadcast: None,
            directory: None,
            remote_realm: None,
        }
    }

    /// Set the channel to call into (required).
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Broadcast every call to the endpoints matching `query`.
    ///
    /// Requires [`directory`](Self::directory).
    pub fn broadcast(mut self, query: TargetQuery) -> Self {
        self.broadcast = Some(query);
        self
    }

    /// Endpoint directory used to resolve broadcast targets.
    pub fn directory(mut self, directory: DirectoryPtr) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Address the default contexts of another realm instead of the own one.
    ///
    /// Cannot be combined with [`broadcast`](Self::broadcast).
    pub fn remote_realm(mut self, realm: impl Into<String>) -> Self {
        self.remote_realm = Some(realm.into());
        self
    }

    /// Build the requester (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `channel` is missing
    /// - `broadcast` is set without a `directory`
    /// - a `directory` is set without `broadcast`
    /// - both `broadcast` and `remote_realm` are set
    pub fn build(self) -> Result<Requester> {
        // ---
        let channel = self
            .channel
            .ok_or_else(|| RpcError::MissingConfig("channel".into()))?;

        if self.broadcast.is_some() && self.remote_realm.is_some() {
            return Err(RpcError::ConfigConflict(
                "broadcast addresses own-realm endpoints; it cannot be combined with remote_realm".into(),
            ));
        }

        let fanout = match (self.broadcast, self.directory) {
            (Some(query), Some(directory)) => Some(Fanout { query, directory }),
            (Some(_), None) => {
                return Err(RpcError::MissingConfig("directory (required by broadcast)".into()));
            }
            (None, Some(_)) => {
                return Err(RpcError::ConfigConflict(
                    "directory is only used by broadcast; set broadcast() as well".into(),
                ));
            }
            (None, None) => None,
        };

        let destination = match self.remote_realm {
            Some(realm) => Destination::External(realm.into()),
            None => Destination::Default,
        };

        Ok(Requester::new(self.transport, channel, destination, fanout))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{MemoryHub, TransportBuilder};

    async fn transport() -> std::sync::Arc<crate::MemoryTransport> {
        TransportBuilder::new()
            .node_id("builder-test")
            .hub(MemoryHub::new())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_channel() {
        // ---
        let err = RequesterBuilder::new(transport().await).build().err().unwrap();
        assert!(matches!(err, RpcError::MissingConfig(ref f) if f == "channel"), "{err}");
    }

    #[tokio::test]
    async fn test_broadcast_needs_directory() {
        // ---
        let err = RequesterBuilder::new(transport().await)
            .channel("ext")
            .broadcast(TargetQuery::new())
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, RpcError::MissingConfig(_)), "{err}");
    }

    #[tokio::test]
    async fn test_broadcast_conflicts_with_remote_realm() {
        // ---
        let t = transport().await;
        let err = RequesterBuilder::new(t.clone())
            .channel("ext")
            .broadcast(TargetQuery::new())
            .directory(t)
            .remote_realm("other")
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, RpcError::ConfigConflict(_)), "{err}");
    }

    #[tokio::test]
    async fn test_broadcast_requester() {
        // ---
        let t = transport().await;
        let requester = RequesterBuilder::new(t.clone())
            .channel("ext")
            .broadcast(TargetQuery::new().active(true))
            .directory(t)
            .build()
            .unwrap();

        assert!(requester.is_broadcast());
        assert_eq!(requester.channel(), "ext");
    }
}
