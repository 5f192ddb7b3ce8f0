//! Responder builder.
//!
//! Provides a fluent builder API for attaching a [`Responder`] to a shared
//! transport.

use crate::{Responder, Result, RpcError, TransportPtr};

/// Builder for [`Responder`] instances.
///
/// # Examples
///
/// ```no_run
/// use chan_rpc::{ResponderBuilder, TransportBuilder};
///
/// # async fn example() -> chan_rpc::Result<()> {
/// let transport = TransportBuilder::new().node_id("background").build().await?;
///
/// let responder = ResponderBuilder::new(transport)
///     .channel("ext")
///     .external(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ResponderBuilder {
    // ---
    transport: TransportPtr,
    channel: Option<String>,
    external: bool,
}

impl ResponderBuilder {
    /// Create a new responder builder for `transport`.
    pub fn new(transport: TransportPtr) -> Self {
        Self {
            transport,
            channel: None,
            external: false,
        }
    }

    /// Set the channel to serve (required).
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Also serve requests arriving from other realms.
    ///
    /// Default: `false` (own realm only).
    pub fn external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    /// Build the responder and start listening (consumes self).
    ///
    /// Every request sent after this returns `Ok` is seen by the responder.
    ///
    /// # Errors
    ///
    /// Returns error if `channel` is missing or the transport refuses the
    /// subscription.
    pub async fn build(self) -> Result<Responder> {
        // ---
        let channel = self
            .channel
            .ok_or_else(|| RpcError::MissingConfig("channel".into()))?;

        Responder::start(self.transport, channel, self.external).await
    }
}
