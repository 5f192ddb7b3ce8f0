// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the collaborator interface the responder and requester
//! layers consume. It intentionally avoids any reference to a concrete host
//! environment (browser runtime, process pipes, brokers).
//!
//! The transport contract is deliberately thin:
//!
//! - a listener registers to receive *every* inbound message together with
//!   sender metadata and a single-use reply slot,
//! - a sender delivers an opaque payload to the default destination or to an
//!   explicitly addressed endpoint, and its future resolves with whatever the
//!   receiver passes to the reply slot (or stays pending forever if nobody
//!   replies).
//!
//! Channel filtering, request classification and error propagation are
//! handled by higher layers. Concrete implementations live under
//! `src/transport/`.
use crate::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifier of an addressable endpoint (a peer context such as a tab).
///
/// `0` and [`EndpointId::NONE`] never address anything; enumeration results
/// carrying them are skipped silently by the broadcast path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub i32);

impl EndpointId {
    /// Explicit "no endpoint" marker.
    pub const NONE: EndpointId = EndpointId(-1);

    /// Whether a message may be addressed to this identifier.
    pub fn is_addressable(self) -> bool {
        self.0 != 0 && self != Self::NONE
    }
}

impl From<i32> for EndpointId {
    fn from(value: i32) -> Self {
        EndpointId(value)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

/// Attributes an endpoint advertises to [`TargetQuery`] matching.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Location the endpoint is currently showing, if any.
    pub url: Option<String>,

    /// Whether the endpoint is the active one in its group.
    pub active: bool,
}

/// Descriptor selecting which endpoints a broadcast should address.
///
/// Unset fields match everything; an empty query selects every endpoint.
///
/// ```
/// # use chan_rpc::{EndpointInfo, TargetQuery};
/// let query = TargetQuery::new().active(true).url_prefix("https://");
///
/// let info = EndpointInfo { url: Some("https://example.org".into()), active: true };
/// assert!(query.matches(&info));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetQuery {
    /// Match only endpoints whose `active` flag equals this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    /// Match only endpoints whose url starts with this prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
}

impl TargetQuery {
    /// Query matching every endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to endpoints with the given `active` flag.
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Restrict to endpoints whose url starts with `prefix`.
    pub fn url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = Some(prefix.into());
        self
    }

    /// Whether `info` satisfies every field set on this query.
    pub fn matches(&self, info: &EndpointInfo) -> bool {
        // ---
        if let Some(active) = self.active {
            if info.active != active {
                return false;
            }
        }

        match (&self.url_prefix, &info.url) {
            (None, _) => true,
            (Some(prefix), Some(url)) => url.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// Where an outbound message is delivered.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    /// The transport's default destination: every endpoint-less context of
    /// the sender's realm.
    Default,

    /// One explicitly addressed endpoint of the sender's realm.
    Endpoint(EndpointId),

    /// The default contexts of another realm. Arrives there as
    /// [`Source::External`] traffic.
    External(Arc<str>),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Default => f.write_str("default"),
            Destination::Endpoint(id) => write!(f, "{id}"),
            Destination::External(realm) => write!(f, "external:{realm}"),
        }
    }
}

/// Which inbound stream a listener subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// Messages sent from within the listener's own realm.
    Internal,

    /// Messages sent from a different realm.
    External,
}

/// Metadata describing the sender of an inbound envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderInfo {
    /// Transport id of the sending node.
    pub node_id: Arc<str>,

    /// Realm the sender belongs to.
    pub realm: Arc<str>,

    /// Endpoint id of the sender, when it is an addressable endpoint.
    pub endpoint: Option<EndpointId>,

    /// Url the sender advertised, if any.
    pub url: Option<String>,
}

/// Receiving side of a single-use reply callback.
///
/// Implemented by transports. A reply completes the sender's pending
/// `send()`; only the first reply across all clones of a slot is delivered.
pub trait ReplySink: Send + Sync {
    /// Deliver `payload` as the reply. Returns `false` if a reply was already
    /// delivered or the sender is gone.
    fn reply(&self, payload: Bytes) -> bool;
}

/// Shared, first-reply-wins reply callback attached to every inbound envelope.
///
/// Every listener receiving the same message gets a clone of the same slot.
/// Dropping a slot without replying is allowed and leaves the sender waiting
/// for another listener's reply.
#[derive(Clone)]
pub struct ReplySlot(Arc<dyn ReplySink>);

impl ReplySlot {
    /// Wrap a transport-provided reply sink.
    pub fn new(sink: Arc<dyn ReplySink>) -> Self {
        Self(sink)
    }

    /// Send the reply payload. Returns `false` if the slot was already used.
    pub fn send(&self, payload: Bytes) -> bool {
        self.0.reply(payload)
    }
}

impl fmt::Debug for ReplySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplySlot")
    }
}

/// An inbound message envelope.
///
/// The transport does not interpret the payload. For this protocol it carries
/// the JSON text of a request or error message, but any bytes may arrive and
/// must be tolerated by listeners.
#[derive(Clone, Debug)]
pub struct Envelope {
    // ---
    /// Opaque payload bytes.
    pub payload: Bytes,

    /// Who sent the message.
    pub sender: SenderInfo,

    /// Single-use reply callback shared by all listeners of this message.
    pub reply: ReplySlot,
}

/// Handle returned from a successful subscription.
///
/// The subscription remains active until either:
/// - The handle is dropped (receiver channel closes)
/// - The transport is closed
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for every envelope delivered to the subscribed source.
    pub inbox: mpsc::Receiver<Envelope>,
}

/// Shared base state for all transport implementations.
pub struct TransportBase {
    /// Unique identifier for this transport instance (the node id).
    pub transport_id: String,

    /// Realm this node belongs to.
    pub realm: String,

    /// Endpoint id, when this node is addressable.
    pub endpoint: Option<EndpointId>,
}

impl From<&TransportConfig> for TransportBase {
    fn from(config: &TransportConfig) -> Self {
        // ---
        Self {
            transport_id: config.node_id.clone(),
            realm: config.realm.clone(),
            endpoint: config.endpoint,
        }
    }
}

/// Configuration for creating a transport instance.
///
/// Usually produced by [`TransportBuilder`](crate::TransportBuilder).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Node id for this transport instance.
    pub node_id: String,

    /// Realm the node joins.
    pub realm: String,

    /// Endpoint id, when this node should be individually addressable.
    pub endpoint: Option<EndpointId>,

    /// Attributes advertised to endpoint queries.
    pub info: EndpointInfo,
}

/// Transport abstraction.
///
/// Provides one-directional delivery with a single optional reply.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages sent *after* that
///   point to the subscribed source are deliverable.
/// - Every listener of a message receives a clone of the same [`ReplySlot`].
/// - `send()` resolves with the first reply and stays pending if no
///   listener ever replies.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Returns the realm of the transport.
    fn realm(&self) -> &str {
        &self.base().realm
    }

    /// Send a payload and wait for the reply.
    async fn send(&self, destination: Destination, payload: Bytes) -> Result<Bytes>;

    /// Register a listener for every inbound message from `source`.
    async fn subscribe(&self, source: Source) -> Result<SubscriptionHandle>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
pub type TransportPtr = Arc<dyn Transport>;

/// Endpoint enumeration collaborator.
///
/// Given a descriptor, returns the currently addressable endpoint ids. The
/// result may contain unaddressable ids (see [`EndpointId::is_addressable`]).
#[async_trait::async_trait]
pub trait EndpointDirectory: Send + Sync {
    /// Enumerate endpoints matching `query`.
    async fn query(&self, query: &TargetQuery) -> Result<Vec<EndpointId>>;
}

/// Shared directory pointer.
pub type DirectoryPtr = Arc<dyn EndpointDirectory>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_endpoint_addressable() {
        // ---
        assert!(EndpointId(7).is_addressable());
        assert!(!EndpointId(0).is_addressable());
        assert!(!EndpointId::NONE.is_addressable());
    }

    #[test]
    fn test_query_matching() {
        // ---
        let info = EndpointInfo {
            url: Some("https://docs.example.org/a".into()),
            active: false,
        };

        assert!(TargetQuery::new().matches(&info));
        assert!(TargetQuery::new().url_prefix("https://docs").matches(&info));
        assert!(!TargetQuery::new().active(true).matches(&info));
        assert!(!TargetQuery::new().url_prefix("http://").matches(&info));
        assert!(!TargetQuery::new()
            .url_prefix("https://")
            .matches(&EndpointInfo::default()));
    }

    #[test]
    fn test_query_serde_skips_unset() {
        // ---
        let json = serde_json::to_value(TargetQuery::new().active(true)).unwrap();
        assert_eq!(json, serde_json::json!({ "active": true }));
    }
}
