//! Requester: the calling side of a channel.
//!
//! A requester turns a method call into a request message, hands it to the
//! transport and resolves with the single reply. Replies that are error
//! messages become [`RpcError::Remote`]; anything else is returned unchanged.
//!
//! # Broadcast
//!
//! Configured with a [`TargetQuery`], a requester resolves the matching
//! endpoints through an [`EndpointDirectory`](crate::EndpointDirectory) at
//! call time and sends the request to each of them on its own task. The call
//! returns `null` as soon as the sends are dispatched; replies and failures
//! of individual endpoints are only logged.
//!
//! # Concurrency
//!
//! The requester holds no mutable state, so clones may call concurrently.
//! There is no timeout at this layer: a request nobody answers stays pending
//! until the transport gives up on it. Wrap calls in
//! [`tokio::time::timeout`] where that matters.
mod proxy;

pub use proxy::Proxy;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::protocol::{encode_args, Method, RequestMessage, WireMessage};
use crate::{
    // ---
    log_debug,
    log_warn,
    Destination,
    DirectoryPtr,
    EndpointId,
    Result,
    RpcError,
    TargetQuery,
    TransportPtr,
};

/// Requester bound to one channel.
///
/// Cheap to clone (internally `Arc`-backed). Built by
/// [`RequesterBuilder`](crate::RequesterBuilder).
#[derive(Clone)]
pub struct Requester {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    channel: String,
    destination: Destination,
    fanout: Option<Fanout>,
}

/// Broadcast target: which endpoints to reach and where to look them up.
pub(crate) struct Fanout {
    pub query: TargetQuery,
    pub directory: DirectoryPtr,
}

impl Requester {
    // ---
    /// Create a requester (internal use by RequesterBuilder).
    pub(crate) fn new(
        transport: TransportPtr,
        channel: String,
        destination: Destination,
        fanout: Option<Fanout>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                channel,
                destination,
                fanout,
            }),
        }
    }

    /// The channel this requester calls into.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Whether calls are broadcast to resolved endpoints.
    pub fn is_broadcast(&self) -> bool {
        self.inner.fanout.is_some()
    }

    /// Call `method` with positional `args`.
    ///
    /// Point-to-point, this resolves with the reply value of the responder;
    /// JSON `null` stands for a handler that returned nothing. In broadcast
    /// mode it resolves with `null` once the per-endpoint sends are spawned.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Remote`] when the responder replied with an error
    /// - [`RpcError::NoReceiver`] / [`RpcError::Transport`] from the transport
    /// - [`RpcError::Serialization`] when the reply is not JSON
    ///
    /// Broadcast calls never fail.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        // ---
        let payload = self.encode(method, args)?;

        match &self.inner.fanout {
            Some(fanout) => {
                self.broadcast(fanout, method, payload).await;
                Ok(Value::Null)
            }
            None => {
                self.exchange(self.inner.destination.clone(), method, payload)
                    .await
            }
        }
    }

    /// Call `method` on one explicitly addressed endpoint.
    ///
    /// Same contract as a point-to-point [`call`](Requester::call), also
    /// when this requester is configured for broadcast.
    pub async fn call_endpoint(&self, target: EndpointId, method: &str, args: Vec<Value>) -> Result<Value> {
        // ---
        let payload = self.encode(method, args)?;
        self.exchange(Destination::Endpoint(target), method, payload)
            .await
    }

    /// Typed [`call`](Requester::call).
    ///
    /// `args` is a tuple of positional arguments (`()` for none, `(a,)` for
    /// one). The reply is deserialized into `R`; a broadcast yields `null`,
    /// so use `()` or `Option<_>` there.
    pub async fn request<A, R>(&self, method: &str, args: A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        // ---
        let value = self.call(method, encode_args(args)?).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Typed [`call_endpoint`](Requester::call_endpoint).
    pub async fn request_endpoint<A, R>(&self, target: EndpointId, method: &str, args: A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        // ---
        let value = self.call_endpoint(target, method, encode_args(args)?).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Call a statically known [`Method`].
    pub async fn invoke<M: Method>(&self, args: M::Args) -> Result<M::Output> {
        self.request(M::NAME, args).await
    }

    /// Typed call-site view of this requester.
    pub fn proxy(&self) -> Proxy<'_> {
        Proxy::new(self)
    }

    fn encode(&self, method: &str, args: Vec<Value>) -> Result<Bytes> {
        // ---
        let request = WireMessage::Request(RequestMessage {
            channel: self.inner.channel.clone(),
            method: method.to_string(),
            args,
        });

        Ok(Bytes::from(serde_json::to_vec(&request)?))
    }

    async fn exchange(&self, destination: Destination, method: &str, payload: Bytes) -> Result<Value> {
        // ---
        log_debug!(
            "channel {}: calling {method} on {destination}",
            self.inner.channel
        );

        let reply = self.inner.transport.send(destination, payload).await?;
        decode_reply(method, &reply)
    }

    async fn broadcast(&self, fanout: &Fanout, method: &str, payload: Bytes) {
        // ---
        let endpoints = match fanout.directory.query(&fanout.query).await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                log_warn!(
                    "channel {}: endpoint lookup for {method} failed: {err}",
                    self.inner.channel
                );
                return;
            }
        };

        for id in endpoints.into_iter().filter(|id| id.is_addressable()) {
            let transport = self.inner.transport.clone();
            let payload = payload.clone();
            let call_name = format!("{}::{method}", self.inner.channel);

            tokio::spawn(async move {
                match transport.send(Destination::Endpoint(id), payload).await {
                    Ok(_) => {
                        log_debug!("{call_name}: {id} replied");
                    }
                    Err(err) => {
                        log_debug!("{call_name}: broadcast to {id} failed: {err}");
                    }
                }
            });
        }
    }
}

/// Interpret a reply payload.
fn decode_reply(method: &str, reply: &[u8]) -> Result<Value> {
    // ---
    let value: Value = serde_json::from_slice(reply)?;

    match WireMessage::parse(&value) {
        Some(WireMessage::Error(error)) => Err(RpcError::Remote {
            method: method.to_string(),
            message: error.error.message_or_unknown().to_string(),
            stack: error.error.stack,
        }),
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_reply_passes_through() {
        // ---
        let reply = br#"{"sum":5,"type":"sum"}"#;
        assert_eq!(decode_reply("m", reply).unwrap(), json!({ "sum": 5, "type": "sum" }));
        assert_eq!(decode_reply("m", b"null").unwrap(), Value::Null);
    }

    #[test]
    fn testerror_reply_becomes_remoteerror() {
        // ---
        let reply = br#"{"type":"error","channel":"ext","error":{"message":"fail","stack":"s"}}"#;

        let err = decode_reply("ping", reply).unwrap_err();
        assert_eq!(err.to_string(), "Error in method ping: fail");
        assert_eq!(err.remote_stack(), Some("s"));
    }

    #[test]
    fn testerror_reply_without_message() {
        // ---
        let reply = br#"{"type":"error","error":{}}"#;

        let err = decode_reply("ping", reply).unwrap_err();
        assert_eq!(err.to_string(), "Error in method ping: Unknown error");
        assert_eq!(err.remote_stack(), None);
    }

    #[test]
    fn test_non_json_reply() {
        // ---
        let err = decode_reply("ping", b"\xff").unwrap_err();
        assert!(matches!(err, RpcError::Serialization(_)), "{err}");
    }
}
