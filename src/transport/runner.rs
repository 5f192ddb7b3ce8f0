//! Transport execution runner.
//!
//! This module provides the glue between a [`Transport`](crate::Transport)
//! implementation and higher-level protocol roles such as the responder.
//!
//! The runner is responsible for:
//! - subscribing to a transport source on behalf of a consumer
//! - driving a receive loop over the transport inbox
//! - dispatching received [`Envelope`]s to the consumer
//! - consolidating logging and error handling for inbound messages
//!
//! It does **not** define RPC semantics or impose filtering: consumers see
//! every envelope of their source and decide themselves what to ignore.
//!
//! ### Error handling
//!
//! Errors returned by [`TransportConsumer::handle_envelope`] are best-effort
//! failures: they are logged, and the loop continues with the next envelope.
//! One bad message never takes the listener down.
//!
//! ### Lifecycle
//!
//! The loop ends when the transport closes or drops the subscription. The
//! returned task handle may also be aborted to unregister early.

use crate::{log_debug, log_warn};
use crate::{Envelope, Result, Source, TransportPtr};
use tokio::task::JoinHandle;

/// A consumer of transport-delivered envelopes.
///
/// Implementations should assume envelopes may belong to unrelated
/// protocols sharing the same transport.
#[async_trait::async_trait]
pub trait TransportConsumer: Send + Sync {
    /// The inbound source this consumer listens to.
    fn source(&self) -> Source;

    /// Handle a single incoming envelope.
    ///
    /// Returning an error does not terminate the receive loop.
    async fn handle_envelope(&self, env: Envelope) -> Result<()>;
}

/// Start a transport receive loop for a given consumer.
///
/// Subscribes before returning, so every message sent after this function
/// returns `Ok` reaches the consumer.
pub async fn run<T>(transport: TransportPtr, consumer: T) -> Result<JoinHandle<Result<()>>>
where
    T: TransportConsumer + 'static,
{
    // ---
    let source = consumer.source();
    let mut handle = transport.subscribe(source).await?;
    let transport_id = transport.transport_id().to_string();

    let join = tokio::spawn(async move {
        // ---
        while let Some(env) = handle.inbox.recv().await {
            if let Err(err) = consumer.handle_envelope(env).await {
                log_warn!("{transport_id}: consumer error on {source:?} source: {err}");
            }
        }

        log_debug!("{transport_id}: {source:?} source closed");
        Ok(())
    });

    Ok(join)
}
