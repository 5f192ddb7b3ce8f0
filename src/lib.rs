//! Channel-multiplexed request/response RPC over fire-and-forget transports
//!
//! Many independent RPC channels share one message transport. Each
//! [`Responder`] serves one named channel, dispatches incoming requests to
//! registered method handlers (plus catch-all universal handlers) and sends
//! back either the value of the last handler that ran or a structured error
//! message. A [`Requester`] sends a request on its channel and awaits the
//! single reply, addresses one endpoint explicitly, or broadcasts to every
//! endpoint an [`EndpointDirectory`] resolves.
//!
//! The transport is injected. [`MemoryTransport`] is the in-process
//! implementation: nodes attach to a [`MemoryHub`], belong to a realm and
//! may be individually addressable endpoints.
//!
//! ```no_run
//! use chan_rpc::{MemoryHub, RequesterBuilder, ResponderBuilder, TransportBuilder};
//!
//! # async fn example() -> chan_rpc::Result<()> {
//! let hub = MemoryHub::new();
//! let background = TransportBuilder::new().node_id("background").hub(hub.clone()).build().await?;
//! let popup = TransportBuilder::new().node_id("popup").hub(hub).build().await?;
//!
//! let responder = ResponderBuilder::new(background).channel("ext").build().await?;
//! responder.handle("ping", |(): ()| async { Ok("pong") });
//!
//! let requester = RequesterBuilder::new(popup).channel("ext").build()?;
//! let reply: String = requester.request("ping", ()).await?;
//! assert_eq!(reply, "pong");
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod client;
mod domain;
mod protocol;
mod server;
mod transport;

mod requester_builder;
mod responder_builder;
mod transport_builder;

mod error;
mod lock;
mod macros;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{Proxy, Requester};
pub use server::{
    //
    BoxError,
    HandlerRegistry,
    HandlerResult,
    MethodHandler,
    Responder,
    UniversalHandler,
    Unsubscriber,
};

pub use requester_builder::RequesterBuilder;
pub use responder_builder::ResponderBuilder;
pub use transport_builder::{TransportBuilder, DEFAULT_REALM};

pub use error::{Result, RpcError};

pub use protocol::{
    //
    belongs_to_channel,
    is_error,
    is_request,
    CorrelationId,
    ErrorBody,
    ErrorMessage,
    Method,
    RequestMessage,
    WireMessage,
    UNKNOWN_ERROR,
};

pub use transport::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    run,
    MemoryHub,
    MemoryTransport,
    TransportConsumer,
};

// --- public re-exports
pub use domain::{
    //
    Destination,
    DirectoryPtr,
    EndpointDirectory,
    EndpointId,
    EndpointInfo,
    Envelope,
    ReplySink,
    ReplySlot,
    SenderInfo,
    Source,
    SubscriptionHandle,
    TargetQuery,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
};
