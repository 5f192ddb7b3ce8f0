//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! transport implementations or host environments.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
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
