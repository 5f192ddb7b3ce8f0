//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` and `EndpointDirectory` traits, plus the receive-loop runner
//! shared by protocol roles.
//!
//! Domain code must not depend on transport-specific types.

mod memory;
mod runner;

pub use memory::{
    //
    create_memory_transport,
    create_memory_transport_with_hub,
    MemoryHub,
    MemoryTransport,
};
pub(crate) use memory::global_hub;
pub use runner::{run, TransportConsumer};
