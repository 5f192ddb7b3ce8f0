/// Protocol types for channel RPC messages
///
/// This module defines the wire format for request and error messages, the
/// classification predicates applied to inbound traffic, and correlation id
/// management for transports that track pending replies.
mod args;
mod correlation;
mod message;
mod method;

pub(crate) use args::{decode_args, encode_args};
pub use correlation::CorrelationId;
pub use message::{
    //
    belongs_to_channel,
    is_error,
    is_request,
    ErrorBody,
    ErrorMessage,
    RequestMessage,
    WireMessage,
    UNKNOWN_ERROR,
};
pub use method::Method;
