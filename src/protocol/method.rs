//! Statically known method maps.
//!
//! A [`Method`] ties a wire method name to its argument and return types so
//! both sides of a channel can share one definition:
//!
//! ```
//! use chan_rpc::Method;
//!
//! pub struct Add;
//!
//! impl Method for Add {
//!     const NAME: &'static str = "add";
//!     type Args = (i32, i32);
//!     type Output = i32;
//! }
//! ```
//!
//! The requester reaches typed methods through [`Proxy`](crate::Proxy); the
//! responder registers them with
//! [`Responder::handle_method`](crate::Responder::handle_method). Neither adds
//! protocol behavior beyond the untyped call.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A remotely callable method with typed arguments and result.
pub trait Method: Send + Sync + 'static {
    /// Wire method name.
    const NAME: &'static str;

    /// Positional arguments, usually a tuple.
    type Args: Serialize + DeserializeOwned + Send + 'static;

    /// Reply payload.
    type Output: Serialize + DeserializeOwned + Send + 'static;
}
