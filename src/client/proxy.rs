use super::Requester;
use crate::protocol::Method;
use crate::{EndpointId, Result};

/// Typed call-site view of a [`Requester`].
///
/// Every call is `requester.request(M::NAME, args)` with the argument and
/// result types taken from the [`Method`]:
///
/// ```no_run
/// # use chan_rpc::{Method, Requester};
/// struct Add;
///
/// impl Method for Add {
///     const NAME: &'static str = "add";
///     type Args = (i32, i32);
///     type Output = i32;
/// }
///
/// # async fn example(requester: Requester) -> chan_rpc::Result<()> {
/// let sum = requester.proxy().call::<Add>((2, 3)).await?;
/// assert_eq!(sum, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct Proxy<'a> {
    requester: &'a Requester,
}

impl<'a> Proxy<'a> {
    pub(crate) fn new(requester: &'a Requester) -> Self {
        Self { requester }
    }

    /// Call `M` on the requester's destination (or broadcast).
    pub async fn call<M: Method>(&self, args: M::Args) -> Result<M::Output> {
        self.requester.request(M::NAME, args).await
    }

    /// Call `M` on one endpoint.
    pub async fn call_endpoint<M: Method>(&self, target: EndpointId, args: M::Args) -> Result<M::Output> {
        self.requester.request_endpoint(target, M::NAME, args).await
    }
}
