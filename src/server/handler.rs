use crate::protocol::{decode_args, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Error type returned by handlers.
///
/// Any `std::error::Error` converts into it through `?`, and so does a plain
/// string: `Err("fail".into())`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a single handler invocation.
pub type HandlerResult = std::result::Result<Value, BoxError>;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Handler traits for type-erased async functions
trait MethodFn: Send + Sync {
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

trait UniversalFn: Send + Sync {
    fn call(&self, method: String, args: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

// Untyped wrappers around plain closures
struct Untyped<F>(F);

impl<F, Fut> MethodFn for Untyped<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(args))
    }
}

struct AnyMethod<F>(F);

impl<F, Fut> UniversalFn for AnyMethod<F>
where
    F: Fn(String, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, method: String, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(method, args))
    }
}

// Typed wrapper: spreads wire args into `TArgs` and serializes the result
struct Typed<F, Fut, TArgs, TResp>
where
    F: Fn(TArgs) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<TResp, BoxError>> + Send,
    TArgs: DeserializeOwned,
    TResp: Serialize,
{
    func: F,
    _phantom: std::marker::PhantomData<fn(TArgs, TResp, Fut)>,
}

impl<F, Fut, TArgs, TResp> MethodFn for Typed<F, Fut, TArgs, TResp>
where
    F: Fn(TArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<TResp, BoxError>> + Send + 'static,
    TArgs: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        // Deserialize positional args
        let args: TArgs = match decode_args(args) {
            Ok(a) => a,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        let fut = (self.func)(args);

        Box::pin(async move {
            let resp = fut.await?;
            Ok::<Value, BoxError>(serde_json::to_value(resp)?)
        })
    }
}

/// A handler registered under a method name.
///
/// Invoked with the request's `args` spread as positional parameters. The
/// handle is cheap to clone; clones share identity, which is what
/// [`unsubscribe`](crate::Responder::unsubscribe) compares.
///
/// ```
/// use chan_rpc::MethodHandler;
/// use serde_json::json;
///
/// let untyped = MethodHandler::new(|_args| async { Ok(json!("pong")) });
/// let typed = MethodHandler::typed(|(a, b): (i32, i32)| async move { Ok(a + b) });
///
/// assert!(untyped.same_as(&untyped.clone()));
/// assert!(!untyped.same_as(&typed));
/// ```
#[derive(Clone)]
pub struct MethodHandler(Arc<dyn MethodFn>);

impl MethodHandler {
    /// Wrap an untyped handler receiving the raw positional args.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(Untyped(handler)))
    }

    /// Wrap a typed handler.
    ///
    /// The positional args are deserialized into `TArgs` (a tuple for
    /// multiple parameters) and the result is serialized to JSON. A failed
    /// argument decode is reported like any other handler error.
    pub fn typed<F, Fut, TArgs, TResp>(handler: F) -> Self
    where
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TResp, BoxError>> + Send + 'static,
        TArgs: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
    {
        Self(Arc::new(Typed {
            func: handler,
            _phantom: std::marker::PhantomData,
        }))
    }

    /// Wrap a handler for a statically known [`Method`].
    pub fn for_method<M, F, Fut>(handler: F) -> Self
    where
        M: Method,
        F: Fn(M::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<M::Output, BoxError>> + Send + 'static,
    {
        Self::typed(handler)
    }

    /// Whether both handles refer to the same registered function.
    pub fn same_as(&self, other: &MethodHandler) -> bool {
        same_target(&self.0, &other.0)
    }

    pub(crate) fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        self.0.call(args)
    }
}

impl fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodHandler({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// A handler invoked for every request on a channel, regardless of method.
///
/// Receives the method name and the raw positional args.
#[derive(Clone)]
pub struct UniversalHandler(Arc<dyn UniversalFn>);

impl UniversalHandler {
    /// Wrap a universal handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(String, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(AnyMethod(handler)))
    }

    /// Whether both handles refer to the same registered function.
    pub fn same_as(&self, other: &UniversalHandler) -> bool {
        same_target(&self.0, &other.0)
    }

    pub(crate) fn call(&self, method: String, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        self.0.call(method, args)
    }
}

impl fmt::Debug for UniversalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniversalHandler({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

// Identity on the data pointer only; vtable pointers are not unique.
fn same_target<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}
