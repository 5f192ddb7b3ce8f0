/// Responder: the dispatch side of a channel
mod handler;
mod registry;

pub use handler::{BoxError, HandlerResult, MethodHandler, UniversalHandler};
pub use registry::{HandlerRegistry, Unsubscriber};

use crate::lock::lock_ignore_poison;
use crate::protocol::{belongs_to_channel, ErrorBody, ErrorMessage, Method, RequestMessage, WireMessage};
use crate::transport::{run, TransportConsumer};
use crate::{log_debug, log_error, log_info, log_warn};
use crate::{Envelope, ReplySlot, Result, RpcError, Source, TransportPtr};
use bytes::Bytes;
use futures_util::stream::{self, TryStreamExt};
use handler::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Responder for one channel of a shared transport.
///
/// Listens to every inbound message of the transport for its whole lifetime,
/// ignores traffic of other channels and anything that is not a request, and
/// answers each request with the result of the last handler that ran:
///
/// 1. universal handlers, in registration order, with `(method, args)`;
/// 2. handlers registered for the method, in registration order, with `args`
///    spread as positional parameters.
///
/// Each handler is awaited before the next starts. The first failure aborts
/// the remaining handlers and is answered with an error message. A request
/// for which no handler exists at all gets no reply, leaving the transport's
/// reply slot to other listeners.
///
/// Clones share registrations and listeners. The listeners stop on
/// [`close`](Responder::close) or when the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use chan_rpc::{ResponderBuilder, TransportBuilder};
///
/// # async fn example() -> chan_rpc::Result<()> {
/// let transport = TransportBuilder::new().node_id("background").build().await?;
///
/// let responder = ResponderBuilder::new(transport).channel("ext").build().await?;
///
/// responder.handle("add", |(a, b): (i32, i32)| async move { Ok(a + b) });
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Responder {
    inner: Arc<Inner>,
}

struct Inner {
    dispatcher: Arc<Dispatcher>,
    listeners: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let listeners = self.listeners.get_mut().unwrap_or_else(|p| p.into_inner());
        for listener in listeners.drain(..) {
            listener.abort();
        }
    }
}

impl Responder {
    /// Start listening (internal use by ResponderBuilder).
    pub(crate) async fn start(transport: TransportPtr, channel: String, external: bool) -> Result<Self> {
        // ---
        let dispatcher = Arc::new(Dispatcher {
            channel: Arc::from(channel),
            registry: HandlerRegistry::new(),
        });

        let mut sources = vec![Source::Internal];
        if external {
            sources.push(Source::External);
        }

        let inner = Arc::new(Inner {
            dispatcher: dispatcher.clone(),
            listeners: Mutex::new(Vec::new()),
        });

        for source in sources {
            let listener = ChannelListener {
                source,
                dispatcher: dispatcher.clone(),
            };
            // On failure, dropping `inner` aborts the listeners already started
            let join = run(transport.clone(), listener).await?;
            lock_ignore_poison(&inner.listeners).push(join);
        }

        log_info!(
            "{}: responder listening on channel {}",
            transport.transport_id(),
            dispatcher.channel
        );

        Ok(Self { inner })
    }

    /// The channel this responder serves.
    pub fn channel(&self) -> &str {
        &self.inner.dispatcher.channel
    }

    /// The handler registry backing this responder.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.inner.dispatcher.registry
    }

    /// Register a handler for `name`. See [`HandlerRegistry::subscribe`].
    pub fn subscribe(&self, name: &str, handler: MethodHandler) -> Unsubscriber {
        self.registry().subscribe(name, handler)
    }

    /// Remove a handler for `name`. See [`HandlerRegistry::unsubscribe`].
    pub fn unsubscribe(&self, name: &str, handler: &MethodHandler) {
        self.registry().unsubscribe(name, handler)
    }

    /// Register a universal handler.
    pub fn subscribe_universal(&self, handler: UniversalHandler) -> Unsubscriber {
        self.registry().subscribe_universal(handler)
    }

    /// Remove a universal handler.
    pub fn unsubscribe_universal(&self, handler: &UniversalHandler) {
        self.registry().unsubscribe_universal(handler)
    }

    /// Register a typed handler for `name`.
    ///
    /// Shorthand for `subscribe(name, MethodHandler::typed(handler))`.
    pub fn handle<F, Fut, TArgs, TResp>(&self, name: &str, handler: F) -> Unsubscriber
    where
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TResp, BoxError>> + Send + 'static,
        TArgs: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
    {
        self.subscribe(name, MethodHandler::typed(handler))
    }

    /// Register a handler for a statically known [`Method`].
    pub fn handle_method<M, F, Fut>(&self, handler: F) -> Unsubscriber
    where
        M: Method,
        F: Fn(M::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<M::Output, BoxError>> + Send + 'static,
    {
        self.subscribe(M::NAME, MethodHandler::for_method::<M, F, Fut>(handler))
    }

    /// Stop listening. Requests already being dispatched still complete.
    pub fn close(&self) {
        // ---
        for listener in lock_ignore_poison(&self.inner.listeners).drain(..) {
            listener.abort();
        }
    }
}

/// What a dispatch produced.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// No handler exists; leave the reply slot untouched.
    NoReply,

    /// Value of the last handler that ran (`null` when it returned nothing).
    Success(Value),

    /// A handler failed.
    Failure(ErrorMessage),
}

enum Step {
    Universal(UniversalHandler),
    Named(MethodHandler),
}

impl Step {
    fn run(&self, method: &str, args: &[Value]) -> BoxFuture<'static, HandlerResult> {
        match self {
            Step::Universal(h) => h.call(method.to_string(), args.to_vec()),
            Step::Named(h) => h.call(args.to_vec()),
        }
    }
}

pub(crate) struct Dispatcher {
    channel: Arc<str>,
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Run the handlers for one request.
    ///
    /// The reply is a left fold over universal-then-named handlers whose
    /// combine step keeps the newer value; the fold short-circuits on the
    /// first error.
    pub(crate) async fn dispatch(&self, request: RequestMessage) -> Outcome {
        // ---
        let plan = self.registry.plan(&request.method);
        if plan.is_empty() {
            log_debug!("channel {}: no handler for {}", self.channel, request.method);
            return Outcome::NoReply;
        }

        let RequestMessage { method, args, .. } = request;

        let steps = plan
            .universal
            .into_iter()
            .map(Step::Universal)
            .chain(plan.named.into_iter().map(Step::Named))
            .map(Ok::<Step, BoxError>);

        let folded = stream::iter(steps)
            .try_fold(Value::Null, |_previous, step| step.run(&method, &args))
            .await;

        match folded {
            Ok(value) => Outcome::Success(value),
            Err(err) => {
                log_error!(
                    "Responder.dispatch[{}]: error in handler for {method}: {err}",
                    self.channel
                );
                Outcome::Failure(self.error_message(&method, &*err))
            }
        }
    }

    /// Dispatch and answer through the envelope's reply slot.
    async fn respond(&self, request: RequestMessage, reply: ReplySlot) -> Result<()> {
        // ---
        let payload = match self.dispatch(request).await {
            Outcome::NoReply => return Ok(()),
            Outcome::Success(value) => serde_json::to_vec(&value)?,
            Outcome::Failure(error) => serde_json::to_vec(&WireMessage::Error(error))?,
        };

        if !reply.send(Bytes::from(payload)) {
            log_debug!("channel {}: reply slot already used", self.channel);
        }
        Ok(())
    }

    fn error_message(&self, method: &str, err: &(dyn std::error::Error + Send + Sync + 'static)) -> ErrorMessage {
        ErrorMessage {
            channel: self.channel.to_string(),
            error: ErrorBody {
                message: Some(err.to_string()),
                stack: Some(stack_trace(&self.channel, method, err)),
            },
        }
    }
}

/// Best-effort stack for an error reply.
///
/// A remote error re-raised by a handler keeps the stack it arrived with;
/// anything else gets its `source()` chain plus the failing method.
fn stack_trace(channel: &str, method: &str, err: &(dyn std::error::Error + Send + Sync + 'static)) -> String {
    // ---
    if let Some(stack) = err.downcast_ref::<RpcError>().and_then(RpcError::remote_stack) {
        return stack.to_string();
    }

    let mut stack = format!("Error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(stack, "\n    caused by: {cause}");
        source = cause.source();
    }
    let _ = write!(stack, "\n    at {channel}::{method}");

    stack
}

struct ChannelListener {
    source: Source,
    dispatcher: Arc<Dispatcher>,
}

#[async_trait::async_trait]
impl TransportConsumer for ChannelListener {
    fn source(&self) -> Source {
        self.source
    }

    async fn handle_envelope(&self, env: Envelope) -> Result<()> {
        // ---
        let Some(message) = WireMessage::decode(&env.payload) else {
            log_debug!("ignoring non-JSON payload from {}", env.sender.node_id);
            return Ok(());
        };

        // Foreign channels and non-requests are left alone, no reply
        if !belongs_to_channel(&message, &self.dispatcher.channel) {
            return Ok(());
        }
        let Some(WireMessage::Request(request)) = WireMessage::parse(&message) else {
            return Ok(());
        };

        log_debug!(
            "channel {}: {} from {} ({:?})",
            self.dispatcher.channel,
            request.method,
            env.sender.node_id,
            self.source
        );

        // Requests are dispatched independently and may interleave
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatcher.respond(request, env.reply).await {
                log_warn!("channel {}: failed to send reply: {err}", dispatcher.channel);
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher {
            channel: Arc::from("ext"),
            registry: HandlerRegistry::new(),
        }
    }

    fn request(method: &str, args: Vec<Value>) -> RequestMessage {
        RequestMessage {
            channel: "ext".into(),
            method: method.into(),
            args,
        }
    }

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn recording(trace: &Trace, label: &'static str, result: Value) -> MethodHandler {
        let trace = trace.clone();
        MethodHandler::new(move |_| {
            trace.lock().unwrap().push(label);
            let result = result.clone();
            async move { Ok(result) }
        })
    }

    #[tokio::test]
    async fn test_last_handler_wins() {
        // ---
        let d = dispatcher();
        let trace = Trace::default();
        d.registry.subscribe("m", recording(&trace, "h1", json!(1)));
        d.registry.subscribe("m", recording(&trace, "h2", json!(2)));

        let outcome = d.dispatch(request("m", vec![])).await;

        assert!(matches!(outcome, Outcome::Success(v) if v == json!(2)));
        assert_eq!(*trace.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn test_universal_runs_first_and_is_overridden() {
        // ---
        let d = dispatcher();
        let trace = Trace::default();
        let t = trace.clone();
        d.registry.subscribe_universal(UniversalHandler::new(move |method, args| {
            t.lock().unwrap().push("u");
            async move { Ok(json!({ "method": method, "argc": args.len() })) }
        }));
        d.registry.subscribe("m", recording(&trace, "h", json!("named")));

        let outcome = d.dispatch(request("m", vec![json!(1)])).await;

        assert!(matches!(outcome, Outcome::Success(v) if v == json!("named")));
        assert_eq!(*trace.lock().unwrap(), vec!["u", "h"]);
    }

    #[tokio::test]
    async fn test_universal_only_replies() {
        // ---
        let d = dispatcher();
        d.registry.subscribe_universal(UniversalHandler::new(|method, _| async move {
            Ok(json!(format!("seen {method}")))
        }));

        let outcome = d.dispatch(request("anything", vec![])).await;
        assert!(matches!(outcome, Outcome::Success(v) if v == json!("seen anything")));
    }

    #[tokio::test]
    async fn test_no_handlers_no_reply() {
        // ---
        let d = dispatcher();
        d.registry.subscribe("other", recording(&Trace::default(), "o", json!(0)));

        assert!(matches!(d.dispatch(request("x", vec![])).await, Outcome::NoReply));
    }

    #[tokio::test]
    async fn test_unit_result_is_null() {
        // ---
        let d = dispatcher();
        d.registry
            .subscribe("fire", MethodHandler::typed(|(): ()| async { Ok(()) }));

        let outcome = d.dispatch(request("fire", vec![])).await;
        assert!(matches!(outcome, Outcome::Success(Value::Null)));
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_handlers() {
        // ---
        let d = dispatcher();
        let trace = Trace::default();
        let t = trace.clone();
        d.registry.subscribe(
            "ping",
            MethodHandler::new(move |_| {
                t.lock().unwrap().push("failing");
                async { Err::<Value, BoxError>("boom".into()) }
            }),
        );
        d.registry.subscribe("ping", recording(&trace, "after", json!(1)));

        let Outcome::Failure(error) = d.dispatch(request("ping", vec![])).await else {
            panic!("expected failure");
        };

        assert_eq!(error.channel, "ext");
        assert_eq!(error.error.message.as_deref(), Some("boom"));
        let stack = error.error.stack.unwrap();
        assert!(stack.starts_with("Error: boom"), "{stack}");
        assert!(stack.ends_with("at ext::ping"), "{stack}");
        assert_eq!(*trace.lock().unwrap(), vec!["failing"]);
    }

    #[tokio::test]
    async fn test_universal_failure_skips_named() {
        // ---
        let d = dispatcher();
        let trace = Trace::default();
        d.registry.subscribe_universal(UniversalHandler::new(|_, _| async {
            Err::<Value, BoxError>("denied".into())
        }));
        d.registry.subscribe("m", recording(&trace, "h", json!(1)));

        assert!(matches!(d.dispatch(request("m", vec![])).await, Outcome::Failure(_)));
        assert!(trace.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stack_keeps_remote_stack() {
        // ---
        let err: BoxError = Box::new(RpcError::Remote {
            method: "inner".into(),
            message: "deep".into(),
            stack: Some("remote stack".into()),
        });

        assert_eq!(stack_trace("ext", "outer", &*err), "remote stack");
    }

    #[test]
    fn test_stack_lists_causes() {
        // ---
        #[derive(Debug, thiserror::Error)]
        #[error("save failed")]
        struct SaveFailed(#[source] std::io::Error);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: BoxError = Box::new(SaveFailed(io));

        assert_eq!(
            stack_trace("ext", "save", &*err),
            "Error: save failed\n    caused by: disk full\n    at ext::save"
        );
    }
}
