//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! [`Transport`] and [`EndpointDirectory`] traits. It is intended for
//! testing, local execution, and as the reference for transport semantics.
//!
//! ## Model
//!
//! A [`MemoryHub`] connects *nodes*. Every node belongs to a realm (think: one
//! extension) and either is a default context of that realm or owns an
//! [`EndpointId`] (think: one tab). Routing:
//!
//! - [`Destination::Default`] reaches every *other* endpoint-less node of the
//!   sender's realm on their [`Source::Internal`] listeners.
//! - [`Destination::Endpoint`] reaches the node owning that id in the
//!   sender's realm on its internal listeners.
//! - [`Destination::External`] reaches the endpoint-less nodes of the named
//!   realm on their [`Source::External`] listeners.
//!
//! ## Reference Semantics
//!
//! - Once `subscribe()` returns, later messages to that source are
//!   deliverable.
//! - Every listener of one message shares one reply slot; the first reply
//!   wins, later ones are dropped.
//! - A message nobody replies to leaves the sender pending until the sending
//!   node closes, at which point `send()` fails with a transport error.
//! - Sending to a destination without any listener fails immediately with
//!   [`RpcError::NoReceiver`]. Listeners whose subscription handle was
//!   dropped no longer count.
//! - A `send()` future that is dropped before its reply arrives (for example
//!   by a timeout) releases its pending entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::lock::lock_ignore_poison;
use crate::protocol::CorrelationId;
use crate::{
    // ---
    log_debug,
    Destination,
    EndpointDirectory,
    EndpointId,
    EndpointInfo,
    Envelope,
    ReplySink,
    ReplySlot,
    Result,
    RpcError,
    SenderInfo,
    Source,
    SubscriptionHandle,
    TargetQuery,
    Transport,
    TransportBase,
    TransportConfig,
};

const INBOX_CAPACITY: usize = 16;

struct Node {
    realm: Arc<str>,
    endpoint: Option<EndpointId>,
    info: EndpointInfo,
    listeners: HashMap<Source, Vec<mpsc::Sender<Envelope>>>,
}

impl Node {
    /// Live listeners for `source`; ended subscriptions are skipped.
    fn listeners(&self, source: Source) -> impl Iterator<Item = &mpsc::Sender<Envelope>> {
        self.listeners
            .get(&source)
            .into_iter()
            .flatten()
            .filter(|tx| !tx.is_closed())
    }

    fn has_ended_listeners(&self) -> bool {
        self.listeners.values().flatten().any(mpsc::Sender::is_closed)
    }

    /// Drop senders whose subscription handle is gone.
    fn prune(&mut self) {
        // ---
        for senders in self.listeners.values_mut() {
            senders.retain(|tx| !tx.is_closed());
        }
        self.listeners.retain(|_, senders| !senders.is_empty());
    }
}

/// Sends parked until a listener replies, keyed by correlation id.
#[derive(Default)]
struct PendingReplies {
    requests: HashMap<CorrelationId, (Arc<str>, oneshot::Sender<Bytes>)>,
}

impl PendingReplies {
    fn register(&mut self, origin: Arc<str>) -> (CorrelationId, oneshot::Receiver<Bytes>) {
        // ---
        let id = CorrelationId::generate();
        let (tx, rx) = oneshot::channel();
        self.requests.insert(id.clone(), (origin, tx));
        (id, rx)
    }

    fn complete(&mut self, id: &CorrelationId, payload: Bytes) -> bool {
        // ---
        match self.requests.remove(id) {
            // Receiver gone means the caller stopped waiting
            Some((_, tx)) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    fn forget(&mut self, id: &CorrelationId) {
        self.requests.remove(id);
    }

    fn drop_origin(&mut self, origin: &str) -> usize {
        // ---
        let before = self.requests.len();
        self.requests.retain(|_, (from, _)| from.as_ref() != origin);
        before - self.requests.len()
    }
}

struct PendingReply {
    id: CorrelationId,
    pending: Weak<Mutex<PendingReplies>>,
}

/// Removes a pending entry once its `send()` future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingReplies>,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_ignore_poison(self.pending).forget(&self.id);
    }
}

impl ReplySink for PendingReply {
    fn reply(&self, payload: Bytes) -> bool {
        match self.pending.upgrade() {
            Some(pending) => lock_ignore_poison(&pending).complete(&self.id, payload),
            None => false,
        }
    }
}

/// Shared message bus for the in-memory transport.
///
/// All [`MemoryTransport`] nodes attached to one hub can reach each other
/// according to the routing rules above.
///
/// For integration tests that need isolation between parallel test cases,
/// construct a hub explicitly and pass it to
/// [`TransportBuilder::hub`](crate::TransportBuilder::hub):
///
/// ```
/// # use chan_rpc::{MemoryHub, TransportBuilder};
/// # async fn example() -> chan_rpc::Result<()> {
/// let hub = MemoryHub::new();
///
/// let background = TransportBuilder::new().node_id("background").hub(hub.clone()).build().await?;
/// let tab = TransportBuilder::new().node_id("tab-1").endpoint(1).hub(hub).build().await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    nodes: RwLock<HashMap<Arc<str>, Node>>,
    pending: Arc<Mutex<PendingReplies>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn attach(&self, config: &TransportConfig) -> Result<()> {
        // ---
        let mut nodes = self.nodes.write().await;

        if nodes.contains_key(config.node_id.as_str()) {
            return Err(RpcError::ConfigConflict(format!(
                "node id already attached: {}",
                config.node_id
            )));
        }

        if let Some(id) = config.endpoint.filter(|id| id.is_addressable()) {
            let taken = nodes
                .values()
                .any(|n| n.endpoint == Some(id) && n.realm.as_ref() == config.realm);
            if taken {
                return Err(RpcError::ConfigConflict(format!(
                    "{id} already attached in realm {}",
                    config.realm
                )));
            }
        }

        nodes.insert(
            Arc::from(config.node_id.as_str()),
            Node {
                realm: Arc::from(config.realm.as_str()),
                endpoint: config.endpoint,
                info: config.info.clone(),
                listeners: HashMap::new(),
            },
        );

        Ok(())
    }

    async fn send(&self, from: &str, destination: Destination, payload: Bytes) -> Result<Bytes> {
        // ---
        // Collect targets under the read lock, deliver after releasing it
        let (origin, sender, targets, stale) = {
            let nodes = self.nodes.read().await;

            let (origin, node) = nodes
                .get_key_value(from)
                .ok_or_else(|| RpcError::Transport(format!("{from}: transport closed")))?;

            let sender = SenderInfo {
                node_id: origin.clone(),
                realm: node.realm.clone(),
                endpoint: node.endpoint,
                url: node.info.url.clone(),
            };

            let targets: Vec<mpsc::Sender<Envelope>> = match &destination {
                Destination::Default => nodes
                    .iter()
                    .filter(|(id, n)| {
                        id.as_ref() != from && n.realm == node.realm && n.endpoint.is_none()
                    })
                    .flat_map(|(_, n)| n.listeners(Source::Internal))
                    .cloned()
                    .collect(),
                Destination::Endpoint(target) if target.is_addressable() => nodes
                    .values()
                    .filter(|n| n.realm == node.realm && n.endpoint == Some(*target))
                    .flat_map(|n| n.listeners(Source::Internal))
                    .cloned()
                    .collect(),
                Destination::Endpoint(_) => Vec::new(),
                Destination::External(realm) => nodes
                    .values()
                    .filter(|n| n.realm == *realm && n.endpoint.is_none())
                    .flat_map(|n| n.listeners(Source::External))
                    .cloned()
                    .collect(),
            };

            let stale = nodes.values().any(Node::has_ended_listeners);
            (origin.clone(), sender, targets, stale)
        };

        if stale {
            for node in self.nodes.write().await.values_mut() {
                node.prune();
            }
        }

        if targets.is_empty() {
            return Err(RpcError::NoReceiver(destination.to_string()));
        }

        let (id, rx) = lock_ignore_poison(&self.pending).register(origin);
        log_debug!("{from}: send {id} to {destination} ({} listeners)", targets.len());

        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        let reply = ReplySlot::new(Arc::new(PendingReply {
            id,
            pending: Arc::downgrade(&self.pending),
        }));

        for target in targets {
            let env = Envelope {
                payload: payload.clone(),
                sender: sender.clone(),
                reply: reply.clone(),
            };
            // A closed inbox means a dropped SubscriptionHandle
            if target.send(env).await.is_err() {
                log_debug!("{from}: listener gone while delivering to {destination}");
            }
        }
        drop(reply);

        rx.await
            .map_err(|_| RpcError::Transport(format!("{from}: transport closed while awaiting reply")))
    }

    async fn subscribe(&self, node_id: &str, source: Source) -> Result<SubscriptionHandle> {
        // ---
        log_debug!("{node_id}: subscribe to {source:?}");

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(node_id)
            .ok_or_else(|| RpcError::Transport(format!("{node_id}: transport closed")))?;
        node.prune();
        node.listeners.entry(source).or_default().push(tx);

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn query(&self, node_id: &str, query: &TargetQuery) -> Result<Vec<EndpointId>> {
        // ---
        let nodes = self.nodes.read().await;
        let realm = nodes
            .get(node_id)
            .map(|n| n.realm.clone())
            .ok_or_else(|| RpcError::Transport(format!("{node_id}: transport closed")))?;

        let mut ids: Vec<EndpointId> = nodes
            .values()
            .filter(|n| n.realm == realm && query.matches(&n.info))
            .filter_map(|n| n.endpoint)
            .collect();
        ids.sort();

        Ok(ids)
    }

    async fn detach(&self, node_id: &str) -> Result<()> {
        // ---
        log_debug!("{node_id}: closing transport...");

        // Dropping the node drops its listener senders, ending their inboxes
        self.nodes.write().await.remove(node_id);

        let dropped = lock_ignore_poison(&self.pending).drop_origin(node_id);
        log_debug!("{node_id}: abandoned {dropped} pending sends");

        Ok(())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            nodes: RwLock::new(HashMap::new()),
            pending: Arc::new(Mutex::new(PendingReplies::default())),
        }
    }
}

/// Process-global hub used when no hub is configured explicitly.
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

pub(crate) fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport node.
///
/// Implements both [`Transport`] and [`EndpointDirectory`]; an
/// `Arc<MemoryTransport>` coerces to either pointer type.
pub struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn send(&self, destination: Destination, payload: Bytes) -> Result<Bytes> {
        self.hub.send(self.transport_id(), destination, payload).await
    }

    async fn subscribe(&self, source: Source) -> Result<SubscriptionHandle> {
        self.hub.subscribe(self.transport_id(), source).await
    }

    /// Detach this node from the hub.
    ///
    /// Ends every subscription of this node and fails its pending sends.
    /// Other nodes on the hub are unaffected.
    async fn close(&self) -> Result<()> {
        self.hub.detach(self.transport_id()).await
    }
}

#[async_trait::async_trait]
impl EndpointDirectory for MemoryTransport {
    /// Enumerate endpoint-owning nodes of this node's realm matching `query`,
    /// in ascending id order.
    async fn query(&self, query: &TargetQuery) -> Result<Vec<EndpointId>> {
        self.hub.query(self.transport_id(), query).await
    }
}

/// Create a new in-memory transport attached to the process-global hub.
///
/// For isolated parallel testing, use [`create_memory_transport_with_hub`].
pub async fn create_memory_transport(config: TransportConfig) -> Result<Arc<MemoryTransport>> {
    // ---
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create a new in-memory transport attached to `hub`.
///
/// # Errors
///
/// Returns [`RpcError::ConfigConflict`] if the node id, or an addressable
/// endpoint id within the same realm, is already attached.
pub async fn create_memory_transport_with_hub(
    config: TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<Arc<MemoryTransport>> {
    // ---
    log_debug!("{}: create memory transport", config.node_id);

    hub.attach(&config).await?;

    Ok(Arc::new(MemoryTransport {
        base: TransportBase::from(&config),
        hub,
    }))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn config(node_id: &str, realm: &str, endpoint: Option<i32>) -> TransportConfig {
        TransportConfig {
            node_id: node_id.into(),
            realm: realm.into(),
            endpoint: endpoint.map(EndpointId),
            info: EndpointInfo::default(),
        }
    }

    async fn node(hub: &Arc<MemoryHub>, id: &str, realm: &str, endpoint: Option<i32>) -> Arc<MemoryTransport> {
        create_memory_transport_with_hub(config(id, realm, endpoint), hub.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reply_completes_send() {
        // ---
        let hub = MemoryHub::new();
        let a = node(&hub, "a", "r", None).await;
        let b = node(&hub, "b", "r", None).await;

        let mut inbox = b.subscribe(Source::Internal).await.unwrap();
        tokio::spawn(async move {
            let env = inbox.inbox.recv().await.unwrap();
            assert_eq!(env.sender.node_id.as_ref(), "a");
            assert!(env.reply.send(Bytes::from_static(b"pong")));
            assert!(!env.reply.send(Bytes::from_static(b"again")));
        });

        let reply = a.send(Destination::Default, Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(reply, Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn test_default_skips_sender_and_endpoints() {
        // ---
        let hub = MemoryHub::new();
        let a = node(&hub, "a", "r", None).await;
        let tab = node(&hub, "tab", "r", Some(4)).await;
        let _own = a.subscribe(Source::Internal).await.unwrap();
        let _tab = tab.subscribe(Source::Internal).await.unwrap();

        let err = a
            .send(Destination::Default, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NoReceiver(_)), "{err}");
    }

    #[tokio::test]
    async fn test_unanswered_send_stays_pending_until_close() {
        // ---
        let hub = MemoryHub::new();
        let a = node(&hub, "a", "r", None).await;
        let b = node(&hub, "b", "r", None).await;
        let mut inbox = b.subscribe(Source::Internal).await.unwrap();

        // Listener drops the slot without replying
        tokio::spawn(async move { while inbox.inbox.recv().await.is_some() {} });

        let a2 = a.clone();
        let send = tokio::spawn(async move { a2.send(Destination::Default, Bytes::new()).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!send.is_finished());

        a.close().await.unwrap();
        let result = timeout(Duration::from_secs(1), send).await.unwrap().unwrap();
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }

    #[tokio::test]
    async fn test_external_routing() {
        // ---
        let hub = MemoryHub::new();
        let other = node(&hub, "other", "foreign", None).await;
        let host = node(&hub, "host", "home", None).await;
        let mut internal = host.subscribe(Source::Internal).await.unwrap();
        let mut external = host.subscribe(Source::External).await.unwrap();

        tokio::spawn(async move {
            let env = external.inbox.recv().await.unwrap();
            assert_eq!(env.sender.realm.as_ref(), "foreign");
            env.reply.send(Bytes::from_static(b"ok"));
        });

        let reply = other
            .send(Destination::External(Arc::from("home")), Bytes::new())
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"ok"));
        assert!(internal.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_directory_query() {
        // ---
        let hub = MemoryHub::new();
        let bg = node(&hub, "bg", "r", None).await;
        let _t2 = node(&hub, "t2", "r", Some(2)).await;
        let _t1 = node(&hub, "t1", "r", Some(1)).await;
        let _gone = node(&hub, "gone", "r", Some(EndpointId::NONE.0)).await;
        let _elsewhere = node(&hub, "x", "other", Some(9)).await;

        let ids = bg.query(&TargetQuery::new()).await.unwrap();
        assert_eq!(ids, vec![EndpointId::NONE, EndpointId(1), EndpointId(2)]);
    }

    #[tokio::test]
    async fn test_duplicate_node_rejected() {
        // ---
        let hub = MemoryHub::new();
        let _a = node(&hub, "a", "r", Some(1)).await;

        let dup = create_memory_transport_with_hub(config("a", "r", None), hub.clone()).await;
        assert!(matches!(dup, Err(RpcError::ConfigConflict(_))));

        let dup_endpoint =
            create_memory_transport_with_hub(config("b", "r", Some(1)), hub.clone()).await;
        assert!(matches!(dup_endpoint, Err(RpcError::ConfigConflict(_))));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_no_receiver() {
        // ---
        let hub = MemoryHub::new();
        let a = node(&hub, "a", "r", None).await;
        let b = node(&hub, "b", "r", None).await;

        let handle = b.subscribe(Source::Internal).await.unwrap();
        drop(handle);

        let result = timeout(Duration::from_millis(100), a.send(Destination::Default, Bytes::new()))
            .await
            .expect("send hung on a dropped subscription");
        assert!(matches!(result, Err(RpcError::NoReceiver(_))));

        let nodes = hub.nodes.read().await;
        assert!(nodes.get("b").unwrap().listeners.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_prunes_ended_listeners() {
        // ---
        let hub = MemoryHub::new();
        let b = node(&hub, "b", "r", None).await;

        for _ in 0..5 {
            drop(b.subscribe(Source::Internal).await.unwrap());
        }
        let _live = b.subscribe(Source::Internal).await.unwrap();

        let nodes = hub.nodes.read().await;
        let internal = &nodes.get("b").unwrap().listeners[&Source::Internal];
        assert_eq!(internal.len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_sends_release_pending_entries() {
        // ---
        let hub = MemoryHub::new();
        let a = node(&hub, "a", "r", None).await;
        let b = node(&hub, "b", "r", None).await;
        let mut inbox = b.subscribe(Source::Internal).await.unwrap();

        // Keep the inbox alive but never reply
        let (held_tx, mut held_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(env) = inbox.inbox.recv().await {
                let _ = held_tx.send(env);
            }
        });

        for _ in 0..10 {
            let result = timeout(Duration::from_millis(5), a.send(Destination::Default, Bytes::new())).await;
            assert!(result.is_err());
        }

        assert_eq!(lock_ignore_poison(&hub.pending).requests.len(), 0);

        // Late replies to forgotten sends go nowhere
        while let Ok(env) = held_rx.try_recv() {
            assert!(!env.reply.send(Bytes::new()));
        }
    }
}
