//! # Plugin Bridge with Async Pump
//!
//! The bridge is the single context object through which a page talks to the
//! plugin. It owns the transport, the correlation table and the callback table,
//! and spawns a background task that reads the channel and routes each response
//! to the call waiting for it.
//!
//! ## Invariants
//!
//! - Correlation is by request id only. Responses may arrive in any order and
//!   interleaved with unrelated traffic.
//! - Messages from a foreign origin never reach the correlation table.
//! - A response whose id has no pending entry is logged and dropped.
//! - Once the channel closes, every outstanding and future call fails with a
//!   transport error.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use nmrpc::Arg;
use nmrpc::CallbackInvocation;
use nmrpc::Decoded;
use nmrpc::Failure;
use nmrpc::Frame;
use nmrpc::ObjectDescriptor;
use nmrpc::ObjectId;
use nmrpc::Operation;
use nmrpc::Param;
use nmrpc::Reply;
use nmrpc::Request;
use nmrpc::WireValue;

use crate::callback::CallbackTable;
use crate::config::BridgeConfig;
use crate::pending::PendingTable;
use crate::proxy::RemoteObject;
use crate::transport;
use crate::transport::Delivery;
use crate::transport::Origin;
use crate::transport::Transport;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Error {
    /// The channel or plugin is unavailable.
    Transport(transport::Error),
    /// A response could not be understood.
    Protocol(nmrpc::Error),
    /// The plugin rejected the call.
    Remote(Failure),
    /// No response arrived within the configured timeout.
    Timeout { request_id: u64 },
    /// The call's cancellation token fired.
    Cancelled,
    /// The pending entry vanished without being settled.
    ChannelClosed,
    /// The member is not declared by the remote object's descriptor.
    UnknownMember { object: ObjectId, member: String },
    /// A result had a different type than the caller required.
    UnexpectedValue { expected: &'static str, found: &'static str },
    /// The value has no wire representation.
    UnsupportedArgument(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Protocol(e) => write!(f, "Protocol error: {}", e),
            Self::Remote(failure) => write!(f, "Plugin error: {}", failure),
            Self::Timeout { request_id } => write!(f, "Request {} timed out", request_id),
            Self::Cancelled => write!(f, "Request cancelled"),
            Self::ChannelClosed => write!(f, "Response channel closed"),
            Self::UnknownMember { object, member } => write!(f, "{} has no member '{}'", object, member),
            Self::UnexpectedValue { expected, found } => write!(f, "Expected {} result, got {}", expected, found),
            Self::UnsupportedArgument(kind) => write!(f, "Cannot pass a {} value to the plugin", kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<nmrpc::Error> for Error {
    fn from(e: nmrpc::Error) -> Self {
        Self::Protocol(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type DescribeFn = Arc<dyn Fn(&Failure) -> String + Send + Sync>;
type UntrustedFn = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    pending: PendingTable<Result<Reply>>,
    callbacks: CallbackTable,
    describe: Option<DescribeFn>,
    on_untrusted: Option<UntrustedFn>,
    untrusted_reported: AtomicBool,
    closed: AtomicBool,
    pump: OnceLock<AbortHandle>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get() {
            pump.abort();
        }
    }
}

/// Handle to the plugin bridge.
///
/// Cheap to clone; all clones share the same channel and tables. A clone made
/// with `scoped()` additionally carries a cancellation token that every call
/// made through it (and through objects obtained from it) honours. A clone made
/// with `with_timeout()` waits for its calls with its own limit.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
}

/// Fluent construction of a `Bridge`.
pub struct BridgeBuilder {
    transport: Box<dyn Transport>,
    config: BridgeConfig,
    describe: Option<DescribeFn>,
    on_untrusted: Option<UntrustedFn>,
}

impl BridgeBuilder {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport, config: BridgeConfig::default(), describe: None, on_untrusted: None }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs a hook that turns a plugin failure into a human-readable message.
    pub fn describe_errors(mut self, f: impl Fn(&Failure) -> String + Send + Sync + 'static) -> Self {
        self.describe = Some(Arc::new(f));
        self
    }

    /// Installs a hook fired once, the first time the plugin reports that this
    /// site is not in its trusted list.
    pub fn on_untrusted_site(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_untrusted = Some(Arc::new(f));
        self
    }

    /// Creates the bridge and spawns its pump task. Must be called inside a tokio runtime.
    pub fn build(self) -> Bridge {
        let transport: Arc<dyn Transport> = Arc::from(self.transport);
        let inner = Arc::new(Inner {
            config: self.config,
            transport: transport.clone(),
            pending: PendingTable::new(),
            callbacks: CallbackTable::new(),
            describe: self.describe,
            on_untrusted: self.on_untrusted,
            untrusted_reported: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pump: OnceLock::new(),
        });

        let pump = tokio::spawn(Bridge::pump(transport, Arc::downgrade(&inner)));
        let _ = inner.pump.set(pump.abort_handle());

        let timeout = inner.config.call_timeout();
        Bridge { inner, cancel: None, timeout }
    }
}

impl Bridge {
    /// Creates a bridge with the given configuration and no hooks.
    pub fn new(config: BridgeConfig, transport: Box<dyn Transport>) -> Self {
        BridgeBuilder::new(transport).config(config).build()
    }

    pub fn builder(transport: Box<dyn Transport>) -> BridgeBuilder {
        BridgeBuilder::new(transport)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Returns a handle whose calls are cancelled when `token` fires.
    pub fn scoped(&self, token: CancellationToken) -> Bridge {
        Bridge { inner: self.inner.clone(), cancel: Some(token), timeout: self.timeout }
    }

    /// Returns a handle whose calls wait at most `timeout` (`None`: forever)
    /// instead of the configured call timeout.
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Bridge {
        Bridge { inner: self.inner.clone(), cancel: self.cancel.clone(), timeout }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of distinct callbacks handed to the plugin so far.
    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.len()
    }

    /// Reads the channel until it closes, routing every message.
    async fn pump(transport: Arc<dyn Transport>, inner: Weak<Inner>) {
        let error = loop {
            match transport.recv().await {
                Ok(Some(delivery)) => {
                    let Some(inner) = inner.upgrade() else { return };
                    Bridge { inner, cancel: None, timeout: None }.on_message(&delivery);
                }
                Ok(None) => {
                    break transport::Error::ConnectionLost("channel closed".into());
                }
                Err(e) => {
                    warn!(error = %e, "transport error in pump");
                    break e;
                }
            }
        };

        // Notify all pending requests with the error
        if let Some(inner) = inner.upgrade() {
            inner.closed.store(true, Ordering::SeqCst);
            let outstanding = inner.pending.len();
            if outstanding > 0 {
                warn!(outstanding, error = %error, "channel closed with calls in flight");
            }
            inner.pending.settle_all(|| Err(Error::Transport(error.clone())));
        }
    }

    /// Sends a request and returns a handle to wait for its response.
    pub async fn send(&self, object: Option<ObjectId>, operation: Operation) -> Result<PendingCall> {
        let (request_id, rx) = self.inner.pending.register();
        let guard = EntryGuard { request_id, inner: self.inner.clone() };

        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport(transport::Error::ConnectionLost("channel closed".into())));
        }

        let request = Request::new(self.inner.config.destination.as_str(), request_id, object, operation);
        debug!(request_id, object = ?object, op = %request.operation.label(), "sending request");

        let payload = request.encode()?;
        self.inner.transport.send(&payload).await?;

        Ok(PendingCall { rx, guard, cancel: self.cancel.clone(), timeout: self.timeout })
    }

    /// Sends a request, waits for it, and decodes the return value.
    pub async fn invoke(&self, object: Option<ObjectId>, operation: Operation) -> Result<Value> {
        let reply = self.send(object, operation).await?.wait().await?;
        match &reply.retval {
            Some(wire) => self.decode(wire),
            None => Ok(Value::None),
        }
    }

    /// Asks the plugin for the root object of this page.
    ///
    /// The root object exposes a single method, `CreateObject(prog_id)`.
    pub async fn create_plugin(&self) -> Result<RemoteObject> {
        let url = self.inner.config.page_url.clone();
        let reply = self.send(None, Operation::Init { url }).await?.wait().await?;
        let descriptor = ObjectDescriptor {
            id: reply.object_id()?,
            properties: Vec::new(),
            methods: vec!["CreateObject".to_string()],
        };
        debug!(object = %descriptor.id, "plugin object created");
        Ok(RemoteObject::new(self.clone(), descriptor))
    }

    /// Releases every object the plugin holds for this page.
    ///
    /// Returns `true` when the plugin reports success.
    pub async fn reset(&self) -> Result<bool> {
        let url = self.inner.config.page_url.clone();
        let reply = self.send(None, Operation::Reset { url }).await?.wait().await?;
        Ok(reply.value.as_ref().and_then(|v| v.as_i64()) == Some(0))
    }

    /// Routes one inbound message.
    pub fn on_message(&self, delivery: &Delivery) {
        if delivery.origin != Origin::Page {
            trace!("ignoring message from foreign origin");
            return;
        }

        let frame = match Frame::decode(&delivery.payload) {
            Ok(frame) => frame,
            Err(e) => {
                match nmrpc::peek_request_id(&delivery.payload) {
                    Some(request_id) => self.settle(request_id, Err(Error::Protocol(e))),
                    None => debug!(error = %e, "ignoring undecodable message"),
                }
                return;
            }
        };

        match frame {
            Frame::Response(response) => {
                debug!(request_id = response.request_id, ok = response.outcome.is_ok(), "received response");
                let outcome = response.outcome.map_err(|f| Error::Remote(self.translate(f)));
                self.settle(response.request_id, outcome);
            }
            Frame::Callback(invocation) => self.dispatch_callback(invocation),
            Frame::Ignored => {}
        }
    }

    fn settle(&self, request_id: u64, outcome: Result<Reply>) {
        if !self.inner.pending.settle(request_id, outcome) {
            warn!(request_id, "dropping response with no pending request");
        }
    }

    fn translate(&self, failure: Failure) -> Failure {
        if failure.is_untrusted_site() {
            if let Some(hook) = &self.inner.on_untrusted {
                if !self.inner.untrusted_reported.swap(true, Ordering::SeqCst) {
                    hook();
                }
            }
        }
        match &self.inner.describe {
            Some(describe) => Failure::new(describe(&failure)),
            None => failure,
        }
    }

    fn dispatch_callback(&self, invocation: CallbackInvocation) {
        let Some(callback) = self.inner.callbacks.get(invocation.index) else {
            warn!(index = invocation.index, "callback invoked with unknown index");
            return;
        };
        let value = match &invocation.retval {
            Some(wire) => match self.decode(wire) {
                Ok(value) => value,
                Err(e) => {
                    warn!(index = invocation.index, error = %e, "undecodable callback argument");
                    return;
                }
            },
            None => Value::None,
        };
        callback.invoke(value);
    }

    /// Converts local arguments to wire parameters, registering callbacks.
    pub fn encode_args(&self, args: &[Value]) -> Result<Vec<Param>> {
        args.iter().map(|v| self.encode_arg(v)).collect()
    }

    pub fn encode_arg(&self, value: &Value) -> Result<Param> {
        let arg = match value {
            Value::None => return Err(Error::UnsupportedArgument("none")),
            Value::String(s) => Arg::String(s.clone()),
            Value::Int(n) => Arg::Int(*n),
            Value::Float(n) => Arg::Float(*n),
            Value::Bool(b) => Arg::Bool(*b),
            Value::Date(d) => Arg::Date(*d),
            Value::Object(o) => Arg::Object(o.id()),
            Value::Callback(cb) => Arg::Callback(self.inner.callbacks.register(cb)),
        };
        Ok(nmrpc::encode_arg(&arg))
    }

    /// Converts a wire return value into a local value, building proxies for objects.
    pub fn decode(&self, wire: &WireValue) -> Result<Value> {
        Ok(match nmrpc::decode_value(wire)? {
            Decoded::None => Value::None,
            Decoded::String(s) => Value::String(s),
            Decoded::Number(n) => Value::Int(n),
            Decoded::Boolean(b) => Value::Bool(b),
            Decoded::Object(descriptor) => Value::Object(RemoteObject::new(self.clone(), descriptor)),
        })
    }
}

/// Removes a pending entry when its call is abandoned.
struct EntryGuard {
    request_id: u64,
    inner: Arc<Inner>,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        if self.inner.pending.forget(self.request_id) {
            trace!(request_id = self.request_id, "abandoned pending call");
        }
    }
}

/// A request that has been sent and not yet awaited.
pub struct PendingCall {
    rx: oneshot::Receiver<Result<Reply>>,
    guard: EntryGuard,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
}

impl PendingCall {
    pub fn id(&self) -> u64 {
        self.guard.request_id
    }

    /// Waits for the response, honouring the sending handle's timeout and cancellation.
    ///
    /// Timing out, being cancelled, or dropping the returned future removes the
    /// pending entry.
    pub async fn wait(self) -> Result<Reply> {
        let PendingCall { rx, guard, cancel, timeout } = self;
        let request_id = guard.request_id;

        let settled = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, rx)
                    .await
                    .map_err(|_| Error::Timeout { request_id }),
                None => Ok(rx.await),
            }
        };

        let outcome = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::Cancelled),
                r = settled => r,
            },
            None => settled.await,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(e) => {
                debug!(request_id, error = %e, "call abandoned");
                Err(e)
            }
        };
        drop(guard);
        result
    }
}
