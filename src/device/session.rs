//! Device session - one long-lived controller connection
//!
//! The session owns both halves of the socket. A reader task decodes
//! incoming records in wire order and hands them to whoever took
//! [`DeviceSession::messages`]; writes from any task go through one lock so
//! records never interleave on the wire.

use futures::stream::{self, BoxStream};
use futures::SinkExt;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::identity::DeviceIdentity;
use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    ChannelValue, EventValue, InputEvent, Message, MessageCodec, StatusReport,
    DEFAULT_MAX_RECORD_LEN,
};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, `init` not sent yet
    Connected,
    /// `init` sent (and acknowledged, if required)
    Registered,
    /// Connection gone; every operation fails
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Connected => write!(f, "connected"),
            SessionState::Registered => write!(f, "registered"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Whether `register` waits for the controller's `status` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Send `init` and continue immediately
    #[default]
    None,
    /// Wait up to the given time for `status`
    Await(Duration),
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Registration acknowledgement policy
    pub ack: AckPolicy,
    /// Maximum accepted incoming record length
    pub max_record_len: usize,
    /// Incoming messages buffered before the reader waits for the consumer
    pub incoming_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            connect_timeout: Duration::from_secs(10),
            ack: AckPolicy::None,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            incoming_capacity: 64,
        }
    }
}

impl From<&DeviceConfig> for SessionOptions {
    fn from(config: &DeviceConfig) -> Self {
        SessionOptions {
            connect_timeout: config.connect_timeout,
            ack: if config.await_init_ack {
                AckPolicy::Await(config.ack_timeout)
            } else {
                AckPolicy::None
            },
            max_record_len: config.max_record_len,
            incoming_capacity: config.incoming_capacity.max(1),
        }
    }
}

type PendingAck = Arc<std::sync::Mutex<Option<oneshot::Sender<StatusReport>>>>;

/// A device's connection to its controller
pub struct DeviceSession {
    peer: SocketAddr,
    options: SessionOptions,
    writer: Mutex<FramedWrite<OwnedWriteHalf, MessageCodec>>,
    state: Arc<watch::Sender<SessionState>>,
    incoming: std::sync::Mutex<Option<mpsc::Receiver<Message>>>,
    consumer_attached: Arc<AtomicBool>,
    pending_ack: PendingAck,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    identity: std::sync::Mutex<Option<DeviceIdentity>>,
    released: AtomicBool,
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceSession {
    /// Connect to the controller at `addr` (`host:port`).
    ///
    /// Fails with [`Error::Connect`] on refusal or timeout. There is no
    /// retry; the caller decides.
    pub async fn open(addr: &str, options: SessionOptions) -> Result<Self> {
        debug!("Connecting to controller at {}", addr);
        let stream = match tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::connect(addr, e)),
            Err(_) => {
                return Err(Error::connect(
                    addr,
                    format!("timed out after {:?}", options.connect_timeout),
                ))
            }
        };
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let codec = MessageCodec::with_max_record_len(options.max_record_len);
        let reader = FramedRead::new(read_half, codec.clone());
        let writer = FramedWrite::new(write_half, codec);

        let (state, _) = watch::channel(SessionState::Connected);
        let state = Arc::new(state);
        let pending_ack: PendingAck = Arc::new(std::sync::Mutex::new(None));
        let (tx, rx) = mpsc::channel(options.incoming_capacity.max(1));
        let consumer_attached = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            reader,
            tx,
            Arc::clone(&consumer_attached),
            Arc::clone(&pending_ack),
            Arc::clone(&state),
            peer,
        ));

        info!("Connected to controller at {}", peer);

        Ok(DeviceSession {
            peer,
            options,
            writer: Mutex::new(writer),
            state,
            incoming: std::sync::Mutex::new(Some(rx)),
            consumer_attached,
            pending_ack,
            reader: std::sync::Mutex::new(Some(reader_task)),
            identity: std::sync::Mutex::new(None),
            released: AtomicBool::new(false),
        })
    }

    /// Connect using the device section of the configuration
    pub async fn connect(config: &DeviceConfig) -> Result<Self> {
        Self::open(&config.controller_addr(), SessionOptions::from(config)).await
    }

    /// Address of the controller
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// The identity sent with `init`, once registered
    pub fn identity(&self) -> Option<DeviceIdentity> {
        lock(&self.identity).clone()
    }

    /// Wait until the connection is gone
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Send the `init` message.
    ///
    /// With [`AckPolicy::Await`] this waits for the controller's `status`
    /// reply; an error status fails with [`Error::Rejected`].
    pub async fn register(&self, identity: DeviceIdentity) -> Result<()> {
        identity.validate()?;

        // Held for the whole handshake so no event slips in before `init`.
        let mut writer = self.writer.lock().await;
        match self.state() {
            SessionState::Closed => return Err(Error::ClosedSession),
            SessionState::Registered => return Err(Error::AlreadyRegistered),
            SessionState::Connected => {}
        }

        let ack = match self.options.ack {
            AckPolicy::None => None,
            AckPolicy::Await(timeout) => {
                let (tx, rx) = oneshot::channel();
                *lock(&self.pending_ack) = Some(tx);
                // the reader may have finished before the sender was stored
                if self.state() == SessionState::Closed {
                    lock(&self.pending_ack).take();
                    return Err(Error::ClosedSession);
                }
                Some((rx, timeout))
            }
        };

        let unique_id = identity.unique_id.clone();
        if let Err(e) = writer.send(Message::Init(identity.clone())).await {
            lock(&self.pending_ack).take();
            return Err(self.write_failed(e));
        }
        info!(uniqueid = %unique_id, "Device init sent");

        if let Some((rx, timeout)) = ack {
            let report = match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(report)) => report,
                Ok(Err(_)) => return Err(Error::ClosedSession),
                Err(_) => {
                    lock(&self.pending_ack).take();
                    return Err(Error::Timeout(format!(
                        "no status reply to init within {:?}",
                        timeout
                    )));
                }
            };
            if !report.is_ok() {
                warn!(uniqueid = %unique_id, "Controller rejected init: {:?}", report);
                return Err(Error::Rejected {
                    code: report.errorcode.unwrap_or(0),
                    message: report.errormessage.unwrap_or_default(),
                });
            }
            debug!(uniqueid = %unique_id, "Controller acknowledged init");
        }

        *lock(&self.identity) = Some(identity);
        self.state.send_if_modified(|s| {
            if *s == SessionState::Connected {
                *s = SessionState::Registered;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Report a button click lasting `duration_ms` milliseconds
    pub async fn send_button_event(&self, index: u32, duration_ms: u32) -> Result<()> {
        self.send_event(Message::button(index, duration_ms)).await
    }

    /// Report a button level directly (false = released, true = pressed)
    pub async fn send_button_level(&self, index: u32, pressed: bool) -> Result<()> {
        self.send_event(Message::Button(InputEvent::new(index, pressed)))
            .await
    }

    /// Report a binary input state
    pub async fn send_input(&self, index: u32, value: impl Into<EventValue>) -> Result<()> {
        self.send_event(Message::Input(InputEvent::new(index, value)))
            .await
    }

    /// Report a sensor reading
    pub async fn send_sensor(&self, index: u32, value: f64) -> Result<()> {
        self.send_event(Message::Sensor(InputEvent::new(index, value)))
            .await
    }

    /// Report the device's own channel value (e.g. after a local change)
    pub async fn send_channel(&self, index: u32, value: f64) -> Result<()> {
        self.send_event(Message::Channel(ChannelValue::new(index, value)))
            .await
    }

    /// Confirm that all channel values were reported after a `sync`
    pub async fn send_synced(&self) -> Result<()> {
        self.send_event(Message::Synced).await
    }

    /// Take the stream of incoming messages.
    ///
    /// Messages arrive in wire order. The stream ends when the connection
    /// closes. It can be taken once. Until it is taken, at most
    /// `incoming_capacity` messages are buffered and later ones are dropped;
    /// afterwards a slow consumer pauses reading.
    pub fn messages(&self) -> Result<BoxStream<'static, Message>> {
        let rx = lock(&self.incoming)
            .take()
            .ok_or_else(|| Error::InvalidInput("message stream already taken".into()))?;
        self.consumer_attached.store(true, Ordering::SeqCst);
        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        })
        .boxed())
    }

    /// Call `handler` for every incoming `channel` message.
    ///
    /// Takes the message stream; other tags are ignored. The returned task
    /// finishes with the number of messages seen once the connection closes.
    pub fn on_channel_update<F>(&self, handler: F) -> Result<JoinHandle<usize>>
    where
        F: FnMut(ChannelValue) + Send + 'static,
    {
        let messages = self.messages()?;
        let dispatcher = Dispatcher::new().on_channel(handler);
        Ok(tokio::spawn(dispatcher.run(messages)))
    }

    /// Say goodbye and close the connection
    pub async fn bye(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().await;
            if self.state() == SessionState::Closed {
                return Err(Error::ClosedSession);
            }
            if let Err(e) = writer.send(Message::Bye).await {
                return Err(self.write_failed(e));
            }
        }
        self.close().await
    }

    /// Release the socket. Later operations fail with [`Error::ClosedSession`].
    ///
    /// A `register` still waiting for its acknowledgement fails with
    /// [`Error::ClosedSession`] right away.
    pub async fn close(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Err(Error::ClosedSession);
        }
        // register holds the writer lock while it waits for the ack
        lock(&self.pending_ack).take();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.get_mut().shutdown().await {
            debug!("Shutdown of controller connection failed: {}", e);
        }
        if let Some(task) = lock(&self.reader).take() {
            task.abort();
        }
        self.state.send_replace(SessionState::Closed);
        info!("Session with {} closed", self.peer);
        Ok(())
    }

    async fn send_event(&self, message: Message) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match self.state() {
            SessionState::Closed => return Err(Error::ClosedSession),
            SessionState::Connected => return Err(Error::NotRegistered),
            SessionState::Registered => {}
        }
        debug!("Sending {} message", message.tag());
        writer.send(message).await.map_err(|e| self.write_failed(e))
    }

    fn write_failed(&self, error: Error) -> Error {
        if matches!(error, Error::Io(_)) {
            warn!("Write to controller {} failed: {}", self.peer, error);
            self.state.send_replace(SessionState::Closed);
        }
        error
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.reader).take() {
            task.abort();
        }
    }
}

async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, MessageCodec>,
    tx: mpsc::Sender<Message>,
    consumer_attached: Arc<AtomicBool>,
    pending_ack: PendingAck,
    state: Arc<watch::Sender<SessionState>>,
    peer: SocketAddr,
) {
    let mut dropped = 0usize;
    while let Some(item) = reader.next().await {
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                warn!("Read from controller {} failed: {}", peer, e);
                break;
            }
        };

        if let Message::Status(report) | Message::Error(report) = &message {
            if let Some(ack) = lock(&pending_ack).take() {
                let _ = ack.send(report.clone());
            }
        }

        if consumer_attached.load(Ordering::SeqCst) {
            // A dropped consumer is not a reason to stop tracking the connection.
            let _ = tx.send(message).await;
        } else if let Err(TrySendError::Full(message)) = tx.try_send(message) {
            dropped += 1;
            if dropped == 1 {
                warn!(
                    "Nobody is reading messages from {}; dropping '{}' and further overflow",
                    peer,
                    message.tag()
                );
            } else {
                debug!("Dropped unread '{}' message", message.tag());
            }
        }
    }

    info!("Controller {} closed the connection", peer);
    state.send_replace(SessionState::Closed);
    // Fails a pending register with ClosedSession instead of a timeout.
    lock(&pending_ack).take();
}
