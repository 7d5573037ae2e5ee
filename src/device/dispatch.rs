//! Routing of incoming messages by tag
//!
//! [`dispatch`] drives a [`MessageHandler`] over a message stream.
//! [`Dispatcher`] is the closure-based handler for the common cases.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::protocol::{ChannelValue, Message, MoveCommand, StatusReport};

/// Consumer of controller-to-device messages.
///
/// Every method defaults to ignoring the message.
#[async_trait]
pub trait MessageHandler: Send {
    /// Controller set a channel value
    async fn on_channel(&mut self, _update: ChannelValue) {}

    /// Controller started or stopped a movement
    async fn on_move(&mut self, _command: MoveCommand) {}

    /// Controller asks for all channel values
    async fn on_sync(&mut self) {}

    /// Controller reported a status (`status` or `error`)
    async fn on_status(&mut self, _report: StatusReport) {}

    /// Any other message, including unknown tags
    async fn on_other(&mut self, message: Message) {
        debug!("Ignoring '{}' message", message.tag());
    }
}

/// Feed every message of `messages` to `handler`, in order.
///
/// Returns the number of messages seen when the stream ends.
pub async fn dispatch<S, H>(messages: S, handler: &mut H) -> usize
where
    S: Stream<Item = Message> + Send,
    H: MessageHandler + ?Sized,
{
    futures::pin_mut!(messages);
    let mut seen = 0;
    while let Some(message) = messages.next().await {
        seen += 1;
        match message {
            Message::Channel(update) => handler.on_channel(update).await,
            Message::Move(command) => handler.on_move(command).await,
            Message::Sync => handler.on_sync().await,
            Message::Status(report) | Message::Error(report) => handler.on_status(report).await,
            other => handler.on_other(other).await,
        }
    }
    seen
}

type Callback<T> = Box<dyn FnMut(T) + Send>;

/// Closure-based [`MessageHandler`]
#[derive(Default)]
pub struct Dispatcher {
    channel: Option<Callback<ChannelValue>>,
    movement: Option<Callback<MoveCommand>>,
    sync: Option<Callback<()>>,
    status: Option<Callback<StatusReport>>,
}

impl Dispatcher {
    /// Create a dispatcher with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `channel` messages
    pub fn on_channel<F>(mut self, f: F) -> Self
    where
        F: FnMut(ChannelValue) + Send + 'static,
    {
        self.channel = Some(Box::new(f));
        self
    }

    /// Handle `move` messages
    pub fn on_move<F>(mut self, f: F) -> Self
    where
        F: FnMut(MoveCommand) + Send + 'static,
    {
        self.movement = Some(Box::new(f));
        self
    }

    /// Handle `sync` requests
    pub fn on_sync<F>(mut self, mut f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.sync = Some(Box::new(move |()| f()));
        self
    }

    /// Handle `status` and `error` messages
    pub fn on_status<F>(mut self, f: F) -> Self
    where
        F: FnMut(StatusReport) + Send + 'static,
    {
        self.status = Some(Box::new(f));
        self
    }

    /// Consume `messages` until the stream ends
    pub async fn run<S>(mut self, messages: S) -> usize
    where
        S: Stream<Item = Message> + Send,
    {
        dispatch(messages, &mut self).await
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn on_channel(&mut self, update: ChannelValue) {
        if let Some(f) = self.channel.as_mut() {
            f(update);
        }
    }

    async fn on_move(&mut self, command: MoveCommand) {
        if let Some(f) = self.movement.as_mut() {
            f(command);
        }
    }

    async fn on_sync(&mut self) {
        if let Some(f) = self.sync.as_mut() {
            f(());
        }
    }

    async fn on_status(&mut self, report: StatusReport) {
        if let Some(f) = self.status.as_mut() {
            f(report);
        }
    }
}
