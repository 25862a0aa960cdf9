//! Outbound message transports.

use crate::config::OverflowPolicy;
use crate::error::{WorkerError, WorkerResult};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use smdflow_protocol::Message;
use std::sync::Arc;

/// An encoded message travelling between threads.
pub type Frame = Vec<u8>;

/// Creates a bounded frame queue.
pub fn frame_queue(capacity: usize) -> (Sender<Frame>, Receiver<Frame>) {
    bounded(capacity)
}

/// Destination for outbound messages.
///
/// This trait abstracts the transport between a result store and whatever
/// consumes its messages (a collector queue, an upstream printer, a test
/// buffer).
pub trait MessageSink: Send {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered.
    fn send(&mut self, message: &Message) -> WorkerResult<()>;
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn send(&mut self, message: &Message) -> WorkerResult<()> {
        (**self).send(message)
    }
}

/// Sends CBOR frames over a bounded crossbeam queue.
///
/// Every message is encoded, so the receiver always works on its own copy.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Frame>,
    policy: OverflowPolicy,
}

impl ChannelSink {
    /// Creates a sink over `sender`.
    pub fn new(sender: Sender<Frame>, policy: OverflowPolicy) -> Self {
        Self { sender, policy }
    }

    /// Returns the overflow policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl MessageSink for ChannelSink {
    fn send(&mut self, message: &Message) -> WorkerResult<()> {
        let frame = message.encode()?;
        match self.policy {
            OverflowPolicy::Block => self
                .sender
                .send(frame)
                .map_err(|_| WorkerError::Disconnected),
            OverflowPolicy::Fail => self.sender.try_send(frame).map_err(|e| match e {
                TrySendError::Full(_) => WorkerError::QueueFull,
                TrySendError::Disconnected(_) => WorkerError::Disconnected,
            }),
        }
    }
}

/// An in-memory sink for testing.
///
/// Clones share the same buffer, so a test can keep one handle while the
/// store owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message sent so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Removes and returns every message sent so far.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Number of messages sent so far.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns true if nothing has been sent.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl MessageSink for MemorySink {
    fn send(&mut self, message: &Message) -> WorkerResult<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smdflow_protocol::{Occurrence, Transition, TransitionKind};

    #[test]
    fn channel_sink_encodes_frames() {
        let (tx, rx) = frame_queue(4);
        let mut sink = ChannelSink::new(tx, OverflowPolicy::Block);
        let msg = Message::from(Transition::new(TransitionKind::Enable));
        sink.send(&msg).unwrap();

        let frame = rx.recv().unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn fail_policy_reports_full_queue() {
        let (tx, _rx) = frame_queue(1);
        let mut sink = ChannelSink::new(tx, OverflowPolicy::Fail);
        let msg = Message::from(Occurrence::heartbeat());

        sink.send(&msg).unwrap();
        assert!(matches!(sink.send(&msg), Err(WorkerError::QueueFull)));
    }

    #[test]
    fn disconnected_receiver() {
        let (tx, rx) = frame_queue(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx, OverflowPolicy::Block);
        let msg = Message::from(Occurrence::heartbeat());
        assert!(matches!(sink.send(&msg), Err(WorkerError::Disconnected)));
    }

    #[test]
    fn memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let mut boxed: Box<dyn MessageSink> = Box::new(sink.clone());
        boxed.send(&Message::from(Occurrence::heartbeat())).unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }
}
