//! Sending side of a realm's runtime messaging.

use crate::Envelope;
use crate::LocalEndpoint;
use crate::RuntimeMessage;
use crate::RuntimeResponse;
use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(250);

/// Messaging surface a realm uses to reach another realm.
pub trait RuntimePort {
    /// Fire-and-forget. Failures are absorbed.
    fn post(&self, message: RuntimeMessage);

    /// Sends and waits for the answer. `None` when nobody answered.
    ///
    /// The only call that holds the realm. It is made once, for the state
    /// pull at startup, and never waits past the port's request timeout;
    /// everything after startup goes through [`RuntimePort::post`].
    fn request(&self, message: RuntimeMessage) -> Option<RuntimeResponse>;
}

/// Port over a [`LocalEndpoint`].
///
/// Posts that arrive while a request is waiting are queued and handed out by
/// [`ChannelPort::take_inbox`].
pub struct ChannelPort {
    endpoint: LocalEndpoint,
    next_request_id: Cell<u64>,
    request_timeout: Duration,
    inbox: RefCell<VecDeque<RuntimeMessage>>,
}

impl ChannelPort {
    pub fn new(endpoint: LocalEndpoint) -> Self {
        Self {
            endpoint,
            next_request_id: Cell::new(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            inbox: RefCell::new(VecDeque::new()),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Drains incoming posts (broadcasts from the other side).
    pub fn take_inbox(&self) -> Vec<RuntimeMessage> {
        let mut inbox = self.inbox.borrow_mut();
        loop {
            match self.endpoint.try_recv() {
                Ok(Some(Envelope::Post { message })) => inbox.push_back(message),
                Ok(Some(other)) => {
                    tracing::debug!(?other, "dropping unexpected envelope");
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::debug!(%error, "dropping undecodable envelope");
                }
            }
        }
        inbox.drain(..).collect()
    }
}

impl RuntimePort for ChannelPort {
    fn post(&self, message: RuntimeMessage) {
        if let Err(error) = self.endpoint.send(&Envelope::Post { message }) {
            tracing::debug!(%error, "runtime post dropped");
        }
    }

    fn request(&self, message: RuntimeMessage) -> Option<RuntimeResponse> {
        let id = self.next_request_id.get();
        self.next_request_id.set(id.wrapping_add(1));

        let action = message.action();
        if let Err(error) = self.endpoint.send(&Envelope::Request { id, message }) {
            tracing::debug!(%error, action, "runtime request dropped");
            return None;
        }

        let deadline = Instant::now() + self.request_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::debug!(action, "runtime request timed out");
                return None;
            }

            match self.endpoint.recv_timeout(remaining) {
                Ok(Envelope::Response {
                    id: answered,
                    response,
                }) if answered == id => return Some(response),
                Ok(Envelope::Post { message }) => self.inbox.borrow_mut().push_back(message),
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(%error, action, "runtime request got no answer");
                    return None;
                }
            }
        }
    }
}

/// In-memory port that records posts and answers requests from a callback.
pub struct MemoryPort {
    posted: RefCell<Vec<RuntimeMessage>>,
    answer: Box<dyn Fn(&RuntimeMessage) -> Option<RuntimeResponse>>,
}

impl MemoryPort {
    /// A port nobody listens on: requests go unanswered.
    pub fn silent() -> Self {
        Self::answering(|_| None)
    }

    pub fn answering(answer: impl Fn(&RuntimeMessage) -> Option<RuntimeResponse> + 'static) -> Self {
        Self {
            posted: RefCell::new(Vec::new()),
            answer: Box::new(answer),
        }
    }

    pub fn posted(&self) -> Vec<RuntimeMessage> {
        self.posted.borrow().clone()
    }

    pub fn take_posted(&self) -> Vec<RuntimeMessage> {
        std::mem::take(&mut *self.posted.borrow_mut())
    }
}

impl RuntimePort for MemoryPort {
    fn post(&self, message: RuntimeMessage) {
        self.posted.borrow_mut().push(message);
    }

    fn request(&self, message: RuntimeMessage) -> Option<RuntimeResponse> {
        (self.answer)(&message)
    }
}
