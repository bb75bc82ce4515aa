//! Scripted in-memory transport for tests
//!
//! The test keeps a [`MockHandle`] to inject server frames, inspect what the
//! client sent, and simulate transport loss after the transport itself has
//! moved into a `SessionConnection`.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::net::protocol::{decode, encode, ClientMessage, PlayerId, ServerMessage};
use crate::net::transport::{Transport, TransportError, TransportEvent};

/// How `open` behaves
#[derive(Debug, Clone)]
pub enum OpenBehavior {
    Accept(PlayerId),
    Fail(String),
    /// Never completes
    Hang,
}

type Responder = Box<dyn FnMut(&ClientMessage) -> Vec<ServerMessage> + Send>;

#[derive(Default)]
struct Shared {
    sent: Vec<ClientMessage>,
    opens: usize,
    closes: usize,
    responder: Option<Responder>,
}

pub struct MockTransport {
    behavior: OpenBehavior,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
    shared: Arc<Mutex<Shared>>,
    open: bool,
}

#[derive(Clone)]
pub struct MockHandle {
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    pub fn new(behavior: OpenBehavior) -> (Self, MockHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let handle = MockHandle {
            inbound_tx: inbound_tx.clone(),
            shared: shared.clone(),
        };
        (
            Self {
                behavior,
                inbound_tx,
                inbound_rx,
                shared,
                open: false,
            },
            handle,
        )
    }

    pub fn accepting(player_id: &str) -> (Self, MockHandle) {
        Self::new(OpenBehavior::Accept(player_id.to_string()))
    }
}

impl Transport for MockTransport {
    async fn open(&mut self) -> Result<PlayerId, TransportError> {
        self.shared.lock().unwrap().opens += 1;
        match self.behavior.clone() {
            OpenBehavior::Accept(id) => {
                self.open = true;
                Ok(id)
            }
            OpenBehavior::Fail(reason) => Err(TransportError::Connect(reason)),
            OpenBehavior::Hang => std::future::pending().await,
        }
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let message: ClientMessage = decode(&frame).expect("client sent invalid frame");
        let replies = {
            let mut shared = self.shared.lock().unwrap();
            shared.sent.push(message.clone());
            match shared.responder.as_mut() {
                Some(responder) => responder(&message),
                None => Vec::new(),
            }
        };
        for reply in replies {
            let _ = self
                .inbound_tx
                .send(TransportEvent::Message(encode(&reply).unwrap()));
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        if !self.open {
            return None;
        }
        self.inbound_rx.try_recv().ok()
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        if !self.open {
            return None;
        }
        self.inbound_rx.recv().await
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.shared.lock().unwrap().closes += 1;
            while self.inbound_rx.try_recv().is_ok() {}
        }
    }
}

impl MockHandle {
    /// Deliver a server message
    pub fn push(&self, message: ServerMessage) {
        let _ = self
            .inbound_tx
            .send(TransportEvent::Message(encode(&message).unwrap()));
    }

    /// Deliver raw bytes, e.g. malformed frames
    pub fn push_raw(&self, frame: &[u8]) {
        let _ = self.inbound_tx.send(TransportEvent::Message(frame.to_vec()));
    }

    /// Simulate transport-level loss
    pub fn drop_connection(&self, reason: &str) {
        let _ = self
            .inbound_tx
            .send(TransportEvent::Closed(Some(reason.to_string())));
    }

    /// Reply to outgoing messages automatically
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&ClientMessage) -> Vec<ServerMessage> + Send + 'static,
    {
        self.shared.lock().unwrap().responder = Some(Box::new(responder));
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.shared.lock().unwrap().sent.clone()
    }

    pub fn sent_events(&self) -> Vec<&'static str> {
        self.sent().iter().map(|m| m.event_name()).collect()
    }

    pub fn clear_sent(&self) {
        self.shared.lock().unwrap().sent.clear();
    }

    pub fn opens(&self) -> usize {
        self.shared.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().unwrap().closes
    }
}
