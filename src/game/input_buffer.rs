//! Lock-free input buffer between the input side and the game tick
//!
//! Uses crossbeam-channel so the presentation layer (or the headless bot)
//! can submit input without blocking, and the tick drains everything that
//! arrived since the previous tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::player::LocalInput;

/// One input event from the local player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Current state of the held movement keys
    Keys(LocalInput),
    /// Attack key pressed
    Kick,
}

/// Everything the tick needs from one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub keys: LocalInput,
    pub kick: bool,
}

pub struct InputBuffer {
    sender: Sender<InputEvent>,
    receiver: Receiver<InputEvent>,
    capacity: usize,
    /// Keys persist across ticks until the input side reports a change
    held: LocalInput,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            held: LocalInput::default(),
        }
    }

    /// Create a new sender handle for the input side
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Try to submit an event (non-blocking)
    ///
    /// Returns true if successful, false if buffer is full
    #[inline]
    pub fn try_submit(&self, event: InputEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    /// Drain all pending events in arrival order
    pub fn drain(&self) -> Vec<InputEvent> {
        self.receiver.try_iter().collect()
    }

    /// Collapse pending events into one frame: the latest key state wins
    /// and any number of kicks since the last tick count as one
    pub fn drain_frame(&mut self) -> InputFrame {
        let mut kick = false;
        for event in self.receiver.try_iter() {
            match event {
                InputEvent::Keys(keys) => self.held = keys,
                InputEvent::Kick => kick = true,
            }
        }
        InputFrame {
            keys: self.held,
            kick,
        }
    }

    /// Forget held keys, e.g. when the game restarts
    pub fn release_all(&mut self) {
        self.held = LocalInput::default();
        self.receiver.try_iter().for_each(drop);
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        // A few seconds of key changes at 60 Hz
        Self::new(256)
    }
}

/// Clonable sender handle for the input side
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputEvent>,
}

impl InputSender {
    /// Submit an event (non-blocking)
    #[inline]
    pub fn try_send(&self, event: InputEvent) -> Result<(), InputBufferError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => InputBufferError::Full,
            TrySendError::Disconnected(_) => InputBufferError::Disconnected,
        })
    }

    pub fn keys(&self, keys: LocalInput) -> Result<(), InputBufferError> {
        self.try_send(InputEvent::Keys(keys))
    }

    pub fn kick(&self) -> Result<(), InputBufferError> {
        self.try_send(InputEvent::Kick)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    /// Buffer is full (backpressure)
    #[error("input buffer full")]
    Full,
    /// Game loop stopped
    #[error("input buffer disconnected")]
    Disconnected,
}
