
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::token::Token;

// ---------------------------------------------------------------------------
// Port — multi-producer / multi-consumer buffered channel
// ---------------------------------------------------------------------------

/// A buffered channel between steps, addressable by reader identity.
///
/// Every token ever `put` stays in the buffer; each reader holds its own
/// cursor and observes the full sequence exactly once, in insertion order.
/// Closing the port for a reader releases that reader's pending or future
/// `get` with a `Termination` token once its cursor has drained the buffer.
pub struct Port {
    name: String,
    persistent_id: i64,
    state: Mutex<PortState>,
    notify: Notify,
}

#[derive(Default)]
struct PortState {
    items: Vec<Token>,
    /// Per-reader position into `items`.
    cursors: HashMap<String, usize>,
    /// Readers for which end-of-stream has been signalled.
    closed: HashSet<String>,
    /// Whether any non-termination token was ever put.
    has_data: bool,
}

impl Port {
    pub fn new(name: impl Into<String>, persistent_id: i64) -> Self {
        Self {
            name: name.into(),
            persistent_id,
            state: Mutex::new(PortState::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persistent_id(&self) -> i64 {
        self.persistent_id
    }

    /// Append a token and wake all waiting readers.
    pub fn put(&self, token: Token) {
        {
            let mut state = self.state.lock().expect("port lock poisoned");
            if !token.is_termination() {
                state.has_data = true;
            }
            state.items.push(token);
        }
        // Notify after releasing the lock so woken readers can acquire it
        // immediately.
        self.notify.notify_waiters();
    }

    /// Return the next token for `reader`, waiting until one is available.
    ///
    /// If the port has been closed for `reader` and its cursor has drained
    /// the buffer, returns `Termination`.
    pub async fn get(&self, reader: &str) -> Token {
        loop {
            // Register the waiter before inspecting state, so a `put` or
            // `close` racing with the check cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut guard = self.state.lock().expect("port lock poisoned");
                let state = &mut *guard;
                let cursor = state.cursors.entry(reader.to_string()).or_insert(0);
                if *cursor < state.items.len() {
                    let token = state.items[*cursor].clone();
                    *cursor += 1;
                    return token;
                }
                if state.closed.contains(reader) {
                    return Token::Termination;
                }
            }

            notified.await;
        }
    }

    /// Mark end-of-stream for `reader`.
    pub fn close(&self, reader: &str) {
        {
            let mut state = self.state.lock().expect("port lock poisoned");
            state.closed.insert(reader.to_string());
        }
        log::debug!("port {} closed for reader {reader}", self.name);
        self.notify.notify_waiters();
    }

    /// True iff no non-termination token has ever been put.
    pub fn empty(&self) -> bool {
        !self.state.lock().expect("port lock poisoned").has_data
    }

    /// Whether end-of-stream has been signalled for `reader`.
    pub fn closed_for(&self, reader: &str) -> bool {
        self.state
            .lock()
            .expect("port lock poisoned")
            .closed
            .contains(reader)
    }

    /// Number of tokens ever put, termination markers included.
    pub fn size(&self) -> usize {
        self.state.lock().expect("port lock poisoned").items.len()
    }

    /// Snapshot of the full buffer, for inspection after a run.
    pub fn snapshot(&self) -> Vec<Token> {
        self.state
            .lock()
            .expect("port lock poisoned")
            .items
            .clone()
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("port lock poisoned");
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("persistent_id", &self.persistent_id)
            .field("items", &state.items.len())
            .field("readers", &state.cursors.len())
            .finish()
    }
}
