use std::sync::Mutex;

use {async_trait::async_trait, tokio::sync::mpsc};

use imbridge_accounts::{Error, Result};

/// Outbound half of an XMPP stream.
///
/// `write_stanza` returns once the stanza is queued, not once it is
/// delivered. Stanzas written in sequence by one caller keep their order.
#[async_trait]
pub trait StanzaWriter: Send + Sync {
    async fn write_stanza(&self, stanza: String) -> Result<()>;
}

/// Writer that queues stanzas onto the connection's write loop.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    sender: mpsc::Sender<String>,
}

impl ChannelWriter {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    /// Build a writer together with the receiver the write loop drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl StanzaWriter for ChannelWriter {
    async fn write_stanza(&self, stanza: String) -> Result<()> {
        self.sender
            .send(stanza)
            .await
            .map_err(|_| Error::Write("xmpp stream closed".into()))
    }
}

/// Writer that keeps every stanza in memory, for previews and tests.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    written: Mutex<Vec<String>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.written.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl StanzaWriter for MemoryWriter {
    async fn write_stanza(&self, stanza: String) -> Result<()> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(stanza);
        Ok(())
    }
}
