//! Abort-key monitoring during a run.
//!
//! While the agent loop is busy, raw key events are watched for the
//! configured abort key. Other printable keys are not lost: they are
//! buffered and handed back when monitoring stops, so typed-ahead input
//! survives a long turn.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::agent::cancel::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Char(char),
    Other,
}

/// Raw terminal key source. The binary provides a crossterm-backed
/// implementation; tests feed a channel directly.
#[async_trait]
pub trait RawKeyCapture: Send + Sync {
    /// Whether a real interactive terminal is attached.
    fn is_interactive(&self) -> bool;

    /// Enter raw capture and return the key stream.
    async fn start(&self) -> anyhow::Result<mpsc::UnboundedReceiver<KeyPress>>;

    /// Leave raw capture, restoring the terminal.
    async fn stop(&self);
}

pub struct KeyboardMonitor {
    capture: Arc<dyn RawKeyCapture>,
    abort: AbortHandle,
    abort_key: char,
    buffered: Arc<Mutex<String>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardMonitor {
    pub fn new(capture: Arc<dyn RawKeyCapture>, abort: AbortHandle, abort_key: char) -> Self {
        Self {
            capture,
            abort,
            abort_key,
            buffered: Arc::new(Mutex::new(String::new())),
            task: Mutex::new(None),
        }
    }

    /// Begin watching for the abort key. No-op without an interactive
    /// terminal or when already watching.
    pub async fn start(&self) -> anyhow::Result<()> {
        if !self.capture.is_interactive() {
            debug!("No interactive terminal, abort key monitoring disabled");
            return Ok(());
        }
        if self.task.lock().is_some() {
            return Ok(());
        }

        let mut keys = self.capture.start().await?;
        let abort = self.abort.clone();
        let abort_key = self.abort_key;
        let buffered = self.buffered.clone();

        let handle = tokio::spawn(async move {
            while let Some(key) = keys.recv().await {
                match key {
                    KeyPress::Char(c) if c == abort_key => {
                        info!(key = %c, "Abort key pressed");
                        abort.set(format!("abort key '{c}' pressed"));
                    }
                    KeyPress::Char(c) => {
                        buffered.lock().push(c);
                    }
                    KeyPress::Other => {}
                }
            }
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stop watching and return any keystrokes typed during the run.
    pub async fn stop(&self) -> String {
        self.capture.stop().await;
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        std::mem::take(&mut *self.buffered.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCapture {
        tx: Mutex<Option<mpsc::UnboundedSender<KeyPress>>>,
        rx: Mutex<Option<mpsc::UnboundedReceiver<KeyPress>>>,
    }

    impl FakeCapture {
        fn new() -> (Arc<Self>, mpsc::UnboundedSender<KeyPress>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    tx: Mutex::new(Some(tx.clone())),
                    rx: Mutex::new(Some(rx)),
                }),
                tx,
            )
        }
    }

    #[async_trait]
    impl RawKeyCapture for FakeCapture {
        fn is_interactive(&self) -> bool {
            true
        }

        async fn start(&self) -> anyhow::Result<mpsc::UnboundedReceiver<KeyPress>> {
            Ok(self.rx.lock().take().expect("started twice"))
        }

        async fn stop(&self) {
            self.tx.lock().take();
        }
    }

    #[tokio::test]
    async fn abort_key_raises_handle_and_other_keys_buffer() {
        let (capture, tx) = FakeCapture::new();
        let abort = AbortHandle::new();
        let monitor = KeyboardMonitor::new(capture, abort.clone(), 'q');
        monitor.start().await.unwrap();

        tx.send(KeyPress::Char('h')).unwrap();
        tx.send(KeyPress::Char('i')).unwrap();
        tx.send(KeyPress::Other).unwrap();
        tx.send(KeyPress::Char('q')).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(abort.is_set());
        assert!(abort.reason().unwrap().contains('q'));

        let typed = monitor.stop().await;
        assert_eq!(typed, "hi");
    }
}
