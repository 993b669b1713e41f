//! Crossterm-backed raw key capture.

use async_trait::async_trait;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::tty::IsTty;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use mantle_core::agent::keyboard::{KeyPress, RawKeyCapture};

#[derive(Default)]
pub struct CrosstermKeyCapture {
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl CrosstermKeyCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RawKeyCapture for CrosstermKeyCapture {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_tty()
    }

    async fn start(&self) -> anyhow::Result<mpsc::UnboundedReceiver<KeyPress>> {
        enable_raw_mode()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut events = EventStream::new();
            while let Some(event) = events.next().await {
                match event {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        let press = match key.code {
                            KeyCode::Char(c) => KeyPress::Char(c),
                            _ => KeyPress::Other,
                        };
                        if tx.send(press).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Key event read error: {}", e);
                        break;
                    }
                }
            }
        });
        *self.reader.lock() = Some(handle);
        Ok(rx)
    }

    async fn stop(&self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        let _ = disable_raw_mode();
    }
}
