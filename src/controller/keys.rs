//! Key presses that steer a running controller.

use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, warn};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    /// `s`: write the current grid as an image
    Save,
    /// `q`: stop after the in-flight turn, leaving the run on the master
    Detach,
}

impl KeyCommand {
    pub fn from_char(key: char) -> Option<Self> {
        match key {
            's' | 'S' => Some(KeyCommand::Save),
            'q' | 'Q' => Some(KeyCommand::Detach),
            _ => None,
        }
    }
}

/// Puts the terminal in raw mode until dropped.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("⚠️ Failed to restore terminal mode: {}", e);
        }
    }
}

/// Forward key presses from the terminal into `keys` on a blocking thread.
///
/// Raw mode swallows SIGINT, so Ctrl+C is turned into a cancel of
/// `shutdown` here. The thread ends when `shutdown` fires or the receiver
/// is dropped.
pub fn spawn_key_reader(
    keys: mpsc::Sender<char>,
    shutdown: CancellationToken,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !shutdown.is_cancelled() && !keys.is_closed() {
            match event::poll(POLL_INTERVAL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!("⚠️ Key polling failed: {}", e);
                    break;
                }
            }
            let key = match event::read() {
                Ok(TermEvent::Key(key)) if key.kind == KeyEventKind::Press => key,
                Ok(_) => continue,
                Err(e) => {
                    warn!("⚠️ Key read failed: {}", e);
                    break;
                }
            };
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    debug!("🛑 Ctrl+C pressed");
                    shutdown.cancel();
                }
                KeyCode::Char(c) => {
                    if keys.blocking_send(c).is_err() {
                        break;
                    }
                }
                _ => {}
            }
        }
        debug!("Key reader stopped");
    })
}
