//! Serial link to the robot controller.
//!
//! The port itself is guarded by a plain mutex held only across individual
//! reads/writes. Movement sequencing uses a separate async lock: a timed move
//! holds it for its whole window so no other movement can interleave, while a
//! stop command bypasses the lock and preempts the wait.

use std::{
    io::{Read, Write},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use serialport::SerialPort;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::debug;

use crate::control::chat::STOP_CODE;

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Controllers reset on port open; give the firmware time to come back up.
const SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Wait before polling for a reply, matching the firmware's response cadence.
const REPLY_DELAY: Duration = Duration::from_millis(100);

type Port = Arc<Mutex<Box<dyn SerialPort>>>;

pub struct SerialLink {
    port: Port,
    move_lock: AsyncMutex<()>,
    stop_signal: Notify,
}

impl SerialLink {
    /// Open the device at 115200 8N1 and wait out the controller reset.
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("opening serial device {path}"))?;
        thread::sleep(SETTLE_DELAY);
        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            move_lock: AsyncMutex::new(()),
            stop_signal: Notify::new(),
        })
    }

    /// Send one code and collect a pending reply line, if any. A stop code
    /// preempts any in-flight timed move instead of queuing behind it.
    pub async fn send_immediate(&self, code: char) -> Result<Option<String>> {
        let _guard = if code == STOP_CODE {
            self.stop_signal.notify_waiters();
            None
        } else {
            Some(self.move_lock.lock().await)
        };

        self.write_code(code).await?;
        tokio::time::sleep(REPLY_DELAY).await;
        self.read_reply().await
    }

    /// Send a movement code, hold the move lock for `duration`, then stop.
    /// A stop command arriving meanwhile cuts the wait short.
    pub async fn send_timed(&self, code: char, duration: Duration) -> Result<()> {
        let _guard = self.move_lock.lock().await;
        self.write_code(code).await?;

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.stop_signal.notified() => {
                debug!("timed move preempted by stop");
            }
        }

        self.write_code(STOP_CODE).await
    }

    async fn write_code(&self, code: char) -> Result<()> {
        let port = self.port.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_port(&port);
            guard
                .write_all(&[code as u8])
                .context("serial write failed")
        })
        .await
        .context("serial writer task failed")?
    }

    async fn read_reply(&self) -> Result<Option<String>> {
        let port = self.port.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_port(&port);
            let pending = guard
                .bytes_to_read()
                .context("failed to query serial input")?;
            if pending == 0 {
                return Ok(None);
            }
            let mut buf = vec![0u8; pending as usize];
            let n = guard.read(&mut buf).context("serial read failed")?;
            let text = String::from_utf8_lossy(&buf[..n]).trim().to_string();
            Ok(if text.is_empty() { None } else { Some(text) })
        })
        .await
        .context("serial reader task failed")?
    }
}

fn lock_port(port: &Port) -> MutexGuard<'_, Box<dyn SerialPort>> {
    match port.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
