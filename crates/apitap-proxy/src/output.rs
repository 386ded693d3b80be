//! Background draining of child process output.
//!
//! A child whose pipe is never read blocks once the pipe buffer fills, so
//! every piped stream gets a reader thread. Only the first
//! [`MAX_CAPTURED_BYTES`] are kept; the rest is read and discarded.

use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Upper bound on captured output per stream.
pub const MAX_CAPTURED_BYTES: usize = 64 * 1024;

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Collects a child's output stream on a background thread.
#[derive(Debug)]
pub(crate) struct OutputCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputCollector {
    /// Starts draining `reader`.
    pub(crate) fn spawn<R>(mut reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let handle = std::thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buffer = sink.lock();
                        let room = MAX_CAPTURED_BYTES.saturating_sub(buffer.len());
                        buffer.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        });

        Self {
            buffer,
            handle: Some(handle),
        }
    }

    /// Output captured so far, lossily decoded.
    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Waits up to `timeout` for end of stream and returns the output.
    ///
    /// A grandchild can keep the pipe open after the child exits, so the
    /// reader thread is left running if it has not finished in time.
    pub(crate) fn finish(&mut self, timeout: Duration) -> String {
        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(JOIN_POLL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        self.text()
    }
}
