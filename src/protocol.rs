//! Line protocol for MiniKV
//!
//! A deliberately small front end: each received line is one script command,
//! executed against the shared driver, and the resulting status text is
//! written back. Multi-line status blocks (replay output, dumps) are sent as
//! consecutive lines. Commands arrive from concurrent connections but the
//! driver is behind a mutex, so the system keeps its one-command-at-a-time
//! semantics and the clock still ticks once per command.

use std::sync::{Arc, Mutex};

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::driver::Driver;
use crate::error::Result;

/// Handles a single client connection
pub struct ConnectionHandler {
    stream: TcpStream,
    driver: Arc<Mutex<Driver>>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, driver: Arc<Mutex<Driver>>) -> Self {
        Self { stream, driver }
    }

    /// Run the connection handler (main loop)
    pub async fn run(self) -> Result<()> {
        let (reader, mut writer) = self.stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            debug!("received line: {}", line);
            // Execute outside any await so the lock is never held across one
            let outcome = {
                let mut driver = self.driver.lock().expect("driver lock poisoned");
                driver.execute_line(&line)
            };
            match outcome {
                Ok(Some(status)) => {
                    writer.write_all(status.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                }
                Ok(None) => {}
                Err(e) => {
                    writer.write_all(format!("ERROR: {}\n", e).as_bytes()).await?;
                }
            }
        }
        Ok(())
    }
}
