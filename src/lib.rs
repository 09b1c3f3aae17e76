use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use log::{info, error};

pub mod clock;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod graph;
pub mod lexer;
pub mod lock;
pub mod parser;
pub mod protocol;
pub mod site;
pub mod txn;
pub mod types;
pub mod variable;

use crate::driver::Driver;
use crate::protocol::ConnectionHandler;

/// Server configuration
#[derive(Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7777".parse().expect("invalid default bind address"),
        }
    }
}

/// The command server: a line-protocol front end over one shared driver
pub struct Server {
    config: Config,
    driver: Arc<Mutex<Driver>>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            driver: Arc::new(Mutex::new(Driver::new())),
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("MiniKV server listening on {}", self.config.bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let driver = Arc::clone(&self.driver);

                    // Spawn a task to handle this connection
                    tokio::spawn(async move {
                        let handler = ConnectionHandler::new(stream, driver);
                        if let Err(e) = handler.run().await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                        info!("Connection closed: {}", addr);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
