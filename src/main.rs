//! MiniKV - A minimal replicated transactional key-value store
//!
//! This is an educational implementation demonstrating core distributed
//! database concepts:
//! - Available-copies replication over ten data sites
//! - Strict two-phase locking with lock-conflict classification
//! - Multiversion snapshot reads for read-only transactions
//! - Waits-for-graph deadlock detection with youngest-victim aborts
//! - Site failure and recovery with per-variable invalidation
//!
//! Architecture Overview:
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Input Script / TCP Clients                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Driver (Lexer → Parser)                   │
//! │        (one command per line, one clock tick each)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Coordinator                           │
//! │   (available copies, waits-for graph, waitlist, aborts)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Sites 1..10                              │
//! │        (lock tables, multiversion variable stores)          │
//! └─────────────────────────────────────────────────────────────┘

use std::io::Read;

use log::info;

use minikv::driver::Driver;
use minikv::{Config, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn")
    ).init();

    // Parse command line arguments (simple)
    let args: Vec<String> = std::env::args().collect();

    let mut config = Config::default();
    let mut serve = false;
    let mut json_dump = false;
    let mut script: Option<String> = None;

    // Simple argument parsing
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--serve" | "-s" => {
                serve = true;
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    let port: u16 = args[i + 1].parse()?;
                    config.bind_addr = format!("127.0.0.1:{}", port).parse()?;
                    i += 1;
                }
            }
            "--json" | "-j" => {
                json_dump = true;
            }
            "--help" | "-h" => {
                println!("MiniKV - A minimal replicated transactional key-value store");
                println!();
                println!("Usage: minikv [OPTIONS] [SCRIPT]");
                println!();
                println!("Runs the commands in SCRIPT (or standard input) one per line:");
                println!("  begin(T1) beginRO(T2) R(T1,x4) W(T1,x6,101)");
                println!("  fail(3) recover(3) end(T1) dump()");
                println!();
                println!("Options:");
                println!("  -s, --serve           Serve commands over TCP instead");
                println!("  -p, --port PORT       Port to listen on (default: 7777)");
                println!("  -j, --json            Print the final state as JSON");
                println!("  -h, --help            Show this help");
                return Ok(());
            }
            other => {
                script = Some(other.to_string());
            }
        }
        i += 1;
    }

    if serve {
        info!("Starting MiniKV server...");
        let server = Server::new(config);
        server.run().await?;
        return Ok(());
    }

    let mut driver = Driver::new();
    let output = match script {
        Some(path) => driver.run_file(&path)?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            driver.run_script(&text)?
        }
    };
    for status in output {
        println!("{}", status);
    }
    if json_dump {
        println!("{}", driver.dump_json()?);
    }

    Ok(())
}
