//! veil client binary
//!
//! Usage: veil-client [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   -t, --test <FILE>    Test connection to server
//!   -h, --help           Print help information

use std::env;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use veil::transport::{dial, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "-h" | "--help" => {
            print_usage();
        }
        "-t" | "--test" => {
            if args.len() < 3 {
                eprintln!("Error: --test requires a config file path");
                return Ok(());
            }
            test_connection(&args[2]).await?;
        }
        "-c" | "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a file path");
                return Ok(());
            }
            run_client(&args[2]).await?;
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"veil client - obfuscated transport client

USAGE:
    veil-client [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to configuration file
    -t, --test <FILE>    Test connection using config file
    -h, --help           Print help information

CONFIGURATION FILE FORMAT (JSON):
    {{
        "server_addr": "server.example.com",
        "server_port": 8443,
        "handshake": {{
            "server_public_key": "<base64>",
            "chunk_size": 1234,
            "kdf": "x963"
        }},
        "mimicry": {{ "selector": "banner", "banner": {{ "lines": [] }} }}
    }}

EXAMPLES:
    Test connection:
        veil-client --test client.json

    Run interactive client:
        veil-client --config client.json
"#
    );
}

async fn test_connection(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    tracing::info!("Testing connection to {}:{}", config.server_addr, config.server_port);

    match dial(&config).await {
        Ok(mut conn) => {
            tracing::info!("Connection established successfully!");

            conn.send(b"Hello, veil!").await?;
            tracing::info!("Sent test message");

            match tokio::time::timeout(Duration::from_secs(5), conn.recv()).await {
                Ok(Ok(Some(data))) => {
                    tracing::info!("Received response: {} bytes", data.len());
                }
                Ok(Ok(None)) => {
                    tracing::info!("Server closed the connection");
                }
                Ok(Err(e)) => {
                    tracing::warn!("Receive error: {}", e);
                }
                Err(_) => {
                    tracing::info!("No response within timeout (this may be normal)");
                }
            }

            conn.close().await?;
            tracing::info!("Connection closed successfully");
        }
        Err(e) => {
            tracing::error!("Connection failed: {}", e);
        }
    }

    Ok(())
}

async fn run_client(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    tracing::info!("Connecting to {}:{}", config.server_addr, config.server_port);

    let conn = dial(&config).await?;
    let (mut reader, mut writer) = conn.into_split();

    tracing::info!("Connected. Type messages to send, Ctrl+D to exit.");

    let printer = tokio::spawn(async move {
        loop {
            match reader.recv().await {
                Ok(Some(data)) => match String::from_utf8(data) {
                    Ok(text) => println!("< {}", text),
                    Err(_) => println!("< [binary data]"),
                },
                Ok(None) => break,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let msg = line.trim();
        if msg.is_empty() {
            continue;
        }
        writer.send(msg.as_bytes()).await?;
    }

    writer.close().await?;
    let _ = printer.await;
    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<ClientConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ClientConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
