//! veil server binary
//!
//! Usage: veil-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>         Run the server with a configuration file
//!   -g, --generate [KDF]        Generate new server configuration (x963 or hkdf)
//!   --client-config <FILE>      Print the client configuration for a server config
//!   -h, --help                  Print help information

use std::env;

use veil::crypto::KeyDerivation;
use veil::server::{Server, ServerConfig, ServerConfigFile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; respects RUST_LOG (e.g. RUST_LOG=debug)
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
        "-g" | "--generate" => {
            let kdf = match args.get(2) {
                Some(name) => match KeyDerivation::from_name(name) {
                    Some(kdf) => kdf,
                    None => {
                        eprintln!("Error: unknown key derivation '{}' (x963 or hkdf)", name);
                        return Ok(());
                    }
                },
                None => KeyDerivation::default(),
            };
            generate_config(kdf)?;
        }
        "-c" | "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a file path");
                return Ok(());
            }
            run_server(&args[2]).await?;
        }
        "--client-config" => {
            if args.len() < 3 {
                eprintln!("Error: --client-config requires a config file path");
                return Ok(());
            }
            let server_addr = args.get(3).map(String::as_str).unwrap_or("YOUR_SERVER_IP");
            print_client_config(&args[2], server_addr)?;
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
        r#"veil server - obfuscated transport endpoint

USAGE:
    veil-server [OPTIONS]

OPTIONS:
    -c, --config <FILE>                 Run the server with a configuration file
    -g, --generate [x963|hkdf]          Generate new server configuration
    --client-config <FILE> [ADDR]       Print client.json for an existing config
    -h, --help                          Print help information

EXAMPLES:
    Generate a new configuration:
        veil-server --generate > server.toml

    Run the server:
        veil-server --config server.toml

    Hand out client configuration:
        veil-server --client-config server.toml 203.0.113.7 > client.json
"#
    );
}

fn generate_config(kdf: KeyDerivation) -> anyhow::Result<()> {
    let mut config = ServerConfig::new_random("0.0.0.0", 8443)?;
    config.handshake = config.handshake.with_kdf(kdf);
    let config_file = ServerConfigFile::from_config(&config);

    println!("# veil server configuration");
    println!("# Generated: {}", chrono::Utc::now());
    println!("# Frame size: {} bytes", config.handshake.chunk_size());
    println!("# Key derivation: {}", kdf.as_str());
    println!();
    println!("{}", toml::to_string_pretty(&config_file)?);
    println!();
    println!("# Client configuration (put this in client.json):");
    let client_json = serde_json::to_string_pretty(&config.client_config("YOUR_SERVER_IP"))?;
    for line in client_json.lines() {
        println!("# {}", line);
    }

    Ok(())
}

fn load_config(config_path: &str) -> anyhow::Result<ServerConfig> {
    let content = std::fs::read_to_string(config_path)?;
    let config_file: ServerConfigFile = toml::from_str(&content)?;
    Ok(config_file.to_config()?)
}

fn print_client_config(config_path: &str, server_addr: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&config.client_config(server_addr))?
    );
    Ok(())
}

async fn run_server(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    tracing::info!(
        "Starting veil server on {}:{}",
        config.listen_addr,
        config.listen_port
    );
    tracing::info!(
        "Frame size {} bytes, key derivation {}",
        config.handshake.chunk_size(),
        config.handshake.kdf().as_str()
    );
    match &config.forward_addr {
        Some(addr) => tracing::info!("Relaying to {}", addr),
        None => tracing::info!("No forward_addr configured, echoing records"),
    }
    if let Some(mimicry) = &config.mimicry {
        tracing::info!("Mimicry selector: {}", mimicry.selector);
    }

    let server = Server::new(config);
    server.run().await?;

    Ok(())
}
