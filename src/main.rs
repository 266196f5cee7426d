//! flashkv-cli - Pipelined Command-Line Client
//!
//! Connects to a Redis-compatible server, dispatches every command given on
//! the command line and prints the replies in order. Commands are separated
//! by a lone `;` argument.

use flashkv_client::command::RawOutput;
use flashkv_client::{Charset, CommandArgs, Connection, ConnectionConfig, StringCodec};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Client configuration
struct Config {
    /// Host to connect to
    host: String,
    /// Port to connect to
    port: u16,
    /// Charset for arguments and replies
    charset: Charset,
    /// Send all commands in one write
    pipeline: bool,
    /// Commands to run, each as keyword plus arguments
    commands: Vec<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: flashkv_client::DEFAULT_HOST.to_string(),
            port: flashkv_client::DEFAULT_PORT,
            charset: Charset::host_default(),
            pipeline: false,
            commands: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();
        let mut current: Vec<String> = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" if current.is_empty() => {
                    config.host = required_value(&args, i, "--host");
                    i += 2;
                }
                "--port" | "-p" if current.is_empty() => {
                    config.port = required_value(&args, i, "--port")
                        .parse()
                        .unwrap_or_else(|_| fail("invalid port number"));
                    i += 2;
                }
                "--charset" | "-c" if current.is_empty() => {
                    let name = required_value(&args, i, "--charset");
                    config.charset =
                        Charset::from_name(&name).unwrap_or_else(|e| fail(&e.to_string()));
                    i += 2;
                }
                "--pipeline" if current.is_empty() => {
                    config.pipeline = true;
                    i += 1;
                }
                "--help" if current.is_empty() => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" if current.is_empty() => {
                    println!("flashkv-cli version {}", flashkv_client::VERSION);
                    std::process::exit(0);
                }
                ";" => {
                    if !current.is_empty() {
                        config.commands.push(std::mem::take(&mut current));
                    }
                    i += 1;
                }
                other => {
                    current.push(other.to_string());
                    i += 1;
                }
            }
        }

        if !current.is_empty() {
            config.commands.push(current);
        }
        if config.commands.is_empty() {
            config.commands.push(vec!["PING".to_string()]);
        }

        config
    }

    /// Returns the server address as a string
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn required_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => fail(&format!("{} requires a value", flag)),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"
flashkv-cli - Pipelined client for Redis-compatible servers

USAGE:
    flashkv-cli [OPTIONS] [COMMAND [ARGS...]] [; COMMAND [ARGS...]]...

OPTIONS:
    -h, --host <HOST>        Host to connect to (default: 127.0.0.1)
    -p, --port <PORT>        Port to connect to (default: 6379)
    -c, --charset <NAME>     Charset for keys and values (default: from locale)
        --pipeline           Send all commands in a single write
    -v, --version            Print version information
        --help               Print this help message

EXAMPLES:
    flashkv-cli PING
    flashkv-cli SET name Ariz ';' GET name
    flashkv-cli --pipeline INCR hits ';' INCR hits ';' INCR hits

LOGGING:
    Set RUST_LOG=flashkv_client=trace to see every dispatch and flush.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let codec = StringCodec::new(config.charset);
    let connection_config = ConnectionConfig {
        auto_flush: !config.pipeline,
        ..ConnectionConfig::default()
    };

    let conn = Connection::connect(config.address(), codec, connection_config).await?;
    info!(address = %config.address(), charset = %config.charset, "Connected");

    let mut streams = Vec::with_capacity(config.commands.len());
    for command in &config.commands {
        let (keyword, rest) = command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("empty command"))?;
        let args = CommandArgs::new().add_values(rest.iter().cloned());
        streams.push(conn.dispatch_with_args(keyword.to_uppercase(), RawOutput, args)?);
    }

    if config.pipeline {
        conn.flush_commands();
        debug!(commands = streams.len(), "Pipeline flushed");
    }

    for stream in streams {
        match stream.single().await {
            Ok(reply) => println!("{}", reply),
            Err(e) => println!("(error) {}", e),
        }
    }

    conn.close();
    Ok(())
}
