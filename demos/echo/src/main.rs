//! Serve and query an echo protocol over encrypted sessions.
//!
//! # Usage
//!
//! ## Server
//!
//! ```sh
//! cargo run --release --bin parley-echo -- server --config demos/echo/echo.vars --port 2525
//! ```
//!
//! Pass `--ping` to serve the `PING`/`PONG` protocol instead of echoing.
//!
//! ## Client
//!
//! ```sh
//! cargo run --release --bin parley-echo -- client --config demos/echo/echo.vars --port 2525
//! ```
//!
//! Every line read from stdin is sent to the server and every response is printed.

mod handlers;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use parley_client::{Client, Config as ClientConfig};
use parley_codec::Document;
use parley_server::{Config as ServerConfig, Handler, Server};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

fn document(matches: &ArgMatches) -> Option<Document> {
    let path = matches.get_one::<String>("config")?;
    Some(Document::load(path).expect("Unable to load config"))
}

async fn serve(matches: &ArgMatches) {
    let cfg = match document(matches) {
        Some(doc) => ServerConfig::from_document(&doc).expect("Invalid server config"),
        None => ServerConfig::default(),
    };
    let host = matches.get_one::<String>("host").expect("Please provide host");
    let port = *matches.get_one::<u16>("port").expect("Please provide port");
    let handler: Arc<dyn Handler> = if matches.get_flag("ping") {
        Arc::new(handlers::Ping)
    } else {
        Arc::new(handlers::Echo)
    };

    let mut server = Server::new(cfg);
    server.load(handler).expect("Unable to load handler");
    let address = server.start(host, port).await.expect("Unable to start server");
    info!(?address, "serving");

    tokio::signal::ctrl_c().await.expect("Unable to listen for shutdown");
    match server.stop().await {
        Ok(closed) => info!(closed, "shutdown complete"),
        Err(err) => error!(?err, "shutdown failed"),
    }
}

/// Input raced by the client loop.
enum Event {
    Line(Option<String>),
    Response(String),
}

async fn query(matches: &ArgMatches) {
    let cfg = match document(matches) {
        Some(doc) => ClientConfig::from_document(&doc).expect("Invalid client config"),
        None => ClientConfig::default(),
    };
    let host = matches.get_one::<String>("host").expect("Please provide host");
    let port = *matches.get_one::<u16>("port").expect("Please provide port");

    let mut client = Client::connect(cfg, host, port)
        .await
        .expect("Unable to connect");
    client.wait_until_ready().await.expect("Handshake failed");
    info!(address = ?client.peer_addr(), "connected");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let event = tokio::select! {
            line = lines.next_line() => Event::Line(line.ok().flatten()),
            response = client.wait_for_response() => Event::Response(response),
        };
        match event {
            Event::Line(None) => break,
            Event::Line(Some(line)) => {
                if let Err(err) = client.send(&line, false) {
                    error!(?err, "unable to send");
                    break;
                }
            }
            Event::Response(response) if response.is_empty() => {
                info!("server closed the connection");
                break;
            }
            Event::Response(response) => print!("{response}"),
        }
    }
    client.disconnect().await;
}

#[tokio::main]
async fn main() {
    // Parse arguments
    let connection_args = [
        Arg::new("config")
            .long("config")
            .required(false)
            .help("Configuration file with a network section"),
        Arg::new("host")
            .long("host")
            .default_value("127.0.0.1"),
        Arg::new("port")
            .long("port")
            .default_value("2525")
            .value_parser(value_parser!(u16)),
    ];
    let matches = Command::new("parley-echo")
        .about("serve and query an echo protocol over encrypted sessions")
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("server")
                .about("accept connections and answer them")
                .args(connection_args.clone())
                .arg(
                    Arg::new("ping")
                        .long("ping")
                        .action(ArgAction::SetTrue)
                        .help("Answer PING with PONG instead of echoing"),
                ),
        )
        .subcommand(
            Command::new("client")
                .about("send stdin lines to a server and print responses")
                .args(connection_args),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag("verbose") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match matches.subcommand() {
        Some(("server", matches)) => serve(matches).await,
        Some(("client", matches)) => query(matches).await,
        _ => unreachable!("subcommand is required"),
    }
}
