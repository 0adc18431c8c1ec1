//! Echo server on top of the tick-driven listener.
//!
//! One thread ticks the listener and every connection in turn, and writes
//! each received packet back to the connection that received it.

use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use socklane::{
	AcceptOutcome, Connection, ConnectionConfig, Listener, ListenerConfig, Packet, RecvOutcome,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "socklane-echo")]
#[command(about = "Tick-driven TCP echo server", long_about = None)]
struct Cli {
	#[arg(short, long, default_value = "127.0.0.1")]
	address: String,

	#[arg(short, long, default_value_t = 7007)]
	port: u16,

	#[arg(long, default_value_t = 16)]
	backlog: u32,

	/// Pause taken by an idle connection tick, in milliseconds.
	#[arg(long, default_value_t = 20)]
	backoff_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "socklane=debug,socklane_echo=info".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let cli = Cli::parse();
	let backoff = Duration::from_millis(cli.backoff_ms);
	let config = ListenerConfig::new()
		.backlog(cli.backlog)
		.connection(ConnectionConfig::new().backoff(backoff).nodelay(true));

	let mut listener = Listener::bind_with(&cli.address, cli.port, config)?.start().wait()?;
	tracing::info!(address = %listener.local_addr()?, "echo server ready");

	let (conn_tx, conn_rx) = mpsc::channel::<Connection>();
	let (packet_tx, packet_rx) = mpsc::channel::<(u64, Packet)>();
	listener.on_connection(move |conn| {
		let _ = conn_tx.send(conn);
	});

	let mut connections: Vec<Connection> = Vec::new();
	loop {
		if let AcceptOutcome::Failed(code) = listener.tick() {
			tracing::warn!(error = %code, "accept failed");
		}

		for mut conn in conn_rx.try_iter() {
			let id = conn.id();
			let tx = packet_tx.clone();
			conn.on_receive(move |packet| {
				let _ = tx.send((id, packet));
			});
			tracing::info!(id, total = listener.accepted(), "client connected");
			connections.push(conn);
		}

		connections.retain_mut(|conn| match conn.tick() {
			RecvOutcome::Closed(reason) => {
				tracing::info!(id = conn.id(), %reason, received = conn.bytes_received(), "client gone");
				false
			}
			RecvOutcome::Dispatched(_) | RecvOutcome::Idle => true,
		});

		for (id, packet) in packet_rx.try_iter() {
			let Some(conn) = connections.iter().find(|c| c.id() == id) else {
				continue;
			};
			if let Err(code) = conn.send_all(&packet) {
				tracing::warn!(id, error = %code, "echo failed");
			}
		}

		if connections.is_empty() {
			std::thread::sleep(backoff);
		}
	}
}
