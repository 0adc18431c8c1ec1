use std::sync::mpsc;
use std::time::{Duration, Instant};

use socklane::{
	resolve, AcceptOutcome, Connection, ConnectionConfig, Family, Listener, ListenerConfig, MsgFlags,
	Protocol, ProvisionError, RecvOutcome, ResolutionHints, SockType, Socket,
};

fn fast() -> ListenerConfig {
	ListenerConfig::new().connection(ConnectionConfig::new().backoff(Duration::from_millis(5)))
}

fn started() -> Listener {
	Listener::bind_with("127.0.0.1", 0, fast()).unwrap().start().wait().unwrap()
}

fn client_for(listener: &Listener) -> Socket {
	let service = listener.local_port().unwrap().to_string();
	let addr = resolve(Some("127.0.0.1"), Some(&service), &ResolutionHints::tcp_v4())
		.unwrap()
		.remove(0);
	let mut client = Socket::create(Family::Ipv4, SockType::Stream, Protocol::Tcp).unwrap();
	client.connect(&addr).unwrap();
	client
}

/// Ticks until one connection is accepted and returns it.
fn accept_one(listener: &mut Listener) -> Connection {
	let (tx, rx) = mpsc::channel();
	listener.on_connection(move |conn| {
		let _ = tx.send(conn);
	});
	let deadline = Instant::now() + Duration::from_secs(5);
	while Instant::now() < deadline {
		match listener.tick() {
			AcceptOutcome::Accepted => return rx.recv().unwrap(),
			AcceptOutcome::Idle => std::thread::sleep(Duration::from_millis(5)),
			AcceptOutcome::Failed(code) => panic!("accept failed: {code:?}"),
		}
	}
	panic!("no connection accepted");
}

#[test]
fn port_zero_gets_an_ephemeral_port() {
	let listener = started();
	let port = listener.local_port().unwrap();
	assert_ne!(port, 0);
	assert!(listener.socket().is_nonblocking());
}

#[test]
fn start_reports_when_finished() {
	let pending = Listener::bind("127.0.0.1", 0).unwrap().start();
	let listener = pending.wait().unwrap();
	assert!(listener.socket().reuse_addr().unwrap());
}

#[test]
fn idle_tick_without_clients() {
	let mut listener = started();
	assert_eq!(listener.tick(), AcceptOutcome::Idle);
	assert_eq!(listener.accepted(), 0);
}

#[test]
fn accepted_connection_is_alive() {
	let mut listener = started();
	let _client = client_for(&listener);

	let conn = accept_one(&mut listener);
	assert!(conn.is_alive());
	assert_eq!(listener.accepted(), 1);
}

#[test]
fn received_bytes_reach_the_callback() {
	let mut listener = started();
	let client = client_for(&listener);
	let mut conn = accept_one(&mut listener);

	let (tx, rx) = mpsc::channel();
	conn.on_receive(move |packet| {
		let _ = tx.send(packet.into_vec());
	});

	client.send(b"hello", MsgFlags::NONE).unwrap();

	let mut got: Vec<u8> = Vec::new();
	let deadline = Instant::now() + Duration::from_secs(5);
	while got.len() < 5 && Instant::now() < deadline {
		match conn.tick() {
			RecvOutcome::Dispatched(n) => got.extend(rx.recv().unwrap().iter().take(n)),
			RecvOutcome::Idle => {}
			RecvOutcome::Closed(reason) => panic!("closed early: {reason:?}"),
		}
	}
	assert_eq!(got, b"hello");
	assert_eq!(conn.bytes_received(), 5);
	assert!(conn.packets_received() >= 1);
}

#[test]
fn idle_connection_tick_backs_off() {
	let mut listener = started();
	let _client = client_for(&listener);
	let mut conn = accept_one(&mut listener);

	let started = Instant::now();
	assert_eq!(conn.tick(), RecvOutcome::Idle);
	let elapsed = started.elapsed();
	assert!(elapsed >= Duration::from_millis(5));
	assert!(elapsed < Duration::from_secs(1));
}

#[test]
fn peer_close_ends_the_connection() {
	let mut listener = started();
	let mut client = client_for(&listener);
	let mut conn = accept_one(&mut listener);

	client.close().unwrap();

	let deadline = Instant::now() + Duration::from_secs(5);
	let reason = loop {
		match conn.tick() {
			RecvOutcome::Closed(reason) => break reason,
			_ if Instant::now() > deadline => panic!("peer close never observed"),
			_ => {}
		}
	};
	assert!(reason.is_none(), "got {reason:?}");
	assert!(!conn.is_alive());
	assert!(!conn.is_open());
	assert_eq!(conn.tick(), RecvOutcome::Closed(socklane::ErrorCode::BadDescriptor));
}

/// Client aborts with SO_LINGER 0, so the server side sees a reset.
fn reset_by_peer(mut client: Socket) {
	client.set_linger(Some(Duration::ZERO)).unwrap();
	client.close().unwrap();
}

#[test]
fn peer_reset_closes_with_the_error() {
	let mut listener = started();
	let client = client_for(&listener);
	let mut conn = accept_one(&mut listener);

	reset_by_peer(client);

	let deadline = Instant::now() + Duration::from_secs(5);
	let reason = loop {
		match conn.tick() {
			RecvOutcome::Closed(reason) => break reason,
			_ if Instant::now() > deadline => panic!("reset never observed"),
			_ => {}
		}
	};
	assert!(!reason.is_none(), "reset reported as orderly close");
	assert!(!conn.is_open());
}

#[test]
fn liveness_check_keeps_the_pending_error() {
	let mut listener = started();
	let client = client_for(&listener);
	let mut conn = accept_one(&mut listener);

	reset_by_peer(client);

	let deadline = Instant::now() + Duration::from_secs(5);
	while conn.is_alive() {
		assert!(Instant::now() < deadline, "reset never observed");
		std::thread::sleep(Duration::from_millis(5));
	}
	// Still open, and the error survives the read that cleared it.
	assert!(conn.is_open());
	assert!(!conn.is_alive());

	match conn.tick() {
		RecvOutcome::Closed(reason) => assert!(!reason.is_none(), "got {reason:?}"),
		other => panic!("expected close, got {other:?}"),
	}
	assert!(!conn.is_open());
}

#[test]
fn send_all_delivers_everything() {
	let mut listener = started();
	let client = client_for(&listener);
	let conn = accept_one(&mut listener);

	let payload = vec![7u8; 64 * 1024];
	let reader = std::thread::spawn(move || {
		let mut total = 0;
		let mut buf = [0u8; 4096];
		while total < 64 * 1024 {
			let n = client.recv(&mut buf, MsgFlags::NONE).unwrap();
			assert!(n > 0);
			assert!(buf[..n].iter().all(|&b| b == 7));
			total += n;
		}
		total
	});

	conn.send_all(&payload).unwrap();
	assert_eq!(reader.join().unwrap(), payload.len());
}

#[test]
fn close_socket_is_idempotent() {
	let mut listener = started();
	let _client = client_for(&listener);
	let mut conn = accept_one(&mut listener);

	assert!(conn.close_socket().is_ok());
	assert!(conn.close_socket().is_ok());
	assert!(conn.send_data(b"x").is_err());
}

#[test]
fn unassigned_address_fails_to_bind() {
	// TEST-NET-1; never assigned to a local interface.
	let err = Listener::bind("192.0.2.1", 0).unwrap_err();
	match err {
		ProvisionError::Bind { attempts, last, .. } => {
			assert!(attempts >= 1);
			assert!(!last.is_none());
		}
		other => panic!("unexpected: {other}"),
	}
}

#[test]
fn unresolvable_host_is_a_resolve_failure() {
	let err = Listener::bind("local\0host", 0).unwrap_err();
	assert!(matches!(err, ProvisionError::Resolve { .. }), "got {err}");
}
