use std::thread;
use std::time::{Duration, Instant};

use socklane::{
	resolve, AddressCandidate, ErrorCode, Family, MsgFlags, OptLevel, Protocol, ResolutionHints,
	Shutdown, SockOption, SockType, Socket, SocketState,
};

fn tcp() -> Socket {
	Socket::create(Family::Ipv4, SockType::Stream, Protocol::Tcp).unwrap()
}

fn loopback(port: u16) -> AddressCandidate {
	let service = port.to_string();
	resolve(Some("127.0.0.1"), Some(&service), &ResolutionHints::tcp_v4())
		.unwrap()
		.remove(0)
}

/// Listening socket on an ephemeral loopback port plus its address.
fn listening() -> (Socket, AddressCandidate) {
	let mut server = tcp();
	server.bind(&loopback(0)).unwrap();
	server.listen(8).unwrap();
	let addr = server.local_candidate().unwrap();
	(server, addr)
}

fn connected_pair() -> (Socket, Socket) {
	let (server, addr) = listening();
	let mut client = tcp();
	client.connect(&addr).unwrap();
	let accepted = server.accept().unwrap();
	(client, accepted)
}

#[test]
fn lifecycle_states() {
	let (server, addr) = listening();
	assert_eq!(server.state(), SocketState::Listening);

	let mut client = tcp();
	assert_eq!(client.state(), SocketState::Unbound);
	client.connect(&addr).unwrap();
	assert_eq!(client.state(), SocketState::Connected);

	let accepted = server.accept().unwrap();
	assert_eq!(accepted.state(), SocketState::Connected);

	client.close().unwrap();
	assert_eq!(client.state(), SocketState::Closed);
}

#[test]
fn bound_port_is_nonzero() {
	let (server, addr) = listening();
	let port = server.local_addr().unwrap().port();
	assert_ne!(port, 0);
	assert_eq!(addr.socket_addr().unwrap().port(), port);
}

#[test]
fn bytes_arrive_in_order() {
	let (client, server) = connected_pair();
	let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
	let expected = payload.clone();

	let writer = thread::spawn(move || {
		let mut rest = &payload[..];
		while !rest.is_empty() {
			let n = client.send(rest, MsgFlags::NONE).unwrap();
			rest = &rest[n..];
		}
		client.shutdown(Shutdown::Write).unwrap();
		client
	});

	let mut received = Vec::new();
	let mut buf = [0u8; 8192];
	loop {
		let n = server.recv(&mut buf, MsgFlags::NONE).unwrap();
		if n == 0 {
			break;
		}
		received.extend_from_slice(&buf[..n]);
	}
	writer.join().unwrap();

	assert_eq!(received.len(), expected.len());
	assert_eq!(received, expected);
}

#[test]
fn close_twice_is_ok() {
	let mut s = tcp();
	assert!(s.close().is_ok());
	assert!(s.close().is_ok());
	assert!(!s.is_open());
}

#[test]
fn closed_socket_rejects_everything_else() {
	let mut s = tcp();
	s.close().unwrap();
	let mut buf = [0u8; 4];
	assert_eq!(s.recv(&mut buf, MsgFlags::NONE), Err(ErrorCode::BadDescriptor));
	assert_eq!(s.send(b"x", MsgFlags::NONE), Err(ErrorCode::BadDescriptor));
	assert_eq!(s.listen(1), Err(ErrorCode::BadDescriptor));
	assert_eq!(s.bind(&loopback(0)), Err(ErrorCode::BadDescriptor));
	assert_eq!(s.shutdown(Shutdown::Both), Err(ErrorCode::BadDescriptor));
	assert_eq!(s.reuse_addr(), Err(ErrorCode::BadDescriptor));
	assert!(s.accept().is_err());
}

#[test]
fn dont_wait_recv_does_not_block() {
	let (_client, server) = connected_pair();
	let mut buf = [0u8; 64];
	let started = Instant::now();
	let err = server.recv(&mut buf, MsgFlags::DONT_WAIT).unwrap_err();
	assert!(err.is_would_block(), "got {err:?}");
	assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn nonblocking_accept_with_nothing_queued() {
	let (mut server, _addr) = listening();
	server.set_nonblocking(true).unwrap();
	assert!(server.is_nonblocking());
	let err = server.accept().unwrap_err();
	assert!(err.is_would_block(), "got {err:?}");
}

#[test]
fn peek_leaves_data_queued() {
	let (client, server) = connected_pair();
	client.send(b"ping", MsgFlags::NONE).unwrap();

	let mut buf = [0u8; 4];
	let n = server.recv(&mut buf, MsgFlags::PEEK | MsgFlags::WAIT_ALL).unwrap();
	assert_eq!(&buf[..n], b"ping");
	let n = server.recv(&mut buf, MsgFlags::WAIT_ALL).unwrap();
	assert_eq!(&buf[..n], b"ping");
}

#[test]
fn raw_option_roundtrip() {
	let s = tcp();
	s.set_option(OptLevel::Socket, SockOption::KeepAlive, &1i32.to_ne_bytes()).unwrap();
	assert_eq!(s.option_int(OptLevel::Socket, SockOption::KeepAlive).unwrap(), 1);
	assert!(s.keepalive().unwrap());
}

#[test]
fn mismatched_level_is_invalid_argument() {
	let s = tcp();
	assert_eq!(
		s.set_option(OptLevel::Tcp, SockOption::ReuseAddr, &1i32.to_ne_bytes()),
		Err(ErrorCode::InvalidArgument)
	);
}

#[test]
fn listening_socket_reports_accept_conn() {
	let (server, _addr) = listening();
	assert_eq!(server.option_int(OptLevel::Socket, SockOption::AcceptConn).unwrap(), 1);
}

/// Polls `finish_connect` until it stops reporting `Again`.
fn settle(client: &mut Socket) -> Result<(), ErrorCode> {
	let deadline = Instant::now() + Duration::from_secs(5);
	loop {
		match client.finish_connect() {
			Err(ErrorCode::Again) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
			other => return other,
		}
	}
}

#[test]
fn nonblocking_connect_completes() {
	let (server, addr) = listening();
	let mut client = tcp();
	client.set_nonblocking(true).unwrap();

	match client.connect(&addr) {
		Ok(()) => {}
		Err(code) => {
			assert!(code.is_would_block(), "got {code:?}");
			assert_eq!(client.state(), SocketState::Connecting);
		}
	}

	settle(&mut client).unwrap();
	assert_eq!(client.state(), SocketState::Connected);

	let accepted = server.accept().unwrap();
	client.send(b"hi", MsgFlags::NONE).unwrap();
	let mut buf = [0u8; 2];
	assert_eq!(accepted.recv(&mut buf, MsgFlags::WAIT_ALL), Ok(2));
}

#[test]
fn refused_nonblocking_connect_never_reports_connected() {
	let (mut server, addr) = listening();
	server.close().unwrap();

	let mut client = tcp();
	client.set_nonblocking(true).unwrap();
	match client.connect(&addr) {
		Err(ErrorCode::ConnectionRefused) => {}
		Err(code) if code.is_would_block() => {
			assert_eq!(settle(&mut client), Err(ErrorCode::ConnectionRefused));
		}
		other => panic!("unexpected connect result: {other:?}"),
	}

	// The error was consumed by the first read; a retry must not succeed.
	assert!(client.finish_connect().is_err());
	assert_ne!(client.state(), SocketState::Connected);
	assert_ne!(client.state(), SocketState::Connecting);
}

#[test]
fn connect_in_flight_is_not_connected() {
	// TEST-NET-1 never answers, so the handshake stays pending (or the
	// route is rejected outright on hosts without one).
	let target = resolve(Some("192.0.2.1"), Some("80"), &ResolutionHints::tcp_v4())
		.unwrap()
		.remove(0);
	let mut client = tcp();
	client.set_nonblocking(true).unwrap();

	let Err(code) = client.connect(&target) else {
		panic!("connect to an unassigned address succeeded");
	};
	if !code.is_would_block() {
		return;
	}

	match client.finish_connect() {
		Err(ErrorCode::Again) => assert_eq!(client.state(), SocketState::Connecting),
		Err(_) => assert_ne!(client.state(), SocketState::Connected),
		Ok(()) => panic!("reported connected while the handshake is in flight"),
	}
}

#[test]
fn connect_to_closed_port_is_refused() {
	let (mut server, addr) = listening();
	server.close().unwrap();

	let mut client = tcp();
	assert_eq!(client.connect(&addr), Err(ErrorCode::ConnectionRefused));
}
