//! Typed message channels between executors.
//!
//! A [`Links`] instance is one channel endpoint: a bound listener for
//! receiving plus one outgoing stream per registered peer. Peers announce
//! their rank in a four-byte handshake when their stream connects, which is
//! all the addressing the channel needs — every stream is then a reliable,
//! in-order lane per (sender, receiver) pair.
//!
//! Typed messages travel as length-prefixed frames; object payloads and
//! reply values travel as unframed raw bytes read directly off the sender's
//! stream. A receive endpoint only ever sees one of the two kinds, so the
//! per-peer reassembly buffers never have to disambiguate.
//!
//! The send and receive halves are locked independently. Each half is used
//! by exactly one thread at any protocol instant (the application owns pap
//! and local, the daemon owns remote), so the locks are uncontended; they
//! exist to let the daemon broadcast its termination sentinel through the
//! application's send half once the application has gone quiet.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use gam_proto::messages::{decode_frame, encode_frame};
use gam_proto::pointer::ExecutorId;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::LinkError;

const CONNECT_RETRY: Duration = Duration::from_millis(20);
const CONNECT_DEADLINE: Duration = Duration::from_secs(30);

pub(crate) struct Links<T> {
	name: &'static str,
	self_rank: ExecutorId,
	tx: Mutex<SendHalf>,
	rx: Mutex<RecvHalf>,
	_msg: PhantomData<fn() -> T>,
}

struct SendHalf {
	peers: HashMap<ExecutorId, TcpStream>,
}

struct RecvHalf {
	listener: TcpListener,
	conns: HashMap<ExecutorId, Conn>,
	/// Accepted ranks in arrival order; drives the fair any-receive scan.
	order: Vec<ExecutorId>,
	next_scan: usize,
}

struct Conn {
	stream: TcpStream,
	buf: Vec<u8>,
	frames: VecDeque<Vec<u8>>,
	open: bool,
}

impl<T: Serialize + DeserializeOwned> Links<T> {
	/// Opens the receive endpoint.
	pub(crate) fn bind(
		name: &'static str,
		self_rank: ExecutorId,
		addr: &str,
	) -> Result<Self, LinkError> {
		let listener = TcpListener::bind(addr).map_err(|error| LinkError::Io {
			channel: name,
			error,
		})?;
		listener
			.set_nonblocking(true)
			.map_err(|error| LinkError::Io { channel: name, error })?;
		tracing::debug!(channel = name, rank = self_rank, %addr, "channel endpoint bound");
		Ok(Links {
			name,
			self_rank,
			tx: Mutex::new(SendHalf { peers: HashMap::new() }),
			rx: Mutex::new(RecvHalf {
				listener,
				conns: HashMap::new(),
				order: Vec::new(),
				next_scan: 0,
			}),
			_msg: PhantomData,
		})
	}

	/// Registers the sending destination for a rank, retrying until the peer
	/// endpoint comes up or the deadline expires.
	pub(crate) fn peer(&self, rank: ExecutorId, addr: &str) -> Result<(), LinkError> {
		let deadline = Instant::now() + CONNECT_DEADLINE;
		let stream = loop {
			match TcpStream::connect(addr) {
				Ok(stream) => break stream,
				Err(error) => {
					if Instant::now() >= deadline {
						return Err(LinkError::Connect {
							rank,
							addr: addr.to_string(),
							error,
						});
					}
					thread::sleep(CONNECT_RETRY);
				}
			}
		};
		stream
			.set_nodelay(true)
			.and_then(|()| (&stream).write_all(&self.self_rank.to_le_bytes()))
			.map_err(|error| LinkError::Io { channel: self.name, error })?;
		tracing::debug!(channel = self.name, peer = rank, %addr, "peer registered");
		self.tx.lock().peers.insert(rank, stream);
		Ok(())
	}

	/// Blocking typed send.
	pub(crate) fn send(&self, msg: &T, to: ExecutorId) -> Result<(), LinkError> {
		let frame = encode_frame(msg)?;
		self.write(&frame, to)
	}

	/// Blocking raw payload send.
	pub(crate) fn raw_send(&self, bytes: &[u8], to: ExecutorId) -> Result<(), LinkError> {
		self.write(bytes, to)
	}

	/// Typed send to every registered peer except self.
	pub(crate) fn broadcast(&self, msg: &T) -> Result<(), LinkError> {
		let frame = encode_frame(msg)?;
		let mut tx = self.tx.lock();
		let mut ranks: Vec<ExecutorId> = tx.peers.keys().copied().collect();
		ranks.sort_unstable();
		for rank in ranks {
			if rank == self.self_rank {
				continue;
			}
			let stream = tx.peers.get_mut(&rank).ok_or(LinkError::UnknownPeer(rank))?;
			stream
				.write_all(&frame)
				.map_err(|error| LinkError::Io { channel: self.name, error })?;
		}
		Ok(())
	}

	/// Blocking typed receive from a specific rank.
	pub(crate) fn recv(&self, from: ExecutorId) -> Result<T, LinkError> {
		let mut rx = self.rx.lock();
		loop {
			rx.accept_pending().map_err(|error| LinkError::Io {
				channel: self.name,
				error,
			})?;
			if let Some(conn) = rx.conns.get_mut(&from) {
				conn.pump().map_err(|error| LinkError::Io {
					channel: self.name,
					error,
				})?;
				if let Some(body) = conn.frames.pop_front() {
					return Ok(decode_frame(&body)?);
				}
				if !conn.open {
					return Err(LinkError::Disconnected(from));
				}
			}
			thread::yield_now();
		}
	}

	/// Blocking typed receive from any rank.
	pub(crate) fn recv_any(&self) -> Result<(T, ExecutorId), LinkError> {
		loop {
			if let Some(got) = self.try_recv_any()? {
				return Ok(got);
			}
			thread::yield_now();
		}
	}

	/// One poll iteration: accept pending handshakes, progress reassembly,
	/// pop a completed frame if one is ready.
	pub(crate) fn try_recv_any(&self) -> Result<Option<(T, ExecutorId)>, LinkError> {
		let rx = &mut *self.rx.lock();
		rx.accept_pending().map_err(|error| LinkError::Io {
			channel: self.name,
			error,
		})?;
		let n = rx.order.len();
		if n == 0 {
			return Ok(None);
		}
		for k in 0..n {
			let idx = (rx.next_scan + k) % n;
			let rank = rx.order[idx];
			let Some(conn) = rx.conns.get_mut(&rank) else {
				continue;
			};
			conn.pump().map_err(|error| LinkError::Io {
				channel: self.name,
				error,
			})?;
			if let Some(body) = conn.frames.pop_front() {
				rx.next_scan = (idx + 1) % n;
				return Ok(Some((decode_frame(&body)?, rank)));
			}
		}
		Ok(None)
	}

	/// Blocking raw payload receive, always directed.
	pub(crate) fn raw_recv(&self, buf: &mut [u8], from: ExecutorId) -> Result<(), LinkError> {
		let mut rx = self.rx.lock();
		loop {
			rx.accept_pending().map_err(|error| LinkError::Io {
				channel: self.name,
				error,
			})?;
			if rx.conns.contains_key(&from) {
				break;
			}
			thread::yield_now();
		}
		let conn = rx.conns.get_mut(&from).ok_or(LinkError::Disconnected(from))?;
		conn.read_exact_spin(buf).map_err(|error| {
			if error.kind() == io::ErrorKind::UnexpectedEof {
				LinkError::Disconnected(from)
			} else {
				LinkError::Io { channel: self.name, error }
			}
		})
	}

	fn write(&self, bytes: &[u8], to: ExecutorId) -> Result<(), LinkError> {
		let mut tx = self.tx.lock();
		let stream = tx.peers.get_mut(&to).ok_or(LinkError::UnknownPeer(to))?;
		stream
			.write_all(bytes)
			.map_err(|error| LinkError::Io { channel: self.name, error })
	}
}

impl RecvHalf {
	/// Accepts every connection currently queued on the listener, completing
	/// the rank handshake for each.
	fn accept_pending(&mut self) -> io::Result<()> {
		loop {
			match self.listener.accept() {
				Ok((stream, _)) => {
					let rank = handshake(&stream)?;
					if !self.conns.contains_key(&rank) {
						self.order.push(rank);
					}
					self.conns.insert(rank, Conn {
						stream,
						buf: Vec::new(),
						frames: VecDeque::new(),
						open: true,
					});
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e),
			}
		}
	}
}

/// Reads the connecting peer's rank announcement and leaves the stream in
/// non-blocking mode.
fn handshake(stream: &TcpStream) -> io::Result<ExecutorId> {
	stream.set_nodelay(true)?;
	// The accepted stream may inherit the listener's non-blocking flag.
	stream.set_nonblocking(false)?;
	let mut bytes = [0u8; 4];
	let mut reader = stream;
	reader.read_exact(&mut bytes)?;
	stream.set_nonblocking(true)?;
	Ok(ExecutorId::from_le_bytes(bytes))
}

impl Conn {
	/// Drains readable bytes into the reassembly buffer and harvests every
	/// completed frame.
	fn pump(&mut self) -> io::Result<()> {
		if self.open {
			let mut chunk = [0u8; 8192];
			loop {
				match self.stream.read(&mut chunk) {
					Ok(0) => {
						self.open = false;
						break;
					}
					Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
					Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
					Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
					Err(e) => return Err(e),
				}
			}
		}
		loop {
			if self.buf.len() < 4 {
				return Ok(());
			}
			let len = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
			if self.buf.len() < 4 + len {
				return Ok(());
			}
			let frame = self.buf[4..4 + len].to_vec();
			self.buf.drain(..4 + len);
			self.frames.push_back(frame);
		}
	}

	/// Fills `dst` with the next raw bytes from this peer, spinning through
	/// `WouldBlock`.
	fn read_exact_spin(&mut self, dst: &mut [u8]) -> io::Result<()> {
		let take = self.buf.len().min(dst.len());
		if take > 0 {
			dst[..take].copy_from_slice(&self.buf[..take]);
			self.buf.drain(..take);
		}
		let mut filled = take;
		while filled < dst.len() {
			match self.stream.read(&mut dst[filled..]) {
				Ok(0) => {
					self.open = false;
					return Err(io::ErrorKind::UnexpectedEof.into());
				}
				Ok(n) => filled += n,
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::yield_now(),
				Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
				Err(e) => return Err(e),
			}
		}
		Ok(())
	}
}
