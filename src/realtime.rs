//! Optional duplex channel for server-pushed updates.
//!
//! The channel doesn't own any I/O: a [`Connector`] opens [`Socket`]s, and the host reports `open`/`close` and feeds
//! incoming frames to [`Runtime::receive_message`](`crate::Runtime::receive_message`).

use crate::error::RealtimeError;
use core::fmt;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, info, trace, warn};

pub const STATE_UPDATE: &str = "state_update";
pub const COMPONENT_UPDATE: &str = "component_update";
pub const BROADCAST: &str = "broadcast";
pub const CUSTOM: &str = "custom";
/// Subscribes to every message type.
pub const ANY: &str = "*";

/// An open connection.
pub trait Socket {
	/// # Errors
	///
	/// Iff the frame couldn't be queued.
	fn send(&mut self, text: &str) -> Result<(), RealtimeError>;
	fn close(&mut self) {}
}

/// Opens connections, initially and for reconnection attempts.
pub trait Connector {
	/// # Errors
	///
	/// Iff no connection attempt could be started.
	fn connect(&mut self, url: &str) -> Result<Box<dyn Socket>, RealtimeError>;
}

/// Timestamps for outgoing messages, in seconds since the Unix epoch.
pub trait Clock {
	fn now(&self) -> f64;
}

/// The platform clock. Uses `Date.now()` on `wasm32`, where [`std::time::SystemTime`] isn't available.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	#[cfg(target_arch = "wasm32")]
	fn now(&self) -> f64 {
		js_sys::Date::now() / 1000.0
	}

	#[cfg(not(target_arch = "wasm32"))]
	fn now(&self) -> f64 {
		std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map_or(0.0, |since| since.as_secs_f64())
	}
}

/// An incoming frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RealtimeMessage {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub data: Value,
	#[serde(rename = "componentId", default)]
	pub component_id: Option<String>,
}

impl RealtimeMessage {
	/// # Errors
	///
	/// Iff `text` isn't a JSON object with a string `type`.
	pub fn parse(text: &str) -> Result<Self, RealtimeError> {
		Ok(serde_json::from_str(text)?)
	}
}

#[derive(Debug, Serialize)]
struct Outgoing<'a> {
	#[serde(rename = "type")]
	kind: &'a str,
	data: &'a Value,
	timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Open,
	/// Closed for good, either cleanly or after running out of attempts.
	Closed,
}

pub type Subscriber = Rc<dyn Fn(&RealtimeMessage)>;

struct Connection {
	url: String,
	connector: Box<dyn Connector>,
	socket: Option<Box<dyn Socket>>,
}

/// Connection state, reconnection policy and subscribers.
pub struct RealtimeChannel {
	connection: Option<Connection>,
	state: ConnectionState,
	attempts: u32,
	subscribers: HashMap<String, Vec<Subscriber>>,
	clock: Box<dyn Clock>,
}

impl fmt::Debug for RealtimeChannel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RealtimeChannel")
			.field("url", &self.connection.as_ref().map(|connection| &connection.url))
			.field("state", &self.state)
			.field("attempts", &self.attempts)
			.field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl Default for RealtimeChannel {
	fn default() -> Self {
		Self::new(Box::new(SystemClock))
	}
}

impl RealtimeChannel {
	#[must_use]
	pub fn new(clock: Box<dyn Clock>) -> Self {
		Self {
			connection: None,
			state: ConnectionState::Disconnected,
			attempts: 0,
			subscribers: HashMap::new(),
			clock,
		}
	}

	pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
		self.clock = clock;
	}

	#[must_use]
	pub fn state(&self) -> ConnectionState {
		self.state
	}

	/// Consecutive reconnection attempts since the last successful open.
	#[must_use]
	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// Opens a connection to `url`, replacing any previous one.
	///
	/// # Errors
	///
	/// Iff `connector` fails to start the attempt.
	pub fn connect(&mut self, url: &str, connector: Box<dyn Connector>) -> Result<(), RealtimeError> {
		self.disconnect();
		self.attempts = 0;
		self.connection = Some(Connection {
			url: url.to_owned(),
			connector,
			socket: None,
		});
		self.open_socket()
	}

	/// Retries the current connection.
	///
	/// # Errors
	///
	/// Iff there is no connection to retry or the connector failed.
	pub fn reconnect(&mut self) -> Result<(), RealtimeError> {
		if self.state != ConnectionState::Disconnected {
			debug!("Skipping reconnect in state {:?}.", self.state);
			return Ok(());
		}
		self.open_socket()
	}

	fn open_socket(&mut self) -> Result<(), RealtimeError> {
		let connection = self.connection.as_mut().ok_or(RealtimeError::NotConnected)?;
		info!("Connecting to {}.", connection.url);
		let socket = connection.connector.connect(&connection.url)?;
		connection.socket = Some(socket);
		self.state = ConnectionState::Connecting;
		Ok(())
	}

	/// The host saw the socket open.
	pub fn opened(&mut self) {
		trace!("Realtime channel open.");
		self.state = ConnectionState::Open;
		self.attempts = 0;
	}

	/// The host saw the socket close. Returns whether a reconnect should be scheduled.
	pub fn closed(&mut self, clean: bool, max_attempts: u32) -> bool {
		if let Some(connection) = &mut self.connection {
			connection.socket = None;
		}
		if self.connection.is_none() || self.state == ConnectionState::Closed {
			return false;
		}
		if clean {
			info!("Realtime channel closed.");
			self.state = ConnectionState::Closed;
			return false;
		}
		if self.attempts >= max_attempts {
			warn!("Giving up on realtime channel after {} reconnection attempts.", self.attempts);
			self.state = ConnectionState::Closed;
			return false;
		}
		self.attempts += 1;
		self.state = ConnectionState::Disconnected;
		debug!("Realtime channel lost, reconnection attempt {} of {}.", self.attempts, max_attempts);
		true
	}

	/// Closes and forgets the connection without reconnecting.
	pub fn disconnect(&mut self) {
		if let Some(mut connection) = self.connection.take() {
			if let Some(mut socket) = connection.socket.take() {
				socket.close();
			}
		}
		self.state = ConnectionState::Disconnected;
		self.attempts = 0;
	}

	/// Sends `{type, data, timestamp}`.
	///
	/// # Errors
	///
	/// Iff the channel isn't open or the socket rejected the frame.
	pub fn send(&mut self, kind: &str, data: &Value) -> Result<(), RealtimeError> {
		if self.state != ConnectionState::Open {
			return Err(RealtimeError::NotConnected);
		}
		let socket = self
			.connection
			.as_mut()
			.and_then(|connection| connection.socket.as_mut())
			.ok_or(RealtimeError::NotConnected)?;
		let frame = serde_json::to_string(&Outgoing {
			kind,
			data,
			timestamp: self.clock.now(),
		})?;
		socket.send(&frame)
	}

	/// Registers `subscriber` for messages of `kind`, or all messages with [`ANY`].
	pub fn subscribe(&mut self, kind: &str, subscriber: impl Fn(&RealtimeMessage) + 'static) {
		self.subscribers.entry(kind.to_owned()).or_default().push(Rc::new(subscriber));
	}

	/// Subscribers for `kind`, followed by those for [`ANY`].
	#[must_use]
	pub fn subscribers(&self, kind: &str) -> Vec<Subscriber> {
		let specific = self.subscribers.get(kind).into_iter().flatten();
		let any = self.subscribers.get(ANY).into_iter().flatten().filter(|_| kind != ANY);
		specific.chain(any).cloned().collect()
	}

	pub fn clear(&mut self) {
		self.disconnect();
		self.subscribers.clear();
	}
}
