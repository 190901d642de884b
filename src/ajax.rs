//! Server round trips that merge state and swap markup.
//!
//! Requests are queued on the [`Runtime`] and driven by the host through a [`Transport`], which is the only place this crate
//! suspends. Responses are handed back with [`Runtime::complete_request`].

use crate::{
	dom::{ControlKind, Dom},
	error::AjaxError,
	runtime::Runtime,
	state::ComponentId,
};
use core::{cell::RefCell, fmt};
use futures::future::LocalBoxFuture;
use hashbrown::HashMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

pub const PARTIAL_HEADER: &str = "X-NewUI-Partial";
pub const COMPONENT_HEADER: &str = "X-NewUI-Component";
pub const STATE_HEADER: &str = "X-NewUI-State";

/// Form data key carrying the component name.
pub const COMPONENT_FIELD: &str = "_ui_component";
/// Form data key carrying the component's state snapshot.
pub const STATE_FIELD: &str = "_ui_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	Get,
	Post,
	Put,
	Patch,
	Delete,
}

impl Method {
	/// Case-insensitive. [`None`] for anything unsupported.
	#[must_use]
	pub fn parse(text: &str) -> Option<Self> {
		Some(match text.trim().to_ascii_uppercase().as_str() {
			"GET" => Self::Get,
			"POST" => Self::Post,
			"PUT" => Self::Put,
			"PATCH" => Self::Patch,
			"DELETE" => Self::Delete,
			_ => return None,
		})
	}

	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}

	#[must_use]
	pub fn has_body(self) -> bool {
		!matches!(self, Self::Get | Self::Delete)
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An outgoing request, queued until the host sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjaxRequest {
	pub id: u64,
	pub method: Method,
	pub url: String,
	pub headers: Vec<(String, String)>,
	pub body: Option<String>,
}

impl AjaxRequest {
	/// Case-insensitive header lookup.
	#[must_use]
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjaxResponse {
	pub status: u16,
	pub headers: Vec<(String, String)>,
	pub body: String,
}

impl AjaxResponse {
	#[must_use]
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self {
			status,
			headers: Vec::new(),
			body: body.into(),
		}
	}

	#[must_use]
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		self.headers.push((name.to_owned(), value.to_owned()));
		self
	}

	/// Case-insensitive header lookup.
	#[must_use]
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	#[must_use]
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
}

/// Sends requests. Implemented with `fetch` on the web and by fakes in tests.
pub trait Transport {
	fn send(&self, request: AjaxRequest) -> LocalBoxFuture<'static, Result<AjaxResponse, AjaxError>>;
}

/// Where a response's markup goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap {
	/// Replace the target's children.
	Inner,
	/// Replace the target itself.
	Outer,
}

impl Swap {
	#[must_use]
	pub fn parse(text: Option<&str>) -> Self {
		match text.map(str::trim) {
			Some(swap) if swap.eq_ignore_ascii_case("outer") || swap.eq_ignore_ascii_case("outerHTML") => Self::Outer,
			_ => Self::Inner,
		}
	}
}

/// Bookkeeping for a request between [`take_pending_requests`](`Runtime::take_pending_requests`) and
/// [`complete_request`](`Runtime::complete_request`).
#[derive(Debug, Clone)]
pub struct InFlight<N> {
	pub url: String,
	/// The element showing the loading state.
	pub trigger: N,
	pub was_disabled: bool,
	pub component: Option<ComponentId>,
	/// Replacement region, [`None`] if there is nothing to replace.
	pub target: Option<N>,
	pub swap: Swap,
}

/// The request queue and in-flight table.
#[derive(Debug)]
pub struct AjaxBridge<N> {
	next_id: u64,
	outbox: Vec<AjaxRequest>,
	in_flight: HashMap<u64, InFlight<N>>,
}

impl<N> Default for AjaxBridge<N> {
	fn default() -> Self {
		Self {
			next_id: 1,
			outbox: Vec::new(),
			in_flight: HashMap::new(),
		}
	}
}

impl<N> AjaxBridge<N> {
	/// Queues a request and returns its id.
	pub fn begin(&mut self, method: Method, headers: Vec<(String, String)>, body: Option<String>, in_flight: InFlight<N>) -> u64 {
		let id = self.next_id;
		self.next_id += 1;
		trace!("Queueing request {} {} {}.", id, method, in_flight.url);
		self.outbox.push(AjaxRequest {
			id,
			method,
			url: in_flight.url.clone(),
			headers,
			body,
		});
		self.in_flight.insert(id, in_flight);
		id
	}

	pub fn take_requests(&mut self) -> Vec<AjaxRequest> {
		core::mem::take(&mut self.outbox)
	}

	/// Removes the in-flight entry for `id`.
	///
	/// # Errors
	///
	/// Iff no request `id` is in flight.
	pub fn finish(&mut self, id: u64) -> Result<InFlight<N>, AjaxError> {
		self.in_flight.remove(&id).ok_or(AjaxError::UnknownRequest(id))
	}

	#[must_use]
	pub fn in_flight(&self) -> usize {
		self.in_flight.len()
	}

	pub fn clear(&mut self) {
		self.outbox.clear();
		self.in_flight.clear();
	}
}

/// Collects named controls below `form` the way a browser would submit them.
///
/// Disabled controls, unchecked checkboxes/radios and buttons are skipped. Repeated names collect into arrays.
pub fn collect_form<D: Dom>(dom: &D, form: &D::Node) -> Map<String, Value> {
	let mut fields = Map::new();
	for node in dom.query_attribute(form, "name") {
		if dom.has_attribute(&node, "disabled") {
			continue;
		}
		let name = match dom.attribute(&node, "name") {
			Some(name) if !name.is_empty() => name,
			_ => continue,
		};
		let values = match dom.control_kind(&node) {
			Some(ControlKind::Checkbox) | Some(ControlKind::Radio) => {
				if dom.checked(&node) {
					vec![dom.value(&node)]
				} else {
					continue;
				}
			}
			Some(ControlKind::Select { .. }) => dom.selected_values(&node),
			Some(ControlKind::Text) => {
				let kind = dom.attribute(&node, "type").unwrap_or_default().to_ascii_lowercase();
				if matches!(kind.as_str(), "submit" | "button" | "reset" | "file" | "image") {
					continue;
				}
				vec![dom.value(&node)]
			}
			None => continue,
		};
		for value in values {
			push_field(&mut fields, &name, Value::String(value));
		}
	}
	fields
}

fn push_field(fields: &mut Map<String, Value>, name: &str, value: Value) {
	match fields.get_mut(name) {
		None => {
			fields.insert(name.to_owned(), value);
		}
		Some(Value::Array(values)) => values.push(value),
		Some(existing) => {
			let first = existing.take();
			*existing = Value::Array(vec![first, value]);
		}
	}
}

/// The parts of a successful response that are applied to the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
	pub html: Option<String>,
	pub state: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
	html: Option<String>,
	state: Option<Map<String, Value>>,
}

/// Interprets a response.
///
/// # Errors
///
/// Iff the status isn't 2xx.
pub fn interpret(response: AjaxResponse) -> Result<Update, AjaxError> {
	if !response.is_success() {
		return Err(AjaxError::Status {
			status: response.status,
			body: response.body,
		});
	}

	let mut update = Update::default();
	if let Some(header) = response.header(STATE_HEADER) {
		match serde_json::from_str::<Map<String, Value>>(header) {
			Ok(state) => update.state = state,
			Err(error) => debug!("Ignoring malformed {} header: {}", STATE_HEADER, error),
		}
	}

	let json = response.header("Content-Type").map_or(false, |content_type| content_type.contains("json"));
	if json || response.body.trim_start().starts_with('{') {
		match serde_json::from_str::<Envelope>(&response.body) {
			Ok(envelope) => {
				update.html = envelope.html;
				update.state.extend(envelope.state.unwrap_or_default());
				return Ok(update);
			}
			Err(error) if json => {
				debug!("JSON response isn't an envelope, ignoring its body: {}", error);
				return Ok(update);
			}
			Err(_) => (),
		}
	}

	if !response.body.trim().is_empty() {
		update.html = Some(response.body);
	}
	Ok(update)
}

/// Sends every queued request through `transport` and completes it, until the queue stays empty.
///
/// Requests run one at a time. The runtime is only borrowed between awaits.
pub async fn drive_pending<D: Dom, T: Transport + ?Sized>(runtime: &RefCell<Runtime<D>>, transport: &T) -> usize {
	let mut completed = 0;
	loop {
		let requests = runtime.borrow_mut().take_pending_requests();
		if requests.is_empty() {
			return completed;
		}
		for request in requests {
			let id = request.id;
			let result = transport.send(request).await;
			runtime.borrow_mut().complete_request(id, result);
			completed += 1;
		}
	}
}
