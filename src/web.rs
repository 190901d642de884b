//! The browser backend.
//!
//! [`WebDom`] implements [`Dom`] over `web_sys`, [`FetchTransport`] sends AJAX requests with `fetch` and [`WebRuntime`]
//! wires both to capturing document-level listeners, `WebSocket`s and timers.

use crate::{
	ajax::{self, AjaxRequest, AjaxResponse, Transport},
	config::Config,
	dom::{Dom, EventKind},
	error::{AjaxError, RealtimeError},
	loading::Scheduled,
	realtime::{Connector, Socket},
	runtime::Runtime,
};
use core::convert::TryFrom;
use futures::future::LocalBoxFuture;
use gloo_timers::callback::Timeout;
use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue, UnwrapThrowExt};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
	AddEventListenerOptions, CloseEvent, Document, Element, Headers, HtmlElement, HtmlInputElement, HtmlOptionElement, HtmlSelectElement, HtmlTextAreaElement, MessageEvent, Request,
	RequestInit, Response, WebSocket,
};

/// [`Dom`] over a live [`Document`]. Scanning starts at `<body>`.
#[derive(Debug, Clone)]
pub struct WebDom {
	document: Document,
}

impl WebDom {
	#[must_use]
	pub fn new(document: Document) -> Self {
		Self { document }
	}

	/// The current window's document.
	#[must_use]
	pub fn from_window() -> Option<Self> {
		web_sys::window().and_then(|window| window.document()).map(Self::new)
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.document
	}
}

fn log_failure(operation: &str, result: Result<impl Sized, JsValue>) {
	if let Err(error) = result {
		error!("{} failed: {:?}", operation, error);
	}
}

impl Dom for WebDom {
	type Node = Element;

	fn document_element(&self) -> Element {
		match self.document.body() {
			Some(body) => body.into(),
			None => self.document.document_element().expect_throw("declarative-dom: Document has no element."),
		}
	}

	fn parent(&self, node: &Element) -> Option<Element> {
		node.parent_element()
	}

	fn children(&self, node: &Element) -> Vec<Element> {
		let children = node.children();
		(0..children.length()).filter_map(|i| children.item(i)).collect()
	}

	fn tag_name(&self, node: &Element) -> String {
		node.tag_name().to_ascii_lowercase()
	}

	fn attribute(&self, node: &Element, name: &str) -> Option<String> {
		node.get_attribute(name)
	}

	fn set_attribute(&mut self, node: &Element, name: &str, value: &str) {
		log_failure("setAttribute", node.set_attribute(name, value))
	}

	fn remove_attribute(&mut self, node: &Element, name: &str) {
		log_failure("removeAttribute", node.remove_attribute(name))
	}

	fn text(&self, node: &Element) -> String {
		node.text_content().unwrap_or_default()
	}

	fn set_text(&mut self, node: &Element, text: &str) {
		node.set_text_content(Some(text))
	}

	fn value(&self, node: &Element) -> String {
		if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			input.value()
		} else if let Some(textarea) = node.dyn_ref::<HtmlTextAreaElement>() {
			textarea.value()
		} else if let Some(select) = node.dyn_ref::<HtmlSelectElement>() {
			select.value()
		} else {
			node.get_attribute("value").unwrap_or_default()
		}
	}

	fn set_value(&mut self, node: &Element, value: &str) {
		if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			input.set_value(value)
		} else if let Some(textarea) = node.dyn_ref::<HtmlTextAreaElement>() {
			textarea.set_value(value)
		} else if let Some(select) = node.dyn_ref::<HtmlSelectElement>() {
			select.set_value(value)
		} else {
			trace!("Ignoring value for non-control {:?}.", node.tag_name());
		}
	}

	fn checked(&self, node: &Element) -> bool {
		node.dyn_ref::<HtmlInputElement>().map_or(false, HtmlInputElement::checked)
	}

	fn set_checked(&mut self, node: &Element, checked: bool) {
		if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			input.set_checked(checked)
		}
	}

	fn selected_values(&self, node: &Element) -> Vec<String> {
		let select = match node.dyn_ref::<HtmlSelectElement>() {
			Some(select) => select,
			None => return Vec::new(),
		};
		let selected = select.selected_options();
		(0..selected.length())
			.filter_map(|i| selected.item(i))
			.filter_map(|option| option.dyn_ref::<HtmlOptionElement>().map(HtmlOptionElement::value))
			.collect()
	}

	fn set_selected_values(&mut self, node: &Element, values: &[String]) {
		if let Some(select) = node.dyn_ref::<HtmlSelectElement>() {
			for i in 0..select.length() {
				if let Some(option) = select.item(i).and_then(|option| option.dyn_into::<HtmlOptionElement>().ok()) {
					option.set_selected(values.contains(&option.value()))
				}
			}
		}
	}

	fn style(&self, node: &Element, property: &str) -> Option<String> {
		node.dyn_ref::<HtmlElement>()?
			.style()
			.get_property_value(property)
			.ok()
			.filter(|value| !value.is_empty())
	}

	fn set_style(&mut self, node: &Element, property: &str, value: Option<&str>) {
		if let Some(element) = node.dyn_ref::<HtmlElement>() {
			let style = element.style();
			match value {
				Some(value) => log_failure("style.setProperty", style.set_property(property, value)),
				None => log_failure("style.removeProperty", style.remove_property(property)),
			}
		}
	}

	fn inner_html(&self, node: &Element) -> String {
		node.inner_html()
	}

	fn set_inner_html(&mut self, node: &Element, html: &str) {
		node.set_inner_html(html)
	}

	fn replace_with_html(&mut self, node: &Element, html: &str) -> Vec<Element> {
		let parent = match node.parent_element() {
			Some(parent) => parent,
			None => {
				warn!("Can't replace a detached element.");
				return Vec::new();
			}
		};
		let previous = node.previous_element_sibling();
		let next = node.next_element_sibling();
		node.set_outer_html(html);

		let mut replacements = Vec::new();
		let mut current = match &previous {
			Some(previous) => previous.next_element_sibling(),
			None => parent.first_element_child(),
		};
		while let Some(element) = current {
			if Some(&element) == next.as_ref() {
				break;
			}
			current = element.next_element_sibling();
			replacements.push(element);
		}
		replacements
	}

	fn create_element(&mut self, tag: &str) -> Element {
		self.document.create_element(tag).expect_throw("declarative-dom: Invalid tag name.")
	}

	fn insert_before(&mut self, parent: &Element, child: &Element, reference: Option<&Element>) {
		log_failure("insertBefore", parent.insert_before(child, reference.map(|reference| -> &web_sys::Node { reference })))
	}

	fn remove(&mut self, node: &Element) {
		node.remove()
	}

	fn call_global(&mut self, name: &str, element: &Element, event: EventKind) -> bool {
		let window = match web_sys::window() {
			Some(window) => window,
			None => return false,
		};
		let function = match js_sys::Reflect::get(&window, &JsValue::from_str(name)).map(|value| value.dyn_into::<js_sys::Function>()) {
			Ok(Ok(function)) => function,
			_ => return false,
		};
		log_failure(name, function.call2(&JsValue::NULL, element, &JsValue::from_str(event.name())));
		true
	}

	fn element_by_id(&self, id: &str) -> Option<Element> {
		self.document.get_element_by_id(id)
	}

	fn is_connected(&self, node: &Element) -> bool {
		node.is_connected()
	}
}

/// [`Transport`] over `window.fetch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTransport;

impl Transport for FetchTransport {
	fn send(&self, request: AjaxRequest) -> LocalBoxFuture<'static, Result<AjaxResponse, AjaxError>> {
		Box::pin(async move { fetch(request).await.map_err(|error| AjaxError::Transport(format!("{:?}", error))) })
	}
}

#[instrument]
async fn fetch(request: AjaxRequest) -> Result<AjaxResponse, JsValue> {
	let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
	let headers = Headers::new()?;
	for (name, value) in &request.headers {
		headers.set(name, value)?;
	}
	let mut init = RequestInit::new();
	init.method(request.method.as_str()).headers(&headers);
	if let Some(body) = &request.body {
		init.body(Some(&JsValue::from_str(body)));
	}
	let fetch_request = Request::new_with_str_and_init(&request.url, &init)?;
	let response: Response = JsFuture::from(window.fetch_with_request(&fetch_request)).await?.dyn_into()?;

	let mut response_headers = Vec::new();
	for name in ["Content-Type", ajax::STATE_HEADER].iter() {
		if let Some(value) = response.headers().get(name)? {
			response_headers.push(((*name).to_owned(), value));
		}
	}
	let body = JsFuture::from(response.text()?).await?.as_string().unwrap_or_default();
	Ok(AjaxResponse {
		status: response.status(),
		headers: response_headers,
		body,
	})
}

struct Shared {
	runtime: RefCell<Runtime<WebDom>>,
	transport: Box<dyn Transport>,
	document: Document,
	listeners: RefCell<Vec<(EventKind, Closure<dyn FnMut(web_sys::Event)>)>>,
}

/// Runs `f` on the runtime unless it's already borrowed, then hands queued requests and timers to the browser.
fn with_runtime<R>(shared: &Rc<Shared>, f: impl FnOnce(&mut Runtime<WebDom>) -> R) -> Option<R> {
	let result = match shared.runtime.try_borrow_mut() {
		Ok(mut runtime) => f(&mut runtime),
		Err(_) => {
			error!("Runtime is busy, dropping re-entrant call.");
			return None;
		}
	};
	pump(shared);
	Some(result)
}

fn pump(shared: &Rc<Shared>) {
	let (requests, scheduled) = match shared.runtime.try_borrow_mut() {
		Ok(mut runtime) => (runtime.take_pending_requests(), runtime.take_scheduled()),
		Err(_) => return,
	};

	for request in requests {
		let id = request.id;
		let response = shared.transport.send(request);
		let weak = Rc::downgrade(shared);
		spawn_local(async move {
			let result = response.await;
			if let Some(shared) = weak.upgrade() {
				with_runtime(&shared, |runtime| runtime.complete_request(id, result));
			}
		});
	}

	for Scheduled { delay, task } in scheduled {
		let weak = Rc::downgrade(shared);
		let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
		trace!("Scheduling {:?} in {} ms.", task, millis);
		Timeout::new(millis, move || {
			if let Some(shared) = weak.upgrade() {
				with_runtime(&shared, |runtime| runtime.run_task(task));
			}
		})
		.forget();
	}
}

struct WebSocketSocket {
	socket: WebSocket,
	_on_open: Closure<dyn FnMut()>,
	_on_message: Closure<dyn FnMut(MessageEvent)>,
	_on_close: Closure<dyn FnMut(CloseEvent)>,
}

impl Socket for WebSocketSocket {
	fn send(&mut self, text: &str) -> Result<(), RealtimeError> {
		self.socket.send_with_str(text).map_err(|error| RealtimeError::Send(format!("{:?}", error)))
	}

	fn close(&mut self) {
		log_failure("WebSocket.close", self.socket.close())
	}
}

impl Drop for WebSocketSocket {
	fn drop(&mut self) {
		self.socket.set_onopen(None);
		self.socket.set_onmessage(None);
		self.socket.set_onclose(None);
	}
}

struct WebSocketConnector {
	shared: Weak<Shared>,
}

impl Connector for WebSocketConnector {
	fn connect(&mut self, url: &str) -> Result<Box<dyn Socket>, RealtimeError> {
		let socket = WebSocket::new(url).map_err(|error| RealtimeError::Send(format!("{:?}", error)))?;

		let shared = self.shared.clone();
		let on_open = Closure::wrap(Box::new(move || {
			if let Some(shared) = shared.upgrade() {
				with_runtime(&shared, Runtime::realtime_opened);
			}
		}) as Box<dyn FnMut()>);

		let shared = self.shared.clone();
		let on_message = Closure::wrap(Box::new(move |event: MessageEvent| match event.data().as_string() {
			Some(text) => {
				if let Some(shared) = shared.upgrade() {
					with_runtime(&shared, |runtime| runtime.receive_message(&text));
				}
			}
			None => warn!("Ignoring binary realtime frame."),
		}) as Box<dyn FnMut(MessageEvent)>);

		let shared = self.shared.clone();
		let on_close = Closure::wrap(Box::new(move |event: CloseEvent| {
			if let Some(shared) = shared.upgrade() {
				with_runtime(&shared, |runtime| runtime.realtime_closed(event.was_clean()));
			}
		}) as Box<dyn FnMut(CloseEvent)>);

		socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
		socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
		socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));
		Ok(Box::new(WebSocketSocket {
			socket,
			_on_open: on_open,
			_on_message: on_message,
			_on_close: on_close,
		}))
	}
}

/// A [`Runtime`] attached to the current document.
///
/// Listeners are removed when this is dropped, so keep it alive for as long as the page should stay interactive.
pub struct WebRuntime {
	shared: Rc<Shared>,
}

impl WebRuntime {
	/// Installs capturing `click`, `submit`, `change` and `input` listeners on the document, then scans it.
	///
	/// # Errors
	///
	/// Iff there is no document or a listener couldn't be added.
	pub fn start(config: Config) -> Result<Self, JsValue> {
		let dom = WebDom::from_window().ok_or_else(|| JsValue::from_str("declarative-dom: No document."))?;
		let document = dom.document().clone();
		let shared = Rc::new(Shared {
			runtime: RefCell::new(Runtime::new(dom, config)),
			transport: Box::new(FetchTransport),
			document: document.clone(),
			listeners: RefCell::new(Vec::new()),
		});

		let mut options = AddEventListenerOptions::new();
		options.capture(true);
		for kind in EventKind::ALL.iter().copied() {
			let weak = Rc::downgrade(&shared);
			let listener = Closure::wrap(Box::new(move |event: web_sys::Event| {
				let span = trace_span!("listener", event = kind.name());
				let _enter = span.enter();

				let target = match event.target().and_then(|target| target.dyn_into::<Element>().ok()) {
					Some(target) => target,
					None => return,
				};
				if let Some(shared) = weak.upgrade() {
					if let Some(outcome) = with_runtime(&shared, |runtime| runtime.dispatch(kind, &target)) {
						if outcome.prevent_default {
							event.prevent_default();
						}
					}
				}
			}) as Box<dyn FnMut(web_sys::Event)>);
			document.add_event_listener_with_callback_and_add_event_listener_options(kind.name(), listener.as_ref().unchecked_ref(), &options)?;
			shared.listeners.borrow_mut().push((kind, listener));
		}

		with_runtime(&shared, Runtime::init);
		Ok(Self { shared })
	}

	/// Runs `f` on the runtime. [`None`] iff called re-entrantly from inside a handler or hook.
	pub fn with<R>(&self, f: impl FnOnce(&mut Runtime<WebDom>) -> R) -> Option<R> {
		with_runtime(&self.shared, f)
	}

	/// Opens a `WebSocket` realtime channel to `url`.
	///
	/// # Errors
	///
	/// Iff the socket couldn't be created or the runtime is busy.
	pub fn connect_realtime(&self, url: &str) -> Result<(), RealtimeError> {
		let connector = WebSocketConnector {
			shared: Rc::downgrade(&self.shared),
		};
		self.with(|runtime| runtime.connect_realtime(url, Box::new(connector)))
			.unwrap_or(Err(RealtimeError::NotConnected))
	}
}

impl Drop for WebRuntime {
	fn drop(&mut self) {
		for (kind, listener) in self.shared.listeners.borrow_mut().drain(..) {
			log_failure(
				"removeEventListener",
				self.shared
					.document
					.remove_event_listener_with_callback_and_bool(kind.name(), listener.as_ref().unchecked_ref(), true),
			);
		}
		if let Ok(mut runtime) = self.shared.runtime.try_borrow_mut() {
			runtime.reset();
		}
	}
}
