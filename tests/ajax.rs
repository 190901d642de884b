use declarative_dom::{
	ajax::{self, drive_pending, AjaxRequest, AjaxResponse, Method, Transport},
	error::AjaxError,
	ComponentDefinition, ComponentId, Dom, EventKind, HookName, HookOutcome, MemoryDom, Runtime,
};
use futures::{executor::block_on, future::LocalBoxFuture};
use serde_json::{json, Value};
use std::{cell::RefCell, rc::Rc};

use memory_fixture_::{by_id, click, runtime, text};

/// Answers every request with `respond`, remembering what was sent.
struct FakeTransport<F> {
	sent: RefCell<Vec<AjaxRequest>>,
	respond: F,
}

impl<F: Fn(&AjaxRequest) -> Result<AjaxResponse, AjaxError>> FakeTransport<F> {
	fn new(respond: F) -> Self {
		Self {
			sent: RefCell::new(Vec::new()),
			respond,
		}
	}
}

impl<F: Fn(&AjaxRequest) -> Result<AjaxResponse, AjaxError>> Transport for FakeTransport<F> {
	fn send(&self, request: AjaxRequest) -> LocalBoxFuture<'static, Result<AjaxResponse, AjaxError>> {
		let result = (self.respond)(&request);
		self.sent.borrow_mut().push(request);
		Box::pin(futures::future::ready(result))
	}
}

const CART: &str = r#"
	<div data-ui-component="cart" data-ui-id="cart" data-ui-state='{"total": 10}'>
		<span id="total" data-ui-bind="total"></span>
		<form id="form">
			<input name="sku" value="A-1">
			<input name="qty" value="2">
			<button id="add" data-ui-click="ajax:/cart/add">Add</button>
		</form>
		<button id="refresh" data-ui-click="ajax:/cart" data-ui-method="GET" data-ui-target="summary">Refresh</button>
		<button id="reload" data-ui-click="ajax:/cart/component" data-ui-swap="outer">Reload</button>
		<div id="summary">old summary</div>
	</div>
"#;

fn drive<F: Fn(&AjaxRequest) -> Result<AjaxResponse, AjaxError>>(runtime: Runtime<MemoryDom>, respond: F) -> (Runtime<MemoryDom>, Vec<AjaxRequest>) {
	let transport = FakeTransport::new(respond);
	let runtime = RefCell::new(runtime);
	block_on(drive_pending(&runtime, &transport));
	(runtime.into_inner(), transport.sent.into_inner())
}

#[test]
fn request_carries_form_component_and_state() {
	let mut runtime = runtime(CART);
	runtime.init();
	let outcome = click(&mut runtime, "add");
	assert!(outcome.handled);
	assert!(outcome.prevent_default);

	let add = by_id(&runtime, "add");
	assert!(runtime.dom().has_attribute(&add, "disabled"));
	assert!(runtime.dom().has_class(&add, "ui-loading"));
	assert_eq!(runtime.requests_in_flight(), 1);

	let requests = runtime.take_pending_requests();
	assert_eq!(requests.len(), 1);
	let request = &requests[0];
	assert_eq!(request.method, Method::Post);
	assert_eq!(request.url, "/cart/add");
	assert_eq!(request.header(ajax::PARTIAL_HEADER), Some("true"));
	assert_eq!(request.header(ajax::COMPONENT_HEADER), Some("cart"));
	assert_eq!(request.header("content-type"), Some("application/json"));
	let body: Value = serde_json::from_str(request.body.as_deref().expect("POST body")).expect("JSON body");
	assert_eq!(
		body,
		json!({
			"sku": "A-1",
			"qty": "2",
			"_ui_component": "cart",
			"_ui_state": { "total": 10 },
		})
	);
}

#[test]
fn get_has_no_body() {
	let mut runtime = runtime(CART);
	runtime.init();
	click(&mut runtime, "refresh");
	let requests = runtime.take_pending_requests();
	assert_eq!(requests[0].method, Method::Get);
	assert_eq!(requests[0].body, None);
	assert_eq!(requests[0].header("content-type"), None);
}

#[test]
fn html_into_target() {
	let mut runtime = runtime(CART);
	runtime.init();
	click(&mut runtime, "refresh");
	let (runtime, sent) = drive(runtime, |_| Ok(AjaxResponse::new(200, r#"<b>3 items</b> <span id="again" data-ui-bind="total"></span>"#)));

	assert_eq!(sent.len(), 1);
	assert_eq!(runtime.requests_in_flight(), 0);
	assert_eq!(text(&runtime, "summary"), "3 items 10");
	let refresh = by_id(&runtime, "refresh");
	assert!(!runtime.dom().has_attribute(&refresh, "disabled"));
	assert!(!runtime.dom().has_class(&refresh, "ui-loading"));
}

#[test]
fn json_envelope_and_state_header_merge() {
	let mut runtime = runtime(CART);
	runtime.init();
	click(&mut runtime, "add");
	let (runtime, _) = drive(runtime, |request| {
		assert_eq!(request.url, "/cart/add");
		Ok(AjaxResponse::new(200, r#"{"state": {"total": 30, "count": 3}}"#)
			.with_header("Content-Type", "application/json; charset=utf-8")
			.with_header(ajax::STATE_HEADER, r#"{"coupon": "SPRING"}"#))
	});

	let id = ComponentId::from("cart");
	assert_eq!(runtime.get(&id, "total"), Some(json!(30)));
	assert_eq!(runtime.get(&id, "count"), Some(json!(3)));
	assert_eq!(runtime.get(&id, "coupon"), Some(json!("SPRING")));
	assert_eq!(text(&runtime, "total"), "30");
	// No markup in the envelope, so the component's markup stays.
	assert_eq!(text(&runtime, "summary"), "old summary");
}

#[test]
fn failure_only_clears_loading() {
	for failure in [
		Err(AjaxError::Transport("offline".to_owned())),
		Ok(AjaxResponse::new(500, "<p>Internal error</p>")),
	]
	.iter()
	{
		let mut runtime = runtime(CART);
		runtime.init();
		let root = runtime.dom().document_element();
		let before = runtime.dom().inner_html(&root);

		click(&mut runtime, "add");
		let (runtime, _) = drive(runtime, |_| failure.clone());

		assert_eq!(runtime.dom().inner_html(&root), before);
		assert_eq!(runtime.get(&ComponentId::from("cart"), "total"), Some(json!(10)));
		assert_eq!(runtime.requests_in_flight(), 0);
	}
}

#[test]
fn disabled_triggers_stay_disabled() {
	let mut runtime = runtime(r#"<div data-ui-component="c"><button id="b" disabled data-ui-click="ajax:/x">x</button></div>"#);
	runtime.init();
	let button = by_id(&runtime, "b");
	runtime.request(&button, "/x");
	let (runtime, _) = drive(runtime, |_| Ok(AjaxResponse::new(204, "")));
	assert!(runtime.dom().has_attribute(&button, "disabled"));
	assert!(!runtime.dom().has_class(&button, "ui-loading"));
}

#[test]
fn outer_swap_keeps_component_identity() {
	let mut runtime = runtime(CART);
	let inits = Rc::new(RefCell::new(0));
	runtime.register_component(
		"cart",
		ComponentDefinition::<MemoryDom>::new().on(HookName::Init, {
			let inits = Rc::clone(&inits);
			move |_, _| {
				*inits.borrow_mut() += 1;
				Ok(HookOutcome::Continue)
			}
		}),
	);
	runtime.init();
	let old_root = runtime.component(&ComponentId::from("cart")).expect("cart").element;

	let reload = by_id(&runtime, "reload");
	runtime.dispatch(EventKind::Click, &reload);
	let (runtime, _) = drive(runtime, |_| {
		Ok(AjaxResponse::new(
			200,
			r#"<div data-ui-component="cart" data-ui-state='{"total": 99}'><span id="new-total" data-ui-bind="total"></span></div>"#,
		))
	});

	let id = ComponentId::from("cart");
	assert_eq!(runtime.component_ids(), vec![id.clone()]);
	let component = runtime.component(&id).expect("cart survives");
	assert_ne!(component.element, old_root);
	assert_eq!(runtime.dom().attribute(&component.element, "data-ui-id").as_deref(), Some("cart"));
	assert_eq!(text(&runtime, "new-total"), "99");
	assert_eq!(*inits.borrow(), 1);
}

#[test]
fn markup_without_target_is_dropped() {
	let mut runtime = runtime(r#"<button id="b" data-ui-click="ajax:/ping">ping</button>"#);
	runtime.init();
	let root = runtime.dom().document_element();
	let before = runtime.dom().inner_html(&root);

	click(&mut runtime, "b");
	let requests = runtime.take_pending_requests();
	assert_eq!(requests[0].header(ajax::COMPONENT_HEADER), None);
	assert_eq!(requests[0].body.as_deref(), Some("{}"));
	runtime.complete_request(requests[0].id, Ok(AjaxResponse::new(200, "<p>pong</p>")));
	assert_eq!(runtime.dom().inner_html(&root), before);
}

#[test]
fn unknown_request_ids_are_ignored() {
	let mut runtime = runtime(CART);
	runtime.init();
	runtime.complete_request(42, Ok(AjaxResponse::new(200, "<p>late</p>")));
	assert_eq!(text(&runtime, "summary"), "old summary");
}

#[test]
fn swapped_out_components_are_dropped() {
	let mut runtime = runtime(
		r#"<div data-ui-component="page" data-ui-id="page">
			<button id="load" data-ui-click="ajax:/widget" data-ui-method="GET" data-ui-target="slot">Load</button>
			<div id="slot"><div data-ui-component="widget" data-ui-id="w" data-ui-state='{"n": 1}'></div></div>
		</div>"#,
	);
	let destroyed = Rc::new(RefCell::new(0));
	runtime.register_component(
		"widget",
		ComponentDefinition::<MemoryDom>::new().on(HookName::Destroyed, {
			let destroyed = Rc::clone(&destroyed);
			move |_, _| {
				*destroyed.borrow_mut() += 1;
				Ok(HookOutcome::Continue)
			}
		}),
	);
	runtime.init();
	assert_eq!(runtime.component_ids().len(), 2);

	click(&mut runtime, "load");
	let (runtime, _) = drive(runtime, |_| Ok(AjaxResponse::new(200, "<p>gone</p>")));

	assert_eq!(text(&runtime, "slot"), "gone");
	assert_eq!(runtime.component_ids(), vec![ComponentId::from("page")]);
	assert_eq!(runtime.store().snapshot(&ComponentId::from("w")), None);
	assert_eq!(*destroyed.borrow(), 1);
}
