#![cfg(target_arch = "wasm32")]

use declarative_dom::{web::WebRuntime, ComponentId, Config};
use serde_json::json;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, Document, HtmlElement, HtmlInputElement};

wasm_bindgen_test_configure!(run_in_browser);

static mut LOG_INITIALIZED: bool = false;

fn document_with(html: &str) -> Document {
	unsafe {
		if !LOG_INITIALIZED {
			tracing_wasm::set_as_global_default();
			LOG_INITIALIZED = true;
		}
	}

	let document = window().unwrap().document().unwrap();
	document.body().unwrap().set_inner_html(html);
	document
}

#[wasm_bindgen_test]
fn click_counter() {
	let document = document_with(
		r#"<div data-ui-component="counter" data-ui-id="counter-1" data-ui-state='{"count": 0}'>
			<span id="display" data-ui-bind="count"></span>
			<button id="inc" data-ui-click="increment">+</button>
		</div>"#,
	);

	let runtime = WebRuntime::start(Config::default()).unwrap();
	runtime
		.with(|runtime| {
			runtime.register_handler("increment", |runtime, event| {
				let id = event.component.clone().unwrap();
				let count = runtime.get(&id, "count").and_then(|count| count.as_i64()).unwrap_or(0);
				runtime.set(&id, "count", json!(count + 1));
			})
		})
		.unwrap();

	let display = document.get_element_by_id("display").unwrap();
	assert_eq!(display.text_content().unwrap(), "0");

	let button: HtmlElement = document.get_element_by_id("inc").unwrap().dyn_into().unwrap();
	button.click();
	button.click();
	assert_eq!(display.text_content().unwrap(), "2");

	drop(runtime);
	button.click();
	assert_eq!(display.text_content().unwrap(), "2");
}

#[wasm_bindgen_test]
fn typing_is_two_way() {
	let document = document_with(
		r#"<div data-ui-component="profile" data-ui-id="profile" data-ui-state='{"name": "Ada"}'>
			<input id="name" data-ui-model="name">
			<p id="greeting" data-ui-bind="name"></p>
			<p id="long" data-ui-show="name.length > 3">That's a long name.</p>
		</div>"#,
	);
	let runtime = WebRuntime::start(Config::default()).unwrap();

	let input: HtmlInputElement = document.get_element_by_id("name").unwrap().dyn_into().unwrap();
	assert_eq!(input.value(), "Ada");
	let long: HtmlElement = document.get_element_by_id("long").unwrap().dyn_into().unwrap();
	assert_eq!(long.style().get_property_value("display").unwrap(), "none");

	input.set_value("Grace");
	// Capturing listeners see the event even though it doesn't bubble.
	input.dispatch_event(&web_sys::Event::new("input").unwrap()).unwrap();

	let greeting = document.get_element_by_id("greeting").unwrap();
	assert_eq!(greeting.text_content().unwrap(), "Grace");
	assert_eq!(long.style().get_property_value("display").unwrap(), "");
	assert_eq!(
		runtime.with(|runtime| runtime.get(&ComponentId::from("profile"), "name")).unwrap(),
		Some(json!("Grace"))
	);
}
