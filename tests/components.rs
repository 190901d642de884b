use declarative_dom::{ComponentDefinition, ComponentId, Dom, EventKind, HookName, HookOutcome, MemoryDom};
use serde_json::json;
use std::{cell::RefCell, rc::Rc};

use memory_fixture_::{by_id, click, runtime, text};

const COUNTER: &str = r#"
	<div data-ui-component="counter" data-ui-id="counter-1" data-ui-state='{"count": 0}'>
		<span id="display" data-ui-bind="count"></span>
		<button id="inc" data-ui-click="increment">+</button>
		<button id="missing" data-ui-click="nothingHere">?</button>
	</div>
"#;

fn increment(runtime: &mut declarative_dom::Runtime<declarative_dom::MemoryDom>, event: &declarative_dom::HandlerEvent<declarative_dom::NodeId>) {
	let id = event.component.clone().expect("inside a component");
	let count = runtime.get(&id, "count").and_then(|count| count.as_i64()).unwrap_or(0);
	runtime.set(&id, "count", json!(count + 1));
}

#[test]
fn counter() {
	let mut runtime = runtime(COUNTER);
	runtime.register_handler("increment", increment);
	runtime.init();
	assert_eq!(text(&runtime, "display"), "0");

	for _ in 0..3 {
		let outcome = click(&mut runtime, "inc");
		assert!(outcome.handled);
		assert!(!outcome.prevent_default);
	}
	assert_eq!(text(&runtime, "display"), "3");
	assert_eq!(runtime.get(&ComponentId::from("counter-1"), "count"), Some(json!(3)));
}

#[test]
fn unknown_handler_is_a_no_op() {
	let mut runtime = runtime(COUNTER);
	runtime.init();
	let outcome = click(&mut runtime, "missing");
	assert!(!outcome.handled);
	assert_eq!(text(&runtime, "display"), "0");
}

#[test]
fn global_function_fallback() {
	let mut runtime = runtime(COUNTER);
	let calls = Rc::new(RefCell::new(Vec::new()));
	runtime.dom_mut().define_global("nothingHere", {
		let calls = Rc::clone(&calls);
		move |_, kind| calls.borrow_mut().push(kind)
	});
	runtime.init();
	assert!(click(&mut runtime, "missing").handled);
	assert_eq!(*calls.borrow(), vec![EventKind::Click]);
}

#[test]
fn explicit_global_action() {
	let mut runtime = runtime(r#"<div data-ui-component="c"><button id="b" data-ui-click="window.track">x</button></div>"#);
	let calls = Rc::new(RefCell::new(0));
	runtime.dom_mut().define_global("track", {
		let calls = Rc::clone(&calls);
		move |_, _| *calls.borrow_mut() += 1
	});
	runtime.init();
	assert!(click(&mut runtime, "b").handled);
	assert_eq!(*calls.borrow(), 1);
}

#[test]
fn ids_are_generated_and_stable() {
	let mut runtime = runtime(r#"<div id="a" data-ui-component="panel"></div><div id="b" data-ui-component="panel"></div>"#);
	runtime.init();
	let first = runtime.dom().attribute(&by_id(&runtime, "a"), "data-ui-id").expect("generated id");
	let second = runtime.dom().attribute(&by_id(&runtime, "b"), "data-ui-id").expect("generated id");
	assert_ne!(first, second);
	assert!(first.starts_with("panel-"));

	runtime.init();
	assert_eq!(runtime.dom().attribute(&by_id(&runtime, "a"), "data-ui-id"), Some(first));
	assert_eq!(runtime.component_ids().len(), 2);
}

#[test]
fn init_is_idempotent() {
	let mut runtime = runtime(COUNTER);
	let inits = Rc::new(RefCell::new(0));
	runtime.register_component(
		"counter",
		ComponentDefinition::<MemoryDom>::new().on(HookName::Init, {
			let inits = Rc::clone(&inits);
			move |_, _| {
				*inits.borrow_mut() += 1;
				Ok(HookOutcome::Continue)
			}
		}),
	);
	runtime.register_handler("increment", increment);
	runtime.init();
	click(&mut runtime, "inc");
	runtime.init();
	runtime.init();

	assert_eq!(*inits.borrow(), 1);
	assert_eq!(runtime.component_ids(), vec![ComponentId::from("counter-1")]);
	assert_eq!(text(&runtime, "display"), "1");
}

#[test]
fn defaults_fill_missing_keys_only() {
	let mut runtime = runtime(r#"<div data-ui-component="form" data-ui-id="f" data-ui-state='{"name": "Ada"}'></div>"#);
	runtime.register_component("form", ComponentDefinition::<MemoryDom>::new().with_default("name", json!("")).with_default("age", json!(36)));
	runtime.init();
	let id = ComponentId::from("f");
	assert_eq!(runtime.get(&id, "name"), Some(json!("Ada")));
	assert_eq!(runtime.get(&id, "age"), Some(json!(36)));
}

#[test]
fn malformed_state_starts_empty() {
	let mut runtime = runtime(r#"<div data-ui-component="c" data-ui-id="c" data-ui-state='{"broken'><span id="s" data-ui-bind="x"></span></div>"#);
	runtime.init();
	assert_eq!(runtime.store().snapshot(&ComponentId::from("c")), Some(&json!({})));
	assert_eq!(text(&runtime, "s"), "");
}

#[test]
fn nested_components_are_separate() {
	let mut runtime = runtime(
		r#"<div data-ui-component="outer" data-ui-id="outer" data-ui-state='{"label": "outer"}'>
			<span id="o" data-ui-bind="label"></span>
			<div data-ui-component="inner" data-ui-id="inner" data-ui-state='{"label": "inner"}'>
				<span id="i" data-ui-bind="label"></span>
			</div>
		</div>"#,
	);
	runtime.init();
	assert_eq!(text(&runtime, "o"), "outer");
	assert_eq!(text(&runtime, "i"), "inner");

	runtime.set(&ComponentId::from("outer"), "label", json!("changed"));
	assert_eq!(text(&runtime, "o"), "changed");
	assert_eq!(text(&runtime, "i"), "inner");
	assert_eq!(runtime.component_id_of(&by_id(&runtime, "i")), Some(ComponentId::from("inner")));
}

#[test]
fn submit_prevents_default() {
	let mut runtime = runtime(r#"<div data-ui-component="c"><form id="f" data-ui-submit="save"><input name="x"></form></div>"#);
	let saved = Rc::new(RefCell::new(false));
	runtime.register_handler("save", {
		let saved = Rc::clone(&saved);
		move |_, event| {
			assert_eq!(event.kind, EventKind::Submit);
			*saved.borrow_mut() = true;
		}
	});
	runtime.init();
	let form = by_id(&runtime, "f");
	let outcome = runtime.dispatch(EventKind::Submit, &form);
	assert!(outcome.prevent_default);
	assert!(*saved.borrow());
}

#[test]
fn reset_forgets_everything() {
	let mut runtime = runtime(COUNTER);
	runtime.register_handler("increment", increment);
	runtime.init();
	runtime.reset();
	assert!(runtime.component_ids().is_empty());
	assert_eq!(runtime.get(&ComponentId::from("counter-1"), "count"), None);
	assert!(!click(&mut runtime, "inc").handled);
}
