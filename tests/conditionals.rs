use declarative_dom::ComponentId;
use serde_json::json;

use memory_fixture_::{displayed, runtime};

const PANEL: &str = r#"
	<div data-ui-component="panel" data-ui-id="panel" data-ui-state='{"open": false, "items": [], "status": "idle", "user": {"role": "guest"}}'>
		<p id="details" data-ui-show="open">Details</p>
		<p id="closed" data-ui-hide="open">Closed</p>
		<p id="empty" data-ui-show="items.length === 0">Empty</p>
		<p id="admin" data-ui-show="user.role === 'admin' &amp;&amp; open">Admin</p>
		<p id="broken" data-ui-show="open ===">Never</p>
		<p id="missing" data-ui-show="nothing.here">Missing</p>
		<div data-ui-toggle="status === 'busy'">
			<span id="busy" data-ui-when="true">Busy</span>
			<span id="idle" data-ui-when="false">Idle</span>
			<span id="note">Always</span>
		</div>
	</div>
"#;

#[test]
fn initial_visibility() {
	let mut runtime = runtime(PANEL);
	runtime.init();
	assert!(!displayed(&runtime, "details"));
	assert!(displayed(&runtime, "closed"));
	assert!(displayed(&runtime, "empty"));
	assert!(!displayed(&runtime, "admin"));
	assert!(!displayed(&runtime, "broken"));
	assert!(!displayed(&runtime, "missing"));
	assert!(displayed(&runtime, "idle"));
	assert!(!displayed(&runtime, "busy"));
	assert!(displayed(&runtime, "note"));
}

#[test]
fn state_changes_flip_visibility() {
	let mut runtime = runtime(PANEL);
	runtime.init();
	let id = ComponentId::from("panel");

	runtime.set(&id, "open", json!(true));
	assert!(displayed(&runtime, "details"));
	assert!(!displayed(&runtime, "closed"));
	assert!(!displayed(&runtime, "admin"));

	runtime.set(&id, "user.role", json!("admin"));
	assert!(displayed(&runtime, "admin"));

	runtime.set(&id, "items", json!([1]));
	assert!(!displayed(&runtime, "empty"));
}

#[test]
fn toggle_shows_exactly_one_case() {
	let mut runtime = runtime(PANEL);
	runtime.init();
	let id = ComponentId::from("panel");
	for (status, expected) in [("busy", "busy"), ("done", "idle"), ("busy", "busy")].iter() {
		runtime.set(&id, "status", json!(status));
		let visible: Vec<&str> = ["idle", "busy"].iter().copied().filter(|id| displayed(&runtime, id)).collect();
		assert_eq!(visible, vec![*expected]);
	}
	assert!(displayed(&runtime, "note"));
}

#[test]
fn conditions_never_write_state() {
	let mut runtime = runtime(PANEL);
	runtime.init();
	let id = ComponentId::from("panel");
	let before = runtime.store().snapshot(&id).cloned();
	runtime.set(&id, "open", json!(true));
	runtime.set(&id, "open", json!(false));
	assert_eq!(runtime.store().snapshot(&id).cloned(), before);
}
