use core::time::Duration;
use declarative_dom::{
	loading::{Scheduled, Task},
	Dom,
};

use memory_fixture_::{by_id, displayed, runtime};

const CARD: &str = r#"
	<div id="card" data-ui-component="card">
		<div id="spinner" class="loading-state" style="display: none">Loading…</div>
		<div id="content" class="content-state">Content</div>
	</div>
"#;

#[test]
fn show_and_hide() {
	let mut runtime = runtime(CARD);
	runtime.init();
	let card = by_id(&runtime, "card");

	runtime.show_loading(&card, Some("Saving"));
	assert!(runtime.dom().has_class(&card, "ui-loading"));
	assert_eq!(runtime.dom().attribute(&card, "aria-busy").as_deref(), Some("true"));
	assert_eq!(runtime.dom().attribute(&card, "data-ui-loading-text").as_deref(), Some("Saving"));
	assert!(displayed(&runtime, "spinner"));
	assert!(!displayed(&runtime, "content"));

	runtime.hide_loading(&card);
	assert!(!runtime.dom().has_class(&card, "ui-loading"));
	assert!(!runtime.dom().has_attribute(&card, "aria-busy"));
	assert!(!runtime.dom().has_attribute(&card, "data-ui-loading-text"));
	assert!(!displayed(&runtime, "spinner"));
	assert!(displayed(&runtime, "content"));
}

#[test]
fn timed_loading_is_cleared_by_its_task() {
	let mut runtime = runtime(CARD);
	runtime.init();
	let card = by_id(&runtime, "card");

	let ticket = runtime.show_loading_for(&card, Duration::from_millis(1500), None);
	let scheduled = runtime.take_scheduled();
	assert_eq!(
		scheduled,
		vec![Scheduled {
			delay: Duration::from_millis(1500),
			task: Task::HideLoading(ticket),
		}]
	);
	assert!(runtime.dom().has_class(&card, "ui-loading"));

	runtime.run_task(scheduled[0].task);
	assert!(!runtime.dom().has_class(&card, "ui-loading"));
	assert!(runtime.take_scheduled().is_empty());
}

#[test]
fn stale_tickets_leave_newer_loading_alone() {
	let mut runtime = runtime(CARD);
	runtime.init();
	let card = by_id(&runtime, "card");

	let first = runtime.show_loading_for(&card, Duration::from_millis(10), None);
	runtime.hide_loading(&card);
	runtime.show_loading(&card, None);
	runtime.run_task(Task::HideLoading(first));
	assert!(runtime.dom().has_class(&card, "ui-loading"));
}
