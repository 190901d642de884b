//! Loading indicators, both for AJAX triggers and the imperative API.

use crate::{config::Config, dom::Dom};
use core::time::Duration;

/// Identifies a duration-bounded [`show_loading_for`](`crate::Runtime::show_loading_for`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadingTicket(pub(crate) u64);

/// Deferred work for the host's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
	HideLoading(LoadingTicket),
	/// Retry the realtime connection.
	Reconnect,
}

/// A [`Task`] and when to [run](`crate::Runtime::run_task`) it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
	pub delay: Duration,
	pub task: Task,
}

const LOADING_STATE_CLASS: &str = "loading-state";
const CONTENT_STATE_CLASS: &str = "content-state";

/// Marks `node` as loading: loading class, `aria-busy` and an optional text.
///
/// `.loading-state`/`.content-state` children, if any, are swapped.
pub fn show<D: Dom>(dom: &mut D, config: &Config, node: &D::Node, text: Option<&str>) {
	dom.add_class(node, &config.loading_class);
	dom.set_attribute(node, "aria-busy", "true");
	if let Some(text) = text {
		dom.set_attribute(node, &config.attr("loading-text"), text);
	}
	for child in dom.children(node) {
		if dom.has_class(&child, LOADING_STATE_CLASS) {
			crate::conditional::set_visible(dom, &child, true);
		} else if dom.has_class(&child, CONTENT_STATE_CLASS) {
			crate::conditional::set_visible(dom, &child, false);
		}
	}
}

/// Undoes [`show`].
pub fn hide<D: Dom>(dom: &mut D, config: &Config, node: &D::Node) {
	dom.remove_class(node, &config.loading_class);
	dom.remove_attribute(node, "aria-busy");
	dom.remove_attribute(node, &config.attr("loading-text"));
	for child in dom.children(node) {
		if dom.has_class(&child, LOADING_STATE_CLASS) {
			crate::conditional::set_visible(dom, &child, false);
		} else if dom.has_class(&child, CONTENT_STATE_CLASS) {
			crate::conditional::set_visible(dom, &child, true);
		}
	}
}

/// Loading state of an AJAX trigger, which is additionally disabled. Returns whether it was disabled already.
pub fn begin_request<D: Dom>(dom: &mut D, config: &Config, trigger: &D::Node) -> bool {
	let was_disabled = dom.has_attribute(trigger, "disabled");
	dom.set_attribute(trigger, "disabled", "");
	dom.add_class(trigger, &config.loading_class);
	was_disabled
}

pub fn end_request<D: Dom>(dom: &mut D, config: &Config, trigger: &D::Node, was_disabled: bool) {
	if !was_disabled {
		dom.remove_attribute(trigger, "disabled");
	}
	dom.remove_class(trigger, &config.loading_class);
}
