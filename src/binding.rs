//! Two-way form bindings and one-way display bindings.
//!
//! Bindings aren't registered anywhere: every pass looks them up from the DOM again, so markup replaced by an AJAX response
//! or a list render is picked up without bookkeeping.

use crate::{
	component,
	config::Config,
	dom::{ControlKind, Dom},
	state::{ComponentId, Path, StateStore},
};
use serde_json::{Number, Value};
use tracing::{error, trace, trace_span};

/// The raw and parsed path of `node`'s `bind` or `model` attribute.
pub(crate) fn bound_path<D: Dom>(dom: &D, config: &Config, node: &D::Node) -> Option<(String, Path)> {
	let raw = dom.attribute(node, &config.attr("bind")).or_else(|| dom.attribute(node, &config.attr("model")))?;
	match Path::parse(raw.trim()) {
		Ok(path) => Some((raw, path)),
		Err(error) => {
			error!("Ignoring binding with malformed path: {}", error);
			None
		}
	}
}

/// Bound elements belonging to `component` itself.
pub(crate) fn bound_elements<D: Dom>(dom: &D, config: &Config, component: &D::Node) -> Vec<D::Node> {
	let mut nodes = component::scoped(dom, config, component, &config.attr("bind"));
	for node in component::scoped(dom, config, component, &config.attr("model")) {
		if !nodes.contains(&node) {
			nodes.push(node)
		}
	}
	nodes
}

/// Bound elements at or below `node`, regardless of component boundaries.
pub(crate) fn bound_below<D: Dom>(dom: &D, config: &Config, node: &D::Node) -> Vec<D::Node> {
	let mut nodes = dom.query_attribute(node, &config.attr("bind"));
	for node in dom.query_attribute(node, &config.attr("model")) {
		if !nodes.contains(&node) {
			nodes.push(node)
		}
	}
	nodes
}

/// Formats a number the way a browser would print it, so `1.0` renders as `1`.
#[must_use]
pub fn format_number(number: &Number) -> String {
	if number.is_i64() || number.is_u64() {
		return number.to_string();
	}
	match number.as_f64() {
		#[allow(clippy::cast_possible_truncation)]
		Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => format!("{}", float as i64),
		Some(float) => format!("{}", float),
		None => number.to_string(),
	}
}

/// Text content for a display binding.
///
/// ```
/// use declarative_dom::binding::display_text;
/// use serde_json::json;
///
/// assert_eq!(display_text(Some(&json!(true))), "Yes");
/// assert_eq!(display_text(Some(&json!(null))), "");
/// assert_eq!(display_text(None), "");
/// assert_eq!(display_text(Some(&json!(3.0))), "3");
/// assert_eq!(display_text(Some(&json!([1, 2]))), "[1,2]");
/// ```
#[must_use]
pub fn display_text(value: Option<&Value>) -> String {
	match value {
		None | Some(Value::Null) => String::new(),
		Some(Value::Bool(true)) => "Yes".to_owned(),
		Some(Value::Bool(false)) => "No".to_owned(),
		Some(Value::Number(number)) => format_number(number),
		Some(Value::String(text)) => text.clone(),
		Some(container) => container.to_string(),
	}
}

/// String conversion for control values and attributes, which unlike [`display_text`] keeps `true`/`false`.
#[must_use]
pub fn value_string(value: Option<&Value>) -> String {
	match value {
		Some(Value::Bool(b)) => b.to_string(),
		other => display_text(other),
	}
}

/// Reads the state value a control currently represents.
pub fn read_control<D: Dom>(dom: &D, node: &D::Node) -> Option<Value> {
	Some(match dom.control_kind(node)? {
		ControlKind::Checkbox => Value::Bool(dom.checked(node)),
		ControlKind::Radio => {
			if dom.checked(node) {
				Value::String(dom.value(node))
			} else {
				Value::Null
			}
		}
		ControlKind::Select { multiple: true } => Value::Array(dom.selected_values(node).into_iter().map(Value::String).collect()),
		ControlKind::Select { multiple: false } | ControlKind::Text => Value::String(dom.value(node)),
	})
}

/// Pushes `value` into `node`, as a control, a redirected attribute or text content.
pub fn write<D: Dom>(dom: &mut D, config: &Config, node: &D::Node, value: Option<&Value>) {
	match dom.control_kind(node) {
		Some(ControlKind::Checkbox) => {
			let checked = crate::expr::truthy(&value.cloned());
			dom.set_checked(node, checked)
		}
		Some(ControlKind::Radio) => {
			let checked = value.map_or(false, |value| !value.is_null() && value_string(Some(value)) == dom.value(node));
			dom.set_checked(node, checked)
		}
		Some(ControlKind::Select { multiple: true }) => {
			let selected: Vec<String> = match value {
				Some(Value::Array(items)) => items.iter().map(|item| value_string(Some(item))).collect(),
				None | Some(Value::Null) => Vec::new(),
				Some(single) => vec![value_string(Some(single))],
			};
			dom.set_selected_values(node, &selected)
		}
		Some(ControlKind::Select { multiple: false }) | Some(ControlKind::Text) => dom.set_value(node, &value_string(value)),
		None => match dom.attribute(node, &config.attr("bind-attr")) {
			Some(target) => {
				let target = target.trim();
				if let Some(property) = target.strip_prefix("style.") {
					match value {
						None | Some(Value::Null) => dom.set_style(node, property, None),
						Some(value) => dom.set_style(node, property, Some(&value_string(Some(value)))),
					}
				} else {
					match value {
						None | Some(Value::Null) | Some(Value::Bool(false)) => dom.remove_attribute(node, target),
						Some(value) => dom.set_attribute(node, target, &value_string(Some(value))),
					}
				}
			}
			None => dom.set_text(node, &display_text(value)),
		},
	}
}

/// Populates `nodes` from `id`'s state.
///
/// Controls whose path has no value yet seed the state with their current value instead.
pub fn populate<D: Dom>(dom: &mut D, config: &Config, store: &mut StateStore, id: &ComponentId, nodes: &[D::Node]) {
	let span = trace_span!("populate", component = %id, count = nodes.len());
	let _enter = span.enter();

	for node in nodes {
		let (raw, path) = match bound_path(dom, config, node) {
			Some(bound) => bound,
			None => continue,
		};
		match store.get(id, &path) {
			// Only the checked radio of a group speaks for it.
			None if dom.control_kind(node) == Some(ControlKind::Radio) && !dom.checked(node) => trace!("Not seeding {} from an unchecked radio.", raw),
			None if dom.control_kind(node).is_some() => {
				if let Some(seed) = read_control(dom, node) {
					trace!("Seeding {} from control.", raw);
					store.set(id, &path, seed);
				}
			}
			value => write(dom, config, node, value.as_ref()),
		}
	}
}

/// Refreshes `component`'s bound elements whose path is related to `changed`, skipping `origin`.
pub fn refresh<D: Dom>(dom: &mut D, config: &Config, store: &StateStore, id: &ComponentId, component: &D::Node, changed: &Path, origin: Option<&D::Node>) {
	let span = trace_span!("refresh_bindings", component = %id, path = %changed);
	let _enter = span.enter();

	for node in bound_elements(dom, config, component) {
		if origin == Some(&node) {
			continue;
		}
		if let Some((raw, path)) = bound_path(dom, config, &node) {
			if path.is_related(changed) {
				trace!("Refreshing binding {}.", raw);
				let value = store.get(id, &path);
				write(dom, config, &node, value.as_ref())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::MemoryDom;
	use serde_json::json;

	fn fixture(html: &str) -> (MemoryDom, Config, StateStore, ComponentId) {
		let dom = MemoryDom::parse(html);
		let mut store = StateStore::new();
		let id = ComponentId::from("c-1");
		store.insert(id.clone(), json!({}));
		(dom, Config::default(), store, id)
	}

	#[test]
	fn checkbox_radio_and_select_round_trip() {
		let (mut dom, config, mut store, id) = fixture(
			r#"<div data-ui-component="c">
				<input type="checkbox" id="agree" data-ui-model="agree">
				<input type="radio" name="size" value="s" id="s" data-ui-model="size">
				<input type="radio" name="size" value="m" id="m" data-ui-model="size">
				<select multiple id="tags" data-ui-model="tags"><option value="a">A</option><option value="b">B</option></select>
			</div>"#,
		);
		store.set(&id, &Path::parse("agree").unwrap(), json!(true));
		store.set(&id, &Path::parse("size").unwrap(), json!("m"));
		store.set(&id, &Path::parse("tags").unwrap(), json!(["b"]));
		let component = dom.query("data-ui-component", "c")[0];
		let nodes = bound_elements(&dom, &config, &component);
		populate(&mut dom, &config, &mut store, &id, &nodes);

		let agree = dom.element_by_id("agree").unwrap();
		let m = dom.element_by_id("m").unwrap();
		let s = dom.element_by_id("s").unwrap();
		let tags = dom.element_by_id("tags").unwrap();
		assert!(dom.checked(&agree));
		assert!(dom.checked(&m));
		assert!(!dom.checked(&s));
		assert_eq!(dom.selected_values(&tags), vec!["b".to_owned()]);

		assert_eq!(read_control(&dom, &agree), Some(json!(true)));
		assert_eq!(read_control(&dom, &s), Some(Value::Null));
		assert_eq!(read_control(&dom, &m), Some(json!("m")));
		assert_eq!(read_control(&dom, &tags), Some(json!(["b"])));
	}

	#[test]
	fn prefilled_control_seeds_state() {
		let (mut dom, config, mut store, id) = fixture(r#"<div data-ui-component="c"><input id="name" value="Ada" data-ui-model="user.name"></div>"#);
		let component = dom.query("data-ui-component", "c")[0];
		let nodes = bound_elements(&dom, &config, &component);
		populate(&mut dom, &config, &mut store, &id, &nodes);
		assert_eq!(store.get(&id, &Path::parse("user.name").unwrap()), Some(json!("Ada")));
	}

	#[test]
	fn bind_attr_targets_attribute_and_style() {
		let (mut dom, config, mut store, id) = fixture(
			r#"<div data-ui-component="c"><a id="link" data-ui-bind="url" data-ui-bind-attr="href">x</a><div id="bar" data-ui-bind="width" data-ui-bind-attr="style.width"></div></div>"#,
		);
		store.set(&id, &Path::parse("url").unwrap(), json!("/next"));
		store.set(&id, &Path::parse("width").unwrap(), json!("45%"));
		let component = dom.query("data-ui-component", "c")[0];
		let nodes = bound_elements(&dom, &config, &component);
		populate(&mut dom, &config, &mut store, &id, &nodes);

		let link = dom.element_by_id("link").unwrap();
		let bar = dom.element_by_id("bar").unwrap();
		assert_eq!(dom.attribute(&link, "href").as_deref(), Some("/next"));
		assert_eq!(dom.text(&link), "x");
		assert_eq!(dom.style(&bar, "width").as_deref(), Some("45%"));
	}

	#[test]
	fn refresh_skips_origin_and_unrelated_paths() {
		let (mut dom, config, mut store, id) = fixture(
			r#"<div data-ui-component="c"><input id="a" data-ui-model="name"><span id="b" data-ui-bind="name"></span><span id="c" data-ui-bind="other">keep</span></div>"#,
		);
		let component = dom.query("data-ui-component", "c")[0];
		let a = dom.element_by_id("a").unwrap();
		dom.set_value(&a, "typed");
		store.set(&id, &Path::parse("name").unwrap(), json!("from state"));
		refresh(&mut dom, &config, &store, &id, &component, &Path::parse("name").unwrap(), Some(&a));

		assert_eq!(dom.value(&a), "typed");
		assert_eq!(dom.text(&dom.element_by_id("b").unwrap()), "from state");
		assert_eq!(dom.text(&dom.element_by_id("c").unwrap()), "keep");
	}

	#[test]
	fn nested_components_are_out_of_scope() {
		let (dom, config, _, _) = fixture(r#"<div data-ui-component="outer"><span data-ui-bind="a"></span><div data-ui-component="inner"><span data-ui-bind="b"></span></div></div>"#);
		let outer = dom.query("data-ui-component", "outer")[0];
		let nodes = bound_elements(&dom, &config, &outer);
		assert_eq!(nodes.len(), 1);
		assert_eq!(dom.attribute(&nodes[0], "data-ui-bind").as_deref(), Some("a"));
	}
}
