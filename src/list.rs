//! Keyed list rendering.
//!
//! Items are reconciled by key: nodes whose key survives a render are moved into place rather than recreated, which keeps
//! focus, typed input and other element state intact. This is the same idea as keyed child reconciliation in a virtual
//! DOM differ, applied directly to the live document.

use crate::{
	component,
	config::Config,
	dom::Dom,
	state::Path,
	template::{escape_html, substitute, ItemScope},
};
use hashbrown::HashMap;
use serde_json::Value;
use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher},
};
use tracing::{error, instrument, trace, warn};

pub const ITEM_CLASS: &str = "ui-list-item";
pub const EMPTY_CLASS: &str = "ui-list-empty";

/// A list container's declarative attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ListSpec {
	pub path: Path,
	pub template: String,
	/// Item property used as key. Items are keyed by position without one.
	pub key: Option<String>,
	pub item_var: String,
	pub index_var: String,
	pub empty_message: String,
}

impl ListSpec {
	/// Reads the list attributes of `container`.
	pub fn read<D: Dom>(dom: &D, config: &Config, container: &D::Node) -> Option<Self> {
		let raw = dom.attribute(container, &config.attr("list"))?;
		let path = match Path::parse(&raw) {
			Ok(path) => path,
			Err(path_error) => {
				error!("Ignoring list with malformed path: {}", path_error);
				return None;
			}
		};
		let non_empty = |name: &str| dom.attribute(container, &config.attr(name)).filter(|value| !value.trim().is_empty());
		Some(Self {
			path,
			template: dom.attribute(container, &config.attr("template")).unwrap_or_default(),
			key: non_empty("key").map(|key| key.trim().to_owned()),
			item_var: non_empty("item-var").map_or_else(|| "item".to_owned(), |var| var.trim().to_owned()),
			index_var: non_empty("index-var").map_or_else(|| "index".to_owned(), |var| var.trim().to_owned()),
			empty_message: dom.attribute(container, &config.attr("empty")).unwrap_or_else(|| config.empty_message.clone()),
		})
	}
}

/// What a render did.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport<N> {
	/// Freshly created item nodes, whose bindings still need to be populated.
	pub created: Vec<N>,
	/// Reused item nodes whose template output changed. Their content was replaced in place.
	pub rerendered: Vec<N>,
	/// Reused item nodes that moved to another index, whose bindings now point elsewhere.
	pub reindexed: Vec<N>,
	pub reused: usize,
	pub removed: usize,
}

impl<N> Default for RenderReport<N> {
	fn default() -> Self {
		Self {
			created: Vec::new(),
			rerendered: Vec::new(),
			reindexed: Vec::new(),
			reused: 0,
			removed: 0,
		}
	}
}

/// List containers belonging to `component`.
pub fn containers<D: Dom>(dom: &D, config: &Config, component: &D::Node) -> Vec<D::Node> {
	component::scoped(dom, config, component, &config.attr("list"))
}

/// Reconciles `container`'s children with the array at `spec.path` in `state`.
#[instrument(skip(dom, config, spec, state), fields(path = %spec.path))]
pub fn render<D: Dom>(dom: &mut D, config: &Config, spec: &ListSpec, container: &D::Node, state: &Value) -> RenderReport<D::Node> {
	let key_attribute = config.attr("key");
	let rendered_attribute = config.attr("rendered");
	let items = match spec.path.resolve(state).map(crate::state::Resolved::into_owned) {
		Some(Value::Array(items)) if !items.is_empty() => items,
		_ => return render_empty(dom, spec, container, &key_attribute),
	};

	let mut report = RenderReport::default();
	let existing: Vec<(String, D::Node)> = dom
		.children(container)
		.into_iter()
		.filter_map(|child| {
			if dom.has_class(&child, ITEM_CLASS) {
				dom.attribute(&child, &key_attribute).map(|key| (key, child))
			} else {
				None
			}
		})
		.collect();
	let mut unclaimed: HashMap<String, usize> = existing.iter().enumerate().map(|(i, (key, _))| (key.clone(), i)).collect();

	let mut desired = Vec::with_capacity(items.len());
	for (index, item) in items.iter().enumerate() {
		let key = item_key(spec, item, index);
		let scope = ItemScope {
			item,
			index,
			item_var: &spec.item_var,
			index_var: &spec.index_var,
			state,
		};
		let html = substitute(&spec.template, &scope);
		let rendered = fingerprint(&html);
		let reused = unclaimed.remove(&key).map(|i| existing[i].1.clone());
		let node = match reused {
			Some(node) => {
				report.reused += 1;
				if dom.attribute(&node, &rendered_attribute).as_deref() != Some(rendered.as_str()) {
					trace!("Re-rendering item {:?} in place.", key);
					dom.set_inner_html(&node, &html);
					dom.set_attribute(&node, &rendered_attribute, &rendered);
					rewrite_bindings(dom, config, spec, &node, index);
					report.rerendered.push(node.clone());
				} else if dom.attribute(&node, &config.attr("index")).as_deref() != Some(index.to_string().as_str()) {
					reindex(dom, config, spec, &node, index);
					report.reindexed.push(node.clone());
				} else {
					trace!("Reusing item {:?}.", key);
				}
				node
			}
			None => {
				if desired.iter().any(|(existing_key, _): &(String, D::Node)| existing_key == &key) {
					warn!("Duplicate list key {:?}, rendering a separate node.", key);
				}
				trace!("Creating item {:?}.", key);
				let node = dom.create_element("div");
				dom.set_attribute(&node, "class", ITEM_CLASS);
				dom.set_attribute(&node, &key_attribute, &key);
				dom.set_attribute(&node, &rendered_attribute, &rendered);
				dom.set_inner_html(&node, &html);
				rewrite_bindings(dom, config, spec, &node, index);
				report.created.push(node.clone());
				node
			}
		};
		desired.push((key, node));
	}

	// Everything that isn't a wanted item goes, including a previous empty-state node.
	for child in dom.children(container) {
		if !desired.iter().any(|(_, node)| node == &child) {
			if dom.has_class(&child, ITEM_CLASS) {
				report.removed += 1;
			}
			dom.remove(&child);
		}
	}

	for (position, (_, node)) in desired.iter().enumerate() {
		let current = dom.children(container);
		if current.get(position) != Some(node) {
			dom.insert_before(container, node, current.get(position));
		}
	}

	report
}

fn render_empty<D: Dom>(dom: &mut D, spec: &ListSpec, container: &D::Node, key_attribute: &str) -> RenderReport<D::Node> {
	let removed = dom
		.children(container)
		.iter()
		.filter(|child| dom.has_class(child, ITEM_CLASS) && dom.has_attribute(child, key_attribute))
		.count();
	trace!("Rendering empty state.");
	dom.set_inner_html(
		container,
		&format!(r#"<div class="{}">{}</div>"#, EMPTY_CLASS, escape_html(&spec.empty_message)),
	);
	RenderReport {
		removed,
		..RenderReport::default()
	}
}

/// Identifies an item's template output, so that unchanged items keep their content (and typed input) across renders.
fn fingerprint(html: &str) -> String {
	let mut hasher = DefaultHasher::new();
	html.hash(&mut hasher);
	format!("{:016x}", hasher.finish())
}

fn item_key(spec: &ListSpec, item: &Value, index: usize) -> String {
	spec.key
		.as_deref()
		.and_then(|key| match item.get(key) {
			None | Some(Value::Null) => None,
			Some(value) => Some(crate::binding::value_string(Some(value))),
		})
		.unwrap_or_else(|| index.to_string())
}

/// Makes relative bindings inside a new item absolute.
///
/// `done` and `item.done` become `items[3].done`, paths that already start at the list path are kept, and `$path` escapes
/// to the component root. The relative path is remembered so that a later move can re-index the binding.
fn rewrite_bindings<D: Dom>(dom: &mut D, config: &Config, spec: &ListSpec, item_node: &D::Node, index: usize) {
	let list_path = spec.path.to_string();
	let relative_attribute = config.attr("item-bind");
	for attribute in [config.attr("bind"), config.attr("model")].iter() {
		for node in dom.query_attribute(item_node, attribute) {
			let raw = match dom.attribute(&node, attribute) {
				Some(raw) => raw.trim().to_owned(),
				None => continue,
			};
			if let Some(absolute) = raw.strip_prefix('$') {
				dom.set_attribute(&node, attribute, absolute);
				continue;
			}
			if raw == list_path || raw.starts_with(&format!("{}[", list_path)) || raw.starts_with(&format!("{}.", list_path)) {
				continue;
			}
			let relative = raw
				.strip_prefix(spec.item_var.as_str())
				.and_then(|rest| rest.strip_prefix('.'))
				.unwrap_or(&raw)
				.to_owned();
			dom.set_attribute(&node, &relative_attribute, &relative);
			dom.set_attribute(&node, attribute, &format!("{}[{}].{}", list_path, index, relative));
		}
	}
	dom.set_attribute(item_node, &config.attr("index"), &index.to_string());
}

/// Points a moved item's rewritten bindings at its new position.
fn reindex<D: Dom>(dom: &mut D, config: &Config, spec: &ListSpec, item_node: &D::Node, index: usize) {
	trace!("Re-indexing item to {}.", index);
	let list_path = spec.path.to_string();
	let relative_attribute = config.attr("item-bind");
	for node in dom.query_attribute(item_node, &relative_attribute) {
		if let Some(relative) = dom.attribute(&node, &relative_attribute) {
			let attribute = if dom.has_attribute(&node, &config.attr("model")) {
				config.attr("model")
			} else {
				config.attr("bind")
			};
			dom.set_attribute(&node, &attribute, &format!("{}[{}].{}", list_path, index, relative));
		}
	}
	dom.set_attribute(item_node, &config.attr("index"), &index.to_string());
}

/// The key and index of the list item containing `node`, for handlers inside list templates.
pub fn item_of<D: Dom>(dom: &D, config: &Config, node: &D::Node) -> Option<(String, Option<usize>)> {
	let mut current = Some(node.clone());
	while let Some(candidate) = current {
		if dom.has_class(&candidate, ITEM_CLASS) {
			if let Some(key) = dom.attribute(&candidate, &config.attr("key")) {
				let index = dom.attribute(&candidate, &config.attr("index")).and_then(|index| index.parse().ok());
				return Some((key, index));
			}
		}
		current = dom.parent(&candidate);
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::{MemoryDom, NodeId};
	use serde_json::json;

	fn setup(attributes: &str) -> (MemoryDom, Config, NodeId, ListSpec) {
		let dom = MemoryDom::parse(&format!(r#"<ul id="list" {}></ul>"#, attributes));
		let config = Config::default();
		let container = dom.element_by_id("list").unwrap();
		let spec = ListSpec::read(&dom, &config, &container).unwrap();
		(dom, config, container, spec)
	}

	#[test]
	fn reads_defaults() {
		let (_, _, _, spec) = setup(r#"data-ui-list="todos" data-ui-template="{item.text}""#);
		assert_eq!(spec.item_var, "item");
		assert_eq!(spec.index_var, "index");
		assert_eq!(spec.key, None);
		assert_eq!(spec.empty_message, "No items to display");
	}

	#[test]
	fn keyed_insert_creates_one_node_and_keeps_others() {
		let (mut dom, config, list, spec) = setup(r#"data-ui-list="todos" data-ui-key="id" data-ui-template="<span>{item.text}</span>""#);
		let first = render(&mut dom, &config, &spec, &list, &json!({ "todos": [{ "id": 1, "text": "a" }, { "id": 2, "text": "b" }] }));
		assert_eq!(first.created.len(), 2);
		let before = dom.children(&list);

		let second = render(
			&mut dom,
			&config,
			&spec,
			&list,
			&json!({ "todos": [{ "id": 3, "text": "c" }, { "id": 1, "text": "a" }, { "id": 2, "text": "b" }] }),
		);
		assert_eq!(second.created.len(), 1);
		assert_eq!(second.reused, 2);
		assert_eq!(second.removed, 0);
		let after = dom.children(&list);
		assert_eq!(after.len(), 3);
		assert_eq!(&after[1..], &before[..]);
		assert_eq!(dom.text(&after[0]), "c");
	}

	#[test]
	fn keyed_removal_removes_exactly_one() {
		let (mut dom, config, list, spec) = setup(r#"data-ui-list="todos" data-ui-key="id" data-ui-template="{item.text}""#);
		render(&mut dom, &config, &spec, &list, &json!({ "todos": [{ "id": 1, "text": "a" }, { "id": 2, "text": "b" }] }));
		let kept = dom.children(&list)[1];

		let report = render(&mut dom, &config, &spec, &list, &json!({ "todos": [{ "id": 2, "text": "b" }] }));
		assert_eq!(report.removed, 1);
		assert!(report.created.is_empty());
		let children = dom.children(&list);
		assert_eq!(children, vec![kept]);
		assert_eq!(dom.attribute(&kept, "data-ui-key").as_deref(), Some("2"));
		assert_eq!(dom.text(&kept), "b");
	}

	#[test]
	fn empty_state_replaces_items_and_is_replaced_again() {
		let (mut dom, config, list, spec) = setup(r#"data-ui-list="todos" data-ui-template="{item}" data-ui-empty="Nothing & more""#);
		render(&mut dom, &config, &spec, &list, &json!({ "todos": ["x"] }));
		let report = render(&mut dom, &config, &spec, &list, &json!({ "todos": [] }));
		assert_eq!(report.removed, 1);
		assert_eq!(dom.inner_html(&list), r#"<div class="ui-list-empty">Nothing &amp; more</div>"#);

		render(&mut dom, &config, &spec, &list, &json!({ "todos": "not a list" }));
		assert_eq!(dom.children(&list).len(), 1);

		render(&mut dom, &config, &spec, &list, &json!({ "todos": ["y"] }));
		let children = dom.children(&list);
		assert_eq!(children.len(), 1);
		assert!(dom.has_class(&children[0], ITEM_CLASS));
	}

	#[test]
	fn bindings_inside_items_are_rewritten_and_reindexed() {
		let (mut dom, config, list, spec) = setup(
			r#"data-ui-list="todos" data-ui-key="id" data-ui-template="<input type='checkbox' data-ui-model='done'><b data-ui-bind='$title'></b><i data-ui-bind='todos[0].id'></i>""#,
		);
		render(&mut dom, &config, &spec, &list, &json!({ "todos": [{ "id": 1 }, { "id": 2 }] }));
		let second = dom.children(&list)[1];
		assert_eq!(dom.query("data-ui-model", "todos[1].done").len(), 1);
		assert_eq!(dom.query("data-ui-bind", "title").len(), 2);
		assert_eq!(dom.query("data-ui-bind", "todos[0].id").len(), 2);

		let report = render(&mut dom, &config, &spec, &list, &json!({ "todos": [{ "id": 2 }] }));
		assert_eq!(dom.children(&list), vec![second]);
		assert_eq!(report.reindexed, vec![second]);
		assert_eq!(dom.query("data-ui-model", "todos[0].done").len(), 1);
		assert_eq!(item_of(&dom, &config, &dom.query("data-ui-model", "todos[0].done")[0]), Some(("2".to_owned(), Some(0))));
	}

	#[test]
	fn reused_items_follow_their_template_output() {
		let (mut dom, config, list, spec) = setup(r#"data-ui-list="todos" data-ui-key="id" data-ui-template="<em>{item.done ? 'done' : 'open'}</em><input>""#);
		render(&mut dom, &config, &spec, &list, &json!({ "todos": [{ "id": 1, "done": false }, { "id": 2, "done": false }] }));
		let children = dom.children(&list);
		let untouched_input = dom.children(&children[1])[1];

		let report = render(&mut dom, &config, &spec, &list, &json!({ "todos": [{ "id": 1, "done": true }, { "id": 2, "done": false }] }));
		assert_eq!(report.rerendered, vec![children[0]]);
		assert!(report.created.is_empty());
		assert_eq!(dom.children(&list), children);
		assert_eq!(dom.inner_html(&children[0]), "<em>done</em><input>");
		assert_eq!(dom.children(&children[1])[1], untouched_input);
	}

	#[test]
	fn unkeyed_positions_take_new_values() {
		let (mut dom, config, list, spec) = setup(r#"data-ui-list="tags" data-ui-template="<em>{item}</em>""#);
		render(&mut dom, &config, &spec, &list, &json!({ "tags": ["a"] }));
		let node = dom.children(&list)[0];

		render(&mut dom, &config, &spec, &list, &json!({ "tags": ["b"] }));
		assert_eq!(dom.children(&list), vec![node]);
		assert_eq!(dom.inner_html(&node), "<em>b</em>");
	}
}
