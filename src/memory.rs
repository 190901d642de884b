//! A headless, arena-backed [`Dom`].
//!
//! HTML fragments are parsed with [`scraper`] (html5ever, `<body>` context) and imported into the arena.
//! Detached nodes stay allocated, so [`NodeId`]s are never reused and node identity comparisons stay meaningful across re-renders.

use crate::dom::{Dom, EventKind};
use core::fmt;
use hashbrown::HashMap;
use scraper::{ElementRef, Html};
use tracing::{trace, warn};

/// A node handle into a [`MemoryDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
	Element(ElementData),
	Text(String),
	Comment(String),
}

#[derive(Debug, Clone, Default)]
struct ElementData {
	tag: String,
	attributes: Vec<(String, String)>,
	/// Live form state, shadowing the `value`/`checked`/`selected` attributes once set.
	value: Option<String>,
	checked: Option<bool>,
	selected: Option<bool>,
}

#[derive(Debug, Clone)]
struct NodeData {
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	kind: NodeKind,
}

type GlobalFunction = Box<dyn FnMut(NodeId, EventKind)>;

/// In-memory document.
pub struct MemoryDom {
	nodes: Vec<NodeData>,
	root: NodeId,
	globals: HashMap<String, GlobalFunction>,
}

impl fmt::Debug for MemoryDom {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryDom")
			.field("nodes", &self.nodes.len())
			.field("root", &self.root)
			.field("globals", &self.globals.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl Default for MemoryDom {
	fn default() -> Self {
		Self::new()
	}
}

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr"];

impl MemoryDom {
	/// An empty document with a `<body>` root.
	#[must_use]
	pub fn new() -> Self {
		let mut dom = Self {
			nodes: Vec::new(),
			root: NodeId(0),
			globals: HashMap::new(),
		};
		dom.root = dom.alloc(NodeKind::Element(ElementData {
			tag: "body".to_owned(),
			..ElementData::default()
		}));
		dom
	}

	/// A document whose `<body>` contains `html`.
	#[must_use]
	pub fn parse(html: &str) -> Self {
		let mut dom = Self::new();
		let root = dom.root;
		dom.set_inner_html(&root, html);
		dom
	}

	/// Makes `name` resolvable as a global function for `data-ui-*` event attributes.
	pub fn define_global(&mut self, name: &str, function: impl FnMut(NodeId, EventKind) + 'static) {
		self.globals.insert(name.to_owned(), Box::new(function));
	}

	/// All attached elements carrying `attribute` with exactly `value`.
	#[must_use]
	pub fn query(&self, attribute: &str, value: &str) -> Vec<NodeId> {
		self.query_attribute(&self.root, attribute)
			.into_iter()
			.filter(|node| self.attribute(node, attribute).as_deref() == Some(value))
			.collect()
	}

	/// Whether `node` and all its ancestors are displayed, judging by inline `display` styles only.
	#[must_use]
	pub fn is_displayed(&self, node: NodeId) -> bool {
		let mut current = Some(node);
		while let Some(node) = current {
			if self.style(&node, "display").as_deref() == Some("none") {
				return false;
			}
			current = self.data(node).parent;
		}
		true
	}

	fn alloc(&mut self, kind: NodeKind) -> NodeId {
		self.nodes.push(NodeData {
			parent: None,
			children: Vec::new(),
			kind,
		});
		NodeId(self.nodes.len() - 1)
	}

	fn data(&self, node: NodeId) -> &NodeData {
		&self.nodes[node.0]
	}

	fn element(&self, node: NodeId) -> Option<&ElementData> {
		match &self.nodes[node.0].kind {
			NodeKind::Element(element) => Some(element),
			_ => None,
		}
	}

	fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
		match &mut self.nodes[node.0].kind {
			NodeKind::Element(element) => Some(element),
			_ => None,
		}
	}

	fn detach(&mut self, node: NodeId) {
		if let Some(parent) = self.nodes[node.0].parent.take() {
			self.nodes[parent.0].children.retain(|child| *child != node);
		}
	}

	fn append(&mut self, parent: NodeId, child: NodeId) {
		self.detach(child);
		self.nodes[child.0].parent = Some(parent);
		self.nodes[parent.0].children.push(child);
	}

	/// Parses `html` into detached top-level nodes.
	fn parse_fragment(&mut self, html: &str) -> Vec<NodeId> {
		let fragment = Html::parse_fragment(html);
		for error in &fragment.errors {
			trace!("HTML parse error (recovered): {}", error);
		}
		// The fragment's root element is a synthetic `<html>` holding the parsed nodes.
		self.import_children(fragment.root_element())
	}

	fn import_children(&mut self, element: ElementRef<'_>) -> Vec<NodeId> {
		let mut imported = Vec::new();
		for child in element.children() {
			if let Some(child_element) = ElementRef::wrap(child) {
				imported.push(self.import_element(child_element));
				continue;
			}
			match child.value() {
				scraper::Node::Text(text) => imported.push(self.alloc(NodeKind::Text(text.text.to_string()))),
				scraper::Node::Comment(comment) => imported.push(self.alloc(NodeKind::Comment(comment.comment.to_string()))),
				_ => (),
			}
		}
		imported
	}

	fn import_element(&mut self, element: ElementRef<'_>) -> NodeId {
		let value = element.value();
		let id = self.alloc(NodeKind::Element(ElementData {
			tag: value.name().to_ascii_lowercase(),
			attributes: value.attrs().map(|(name, value)| (name.to_owned(), value.to_owned())).collect(),
			..ElementData::default()
		}));
		for child in self.import_children(element) {
			self.append(id, child);
		}
		id
	}

	fn collect_text(&self, node: NodeId, into: &mut String) {
		match &self.data(node).kind {
			NodeKind::Text(text) => into.push_str(text),
			NodeKind::Comment(_) => (),
			NodeKind::Element(_) => {
				for child in &self.data(node).children {
					self.collect_text(*child, into)
				}
			}
		}
	}

	fn serialize(&self, node: NodeId, into: &mut String) {
		match &self.data(node).kind {
			NodeKind::Text(text) => escape_into(text, false, into),
			NodeKind::Comment(comment) => {
				into.push_str("<!--");
				into.push_str(comment);
				into.push_str("-->");
			}
			NodeKind::Element(element) => {
				into.push('<');
				into.push_str(&element.tag);
				for (name, value) in &element.attributes {
					into.push(' ');
					into.push_str(name);
					into.push_str("=\"");
					escape_into(value, true, into);
					into.push('"');
				}
				into.push('>');
				if VOID_ELEMENTS.contains(&element.tag.as_str()) {
					return;
				}
				for child in &self.data(node).children {
					self.serialize(*child, into)
				}
				into.push_str("</");
				into.push_str(&element.tag);
				into.push('>');
			}
		}
	}

	/// `<option>` descendants of a `<select>`, looking through `<optgroup>`s.
	fn options(&self, select: NodeId) -> Vec<NodeId> {
		let mut options = Vec::new();
		let mut stack: Vec<NodeId> = self.data(select).children.iter().rev().copied().collect();
		while let Some(node) = stack.pop() {
			match self.element(node).map(|e| e.tag.as_str()) {
				Some("option") => options.push(node),
				Some("optgroup") => stack.extend(self.data(node).children.iter().rev().copied()),
				_ => (),
			}
		}
		options
	}

	fn option_value(&self, option: NodeId) -> String {
		self.attribute(&option, "value").unwrap_or_else(|| self.text(&option).trim().to_owned())
	}

	fn option_selected(&self, option: NodeId) -> bool {
		self.element(option).map_or(false, |e| e.selected.unwrap_or_else(|| e.attributes.iter().any(|(name, _)| name == "selected")))
	}

	fn attribute_mut(&mut self, node: NodeId) -> Option<&mut Vec<(String, String)>> {
		self.element_mut(node).map(|e| &mut e.attributes)
	}
}

fn escape_into(text: &str, attribute: bool, into: &mut String) {
	for c in text.chars() {
		match c {
			'&' => into.push_str("&amp;"),
			'<' if !attribute => into.push_str("&lt;"),
			'>' if !attribute => into.push_str("&gt;"),
			'"' if attribute => into.push_str("&quot;"),
			'\u{a0}' => into.push_str("&nbsp;"),
			c => into.push(c),
		}
	}
}

fn parse_style(style: &str) -> Vec<(String, String)> {
	style
		.split(';')
		.filter_map(|declaration| {
			let (property, value) = declaration.split_once(':')?;
			let property = property.trim();
			if property.is_empty() {
				None
			} else {
				Some((property.to_ascii_lowercase(), value.trim().to_owned()))
			}
		})
		.collect()
}

impl Dom for MemoryDom {
	type Node = NodeId;

	fn document_element(&self) -> NodeId {
		self.root
	}

	fn parent(&self, node: &NodeId) -> Option<NodeId> {
		self.data(*node).parent
	}

	fn children(&self, node: &NodeId) -> Vec<NodeId> {
		self.data(*node).children.iter().copied().filter(|child| self.element(*child).is_some()).collect()
	}

	fn tag_name(&self, node: &NodeId) -> String {
		self.element(*node).map(|e| e.tag.clone()).unwrap_or_default()
	}

	fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
		self.element(*node)?.attributes.iter().find(|(n, _)| n == name).map(|(_, value)| value.clone())
	}

	fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) {
		let attributes = match self.attribute_mut(*node) {
			Some(attributes) => attributes,
			None => return warn!("Tried to set attribute {:?} on a non-element node.", name),
		};
		match attributes.iter_mut().find(|(n, _)| n == name) {
			Some((_, existing)) => value.clone_into(existing),
			None => attributes.push((name.to_owned(), value.to_owned())),
		}
	}

	fn remove_attribute(&mut self, node: &NodeId, name: &str) {
		if let Some(attributes) = self.attribute_mut(*node) {
			attributes.retain(|(n, _)| n != name)
		}
	}

	fn text(&self, node: &NodeId) -> String {
		let mut text = String::new();
		self.collect_text(*node, &mut text);
		text
	}

	fn set_text(&mut self, node: &NodeId, text: &str) {
		for child in self.data(*node).children.clone() {
			self.detach(child)
		}
		if !text.is_empty() {
			let text = self.alloc(NodeKind::Text(text.to_owned()));
			self.append(*node, text);
		}
	}

	fn value(&self, node: &NodeId) -> String {
		let element = match self.element(*node) {
			Some(element) => element,
			None => return String::new(),
		};
		if let Some(value) = &element.value {
			return value.clone();
		}
		match element.tag.as_str() {
			"textarea" => self.text(node),
			"select" => self.selected_values(node).into_iter().next().unwrap_or_default(),
			"input" => match self.attribute(node, "value") {
				Some(value) => value,
				// Browsers report "on" for value-less checkboxes and radios.
				None if matches!(self.attribute(node, "type").as_deref(), Some("checkbox") | Some("radio")) => "on".to_owned(),
				None => String::new(),
			},
			_ => self.attribute(node, "value").unwrap_or_default(),
		}
	}

	fn set_value(&mut self, node: &NodeId, value: &str) {
		if self.tag_name(node) == "select" {
			return self.set_selected_values(node, &[value.to_owned()]);
		}
		if let Some(element) = self.element_mut(*node) {
			element.value = Some(value.to_owned())
		}
	}

	fn checked(&self, node: &NodeId) -> bool {
		self.element(*node).map_or(false, |e| e.checked.unwrap_or_else(|| e.attributes.iter().any(|(name, _)| name == "checked")))
	}

	fn set_checked(&mut self, node: &NodeId, checked: bool) {
		if let Some(element) = self.element_mut(*node) {
			element.checked = Some(checked)
		}
		// Radios in the same group (by `name`, below the same form or the document) are mutually exclusive.
		if checked && self.attribute(node, "type").as_deref() == Some("radio") {
			if let Some(name) = self.attribute(node, "name") {
				let scope = self.closest_tag(node, "form").unwrap_or(self.root);
				for other in self.query_attribute(&scope, "name") {
					if other != *node && self.attribute(&other, "type").as_deref() == Some("radio") && self.attribute(&other, "name").as_deref() == Some(name.as_str()) {
						if let Some(element) = self.element_mut(other) {
							element.checked = Some(false)
						}
					}
				}
			}
		}
	}

	fn selected_values(&self, node: &NodeId) -> Vec<String> {
		let options = self.options(*node);
		let selected: Vec<String> = options.iter().filter(|option| self.option_selected(**option)).map(|option| self.option_value(*option)).collect();
		if selected.is_empty() && !self.has_attribute(node, "multiple") {
			// A single-select always has a selection if it has options.
			return options.first().map(|option| self.option_value(*option)).into_iter().collect();
		}
		selected
	}

	fn set_selected_values(&mut self, node: &NodeId, values: &[String]) {
		let multiple = self.has_attribute(node, "multiple");
		let mut matched = false;
		for option in self.options(*node) {
			let selected = values.contains(&self.option_value(option)) && (multiple || !matched);
			matched |= selected;
			if let Some(element) = self.element_mut(option) {
				element.selected = Some(selected)
			}
		}
	}

	fn style(&self, node: &NodeId, property: &str) -> Option<String> {
		let style = self.attribute(node, "style")?;
		parse_style(&style).into_iter().find(|(p, _)| p == property).map(|(_, value)| value)
	}

	fn set_style(&mut self, node: &NodeId, property: &str, value: Option<&str>) {
		let mut declarations = self.attribute(node, "style").map(|style| parse_style(&style)).unwrap_or_default();
		declarations.retain(|(p, _)| p != property);
		if let Some(value) = value {
			declarations.push((property.to_owned(), value.to_owned()));
		}
		if declarations.is_empty() {
			self.remove_attribute(node, "style")
		} else {
			let style = declarations.iter().map(|(p, v)| format!("{}: {};", p, v)).collect::<Vec<_>>().join(" ");
			self.set_attribute(node, "style", &style)
		}
	}

	fn inner_html(&self, node: &NodeId) -> String {
		let mut html = String::new();
		for child in &self.data(*node).children {
			self.serialize(*child, &mut html)
		}
		html
	}

	fn set_inner_html(&mut self, node: &NodeId, html: &str) {
		for child in self.data(*node).children.clone() {
			self.detach(child)
		}
		for child in self.parse_fragment(html) {
			self.append(*node, child)
		}
	}

	fn replace_with_html(&mut self, node: &NodeId, html: &str) -> Vec<NodeId> {
		let parent = match self.data(*node).parent {
			Some(parent) => parent,
			None => {
				warn!("Tried to replace a detached node.");
				return Vec::new();
			}
		};
		let fragment = self.parse_fragment(html);
		for new_node in &fragment {
			self.insert_before(&parent, new_node, Some(node));
		}
		self.detach(*node);
		fragment.into_iter().filter(|node| self.element(*node).is_some()).collect()
	}

	fn create_element(&mut self, tag: &str) -> NodeId {
		self.alloc(NodeKind::Element(ElementData {
			tag: tag.to_ascii_lowercase(),
			..ElementData::default()
		}))
	}

	fn insert_before(&mut self, parent: &NodeId, child: &NodeId, reference: Option<&NodeId>) {
		self.detach(*child);
		let siblings = &mut self.nodes[parent.0].children;
		let index = reference.and_then(|reference| siblings.iter().position(|sibling| sibling == reference)).unwrap_or_else(|| siblings.len());
		siblings.insert(index, *child);
		self.nodes[child.0].parent = Some(*parent);
	}

	fn remove(&mut self, node: &NodeId) {
		self.detach(*node)
	}

	fn call_global(&mut self, name: &str, element: &NodeId, event: EventKind) -> bool {
		match self.globals.get_mut(name) {
			Some(function) => {
				function(*element, event);
				true
			}
			None => false,
		}
	}
}
