//! The rendering target abstraction.
//!
//! Every engine in this crate talks to the document only through [`Dom`], which keeps binding, conditional and list logic testable without a browser.
//! [`MemoryDom`](`crate::memory::MemoryDom`) is the headless implementation, [`WebDom`](`crate::web::WebDom`) wraps `web_sys` on `wasm32`.

use core::fmt::Debug;

/// Event types that are delegated at the document level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Click,
	Submit,
	Change,
	Input,
}

impl EventKind {
	pub const ALL: [Self; 4] = [Self::Click, Self::Submit, Self::Change, Self::Input];

	/// The DOM event type name, which is also the declarative attribute suffix (`data-ui-click` etc.).
	#[must_use]
	pub fn name(self) -> &'static str {
		match self {
			Self::Click => "click",
			Self::Submit => "submit",
			Self::Change => "change",
			Self::Input => "input",
		}
	}

	#[must_use]
	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|kind| kind.name() == name)
	}

	/// Whether the browser default action is suppressed before dispatch.
	#[must_use]
	pub fn prevents_default(self) -> bool {
		matches!(self, Self::Click | Self::Submit)
	}
}

/// How a form control exposes its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
	Checkbox,
	Radio,
	Select { multiple: bool },
	/// `<input>` of any other type, and `<textarea>`.
	Text,
}

/// A mutable document.
///
/// Only element nodes are exposed; text and comments are reachable through [`text`](`Dom::text`) and [`inner_html`](`Dom::inner_html`).
pub trait Dom {
	/// An element handle. Equality is node identity.
	type Node: Clone + PartialEq + Debug;

	/// The element that scanning starts from.
	fn document_element(&self) -> Self::Node;

	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

	/// Element children, in document order.
	fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

	/// Lower-case tag name.
	fn tag_name(&self, node: &Self::Node) -> String;

	fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
	fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);
	fn remove_attribute(&mut self, node: &Self::Node, name: &str);

	/// Concatenated descendant text.
	fn text(&self, node: &Self::Node) -> String;
	/// Replaces all children with a single text node.
	fn set_text(&mut self, node: &Self::Node, text: &str);

	/// The live value of an `<input>`, `<textarea>` or `<select>`.
	fn value(&self, node: &Self::Node) -> String;
	fn set_value(&mut self, node: &Self::Node, value: &str);

	fn checked(&self, node: &Self::Node) -> bool;
	fn set_checked(&mut self, node: &Self::Node, checked: bool);

	/// Values of the selected `<option>`s of a `<select>`.
	fn selected_values(&self, node: &Self::Node) -> Vec<String>;
	fn set_selected_values(&mut self, node: &Self::Node, values: &[String]);

	fn style(&self, node: &Self::Node, property: &str) -> Option<String>;
	/// [`None`] removes the property.
	fn set_style(&mut self, node: &Self::Node, property: &str, value: Option<&str>);

	fn inner_html(&self, node: &Self::Node) -> String;
	fn set_inner_html(&mut self, node: &Self::Node, html: &str);
	/// Replaces `node` itself with the parsed `html`, returning the new top-level elements.
	fn replace_with_html(&mut self, node: &Self::Node, html: &str) -> Vec<Self::Node>;

	/// Creates a detached element.
	fn create_element(&mut self, tag: &str) -> Self::Node;
	/// Moves `child` below `parent`, before `reference` or at the end. Moving keeps the node's internal state.
	fn insert_before(&mut self, parent: &Self::Node, child: &Self::Node, reference: Option<&Self::Node>);
	/// Detaches `node` from its parent.
	fn remove(&mut self, node: &Self::Node);

	/// Invokes a globally reachable function by name, if one exists.
	///
	/// Returns whether a function was found.
	fn call_global(&mut self, name: &str, element: &Self::Node, event: EventKind) -> bool {
		let _ = (name, element, event);
		false
	}

	fn has_attribute(&self, node: &Self::Node, name: &str) -> bool {
		self.attribute(node, name).is_some()
	}

	fn has_class(&self, node: &Self::Node, class: &str) -> bool {
		self.attribute(node, "class").map_or(false, |classes| classes.split_whitespace().any(|c| c == class))
	}

	fn add_class(&mut self, node: &Self::Node, class: &str) {
		if self.has_class(node, class) {
			return;
		}
		let classes = match self.attribute(node, "class") {
			Some(classes) if !classes.trim().is_empty() => format!("{} {}", classes.trim(), class),
			_ => class.to_owned(),
		};
		self.set_attribute(node, "class", &classes)
	}

	fn remove_class(&mut self, node: &Self::Node, class: &str) {
		if let Some(classes) = self.attribute(node, "class") {
			let remaining: Vec<&str> = classes.split_whitespace().filter(|c| *c != class).collect();
			if remaining.is_empty() {
				self.remove_attribute(node, "class")
			} else {
				self.set_attribute(node, "class", &remaining.join(" "))
			}
		}
	}

	/// Classifies form controls by tag, `type` and `multiple`.
	fn control_kind(&self, node: &Self::Node) -> Option<ControlKind> {
		match self.tag_name(node).as_str() {
			"input" => Some(match self.attribute(node, "type").map(|t| t.to_ascii_lowercase()).as_deref() {
				Some("checkbox") => ControlKind::Checkbox,
				Some("radio") => ControlKind::Radio,
				_ => ControlKind::Text,
			}),
			"textarea" => Some(ControlKind::Text),
			"select" => Some(ControlKind::Select {
				multiple: self.has_attribute(node, "multiple"),
			}),
			_ => None,
		}
	}

	/// Elements at or below `root` that carry `attribute`, in document order.
	fn query_attribute(&self, root: &Self::Node, attribute: &str) -> Vec<Self::Node> {
		let mut found = Vec::new();
		let mut stack = vec![root.clone()];
		while let Some(node) = stack.pop() {
			if self.has_attribute(&node, attribute) {
				found.push(node.clone());
			}
			stack.extend(self.children(&node).into_iter().rev());
		}
		found
	}

	/// The first attached element (in document order) whose `id` attribute is `id`.
	fn element_by_id(&self, id: &str) -> Option<Self::Node> {
		self.query_attribute(&self.document_element(), "id")
			.into_iter()
			.find(|node| self.attribute(node, "id").as_deref() == Some(id))
	}

	/// The closest inclusive ancestor of `node` carrying `attribute`.
	fn closest_attribute(&self, node: &Self::Node, attribute: &str) -> Option<Self::Node> {
		let mut current = Some(node.clone());
		while let Some(node) = current {
			if self.has_attribute(&node, attribute) {
				return Some(node);
			}
			current = self.parent(&node);
		}
		None
	}

	/// The closest inclusive ancestor of `node` with tag name `tag`.
	fn closest_tag(&self, node: &Self::Node, tag: &str) -> Option<Self::Node> {
		let mut current = Some(node.clone());
		while let Some(node) = current {
			if self.tag_name(&node) == tag {
				return Some(node);
			}
			current = self.parent(&node);
		}
		None
	}

	/// Whether `node` is `ancestor` or one of its descendants.
	fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool {
		let mut current = Some(node.clone());
		while let Some(node) = current {
			if &node == ancestor {
				return true;
			}
			current = self.parent(&node);
		}
		false
	}

	/// Whether `node` is still attached below the [document element](`Dom::document_element`).
	fn is_connected(&self, node: &Self::Node) -> bool {
		self.contains(&self.document_element(), node)
	}
}
