//! Declarative event actions.

use crate::{dom::EventKind, runtime::Runtime, state::ComponentId};
use hashbrown::HashMap;
use std::rc::Rc;

/// What a `data-ui-<event>` attribute asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	/// A registered handler, falling back to a global function of the same name.
	Named(String),
	/// `ajax:/endpoint`
	Ajax(String),
	/// `window.name`, which skips the handler registry.
	Global(String),
}

impl Action {
	/// Parses attribute text.
	///
	/// ```
	/// use declarative_dom::event::Action;
	///
	/// assert_eq!(Action::parse(" increment "), Some(Action::Named("increment".to_owned())));
	/// assert_eq!(Action::parse("ajax:/api/save"), Some(Action::Ajax("/api/save".to_owned())));
	/// assert_eq!(Action::parse("window.track"), Some(Action::Global("track".to_owned())));
	/// assert_eq!(Action::parse("  "), None);
	/// ```
	#[must_use]
	pub fn parse(text: &str) -> Option<Self> {
		let text = text.trim();
		if text.is_empty() {
			return None;
		}
		Some(if let Some(endpoint) = text.strip_prefix("ajax:") {
			Self::Ajax(endpoint.trim().to_owned())
		} else if let Some(name) = text.strip_prefix("window.") {
			Self::Global(name.trim().to_owned())
		} else {
			Self::Named(text.to_owned())
		})
	}
}

/// Passed to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerEvent<N> {
	pub kind: EventKind,
	/// The element carrying the event attribute.
	pub element: N,
	/// The element the event was dispatched on.
	pub target: N,
	/// The component owning [`element`](`HandlerEvent::element`), if any.
	pub component: Option<ComponentId>,
}

pub type Handler<D> = Rc<dyn Fn(&mut Runtime<D>, &HandlerEvent<<D as crate::dom::Dom>::Node>)>;

/// The outcome of [`Runtime::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dispatched {
	/// The host should call `preventDefault()`.
	pub prevent_default: bool,
	/// An action attribute was found and resolved.
	pub handled: bool,
}

/// Parsed actions, cached by attribute text.
#[derive(Debug, Default)]
pub struct ActionCache {
	actions: HashMap<String, Option<Action>>,
}

impl ActionCache {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&mut self, text: &str) -> Option<Action> {
		self.actions.entry_ref(text).or_insert_with(|| Action::parse(text)).clone()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.actions.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.actions.is_empty()
	}

	pub fn clear(&mut self) {
		self.actions.clear()
	}
}
