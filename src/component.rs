//! Component records and subtree scoping.

use crate::{
	config::Config,
	dom::Dom,
	error::HookError,
	lifecycle::{HookContext, HookName, HookOutcome, Hooks},
	runtime::Runtime,
	state::ComponentId,
};
use core::fmt;
use hashbrown::HashMap;
use serde_json::{Map, Value};

/// A scanned component instance.
#[derive(Debug, Clone)]
pub struct Component<N> {
	pub id: ComponentId,
	pub name: String,
	pub element: N,
	/// Whether `mounted` has fired.
	pub mounted: bool,
}

/// Registry of live components, keyed by id.
#[derive(Debug)]
pub struct Components<N> {
	by_id: HashMap<ComponentId, Component<N>>,
	/// Scan order, so that views are refreshed deterministically.
	order: Vec<ComponentId>,
	next_serial: u64,
}

impl<N> Default for Components<N> {
	fn default() -> Self {
		Self {
			by_id: HashMap::new(),
			order: Vec::new(),
			next_serial: 1,
		}
	}
}

impl<N: Clone + PartialEq> Components<N> {
	#[must_use]
	pub fn get(&self, id: &ComponentId) -> Option<&Component<N>> {
		self.by_id.get(id)
	}

	pub fn get_mut(&mut self, id: &ComponentId) -> Option<&mut Component<N>> {
		self.by_id.get_mut(id)
	}

	pub fn insert(&mut self, component: Component<N>) {
		if !self.by_id.contains_key(&component.id) {
			self.order.push(component.id.clone());
		}
		self.by_id.insert(component.id.clone(), component);
	}

	pub fn remove(&mut self, id: &ComponentId) -> Option<Component<N>> {
		self.order.retain(|existing| existing != id);
		self.by_id.remove(id)
	}

	/// Ids in first-scan order.
	#[must_use]
	pub fn ids(&self) -> Vec<ComponentId> {
		self.order.clone()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	pub fn clear(&mut self) {
		self.by_id.clear();
		self.order.clear();
		self.next_serial = 1;
	}

	/// A fresh id for an unnamed instance of `name`.
	pub fn generate_id(&mut self, name: &str) -> ComponentId {
		loop {
			let id = ComponentId::new(format!("{}-{}", name, self.next_serial));
			self.next_serial += 1;
			if !self.by_id.contains_key(&id) {
				return id;
			}
		}
	}
}

/// Default state and hooks for a named component.
pub struct ComponentDefinition<D: Dom> {
	/// Keys missing from an instance's `data-ui-state` are filled from here.
	pub default_state: Map<String, Value>,
	pub hooks: Hooks<D>,
}

impl<D: Dom> Default for ComponentDefinition<D> {
	fn default() -> Self {
		Self {
			default_state: Map::new(),
			hooks: Hooks::new(),
		}
	}
}

impl<D: Dom> fmt::Debug for ComponentDefinition<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentDefinition")
			.field("default_state", &self.default_state)
			.field("hooks", &self.hooks)
			.finish()
	}
}

impl<D: Dom> ComponentDefinition<D> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_default(mut self, key: &str, value: Value) -> Self {
		self.default_state.insert(key.to_owned(), value);
		self
	}

	#[must_use]
	pub fn on(mut self, name: HookName, hook: impl Fn(&mut Runtime<D>, &HookContext<D::Node>) -> Result<HookOutcome, HookError> + 'static) -> Self {
		self.hooks = self.hooks.on(name, hook);
		self
	}
}

/// The component element that owns `node`: its closest inclusive ancestor with the component attribute.
pub fn owner<D: Dom>(dom: &D, config: &Config, node: &D::Node) -> Option<D::Node> {
	dom.closest_attribute(node, &config.attr("component"))
}

/// Elements carrying `attribute` that belong to `component` itself rather than to a nested component.
pub fn scoped<D: Dom>(dom: &D, config: &Config, component: &D::Node, attribute: &str) -> Vec<D::Node> {
	let component_attribute = config.attr("component");
	dom.query_attribute(component, attribute)
		.into_iter()
		.filter(|node| {
			// A nested component's own root belongs to the nested component, except for what it carries towards its parent.
			let parent_scope = if node == component {
				Some(component.clone())
			} else {
				dom.closest_attribute(node, &component_attribute)
			};
			parent_scope.as_ref() == Some(component)
		})
		.collect()
}
