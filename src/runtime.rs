//! The context object tying the engines together.

use crate::{
	ajax::{self, AjaxRequest, AjaxResponse, InFlight, Method, Swap},
	binding,
	component::{self, Component, ComponentDefinition, Components},
	conditional::ConditionalEngine,
	config::Config,
	dom::{Dom, EventKind},
	error::{AjaxError, RealtimeError},
	event::{Action, ActionCache, Dispatched, Handler, HandlerEvent},
	lifecycle::{HookContext, HookName, HookOutcome, Hooks, LifecycleHub},
	list::{self, ListSpec},
	loading::{self, LoadingTicket, Scheduled, Task},
	realtime::{self, Clock, ConnectionState, Connector, RealtimeChannel, RealtimeMessage},
	reducer::{ActionRecord, Reduced, StateAction},
	state::{ComponentId, Path, StateStore},
};
use core::time::Duration;
use hashbrown::HashMap;
use serde_json::{json, Map, Value};
use std::{collections::VecDeque, rc::Rc};
use tracing::{debug, error, info, instrument, trace, trace_span, warn};

/// Upper bound for hook-triggered cascades in [`Runtime::flush_deferred`].
const MAX_DEFERRED_ROUNDS: usize = 64;

/// How many applied actions [`Runtime::history`] keeps.
pub const MAX_HISTORY: usize = 100;

/// Identifies a [`Runtime::watch`] registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

struct Watcher {
	id: WatchId,
	component: ComponentId,
	path: Path,
	last: Option<Value>,
	callback: Rc<dyn Fn(Option<&Value>)>,
}

/// What a view refresh was caused by.
enum Change<'a, N> {
	/// A single path, optionally by a bound control that already shows the new value.
	Path(&'a Path, Option<&'a N>),
	/// A merge of any number of top-level keys.
	Merge,
}

/// Owns the document and all engine state.
///
/// Every entry point runs to completion synchronously. The only things left to the host are sending queued
/// [requests](`Runtime::take_pending_requests`), running [scheduled tasks](`Runtime::take_scheduled`) and forwarding
/// events and socket frames.
///
/// ```
/// use declarative_dom::{ComponentId, Config, Dom, EventKind, MemoryDom, Runtime};
/// use serde_json::json;
///
/// let dom = MemoryDom::parse(r#"
/// 	<div data-ui-component="counter" data-ui-id="counter-1" data-ui-state='{"count": 0}'>
/// 		<span id="display" data-ui-bind="count"></span>
/// 		<button id="inc" data-ui-click="increment">+</button>
/// 	</div>
/// "#);
/// let mut runtime = Runtime::new(dom, Config::default());
/// runtime.register_handler("increment", |runtime, event| {
/// 	let id = event.component.clone().unwrap();
/// 	let count = runtime.get(&id, "count").and_then(|count| count.as_i64()).unwrap_or(0);
/// 	runtime.set(&id, "count", json!(count + 1));
/// });
/// runtime.init();
///
/// let button = runtime.dom().element_by_id("inc").unwrap();
/// runtime.dispatch(EventKind::Click, &button);
/// let display = runtime.dom().element_by_id("display").unwrap();
/// assert_eq!(runtime.dom().text(&display), "1");
/// assert_eq!(runtime.get(&ComponentId::from("counter-1"), "count"), Some(json!(1)));
/// ```
pub struct Runtime<D: Dom> {
	dom: D,
	config: Config,
	store: StateStore,
	components: Components<D::Node>,
	defaults: HashMap<String, Map<String, Value>>,
	handlers: HashMap<String, Handler<D>>,
	lifecycle: LifecycleHub<D>,
	conditionals: ConditionalEngine,
	actions: ActionCache,
	ajax: ajax::AjaxBridge<D::Node>,
	realtime: RealtimeChannel,
	loading: Vec<(LoadingTicket, D::Node)>,
	next_ticket: u64,
	deferred: VecDeque<HookContext<D::Node>>,
	scheduled: Vec<Scheduled>,
	history: VecDeque<ActionRecord>,
	watchers: Vec<Watcher>,
	next_watch: u64,
}

impl<D: Dom> core::fmt::Debug for Runtime<D> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Runtime")
			.field("config", &self.config)
			.field("components", &self.components)
			.field("handlers", &self.handlers.keys().collect::<Vec<_>>())
			.field("lifecycle", &self.lifecycle)
			.field("ajax", &self.ajax)
			.field("realtime", &self.realtime)
			.field("deferred", &self.deferred.len())
			.field("scheduled", &self.scheduled)
			.field("history", &self.history.len())
			.field("watchers", &self.watchers.len())
			.finish()
	}
}

impl<D: Dom> Runtime<D> {
	#[must_use]
	pub fn new(dom: D, config: Config) -> Self {
		Self {
			dom,
			config,
			store: StateStore::new(),
			components: Components::default(),
			defaults: HashMap::new(),
			handlers: HashMap::new(),
			lifecycle: LifecycleHub::new(),
			conditionals: ConditionalEngine::new(),
			actions: ActionCache::new(),
			ajax: ajax::AjaxBridge::default(),
			realtime: RealtimeChannel::default(),
			loading: Vec::new(),
			next_ticket: 1,
			deferred: VecDeque::new(),
			scheduled: Vec::new(),
			history: VecDeque::new(),
			watchers: Vec::new(),
			next_watch: 1,
		}
	}

	#[must_use]
	pub fn dom(&self) -> &D {
		&self.dom
	}

	/// Direct document access. Changes made here aren't reflected in state until the next [`init`](`Runtime::init`).
	pub fn dom_mut(&mut self) -> &mut D {
		&mut self.dom
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	#[must_use]
	pub fn store(&self) -> &StateStore {
		&self.store
	}

	#[must_use]
	pub fn component(&self, id: &ComponentId) -> Option<&Component<D::Node>> {
		self.components.get(id)
	}

	/// Ids of live components, in first-scan order.
	#[must_use]
	pub fn component_ids(&self) -> Vec<ComponentId> {
		self.components.ids()
	}

	// Registration.

	/// Registers default state and hooks for components named `name`. Takes effect for instances scanned afterwards.
	pub fn register_component(&mut self, name: &str, definition: ComponentDefinition<D>) {
		debug!("Registering component {:?}.", name);
		self.defaults.entry(name.to_owned()).or_default().extend(definition.default_state);
		self.lifecycle.register(name, definition.hooks);
	}

	/// Registers (or replaces) the handler that `data-ui-<event>="name"` attributes resolve to.
	pub fn register_handler(&mut self, name: &str, handler: impl Fn(&mut Self, &HandlerEvent<D::Node>) + 'static) {
		self.handlers.insert(name.to_owned(), Rc::new(handler));
	}

	pub fn register_hooks(&mut self, component: &str, hooks: Hooks<D>) {
		self.lifecycle.register(component, hooks);
	}

	/// Subscribes to realtime messages of `kind` (or [`ANY`](`crate::realtime::ANY`)) that aren't state or markup updates.
	pub fn subscribe(&mut self, kind: &str, subscriber: impl Fn(&RealtimeMessage) + 'static) {
		self.realtime.subscribe(kind, subscriber);
	}

	// State.

	/// Reads `path` of component `id`. [`None`] is *undefined*, including for malformed paths.
	#[must_use]
	pub fn get(&self, id: &ComponentId, path: &str) -> Option<Value> {
		match Path::parse(path) {
			Ok(path) => self.store.get(id, &path),
			Err(path_error) => {
				error!("Can't read state: {}", path_error);
				None
			}
		}
	}

	/// Writes `value` at `path` of component `id` and refreshes the component's views.
	///
	/// `updated` hooks stay queued until [`flush_deferred`](`Runtime::flush_deferred`), which every event-like entry
	/// point calls before returning.
	pub fn set(&mut self, id: &ComponentId, path: &str, value: Value) {
		self.update(id, path, value, None)
	}

	/// Shallowly merges `partial` into component `id`'s state and refreshes all of its views.
	pub fn merge(&mut self, id: &ComponentId, partial: Map<String, Value>) {
		let keys = self.store.merge(id, partial);
		if keys.is_empty() {
			return;
		}
		self.notify_watchers(id);
		self.refresh(id, Change::Merge, json!({ "merged": keys }));
	}

	/// Applies `action` to component `id`'s state and refreshes its views like [`set`](`Runtime::set`) does.
	///
	/// Every action is recorded in the [history](`Runtime::history`), including those that turned out not to change anything.
	#[instrument(skip(self, action), fields(%id, action = action.name()))]
	pub fn apply(&mut self, id: &ComponentId, action: StateAction) {
		let reduced = action.reduce(&self.store, id);
		self.history.push_back(ActionRecord {
			component: id.clone(),
			action,
		});
		while self.history.len() > MAX_HISTORY {
			self.history.pop_front();
		}
		match reduced {
			Ok(Reduced::Write(path, value)) => self.write(id, &path, value, None),
			Ok(Reduced::Merge(partial)) => self.merge(id, partial),
			Ok(Reduced::Replace(state)) => {
				let keys: Vec<String> = state.as_object().map(|state| state.keys().cloned().collect()).unwrap_or_default();
				self.store.replace(id.clone(), state);
				self.notify_watchers(id);
				self.refresh(id, Change::Merge, json!({ "reset": keys }));
			}
			Ok(Reduced::Unchanged) => trace!("Action changed nothing."),
			Err(path_error) => error!("Ignoring action: {}", path_error),
		}
	}

	/// Applied actions, oldest first. Only the last [`MAX_HISTORY`] are kept.
	pub fn history(&self) -> impl Iterator<Item = &ActionRecord> {
		self.history.iter()
	}

	pub fn clear_history(&mut self) {
		self.history.clear()
	}

	/// Calls `callback` with the value at `path` of component `id` now and whenever it changes afterwards.
	pub fn watch(&mut self, id: &ComponentId, path: &str, callback: impl Fn(Option<&Value>) + 'static) -> Option<WatchId> {
		let path = match Path::parse(path) {
			Ok(path) => path,
			Err(path_error) => {
				error!("Can't watch: {}", path_error);
				return None;
			}
		};
		let watch = WatchId(self.next_watch);
		self.next_watch += 1;
		let last = self.store.get(id, &path);
		callback(last.as_ref());
		self.watchers.push(Watcher {
			id: watch,
			component: id.clone(),
			path,
			last,
			callback: Rc::new(callback),
		});
		Some(watch)
	}

	/// Returns whether `watch` was registered.
	pub fn unwatch(&mut self, watch: WatchId) -> bool {
		let before = self.watchers.len();
		self.watchers.retain(|watcher| watcher.id != watch);
		self.watchers.len() != before
	}

	fn notify_watchers(&mut self, id: &ComponentId) {
		let mut due = Vec::new();
		for watcher in self.watchers.iter_mut().filter(|watcher| &watcher.component == id) {
			let current = self.store.get(id, &watcher.path);
			if current != watcher.last {
				watcher.last = current.clone();
				due.push((Rc::clone(&watcher.callback), current));
			}
		}
		for (callback, value) in due {
			callback(value.as_ref());
		}
	}

	fn update(&mut self, id: &ComponentId, path: &str, value: Value, origin: Option<&D::Node>) {
		match Path::parse(path) {
			Ok(path) => self.write(id, &path, value, origin),
			Err(path_error) => error!("Ignoring state update: {}", path_error),
		}
	}

	fn write(&mut self, id: &ComponentId, path: &Path, value: Value, origin: Option<&D::Node>) {
		let previous = self.store.set(id, path, value.clone());
		self.notify_watchers(id);
		let payload = json!({
			"path": path.to_string(),
			"value": value,
			"previous": previous,
		});
		self.refresh(id, Change::Path(path, origin), payload);
	}

	fn refresh(&mut self, id: &ComponentId, change: Change<'_, D::Node>, payload: Value) {
		let element = match self.components.get(id) {
			Some(component) => component.element.clone(),
			None => {
				trace!("No live component {}, state only.", id);
				return;
			}
		};
		let span = trace_span!("refresh", component = %id);
		let _enter = span.enter();

		if self.fire(id, HookName::BeforeUpdate, payload.clone()) == HookOutcome::Veto {
			debug!("beforeUpdate vetoed the view refresh.");
			return;
		}

		let changed = match change {
			Change::Path(path, origin) => {
				binding::refresh(&mut self.dom, &self.config, &self.store, id, &element, path, origin);
				Some(path)
			}
			Change::Merge => {
				let nodes = binding::bound_elements(&self.dom, &self.config, &element);
				binding::populate(&mut self.dom, &self.config, &mut self.store, id, &nodes);
				None
			}
		};
		self.apply_conditionals(id, &element);
		if let Some(context) = self.context(id, HookName::Updated, payload) {
			self.deferred.push_back(context);
		}
		if self.render_lists(id, &element, changed) {
			// Fresh items may carry conditions of their own.
			self.apply_conditionals(id, &element);
		}
	}

	// Views.

	fn apply_conditionals(&mut self, id: &ComponentId, element: &D::Node) {
		let empty = Value::Object(Map::new());
		let state = self.store.snapshot(id).unwrap_or(&empty);
		self.conditionals.apply(&mut self.dom, &self.config, element, state);
	}

	/// Renders `element`'s lists, or only those related to `changed`. Returns whether any item node was created, re-rendered or moved.
	fn render_lists(&mut self, id: &ComponentId, element: &D::Node, changed: Option<&Path>) -> bool {
		let mut touched = Vec::new();
		if let Some(state) = self.store.snapshot(id) {
			for container in list::containers(&self.dom, &self.config, element) {
				let spec = match ListSpec::read(&self.dom, &self.config, &container) {
					Some(spec) => spec,
					None => continue,
				};
				if changed.map_or(false, |changed| !spec.path.is_related(changed)) {
					continue;
				}
				let report = list::render(&mut self.dom, &self.config, &spec, &container, state);
				trace!(created = report.created.len(), reused = report.reused, removed = report.removed, "Rendered list {}.", spec.path);
				touched.extend(report.created);
				touched.extend(report.rerendered);
				touched.extend(report.reindexed);
			}
		}
		let any = !touched.is_empty();
		for item in touched {
			let nodes = binding::bound_below(&self.dom, &self.config, &item);
			binding::populate(&mut self.dom, &self.config, &mut self.store, id, &nodes);
		}
		any
	}

	/// Full render: lists, then bindings, then conditions.
	fn render(&mut self, id: &ComponentId) {
		let element = match self.components.get(id) {
			Some(component) => component.element.clone(),
			None => return,
		};
		self.render_lists(id, &element, None);
		let nodes = binding::bound_elements(&self.dom, &self.config, &element);
		binding::populate(&mut self.dom, &self.config, &mut self.store, id, &nodes);
		self.apply_conditionals(id, &element);
	}

	// Scanning.

	/// Scans the document for components, initializes new ones and re-renders all of them.
	///
	/// Safe to call repeatedly: known components keep their state and don't see `init` again.
	pub fn init(&mut self) {
		self.scan();
		self.flush_deferred();
	}

	/// Forgets every component, handler, hook, subscriber and queued piece of work. The document is left alone.
	pub fn reset(&mut self) {
		info!("Resetting runtime.");
		self.store.clear();
		self.components.clear();
		self.defaults.clear();
		self.handlers.clear();
		self.lifecycle.clear();
		self.conditionals.clear();
		self.actions.clear();
		self.ajax.clear();
		self.realtime.clear();
		self.loading.clear();
		self.deferred.clear();
		self.scheduled.clear();
		self.history.clear();
		self.watchers.clear();
	}

	#[instrument(skip(self))]
	fn scan(&mut self) {
		let component_attribute = self.config.attr("component");
		let id_attribute = self.config.attr("id");
		let root = self.dom.document_element();

		let mut seen: Vec<ComponentId> = Vec::new();
		let mut fresh = Vec::new();
		for element in self.dom.query_attribute(&root, &component_attribute) {
			let name = match self.dom.attribute(&element, &component_attribute) {
				Some(name) if !name.trim().is_empty() => name.trim().to_owned(),
				_ => {
					warn!("Skipping element with empty {}.", component_attribute);
					continue;
				}
			};
			let id = match self.dom.attribute(&element, &id_attribute) {
				Some(id) if !id.trim().is_empty() => ComponentId::new(id.trim()),
				_ => {
					let id = self.components.generate_id(&name);
					self.dom.set_attribute(&element, &id_attribute, id.as_str());
					id
				}
			};
			if seen.contains(&id) {
				warn!("Duplicate component id {}, skipping the later element.", id);
				continue;
			}
			seen.push(id.clone());

			let known_element = self.components.get(&id).map(|component| component.element.clone());
			match known_element {
				Some(known) if known == element => trace!("{} is already initialized.", id),
				Some(_) => {
					debug!("{} was re-rendered, adopting the new element.", id);
					if self.dom.has_attribute(&element, &self.config.attr("state")) {
						let state = self.initial_state(&id, &name, &element);
						self.store.insert(id.clone(), state);
					}
					if let Some(component) = self.components.get_mut(&id) {
						component.element = element;
						component.name = name;
					}
				}
				None => {
					debug!("Initializing {} ({}).", id, name);
					let state = self.initial_state(&id, &name, &element);
					self.store.insert(id.clone(), state);
					self.components.insert(Component {
						id: id.clone(),
						name,
						element,
						mounted: false,
					});
					fresh.push(id);
				}
			}
		}

		let detached: Vec<ComponentId> = self
			.components
			.ids()
			.into_iter()
			.filter(|id| !seen.contains(id))
			.filter(|id| self.components.get(id).map_or(false, |component| !self.dom.is_connected(&component.element)))
			.collect();
		for id in &detached {
			debug!("{} left the document, dropping it.", id);
			self.fire(id, HookName::Destroyed, Value::Null);
			self.components.remove(id);
			self.store.remove(id);
			self.watchers.retain(|watcher| &watcher.component != id);
		}

		for id in &fresh {
			self.fire(id, HookName::Init, Value::Null);
		}
		for id in &seen {
			self.render(id);
		}
		for id in &fresh {
			if let Some(component) = self.components.get_mut(id) {
				component.mounted = true;
				self.fire(id, HookName::Mounted, Value::Null);
			}
		}
	}

	fn initial_state(&self, id: &ComponentId, name: &str, element: &D::Node) -> Value {
		let mut state = match self.dom.attribute(element, &self.config.attr("state")) {
			Some(raw) if !raw.trim().is_empty() => match serde_json::from_str::<Value>(&raw) {
				Ok(Value::Object(state)) => state,
				Ok(Value::Null) => Map::new(),
				Ok(other) => {
					let mut wrapped = Map::new();
					wrapped.insert("value".to_owned(), other);
					wrapped
				}
				Err(json_error) => {
					error!("Malformed initial state of {}, starting empty: {}", id, json_error);
					Map::new()
				}
			},
			_ => Map::new(),
		};
		if let Some(defaults) = self.defaults.get(name) {
			for (key, value) in defaults {
				state.entry(key.clone()).or_insert_with(|| value.clone());
			}
		}
		Value::Object(state)
	}

	/// Keeps a component's id on markup that replaced its element, so that its state survives.
	fn adopt_identity(&mut self, id: &ComponentId, replacements: &[D::Node]) {
		let component_attribute = self.config.attr("component");
		let id_attribute = self.config.attr("id");
		if let Some(replacement) = replacements.iter().find(|node| self.dom.has_attribute(node, &component_attribute)) {
			if !self.dom.has_attribute(replacement, &id_attribute) {
				self.dom.set_attribute(replacement, &id_attribute, id.as_str());
			}
		}
	}

	/// The id of the component owning `node`.
	#[must_use]
	pub fn component_id_of(&self, node: &D::Node) -> Option<ComponentId> {
		let owner = component::owner(&self.dom, &self.config, node)?;
		self.dom.attribute(&owner, &self.config.attr("id")).map(ComponentId::new)
	}

	/// Key and index of the list item containing `node`.
	#[must_use]
	pub fn list_item_of(&self, node: &D::Node) -> Option<(String, Option<usize>)> {
		list::item_of(&self.dom, &self.config, node)
	}

	/// Runs `beforeDestroy`, removes the component's element, state and record, then runs `destroyed`.
	///
	/// Returns whether the component existed.
	pub fn destroy_component(&mut self, id: &ComponentId) -> bool {
		let element = match self.components.get(id) {
			Some(component) => component.element.clone(),
			None => return false,
		};
		self.fire(id, HookName::BeforeDestroy, Value::Null);
		self.dom.remove(&element);
		self.fire(id, HookName::Destroyed, Value::Null);
		self.components.remove(id);
		self.store.remove(id);
		self.watchers.retain(|watcher| &watcher.component != id);
		self.flush_deferred();
		true
	}

	// Lifecycle.

	fn context(&self, id: &ComponentId, hook: HookName, payload: Value) -> Option<HookContext<D::Node>> {
		self.components.get(id).map(|component| HookContext {
			component: component.name.clone(),
			id: id.clone(),
			element: component.element.clone(),
			hook,
			payload,
		})
	}

	fn fire(&mut self, id: &ComponentId, hook: HookName, payload: Value) -> HookOutcome {
		match self.context(id, hook, payload) {
			Some(context) => self.fire_hook(&context),
			None => HookOutcome::Continue,
		}
	}

	/// Invokes the hook `context` describes, if registered. Errors are logged and count as [`HookOutcome::Continue`].
	pub fn fire_hook(&mut self, context: &HookContext<D::Node>) -> HookOutcome {
		let hook = match self.lifecycle.hook(&context.component, context.hook) {
			Some(hook) => hook,
			None => return HookOutcome::Continue,
		};
		trace!("Firing {} of {}.", context.hook, context.id);
		match hook(self, context) {
			Ok(outcome) => outcome,
			Err(hook_error) => {
				error!("{} hook of {} failed: {}", context.hook, context.id, hook_error);
				HookOutcome::Continue
			}
		}
	}

	/// Runs queued `updated` hooks, including any they queue in turn.
	pub fn flush_deferred(&mut self) {
		for _ in 0..MAX_DEFERRED_ROUNDS {
			let batch: Vec<_> = self.deferred.drain(..).collect();
			if batch.is_empty() {
				return;
			}
			for context in batch {
				self.fire_hook(&context);
			}
		}
		warn!("Dropping {} deferred hooks: updates keep triggering updates.", self.deferred.len());
		self.deferred.clear();
	}

	// Events.

	/// Handles a delegated DOM event dispatched on `target`.
	#[instrument(skip(self))]
	pub fn dispatch(&mut self, kind: EventKind, target: &D::Node) -> Dispatched {
		if matches!(kind, EventKind::Input | EventKind::Change) {
			self.feed_binding(target);
		}

		let attribute = self.config.attr(kind.name());
		let mut outcome = Dispatched::default();
		if let Some(element) = self.dom.closest_attribute(target, &attribute) {
			outcome.prevent_default = kind.prevents_default();
			let text = self.dom.attribute(&element, &attribute).unwrap_or_default();
			outcome.handled = match self.actions.get(&text) {
				Some(Action::Named(name)) => self.invoke_named(&name, kind, &element, target),
				Some(Action::Ajax(endpoint)) => {
					self.request(&element, &endpoint);
					true
				}
				Some(Action::Global(name)) => self.invoke_global(&name, kind, &element),
				None => {
					debug!("Empty {} attribute.", attribute);
					false
				}
			};
		}

		self.flush_deferred();
		outcome
	}

	fn feed_binding(&mut self, target: &D::Node) {
		if self.dom.control_kind(target).is_none() {
			return;
		}
		let (raw, _) = match binding::bound_path(&self.dom, &self.config, target) {
			Some(bound) => bound,
			None => return,
		};
		let id = match self.component_id_of(target) {
			Some(id) => id,
			None => {
				debug!("Bound control outside of any component.");
				return;
			}
		};
		if let Some(value) = binding::read_control(&self.dom, target) {
			self.update(&id, raw.trim(), value, Some(target));
		}
	}

	fn invoke_named(&mut self, name: &str, kind: EventKind, element: &D::Node, target: &D::Node) -> bool {
		match self.handlers.get(name).cloned() {
			Some(handler) => {
				let event = HandlerEvent {
					kind,
					element: element.clone(),
					target: target.clone(),
					component: self.component_id_of(element),
				};
				trace!("Invoking handler {:?}.", name);
				handler(self, &event);
				true
			}
			None => self.invoke_global(name, kind, element),
		}
	}

	fn invoke_global(&mut self, name: &str, kind: EventKind, element: &D::Node) -> bool {
		if self.dom.call_global(name, element, kind) {
			trace!("Invoked global {:?}.", name);
			true
		} else {
			warn!("No handler or global function named {:?} for {} event.", name, kind.name());
			false
		}
	}

	// AJAX.

	/// Queues a request to `endpoint` on behalf of `element`, as `data-ui-<event>="ajax:endpoint"` does.
	pub fn request(&mut self, element: &D::Node, endpoint: &str) -> u64 {
		let component_id = self.component_id_of(element);
		let component = component_id.as_ref().and_then(|id| self.components.get(id)).map(|component| (component.name.clone(), component.element.clone()));

		let method_text = self.dom.attribute(element, &self.config.attr("method")).unwrap_or_else(|| self.config.default_method.clone());
		let method = Method::parse(&method_text).unwrap_or_else(|| {
			warn!("Unsupported method {:?}, using POST.", method_text);
			Method::Post
		});

		let mut headers = vec![(ajax::PARTIAL_HEADER.to_owned(), "true".to_owned())];
		let mut fields = match self.dom.closest_tag(element, "form") {
			Some(form) => ajax::collect_form(&self.dom, &form),
			None => Map::new(),
		};
		if let Some((name, _)) = &component {
			headers.push((ajax::COMPONENT_HEADER.to_owned(), name.clone()));
			fields.insert(ajax::COMPONENT_FIELD.to_owned(), Value::String(name.clone()));
			if let Some(state) = component_id.as_ref().and_then(|id| self.store.snapshot(id)) {
				fields.insert(ajax::STATE_FIELD.to_owned(), state.clone());
			}
		}
		let body = if method.has_body() {
			headers.push(("Content-Type".to_owned(), "application/json".to_owned()));
			Some(Value::Object(fields).to_string())
		} else {
			None
		};

		let target = match self.dom.attribute(element, &self.config.attr("target")) {
			Some(target_id) => self.dom.element_by_id(target_id.trim()).or_else(|| {
				warn!("No element with id {:?} to put the response into.", target_id);
				None
			}),
			None => component.map(|(_, element)| element),
		};
		let swap = Swap::parse(self.dom.attribute(element, &self.config.attr("swap")).as_deref());

		let was_disabled = loading::begin_request(&mut self.dom, &self.config, element);
		self.ajax.begin(
			method,
			headers,
			body,
			InFlight {
				url: endpoint.to_owned(),
				trigger: element.clone(),
				was_disabled,
				component: component_id,
				target,
				swap,
			},
		)
	}

	/// Requests that haven't been handed to a transport yet.
	pub fn take_pending_requests(&mut self) -> Vec<AjaxRequest> {
		self.ajax.take_requests()
	}

	/// Number of requests between [`request`](`Runtime::request`) and [`complete_request`](`Runtime::complete_request`).
	#[must_use]
	pub fn requests_in_flight(&self) -> usize {
		self.ajax.in_flight()
	}

	/// Applies the outcome of request `id`.
	///
	/// Loading state is cleared either way. Failures are logged and leave state and document alone.
	#[instrument(skip(self, result))]
	pub fn complete_request(&mut self, id: u64, result: Result<AjaxResponse, AjaxError>) {
		let in_flight = match self.ajax.finish(id) {
			Ok(in_flight) => in_flight,
			Err(unknown) => {
				warn!("{}", unknown);
				return;
			}
		};
		loading::end_request(&mut self.dom, &self.config, &in_flight.trigger, in_flight.was_disabled);

		let update = match result.and_then(ajax::interpret) {
			Ok(update) => update,
			Err(ajax_error) => {
				error!("Request to {} failed: {}", in_flight.url, ajax_error);
				self.flush_deferred();
				return;
			}
		};

		if !update.state.is_empty() {
			match &in_flight.component {
				Some(component) => self.merge(component, update.state),
				None => warn!("Response to {} carries state, but the trigger isn't inside a component.", in_flight.url),
			}
		}

		if let Some(html) = update.html {
			match &in_flight.target {
				Some(target) => {
					match in_flight.swap {
						Swap::Inner => self.dom.set_inner_html(target, &html),
						Swap::Outer => {
							let replacements = self.dom.replace_with_html(target, &html);
							if let Some(component) = &in_flight.component {
								if self.components.get(component).map_or(false, |known| &known.element == target) {
									self.adopt_identity(component, &replacements);
								}
							}
						}
					}
					self.scan();
				}
				None => warn!("Response to {} carries markup, but there is no target for it.", in_flight.url),
			}
		}
		self.flush_deferred();
	}

	// Realtime.

	/// Opens the realtime channel.
	///
	/// # Errors
	///
	/// Iff `connector` can't start connecting.
	pub fn connect_realtime(&mut self, url: &str, connector: Box<dyn Connector>) -> Result<(), RealtimeError> {
		self.realtime.connect(url, connector)
	}

	pub fn set_realtime_clock(&mut self, clock: Box<dyn Clock>) {
		self.realtime.set_clock(clock);
	}

	#[must_use]
	pub fn realtime_state(&self) -> ConnectionState {
		self.realtime.state()
	}

	/// To be called by the host once the socket is open.
	pub fn realtime_opened(&mut self) {
		self.realtime.opened();
	}

	/// To be called by the host once the socket closed. A non-clean close schedules a reconnect within the configured bounds.
	pub fn realtime_closed(&mut self, clean: bool) {
		if self.realtime.closed(clean, self.config.max_reconnect_attempts) {
			self.scheduled.push(Scheduled {
				delay: self.config.reconnect_delay(),
				task: Task::Reconnect,
			});
		}
	}

	/// Sends `{type, data, timestamp}`.
	///
	/// # Errors
	///
	/// Iff the channel isn't open or the socket rejected the frame.
	pub fn send_realtime(&mut self, kind: &str, data: &Value) -> Result<(), RealtimeError> {
		self.realtime.send(kind, data)
	}

	/// Handles one incoming realtime frame.
	#[instrument(skip(self, text))]
	pub fn receive_message(&mut self, text: &str) {
		let message = match RealtimeMessage::parse(text) {
			Ok(message) => message,
			Err(malformed) => {
				error!("Dropping realtime message: {}", malformed);
				return;
			}
		};
		trace!("Realtime message of type {:?}.", message.kind);
		let result = match message.kind.as_str() {
			realtime::STATE_UPDATE => self.apply_state_update(&message),
			realtime::COMPONENT_UPDATE => self.apply_component_update(&message),
			_ => {
				for subscriber in self.realtime.subscribers(&message.kind) {
					subscriber(&message);
				}
				Ok(())
			}
		};
		if let Err(realtime_error) = result {
			warn!("Ignoring realtime message: {}", realtime_error);
		}
		self.flush_deferred();
	}

	fn message_target(&self, message: &RealtimeMessage) -> Result<(ComponentId, D::Node), RealtimeError> {
		let id = message
			.component_id
			.as_deref()
			.map(ComponentId::from)
			.ok_or_else(|| RealtimeError::MissingComponentId(message.kind.clone()))?;
		match self.components.get(&id) {
			Some(component) => Ok((id, component.element.clone())),
			None => Err(RealtimeError::UnknownComponent(id.as_str().to_owned())),
		}
	}

	fn apply_state_update(&mut self, message: &RealtimeMessage) -> Result<(), RealtimeError> {
		let (id, _) = self.message_target(message)?;
		let partial: Map<String, Value> = serde_json::from_value(message.data.clone())?;
		self.merge(&id, partial);
		Ok(())
	}

	fn apply_component_update(&mut self, message: &RealtimeMessage) -> Result<(), RealtimeError> {
		let (id, element) = self.message_target(message)?;
		let html = match &message.data {
			Value::String(html) => html.clone(),
			Value::Object(data) => match data.get("html") {
				Some(Value::String(html)) => html.clone(),
				_ => return Err(RealtimeError::Malformed(serde::de::Error::missing_field("html"))),
			},
			_ => return Err(RealtimeError::Malformed(serde::de::Error::custom("expected markup"))),
		};
		let replacements = self.dom.replace_with_html(&element, &html);
		self.adopt_identity(&id, &replacements);
		self.scan();
		Ok(())
	}

	// Loading and timers.

	/// Shows a loading state on `element` until [`hide_loading`](`Runtime::hide_loading`).
	pub fn show_loading(&mut self, element: &D::Node, text: Option<&str>) {
		loading::show(&mut self.dom, &self.config, element, text);
	}

	pub fn hide_loading(&mut self, element: &D::Node) {
		self.loading.retain(|(_, node)| node != element);
		loading::hide(&mut self.dom, &self.config, element);
	}

	/// Shows a loading state that a scheduled [`Task::HideLoading`] clears after `duration`.
	pub fn show_loading_for(&mut self, element: &D::Node, duration: Duration, text: Option<&str>) -> LoadingTicket {
		let ticket = LoadingTicket(self.next_ticket);
		self.next_ticket += 1;
		self.show_loading(element, text);
		self.loading.push((ticket, element.clone()));
		self.scheduled.push(Scheduled {
			delay: duration,
			task: Task::HideLoading(ticket),
		});
		ticket
	}

	/// Work the host should run after the given delays.
	pub fn take_scheduled(&mut self) -> Vec<Scheduled> {
		core::mem::take(&mut self.scheduled)
	}

	/// Runs a task previously returned by [`take_scheduled`](`Runtime::take_scheduled`).
	pub fn run_task(&mut self, task: Task) {
		match task {
			Task::HideLoading(ticket) => match self.loading.iter().position(|(pending, _)| *pending == ticket) {
				Some(index) => {
					let (_, element) = self.loading.remove(index);
					loading::hide(&mut self.dom, &self.config, &element);
				}
				None => trace!("Loading state {:?} was already hidden.", ticket),
			},
			Task::Reconnect => {
				if let Err(realtime_error) = self.realtime.reconnect() {
					error!("Reconnecting failed: {}", realtime_error);
					self.realtime_closed(false);
				}
			}
		}
		self.flush_deferred();
	}
}
