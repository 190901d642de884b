//! A declarative-attribute runtime for server-rendered HTML.
//!
//! Markup opts into behaviour through `data-ui-*` attributes: components with JSON state, two-way bindings, conditional
//! visibility, keyed lists, delegated event handlers, AJAX partial updates and realtime state pushes.
//! Everything runs against the [`Dom`] trait, so the same [`Runtime`] drives a headless [`MemoryDom`] in tests and the live
//! document through [`web::WebRuntime`] on `wasm32`.

#![doc(html_root_url = "https://docs.rs/declarative-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod ajax;
pub mod binding;
pub mod component;
pub mod conditional;
pub mod config;
pub mod dom;
pub mod error;
pub mod event;
pub mod expr;
pub mod lifecycle;
pub mod list;
pub mod loading;
pub mod memory;
pub mod realtime;
pub mod reducer;
pub mod runtime;
pub mod state;
pub mod template;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use crate::{
	component::ComponentDefinition,
	config::Config,
	dom::{Dom, EventKind},
	event::HandlerEvent,
	lifecycle::{HookContext, HookName, HookOutcome, Hooks},
	memory::{MemoryDom, NodeId},
	reducer::StateAction,
	runtime::Runtime,
	state::{ComponentId, Path, StateStore},
};
