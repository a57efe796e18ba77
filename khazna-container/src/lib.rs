//! Core bean container for Khazna.
//!
//! Beans are registered by name with a factory, a scope and a wiring mode.
//! The [`Container`](container::Container) wires their dependencies on
//! demand and keeps each instance in the store of its scope.

pub mod bridge;
pub mod config;
pub mod container;
pub mod context;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod reference;
pub mod registry;
pub mod scope;
pub mod source;
pub mod store;
pub mod wiring;

pub use container::{Container, ContainerBuilder, ScopedContext, prelude};
pub use definition::{BeanDefinition, Dependencies, DependencySite};
pub use error::{KhaznaError, Result};
pub use scope::ScopeKind;
pub use wiring::WiringMode;
