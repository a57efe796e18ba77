//! # Khazna: a named-bean container for Rust
//!
//! Register beans by name with explicit factories, give each a scope
//! (singleton, prototype, session, request, thread or a custom one) and a
//! wiring mode, then look them up from any thread.
//!
//! ```
//! use khazna::prelude::*;
//! use std::sync::Arc;
//!
//! struct Clock;
//! struct Greeter { clock: Arc<Clock> }
//!
//! let container = Container::builder()
//!     .register(BeanDefinition::new("clock", |_| Ok(Clock)))?
//!     .register(
//!         BeanDefinition::new("greeter", |deps| Ok(Greeter { clock: deps.get("clock")? }))
//!             .depends_on(DependencySite::new("clock")),
//!     )?
//!     .build()?;
//!
//! let greeter: Arc<Greeter> = container.get("greeter")?;
//! assert!(Arc::ptr_eq(&greeter.clock, &container.get::<Clock>("clock")?));
//! # Ok::<(), KhaznaError>(())
//! ```

pub use khazna_container::*;
pub use khazna_support as support;
