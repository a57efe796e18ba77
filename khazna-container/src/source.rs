//! Bean sources: modules that feed definitions into a builder.
//!
//! The container never discovers beans on its own. Whatever knows about
//! them, be it hand-written registration code or a loader for pre-parsed
//! descriptors, implements [`BeanSource`] and pushes definitions into a
//! [`DefinitionSink`].
//!
//! # Examples
//! ```
//! use khazna_container::prelude::*;
//!
//! struct Storage;
//!
//! impl BeanSource for Storage {
//!     fn register(&self, sink: &mut dyn DefinitionSink) -> Result<()> {
//!         sink.add_scope("tenant")?;
//!         sink.add_definition(
//!             BeanDefinition::value("dsn", String::from("postgres://localhost"))
//!                 .parse_scope("tenant")?,
//!         )
//!     }
//! }
//!
//! let container = Container::builder().add_source(&Storage).unwrap().build().unwrap();
//! assert!(container.contains("dsn"));
//! ```

use crate::definition::BeanDefinition;
use crate::descriptor::TypeDescriptor;
use crate::error::Result;

/// A group of related bean definitions.
///
/// Split registrations by concern, one source per module, instead of one
/// long registration block.
pub trait BeanSource: Send + Sync {
    /// Pushes this source's definitions into `sink`.
    ///
    /// Called once, while the container is being built. The first error
    /// aborts the source; definitions already added stay registered.
    fn register(&self, sink: &mut dyn DefinitionSink) -> Result<()>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The registration surface a [`BeanSource`] sees.
pub trait DefinitionSink {
    /// Registers one definition, with the same checks as
    /// [`ContainerBuilder::register`](crate::container::ContainerBuilder::register).
    fn add_definition(&mut self, definition: BeanDefinition) -> Result<()>;

    /// Registers a custom contextual scope by name.
    fn add_scope(&mut self, scope: &str) -> Result<()>;

    /// The bean name the container derives from a type.
    fn bean_name_for(&self, ty: &TypeDescriptor) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KhaznaError;

    #[derive(Default)]
    struct RecordingSink {
        names: Vec<String>,
        scopes: Vec<String>,
    }

    impl DefinitionSink for RecordingSink {
        fn add_definition(&mut self, definition: BeanDefinition) -> Result<()> {
            self.names.push(definition.name().to_string());
            Ok(())
        }

        fn add_scope(&mut self, scope: &str) -> Result<()> {
            self.scopes.push(scope.to_string());
            Ok(())
        }

        fn bean_name_for(&self, ty: &TypeDescriptor) -> String {
            ty.bean_name(false)
        }
    }

    struct Clock;

    struct InfraSource;

    impl BeanSource for InfraSource {
        fn register(&self, sink: &mut dyn DefinitionSink) -> Result<()> {
            sink.add_scope("tenant")?;
            let clock = sink.bean_name_for(&TypeDescriptor::of::<Clock>());
            sink.add_definition(BeanDefinition::new(clock, |_| Ok(Clock)))?;
            sink.add_definition(BeanDefinition::value("retries", 3u32).parse_wiring("none")?)
        }
    }

    struct BrokenSource;

    impl BeanSource for BrokenSource {
        fn register(&self, sink: &mut dyn DefinitionSink) -> Result<()> {
            sink.add_definition(BeanDefinition::value("ok", 1u8))?;
            sink.add_definition(BeanDefinition::value("bad", 1u8).parse_wiring("sometimes")?)
        }
    }

    #[test]
    fn source_pushes_definitions() {
        let mut sink = RecordingSink::default();
        InfraSource.register(&mut sink).unwrap();
        assert_eq!(sink.names, vec!["clock", "retries"]);
        assert_eq!(sink.scopes, vec!["tenant"]);
    }

    #[test]
    fn source_stops_at_first_error() {
        let mut sink = RecordingSink::default();
        let err = BrokenSource.register(&mut sink).unwrap_err();
        assert!(matches!(err, KhaznaError::InvalidWiringMode { .. }));
        assert_eq!(sink.names, vec!["ok"]);
    }

    #[test]
    fn source_has_name() {
        assert!(InfraSource.name().contains("InfraSource"));
    }
}
