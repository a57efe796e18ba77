//! Opaque type descriptors.
//!
//! [`TypeDescriptor`] identifies the declared type of a bean or of a
//! dependency site. Descriptors compare by their fully qualified name only,
//! so a bean source can build them from text without any access to the
//! Rust type itself.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use khazna_support::naming::{bean_name_from_type, shorten_type_name, uncapitalize};

/// Identifies a type by its fully qualified name.
///
/// # Examples
/// ```
/// use khazna_container::descriptor::TypeDescriptor;
///
/// let key = TypeDescriptor::of::<String>();
/// assert_eq!(key.full_name(), "alloc::string::String");
/// assert_eq!(key.short_name(), "String");
///
/// // Built from text, e.g. by a bean source.
/// let parsed = TypeDescriptor::named("alloc::string::String");
/// assert_eq!(key, parsed);
/// ```
#[derive(Clone)]
pub struct TypeDescriptor {
    full_name: Cow<'static, str>,
}

impl TypeDescriptor {
    /// Creates a descriptor for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            full_name: Cow::Borrowed(type_name::<T>()),
        }
    }

    /// Creates a descriptor from a fully qualified name.
    pub fn named(full_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the type name with every module path stripped.
    pub fn short_name(&self) -> String {
        shorten_type_name(&self.full_name)
    }

    /// The reference token for the short-name strategy: `UserRepo` → `userRepo`.
    pub fn short_reference(&self) -> String {
        uncapitalize(&self.short_name())
    }

    /// The conventional bean name for this type.
    pub fn bean_name(&self, use_full_name: bool) -> String {
        bean_name_from_type(&self.full_name, use_full_name)
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self.full_name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}
