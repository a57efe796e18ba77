//! Container configuration.
//!
//! [`ContainerConfig`] can be built in code or deserialized; either way it
//! is validated before a builder accepts it.
//!
//! ```
//! use khazna_container::config::ContainerConfig;
//! use khazna_container::scope::ScopeKind;
//! use khazna_container::wiring::WiringMode;
//!
//! let mut config = ContainerConfig::default();
//! config.set_default_scope(ScopeKind::Prototype).unwrap();
//! assert!(config.set_default_wiring_mode(WiringMode::Default).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{InvalidScopeError, KhaznaError, Result};
use crate::reference::{ReferenceKind, ReferenceResolver};
use crate::scope::ScopeKind;
use crate::wiring::{WiringMode, WiringResolver};

/// Governs injection of a bean into a consumer whose scope does not accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MixedScopePolicy {
    /// Inject forwarding handles instead of instances.
    pub bridge_enabled: bool,
    /// Report the injection as an error (or a warning when bridged).
    pub detect_as_error: bool,
}

/// Every recognised container option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Scope for beans that declare none. Must be concrete.
    pub default_scope: ScopeKind,
    /// Mode for beans declaring DEFAULT. Never NONE or DEFAULT.
    pub default_wiring_mode: WiringMode,
    /// Mode applied after autowiring found no candidate: STRICT or OPTIONAL.
    pub autowire_fallback: WiringMode,
    /// Fail on re-registration instead of replacing. On by default; turn it
    /// off for last-registration-wins.
    pub detect_duplicate_names: bool,
    /// Resolve implicit references through the reference strategies.
    pub resolve_reference_parameters: bool,
    /// Type-based references use full type names.
    pub use_full_type_names: bool,
    /// Reference strategies, in priority order.
    pub lookup_references: Vec<ReferenceKind>,
    /// Bridge mixed scopes with forwarding handles. Needs a proxy capability.
    pub wire_scoped_proxy: bool,
    /// Treat mixed scopes as errors (or warnings when bridged).
    pub detect_mixed_scopes: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            default_scope: ScopeKind::Singleton,
            default_wiring_mode: WiringMode::Strict,
            autowire_fallback: WiringMode::Optional,
            detect_duplicate_names: true,
            resolve_reference_parameters: true,
            use_full_type_names: false,
            lookup_references: ReferenceKind::DEFAULT_ORDER.to_vec(),
            wire_scoped_proxy: false,
            detect_mixed_scopes: false,
        }
    }
}

impl ContainerConfig {
    /// Sets the default scope.
    ///
    /// # Errors
    /// [`KhaznaError::InvalidScope`] for the abstract `Default` marker.
    pub fn set_default_scope(&mut self, scope: ScopeKind) -> Result<()> {
        check_default_scope(&scope)?;
        self.default_scope = scope;
        Ok(())
    }

    /// Sets the default wiring mode.
    ///
    /// # Errors
    /// [`KhaznaError::InvalidWiringMode`] for NONE or DEFAULT.
    pub fn set_default_wiring_mode(&mut self, mode: WiringMode) -> Result<()> {
        WiringResolver::new(mode, self.autowire_fallback)?;
        self.default_wiring_mode = mode;
        Ok(())
    }

    /// Checks every option. Custom default scopes are checked later, when
    /// a bean falls back to them, since scopes are registered after config.
    pub fn validate(&self) -> Result<()> {
        check_default_scope(&self.default_scope)?;
        self.wiring_resolver()?;
        Ok(())
    }

    pub fn mixed_scope_policy(&self) -> MixedScopePolicy {
        MixedScopePolicy {
            bridge_enabled: self.wire_scoped_proxy,
            detect_as_error: self.detect_mixed_scopes,
        }
    }

    pub(crate) fn wiring_resolver(&self) -> Result<WiringResolver> {
        WiringResolver::new(self.default_wiring_mode, self.autowire_fallback)
    }

    pub(crate) fn reference_resolver(&self) -> ReferenceResolver {
        ReferenceResolver::new(
            self.lookup_references.clone(),
            self.resolve_reference_parameters,
            self.use_full_type_names,
        )
    }
}

fn check_default_scope(scope: &ScopeKind) -> Result<()> {
    if scope.is_concrete() {
        return Ok(());
    }
    Err(KhaznaError::InvalidScope(InvalidScopeError {
        scope: scope.to_string(),
        bean: None,
        reason: "the default scope must be a concrete scope",
    }))
}
