//! Wiring modes and the policy applied to unresolved dependencies.
//!
//! A bean's mode is fixed once, at registration: [`WiringMode::Default`]
//! becomes the container default there and is never looked at again.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KhaznaError, Result};

/// How a bean treats dependencies that do not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WiringMode {
    /// No dependency resolution at all.
    None,
    /// Every dependency must resolve, or the lookup fails.
    Strict,
    /// Unresolved dependencies are left unset.
    Optional,
    /// Unresolved dependencies are inferred by declared type.
    Autowire,
    /// Use the container default.
    Default,
}

impl WiringMode {
    /// Modes that may serve as a default or as the autowire fallback.
    #[inline]
    pub fn is_concrete_default(&self) -> bool {
        matches!(self, WiringMode::Strict | WiringMode::Optional | WiringMode::Autowire)
    }
}

impl fmt::Display for WiringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WiringMode::None => "none",
            WiringMode::Strict => "strict",
            WiringMode::Optional => "optional",
            WiringMode::Autowire => "autowire",
            WiringMode::Default => "default",
        };
        f.write_str(name)
    }
}

impl FromStr for WiringMode {
    type Err = KhaznaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(WiringMode::None),
            "strict" => Ok(WiringMode::Strict),
            "optional" => Ok(WiringMode::Optional),
            "autowire" => Ok(WiringMode::Autowire),
            "default" | "" => Ok(WiringMode::Default),
            _ => Err(KhaznaError::InvalidWiringMode {
                mode: s.to_string(),
                reason: "expected one of none, strict, optional, autowire, default",
            }),
        }
    }
}

/// Whether a dependency site found a bean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Resolved(String),
    Unresolved,
}

/// What the container does with a dependency site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Wire the named bean.
    Inject(String),
    /// Leave the site unset.
    Skip,
    /// Fail the lookup with `MissingDependency`.
    Fail,
    /// Try to infer a bean by type, then apply the fallback mode.
    InferByType,
}

/// Resolves effective wiring modes and per-site policies.
#[derive(Debug, Clone, Copy)]
pub struct WiringResolver {
    default_mode: WiringMode,
    autowire_fallback: WiringMode,
}

impl WiringResolver {
    /// Creates a resolver.
    ///
    /// # Errors
    /// [`KhaznaError::InvalidWiringMode`] if `default_mode` is NONE or DEFAULT,
    /// or if `autowire_fallback` is anything other than STRICT or OPTIONAL.
    pub fn new(default_mode: WiringMode, autowire_fallback: WiringMode) -> Result<Self> {
        if !default_mode.is_concrete_default() {
            return Err(KhaznaError::InvalidWiringMode {
                mode: default_mode.to_string(),
                reason: "the default wiring mode must be strict, optional or autowire",
            });
        }
        if !matches!(autowire_fallback, WiringMode::Strict | WiringMode::Optional) {
            return Err(KhaznaError::InvalidWiringMode {
                mode: autowire_fallback.to_string(),
                reason: "the autowire fallback must be strict or optional",
            });
        }
        Ok(Self {
            default_mode,
            autowire_fallback,
        })
    }

    /// The container default mode.
    pub fn default_mode(&self) -> WiringMode {
        self.default_mode
    }

    /// Maps DEFAULT to the container default; every other mode is kept.
    #[inline]
    pub fn resolve(&self, bean_mode: WiringMode) -> WiringMode {
        match bean_mode {
            WiringMode::Default => self.default_mode,
            other => other,
        }
    }

    /// Decides what happens to a site after name resolution.
    ///
    /// `mode` must already be effective (not DEFAULT). NONE never gets here:
    /// beans in that mode are not resolved at all.
    pub fn policy_for(&self, mode: WiringMode, outcome: Outcome) -> Policy {
        match (mode, outcome) {
            (WiringMode::None, _) => Policy::Skip,
            (_, Outcome::Resolved(name)) => Policy::Inject(name),
            (WiringMode::Strict, Outcome::Unresolved) => Policy::Fail,
            (WiringMode::Optional, Outcome::Unresolved) => Policy::Skip,
            (WiringMode::Autowire, Outcome::Unresolved) => Policy::InferByType,
            (WiringMode::Default, Outcome::Unresolved) => {
                self.policy_for(self.default_mode, Outcome::Unresolved)
            }
        }
    }

    /// Policy once type inference has run for an AUTOWIRE site.
    pub fn after_inference(&self, outcome: Outcome) -> Policy {
        self.policy_for(self.autowire_fallback, outcome)
    }
}

impl Default for WiringResolver {
    /// STRICT by default, OPTIONAL after failed inference.
    fn default() -> Self {
        Self {
            default_mode: WiringMode::Strict,
            autowire_fallback: WiringMode::Optional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> WiringResolver {
        WiringResolver::new(WiringMode::Strict, WiringMode::Optional).unwrap()
    }

    #[test]
    fn default_maps_to_container_default() {
        assert_eq!(resolver().resolve(WiringMode::Default), WiringMode::Strict);
        assert_eq!(resolver().resolve(WiringMode::Optional), WiringMode::Optional);
        assert_eq!(resolver().resolve(WiringMode::None), WiringMode::None);
    }

    #[test]
    fn none_and_default_rejected_as_default() {
        for bad in [WiringMode::None, WiringMode::Default] {
            let err = WiringResolver::new(bad, WiringMode::Optional).unwrap_err();
            assert!(matches!(err, KhaznaError::InvalidWiringMode { .. }));
        }
    }

    #[test]
    fn autowire_fallback_must_be_terminal() {
        assert!(WiringResolver::new(WiringMode::Strict, WiringMode::Autowire).is_err());
        assert!(WiringResolver::new(WiringMode::Strict, WiringMode::Strict).is_ok());
    }

    #[test]
    fn unresolved_policies() {
        let r = resolver();
        assert_eq!(r.policy_for(WiringMode::Strict, Outcome::Unresolved), Policy::Fail);
        assert_eq!(r.policy_for(WiringMode::Optional, Outcome::Unresolved), Policy::Skip);
        assert_eq!(
            r.policy_for(WiringMode::Autowire, Outcome::Unresolved),
            Policy::InferByType
        );
        assert_eq!(r.after_inference(Outcome::Unresolved), Policy::Skip);
    }

    #[test]
    fn resolved_always_injects() {
        let r = resolver();
        for mode in [WiringMode::Strict, WiringMode::Optional, WiringMode::Autowire] {
            assert_eq!(
                r.policy_for(mode, Outcome::Resolved("db".into())),
                Policy::Inject("db".into())
            );
        }
    }

    #[test]
    fn parse_modes() {
        assert_eq!("STRICT".parse::<WiringMode>().unwrap(), WiringMode::Strict);
        assert_eq!("".parse::<WiringMode>().unwrap(), WiringMode::Default);
        assert!(matches!(
            "sometimes".parse::<WiringMode>(),
            Err(KhaznaError::InvalidWiringMode { .. })
        ));
    }
}
