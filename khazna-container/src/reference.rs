//! Reference resolution for dependency sites without an explicit bean name.
//!
//! Each [`ReferenceKind`] turns a site into one candidate bean name. The
//! resolver tries the configured kinds in order and stops at the first
//! candidate that names a registered bean.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::definition::DependencySite;
use crate::registry::BeanRegistry;
use crate::wiring::Outcome;

/// A strategy for deriving a bean name from a dependency site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The site key itself, e.g. `userRepo`.
    Name,
    /// The uncapitalized short type name, e.g. `UserRepo` → `userRepo`.
    TypeShortName,
    /// The fully qualified type name, e.g. `app::repo::UserRepo`.
    TypeFullName,
}

impl ReferenceKind {
    /// The conventional lookup order.
    pub const DEFAULT_ORDER: [ReferenceKind; 3] = [
        ReferenceKind::Name,
        ReferenceKind::TypeShortName,
        ReferenceKind::TypeFullName,
    ];
}

/// Outcome of name resolution for one site, with every name tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub tried: Vec<String>,
}

/// Produces and checks candidate bean names for dependency sites.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    order: Vec<ReferenceKind>,
    resolve_implicit: bool,
    use_full_type_names: bool,
}

impl ReferenceResolver {
    pub fn new(order: Vec<ReferenceKind>, resolve_implicit: bool, use_full_type_names: bool) -> Self {
        Self {
            order,
            resolve_implicit,
            use_full_type_names,
        }
    }

    /// Candidate bean names for `site`, in priority order, without duplicates.
    ///
    /// An explicit reference is the only candidate. Implicit candidates are
    /// produced only when reference-parameter resolution is enabled; the
    /// type strategies need a declared type.
    pub fn candidates(&self, site: &DependencySite) -> Vec<String> {
        if let Some(explicit) = site.explicit_reference() {
            return vec![explicit.to_string()];
        }
        if !self.resolve_implicit {
            return Vec::new();
        }

        let mut names: Vec<String> = Vec::with_capacity(self.order.len());
        for kind in &self.order {
            let candidate = match kind {
                ReferenceKind::Name => Some(site.key().to_string()),
                ReferenceKind::TypeShortName => site.declared_type().map(|ty| {
                    if self.use_full_type_names {
                        ty.full_name().to_string()
                    } else {
                        ty.short_reference()
                    }
                }),
                ReferenceKind::TypeFullName => {
                    site.declared_type().map(|ty| ty.full_name().to_string())
                }
            };
            if let Some(candidate) = candidate {
                if !names.contains(&candidate) {
                    names.push(candidate);
                }
            }
        }
        names
    }

    /// Resolves `site` against `registry`: the first candidate that is a
    /// registered bean name wins.
    pub fn resolve(&self, site: &DependencySite, registry: &BeanRegistry) -> Resolution {
        let tried = self.candidates(site);
        let outcome = tried
            .iter()
            .find(|name| registry.contains(name))
            .map(|name| Outcome::Resolved(name.clone()))
            .unwrap_or(Outcome::Unresolved);

        trace!(site = site.key(), ?outcome, tried = ?tried, "Resolved reference");
        Resolution { outcome, tried }
    }
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::new(ReferenceKind::DEFAULT_ORDER.to_vec(), true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::BeanDefinition;

    mod app {
        pub struct UserRepo;
    }

    fn registry_with(names: &[&str]) -> BeanRegistry {
        let mut registry = BeanRegistry::default();
        for name in names {
            registry
                .register(BeanDefinition::value(*name, 0u8))
                .unwrap();
        }
        registry
    }

    fn repo_site() -> DependencySite {
        DependencySite::new("repo").typed::<app::UserRepo>()
    }

    #[test]
    fn default_order_candidates() {
        let resolver = ReferenceResolver::default();
        let names = resolver.candidates(&repo_site());
        assert_eq!(names[0], "repo");
        assert_eq!(names[1], "userRepo");
        assert!(names[2].ends_with("app::UserRepo"));
    }

    #[test]
    fn explicit_reference_is_sole_candidate() {
        let resolver = ReferenceResolver::default();
        let site = repo_site().reference("primaryRepo");
        assert_eq!(resolver.candidates(&site), vec!["primaryRepo".to_string()]);
    }

    #[test]
    fn first_registered_candidate_wins() {
        let resolver = ReferenceResolver::default();
        let registry = registry_with(&["userRepo", "repo"]);
        let resolution = resolver.resolve(&repo_site(), &registry);
        assert_eq!(resolution.outcome, Outcome::Resolved("repo".into()));
    }

    #[test]
    fn custom_order_is_respected() {
        let resolver = ReferenceResolver::new(
            vec![ReferenceKind::TypeShortName, ReferenceKind::Name],
            true,
            false,
        );
        let registry = registry_with(&["userRepo", "repo"]);
        let resolution = resolver.resolve(&repo_site(), &registry);
        assert_eq!(resolution.outcome, Outcome::Resolved("userRepo".into()));
    }

    #[test]
    fn full_type_names_replace_short_names() {
        let resolver = ReferenceResolver::new(vec![ReferenceKind::TypeShortName], true, true);
        let names = resolver.candidates(&repo_site());
        assert_eq!(names.len(), 1);
        assert!(names[0].contains("::"));
    }

    #[test]
    fn implicit_resolution_can_be_disabled() {
        let resolver = ReferenceResolver::new(ReferenceKind::DEFAULT_ORDER.to_vec(), false, false);
        let registry = registry_with(&["repo"]);
        let resolution = resolver.resolve(&repo_site(), &registry);
        assert_eq!(resolution.outcome, Outcome::Unresolved);
        assert!(resolution.tried.is_empty());

        let explicit = resolver.resolve(&repo_site().reference("repo"), &registry);
        assert_eq!(explicit.outcome, Outcome::Resolved("repo".into()));
    }

    #[test]
    fn untyped_site_only_tries_name() {
        let resolver = ReferenceResolver::default();
        assert_eq!(
            resolver.candidates(&DependencySite::new("clock")),
            vec!["clock".to_string()]
        );
    }
}
