//! Wiring plans and dependency graph validation.
//!
//! Before a bean is instantiated its wiring plan is computed: which bean
//! each dependency site resolves to, and whether the edge is injected
//! directly or bridged. Planning walks direct edges depth-first, keeping
//! the current path to detect cycles, and finishes before any factory runs.
//!
//! Bridged edges are not followed: the forwarding handle plans its target
//! lazily, on first access.

use std::sync::Arc;

use dashmap::DashMap;
use khazna_support::rendering::suggest_similar;
use tracing::{trace, warn};

use crate::bridge::{Bridging, ScopeBridge};
use crate::definition::DependencySite;
use crate::error::{
    AmbiguousDependencyError, CyclicDependencyError, KhaznaError, MissingDependencyError,
    NotRegisteredError, Result,
};
use crate::reference::ReferenceResolver;
use crate::registry::{BeanRegistry, RegisteredBean};
use crate::scope::ScopeKind;
use crate::wiring::{Outcome, Policy, WiringMode};

const MAX_SUGGESTIONS: usize = 3;

/// One resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdge {
    /// Site key inside the consumer's dependencies
    pub site: String,
    /// Bean wired at the site
    pub target: String,
    pub bridging: Bridging,
}

/// How one bean gets wired. Skipped sites have no edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringPlan {
    pub bean: String,
    pub scope: ScopeKind,
    pub edges: Vec<PlannedEdge>,
}

/// Computes and caches wiring plans.
///
/// # Algorithm
/// Depth-first over direct edges. A name found on the current path is a
/// cycle; a cached plan is known acyclic from its bean down and is not
/// walked again. Plans are cached only once complete.
pub(crate) struct Planner<'a> {
    registry: &'a BeanRegistry,
    references: &'a ReferenceResolver,
    bridge: &'a ScopeBridge,
    plans: &'a DashMap<String, Arc<WiringPlan>>,
    path: Vec<String>,
}

impl<'a> Planner<'a> {
    pub fn new(
        registry: &'a BeanRegistry,
        references: &'a ReferenceResolver,
        bridge: &'a ScopeBridge,
        plans: &'a DashMap<String, Arc<WiringPlan>>,
    ) -> Self {
        Self {
            registry,
            references,
            bridge,
            plans,
            path: Vec::new(),
        }
    }

    /// Returns the plan of `name`, computing it (and every plan it reaches
    /// through direct edges) if needed.
    ///
    /// # Errors
    /// - [`KhaznaError::NotRegistered`] if `name` is unknown
    /// - [`KhaznaError::CyclicDependency`] if `name` reaches itself
    /// - [`KhaznaError::MissingDependency`], [`KhaznaError::AmbiguousDependency`]
    ///   and [`KhaznaError::MixedScopeViolation`] from any site on the way
    pub fn plan(&mut self, name: &str) -> Result<Arc<WiringPlan>> {
        if let Some(plan) = self.plans.get(name) {
            return Ok(plan.clone());
        }

        if let Some(start) = self.path.iter().position(|n| n == name) {
            let mut chain = self.path[start..].to_vec();
            chain.push(name.to_string());
            warn!(cycle = ?chain, "Cyclic dependency detected");
            return Err(KhaznaError::CyclicDependency(CyclicDependencyError { chain }));
        }

        let registry = self.registry;
        let bean = registry
            .get(name)
            .ok_or_else(|| self.not_registered(name))?;

        self.path.push(name.to_string());
        let edges = self.plan_edges(bean);
        self.path.pop();

        let plan = Arc::new(WiringPlan {
            bean: name.to_string(),
            scope: bean.scope().clone(),
            edges: edges?,
        });
        trace!(bean = name, edges = plan.edges.len(), "Wiring plan computed");
        self.plans.insert(name.to_string(), plan.clone());
        Ok(plan)
    }

    fn plan_edges(&mut self, bean: &'a RegisteredBean) -> Result<Vec<PlannedEdge>> {
        let definition = bean.definition();
        if bean.mode() == WiringMode::None {
            return Ok(Vec::new());
        }

        let registry = self.registry;
        let wiring = registry.wiring();
        let mut edges = Vec::with_capacity(definition.sites().len());

        for site in definition.sites() {
            let resolution = self.references.resolve(site, registry);
            let mut policy = wiring.policy_for(bean.mode(), resolution.outcome);
            if policy == Policy::InferByType {
                policy = wiring.after_inference(self.infer_by_type(definition.name(), site)?);
            }

            let target = match policy {
                Policy::Inject(target) => target,
                Policy::Fail => {
                    return Err(KhaznaError::MissingDependency(MissingDependencyError {
                        bean: definition.name().to_string(),
                        site: site.key().to_string(),
                        tried: resolution.tried,
                    }));
                }
                Policy::Skip | Policy::InferByType => {
                    trace!(bean = definition.name(), site = site.key(), "Site left unset");
                    continue;
                }
            };

            let dependency = registry
                .get(&target)
                .ok_or_else(|| self.not_registered(&target))?;
            let bridging = self.bridge.classify(
                definition.name(),
                bean.scope(),
                &target,
                dependency.scope(),
            )?;
            if bridging == Bridging::Direct {
                self.plan(&target)?;
            }

            edges.push(PlannedEdge {
                site: site.key().to_string(),
                target,
                bridging,
            });
        }
        Ok(edges)
    }

    /// The single bean other than `consumer` matching the site's declared type.
    fn infer_by_type(&self, consumer: &str, site: &DependencySite) -> Result<Outcome> {
        let Some(ty) = site.declared_type() else {
            return Ok(Outcome::Unresolved);
        };

        let mut candidates = self.registry.beans_of_type(ty);
        candidates.retain(|name| name != consumer);

        match candidates.len() {
            0 => Ok(Outcome::Unresolved),
            1 => Ok(Outcome::Resolved(candidates.remove(0))),
            _ => Err(KhaznaError::AmbiguousDependency(AmbiguousDependencyError {
                bean: consumer.to_string(),
                site: site.key().to_string(),
                type_name: ty.full_name().to_string(),
                candidates,
            })),
        }
    }

    fn not_registered(&self, name: &str) -> KhaznaError {
        let names = self.registry.names();
        KhaznaError::NotRegistered(NotRegisteredError {
            name: name.to_string(),
            suggestions: suggest_similar(name, &names, MAX_SUGGESTIONS),
        })
    }
}
