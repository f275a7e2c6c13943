//! The engine-aware runtime resolver.
//!
//! Translates a declarative [`ComponentRef`] plus an engine name into an
//! invocable component, with identity verification. Resolution is a pure
//! lookup over an explicit registry populated at process startup; there is
//! no dynamic loading, and identical `(path, engine, version)` inputs give
//! identical results for the registry's lifetime.
//!
//! Path classification:
//! - a path beginning with a version segment (`v<digit>…`) is
//!   **engine-relative** and is expanded through the engine → base-namespace
//!   table (`v1.csv_parser.run` + engine `local` →
//!   `engines.curation.local.v1.csv_parser.run`)
//! - any other path is treated as fully qualified, with legacy `lib.`
//!   prefixes remapped for backward compatibility
//!
//! [`ComponentRef`]: strata_manifest::ComponentRef

use std::collections::HashMap;
use std::sync::Arc;

use strata_manifest::ComponentRef;

use crate::component::Component;
use crate::error::{Result, RuntimeError};

/// Base namespace of the built-in in-process engine.
pub const LOCAL_ENGINE_BASE: &str = "engines.curation.local";

/// Registry mapping engine names to base namespaces and fully qualified
/// paths to component implementations.
///
/// Populated once at startup; the resolver only reads it.
#[derive(Default)]
pub struct EngineRegistry {
    base_paths: HashMap<String, String>,
    components: HashMap<String, Arc<dyn Component>>,
}

impl EngineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an engine name with its base namespace.
    ///
    /// Registering an existing name re-points it; engine names are data and
    /// aliases are legitimate (two names may share one base).
    pub fn register_engine(&mut self, name: &str, base_path: &str) {
        self.base_paths
            .insert(name.to_string(), base_path.to_string());
    }

    /// Registers a component at a fully qualified path.
    pub fn register_component(&mut self, path: &str, component: Arc<dyn Component>) {
        self.components.insert(path.to_string(), component);
    }

    /// Returns the base namespace for an engine, if registered.
    #[must_use]
    pub fn engine_base(&self, engine: &str) -> Option<&str> {
        self.base_paths.get(engine).map(String::as_str)
    }

    /// Returns the registered engine names, sorted.
    #[must_use]
    pub fn engine_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.base_paths.keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks up a component at a fully qualified path.
    #[must_use]
    pub fn component(&self, path: &str) -> Option<Arc<dyn Component>> {
        self.components.get(path).cloned()
    }
}

/// A successfully resolved and validated component.
pub struct ResolvedComponent {
    /// The fully qualified path the reference resolved to.
    pub path: String,
    /// The version the component declares (equal to the requested version
    /// after validation).
    pub version: String,
    /// The invocable unit.
    pub component: Arc<dyn Component>,
}

impl std::fmt::Debug for ResolvedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedComponent")
            .field("path", &self.path)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// The runtime resolver.
#[derive(Clone)]
pub struct RuntimeResolver {
    registry: Arc<EngineRegistry>,
}

impl RuntimeResolver {
    /// Creates a resolver over a populated registry.
    #[must_use]
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self { registry }
    }

    /// Access to the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Resolves a component reference under an engine and validates the
    /// component's identity metadata against the manifest's request.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ResolutionFailure`] for an unknown engine or an
    ///   address with no registered component
    /// - [`RuntimeError::GovernanceFailure`] for a component with missing
    ///   identity metadata
    /// - [`RuntimeError::VersionMismatch`] when the declared and requested
    ///   versions disagree
    pub fn resolve_and_validate(
        &self,
        component_ref: &ComponentRef,
        engine: &str,
    ) -> Result<ResolvedComponent> {
        let path = &component_ref.path;

        let resolved = if is_engine_relative(path) {
            let Some(base) = self.registry.engine_base(engine) else {
                return Err(RuntimeError::ResolutionFailure {
                    path: path.clone(),
                    resolved: path.clone(),
                    engine: engine.to_string(),
                    reason: format!(
                        "unknown engine type (registered: {:?})",
                        self.registry.engine_names()
                    ),
                });
            };
            format!("{base}.{path}")
        } else {
            remap_legacy(path)
        };

        let Some(component) = self.registry.component(&resolved) else {
            return Err(RuntimeError::ResolutionFailure {
                path: path.clone(),
                resolved,
                engine: engine.to_string(),
                reason: "no component registered at this address".to_string(),
            });
        };

        let descriptor = component.descriptor();
        if descriptor.version.trim().is_empty() || descriptor.interface.trim().is_empty() {
            return Err(RuntimeError::GovernanceFailure { path: resolved });
        }

        if descriptor.version != component_ref.version {
            return Err(RuntimeError::VersionMismatch {
                path: resolved,
                requested: component_ref.version.clone(),
                declared: descriptor.version.to_string(),
            });
        }

        tracing::info!(
            path = %path,
            resolved = %resolved,
            version = %descriptor.version,
            engine = %engine,
            "component bound"
        );

        Ok(ResolvedComponent {
            path: resolved,
            version: descriptor.version.to_string(),
            component,
        })
    }
}

/// Engine-relative paths start with `v` followed by a digit (`v1.`, `v2.`).
fn is_engine_relative(path: &str) -> bool {
    let mut chars = path.chars();
    chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// Remaps legacy `lib.*` paths onto the current namespace layout.
fn remap_legacy(path: &str) -> String {
    if let Some(suffix) = path.strip_prefix("lib.engines.curation.") {
        return format!("{LOCAL_ENGINE_BASE}.{suffix}");
    }
    if let Some(suffix) = path.strip_prefix("lib.") {
        return format!("engines.{suffix}");
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentDescriptor, StepOutcome};
    use crate::context::ExecutionContext;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct FixedComponent {
        version: &'static str,
        interface: &'static str,
    }

    #[async_trait]
    impl Component for FixedComponent {
        fn descriptor(&self) -> ComponentDescriptor {
            ComponentDescriptor {
                version: self.version,
                interface: self.interface,
            }
        }

        async fn invoke(
            &self,
            _ctx: &mut ExecutionContext,
            _params: &Map<String, Value>,
        ) -> Result<StepOutcome> {
            Ok(StepOutcome::new("NOOP"))
        }
    }

    fn registry() -> Arc<EngineRegistry> {
        let mut registry = EngineRegistry::new();
        registry.register_engine("local", LOCAL_ENGINE_BASE);
        registry.register_component(
            "engines.curation.local.v1.csv_parser.run",
            Arc::new(FixedComponent {
                version: "1.0.0",
                interface: "strata.interfaces.parse.v1",
            }),
        );
        registry.register_component(
            "engines.curation.local.v1.unregistered.run",
            Arc::new(FixedComponent {
                version: "",
                interface: "",
            }),
        );
        Arc::new(registry)
    }

    fn reference(path: &str, version: &str) -> ComponentRef {
        ComponentRef {
            path: path.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn engine_relative_path_expands_through_base() {
        let resolver = RuntimeResolver::new(registry());
        let resolved = resolver
            .resolve_and_validate(&reference("v1.csv_parser.run", "1.0.0"), "local")
            .expect("resolve");
        assert_eq!(resolved.path, "engines.curation.local.v1.csv_parser.run");
        assert_eq!(resolved.version, "1.0.0");
    }

    #[test]
    fn fully_qualified_path_bypasses_expansion() {
        let resolver = RuntimeResolver::new(registry());
        let resolved = resolver
            .resolve_and_validate(
                &reference("engines.curation.local.v1.csv_parser.run", "1.0.0"),
                "local",
            )
            .expect("resolve");
        assert_eq!(resolved.path, "engines.curation.local.v1.csv_parser.run");
    }

    #[test]
    fn legacy_prefix_is_remapped() {
        let resolver = RuntimeResolver::new(registry());
        let resolved = resolver
            .resolve_and_validate(&reference("lib.engines.curation.v1.csv_parser.run", "1.0.0"), "local")
            .expect("resolve");
        assert_eq!(resolved.path, "engines.curation.local.v1.csv_parser.run");
    }

    #[test]
    fn unknown_engine_is_a_resolution_failure() {
        let resolver = RuntimeResolver::new(registry());
        let err = resolver
            .resolve_and_validate(&reference("v1.csv_parser.run", "1.0.0"), "distributed")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ResolutionFailure { .. }));
        assert!(err.to_string().contains("unknown engine"));
    }

    #[test]
    fn unknown_address_is_a_resolution_failure() {
        let resolver = RuntimeResolver::new(registry());
        let err = resolver
            .resolve_and_validate(&reference("v1.missing_component.run", "1.0.0"), "local")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ResolutionFailure { .. }));
    }

    #[test]
    fn version_mismatch_never_silently_substitutes() {
        let resolver = RuntimeResolver::new(registry());
        let err = resolver
            .resolve_and_validate(&reference("v1.csv_parser.run", "2.0.0"), "local")
            .unwrap_err();
        match err {
            RuntimeError::VersionMismatch {
                requested,
                declared,
                ..
            } => {
                assert_eq!(requested, "2.0.0");
                assert_eq!(declared, "1.0.0");
            }
            other => panic!("expected VersionMismatch, got {other}"),
        }
    }

    #[test]
    fn empty_metadata_is_a_governance_failure() {
        let resolver = RuntimeResolver::new(registry());
        let err = resolver
            .resolve_and_validate(&reference("v1.unregistered.run", "1.0.0"), "local")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::GovernanceFailure { .. }));
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = RuntimeResolver::new(registry());
        let reference = reference("v1.csv_parser.run", "1.0.0");
        let first = resolver.resolve_and_validate(&reference, "local").unwrap();
        let second = resolver.resolve_and_validate(&reference, "local").unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(first.version, second.version);
    }
}
