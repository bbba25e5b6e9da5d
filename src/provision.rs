//! The boundary with whatever actually creates the infrastructure.
//!
//! We hand a [`Provisioner`] the assembled topology and its rendered template
//! exactly once, and expect back either a value for every entity or a
//! failure. Retries, rollback and waiting are the provisioner's business.

use thiserror::Error;
use tracing::{info, info_span};

use crate::config::SiteConfig;
use crate::error::Result;
use crate::outputs::{export_outputs, ExportedOutput, ResolvedValues};
use crate::template::Template;
use crate::topology::{assemble, EntityId, Topology};

/// an opaque failure reported by the provisioner. Passed through untouched.
/// When the failure started as one of our own errors (eg: the asset
/// directory could not be scanned) it is kept as the `source`, so callers
/// can still downcast to it.
#[derive(Debug, Error)]
#[error("provisioning failed{}: {reason}", at_entity(.entity))]
pub struct ProvisionError {
    pub entity: Option<EntityId>,
    pub reason: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

fn at_entity(entity: &Option<EntityId>) -> String {
    match entity {
        Some(e) => format!(" at '{e}'"),
        None => String::new(),
    }
}

impl ProvisionError {
    pub fn new(reason: impl Into<String>) -> Self {
        ProvisionError { entity: None, reason: reason.into(), source: None }
    }

    pub fn at(entity: EntityId, reason: impl Into<String>) -> Self {
        ProvisionError { entity: Some(entity), reason: reason.into(), source: None }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// the crate error this failure started from, if any.
    pub fn crate_error(&self) -> Option<&crate::error::Error> {
        self.source.as_deref().and_then(|e| e.downcast_ref())
    }
}

pub struct StackDeployment<'a> {
    pub stack_name: &'a str,
    pub region: &'a str,
    pub topology: &'a Topology,
    pub template: &'a Template,
}

pub trait Provisioner {
    fn apply(&mut self, deployment: &StackDeployment<'_>) -> std::result::Result<ResolvedValues, ProvisionError>;
}

/// Everything up to, but not including, talking to a provisioner.
pub fn synthesize(config: &SiteConfig) -> Result<(Topology, Template)> {
    let topology = assemble(config)?;
    let template = Template::from_topology(&topology);
    Ok((topology, template))
}

/// assemble -> render -> apply -> export. Any failure aborts the whole
/// deployment; there is nothing partial worth publishing.
pub fn deploy<P: Provisioner + ?Sized>(config: &SiteConfig, provisioner: &mut P) -> Result<Vec<ExportedOutput>> {
    let span = info_span!("deploy", stack = %config.stack_name);
    let _enter = span.enter();

    let (topology, template) = synthesize(config)?;
    let order = topology.dependency_order()?;
    info!(order = ?order.iter().map(|id| id.as_str()).collect::<Vec<_>>(), "about to deploy stack");

    let deployment = StackDeployment {
        stack_name: topology.stack_name(),
        region: topology.region(),
        topology: &topology,
        template: &template,
    };
    let resolved = provisioner.apply(&deployment)?;
    export_outputs(&topology, &resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetManifest;
    use crate::error::Error;

    struct Failing;

    impl Provisioner for Failing {
        fn apply(&mut self, _: &StackDeployment<'_>) -> std::result::Result<ResolvedValues, ProvisionError> {
            Err(ProvisionError::at(EntityId::new("HttpsCertificate"), "validation timed out"))
        }
    }

    #[test]
    fn provisioner_failure_propagates_unchanged() {
        let conf = SiteConfig::new("/build/dist", Some("gyuri.org")).unwrap();
        match deploy(&conf, &mut Failing) {
            Err(Error::Provisioning(e)) => {
                assert_eq!(e.entity.as_ref().map(EntityId::as_str), Some("HttpsCertificate"));
                assert_eq!(e.to_string(), "provisioning failed at 'HttpsCertificate': validation timed out");
            }
            other => panic!("expected provisioning error, got {other:?}"),
        }
    }

    /// fails the same way the CloudFormation provisioner does when the build
    /// output is missing.
    struct MissingAssets;

    impl Provisioner for MissingAssets {
        fn apply(&mut self, deployment: &StackDeployment<'_>) -> std::result::Result<ResolvedValues, ProvisionError> {
            let store = deployment.topology.origin_store().ok_or_else(|| ProvisionError::new("no origin store"))?;
            let manifest = AssetManifest::scan(&store.asset_source)
                .map_err(|e| ProvisionError::at(store.id.clone(), e.to_string()).with_source(e))?;
            panic!("scan of a missing directory returned {} objects", manifest.objects.len());
        }
    }

    #[test]
    fn asset_failure_stays_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("dist");
        let conf = SiteConfig::new(missing.to_str().unwrap(), None).unwrap();
        match deploy(&conf, &mut MissingAssets) {
            Err(Error::Provisioning(e)) => {
                assert_eq!(e.entity.as_ref().map(EntityId::as_str), Some("StaticSiteBucket"));
                assert!(matches!(e.crate_error(), Some(Error::Asset { .. })), "{e:?}");
                assert!(std::error::Error::source(&e).is_some());
            }
            other => panic!("expected provisioning error, got {other:?}"),
        }
    }

    #[test]
    fn engine_failure_has_no_crate_source() {
        let e = ProvisionError::new("throttled");
        assert!(e.crate_error().is_none());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn opaque_error_display() {
        assert_eq!(ProvisionError::new("throttled").to_string(), "provisioning failed: throttled");
    }
}
