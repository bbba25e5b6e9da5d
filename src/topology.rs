//! Turns a [`SiteConfig`] into the full set of resource descriptors and the
//! reference edges between them.
//!
//! Assembly is pure: nothing here talks to AWS. The same config always
//! produces the same topology, entity for entity and edge for edge.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{SiteConfig, SiteVariant};
use crate::error::{Error, Result};
use crate::resources::*;

/// logical id of an entity. Doubles as the CloudFormation logical resource id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::new(s)
    }
}

/// the part an entity plays in the site. Each role appears at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EntityRole {
    OriginStore,
    Distributor,
    HostedZone,
    Certificate,
    ApexAlias,
    WwwAlias,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Entity {
    OriginStore(OriginStore),
    Distributor(Distributor),
    HostedZone(HostedZone),
    Certificate(Certificate),
    AliasRecord(AliasRecord),
}

impl Entity {
    pub fn id(&self) -> &EntityId {
        match self {
            Entity::OriginStore(e) => &e.id,
            Entity::Distributor(e) => &e.id,
            Entity::HostedZone(e) => &e.id,
            Entity::Certificate(e) => &e.id,
            Entity::AliasRecord(e) => &e.id,
        }
    }

    pub fn role(&self) -> EntityRole {
        match self {
            Entity::OriginStore(_) => EntityRole::OriginStore,
            Entity::Distributor(_) => EntityRole::Distributor,
            Entity::HostedZone(_) => EntityRole::HostedZone,
            Entity::Certificate(_) => EntityRole::Certificate,
            Entity::AliasRecord(r) => match r.kind {
                AliasKind::Apex => EntityRole::ApexAlias,
                AliasKind::Www => EntityRole::WwwAlias,
            },
        }
    }

    /// every other entity this one needs to exist first.
    pub fn references(&self) -> Vec<(&EntityId, EdgeKind)> {
        match self {
            Entity::OriginStore(_) | Entity::HostedZone(_) => vec![],
            Entity::Distributor(d) => {
                let mut refs = vec![(&d.origin, EdgeKind::Origin)];
                if let Some(cert) = &d.certificate {
                    refs.push((cert, EdgeKind::Certificate));
                }
                refs
            }
            Entity::Certificate(c) => vec![(&c.zone, EdgeKind::ValidationZone)],
            Entity::AliasRecord(r) => vec![(&r.zone, EdgeKind::RecordZone), (&r.target, EdgeKind::AliasTarget)],
        }
    }

    pub fn as_cfn(&self) -> &dyn CfnResource {
        match self {
            Entity::OriginStore(e) => e,
            Entity::Distributor(e) => e,
            Entity::HostedZone(e) => e,
            Entity::Certificate(e) => e,
            Entity::AliasRecord(e) => e,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EdgeKind {
    /// distributor -> origin store
    Origin,
    /// distributor -> certificate
    Certificate,
    /// certificate -> hosted zone
    ValidationZone,
    /// alias record -> hosted zone
    RecordZone,
    /// alias record -> distributor
    AliasTarget,
}

impl EdgeKind {
    fn target_role_ok(&self, role: EntityRole) -> bool {
        match self {
            EdgeKind::Origin => role == EntityRole::OriginStore,
            EdgeKind::Certificate => role == EntityRole::Certificate,
            EdgeKind::ValidationZone | EdgeKind::RecordZone => role == EntityRole::HostedZone,
            EdgeKind::AliasTarget => role == EntityRole::Distributor,
        }
    }
}

/// `from` depends on `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: EntityId,
    pub to: EntityId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    stack_name: String,
    region: String,
    entities: Vec<Entity>,
    edges: Vec<Edge>,
}

/// Builds every descriptor the config calls for. Always exactly one origin
/// store and one distributor; the hosted zone, certificate and the two alias
/// records only exist for a custom domain.
pub fn assemble(config: &SiteConfig) -> Result<Topology> {
    let store = OriginStore {
        id: EntityId::new(BUCKET_LOGICAL_ID),
        index_document: config.index_document.clone(),
        error_document: config.error_document.clone(),
        public_read: true,
        asset_source: config.asset_path.clone(),
    };
    let mut distributor = Distributor {
        id: EntityId::new(DISTRIBUTION_LOGICAL_ID),
        origin: store.id.clone(),
        viewer_policy: ViewerPolicy::RedirectHttps,
        domain_names: BTreeSet::new(),
        certificate: None,
    };

    let domain_entities = match &config.variant {
        SiteVariant::Minimal => vec![],
        SiteVariant::CustomDomain { domain_name } => {
            let zone = HostedZone {
                id: EntityId::new(ZONE_LOGICAL_ID),
                zone_name: domain_name.apex().to_string(),
            };
            let cert = Certificate {
                id: EntityId::new(CERT_LOGICAL_ID),
                primary_domain: domain_name.apex().to_string(),
                alternate_names: [domain_name.wildcard()].into_iter().collect(),
                validation_method: ValidationMethod::Dns,
                zone: zone.id.clone(),
            };
            distributor.domain_names = [domain_name.apex().to_string(), domain_name.wildcard()].into_iter().collect();
            distributor.certificate = Some(cert.id.clone());
            let apex_record = AliasRecord {
                id: EntityId::new(APEX_RECORD_LOGICAL_ID),
                kind: AliasKind::Apex,
                record_name: domain_name.apex().to_string(),
                zone: zone.id.clone(),
                target: distributor.id.clone(),
            };
            let www_record = AliasRecord {
                id: EntityId::new(WWW_RECORD_LOGICAL_ID),
                kind: AliasKind::Www,
                record_name: domain_name.www(),
                zone: zone.id.clone(),
                target: distributor.id.clone(),
            };
            vec![
                Entity::HostedZone(zone),
                Entity::Certificate(cert),
                Entity::AliasRecord(apex_record),
                Entity::AliasRecord(www_record),
            ]
        }
    };

    let mut entities = vec![Entity::OriginStore(store), Entity::Distributor(distributor)];
    entities.extend(domain_entities);
    let topology = Topology::from_entities(&config.stack_name, &config.region, entities);
    topology.validate()?;
    info!(
        stack = %topology.stack_name,
        entities = topology.entities.len(),
        edges = topology.edges.len(),
        custom_domain = config.domain_name().is_some(),
        "assembled topology"
    );
    Ok(topology)
}

impl Topology {
    /// edges are derived from each entity's references, in entity order.
    pub(crate) fn from_entities(stack_name: &str, region: &str, entities: Vec<Entity>) -> Self {
        let edges = entities
            .iter()
            .flat_map(|e| {
                e.references().into_iter().map(move |(to, kind)| Edge { from: e.id().clone(), to: to.clone(), kind })
            })
            .collect();
        Topology { stack_name: stack_name.to_string(), region: region.to_string(), entities, edges }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn by_role(&self, role: EntityRole) -> Option<&Entity> {
        self.entities.iter().find(|e| e.role() == role)
    }

    pub fn count_role(&self, role: EntityRole) -> usize {
        self.entities.iter().filter(|e| e.role() == role).count()
    }

    pub fn origin_store(&self) -> Option<&OriginStore> {
        match self.by_role(EntityRole::OriginStore) {
            Some(Entity::OriginStore(s)) => Some(s),
            _ => None,
        }
    }

    pub fn distributor(&self) -> Option<&Distributor> {
        match self.by_role(EntityRole::Distributor) {
            Some(Entity::Distributor(d)) => Some(d),
            _ => None,
        }
    }

    fn certificate(&self, id: &EntityId) -> Option<&Certificate> {
        match self.get(id) {
            Some(Entity::Certificate(c)) => Some(c),
            _ => None,
        }
    }

    /// Re-checks every cross-entity invariant. A failure here is always an
    /// assembler bug, reported as [`Error::Reference`].
    pub fn validate(&self) -> Result<()> {
        for role in [EntityRole::OriginStore, EntityRole::Distributor] {
            let n = self.count_role(role);
            if n != 1 {
                return Err(Error::reference(format!("{role:?}"), format!("expected exactly one, found {n}")));
            }
        }
        let mut seen = HashSet::new();
        for e in &self.entities {
            if !seen.insert(e.id()) {
                return Err(Error::reference(e.id(), "duplicate logical id"));
            }
        }
        for edge in &self.edges {
            match self.get(&edge.to) {
                None => {
                    return Err(Error::reference(&edge.from, format!("references '{}' which is not in this topology", edge.to)));
                }
                Some(target) if !edge.kind.target_role_ok(target.role()) => {
                    return Err(Error::reference(&edge.from, format!("{:?} reference points at a {:?}", edge.kind, target.role())));
                }
                Some(_) => {}
            }
        }

        // count_role checked above, so this is always Some.
        let distributor = match self.distributor() {
            Some(d) => d,
            None => return Err(Error::reference("Distributor", "missing")),
        };
        self.validate_distributor(distributor)?;

        let domain_bound = distributor.certificate.is_some();
        for role in [EntityRole::HostedZone, EntityRole::Certificate, EntityRole::ApexAlias, EntityRole::WwwAlias] {
            let expected = usize::from(domain_bound);
            let n = self.count_role(role);
            if n != expected {
                return Err(Error::reference(format!("{role:?}"), format!("expected {expected}, found {n}")));
            }
        }

        for e in &self.entities {
            if let Entity::AliasRecord(r) = e {
                self.validate_alias(r)?;
            }
        }

        self.dependency_order().map(|_| ())
    }

    fn validate_distributor(&self, d: &Distributor) -> Result<()> {
        if d.certificate.is_some() == d.domain_names.is_empty() {
            return Err(Error::reference(&d.id, "certificate must be set if and only if domain names are"));
        }
        for name in &d.domain_names {
            let partner = match name.strip_prefix("*.") {
                Some(apex) => apex.to_string(),
                None => format!("*.{name}"),
            };
            if !d.domain_names.contains(&partner) {
                return Err(Error::reference(&d.id, format!("domain name '{name}' is missing its pair '{partner}'")));
            }
        }
        if let Some(cert_id) = &d.certificate {
            let cert = self
                .certificate(cert_id)
                .ok_or_else(|| Error::reference(&d.id, format!("certificate '{cert_id}' not found")))?;
            if let Some(name) = d.domain_names.iter().find(|n| !cert.validates(n)) {
                return Err(Error::reference(&d.id, format!("certificate '{cert_id}' does not cover '{name}'")));
            }
        }
        Ok(())
    }

    fn validate_alias(&self, r: &AliasRecord) -> Result<()> {
        let target = match self.get(&r.target) {
            Some(Entity::Distributor(d)) => d,
            _ => return Err(Error::reference(&r.id, format!("target '{}' is not a distributor", r.target))),
        };
        if !target.domain_names.iter().any(|n| crate::dns::covers(n, &r.record_name)) {
            return Err(Error::reference(&r.id, format!("distributor is not configured for '{}'", r.record_name)));
        }
        let covered = target
            .certificate
            .as_ref()
            .and_then(|c| self.certificate(c))
            .map(|c| c.validates(&r.record_name))
            .unwrap_or(false);
        if !covered {
            return Err(Error::reference(&r.id, format!("distributor certificate does not validate '{}'", r.record_name)));
        }
        Ok(())
    }

    /// Entities in an order where every entity comes after everything it
    /// references. Ties go to whichever entity was assembled first, so the
    /// order is stable.
    pub fn dependency_order(&self) -> Result<Vec<&EntityId>> {
        let n = self.entities.len();
        let index_of = |id: &EntityId| self.entities.iter().position(|e| e.id() == id);
        let mut pending_deps = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![vec![]; n];
        for edge in &self.edges {
            let (from, to) = match (index_of(&edge.from), index_of(&edge.to)) {
                (Some(f), Some(t)) => (f, t),
                _ => return Err(Error::reference(&edge.from, format!("dangling reference to '{}'", edge.to))),
            };
            pending_deps[from] += 1;
            dependents[to].push(from);
        }

        let mut done = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while order.len() < n {
            let next = (0..n).find(|&i| !done[i] && pending_deps[i] == 0);
            let i = match next {
                Some(i) => i,
                None => {
                    let stuck = (0..n).find(|&i| !done[i]).map(|i| self.entities[i].id().to_string()).unwrap_or_default();
                    return Err(Error::reference(stuck, "reference cycle"));
                }
            };
            done[i] = true;
            for &d in &dependents[i] {
                pending_deps[d] -= 1;
            }
            debug!(entity = %self.entities[i].id(), position = order.len(), "ordered");
            order.push(self.entities[i].id());
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Topology {
        assemble(&SiteConfig::new("/build/dist", None).unwrap()).unwrap()
    }

    fn custom() -> Topology {
        assemble(&SiteConfig::new("/build/dist", Some("example.org")).unwrap()).unwrap()
    }

    fn ids(t: &Topology) -> Vec<&str> {
        t.entities().iter().map(|e| e.id().as_str()).collect()
    }

    #[test]
    fn minimal_variant_is_store_and_distributor() {
        let t = minimal();
        assert_eq!(ids(&t), ["StaticSiteBucket", "StaticSiteDistribution"]);
        let d = t.distributor().unwrap();
        assert!(d.domain_names.is_empty());
        assert!(d.certificate.is_none());
        for role in [EntityRole::HostedZone, EntityRole::Certificate, EntityRole::ApexAlias, EntityRole::WwwAlias] {
            assert_eq!(t.count_role(role), 0);
        }
        assert_eq!(t.edges().len(), 1);
    }

    #[test]
    fn custom_domain_variant_binds_domain() {
        let t = custom();
        assert_eq!(t.entities().len(), 6);
        assert_eq!(t.count_role(EntityRole::HostedZone), 1);
        assert_eq!(t.count_role(EntityRole::Certificate), 1);
        assert_eq!(t.count_role(EntityRole::ApexAlias), 1);
        assert_eq!(t.count_role(EntityRole::WwwAlias), 1);

        let d = t.distributor().unwrap();
        let names: Vec<&str> = d.domain_names.iter().map(String::as_str).collect();
        assert_eq!(names, ["*.example.org", "example.org"]);
        assert_eq!(d.certificate.as_ref().map(EntityId::as_str), Some("HttpsCertificate"));

        match t.by_role(EntityRole::Certificate) {
            Some(Entity::Certificate(c)) => {
                assert_eq!(c.primary_domain, "example.org");
                assert!(c.alternate_names.contains("*.example.org"));
                assert_eq!(c.validation_method, ValidationMethod::Dns);
            }
            other => panic!("expected certificate, got {other:?}"),
        }
        match t.by_role(EntityRole::WwwAlias) {
            Some(Entity::AliasRecord(r)) => {
                assert_eq!(r.record_name, "www.example.org");
                assert_eq!(r.target.as_str(), "StaticSiteDistribution");
            }
            other => panic!("expected www alias, got {other:?}"),
        }
    }

    #[test]
    fn assembly_is_deterministic() {
        assert_eq!(minimal(), minimal());
        assert_eq!(custom(), custom());
    }

    #[test]
    fn every_reference_resolves() {
        for t in [minimal(), custom()] {
            for edge in t.edges() {
                assert!(t.get(&edge.to).is_some(), "dangling {edge:?}");
                assert!(t.get(&edge.from).is_some());
            }
        }
    }

    #[test]
    fn dependency_order_puts_references_first() {
        let t = custom();
        let order: Vec<&str> = t.dependency_order().unwrap().into_iter().map(EntityId::as_str).collect();
        assert_eq!(
            order,
            [
                "StaticSiteBucket",
                "DomainHostedZone",
                "HttpsCertificate",
                "StaticSiteDistribution",
                "CloudFrontRedirect",
                "CloudFrontWWWRedirect"
            ]
        );
    }

    fn broken(mut entities: Vec<Entity>, f: impl FnOnce(&mut Vec<Entity>)) -> Result<()> {
        f(&mut entities);
        Topology::from_entities("static-site", "us-east-1", entities).validate()
    }

    #[test]
    fn dangling_reference_is_a_reference_error() {
        let err = broken(minimal().entities, |es| {
            if let Entity::Distributor(d) = &mut es[1] {
                d.origin = EntityId::new("NoSuchBucket");
            }
        });
        assert!(matches!(err, Err(Error::Reference { .. })));
    }

    #[test]
    fn certificate_without_domain_names_is_rejected() {
        let err = broken(custom().entities, |es| {
            if let Entity::Distributor(d) = &mut es[1] {
                d.domain_names.clear();
            }
        });
        assert!(matches!(err, Err(Error::Reference { .. })));
    }

    #[test]
    fn alias_for_unconfigured_host_is_rejected() {
        let err = broken(custom().entities, |es| {
            if let Entity::AliasRecord(r) = &mut es[5] {
                r.record_name = "www.other.org".into();
            }
        });
        assert!(matches!(err, Err(Error::Reference { entity, .. }) if entity == "CloudFrontWWWRedirect"));
    }

    #[test]
    fn apex_without_wildcard_is_rejected() {
        let err = broken(custom().entities, |es| {
            if let Entity::Distributor(d) = &mut es[1] {
                d.domain_names.remove("*.example.org");
            }
        });
        assert!(matches!(err, Err(Error::Reference { .. })));
    }

    #[test]
    fn domain_entities_without_certificate_are_rejected() {
        let err = broken(custom().entities, |es| {
            if let Entity::Distributor(d) = &mut es[1] {
                d.domain_names.clear();
                d.certificate = None;
            }
        });
        assert!(matches!(err, Err(Error::Reference { .. })));
    }

    #[test]
    fn wrong_reference_kind_is_rejected() {
        let err = broken(custom().entities, |es| {
            if let Entity::Certificate(c) = &mut es[3] {
                c.zone = EntityId::new(BUCKET_LOGICAL_ID);
            }
        });
        assert!(matches!(err, Err(Error::Reference { .. })));
    }
}
