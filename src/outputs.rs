//! Maps resolved, post-deploy values onto the fixed set of output names
//! that downstream pipelines read.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::topology::{EntityId, EntityRole, Topology};

pub struct OutputRow {
    pub role: EntityRole,
    pub name: &'static str,
    /// exported as `<stack name>-<suffix>`
    pub export_suffix: &'static str,
    pub description: &'static str,
}

/// One row per consumer-facing value. Rows whose role isn't part of the
/// assembled variant are skipped, so the minimal variant exports the first
/// two only.
pub const OUTPUT_TABLE: &[OutputRow] = &[
    OutputRow {
        role: EntityRole::OriginStore,
        name: "StaticSiteUrl",
        export_suffix: "StaticSiteUrl",
        description: "URL of the static site",
    },
    OutputRow {
        role: EntityRole::Distributor,
        name: "FeUrl",
        export_suffix: "FE-Url",
        description: "FE URL",
    },
    OutputRow {
        role: EntityRole::HostedZone,
        name: "HostedZoneId",
        export_suffix: "HostedZoneId",
        description: "Hosted Zone Name",
    },
    OutputRow {
        role: EntityRole::Certificate,
        name: "CertificateArn",
        export_suffix: "CertificateArn",
        description: "Certificate ARN",
    },
    OutputRow {
        role: EntityRole::ApexAlias,
        name: "CloudFrontRedirectOutput",
        export_suffix: "CloudFrontRedirectOutput",
        description: "CloudFront Redirect",
    },
    OutputRow {
        role: EntityRole::WwwAlias,
        name: "CloudFrontWWWRedirectOutput",
        export_suffix: "CloudFrontWWWRedirectOutput",
        description: "CloudFront WWW Redirect",
    },
];

impl OutputRow {
    pub fn export_name(&self, stack_name: &str) -> String {
        format!("{stack_name}-{}", self.export_suffix)
    }
}

/// the rows of [`OUTPUT_TABLE`] that apply to `topology`, paired with the
/// entity each one reads from.
pub fn applicable_outputs(topology: &Topology) -> impl Iterator<Item = (&OutputRow, &EntityId)> + '_ {
    applicable_rows(OUTPUT_TABLE, topology)
}

fn applicable_rows<'a>(
    table: &'a [OutputRow],
    topology: &'a Topology,
) -> impl Iterator<Item = (&'a OutputRow, &'a EntityId)> + 'a {
    table
        .iter()
        .filter_map(move |row| topology.by_role(row.role).map(|e| (row, e.id())))
}

/// Live attribute values, keyed by entity, as reported by whatever
/// provisioned the topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedValues(BTreeMap<EntityId, String>);

impl ResolvedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId, value: impl Into<String>) {
        self.0.insert(id, value.into());
    }

    pub fn get(&self, id: &EntityId) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stack outputs come back keyed by output name. Walk the table backwards
    /// to find which entity each belongs to. Outputs we don't know about are
    /// ignored; anything missing will be caught by [`export_outputs`].
    pub fn from_stack_outputs(topology: &Topology, outputs: &HashMap<String, String>) -> Self {
        let mut out = Self::new();
        for (row, id) in applicable_outputs(topology) {
            if let Some(value) = outputs.get(row.name) {
                out.insert(id.clone(), value.clone());
            }
        }
        out
    }
}

impl<K: Into<EntityId>, V: Into<String>> FromIterator<(K, V)> for ResolvedValues {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        ResolvedValues(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedOutput {
    pub name: String,
    pub value: String,
    pub description: String,
    pub export_name: String,
}

/// Produces one output per applicable table row, in table order. Fails if
/// any required entity has no (or an empty) resolved value; we never publish
/// a placeholder.
pub fn export_outputs(topology: &Topology, resolved: &ResolvedValues) -> Result<Vec<ExportedOutput>> {
    export_with_table(OUTPUT_TABLE, topology, resolved)
}

/// [`export_outputs`] against an arbitrary table. Two rows that apply to the
/// same topology and share a name are rejected instead of one silently
/// replacing the other.
pub fn export_with_table(table: &[OutputRow], topology: &Topology, resolved: &ResolvedValues) -> Result<Vec<ExportedOutput>> {
    let mut names = HashSet::new();
    let mut out = vec![];
    for (row, id) in applicable_rows(table, topology) {
        let value = match resolved.get(id) {
            Some(v) if !v.is_empty() => v,
            _ => {
                return Err(Error::MissingResolvedValue { entity: id.clone(), output: row.name.to_string() });
            }
        };
        if !names.insert(row.name) {
            return Err(Error::DuplicateOutput { name: row.name.to_string() });
        }
        debug!(output = row.name, entity = %id, "exporting");
        out.push(ExportedOutput {
            name: row.name.to_string(),
            value: value.to_string(),
            description: row.description.to_string(),
            export_name: row.export_name(topology.stack_name()),
        });
    }
    info!(count = out.len(), stack = topology.stack_name(), "exported outputs");
    Ok(out)
}
