//! CloudFormation rendering of an assembled [`Topology`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::outputs::applicable_outputs;
use crate::topology::{Entity, Topology};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputExport {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Export")]
    pub export: OutputExport,
}

/// BTreeMaps rather than HashMaps so the rendered json is byte-for-byte
/// identical between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(rename = "Outputs")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl Template {
    pub fn from_topology(topology: &Topology) -> Self {
        let mut template = Template::default();
        for entity in topology.entities() {
            let mut depends_on: Vec<String> = topology
                .edges()
                .iter()
                .filter(|e| &e.from == entity.id())
                .map(|e| e.to.to_string())
                .collect();
            depends_on.sort();
            depends_on.dedup();

            let cfn = entity.as_cfn();
            template.resources.insert(
                entity.id().to_string(),
                TemplateResource { ty: cfn.type_string().to_string(), properties: cfn.properties(), depends_on },
            );

            // the bucket policy isn't an entity of its own, it's part of
            // what makes the origin store public.
            if let Entity::OriginStore(store) = entity {
                if let Some(policy) = store.public_read_policy() {
                    template.resources.insert(
                        store.policy_logical_id(),
                        TemplateResource {
                            ty: policy.type_string().to_string(),
                            properties: policy.properties(),
                            depends_on: vec![],
                        },
                    );
                }
            }
        }

        for (row, id) in applicable_outputs(topology) {
            // applicable_outputs only yields ids present in the topology.
            let value = match topology.get(id) {
                Some(e) => e.as_cfn().output_value(),
                None => continue,
            };
            template.outputs.insert(
                row.name.to_string(),
                TemplateOutput {
                    description: row.description.to_string(),
                    value,
                    export: OutputExport { name: row.export_name(topology.stack_name()) },
                },
            );
        }
        debug!(resources = template.resources.len(), outputs = template.outputs.len(), "rendered template");
        template
    }

    /// pretty, so it reads nicely if someone looks at it in the console.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
