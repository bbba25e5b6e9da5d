use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{json, Value};

use super::{get_ref, CfnResource};
use crate::dns::covers;
use crate::topology::EntityId;

pub const CERT_LOGICAL_ID: &str = "HttpsCertificate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationMethod {
    Dns,
}

impl ValidationMethod {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            ValidationMethod::Dns => "DNS",
        }
    }
}

/// An ACM certificate for the custom domain. This only works if:
/// - the domain is hosted in the Route 53 zone created next to it
/// - the certificate lives in us-east-1 (CloudFront requirement)
/// - validation happens through DNS, against that zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Certificate {
    pub id: EntityId,
    pub primary_domain: String,
    pub alternate_names: BTreeSet<String>,
    pub validation_method: ValidationMethod,
    pub zone: EntityId,
}

impl Certificate {
    /// true if this certificate is valid for `host`.
    pub fn validates(&self, host: &str) -> bool {
        std::iter::once(&self.primary_domain)
            .chain(self.alternate_names.iter())
            .any(|name| covers(name, host))
    }
}

impl CfnResource for Certificate {
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }

    fn properties(&self) -> Value {
        // ACM wants a validation option for every name on the certificate,
        // all of which live in the same zone.
        let validation_options: Vec<Value> = std::iter::once(&self.primary_domain)
            .chain(self.alternate_names.iter())
            .map(|name| json!({ "DomainName": name, "HostedZoneId": get_ref(self.zone.as_str()) }))
            .collect();
        json!({
            "DomainName": self.primary_domain,
            "SubjectAlternativeNames": self.alternate_names,
            "ValidationMethod": self.validation_method.as_cfn(),
            "DomainValidationOptions": validation_options,
        })
    }

    fn output_value(&self) -> Value {
        // Ref on a certificate is its ARN
        get_ref(self.id.as_str())
    }
}
