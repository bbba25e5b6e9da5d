use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{json, Value};

use super::{get_att, get_ref, select_s3website_url, CfnResource};
use crate::topology::EntityId;

pub const DISTRIBUTION_LOGICAL_ID: &str = "StaticSiteDistribution";

/// caching optimized:
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

const DEFAULT_ORIGIN_ID: &str = "origin0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewerPolicy {
    RedirectHttps,
}

impl ViewerPolicy {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            ViewerPolicy::RedirectHttps => "redirect-to-https",
        }
    }
}

/// The CloudFront distribution in front of the origin store. Terminates TLS
/// and is what clients actually talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Distributor {
    pub id: EntityId,
    pub origin: EntityId,
    pub viewer_policy: ViewerPolicy,
    /// empty unless serving a custom domain, in which case it holds the apex
    /// and its wildcard.
    pub domain_names: BTreeSet<String>,
    pub certificate: Option<EntityId>,
}

impl CfnResource for Distributor {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }

    fn properties(&self) -> Value {
        // the bucket website endpoint only speaks http. viewers still get
        // redirected to https at the edge.
        let origin = json!({
            "Id": DEFAULT_ORIGIN_ID,
            "DomainName": select_s3website_url(self.origin.as_str()),
            "CustomOriginConfig": {
                "OriginProtocolPolicy": "http-only",
            }
        });
        let mut config = json!({
            "Enabled": true,
            "Origins": [origin],
            "DefaultCacheBehavior": {
                "TargetOriginId": DEFAULT_ORIGIN_ID,
                "ViewerProtocolPolicy": self.viewer_policy.as_cfn(),
                "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
            }
        });
        if !self.domain_names.is_empty() {
            config["Aliases"] = json!(self.domain_names);
        }
        if let Some(cert) = &self.certificate {
            config["ViewerCertificate"] = json!({
                "AcmCertificateArn": get_ref(cert.as_str()),
                "MinimumProtocolVersion": "TLSv1.2_2021",
                "SslSupportMethod": "sni-only",
            });
        }
        json!({ "DistributionConfig": config })
    }

    fn output_value(&self) -> Value {
        get_att(self.id.as_str(), "DomainName")
    }
}
