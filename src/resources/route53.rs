use serde::Serialize;
use serde_json::{json, Value};

use super::{get_att, get_ref, CfnResource};
use crate::topology::EntityId;

pub const ZONE_LOGICAL_ID: &str = "DomainHostedZone";
pub const APEX_RECORD_LOGICAL_ID: &str = "CloudFrontRedirect";
pub const WWW_RECORD_LOGICAL_ID: &str = "CloudFrontWWWRedirect";

/// this is static for all of AWS for aliases to CloudFront
/// see here: https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html#cfn-route53-aliastarget-hostedzoneid
pub const CLOUDFRONT_ALIAS_ZONE_ID: &str = "Z2FDTNDATAQYW2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedZone {
    pub id: EntityId,
    pub zone_name: String,
}

impl CfnResource for HostedZone {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::HostedZone"
    }

    fn properties(&self) -> Value {
        json!({ "Name": self.zone_name })
    }

    /// consumers want the zone name, which we already know at synth time.
    fn output_value(&self) -> Value {
        Value::String(self.zone_name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AliasKind {
    Apex,
    Www,
}

/// An `A` alias record that points one hostname at the distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasRecord {
    pub id: EntityId,
    pub kind: AliasKind,
    pub record_name: String,
    pub zone: EntityId,
    pub target: EntityId,
}

impl CfnResource for AliasRecord {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }

    fn properties(&self) -> Value {
        json!({
            "Type": "A",
            "Name": self.record_name,
            "HostedZoneId": get_ref(self.zone.as_str()),
            "AliasTarget": {
                "DNSName": get_att(self.target.as_str(), "DomainName"),
                "HostedZoneId": CLOUDFRONT_ALIAS_ZONE_ID,
            }
        })
    }

    /// Ref on a record set is the record's domain name
    fn output_value(&self) -> Value {
        get_ref(self.id.as_str())
    }
}
