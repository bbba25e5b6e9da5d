//! Typed descriptors for every AWS resource a static site stack can contain,
//! one module per service. Descriptors only know how to describe themselves
//! as CloudFormation; wiring them together is the job of [`crate::topology`].

use serde_json::{json, Value};

mod s3_bucket;
pub use s3_bucket::*;
mod cloudfront;
pub use cloudfront::*;
mod acm_cert;
pub use acm_cert::*;
mod route53;
pub use route53::*;

/// what a descriptor needs to provide so it can be written into a template.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    /// the intrinsic that evaluates to this resource's consumer-facing value
    /// (website url, distribution hostname, certificate arn, ...).
    fn output_value(&self) -> Value;
}

/// `{ "Ref": logical_id }`
pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": [logical_id, attribute] }`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// CloudFront wants the bare host of the bucket website endpoint, but
/// `WebsiteURL` includes the `http://` scheme. Equivalent to:
/// { "Fn::Select" : [ "2", { "Fn::Split": ["/", { "Fn::GetAtt": [logical_bucket, "WebsiteURL"] }] } ] }
pub fn select_s3website_url(logical_bucket: &str) -> Value {
    json!({
        "Fn::Select": ["2", { "Fn::Split": ["/", get_att(logical_bucket, "WebsiteURL")] }]
    })
}
