use serde::Serialize;
use serde_json::{json, Value};

use super::{get_att, get_ref, CfnResource};
use crate::assets::AssetSource;
use crate::topology::EntityId;

pub const BUCKET_LOGICAL_ID: &str = "StaticSiteBucket";

/// The public bucket that holds the built site and serves it over plain http.
/// It is the origin the distribution pulls from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginStore {
    pub id: EntityId,
    pub index_document: String,
    pub error_document: String,
    /// when set we attach a bucket policy allowing anyone to `s3:GetObject`,
    /// and turn off the public access blocks that would otherwise reject it.
    pub public_read: bool,
    pub asset_source: AssetSource,
}

impl OriginStore {
    pub fn policy_logical_id(&self) -> String {
        format!("{}Policy", self.id)
    }

    /// the bucket policy resource that goes along with a public bucket.
    pub fn public_read_policy(&self) -> Option<BucketPolicy> {
        if !self.public_read {
            return None;
        }
        Some(BucketPolicy { bucket: self.id.clone() })
    }
}

impl CfnResource for OriginStore {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "WebsiteConfiguration": {
                "IndexDocument": self.index_document,
                "ErrorDocument": self.error_document,
            }
        });
        if self.public_read {
            props["PublicAccessBlockConfiguration"] = json!({
                "BlockPublicAcls": false,
                "BlockPublicPolicy": false,
                "IgnorePublicAcls": false,
                "RestrictPublicBuckets": false,
            });
        }
        props
    }

    fn output_value(&self) -> Value {
        get_att(self.id.as_str(), "WebsiteURL")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPolicy {
    pub bucket: EntityId,
}

impl BucketPolicy {
    pub fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }

    pub fn properties(&self) -> Value {
        // { "Fn::Sub": "arn:aws:s3:::${bucket}/*" }
        let objects = json!({ "Fn::Sub": format!("arn:aws:s3:::${{{}}}/*", self.bucket) });
        json!({
            "Bucket": get_ref(self.bucket.as_str()),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": "*",
                    "Action": "s3:GetObject",
                    "Resource": objects,
                }]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(public_read: bool) -> OriginStore {
        OriginStore {
            id: EntityId::new(BUCKET_LOGICAL_ID),
            index_document: "index.html".into(),
            error_document: "index.html".into(),
            public_read,
            asset_source: AssetSource::new("/build/dist").unwrap(),
        }
    }

    #[test]
    fn public_bucket_is_a_website_with_policy() {
        let s = store(true);
        let props = s.properties();
        assert_eq!(props["WebsiteConfiguration"]["IndexDocument"], "index.html");
        assert_eq!(props["PublicAccessBlockConfiguration"]["BlockPublicPolicy"], false);

        let policy = s.public_read_policy().unwrap();
        let policy_props = policy.properties();
        assert_eq!(policy_props["Bucket"], get_ref("StaticSiteBucket"));
        assert_eq!(
            policy_props["PolicyDocument"]["Statement"][0]["Resource"]["Fn::Sub"],
            "arn:aws:s3:::${StaticSiteBucket}/*"
        );
        assert_eq!(s.policy_logical_id(), "StaticSiteBucketPolicy");
    }

    #[test]
    fn private_bucket_has_no_policy() {
        let s = store(false);
        assert!(s.public_read_policy().is_none());
        assert!(s.properties().get("PublicAccessBlockConfiguration").is_none());
    }
}
