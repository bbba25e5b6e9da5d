//! Site configuration: what the user asks for, before and after validation.
//!
//! A [`RawSiteConfig`] is whatever came out of a config file and/or the
//! environment. [`RawSiteConfig::validate`] turns it into a [`SiteConfig`],
//! where the custom domain decision is a [`SiteVariant`] rather than an
//! optional string.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assets::AssetSource;
use crate::dns::DomainName;
use crate::error::{Error, Result};

/// CloudFront only accepts ACM certificates that live in this region.
pub const CLOUDFRONT_CERT_REGION: &str = "us-east-1";

pub const DEFAULT_STACK_NAME: &str = "static-site";
pub const DEFAULT_REGION: &str = CLOUDFRONT_CERT_REGION;
/// single page apps route everything through index.html, so it doubles
/// as the error document unless told otherwise.
pub const DEFAULT_DOCUMENT: &str = "index.html";

const MAX_STACK_NAME_LEN: usize = 128;

const AWS_REGIONS: &[&str] = &[
    "us-east-1", "us-east-2", "us-west-1", "us-west-2",
    "ca-central-1", "sa-east-1", "af-south-1", "me-south-1",
    "eu-north-1", "eu-west-1", "eu-west-2", "eu-west-3", "eu-central-1", "eu-south-1",
    "ap-south-1", "ap-east-1",
    "ap-northeast-1", "ap-northeast-2", "ap-northeast-3",
    "ap-southeast-1", "ap-southeast-2", "ap-southeast-3",
    "cn-north-1", "cn-northwest-1",
    "us-gov-east-1", "us-gov-west-1",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSiteConfig {
    #[serde(default)]
    pub asset_path: String,
    pub domain_name: Option<String>,
    pub stack_name: Option<String>,
    pub region: Option<String>,
    pub index_document: Option<String>,
    pub error_document: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SiteVariant {
    /// bucket + distribution only, reachable on the generated CloudFront hostname.
    Minimal,
    /// additionally a hosted zone, certificate and apex/www alias records.
    CustomDomain { domain_name: DomainName },
}

impl SiteVariant {
    pub fn domain_name(&self) -> Option<&DomainName> {
        match self {
            SiteVariant::Minimal => None,
            SiteVariant::CustomDomain { domain_name } => Some(domain_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteConfig {
    pub asset_path: AssetSource,
    pub variant: SiteVariant,
    pub stack_name: String,
    pub region: String,
    pub index_document: String,
    pub error_document: String,
}

impl SiteConfig {
    /// all defaults except the two fields every deployment has to decide on.
    pub fn new(asset_path: &str, domain_name: Option<&str>) -> Result<Self> {
        RawSiteConfig {
            asset_path: asset_path.to_string(),
            domain_name: domain_name.map(str::to_string),
            ..Default::default()
        }
        .validate()
    }

    pub fn domain_name(&self) -> Option<&DomainName> {
        self.variant.domain_name()
    }
}

impl RawSiteConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::config("config", format!("Failed to parse config\n{e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config("config", format!("Failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| Error::config("config", format!("Failed to parse {}\n{e}", path.display())))
    }

    /// Override fields from `SITE_*` variables. An empty `SITE_DOMAIN_NAME`
    /// removes the domain, selecting the minimal variant.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, val) in vars {
            let val = val.into();
            let key = key.as_ref();
            if key.starts_with("SITE_") {
                debug!(key, "config overridden from environment");
            }
            match key {
                "SITE_ASSET_PATH" => self.asset_path = val,
                "SITE_DOMAIN_NAME" => self.domain_name = if val.is_empty() { None } else { Some(val) },
                "SITE_STACK_NAME" => self.stack_name = Some(val),
                "SITE_REGION" => self.region = Some(val),
                "SITE_INDEX_DOCUMENT" => self.index_document = Some(val),
                "SITE_ERROR_DOCUMENT" => self.error_document = Some(val),
                _ => {}
            }
        }
    }

    pub fn validate(self) -> Result<SiteConfig> {
        let asset_path = AssetSource::new(self.asset_path)?;
        let variant = match self.domain_name.as_deref() {
            None => SiteVariant::Minimal,
            Some(d) => SiteVariant::CustomDomain { domain_name: DomainName::parse(d)? },
        };
        let stack_name = validate_stack_name(self.stack_name.as_deref().unwrap_or(DEFAULT_STACK_NAME))?;

        let region = self.region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        if !AWS_REGIONS.contains(&region.as_str()) {
            return Err(Error::config("region", format!("Invalid region code {region:?}\nMust be one of {AWS_REGIONS:?}")));
        }
        if matches!(variant, SiteVariant::CustomDomain { .. }) && region != CLOUDFRONT_CERT_REGION {
            return Err(Error::config(
                "region",
                format!("Custom domains need an ACM certificate in {CLOUDFRONT_CERT_REGION} to be used by CloudFront. {region} is invalid."),
            ));
        }

        let index_document = validate_document("index_document", self.index_document)?;
        let error_document = validate_document("error_document", self.error_document)?;
        Ok(SiteConfig { asset_path, variant, stack_name, region, index_document, error_document })
    }
}

fn validate_document(field: &str, doc: Option<String>) -> Result<String> {
    let doc = doc.unwrap_or_else(|| DEFAULT_DOCUMENT.to_string());
    if doc.is_empty() || doc.contains('/') {
        return Err(Error::config(field, format!("{doc:?} must be a file name at the root of the bucket")));
    }
    Ok(doc)
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
fn validate_stack_name(stack_name: &str) -> Result<String> {
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || Error::config("stack_name", format!("Invalid stack name {stack_name:?}\n{restriction}"));
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    if stack_name.len() > MAX_STACK_NAME_LEN {
        return Err(invalid());
    }
    Ok(stack_name.to_string())
}

/// Reads `KEY=value` pairs out of a .env file. Blank lines and `#` comments
/// are skipped, and one layer of matching quotes around a value is removed.
pub fn load_dot_env(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::config("dotenv", format!("Failed to load .env file {}: {e}", path.display())))?;
    Ok(parse_dot_env(&contents))
}

fn parse_dot_env(contents: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let val = val.trim();
            let unquoted = ['"', '\'']
                .iter()
                .find_map(|q| val.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
                .unwrap_or(val);
            map.insert(key.trim().to_string(), unquoted.to_string());
        } else {
            warn!(line, "skipping .env line without '='");
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(asset_path: &str, domain_name: Option<&str>) -> RawSiteConfig {
        RawSiteConfig {
            asset_path: asset_path.into(),
            domain_name: domain_name.map(Into::into),
            ..Default::default()
        }
    }

    fn field_of(e: Error) -> String {
        match e {
            Error::Configuration { field, .. } => field,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_applied() {
        let conf = SiteConfig::new("/build/dist", None).unwrap();
        assert_eq!(conf.variant, SiteVariant::Minimal);
        assert_eq!(conf.stack_name, "static-site");
        assert_eq!(conf.region, "us-east-1");
        assert_eq!(conf.index_document, "index.html");
        assert_eq!(conf.error_document, "index.html");
    }

    #[test]
    fn domain_selects_custom_variant() {
        let conf = SiteConfig::new("/build/dist", Some("gyuri.org")).unwrap();
        assert_eq!(conf.domain_name().map(|d| d.apex()), Some("gyuri.org"));
    }

    #[test]
    fn invalid_inputs_name_the_field() {
        assert_eq!(field_of(raw("", None).validate().unwrap_err()), "asset_path");
        assert_eq!(field_of(raw("/dist", Some("not a domain!!")).validate().unwrap_err()), "domain_name");

        let mut r = raw("/dist", None);
        r.stack_name = Some("1-starts-with-digit".into());
        assert_eq!(field_of(r.validate().unwrap_err()), "stack_name");

        let mut r = raw("/dist", None);
        r.stack_name = Some("has_underscore".into());
        assert_eq!(field_of(r.validate().unwrap_err()), "stack_name");

        let mut r = raw("/dist", None);
        r.region = Some("moon-east-1".into());
        assert_eq!(field_of(r.validate().unwrap_err()), "region");

        let mut r = raw("/dist", None);
        r.index_document = Some("pages/index.html".into());
        assert_eq!(field_of(r.validate().unwrap_err()), "index_document");
    }

    #[test]
    fn custom_domain_requires_us_east_1() {
        let mut r = raw("/dist", Some("gyuri.org"));
        r.region = Some("eu-west-1".into());
        assert_eq!(field_of(r.validate().unwrap_err()), "region");

        let mut r = raw("/dist", None);
        r.region = Some("eu-west-1".into());
        assert_eq!(r.validate().unwrap().region, "eu-west-1");
    }

    #[test]
    fn toml_then_env_overrides() {
        let mut r = RawSiteConfig::from_toml_str(
            r#"
            asset_path = "../frontend/dist"
            domain_name = "gyuri.org"
            stack_name = "FrontendDeployStack"
            "#,
        )
        .unwrap();
        assert_eq!(r.domain_name.as_deref(), Some("gyuri.org"));

        r.apply_env([("SITE_DOMAIN_NAME", ""), ("SITE_ASSET_PATH", "/build/dist"), ("UNRELATED", "x")]);
        let conf = r.validate().unwrap();
        assert_eq!(conf.variant, SiteVariant::Minimal);
        assert_eq!(conf.asset_path.path(), Path::new("/build/dist"));
        assert_eq!(conf.stack_name, "FrontendDeployStack");
    }

    #[test]
    fn unknown_toml_keys_rejected() {
        let err = RawSiteConfig::from_toml_str("asset_path = \"x\"\nbucket = \"y\"").unwrap_err();
        assert_eq!(field_of(err), "config");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        std::fs::write(&path, "asset_path = \"/build/dist\"\n").unwrap();
        let r = RawSiteConfig::load(&path).unwrap();
        assert_eq!(r.asset_path, "/build/dist");
        assert!(RawSiteConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn dot_env_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\n\nSITE_DOMAIN_NAME=\"gyuri.org\"\nSITE_REGION = us-east-1\nnoequals\n").unwrap();
        let vars = load_dot_env(&path).unwrap();
        assert_eq!(vars.get("SITE_DOMAIN_NAME").map(String::as_str), Some("gyuri.org"));
        assert_eq!(vars.get("SITE_REGION").map(String::as_str), Some("us-east-1"));
        assert_eq!(vars.len(), 2);

        let mut r = RawSiteConfig { asset_path: "/dist".into(), ..Default::default() };
        r.apply_env(vars);
        assert!(r.validate().unwrap().domain_name().is_some());
    }
}
