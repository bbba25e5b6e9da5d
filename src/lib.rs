//! Declares everything needed to publish a static single page site behind
//! CloudFront, optionally on a custom domain with a managed certificate.
//!
//! ```text
//! SiteConfig --assemble--> Topology --render--> Template --Provisioner--> ResolvedValues --export--> outputs
//! ```
//!
//! Everything up to the provisioner is pure. The provisioner is pluggable;
//! enable the `cloudformation` feature for one that deploys to AWS.

pub mod assets;
pub mod config;
pub mod dns;
pub mod error;
pub mod outputs;
pub mod provision;
pub mod resources;
pub mod template;
pub mod topology;

#[cfg(feature = "cloudformation")]
pub mod cloudformation;

pub use config::{RawSiteConfig, SiteConfig, SiteVariant};
pub use error::{Error, Result};
pub use outputs::{export_outputs, ExportedOutput, ResolvedValues};
pub use provision::{deploy, synthesize, ProvisionError, Provisioner, StackDeployment};
pub use template::Template;
pub use topology::{assemble, Entity, EntityId, EntityRole, Topology};
