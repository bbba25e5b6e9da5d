//! A [`Provisioner`] that deploys the rendered template as a CloudFormation
//! stack, then uploads the built assets into the bucket it created.

use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_cloudformation::types::{Capability, OnFailure, Stack, StackStatus};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::assets::AssetManifest;
use crate::outputs::ResolvedValues;
use crate::provision::{ProvisionError, Provisioner, StackDeployment};
use crate::topology::EntityId;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(700);

type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

pub struct CloudFormationProvisioner {
    runtime: tokio::runtime::Runtime,
    poll_interval: Duration,
    upload_assets: bool,
}

impl CloudFormationProvisioner {
    pub fn new() -> ProvisionResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ProvisionError::new(format!("Failed to start async runtime: {e}")))?;
        Ok(Self { runtime, poll_interval: DEFAULT_POLL_INTERVAL, upload_assets: true })
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// only deploy the stack, leave the bucket contents alone.
    pub fn skip_asset_upload(mut self) -> Self {
        self.upload_assets = false;
        self
    }

    async fn apply_async(&self, deployment: &StackDeployment<'_>) -> ProvisionResult<ResolvedValues> {
        let region = aws_sdk_cloudformation::config::Region::new(deployment.region.to_string());
        let shared_config = aws_config::from_env().region(region).load().await;
        let client = aws_sdk_cloudformation::Client::new(&shared_config);
        let name = deployment.stack_name;

        let template_body = deployment
            .template
            .to_json()
            .map_err(|e| ProvisionError::new(e.to_string()).with_source(e))?;
        info!(stack = name, "deploying stack");
        create_or_update_stack(&client, name, &template_body).await?;
        let outputs = wait_for_output(&client, name, self.poll_interval).await?;

        if self.upload_assets {
            let store = deployment
                .topology
                .origin_store()
                .ok_or_else(|| ProvisionError::new("topology has no origin store"))?;
            let bucket = physical_id(&client, name, store.id.as_str()).await?;
            let manifest = AssetManifest::scan(&store.asset_source)
                .map_err(|e| ProvisionError::at(store.id.clone(), e.to_string()).with_source(e))?;
            let s3 = aws_sdk_s3::Client::new(&shared_config);
            upload_assets(&s3, &bucket, &manifest)
                .await
                .map_err(|e| ProvisionError::at(store.id.clone(), e))?;
        }

        Ok(ResolvedValues::from_stack_outputs(deployment.topology, &outputs))
    }
}

impl Provisioner for CloudFormationProvisioner {
    fn apply(&mut self, deployment: &StackDeployment<'_>) -> ProvisionResult<ResolvedValues> {
        self.runtime.block_on(self.apply_async(deployment))
    }
}

pub async fn does_stack_exist(client: &aws_sdk_cloudformation::Client, name: &str) -> ProvisionResult<bool> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(_) => Ok(true),
        Err(e) => {
            let e_str = format!("{:#?}", e);
            if e_str.contains("does not exist") {
                return Ok(false);
            }
            Err(ProvisionError::new(e_str))
        }
    }
}

/// `Ok(None)` while the stack is still in progress.
pub async fn describe_stack(client: &aws_sdk_cloudformation::Client, name: &str) -> ProvisionResult<Option<Stack>> {
    let resp = client
        .describe_stacks()
        .stack_name(name)
        .send()
        .await
        .map_err(|e| ProvisionError::new(format!("{:#?}", e)))?;
    let first = resp
        .stacks()
        .and_then(|stacks| stacks.first())
        .ok_or_else(|| ProvisionError::new(format!("Stack {name} not found")))?;
    let status = first
        .stack_status()
        .ok_or_else(|| ProvisionError::new(format!("Stack {name} not found")))?;
    match status {
        StackStatus::CreateComplete | StackStatus::UpdateComplete => Ok(Some(first.clone())),

        StackStatus::CreateInProgress
        | StackStatus::ReviewInProgress
        | StackStatus::UpdateCompleteCleanupInProgress
        | StackStatus::UpdateInProgress
        | StackStatus::RollbackInProgress
        | StackStatus::UpdateRollbackCompleteCleanupInProgress
        | StackStatus::UpdateRollbackInProgress => Ok(None),

        // an update that rolled back, a rollback, a delete: none of these
        // leave a stack that matches the template we just sent.
        _ => {
            let stack_reason = format!(
                "Stack {name} ended in {}: {}",
                status.as_str(),
                first.stack_status_reason().unwrap_or("Failed to get stack failure reason")
            );
            Err(match failed_resource_event(client, name).await {
                Some((logical_id, reason)) => ProvisionError::at(EntityId::new(logical_id), format!("{stack_reason}\n{reason}")),
                None => ProvisionError::new(stack_reason),
            })
        }
    }
}

/// The resource whose failure sent the stack into rollback, with the reason
/// CloudFormation gave for it. `None` if the events can't be read.
async fn failed_resource_event(client: &aws_sdk_cloudformation::Client, name: &str) -> Option<(String, String)> {
    let resp = match client.describe_stack_events().stack_name(name).send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(stack = name, "failed to read stack events: {:#?}", e);
            return None;
        }
    };
    let events = resp.stack_events().unwrap_or_default();
    root_cause(
        name,
        events.iter().filter_map(|ev| {
            Some(StackEventSummary {
                logical_id: ev.logical_resource_id()?,
                status: ev.resource_status()?.as_str(),
                reason: ev.resource_status_reason().unwrap_or("no reason given"),
            })
        }),
    )
}

struct StackEventSummary<'a> {
    logical_id: &'a str,
    status: &'a str,
    reason: &'a str,
}

/// `events` come newest first, as CloudFormation returns them. Only events
/// after the stack's own latest `*_IN_PROGRESS` start count, and of those the
/// oldest `*_FAILED` resource wins: later failures are usually rollback
/// fallout.
fn root_cause<'a>(stack: &str, events: impl IntoIterator<Item = StackEventSummary<'a>>) -> Option<(String, String)> {
    let mut found = None;
    for ev in events {
        if ev.logical_id == stack {
            if ev.status == "CREATE_IN_PROGRESS" || ev.status == "UPDATE_IN_PROGRESS" {
                break;
            }
            continue;
        }
        if ev.status.ends_with("_FAILED") {
            found = Some((ev.logical_id.to_string(), ev.reason.to_string()));
        }
    }
    found
}

pub async fn wait_for_output(
    client: &aws_sdk_cloudformation::Client,
    name: &str,
    poll_interval: Duration,
) -> ProvisionResult<HashMap<String, String>> {
    loop {
        tokio::time::sleep(poll_interval).await;
        match describe_stack(client, name).await? {
            Some(stack) => {
                let mut out = HashMap::new();
                for output in stack.outputs().unwrap_or_default() {
                    if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
                        out.insert(key.to_string(), val.to_string());
                    }
                }
                info!(stack = name, outputs = out.len(), "stack ready");
                return Ok(out);
            }
            None => debug!(stack = name, "still waiting"),
        }
    }
}

pub async fn create_or_update_stack(client: &aws_sdk_cloudformation::Client, name: &str, body: &str) -> ProvisionResult<()> {
    if does_stack_exist(client, name).await? {
        info!(stack = name, "updating");
        let res = client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await;
        if let Err(e) = res {
            let e_str = format!("{:#?}", e);
            if e_str.contains("No updates are to be performed") {
                return Ok(());
            }
            return Err(ProvisionError::new(e_str));
        }
    } else {
        info!(stack = name, "creating");
        client
            .create_stack()
            .on_failure(OnFailure::Delete)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await
            .map_err(|e| ProvisionError::new(format!("{:#?}", e)))?;
    }
    Ok(())
}

async fn physical_id(client: &aws_sdk_cloudformation::Client, stack: &str, logical_id: &str) -> ProvisionResult<String> {
    let resp = client
        .describe_stack_resource()
        .stack_name(stack)
        .logical_resource_id(logical_id)
        .send()
        .await
        .map_err(|e| ProvisionError::new(format!("{:#?}", e)))?;
    resp.stack_resource_detail()
        .and_then(|d| d.physical_resource_id())
        .map(str::to_string)
        .ok_or_else(|| ProvisionError::new(format!("No physical id for {logical_id} in stack {stack}")))
}

async fn upload_assets(client: &aws_sdk_s3::Client, bucket: &str, manifest: &AssetManifest) -> Result<(), String> {
    for object in &manifest.objects {
        let body = ByteStream::from_path(&object.path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", object.path.display()))?;
        client
            .put_object()
            .bucket(bucket)
            .key(&object.key)
            .content_type(object.content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| format!("Failed to upload {}: {:#?}", object.key, e))?;
        debug!(key = %object.key, bucket, "uploaded");
    }
    info!(count = manifest.objects.len(), bucket, "uploaded assets");
    Ok(())
}
