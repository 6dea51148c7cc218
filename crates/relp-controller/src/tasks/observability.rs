use super::types::Result;
use crate::monitoring::{monitoring_object_refs, ManagedObject};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::Client;
use tracing::{debug, info};

const FIELD_MANAGER: &str = "relp-controller";

/// Where alert rules, scrape config and dashboard are installed.
#[async_trait]
pub trait MonitoringSink: Send + Sync {
    /// Creates or updates every object.
    async fn apply(&self, namespace: &str, objects: Vec<ManagedObject>) -> Result<()>;

    /// Deletes every object the extension may have created. Absent objects are fine.
    async fn remove(&self, namespace: &str) -> Result<()>;
}

pub struct KubeMonitoringSink {
    client: Client,
}

impl KubeMonitoringSink {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MonitoringSink for KubeMonitoringSink {
    async fn apply(&self, namespace: &str, objects: Vec<ManagedObject>) -> Result<()> {
        for object in objects {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), namespace, &object.resource);
            api.patch(
                &object.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&object.body),
            )
            .await?;
            debug!(namespace = %namespace, object = %object.describe(), "Applied monitoring object");
        }
        info!(namespace = %namespace, "Monitoring resources applied");
        Ok(())
    }

    async fn remove(&self, namespace: &str) -> Result<()> {
        for (resource, name) in monitoring_object_refs() {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), namespace, &resource);
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => debug!(namespace = %namespace, kind = %resource.kind, name = %name, "Deleted monitoring object"),
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(namespace = %namespace, "Monitoring resources removed");
        Ok(())
    }
}
