use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tokio::runtime::Runtime;

use super::error::CollabError;

/// Read-only access to `get_configmap(name, namespace?) -> {data}`, per
/// spec.md §6. Grounded on the teacher's `k8s::client::SyncK8sClient`
/// sync-over-async wrapper, pared down to the single call CFS needs.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigMapStore: Send + Sync {
    fn get_configmap(&self, name: &str, namespace: &str) -> Result<BTreeMap<String, String>, CollabError>;
}

pub struct K8sConfigMapStore {
    client: Client,
    runtime: Arc<Runtime>,
}

impl K8sConfigMapStore {
    pub fn try_new(runtime: Arc<Runtime>) -> Result<Self, CollabError> {
        let client = runtime.block_on(Client::try_default())?;
        Ok(Self { client, runtime })
    }
}

impl ConfigMapStore for K8sConfigMapStore {
    fn get_configmap(&self, name: &str, namespace: &str) -> Result<BTreeMap<String, String>, CollabError> {
        self.runtime.block_on(async {
            let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
            let cm = api.get(name).await?;
            Ok(cm.data.unwrap_or_default())
        })
    }
}
