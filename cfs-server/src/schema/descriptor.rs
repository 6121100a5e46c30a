/// Which way a [`super::translate::translate`] call is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// v3 (storage shape) -> v2 (legacy wire shape).
    V3ToV2,
    /// v2 (legacy wire shape) -> v3 (storage shape).
    V2ToV3,
}

/// One field's shape, shared by every generic walker invocation. `v2`/`v3`
/// are the attribute-map pair spec.md §4.2 and Design Notes §9 call for;
/// `kind` lets the walker recurse without per-field converters.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub v2: &'static str,
    pub v3: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar,
    Object(&'static [FieldDescriptor]),
    List(&'static [FieldDescriptor]),
}

impl FieldDescriptor {
    pub const fn scalar(v2: &'static str, v3: &'static str) -> Self {
        Self {
            v2,
            v3,
            kind: FieldKind::Scalar,
        }
    }

    pub const fn object(v2: &'static str, v3: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self {
            v2,
            v3,
            kind: FieldKind::Object(fields),
        }
    }

    pub const fn list(v2: &'static str, v3: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self {
            v2,
            v3,
            kind: FieldKind::List(fields),
        }
    }
}

/// Layer descriptor: shared by Configuration's `layers`/`additional_inventory`
/// and Component's `state`/`state_append` (the latter gains `status` via the
/// record-kind-specific flattening pass in [`super::translate`], not here).
pub const LAYER_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scalar("cloneUrl", "clone_url"),
    FieldDescriptor::scalar("source", "source"),
    FieldDescriptor::scalar("playbook", "playbook"),
    FieldDescriptor::scalar("branch", "branch"),
    FieldDescriptor::scalar("commit", "commit"),
];

pub const CONFIGURATION_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scalar("name", "name"),
    FieldDescriptor::list("layers", "layers", LAYER_FIELDS),
    FieldDescriptor::object("additionalInventory", "additional_inventory", LAYER_FIELDS),
    FieldDescriptor::scalar("lastUpdated", "last_updated"),
    FieldDescriptor::scalar("tenantName", "tenant_name"),
];

/// Component's `state` entries carry `status` verbatim in v3; the v2 flattening
/// of `status` into `commit` is handled by the pre/post pass, so `status`
/// itself is intentionally absent here to avoid double-translation.
pub const COMPONENT_LAYER_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scalar("cloneUrl", "clone_url"),
    FieldDescriptor::scalar("playbook", "playbook"),
    FieldDescriptor::scalar("commit", "commit"),
    FieldDescriptor::scalar("lastUpdated", "last_updated"),
];

pub const COMPONENT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scalar("id", "id"),
    FieldDescriptor::scalar("enabled", "enabled"),
    FieldDescriptor::scalar("desiredConfig", "desired_config"),
    FieldDescriptor::list("state", "state", COMPONENT_LAYER_FIELDS),
    FieldDescriptor::object("stateAppend", "state_append", COMPONENT_LAYER_FIELDS),
    FieldDescriptor::scalar("retryPolicy", "retry_policy"),
    FieldDescriptor::scalar("errorCount", "error_count"),
    FieldDescriptor::scalar("tags", "tags"),
    FieldDescriptor::scalar("configurationStatus", "configuration_status"),
];

pub const CREDENTIALS_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scalar("authenticationMethod", "authentication_method"),
    FieldDescriptor::scalar("secretName", "secret_name"),
];

pub const SOURCE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scalar("name", "name"),
    FieldDescriptor::scalar("cloneUrl", "clone_url"),
    FieldDescriptor::object("credentials", "credentials", CREDENTIALS_FIELDS),
    FieldDescriptor::scalar("caCert", "ca_cert"),
    FieldDescriptor::scalar("lastUpdated", "last_updated"),
];

pub const OPTIONS_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scalar("defaultPlaybook", "default_playbook"),
    FieldDescriptor::scalar("defaultAnsibleConfig", "default_ansible_config"),
    FieldDescriptor::scalar("defaultBatcherRetryPolicy", "default_batcher_retry_policy"),
    FieldDescriptor::scalar("batcherCheckInterval", "batcher_check_interval"),
    FieldDescriptor::scalar("batchSize", "batch_size"),
    FieldDescriptor::scalar("batchWindow", "batch_window"),
    FieldDescriptor::scalar("defaultPageSize", "default_page_size"),
    FieldDescriptor::scalar("loggingLevel", "logging_level"),
    FieldDescriptor::scalar("includeAraLinks", "include_ara_links"),
    FieldDescriptor::scalar("additionalInventorySource", "additional_inventory_source"),
];
