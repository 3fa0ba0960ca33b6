use super::{ConfigError, OrgConfig};
use crate::storage::{ObjectStore, StorageError};

/// Object-store folder holding one `{org_id}.json` per organization.
pub const ORG_CONFIG_PREFIX: &str = "org-config/";

pub fn org_config_key(org_id: &str) -> String {
    format!("{ORG_CONFIG_PREFIX}{org_id}.json")
}

/// Load an organization's configuration.
///
/// A missing file is not an error: the organization simply has no rules.
/// A file that exists but does not parse is fatal.
pub fn load_org_config(store: &dyn ObjectStore, org_id: &str) -> Result<OrgConfig, ConfigError> {
    let key = org_config_key(org_id);
    let body = match store.get(&key) {
        Ok(body) => body,
        Err(StorageError::NotFound(_)) => {
            tracing::warn!(org_id, key = %key, "No configuration stored, using empty rule set");
            return Ok(OrgConfig::empty(org_id));
        }
        Err(e) => return Err(e.into()),
    };

    let mut config: OrgConfig =
        serde_json::from_slice(&body).map_err(|source| ConfigError::Parse {
            org_id: org_id.to_string(),
            source,
        })?;
    if config.organization_id != org_id {
        if !config.organization_id.is_empty() {
            tracing::warn!(
                org_id,
                stored = %config.organization_id,
                "Stored organization id differs from its key, using the key"
            );
        }
        config.organization_id = org_id.to_string();
    }
    config.irp.resolve();

    tracing::info!(
        org_id,
        version = %config.version,
        rules = config.rules.len(),
        fields = config.field_mappings.len(),
        "Loaded organization configuration"
    );
    Ok(config)
}
