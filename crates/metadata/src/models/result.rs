use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProviderId, VolumeFields};

/// Raw field set returned by one provider call for one volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider_id: ProviderId,
    pub volume: u32,
    pub fields: VolumeFields,
    pub fetched_at: DateTime<Utc>,
}

impl ProviderResult {
    pub fn new(provider_id: impl Into<ProviderId>, volume: u32, fields: VolumeFields) -> Self {
        Self {
            provider_id: provider_id.into(),
            volume,
            fields: fields.normalized(),
            fetched_at: Utc::now(),
        }
    }
}
