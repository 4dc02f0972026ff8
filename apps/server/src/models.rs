use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct VolumesQuery {
    /// Selection such as `1,2,5-7`.
    pub volumes: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub status: &'static str,
    pub cache_degraded: bool,
    pub providers: Vec<String>,
    pub scheduler_enabled: bool,
}
