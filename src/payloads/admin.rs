use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Setting key to new value. Non-string JSON values are stored as their
/// JSON text (`true`, `5`).
#[derive(Deserialize, Debug)]
#[serde(transparent)]
pub struct SaveSettingsPayload {
    pub values: HashMap<String, JsonValue>,
}

#[derive(Deserialize, Debug)]
pub struct AdjustXpPayload {
    pub delta: i32,
}

#[derive(Deserialize, Debug)]
pub struct CreateBadgePayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: String,
    pub required_xp: i32,
}

#[derive(Deserialize, Debug)]
pub struct SubmissionFilterParams {
    pub user_id: Option<i64>,
    pub challenge_id: Option<i64>,
    pub limit: Option<i64>,
}
