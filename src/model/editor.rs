use crate::schema::{challenges, labs, media_items, modules};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = labs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LabRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub order_number: i32,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = labs)]
pub struct LabChanges {
    pub name: String,
    pub description: String,
    pub order_number: i32,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = modules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ModuleRow {
    pub id: i64,
    pub lab_id: i64,
    pub order_number: i32,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = modules)]
#[diesel(treat_none_as_null = true)]
pub struct ModuleChanges {
    pub lab_id: i64,
    pub order_number: i32,
    pub title: String,
    pub description: Option<String>,
}

/// Full challenge row including the answer fields. Editor routes only.
#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = challenges)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChallengeRow {
    pub id: i64,
    pub module_id: i64,
    pub order_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub editor_file_name: String,
    pub instructions: String,
    pub starter_code: String,
    pub expected_output: String,
    pub hint_text: String,
    pub official_solution: String,
    pub walkthrough_video_url: Option<String>,
    pub language_id: i32,
    pub is_published: bool,
    pub repo_link: Option<String>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = challenges)]
#[diesel(treat_none_as_null = true)]
pub struct ChallengeChanges {
    pub module_id: i64,
    pub order_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub editor_file_name: String,
    pub instructions: String,
    pub starter_code: String,
    pub expected_output: String,
    pub hint_text: String,
    pub official_solution: String,
    pub walkthrough_video_url: Option<String>,
    pub language_id: i32,
    pub is_published: bool,
    pub repo_link: Option<String>,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = media_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MediaItemRow {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub title: String,
    pub alt_text: String,
    pub caption: String,
    pub description: String,
    pub metadata: JsonValue,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = media_items)]
pub struct NewMediaItem {
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub title: String,
    pub metadata: JsonValue,
    // alt_text, caption, description default to ''; uploaded_at to CURRENT_TIMESTAMP
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = media_items)]
pub struct MediaItemChanges {
    pub title: Option<String>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct UploadedMedia {
    pub item: MediaItemRow,
    pub url: String,
    pub variants: JsonValue,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedMedia>,
    pub skipped: Vec<String>,
}
