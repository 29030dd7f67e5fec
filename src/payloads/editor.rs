use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct LabPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order_number: i32,
}

#[derive(Deserialize, Debug)]
pub struct ModulePayload {
    pub lab_id: i64,
    #[serde(default)]
    pub order_number: i32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ModuleListParams {
    pub lab_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct ChallengePayload {
    pub module_id: i64,
    #[serde(default)]
    pub order_number: i32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_editor_file_name")]
    pub editor_file_name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub hint_text: String,
    #[serde(default)]
    pub official_solution: String,
    #[serde(default)]
    pub walkthrough_video_url: Option<String>,
    #[serde(default = "default_language_id")]
    pub language_id: i32,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub repo_link: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChallengeListParams {
    pub module_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct MediaListParams {
    pub q: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct MediaMetadataPayload {
    pub title: Option<String>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub description: Option<String>,
}

fn default_editor_file_name() -> String {
    "script.py".to_string()
}

fn default_language_id() -> i32 {
    71
}
