use crate::schema::{challenges, labs, modules, submissions, user_progress};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

// Public rows. Every struct here names its columns explicitly; a column
// added to a table stays private until it is listed.

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = labs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PublicLab {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub order_number: i32,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = modules)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PublicModule {
    pub id: i64,
    pub lab_id: i64,
    pub order_number: i32,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = challenges)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PublicChallengeSummary {
    pub id: i64,
    pub module_id: i64,
    pub order_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub language_id: i32,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = challenges)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PublicChallenge {
    pub id: i64,
    pub module_id: i64,
    pub order_number: i32,
    pub title: String,
    pub description: Option<String>,
    pub editor_file_name: String,
    pub instructions: String,
    pub starter_code: String,
    pub hint_text: String,
    pub walkthrough_video_url: Option<String>,
    pub language_id: i32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModuleWithChallenges {
    #[serde(flatten)]
    pub module: PublicModule,
    pub challenges: Vec<PublicChallengeSummary>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressView {
    pub is_completed: bool,
    pub failed_attempts: i32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ChallengeView {
    #[serde(flatten)]
    pub challenge: PublicChallenge,
    /// Only present once the requesting user has unlocked it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressView>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HealthResponse {
    pub message: String,
    pub platform_name: String,
    pub platform_tagline: String,
}

// Grading rows.

#[derive(Queryable, Selectable, Debug, Clone, Copy)]
#[diesel(table_name = user_progress)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProgressRow {
    pub id: i64,
    pub user_id: i64,
    pub challenge_id: i64,
    pub is_completed: bool,
    pub failed_attempts: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = user_progress)]
pub struct NewProgress {
    pub user_id: i64,
    pub challenge_id: i64,
    pub is_completed: bool,
    pub failed_attempts: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = submissions)]
pub struct NewSubmission<'a> {
    pub user_id: i64,
    pub challenge_id: i64,
    pub submitted_code: &'a str,
    pub status: &'a str,
    pub output: &'a str,
    pub xp_awarded: i32,
    // submitted_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub submission_id: i64,
    pub challenge_id: i64,
    pub status: String,
    pub passed: bool,
    pub output: String,
    pub xp_awarded: i32,
    pub first_try: bool,
    pub is_completed: bool,
    pub failed_attempts: i32,
    pub total_xp: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_link: Option<String>,
}

// Per-user reads.

#[derive(Queryable, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ChallengeProgress {
    pub challenge_id: i64,
    pub challenge_title: String,
    pub module_id: i64,
    pub is_completed: bool,
    pub failed_attempts: i32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EarnedBadge {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image_url: String,
    pub required_xp: i32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NextBadge {
    #[serde(flatten)]
    pub badge: EarnedBadge,
    pub xp_remaining: i32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub total_xp: i32,
    pub completed_challenges: i64,
    pub created_at: DateTime<Utc>,
    pub badges: Vec<EarnedBadge>,
    pub next_badge: Option<NextBadge>,
}
