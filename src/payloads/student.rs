use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct SubmitSolutionPayload {
    pub user_id: i64,
    pub challenge_id: i64,
    pub code: String,
}

#[derive(Deserialize, Debug)]
pub struct ExecutePayload {
    pub source_code: String,
    /// Defaults to the fallback (primary) language.
    pub language_id: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct ChallengeParams {
    pub user_id: Option<i64>,
}
