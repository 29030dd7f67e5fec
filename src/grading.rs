//! Grading and progress: runs a submission, decides pass/fail, and records
//! the attempt together with its progress and XP effects in one transaction.

use crate::errors::AppError;
use crate::execution::ExecutionGateway;
use crate::model::student::{NewProgress, NewSubmission, ProgressRow, SubmissionResult};
use crate::schema::{
    challenges::dsl as challenges_dsl, submissions::dsl as sub_dsl,
    user_progress::dsl as progress_dsl, users::dsl as users_dsl,
};
use crate::settings::{PlatformSettings, XpRules};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

/// How program output is compared with a challenge's expected output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMatch {
    /// Byte-for-byte equality.
    Exact,
    /// Equality after stripping leading and trailing whitespace.
    #[default]
    Trim,
    /// Line endings unified, trailing whitespace on each line and trailing
    /// blank lines ignored.
    Normalize,
}

impl FromStr for OutputMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(OutputMatch::Exact),
            "trim" => Ok(OutputMatch::Trim),
            "normalize" => Ok(OutputMatch::Normalize),
            other => Err(format!("unknown output comparison '{}'", other)),
        }
    }
}

impl OutputMatch {
    pub fn matches(self, actual: &str, expected: &str) -> bool {
        match self {
            OutputMatch::Exact => actual == expected,
            OutputMatch::Trim => actual.trim() == expected.trim(),
            OutputMatch::Normalize => normalize_lines(actual) == normalize_lines(expected),
        }
    }
}

fn normalize_lines(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let joined = unified
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    joined.trim_end_matches('\n').to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Passed,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Passed => "passed",
            SubmissionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub is_completed: bool,
    pub failed_attempts: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub progress: ProgressState,
    pub xp_awarded: i32,
    pub first_try: bool,
}

/// Applies one graded attempt to a progress row.
///
/// `prior_submissions` counts the user's earlier submissions for the same
/// challenge; the first-try bonus requires it to be zero. A completed row
/// never changes again and earns nothing further.
pub fn apply_attempt(
    current: ProgressState,
    passed: bool,
    prior_submissions: i64,
    rules: XpRules,
) -> AttemptOutcome {
    if current.is_completed {
        return AttemptOutcome {
            progress: current,
            xp_awarded: 0,
            first_try: false,
        };
    }

    if passed {
        let first_try = prior_submissions == 0;
        let bonus = if first_try { rules.xp_per_first_try } else { 0 };
        AttemptOutcome {
            progress: ProgressState {
                is_completed: true,
                failed_attempts: current.failed_attempts,
            },
            xp_awarded: rules.xp_per_level.saturating_add(bonus),
            first_try,
        }
    } else {
        AttemptOutcome {
            progress: ProgressState {
                is_completed: false,
                failed_attempts: current.failed_attempts.saturating_add(1),
            },
            xp_awarded: 0,
            first_try: false,
        }
    }
}

/// Postgres text cannot hold NUL, so it becomes U+FFFD before storage.
fn storable_text(text: String) -> String {
    if text.contains('\0') {
        text.replace('\0', "\u{FFFD}")
    } else {
        text
    }
}

/// Whether a challenge's repo link is revealed after `failed_attempts`.
pub fn repo_link_unlocked(failed_attempts: i32, max_fail_unlock: i32) -> bool {
    failed_attempts >= max_fail_unlock
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::challenges)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct GradingTarget {
    id: i64,
    language_id: i32,
    expected_output: String,
    is_published: bool,
    repo_link: Option<String>,
}

struct Attempt {
    user_id: i64,
    challenge_id: i64,
    source_code: String,
    status: SubmissionStatus,
    output: String,
}

struct Recorded {
    submission_id: i64,
    outcome: AttemptOutcome,
    total_xp: i32,
}

fn load_context(
    conn: &mut PgConnection,
    user_id: i64,
    challenge_id: i64,
) -> Result<(GradingTarget, PlatformSettings), AppError> {
    let target = challenges_dsl::challenges
        .find(challenge_id)
        .select(GradingTarget::as_select())
        .first(conn)
        .optional()?
        .filter(|c| c.is_published)
        .ok_or_else(|| {
            warn!("Challenge {} not found or unpublished", challenge_id);
            AppError::NotFound(format!("Challenge with ID {} not found.", challenge_id))
        })?;

    let is_banned = users_dsl::users
        .find(user_id)
        .select(users_dsl::is_banned)
        .first::<bool>(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("User with ID {} not found.", user_id)))?;

    if is_banned {
        warn!("Banned user {} attempted to submit", user_id);
        return Err(AppError::Forbidden(format!(
            "User with ID {} is banned.",
            user_id
        )));
    }

    let settings = PlatformSettings::load(conn)?;
    if settings.maintenance_mode {
        return Err(AppError::ServiceUnavailable(
            "The platform is in maintenance mode.".to_string(),
        ));
    }

    Ok((target, settings))
}

fn record_attempt(
    conn: &mut PgConnection,
    attempt: &Attempt,
    rules: XpRules,
) -> QueryResult<Recorded> {
    diesel::insert_into(progress_dsl::user_progress)
        .values(&NewProgress {
            user_id: attempt.user_id,
            challenge_id: attempt.challenge_id,
            is_completed: false,
            failed_attempts: 0,
        })
        .on_conflict((progress_dsl::user_id, progress_dsl::challenge_id))
        .do_nothing()
        .execute(conn)?;

    let current = progress_dsl::user_progress
        .filter(progress_dsl::user_id.eq(attempt.user_id))
        .filter(progress_dsl::challenge_id.eq(attempt.challenge_id))
        .select(ProgressRow::as_select())
        .for_update()
        .first(conn)?;

    let prior_submissions = sub_dsl::submissions
        .filter(sub_dsl::user_id.eq(attempt.user_id))
        .filter(sub_dsl::challenge_id.eq(attempt.challenge_id))
        .count()
        .get_result::<i64>(conn)?;

    let state = ProgressState {
        is_completed: current.is_completed,
        failed_attempts: current.failed_attempts,
    };
    let outcome = apply_attempt(
        state,
        attempt.status == SubmissionStatus::Passed,
        prior_submissions,
        rules,
    );
    debug!(
        "Progress {} moves from {:?} to {:?} (prior submissions: {})",
        current.id, state, outcome.progress, prior_submissions
    );

    let submission_id = diesel::insert_into(sub_dsl::submissions)
        .values(&NewSubmission {
            user_id: attempt.user_id,
            challenge_id: attempt.challenge_id,
            submitted_code: &attempt.source_code,
            status: attempt.status.as_str(),
            output: &attempt.output,
            xp_awarded: outcome.xp_awarded,
        })
        .returning(sub_dsl::id)
        .get_result::<i64>(conn)?;

    if outcome.progress != state {
        diesel::update(progress_dsl::user_progress.find(current.id))
            .set((
                progress_dsl::is_completed.eq(outcome.progress.is_completed),
                progress_dsl::failed_attempts.eq(outcome.progress.failed_attempts),
            ))
            .execute(conn)?;
    }

    let current_xp = users_dsl::users
        .find(attempt.user_id)
        .select(users_dsl::total_xp)
        .for_update()
        .first::<i32>(conn)?;
    let total_xp = current_xp.saturating_add(outcome.xp_awarded);
    if total_xp != current_xp {
        diesel::update(users_dsl::users.find(attempt.user_id))
            .set(users_dsl::total_xp.eq(total_xp))
            .execute(conn)?;
    }

    Ok(Recorded {
        submission_id,
        outcome,
        total_xp,
    })
}

/// Grades `source_code` for a published challenge and records the attempt.
///
/// Execution failures are not errors here: they produce a `"failed"`
/// submission whose output carries the error text. The database connection
/// is released while the code runs.
#[instrument(skip(pool, gateway, source_code))]
pub async fn grade(
    pool: &Pool,
    gateway: &ExecutionGateway,
    user_id: i64,
    challenge_id: i64,
    source_code: String,
) -> Result<SubmissionResult, AppError> {
    let conn = pool.get().await?;
    let (target, settings) = conn
        .interact(move |conn| load_context(conn, user_id, challenge_id))
        .await??;
    drop(conn);

    let (status, output) = match gateway.execute(&source_code, target.language_id).await {
        Ok(result) => {
            let status = if settings
                .output_match
                .matches(&result.output, &target.expected_output)
            {
                SubmissionStatus::Passed
            } else {
                SubmissionStatus::Failed
            };
            (status, result.output)
        }
        Err(err) => {
            warn!(
                "Execution failed while grading challenge {} for user {}: {}",
                target.id, user_id, err
            );
            (SubmissionStatus::Failed, err.to_string())
        }
    };

    let attempt = Attempt {
        user_id,
        challenge_id,
        source_code: storable_text(source_code),
        status,
        output: storable_text(output),
    };
    let rules = settings.xp;

    let conn = pool.get().await?;
    let (recorded, attempt) = conn
        .interact(move |conn| {
            conn.transaction(|tx| record_attempt(tx, &attempt, rules))
                .map(|recorded| (recorded, attempt))
        })
        .await??;

    let failed_attempts = recorded.outcome.progress.failed_attempts;
    let repo_link = target
        .repo_link
        .filter(|_| repo_link_unlocked(failed_attempts, settings.max_fail_unlock));

    info!(
        "Submission {} for challenge {} by user {}: {} (+{} XP)",
        recorded.submission_id, challenge_id, user_id, attempt.status, recorded.outcome.xp_awarded
    );

    Ok(SubmissionResult {
        submission_id: recorded.submission_id,
        challenge_id,
        status: attempt.status.as_str().to_string(),
        passed: attempt.status == SubmissionStatus::Passed,
        output: attempt.output,
        xp_awarded: recorded.outcome.xp_awarded,
        first_try: recorded.outcome.first_try,
        is_completed: recorded.outcome.progress.is_completed,
        failed_attempts,
        total_xp: recorded.total_xp,
        repo_link,
    })
}
