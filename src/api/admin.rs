use super::helper;
use crate::model::admin::{
    BadgeRow, ChallengeAnalytics, DashboardStats, LeaderboardEntry, NewBadge,
    SaveSettingsResponse, SettingsTab, SubmissionListItem, UserRow,
    sort_by_difficulty,
};
use crate::payloads::admin::{
    AdjustXpPayload, CreateBadgePayload, SaveSettingsPayload, SubmissionFilterParams,
};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        badges::dsl as badges_dsl, challenges::dsl as challenges_dsl, labs::dsl as labs_dsl,
        modules::dsl as modules_dsl, platform_settings::dsl as settings_dsl,
        submissions::dsl as sub_dsl, users::dsl as users_dsl,
    },
    settings,
};
use anyhow::anyhow;
use axum::extract::{Path, Query};
use axum::{extract::State, response::Json};
use deadpool_diesel::postgres::Pool;
use diesel::dsl::{count_star, not};
use diesel::prelude::*;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::log::warn;
use tracing::{debug, error, info, instrument};

const RECENT_SUBMISSIONS: i64 = 8;
const DEFAULT_SUBMISSION_LIMIT: i64 = 50;
const MAX_SUBMISSION_LIMIT: i64 = 500;

fn load_submissions(
    conn: &mut PgConnection,
    user_id: Option<i64>,
    challenge_id: Option<i64>,
    limit: i64,
) -> QueryResult<Vec<SubmissionListItem>> {
    let mut query = sub_dsl::submissions
        .inner_join(users_dsl::users)
        .inner_join(challenges_dsl::challenges)
        .select((
            sub_dsl::id,
            sub_dsl::user_id,
            users_dsl::username,
            sub_dsl::challenge_id,
            challenges_dsl::title,
            sub_dsl::status,
            sub_dsl::output,
            sub_dsl::xp_awarded,
            sub_dsl::submitted_at,
        ))
        .into_boxed();
    if let Some(user_id) = user_id {
        query = query.filter(sub_dsl::user_id.eq(user_id));
    }
    if let Some(challenge_id) = challenge_id {
        query = query.filter(sub_dsl::challenge_id.eq(challenge_id));
    }
    query
        .order((sub_dsl::submitted_at.desc(), sub_dsl::id.desc()))
        .limit(limit)
        .load::<SubmissionListItem>(conn)
}

/// Platform-wide counts and the most recent submissions.
///
/// Returns (wrapped in `ApiResponse`)
/// * `DashboardStats` (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_dashboard(State(pool): State<Pool>) -> Result<ApiResponse<DashboardStats>, AppError> {
    info!("Building admin dashboard");

    let stats = helper::run_query(&pool, |conn| {
        Ok(DashboardStats {
            users: users_dsl::users.count().get_result(conn)?,
            labs: labs_dsl::labs.count().get_result(conn)?,
            modules: modules_dsl::modules.count().get_result(conn)?,
            challenges: challenges_dsl::challenges.count().get_result(conn)?,
            published_challenges: challenges_dsl::challenges
                .filter(challenges_dsl::is_published.eq(true))
                .count()
                .get_result(conn)?,
            submissions: sub_dsl::submissions.count().get_result(conn)?,
            badges: badges_dsl::badges.count().get_result(conn)?,
            recent_submissions: load_submissions(conn, None, None, RECENT_SUBMISSIONS)?,
        })
    })
    .await?;

    debug!("Dashboard stats: {:?}", stats);
    Ok(ApiResponse::ok(stats))
}

/// Lists all settings grouped by tab.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<SettingsTab>` (200 OK).
#[instrument(skip(pool))]
pub async fn list_settings(State(pool): State<Pool>) -> Result<ApiResponse<Vec<SettingsTab>>, AppError> {
    info!("Fetching platform settings");

    let rows = helper::run_query(&pool, settings::load_rows).await?;

    let mut tabs: Vec<SettingsTab> = Vec::new();
    for row in rows {
        match tabs.iter_mut().find(|t| t.tab == row.tab) {
            Some(tab) => tab.settings.push(row),
            None => tabs.push(SettingsTab {
                tab: row.tab.clone(),
                settings: vec![row],
            }),
        }
    }

    info!("Successfully fetched {} settings tabs", tabs.len());
    Ok(ApiResponse::ok(tabs))
}

fn setting_text(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Stores new values for existing settings. Keys starting with `_` and keys
/// that do not exist are ignored. Values are not validated.
///
/// Request Body: `SaveSettingsPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `SaveSettingsResponse` listing updated and ignored keys (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn save_settings(
    State(pool): State<Pool>,
    Json(payload): Json<SaveSettingsPayload>,
) -> Result<ApiResponse<SaveSettingsResponse>, AppError> {
    info!("Saving {} submitted settings", payload.values.len());
    debug!("Save settings payload: {:?}", payload);

    let values: HashMap<String, String> = payload
        .values
        .into_iter()
        .map(|(k, v)| (k, setting_text(v)))
        .collect();

    let conn = pool.get().await?;
    let mut response = conn
        .interact(move |conn| {
            conn.transaction(|tx| {
                let mut updated = Vec::new();
                let mut ignored = Vec::new();
                for (key, value) in values {
                    if key.starts_with('_') {
                        ignored.push(key);
                        continue;
                    }
                    let rows_affected = diesel::update(settings_dsl::platform_settings.find(&key))
                        .set(settings_dsl::value.eq(&value))
                        .execute(tx)?;
                    if rows_affected == 0 {
                        warn!("Ignoring unknown setting key '{}'", key);
                        ignored.push(key);
                    } else {
                        updated.push(key);
                    }
                }
                Ok::<_, diesel::result::Error>(SaveSettingsResponse { updated, ignored })
            })
        })
        .await??;

    response.updated.sort();
    response.ignored.sort();
    info!("Updated {} settings", response.updated.len());
    Ok(ApiResponse::ok(response))
}

/// Lists all users.
#[instrument(skip(pool))]
pub async fn list_users(State(pool): State<Pool>) -> Result<ApiResponse<Vec<UserRow>>, AppError> {
    let users = helper::run_query(&pool, |conn| {
        users_dsl::users
            .order(users_dsl::id.asc())
            .select(UserRow::as_select())
            .load(conn)
    })
    .await?;

    info!("Successfully fetched {} users", users.len());
    Ok(ApiResponse::ok(users))
}

/// Flips a user's admin flag.
///
/// Returns (wrapped in `ApiResponse`)
/// * `UserRow` after the change (200 OK).
/// * `404 Not Found`: If the user does not exist.
#[instrument(skip(pool))]
pub async fn toggle_admin(
    State(pool): State<Pool>,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<UserRow>, AppError> {
    let user = helper::run_query(&pool, move |conn| {
        diesel::update(users_dsl::users.find(user_id))
            .set(users_dsl::is_admin.eq(not(users_dsl::is_admin)))
            .returning(UserRow::as_returning())
            .get_result(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User with ID {} not found.", user_id)))?;

    info!("User {} admin flag is now {}", user_id, user.is_admin);
    Ok(ApiResponse::ok(user))
}

/// Flips a user's ban flag.
///
/// Returns (wrapped in `ApiResponse`)
/// * `UserRow` after the change (200 OK).
/// * `404 Not Found`: If the user does not exist.
#[instrument(skip(pool))]
pub async fn toggle_ban(
    State(pool): State<Pool>,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<UserRow>, AppError> {
    let user = helper::run_query(&pool, move |conn| {
        diesel::update(users_dsl::users.find(user_id))
            .set(users_dsl::is_banned.eq(not(users_dsl::is_banned)))
            .returning(UserRow::as_returning())
            .get_result(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User with ID {} not found.", user_id)))?;

    info!("User {} banned flag is now {}", user_id, user.is_banned);
    Ok(ApiResponse::ok(user))
}

/// Adds a signed delta to a user's XP; the total never drops below zero.
///
/// Request Body: `AdjustXpPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `UserRow` after the change (200 OK).
/// * `404 Not Found`: If the user does not exist.
#[instrument(skip(pool))]
pub async fn adjust_xp(
    State(pool): State<Pool>,
    Path(user_id): Path<i64>,
    Json(payload): Json<AdjustXpPayload>,
) -> Result<ApiResponse<UserRow>, AppError> {
    info!("Adjusting XP of user {} by {}", user_id, payload.delta);
    let delta = payload.delta;

    let conn = pool.get().await?;
    let user = conn
        .interact(move |conn| {
            conn.transaction(|tx| {
                let current = users_dsl::users
                    .find(user_id)
                    .select(users_dsl::total_xp)
                    .for_update()
                    .first::<i32>(tx)
                    .optional()?;
                let Some(current) = current else {
                    return Err(AppError::NotFound(format!(
                        "User with ID {} not found.",
                        user_id
                    )));
                };
                let new_total = current.saturating_add(delta).max(0);
                let user = diesel::update(users_dsl::users.find(user_id))
                    .set(users_dsl::total_xp.eq(new_total))
                    .returning(UserRow::as_returning())
                    .get_result(tx)?;
                Ok(user)
            })
        })
        .await??;

    info!("User {} now has {} XP", user_id, user.total_xp);
    Ok(ApiResponse::ok(user))
}

/// Users ranked by XP, ties broken by username.
#[instrument(skip(pool))]
pub async fn get_leaderboard(
    State(pool): State<Pool>,
) -> Result<ApiResponse<Vec<LeaderboardEntry>>, AppError> {
    let rows = helper::run_query(&pool, |conn| {
        users_dsl::users
            .order((users_dsl::total_xp.desc(), users_dsl::username.asc()))
            .select((users_dsl::id, users_dsl::username, users_dsl::total_xp))
            .load::<(i64, String, i32)>(conn)
    })
    .await?;

    let leaderboard = rows
        .into_iter()
        .enumerate()
        .map(|(idx, (user_id, username, total_xp))| LeaderboardEntry {
            rank: idx + 1,
            user_id,
            username,
            total_xp,
        })
        .collect();
    Ok(ApiResponse::ok(leaderboard))
}

/// Lists badges by XP threshold.
#[instrument(skip(pool))]
pub async fn list_badges(State(pool): State<Pool>) -> Result<ApiResponse<Vec<BadgeRow>>, AppError> {
    let badges = helper::run_query(&pool, |conn| {
        badges_dsl::badges
            .order((badges_dsl::required_xp.asc(), badges_dsl::id.asc()))
            .select(BadgeRow::as_select())
            .load(conn)
    })
    .await?;
    Ok(ApiResponse::ok(badges))
}

/// Creates a badge.
///
/// Request Body: `CreateBadgePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `BadgeRow` (200 OK).
/// * `400 Bad Request`: If the name is blank or the threshold negative.
#[instrument(skip(pool, payload))]
pub async fn create_badge(
    State(pool): State<Pool>,
    Json(payload): Json<CreateBadgePayload>,
) -> Result<ApiResponse<BadgeRow>, AppError> {
    debug!("Create badge payload: {:?}", payload);
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("Badge name must not be empty.".to_string()));
    }
    if payload.required_xp < 0 {
        return Err(AppError::BadRequest(
            "Badge required_xp must not be negative.".to_string(),
        ));
    }

    let new_badge = NewBadge {
        name: payload.name.trim().to_string(),
        description: payload.description,
        image_url: payload.image_url,
        required_xp: payload.required_xp,
    };

    let badge = helper::run_query(&pool, move |conn| {
        diesel::insert_into(badges_dsl::badges)
            .values(&new_badge)
            .returning(BadgeRow::as_returning())
            .get_result(conn)
    })
    .await?;

    info!("Created badge {} ({})", badge.id, badge.name);
    Ok(ApiResponse::ok(badge))
}

/// Deletes a badge.
///
/// Returns (wrapped in `ApiResponse`)
/// * `()` (200 OK).
/// * `404 Not Found`: If the badge does not exist.
#[instrument(skip(pool))]
pub async fn delete_badge(
    State(pool): State<Pool>,
    Path(badge_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(badges_dsl::badges.find(badge_id)).execute(conn)
    })
    .await?;

    match rows_affected {
        0 => Err(AppError::NotFound(format!(
            "Badge with ID {} not found.",
            badge_id
        ))),
        1 => {
            info!("Deleted badge {}", badge_id);
            Ok(ApiResponse::ok(()))
        }
        n => {
            error!("Deleting badge {} affected {} rows", badge_id, n);
            Err(AppError::InternalServerError(anyhow!(
                "Badge deletion affected {} rows",
                n
            )))
        }
    }
}

/// Submissions newest first, optionally filtered by user and challenge.
///
/// Query Parameters: `SubmissionFilterParams`
#[instrument(skip(pool))]
pub async fn list_submissions(
    State(pool): State<Pool>,
    Query(params): Query<SubmissionFilterParams>,
) -> Result<ApiResponse<Vec<SubmissionListItem>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SUBMISSION_LIMIT)
        .clamp(1, MAX_SUBMISSION_LIMIT);

    let submissions = helper::run_query(&pool, move |conn| {
        load_submissions(conn, params.user_id, params.challenge_id, limit)
    })
    .await?;

    info!("Successfully fetched {} submissions", submissions.len());
    Ok(ApiResponse::ok(submissions))
}

/// Pass rates and difficulty per published challenge, hardest first.
#[instrument(skip(pool))]
pub async fn get_analytics(
    State(pool): State<Pool>,
) -> Result<ApiResponse<Vec<ChallengeAnalytics>>, AppError> {
    let (challenges, counts) = helper::run_query(&pool, |conn| {
        let challenges = challenges_dsl::challenges
            .filter(challenges_dsl::is_published.eq(true))
            .select((challenges_dsl::id, challenges_dsl::title))
            .load::<(i64, String)>(conn)?;
        let counts = sub_dsl::submissions
            .group_by((sub_dsl::challenge_id, sub_dsl::status))
            .select((sub_dsl::challenge_id, sub_dsl::status, count_star()))
            .load::<(i64, String, i64)>(conn)?;
        Ok((challenges, counts))
    })
    .await?;

    let mut totals: HashMap<i64, (i64, i64)> = HashMap::new();
    for (challenge_id, status, count) in counts {
        let entry = totals.entry(challenge_id).or_default();
        entry.0 += count;
        if status == "passed" {
            entry.1 += count;
        }
    }

    let mut report: Vec<ChallengeAnalytics> = challenges
        .into_iter()
        .map(|(id, title)| {
            let (total, passed) = totals.get(&id).copied().unwrap_or_default();
            ChallengeAnalytics::new(id, title, total, passed)
        })
        .collect();
    sort_by_difficulty(&mut report);

    let flagged = report.iter().filter(|r| r.needs_attention).count();
    if flagged > 0 {
        warn!("{} challenges have many attempts and no passes", flagged);
    }
    Ok(ApiResponse::ok(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setting_values_keep_plain_text() {
        assert_eq!(setting_text(json!("abc")), "abc");
        assert_eq!(setting_text(json!(true)), "true");
        assert_eq!(setting_text(json!(7)), "7");
        assert_eq!(setting_text(JsonValue::Null), "");
    }
}
