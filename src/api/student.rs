use super::helper;
use crate::execution::{ExecutionGateway, ExecutionOutput};
use crate::grading::{self, repo_link_unlocked};
use crate::model::admin::{BadgeRow, UserRow};
use crate::model::student::{
    ChallengeProgress, ChallengeView, EarnedBadge, HealthResponse, ModuleWithChallenges,
    NextBadge, ProgressView, PublicChallenge, PublicChallengeSummary, PublicLab, PublicModule,
    SubmissionResult, UserProfile,
};
use crate::payloads::student::{ChallengeParams, ExecutePayload, SubmitSolutionPayload};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        badges::dsl as badges_dsl, challenges::dsl as challenges_dsl, labs::dsl as labs_dsl,
        modules::dsl as modules_dsl, user_progress::dsl as progress_dsl, users::dsl as users_dsl,
    },
    settings::PlatformSettings,
};
use axum::extract::{Path, Query};
use axum::{extract::State, response::Json};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::log::warn;
use tracing::{debug, info, instrument};

/// Health check naming the platform.
///
/// Returns (wrapped in `ApiResponse`)
/// * `HealthResponse` (200 OK).
#[instrument(skip(pool))]
pub async fn health(State(pool): State<Pool>) -> Result<ApiResponse<HealthResponse>, AppError> {
    let settings = helper::load_settings(&pool).await?;
    Ok(ApiResponse::ok(HealthResponse {
        message: format!("{} API is running", settings.platform_name),
        platform_name: settings.platform_name,
        platform_tagline: settings.platform_tagline,
    }))
}

/// Lists all labs in display order.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<PublicLab>` (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn list_labs(State(pool): State<Pool>) -> Result<ApiResponse<Vec<PublicLab>>, AppError> {
    info!("Fetching labs");

    let labs = helper::run_query(&pool, |conn| {
        labs_dsl::labs
            .order((labs_dsl::order_number.asc(), labs_dsl::id.asc()))
            .select(PublicLab::as_select())
            .load(conn)
    })
    .await?;

    info!("Successfully fetched {} labs", labs.len());
    Ok(ApiResponse::ok(labs))
}

/// Lists the modules of a lab, each with its published challenges.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<ModuleWithChallenges>` (200 OK).
/// * `404 Not Found`: If the lab does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn list_lab_modules(
    State(pool): State<Pool>,
    Path(lab_id): Path<i64>,
) -> Result<ApiResponse<Vec<ModuleWithChallenges>>, AppError> {
    info!("Fetching modules for lab {}", lab_id);

    let loaded = helper::run_query(&pool, move |conn| {
        let lab_exists = diesel::dsl::select(diesel::dsl::exists(
            labs_dsl::labs.filter(labs_dsl::id.eq(lab_id)),
        ))
        .get_result::<bool>(conn)?;
        if !lab_exists {
            return Ok(None);
        }

        let modules = modules_dsl::modules
            .filter(modules_dsl::lab_id.eq(lab_id))
            .order((modules_dsl::order_number.asc(), modules_dsl::id.asc()))
            .select(PublicModule::as_select())
            .load(conn)?;

        let module_ids: Vec<i64> = modules.iter().map(|m| m.id).collect();
        let challenges = challenges_dsl::challenges
            .filter(challenges_dsl::module_id.eq_any(module_ids))
            .filter(challenges_dsl::is_published.eq(true))
            .order((challenges_dsl::order_number.asc(), challenges_dsl::id.asc()))
            .select(PublicChallengeSummary::as_select())
            .load(conn)?;

        Ok(Some((modules, challenges)))
    })
    .await?;

    let Some((modules, challenges)) = loaded else {
        warn!("Lab {} not found", lab_id);
        return Err(AppError::NotFound(format!(
            "Lab with ID {} not found.",
            lab_id
        )));
    };

    let response: Vec<ModuleWithChallenges> = modules
        .into_iter()
        .map(|module| {
            let own = challenges
                .iter()
                .filter(|c| c.module_id == module.id)
                .cloned()
                .collect();
            ModuleWithChallenges {
                module,
                challenges: own,
            }
        })
        .collect();

    info!(
        "Successfully fetched {} modules for lab {}",
        response.len(),
        lab_id
    );
    Ok(ApiResponse::ok(response))
}

/// Lists every published challenge ordered by lab, module and challenge position.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<PublicChallengeSummary>` (200 OK).
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn list_challenges(
    State(pool): State<Pool>,
) -> Result<ApiResponse<Vec<PublicChallengeSummary>>, AppError> {
    info!("Fetching published challenges");

    let challenges = helper::run_query(&pool, |conn| {
        challenges_dsl::challenges
            .inner_join(modules_dsl::modules.inner_join(labs_dsl::labs))
            .filter(challenges_dsl::is_published.eq(true))
            .order((
                labs_dsl::order_number.asc(),
                labs_dsl::id.asc(),
                modules_dsl::order_number.asc(),
                modules_dsl::id.asc(),
                challenges_dsl::order_number.asc(),
                challenges_dsl::id.asc(),
            ))
            .select(PublicChallengeSummary::as_select())
            .load(conn)
    })
    .await?;

    info!("Successfully fetched {} published challenges", challenges.len());
    Ok(ApiResponse::ok(challenges))
}

/// Fetches one published challenge. With `user_id`, the user's progress is
/// attached and the repo link is revealed once enough attempts have failed.
///
/// Returns (wrapped in `ApiResponse`)
/// * `ChallengeView` (200 OK).
/// * `404 Not Found`: If the challenge does not exist or is unpublished.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_challenge(
    State(pool): State<Pool>,
    Path(challenge_id): Path<i64>,
    Query(params): Query<ChallengeParams>,
) -> Result<ApiResponse<ChallengeView>, AppError> {
    info!(
        "Fetching challenge {} for user {:?}",
        challenge_id, params.user_id
    );
    let user_id = params.user_id;

    let loaded = helper::run_query(&pool, move |conn| {
        let found = challenges_dsl::challenges
            .filter(challenges_dsl::id.eq(challenge_id))
            .filter(challenges_dsl::is_published.eq(true))
            .select((PublicChallenge::as_select(), challenges_dsl::repo_link))
            .first::<(PublicChallenge, Option<String>)>(conn)
            .optional()?;
        let Some((challenge, repo_link)) = found else {
            return Ok(None);
        };

        let Some(user_id) = user_id else {
            return Ok(Some((challenge, repo_link, None, None)));
        };

        let progress = progress_dsl::user_progress
            .filter(progress_dsl::user_id.eq(user_id))
            .filter(progress_dsl::challenge_id.eq(challenge_id))
            .select((progress_dsl::is_completed, progress_dsl::failed_attempts))
            .first::<(bool, i32)>(conn)
            .optional()?
            .map(|(is_completed, failed_attempts)| ProgressView {
                is_completed,
                failed_attempts,
            });
        let settings = PlatformSettings::load(conn)?;

        Ok(Some((
            challenge,
            repo_link,
            progress,
            Some(settings.max_fail_unlock),
        )))
    })
    .await?;

    let Some((challenge, repo_link, progress, threshold)) = loaded else {
        warn!("Challenge {} not found or unpublished", challenge_id);
        return Err(AppError::NotFound(format!(
            "Challenge with ID {} not found.",
            challenge_id
        )));
    };

    let failed_attempts = progress.map(|p| p.failed_attempts).unwrap_or(0);
    let repo_link = match threshold {
        Some(threshold) if repo_link_unlocked(failed_attempts, threshold) => repo_link,
        _ => None,
    };

    debug!(
        "Challenge {} repo link revealed: {}",
        challenge_id,
        repo_link.is_some()
    );
    Ok(ApiResponse::ok(ChallengeView {
        challenge,
        repo_link,
        progress,
    }))
}

/// Runs code without grading or recording it.
///
/// Request Body: `ExecutePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `ExecutionOutput` (200 OK).
/// * `502 Bad Gateway`: If the code could not be executed.
/// * `503 Service Unavailable`: If maintenance mode is on.
#[instrument(skip(pool, gateway, payload))]
pub async fn execute(
    State(pool): State<Pool>,
    State(gateway): State<Arc<ExecutionGateway>>,
    Json(payload): Json<ExecutePayload>,
) -> Result<ApiResponse<ExecutionOutput>, AppError> {
    let settings = helper::load_settings(&pool).await?;
    if settings.maintenance_mode {
        warn!("Rejecting code execution during maintenance");
        return Err(AppError::ServiceUnavailable(
            "The platform is in maintenance mode.".to_string(),
        ));
    }

    let language_id = payload
        .language_id
        .unwrap_or(gateway.config().fallback.language_id);
    info!("Executing code for language {}", language_id);

    let output = gateway.execute(&payload.source_code, language_id).await?;
    Ok(ApiResponse::ok(output))
}

/// Grades a submission and records it.
///
/// Request Body: `SubmitSolutionPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `SubmissionResult` (200 OK), for passing and failing code alike.
/// * `403 Forbidden`: If the user is banned.
/// * `404 Not Found`: If the user or published challenge does not exist.
/// * `503 Service Unavailable`: If maintenance mode is on.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, gateway, payload))]
pub async fn submit_solution(
    State(pool): State<Pool>,
    State(gateway): State<Arc<ExecutionGateway>>,
    Json(payload): Json<SubmitSolutionPayload>,
) -> Result<ApiResponse<SubmissionResult>, AppError> {
    info!(
        "Attempting submission for challenge_id: {}, user_id: {}",
        payload.challenge_id, payload.user_id
    );

    let result = grading::grade(
        &pool,
        &gateway,
        payload.user_id,
        payload.challenge_id,
        payload.code,
    )
    .await?;

    Ok(ApiResponse::ok(result))
}

fn ensure_user_exists(conn: &mut PgConnection, user_id: i64) -> QueryResult<bool> {
    diesel::dsl::select(diesel::dsl::exists(
        users_dsl::users.filter(users_dsl::id.eq(user_id)),
    ))
    .get_result::<bool>(conn)
}

/// Lists a user's progress rows with challenge titles.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<ChallengeProgress>` (200 OK).
/// * `404 Not Found`: If the user does not exist.
#[instrument(skip(pool))]
pub async fn get_user_progress(
    State(pool): State<Pool>,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<Vec<ChallengeProgress>>, AppError> {
    info!("Fetching progress for user {}", user_id);

    let rows = helper::run_query(&pool, move |conn| {
        if !ensure_user_exists(conn, user_id)? {
            return Ok(None);
        }
        progress_dsl::user_progress
            .inner_join(challenges_dsl::challenges)
            .filter(progress_dsl::user_id.eq(user_id))
            .order(challenges_dsl::id.asc())
            .select((
                challenges_dsl::id,
                challenges_dsl::title,
                challenges_dsl::module_id,
                progress_dsl::is_completed,
                progress_dsl::failed_attempts,
            ))
            .load::<ChallengeProgress>(conn)
            .map(Some)
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User with ID {} not found.", user_id)))?;

    Ok(ApiResponse::ok(rows))
}

fn to_earned(badge: BadgeRow) -> EarnedBadge {
    EarnedBadge {
        id: badge.id,
        name: badge.name,
        description: badge.description,
        image_url: badge.image_url,
        required_xp: badge.required_xp,
    }
}

/// Splits badges (sorted by threshold) into those earned at `total_xp` and the next one.
fn split_badges(badges: Vec<BadgeRow>, total_xp: i32) -> (Vec<EarnedBadge>, Option<NextBadge>) {
    let (earned, pending): (Vec<_>, Vec<_>) =
        badges.into_iter().partition(|b| b.required_xp <= total_xp);
    let next = pending.into_iter().next().map(|b| NextBadge {
        xp_remaining: b.required_xp - total_xp,
        badge: to_earned(b),
    });
    (earned.into_iter().map(to_earned).collect(), next)
}

/// A user's XP, derived badges and the next badge to earn.
///
/// Returns (wrapped in `ApiResponse`)
/// * `UserProfile` (200 OK).
/// * `404 Not Found`: If the user does not exist.
#[instrument(skip(pool))]
pub async fn get_user_profile(
    State(pool): State<Pool>,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<UserProfile>, AppError> {
    info!("Fetching profile for user {}", user_id);

    let loaded = helper::run_query(&pool, move |conn| {
        let Some(user) = users_dsl::users
            .find(user_id)
            .select(UserRow::as_select())
            .first(conn)
            .optional()?
        else {
            return Ok(None);
        };
        let completed = progress_dsl::user_progress
            .filter(progress_dsl::user_id.eq(user_id))
            .filter(progress_dsl::is_completed.eq(true))
            .count()
            .get_result::<i64>(conn)?;
        let badges = badges_dsl::badges
            .order((badges_dsl::required_xp.asc(), badges_dsl::id.asc()))
            .select(BadgeRow::as_select())
            .load(conn)?;
        Ok(Some((user, completed, badges)))
    })
    .await?;

    let Some((user, completed_challenges, badges)) = loaded else {
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    };

    let (badges, next_badge) = split_badges(badges, user.total_xp);
    Ok(ApiResponse::ok(UserProfile {
        id: user.id,
        username: user.username,
        total_xp: user.total_xp,
        completed_challenges,
        created_at: user.created_at,
        badges,
        next_badge,
    }))
}
