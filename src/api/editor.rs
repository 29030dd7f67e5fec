use super::helper;
use crate::media::{MediaError, MediaLibrary, is_allowed_mime, variant_urls};
use crate::model::editor::{
    ChallengeChanges, ChallengeRow, LabChanges, LabRow, MediaItemChanges, MediaItemRow,
    ModuleChanges, ModuleRow, NewMediaItem, UploadReport, UploadedMedia,
};
use crate::payloads::editor::{
    ChallengeListParams, ChallengePayload, LabPayload, MediaListParams, MediaMetadataPayload,
    ModuleListParams, ModulePayload,
};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        challenges::dsl as challenges_dsl, labs::dsl as labs_dsl,
        media_items::dsl as media_dsl, modules::dsl as modules_dsl,
        submissions::dsl as sub_dsl, user_progress::dsl as progress_dsl,
    },
};
use axum::extract::{Multipart, Path, Query};
use axum::{extract::State, response::Json};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::log::warn;
use tracing::{debug, info, instrument};

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty.", field)));
    }
    Ok(())
}

fn lab_changes(payload: LabPayload) -> Result<LabChanges, AppError> {
    require_text("Lab name", &payload.name)?;
    Ok(LabChanges {
        name: payload.name,
        description: payload.description,
        order_number: payload.order_number,
    })
}

fn module_changes(payload: ModulePayload) -> Result<ModuleChanges, AppError> {
    require_text("Module title", &payload.title)?;
    Ok(ModuleChanges {
        lab_id: payload.lab_id,
        order_number: payload.order_number,
        title: payload.title,
        description: payload.description,
    })
}

fn challenge_changes(payload: ChallengePayload) -> Result<ChallengeChanges, AppError> {
    require_text("Challenge title", &payload.title)?;
    Ok(ChallengeChanges {
        module_id: payload.module_id,
        order_number: payload.order_number,
        title: payload.title,
        description: payload.description,
        editor_file_name: payload.editor_file_name,
        instructions: payload.instructions,
        starter_code: payload.starter_code,
        expected_output: payload.expected_output,
        hint_text: payload.hint_text,
        official_solution: payload.official_solution,
        walkthrough_video_url: payload.walkthrough_video_url,
        language_id: payload.language_id,
        is_published: payload.is_published,
        repo_link: payload.repo_link,
    })
}

fn lab_exists(conn: &mut PgConnection, lab_id: i64) -> QueryResult<bool> {
    diesel::dsl::select(diesel::dsl::exists(
        labs_dsl::labs.filter(labs_dsl::id.eq(lab_id)),
    ))
    .get_result(conn)
}

fn module_exists(conn: &mut PgConnection, module_id: i64) -> QueryResult<bool> {
    diesel::dsl::select(diesel::dsl::exists(
        modules_dsl::modules.filter(modules_dsl::id.eq(module_id)),
    ))
    .get_result(conn)
}

// ---------- Labs ----------

/// Lists all labs in display order.
#[instrument(skip(pool))]
pub async fn list_labs(State(pool): State<Pool>) -> Result<ApiResponse<Vec<LabRow>>, AppError> {
    let labs = helper::run_query(&pool, |conn| {
        labs_dsl::labs
            .order((labs_dsl::order_number.asc(), labs_dsl::id.asc()))
            .select(LabRow::as_select())
            .load(conn)
    })
    .await?;
    Ok(ApiResponse::ok(labs))
}

/// Fetches one lab.
///
/// Returns (wrapped in `ApiResponse`)
/// * `LabRow` (200 OK).
/// * `404 Not Found`: If the lab does not exist.
#[instrument(skip(pool))]
pub async fn get_lab(
    State(pool): State<Pool>,
    Path(lab_id): Path<i64>,
) -> Result<ApiResponse<LabRow>, AppError> {
    let lab = helper::run_query(&pool, move |conn| {
        labs_dsl::labs
            .find(lab_id)
            .select(LabRow::as_select())
            .first(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Lab with ID {} not found.", lab_id)))?;
    Ok(ApiResponse::ok(lab))
}

/// Creates a lab.
///
/// Request Body: `LabPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `LabRow` (200 OK).
/// * `400 Bad Request`: If the name is blank.
#[instrument(skip(pool, payload))]
pub async fn create_lab(
    State(pool): State<Pool>,
    Json(payload): Json<LabPayload>,
) -> Result<ApiResponse<LabRow>, AppError> {
    debug!("Create lab payload: {:?}", payload);
    let changes = lab_changes(payload)?;

    let lab = helper::run_query(&pool, move |conn| {
        diesel::insert_into(labs_dsl::labs)
            .values(&changes)
            .returning(LabRow::as_returning())
            .get_result(conn)
    })
    .await?;

    info!("Created lab {} ({})", lab.id, lab.name);
    Ok(ApiResponse::ok(lab))
}

/// Replaces a lab's fields.
///
/// Request Body: `LabPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `LabRow` (200 OK).
/// * `400 Bad Request`: If the name is blank.
/// * `404 Not Found`: If the lab does not exist.
#[instrument(skip(pool, payload))]
pub async fn update_lab(
    State(pool): State<Pool>,
    Path(lab_id): Path<i64>,
    Json(payload): Json<LabPayload>,
) -> Result<ApiResponse<LabRow>, AppError> {
    debug!("Update lab payload: {:?}", payload);
    let changes = lab_changes(payload)?;

    let lab = helper::run_query(&pool, move |conn| {
        diesel::update(labs_dsl::labs.find(lab_id))
            .set(&changes)
            .returning(LabRow::as_returning())
            .get_result(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Lab with ID {} not found.", lab_id)))?;

    info!("Updated lab {}", lab_id);
    Ok(ApiResponse::ok(lab))
}

/// Deletes a lab that has no modules.
///
/// Returns (wrapped in `ApiResponse`)
/// * `()` (200 OK).
/// * `404 Not Found`: If the lab does not exist.
/// * `409 Conflict`: If the lab still has modules.
#[instrument(skip(pool))]
pub async fn delete_lab(
    State(pool): State<Pool>,
    Path(lab_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    let conn = pool.get().await?;
    conn.interact(move |conn| {
        conn.transaction(|tx| {
            if !lab_exists(tx, lab_id)? {
                return Err(AppError::NotFound(format!(
                    "Lab with ID {} not found.",
                    lab_id
                )));
            }
            let module_count = modules_dsl::modules
                .filter(modules_dsl::lab_id.eq(lab_id))
                .count()
                .get_result::<i64>(tx)?;
            if module_count > 0 {
                warn!(
                    "Refusing to delete lab {} with {} modules",
                    lab_id, module_count
                );
                return Err(AppError::Conflict(format!(
                    "Lab with ID {} still has {} module(s).",
                    lab_id, module_count
                )));
            }
            diesel::delete(labs_dsl::labs.find(lab_id)).execute(tx)?;
            Ok(())
        })
    })
    .await??;

    info!("Deleted lab {}", lab_id);
    Ok(ApiResponse::ok(()))
}

// ---------- Modules ----------

/// Lists modules, optionally only those of one lab.
#[instrument(skip(pool))]
pub async fn list_modules(
    State(pool): State<Pool>,
    Query(params): Query<ModuleListParams>,
) -> Result<ApiResponse<Vec<ModuleRow>>, AppError> {
    let modules = helper::run_query(&pool, move |conn| {
        let mut query = modules_dsl::modules
            .select(ModuleRow::as_select())
            .into_boxed();
        if let Some(lab_id) = params.lab_id {
            query = query.filter(modules_dsl::lab_id.eq(lab_id));
        }
        query
            .order((
                modules_dsl::lab_id.asc(),
                modules_dsl::order_number.asc(),
                modules_dsl::id.asc(),
            ))
            .load(conn)
    })
    .await?;
    Ok(ApiResponse::ok(modules))
}

/// Fetches one module.
#[instrument(skip(pool))]
pub async fn get_module(
    State(pool): State<Pool>,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<ModuleRow>, AppError> {
    let module = helper::run_query(&pool, move |conn| {
        modules_dsl::modules
            .find(module_id)
            .select(ModuleRow::as_select())
            .first(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Module with ID {} not found.", module_id)))?;
    Ok(ApiResponse::ok(module))
}

/// Creates a module inside an existing lab.
///
/// Request Body: `ModulePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `ModuleRow` (200 OK).
/// * `400 Bad Request`: If the title is blank.
/// * `404 Not Found`: If the lab does not exist.
#[instrument(skip(pool, payload))]
pub async fn create_module(
    State(pool): State<Pool>,
    Json(payload): Json<ModulePayload>,
) -> Result<ApiResponse<ModuleRow>, AppError> {
    debug!("Create module payload: {:?}", payload);
    let changes = module_changes(payload)?;

    let conn = pool.get().await?;
    let module = conn
        .interact(move |conn| {
            conn.transaction(|tx| {
                if !lab_exists(tx, changes.lab_id)? {
                    return Err(AppError::NotFound(format!(
                        "Lab with ID {} not found.",
                        changes.lab_id
                    )));
                }
                let module = diesel::insert_into(modules_dsl::modules)
                    .values(&changes)
                    .returning(ModuleRow::as_returning())
                    .get_result(tx)?;
                Ok(module)
            })
        })
        .await??;

    info!("Created module {} in lab {}", module.id, module.lab_id);
    Ok(ApiResponse::ok(module))
}

/// Replaces a module's fields; the target lab must exist.
///
/// Request Body: `ModulePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `ModuleRow` (200 OK).
/// * `404 Not Found`: If the module or the lab does not exist.
#[instrument(skip(pool, payload))]
pub async fn update_module(
    State(pool): State<Pool>,
    Path(module_id): Path<i64>,
    Json(payload): Json<ModulePayload>,
) -> Result<ApiResponse<ModuleRow>, AppError> {
    debug!("Update module payload: {:?}", payload);
    let changes = module_changes(payload)?;

    let conn = pool.get().await?;
    let module = conn
        .interact(move |conn| {
            conn.transaction(|tx| {
                if !lab_exists(tx, changes.lab_id)? {
                    return Err(AppError::NotFound(format!(
                        "Lab with ID {} not found.",
                        changes.lab_id
                    )));
                }
                diesel::update(modules_dsl::modules.find(module_id))
                    .set(&changes)
                    .returning(ModuleRow::as_returning())
                    .get_result(tx)
                    .optional()?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Module with ID {} not found.", module_id))
                    })
            })
        })
        .await??;

    info!("Updated module {}", module_id);
    Ok(ApiResponse::ok(module))
}

/// Deletes a module that has no challenges.
///
/// Returns (wrapped in `ApiResponse`)
/// * `()` (200 OK).
/// * `404 Not Found`: If the module does not exist.
/// * `409 Conflict`: If the module still has challenges.
#[instrument(skip(pool))]
pub async fn delete_module(
    State(pool): State<Pool>,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    let conn = pool.get().await?;
    conn.interact(move |conn| {
        conn.transaction(|tx| {
            if !module_exists(tx, module_id)? {
                return Err(AppError::NotFound(format!(
                    "Module with ID {} not found.",
                    module_id
                )));
            }
            let challenge_count = challenges_dsl::challenges
                .filter(challenges_dsl::module_id.eq(module_id))
                .count()
                .get_result::<i64>(tx)?;
            if challenge_count > 0 {
                warn!(
                    "Refusing to delete module {} with {} challenges",
                    module_id, challenge_count
                );
                return Err(AppError::Conflict(format!(
                    "Module with ID {} still has {} challenge(s).",
                    module_id, challenge_count
                )));
            }
            diesel::delete(modules_dsl::modules.find(module_id)).execute(tx)?;
            Ok(())
        })
    })
    .await??;

    info!("Deleted module {}", module_id);
    Ok(ApiResponse::ok(()))
}

// ---------- Challenges ----------

/// Lists challenges with every field, optionally only those of one module.
#[instrument(skip(pool))]
pub async fn list_challenges(
    State(pool): State<Pool>,
    Query(params): Query<ChallengeListParams>,
) -> Result<ApiResponse<Vec<ChallengeRow>>, AppError> {
    let challenges = helper::run_query(&pool, move |conn| {
        let mut query = challenges_dsl::challenges
            .select(ChallengeRow::as_select())
            .into_boxed();
        if let Some(module_id) = params.module_id {
            query = query.filter(challenges_dsl::module_id.eq(module_id));
        }
        query
            .order((
                challenges_dsl::module_id.asc(),
                challenges_dsl::order_number.asc(),
                challenges_dsl::id.asc(),
            ))
            .load(conn)
    })
    .await?;
    Ok(ApiResponse::ok(challenges))
}

/// Fetches one challenge including its answer fields.
#[instrument(skip(pool))]
pub async fn get_challenge(
    State(pool): State<Pool>,
    Path(challenge_id): Path<i64>,
) -> Result<ApiResponse<ChallengeRow>, AppError> {
    let challenge = helper::run_query(&pool, move |conn| {
        challenges_dsl::challenges
            .find(challenge_id)
            .select(ChallengeRow::as_select())
            .first(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!("Challenge with ID {} not found.", challenge_id))
    })?;
    Ok(ApiResponse::ok(challenge))
}

/// Creates a challenge inside an existing module.
///
/// Request Body: `ChallengePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `ChallengeRow` (200 OK).
/// * `400 Bad Request`: If the title is blank.
/// * `404 Not Found`: If the module does not exist.
#[instrument(skip(pool, payload))]
pub async fn create_challenge(
    State(pool): State<Pool>,
    Json(payload): Json<ChallengePayload>,
) -> Result<ApiResponse<ChallengeRow>, AppError> {
    debug!("Create challenge payload: {:?}", payload);
    let changes = challenge_changes(payload)?;

    let conn = pool.get().await?;
    let challenge = conn
        .interact(move |conn| {
            conn.transaction(|tx| {
                if !module_exists(tx, changes.module_id)? {
                    return Err(AppError::NotFound(format!(
                        "Module with ID {} not found.",
                        changes.module_id
                    )));
                }
                let challenge = diesel::insert_into(challenges_dsl::challenges)
                    .values(&changes)
                    .returning(ChallengeRow::as_returning())
                    .get_result(tx)?;
                Ok(challenge)
            })
        })
        .await??;

    info!(
        "Created challenge {} in module {} (published: {})",
        challenge.id, challenge.module_id, challenge.is_published
    );
    Ok(ApiResponse::ok(challenge))
}

/// Replaces a challenge's fields; the target module must exist.
///
/// Request Body: `ChallengePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `ChallengeRow` (200 OK).
/// * `404 Not Found`: If the challenge or the module does not exist.
#[instrument(skip(pool, payload))]
pub async fn update_challenge(
    State(pool): State<Pool>,
    Path(challenge_id): Path<i64>,
    Json(payload): Json<ChallengePayload>,
) -> Result<ApiResponse<ChallengeRow>, AppError> {
    debug!("Update challenge payload: {:?}", payload);
    let changes = challenge_changes(payload)?;

    let conn = pool.get().await?;
    let challenge = conn
        .interact(move |conn| {
            conn.transaction(|tx| {
                if !module_exists(tx, changes.module_id)? {
                    return Err(AppError::NotFound(format!(
                        "Module with ID {} not found.",
                        changes.module_id
                    )));
                }
                diesel::update(challenges_dsl::challenges.find(challenge_id))
                    .set(&changes)
                    .returning(ChallengeRow::as_returning())
                    .get_result(tx)
                    .optional()?
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "Challenge with ID {} not found.",
                            challenge_id
                        ))
                    })
            })
        })
        .await??;

    info!("Updated challenge {}", challenge_id);
    Ok(ApiResponse::ok(challenge))
}

/// Deletes a challenge without submissions, together with its progress rows.
///
/// Returns (wrapped in `ApiResponse`)
/// * `()` (200 OK).
/// * `404 Not Found`: If the challenge does not exist.
/// * `409 Conflict`: If submissions reference the challenge.
#[instrument(skip(pool))]
pub async fn delete_challenge(
    State(pool): State<Pool>,
    Path(challenge_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    let conn = pool.get().await?;
    let progress_removed = conn
        .interact(move |conn| {
            conn.transaction(|tx| {
                let exists = diesel::dsl::select(diesel::dsl::exists(
                    challenges_dsl::challenges.filter(challenges_dsl::id.eq(challenge_id)),
                ))
                .get_result::<bool>(tx)?;
                if !exists {
                    return Err(AppError::NotFound(format!(
                        "Challenge with ID {} not found.",
                        challenge_id
                    )));
                }
                let submission_count = sub_dsl::submissions
                    .filter(sub_dsl::challenge_id.eq(challenge_id))
                    .count()
                    .get_result::<i64>(tx)?;
                if submission_count > 0 {
                    warn!(
                        "Refusing to delete challenge {} with {} submissions",
                        challenge_id, submission_count
                    );
                    return Err(AppError::Conflict(format!(
                        "Challenge with ID {} has {} submission(s) and cannot be deleted.",
                        challenge_id, submission_count
                    )));
                }
                let progress_removed = diesel::delete(
                    progress_dsl::user_progress.filter(progress_dsl::challenge_id.eq(challenge_id)),
                )
                .execute(tx)?;
                diesel::delete(challenges_dsl::challenges.find(challenge_id)).execute(tx)?;
                Ok(progress_removed)
            })
        })
        .await??;

    info!(
        "Deleted challenge {} and {} progress rows",
        challenge_id, progress_removed
    );
    Ok(ApiResponse::ok(()))
}

// ---------- Media ----------

/// Lists media items newest first, optionally searching title and original name.
#[instrument(skip(pool))]
pub async fn list_media(
    State(pool): State<Pool>,
    Query(params): Query<MediaListParams>,
) -> Result<ApiResponse<Vec<MediaItemRow>>, AppError> {
    let search = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    let items = helper::run_query(&pool, move |conn| {
        let mut query = media_dsl::media_items
            .select(MediaItemRow::as_select())
            .into_boxed();
        if let Some(search) = search {
            let pattern = format!("%{}%", search);
            query = query.filter(
                media_dsl::title
                    .ilike(pattern.clone())
                    .or(media_dsl::original_name.ilike(pattern)),
            );
        }
        query
            .order((media_dsl::uploaded_at.desc(), media_dsl::id.desc()))
            .load(conn)
    })
    .await?;

    info!("Successfully fetched {} media items", items.len());
    Ok(ApiResponse::ok(items))
}

/// Fetches one media item.
#[instrument(skip(pool))]
pub async fn get_media(
    State(pool): State<Pool>,
    Path(media_id): Path<i64>,
) -> Result<ApiResponse<MediaItemRow>, AppError> {
    let item = helper::run_query(&pool, move |conn| {
        media_dsl::media_items
            .find(media_id)
            .select(MediaItemRow::as_select())
            .first(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Media item with ID {} not found.", media_id)))?;
    Ok(ApiResponse::ok(item))
}

fn title_from(original_name: &str) -> String {
    match original_name.rfind('.') {
        Some(idx) if idx > 0 => original_name[..idx].to_string(),
        _ => original_name.to_string(),
    }
}

/// Uploads one or more images from the multipart `files` field.
///
/// Files with an unsupported content type are skipped and reported.
///
/// Returns (wrapped in `ApiResponse`)
/// * `UploadReport` (200 OK).
/// * `400 Bad Request`: If the multipart body is malformed or carries no files.
#[instrument(skip(pool, media, multipart))]
pub async fn upload_media(
    State(pool): State<Pool>,
    State(media): State<Arc<MediaLibrary>>,
    mut multipart: Multipart,
) -> Result<ApiResponse<UploadReport>, AppError> {
    let settings = helper::load_settings(&pool).await?;

    let mut uploaded = Vec::new();
    let mut skipped = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?
    {
        if !matches!(field.name(), Some("files") | Some("file")) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("unnamed.bin").to_string();
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&original_name)
                    .first_or_octet_stream()
                    .to_string()
            });

        if !is_allowed_mime(&mime_type) {
            warn!("Skipping upload '{}' of type {}", original_name, mime_type);
            skipped.push(format!(
                "{}: unsupported type ({})",
                original_name, mime_type
            ));
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;

        let stored = media
            .store(
                original_name.clone(),
                mime_type.clone(),
                bytes.to_vec(),
                settings.media,
            )
            .await?;

        let new_item = NewMediaItem {
            filename: stored.filename.clone(),
            title: title_from(&original_name),
            original_name,
            file_path: stored.url.clone(),
            file_size: i64::try_from(stored.size).unwrap_or(i64::MAX),
            mime_type,
            metadata: stored.metadata.clone(),
        };

        let inserted = helper::run_query(&pool, move |conn| {
            diesel::insert_into(media_dsl::media_items)
                .values(&new_item)
                .returning(MediaItemRow::as_returning())
                .get_result(conn)
        })
        .await;

        let item = match inserted {
            Ok(item) => item,
            Err(err) => {
                if let Err(cleanup) = media.remove(&stored.url, &stored.metadata) {
                    warn!("Could not clean up {} after failed insert: {}", stored.url, cleanup);
                }
                return Err(err);
            }
        };

        info!("Uploaded media item {} at {}", item.id, stored.url);
        uploaded.push(UploadedMedia {
            variants: stored.variants(),
            url: stored.url,
            item,
        });
    }

    if uploaded.is_empty() && skipped.is_empty() {
        return Err(AppError::BadRequest(
            "No files were provided in the 'files' field.".to_string(),
        ));
    }

    Ok(ApiResponse::ok(UploadReport { uploaded, skipped }))
}

/// Edits a media item's descriptive fields; omitted fields stay unchanged.
///
/// Request Body: `MediaMetadataPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `MediaItemRow` (200 OK).
/// * `404 Not Found`: If the item does not exist.
#[instrument(skip(pool, payload))]
pub async fn update_media(
    State(pool): State<Pool>,
    Path(media_id): Path<i64>,
    Json(payload): Json<MediaMetadataPayload>,
) -> Result<ApiResponse<MediaItemRow>, AppError> {
    debug!("Update media payload: {:?}", payload);
    let changes = MediaItemChanges {
        title: payload.title,
        alt_text: payload.alt_text,
        caption: payload.caption,
        description: payload.description,
    };
    let nothing_to_change = changes.title.is_none()
        && changes.alt_text.is_none()
        && changes.caption.is_none()
        && changes.description.is_none();

    let item = helper::run_query(&pool, move |conn| {
        if nothing_to_change {
            return media_dsl::media_items
                .find(media_id)
                .select(MediaItemRow::as_select())
                .first(conn)
                .optional();
        }
        diesel::update(media_dsl::media_items.find(media_id))
            .set(&changes)
            .returning(MediaItemRow::as_returning())
            .get_result(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Media item with ID {} not found.", media_id)))?;

    info!("Updated media item {}", media_id);
    Ok(ApiResponse::ok(item))
}

/// Deletes a media item with its original file and variants.
///
/// Returns (wrapped in `ApiResponse`)
/// * `serde_json::Value` with the removed variant URLs (200 OK).
/// * `404 Not Found`: If the item does not exist.
#[instrument(skip(pool, media))]
pub async fn delete_media(
    State(pool): State<Pool>,
    State(media): State<Arc<MediaLibrary>>,
    Path(media_id): Path<i64>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let item = helper::run_query(&pool, move |conn| {
        diesel::delete(media_dsl::media_items.find(media_id))
            .returning(MediaItemRow::as_returning())
            .get_result(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Media item with ID {} not found.", media_id)))?;

    let variants = variant_urls(&item.metadata);
    let removed = tokio::task::spawn_blocking(move || media.remove(&item.file_path, &item.metadata))
        .await
        .map_err(|e| MediaError::Task(e.to_string()))??;

    info!("Deleted media item {} ({} files removed)", media_id, removed);
    Ok(ApiResponse::ok(variants))
}
