mod helpers;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use campus404_server::model::editor::{ChallengeRow, LabRow, MediaItemRow, ModuleRow, UploadReport};
use campus404_server::response::ApiResponse;
use helpers::*;
use serde_json::{Value, json};
use std::io::Cursor;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
        .expect("Failed to encode test PNG");
    buf
}

// ---------- Labs ----------

#[tokio::test]
async fn test_lab_crud() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/editor/labs")
        .json(&json!({ "name": "Python Lab", "description": "Snakes", "order_number": 1 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let lab = response.json::<ApiResponse<LabRow>>().data.unwrap();
    assert_eq!(lab.name, "Python Lab");

    let response = server
        .put(&format!("/editor/labs/{}", lab.id))
        .json(&json!({ "name": "Python Basics", "description": "Snakes", "order_number": 2 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let updated = response.json::<ApiResponse<LabRow>>().data.unwrap();
    assert_eq!(updated.name, "Python Basics");
    assert_eq!(updated.order_number, 2);

    let fetched = server
        .get(&format!("/editor/labs/{}", lab.id))
        .await
        .json::<ApiResponse<LabRow>>()
        .data
        .unwrap();
    assert_eq!(fetched, updated);

    let response = server.delete(&format!("/editor/labs/{}", lab.id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server.get(&format!("/editor/labs/{}", lab.id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_lab_blank_name() {
    let (server, _pool) = setup_test_environment().await;

    let response = server.post("/editor/labs").json(&json!({ "name": "  " })).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_lab_with_modules_conflicts() {
    let (server, pool) = setup_test_environment().await;
    let lab_id = create_test_lab(&pool, "Lab", 1).await;
    create_test_module(&pool, lab_id, "Module", 1).await;

    let response = server.delete(&format!("/editor/labs/{}", lab_id)).await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    server
        .get(&format!("/editor/labs/{}", lab_id))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_update_unknown_lab() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .put("/editor/labs/999999")
        .json(&json!({ "name": "Ghost" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// ---------- Modules ----------

#[tokio::test]
async fn test_module_crud_and_filter() {
    let (server, pool) = setup_test_environment().await;
    let lab_a = create_test_lab(&pool, "A", 1).await;
    let lab_b = create_test_lab(&pool, "B", 2).await;
    create_test_module(&pool, lab_b, "Elsewhere", 1).await;

    let response = server
        .post("/editor/modules")
        .json(&json!({ "lab_id": lab_a, "title": "Basics", "description": "Start here" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let module = response.json::<ApiResponse<ModuleRow>>().data.unwrap();
    assert_eq!(module.lab_id, lab_a);
    assert_eq!(module.description.as_deref(), Some("Start here"));

    let listed = server
        .get(&format!("/editor/modules?lab_id={}", lab_a))
        .await
        .json::<ApiResponse<Vec<ModuleRow>>>()
        .data
        .unwrap();
    assert_eq!(listed, vec![module.clone()]);

    // Omitted description is cleared.
    let updated = server
        .put(&format!("/editor/modules/{}", module.id))
        .json(&json!({ "lab_id": lab_b, "title": "Moved", "order_number": 3 }))
        .await
        .json::<ApiResponse<ModuleRow>>()
        .data
        .unwrap();
    assert_eq!(updated.lab_id, lab_b);
    assert_eq!(updated.description, None);

    let response = server.delete(&format!("/editor/modules/{}", module.id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_module_unknown_lab() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/editor/modules")
        .json(&json!({ "lab_id": 999999, "title": "Orphan" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_module_with_challenges_conflicts() {
    let (server, pool) = setup_test_environment().await;
    let (_, module_id, _) = create_test_hierarchy(&pool).await;

    let response = server.delete(&format!("/editor/modules/{}", module_id)).await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

// ---------- Challenges ----------

#[tokio::test]
async fn test_challenge_crud_exposes_answers() {
    let (server, pool) = setup_test_environment().await;
    let lab_id = create_test_lab(&pool, "Lab", 1).await;
    let module_id = create_test_module(&pool, lab_id, "Module", 1).await;

    let response = server
        .post("/editor/challenges")
        .json(&json!({
            "module_id": module_id,
            "title": "Off by one",
            "starter_code": "for i in range(1, 10): print(i)",
            "expected_output": "0\n1",
            "official_solution": "for i in range(10): print(i)",
            "repo_link": "https://github.com/campus404/off-by-one",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let challenge = response.json::<ApiResponse<ChallengeRow>>().data.unwrap();
    assert_eq!(challenge.editor_file_name, "script.py");
    assert_eq!(challenge.language_id, 71);
    assert!(!challenge.is_published);
    assert_eq!(challenge.expected_output, "0\n1");

    // Drafts are invisible to students until published.
    let response = server.get(&format!("/api/challenges/{}", challenge.id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let published = server
        .put(&format!("/editor/challenges/{}", challenge.id))
        .json(&json!({
            "module_id": module_id,
            "title": "Off by one",
            "expected_output": "0\n1",
            "is_published": true,
        }))
        .await
        .json::<ApiResponse<ChallengeRow>>()
        .data
        .unwrap();
    assert!(published.is_published);
    assert_eq!(published.repo_link, None);

    server
        .get(&format!("/api/challenges/{}", challenge.id))
        .await
        .assert_status_ok();

    let listed = server
        .get(&format!("/editor/challenges?module_id={}", module_id))
        .await
        .json::<ApiResponse<Vec<ChallengeRow>>>()
        .data
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].official_solution, "");
}

#[tokio::test]
async fn test_create_challenge_unknown_module() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/editor/challenges")
        .json(&json!({ "module_id": 999999, "title": "Orphan" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_challenge_with_submissions_conflicts() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_user(&pool, "ada").await;
    let (_, _, challenge_id) = create_test_hierarchy(&pool).await;
    create_test_submission(&pool, user_id, challenge_id, "failed").await;

    let response = server
        .delete(&format!("/editor/challenges/{}", challenge_id))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_challenge_without_submissions() {
    let (server, pool) = setup_test_environment().await;
    let (_, _, challenge_id) = create_test_hierarchy(&pool).await;

    let response = server
        .delete(&format!("/editor/challenges/{}", challenge_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .delete(&format!("/editor/challenges/{}", challenge_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// ---------- Media ----------

#[tokio::test]
async fn test_media_upload_creates_variants() {
    let (server, _pool) = setup_test_environment().await;
    let form = MultipartForm::new()
        .add_part(
            "files",
            Part::bytes(png_bytes(400, 200))
                .file_name("Red Banner.png")
                .mime_type("image/png"),
        )
        .add_part(
            "files",
            Part::bytes(b"#!/bin/sh\necho pwned\n".to_vec())
                .file_name("evil.sh")
                .mime_type("application/x-sh"),
        );

    let response = server.post("/editor/media").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let report = response.json::<ApiResponse<UploadReport>>().data.unwrap();
    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].starts_with("evil.sh"));

    let uploaded = &report.uploaded[0];
    assert!(uploaded.url.starts_with("/static/uploads/"));
    assert!(uploaded.url.ends_with("redbanner.png"));
    assert_eq!(uploaded.item.title, "Red Banner");
    assert_eq!(uploaded.item.mime_type, "image/png");
    assert_eq!(uploaded.item.metadata["width"], 400);
    assert_eq!(uploaded.item.metadata["height"], 200);
    assert_eq!(uploaded.item.metadata["sizes"]["thumbnail"]["width"], 150);
    assert_eq!(uploaded.item.metadata["sizes"]["thumbnail"]["height"], 150);
    assert_eq!(uploaded.item.metadata["sizes"]["medium"]["width"], 300);
    assert_eq!(uploaded.item.metadata["sizes"]["medium"]["height"], 150);
    assert!(uploaded.variants["large"].is_null());

    let thumb = uploaded.variants["thumbnail"]
        .as_str()
        .expect("thumbnail url")
        .to_string();
    server.get(&uploaded.url).await.assert_status_ok();
    server.get(&thumb).await.assert_status_ok();
}

#[tokio::test]
async fn test_media_upload_without_files() {
    let (server, _pool) = setup_test_environment().await;
    let form = MultipartForm::new().add_text("title", "nothing here");

    let response = server.post("/editor/media").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_media_search_update_and_delete() {
    let (server, _pool) = setup_test_environment().await;
    let form = MultipartForm::new()
        .add_part(
            "files",
            Part::bytes(png_bytes(64, 64))
                .file_name("cat.png")
                .mime_type("image/png"),
        )
        .add_part(
            "files",
            Part::bytes(png_bytes(64, 64))
                .file_name("dog.png")
                .mime_type("image/png"),
        );
    let report = server
        .post("/editor/media")
        .multipart(form)
        .await
        .json::<ApiResponse<UploadReport>>()
        .data
        .unwrap();
    assert_eq!(report.uploaded.len(), 2);
    let cat = report.uploaded[0].item.clone();

    let found = server
        .get("/editor/media?q=CAT")
        .await
        .json::<ApiResponse<Vec<MediaItemRow>>>()
        .data
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, cat.id);

    let updated = server
        .put(&format!("/editor/media/{}", cat.id))
        .json(&json!({ "alt_text": "A sleepy cat" }))
        .await
        .json::<ApiResponse<MediaItemRow>>()
        .data
        .unwrap();
    assert_eq!(updated.alt_text, "A sleepy cat");
    assert_eq!(updated.title, "cat");

    let response = server.delete(&format!("/editor/media/{}", cat.id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let variants = response.json::<ApiResponse<Value>>().data.unwrap();
    let thumb = variants["thumbnail"].as_str().expect("cropped thumbnail");

    assert_eq!(
        server.get(&cat.file_path).await.status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(server.get(thumb).await.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        server
            .get(&format!("/editor/media/{}", cat.id))
            .await
            .status_code(),
        StatusCode::NOT_FOUND
    );
}
