use std::{env, fs, path::PathBuf};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use clap::Parser;
use density_viewer::DatasetSchema;
use density_viewer_server::{router, AppState, ServerConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

fn temp_data_dir(tag: &str) -> PathBuf {
    let mut path = env::temp_dir();
    path.push(format!(
        "density_viewer_server_{tag}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    fs::create_dir_all(&path).unwrap();
    path
}

fn write_json(root: &PathBuf, relative: &str, value: Value) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
}

/// Parses a config with every flag the tests rely on spelled out, so `DV_*`
/// variables in the environment cannot change the outcome.
fn config(root: &PathBuf, schema: &str, colormap: &str) -> ServerConfig {
    ServerConfig::parse_from([
        "density_viewer_server",
        "--bind",
        "127.0.0.1:0",
        "--data-dir",
        root.to_str().unwrap(),
        "--schema",
        schema,
        "--point-file",
        "pointcloud.json",
        "--gaussian-file",
        "pointcloud_gaussians.json",
        "--colormap",
        colormap,
    ])
}

fn app(root: &PathBuf, schema: DatasetSchema) -> Router {
    let cfg = config(root, &schema.to_string(), "coolwarm");
    router(AppState::new(cfg.build_pipeline().unwrap()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn seed_pointcloud(root: &PathBuf, name: &str) {
    write_json(
        root,
        &format!("{name}/points.json"),
        json!({
            "points": [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 4.0, 0.0]],
            "labels": [0, 1, 0]
        }),
    );
    write_json(
        root,
        &format!("{name}/gaussians.json"),
        json!({
            "means": [[1.0, 2.0, 0.0], [2.0, 0.0, 0.0]],
            "covs": [
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
            ],
            "densities_log": [1.0, 3.0]
        }),
    );
}

#[tokio::test]
async fn pointcloud_endpoint_serves_normalized_cloud() {
    let root = temp_data_dir("pointcloud");
    seed_pointcloud(&root, "day19");
    let app = app(&root, DatasetSchema::MultiDataset);

    let (status, body) = get_json(app, "/get-pointcloud?name=day19&colormap=gray").await;
    fs::remove_dir_all(&root).ok();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["point_cloud"],
        json!([[-25.0, -50.0, 0.0], [25.0, -50.0, 0.0], [-25.0, 50.0, 0.0]])
    );
    assert_eq!(
        body["colors"],
        json!([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]])
    );
    assert_eq!(body["min_density"], json!(1.0));
    assert_eq!(body["max_density"], json!(3.0));
    assert_eq!(body["color_gradient"][0], json!([0, 0, 0]));
    assert_eq!(body["color_gradient"][100], json!([255, 255, 255]));
    assert_eq!(body["labels"], json!([0, 1, 0]));
    assert_eq!(body["gaussians"]["means"][0], json!([0.0, 0.0, 0.0]));
}

#[tokio::test]
async fn pointcloud_without_name_is_empty_selection() {
    let root = temp_data_dir("noname");
    let app = app(&root, DatasetSchema::MultiDataset);
    let (status, body) = get_json(app, "/get-pointcloud").await;
    fs::remove_dir_all(&root).ok();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point_cloud"], json!([]));
    assert_eq!(body["colors"], json!([]));
    assert_eq!(body["min_density"], json!(0.0));
    assert_eq!(body["max_density"], json!(1.0));
    assert_eq!(body["explanation_text"], json!("Nothing selected"));
    assert_eq!(body["color_gradient"].as_array().unwrap().len(), 101);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let root = temp_data_dir("errors");
    seed_pointcloud(&root, "ok");
    write_json(
        &root,
        "broken/points.json",
        json!({ "points": [[0.0, 0.0, 0.0]], "labels": [0, 1] }),
    );
    write_json(
        &root,
        "broken/gaussians.json",
        json!({
            "means": [[0.0, 0.0, 0.0]],
            "covs": [[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]]
        }),
    );
    let app = app(&root, DatasetSchema::MultiDataset);

    let (status, body) = get_json(app.clone(), "/get-pointcloud?name=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["msg"].as_str().unwrap().contains("missing"));

    let (status, body) = get_json(app.clone(), "/get-pointcloud?name=ok&colormap=sepia").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["msg"].as_str().unwrap().contains("sepia"));

    let (status, _) = get_json(app, "/get-pointcloud?name=broken").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn dataset_names_and_metadata_endpoints() {
    let root = temp_data_dir("names");
    seed_pointcloud(&root, "b");
    seed_pointcloud(&root, "a");
    let app = app(&root, DatasetSchema::MultiDataset);

    let (_, body) = get_json(app.clone(), "/api/get_dataset_names").await;
    assert_eq!(body, json!({ "datasets": ["a", "b"] }));

    let (status, body) = get_json(app.clone(), "/api/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "version": "v0.1.0" }));

    let (_, body) = get_json(app.clone(), "/api/colormaps").await;
    assert_eq!(body["default"], json!("coolwarm"));
    assert!(body["colormaps"].as_array().unwrap().contains(&json!("viridis")));

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
    fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn image_schema_serves_detections_and_placeholders() {
    let root = temp_data_dir("images");
    write_json(
        &root,
        "cells/detections.json",
        json!([{ "segments": [[0, 0]], "center": [4.6, 9.1], "intensity": 200.0 }]),
    );
    image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]))
        .save(root.join("cells/image.png"))
        .unwrap();
    let app = app(&root, DatasetSchema::ImageContour);

    let (_, body) = get_json(app.clone(), "/api/get_image_names").await;
    assert_eq!(body, json!({ "images": ["cells"] }));

    let (_, body) = get_json(app.clone(), "/api/get_points?name=cells").await;
    assert_eq!(body, json!({ "points": [[4, 9]], "intensities": [200.0] }));

    let (status, body) = get_json(app.clone(), "/api/get_points?name=ghost").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "points": [], "intensities": [] }));

    let (_, png) = get(app.clone(), "/api/get_image?name=cells").await;
    let img = image::load_from_memory(&png).unwrap();
    assert_eq!((img.width(), img.height()), (3, 2));

    let (status, png) = get(app.clone(), "/api/get_image?name=ghost").await;
    assert_eq!(status, StatusCode::OK);
    let img = image::load_from_memory(&png).unwrap();
    assert_eq!((img.width(), img.height()), (1000, 1000));

    let (status, _) = get(app, "/get-pointcloud").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    fs::remove_dir_all(&root).ok();
}

#[test]
fn config_rejects_unknown_default_colormap() {
    let root = PathBuf::from("data");
    let cfg = config(&root, "multi-dataset", "sepia");
    assert!(cfg.build_pipeline().is_err());

    let cfg = config(&root, "single-file", "Viridis");
    assert_eq!(cfg.schema, DatasetSchema::SingleFile);
    assert_eq!(cfg.bind_addr, "127.0.0.1:0");
    let pipeline = cfg.build_pipeline().unwrap();
    assert_eq!(pipeline.colormaps().default_name(), "viridis");
}
