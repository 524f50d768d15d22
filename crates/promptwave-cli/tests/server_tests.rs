use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, StatusCode, header},
};
use candle_core::{Device, Tensor};
use promptwave::MusicGenerator;
use promptwave_cli::server::outputs::OutputStore;
use promptwave_cli::server::routes::{self, DEFAULT_CORS_ORIGIN};
use promptwave_cli::server::state::AppState;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tower::ServiceExt; // for oneshot

const SAMPLE_RATE: u32 = 32_000;

/// Deterministic stand-in for the model: a short sine wave whose pitch
/// depends on the prompt length.
struct SineGenerator;

impl MusicGenerator for SineGenerator {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn generate(
        &mut self,
        prompt: &str,
        on_step: &mut dyn FnMut(usize, usize),
    ) -> anyhow::Result<Tensor> {
        let freq = 220.0 + prompt.len() as f32;
        let samples: Vec<f32> = (0..3_200)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        for step in 1..=4 {
            on_step(step, 4);
        }
        Ok(Tensor::from_vec(samples, (1, 3_200), &Device::Cpu)?)
    }
}

struct FailingGenerator;

impl MusicGenerator for FailingGenerator {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn generate(
        &mut self,
        _prompt: &str,
        _on_step: &mut dyn FnMut(usize, usize),
    ) -> anyhow::Result<Tensor> {
        anyhow::bail!("decoder exploded")
    }
}

fn app_with(generator: Box<dyn MusicGenerator>, outputs_dir: &Path) -> Router {
    let state = AppState::new(generator, OutputStore::new(outputs_dir));
    routes::create_router(state, HeaderValue::from_static(DEFAULT_CORS_ORIGIN))
}

fn generate_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn list(app: &Router) -> Vec<String> {
    let response = app.clone().oneshot(get("/outputs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_generate_returns_wav_and_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = dir.path().join("outputs");
    let app = app_with(Box::new(SineGenerator), &outputs);

    let response = app
        .clone()
        .oneshot(generate_request(json!({ "prompt": "calm piano" }).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/wav"
    );

    let bytes = body_bytes(response).await;
    let reader = hound::WavReader::new(Cursor::new(bytes.clone())).unwrap();
    assert_eq!(reader.spec().sample_rate, 32_000);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.duration(), 3_200);

    // The outputs directory was created lazily and holds exactly this file
    let files = files_in(&outputs);
    assert_eq!(files.len(), 1);
    let stem = files[0].strip_suffix(".wav").unwrap();
    assert_eq!(uuid::Uuid::parse_str(stem).unwrap().get_version_num(), 4);
    assert_eq!(std::fs::read(outputs.join(&files[0])).unwrap(), bytes);
}

#[tokio::test]
async fn test_empty_prompt_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let response = app
        .oneshot(generate_request(json!({ "prompt": "" }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(files_in(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_extra_fields_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let response = app
        .oneshot(generate_request(
            json!({ "prompt": "jazz", "duration": 99 }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_consecutive_generations_are_distinct_and_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let mut bodies = Vec::new();
    for prompt in ["upbeat synthwave", "slow cello"] {
        let response = app
            .clone()
            .oneshot(generate_request(json!({ "prompt": prompt }).to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(body_bytes(response).await);
    }

    let names = list(&app).await;
    assert_eq!(names.len(), 2);
    assert_ne!(names[0], names[1]);

    let mut retrieved = Vec::new();
    for name in &names {
        let response = app
            .clone()
            .oneshot(get(&format!("/outputs/{}", name)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("audio/"));
        retrieved.push(body_bytes(response).await);
    }

    // Listing order is unspecified; compare as sets
    let generated: HashSet<Vec<u8>> = bodies.into_iter().collect();
    let served: HashSet<Vec<u8>> = retrieved.into_iter().collect();
    assert_eq!(generated.len(), 2);
    assert_eq!(generated, served);
}

#[tokio::test]
async fn test_list_only_wav_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.wav", "b.txt", "c.wav"] {
        std::fs::write(dir.path().join(name), b"data").unwrap();
    }
    let app = app_with(Box::new(SineGenerator), dir.path());

    let names: HashSet<String> = list(&app).await.into_iter().collect();
    assert_eq!(
        names,
        HashSet::from(["a.wav".to_string(), "c.wav".to_string()])
    );
}

#[tokio::test]
async fn test_list_missing_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), &dir.path().join("not-yet"));

    assert!(list(&app).await.is_empty());
}

#[tokio::test]
async fn test_static_retrieval_of_any_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let response = app.clone().oneshot(get("/outputs/notes.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"hello");

    let response = app.oneshot(get("/outputs/missing.wav")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_retrieval_stays_inside_outputs() {
    let root = tempfile::tempdir().unwrap();
    let outputs = root.path().join("outputs");
    std::fs::create_dir(&outputs).unwrap();
    std::fs::write(root.path().join("secret.wav"), b"secret").unwrap();
    let app = app_with(Box::new(SineGenerator), &outputs);

    for uri in ["/outputs/..%2Fsecret.wav", "/outputs/..", "/outputs/%2E%2E"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let bodies = [
        json!({}).to_string(),
        json!({ "text": "wrong field" }).to_string(),
        json!({ "prompt": 42 }).to_string(),
        "{not json".to_string(),
    ];
    for body in bodies {
        let response = app.clone().oneshot(generate_request(body.clone())).await.unwrap();
        assert!(
            response.status().is_client_error(),
            "{} -> {}",
            body,
            response.status()
        );
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generate")
                .body(Body::from(json!({ "prompt": "x" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn test_generation_failure_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(FailingGenerator), dir.path());

    let response = app
        .clone()
        .oneshot(generate_request(json!({ "prompt": "anything" }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("decoder exploded"),
        "{}",
        body
    );

    // The server keeps serving after a failure
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cors_preflight_allowed_origin() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/generate")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
        "POST"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
        "content-type"
    );
}

#[tokio::test]
async fn test_cors_other_origin_not_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/outputs")
                .header(header::ORIGIN, "http://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn test_cors_allowed_origin_is_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/outputs")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );

    // No Origin header, no allow-origin header
    let response = app.oneshot(get("/outputs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(Box::new(SineGenerator), dir.path());

    let requests = (0..4).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            app.oneshot(generate_request(
                json!({ "prompt": format!("prompt {}", i) }).to_string(),
            ))
            .await
            .unwrap()
            .status()
        })
    });
    for handle in requests.collect::<Vec<_>>() {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let names: HashSet<String> = files_in(dir.path()).into_iter().collect();
    assert_eq!(names.len(), 4);
}
