/// Router tests: status mapping, payload shape and CORS headers.
///
/// Run with: cargo test --test api_tests -- --nocapture
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use race_predictor::{
    api,
    config::{CorsConfig, CorsOrigins, ServerConfig},
    contract::ColumnKind,
    logistic::LogisticRegression,
    model::Classifier,
    scaler::StandardScaler,
    FeatureContract, ModelBundle, Predictor, Target,
};
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use tower::ServiceExt;

const FEATURES: [&str; 5] = [
    "GridPosition",
    "Q1_seconds",
    "BestQualiTime",
    "Constructor_encoded",
    "raceName_encoded",
];

fn ready_predictor() -> Arc<Predictor> {
    let contract = FeatureContract::derive(
        FEATURES.iter().map(|c| (*c, ColumnKind::Numeric)),
        BTreeMap::new(),
    );
    let bundles = Target::SERVED
        .iter()
        .enumerate()
        .map(|(i, t)| {
            ModelBundle::new(
                *t,
                StandardScaler {
                    mean: vec![10.0, 90.0, 89.0, 4.5, 10.0],
                    scale: vec![5.0, 1.0, 1.0, 3.0, 6.0],
                },
                Classifier::LogisticRegression(LogisticRegression {
                    weights: vec![-1.0, 0.0, -0.3, 0.0, 0.0],
                    bias: i as f64 * 0.5 - 1.0,
                }),
            )
        })
        .collect();
    let predictor = Predictor::new();
    predictor
        .install(contract, &Target::SERVED, bundles)
        .unwrap();
    Arc::new(predictor)
}

fn app(predictor: Arc<Predictor>) -> Router {
    api::router(predictor, &ServerConfig::default()).unwrap()
}

fn entry() -> Value {
    json!({
        "GridPosition": 2,
        "Q1_seconds": 90.3,
        "Q2_seconds": 89.9,
        "Q3_seconds": 89.6,
        "Constructor_encoded": 4,
        "raceName_encoded": 11,
        "year": 2024,
        "round": 7,
        "Points": 0,
        "laps": 66
    })
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_predict_returns_every_served_target() {
    println!("\n=== Test: POST /api/predict ===");
    let (status, body) = send(app(ready_predictor()), post(entry().to_string())).await;
    assert_eq!(status, StatusCode::OK);
    let map = body.as_object().unwrap();
    assert_eq!(map.len(), 4);
    for target in Target::SERVED {
        let p = map[target.label()].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
    println!("✓ {}", body);
}

#[tokio::test]
async fn test_bad_requests_are_400() {
    println!("\n=== Test: 400 Responses ===");
    let (status, body) = send(app(ready_predictor()), post("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed JSON"));

    let (status, _) = send(app(ready_predictor()), post("[1, 2, 3]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut missing = entry();
    missing.as_object_mut().unwrap().remove("laps");
    missing["Constructor_encoded"] = json!("ferrari");
    let (status, body) = send(app(ready_predictor()), post(missing.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let msg = body["error"].as_str().unwrap();
    assert!(msg.contains("laps"));
    assert!(msg.contains("Constructor_encoded"));
    println!("✓ {}", msg);
}

#[tokio::test]
async fn test_not_ready_is_503() {
    println!("\n=== Test: 503 Before Models Load ===");
    let predictor = Arc::new(Predictor::new());

    let (status, body) = send(app(predictor.clone()), post(entry().to_string())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let (status, _) = send(app(predictor.clone()), get("/api/contract")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(app(predictor), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(false));
    assert_eq!(body["targets"], json!([]));
    println!("✓ {}", body);
}

#[tokio::test]
async fn test_health_and_contract_when_ready() {
    println!("\n=== Test: Health And Contract ===");
    let predictor = ready_predictor();

    let (status, body) = send(app(predictor.clone()), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));
    assert_eq!(
        body["targets"],
        json!(["Race Winner", "Podium", "Points Finish", "Top 5"])
    );

    let (status, body) = send(app(predictor), get("/api/contract")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feature_columns"], json!(FEATURES));
    println!("✓ {}", body["feature_columns"]);
}

#[tokio::test]
async fn test_cors_headers() {
    println!("\n=== Test: CORS ===");
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/predict")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(entry().to_string()))
        .unwrap();
    let resp = app(ready_predictor()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );

    let config = ServerConfig {
        cors: CorsConfig {
            origins: CorsOrigins::List(vec!["http://localhost:3000".into()]),
            ..CorsConfig::default()
        },
        ..ServerConfig::default()
    };
    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/predict")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let resp = api::router(ready_predictor(), &config)
        .unwrap()
        .oneshot(preflight)
        .await
        .unwrap();
    assert_eq!(
        resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert!(resp
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    println!("✓ CORS headers present");
}
