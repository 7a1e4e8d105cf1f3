use axum::Router;
use tower_http::cors::CorsLayer;

use crate::routes::{health, predict};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .merge(health::router())
        .merge(predict::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{SgdConfig, SgdRegressor, StandardScaler};
    use crate::models::{ModelArtifact, TrainingMode, FEATURE_DIM};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use ndarray::Array2;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let x = Array2::from_shape_fn((4, FEATURE_DIM), |(i, j)| (i * (j + 1)) as f64);
        let artifact = ModelArtifact::new(
            StandardScaler::fit(x.view()).unwrap(),
            SgdRegressor::new(FEATURE_DIM, SgdConfig::default()),
            Utc::now(),
            TrainingMode::Full,
            4,
            1,
        );
        AppState { artifact: Arc::new(artifact) }
    }

    fn predict_body() -> String {
        serde_json::json!({
            "temperature": 12.5, "humidity": 80.0, "precipitation": 0.0, "rain": 0.0,
            "snowfall": 0.0, "surface_pressure": 1012.0, "cloud_cover": 40.0,
            "wind_speed_10m": 10.0, "wind_speed_100m": 20.0, "wind_direction_10m": 180.0,
            "wind_direction_100m": 190.0, "days_since_epoch": 3000
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_app(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_predict_returns_price() {
        let response = create_app(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(predict_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["unit"], "EUR/MWh");
        assert_eq!(body["predicted_price"], 0.0);
        assert_eq!(body["input_data"]["days_since_epoch"], 3000);
    }

    fn post_predict(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_batch_relative_day_offset_is_rejected() {
        let mut body: serde_json::Value = serde_json::from_str(&predict_body()).unwrap();
        let days = body.as_object_mut().unwrap().remove("days_since_epoch").unwrap();
        body["days_since_start"] = days;

        let response = create_app(state())
            .oneshot(post_predict("/predict", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let message = String::from_utf8_lossy(&bytes);
        assert!(message.contains("days_since_epoch"), "{}", message);
    }

    #[tokio::test]
    async fn test_previous_deployment_paths_are_served() {
        let health = create_app(state())
            .oneshot(Request::builder().uri("/healthcheck/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let predicted = create_app(state())
            .oneshot(post_predict("/predict/", predict_body()))
            .await
            .unwrap();
        assert_eq!(predicted.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_predict_rejects_incomplete_input() {
        let response = create_app(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"temperature": 1.0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
