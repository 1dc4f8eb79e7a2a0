use crate::detection::annotate::{decode_image, draw_detections, draw_gps, encode_base64_jpeg};
use crate::detection::{Detection, Detector};
use crate::geolocation::{gps_text, locate_or_none, Locator};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Shared state for the web handlers
pub struct AppState {
    /// One model instance; uploads are processed one at a time
    pub detector: Mutex<Box<dyn Detector>>,
    pub locator: Arc<dyn Locator>,
}

#[derive(Serialize)]
pub struct DetectResponse {
    /// Base64 JPEG of the annotated upload
    pub image: String,
    pub gps: String,
    pub detections: Vec<Detection>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    PayloadTooLarge,
    Internal(String),
}

impl ApiError {
    fn internal(e: impl std::fmt::Display) -> Self {
        ApiError::Internal(e.to_string())
    }

    /// Body limit hits surface as multipart errors carrying a 413 status.
    fn from_multipart(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest("Malformed upload")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Image exceeds the upload size limit".to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Detection request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub async fn detect_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::BadRequest("No image provided"))?;

    let mut image_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from_multipart)?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(ApiError::from_multipart)?;
            image_bytes = Some(bytes);
            break;
        }
    }
    let image_bytes = image_bytes.ok_or(ApiError::BadRequest("No image provided"))?;
    tracing::info!("Received upload of {} bytes", image_bytes.len());

    // OpenCV and the model are blocking
    let response = tokio::task::spawn_blocking(move || process_upload(&state, &image_bytes))
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(response))
}

fn process_upload(state: &AppState, bytes: &[u8]) -> Result<DetectResponse, ApiError> {
    let mut frame = decode_image(bytes).ok_or(ApiError::BadRequest("Invalid image"))?;

    let detections = {
        let mut detector = state
            .detector
            .lock()
            .map_err(|_| ApiError::internal("Detector lock poisoned"))?;
        detector.detect(&frame).map_err(ApiError::internal)?
    };
    tracing::info!("Detected {} potholes", detections.len());
    draw_detections(&mut frame, &detections).map_err(ApiError::internal)?;

    let gps = gps_text(locate_or_none(state.locator.as_ref()));
    draw_gps(&mut frame, &gps).map_err(ApiError::internal)?;

    let image = encode_base64_jpeg(&frame).map_err(ApiError::internal)?;

    Ok(DetectResponse {
        image,
        gps,
        detections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detector::testing::{pothole, FixedDetector};
    use crate::geolocation::testing::FixedLocator;
    use crate::geolocation::GeoFix;
    use crate::web::server::build_router;
    use axum::body::Body;
    use axum::http::{header, Request};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use opencv::core::{Mat, Scalar, Vector, CV_8UC3};
    use opencv::prelude::*;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pothole-test-boundary";

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(&mut self, _image: &Mat) -> anyhow::Result<Vec<Detection>> {
            Err(anyhow::anyhow!("inference exploded"))
        }
    }

    fn state_with(detector: Box<dyn Detector>, fix: Option<GeoFix>) -> Arc<AppState> {
        Arc::new(AppState {
            detector: Mutex::new(detector),
            locator: Arc::new(FixedLocator(fix)),
        })
    }

    fn png_bytes() -> Vec<u8> {
        let img = Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(40.0)).unwrap();
        let mut buf = Vector::<u8>::new();
        opencv::imgcodecs::imencode(".png", &img, &mut buf, &Vector::new()).unwrap();
        buf.to_vec()
    }

    fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"road.png\"\r\n",
                field
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_detect(state: Arc<AppState>, body: Vec<u8>) -> (StatusCode, Value) {
        post_detect_limited(state, body, 1024 * 1024).await
    }

    async fn post_detect_limited(
        state: Arc<AppState>,
        body: Vec<u8>,
        max_upload_bytes: usize,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/detect")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        let response = build_router(state, max_upload_bytes)
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_detect_returns_annotated_jpeg_and_gps() {
        let state = state_with(
            Box::new(FixedDetector::new(vec![pothole(20.0, 30.0, 90.0, 100.0, 0.91)])),
            Some(GeoFix {
                lat: 17.385044,
                lon: 78.486671,
            }),
        );

        let (status, json) = post_detect(state, multipart_body("image", &png_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["gps"], "Lat: 17.38504, Lon: 78.48667");
        assert_eq!(json["detections"].as_array().unwrap().len(), 1);

        let jpeg = STANDARD.decode(json["image"].as_str().unwrap()).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!((decoded.cols(), decoded.rows()), (160, 120));
    }

    #[tokio::test]
    async fn test_unknown_location_still_succeeds() {
        let state = state_with(Box::new(FixedDetector::new(vec![])), None);
        let (status, json) = post_detect(state, multipart_body("image", &png_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["gps"], "GPS: Unknown");
        assert!(json["detections"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_field() {
        let state = state_with(Box::new(FixedDetector::new(vec![])), None);
        let (status, json) = post_detect(state, multipart_body("photo", &png_bytes())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No image provided");
    }

    #[tokio::test]
    async fn test_non_multipart_request() {
        let state = state_with(Box::new(FixedDetector::new(vec![])), None);
        let request = Request::builder()
            .method("POST")
            .uri("/detect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = build_router(state, 1024).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_undecodable_image() {
        let state = state_with(Box::new(FixedDetector::new(vec![])), None);
        let (status, json) = post_detect(state, multipart_body("image", b"GIF89a-but-not-really")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid image");
    }

    #[tokio::test]
    async fn test_inference_failure_is_500() {
        let state = state_with(Box::new(FailingDetector), None);
        let (status, json) = post_detect(state, multipart_body("image", &png_bytes())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("inference exploded"));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let state = state_with(Box::new(FixedDetector::new(vec![])), None);
        let (status, json) =
            post_detect_limited(state, multipart_body("image", &vec![7u8; 8192]), 1024).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"], "Image exceeds the upload size limit");
    }

    #[tokio::test]
    async fn test_index_page_is_served() {
        let state = state_with(Box::new(FixedDetector::new(vec![])), None);
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = build_router(state, 1024).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Pothole Detection"));
    }
}
