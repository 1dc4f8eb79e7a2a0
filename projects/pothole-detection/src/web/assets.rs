use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
    response::IntoResponse,
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;

pub async fn static_handler(path: axum::extract::Path<String>) -> impl IntoResponse {
    let path = path.trim_start_matches('/');

    if path.is_empty() || path == "index.html" {
        return serve_asset("index.html").into_response();
    }

    match serve_asset(path) {
        Ok(response) => response.into_response(),
        Err(_) => serve_asset("index.html").into_response(),
    }
}

pub async fn index_handler() -> impl IntoResponse {
    serve_asset("index.html")
}

fn serve_asset(path: &str) -> Result<Response<Body>, StatusCode> {
    let asset = Assets::get(path).ok_or(StatusCode::NOT_FOUND)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type =
        HeaderValue::from_str(mime.as_ref()).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(asset.data.into_owned()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
