use std::convert::Infallible;
use std::sync::Arc;

use bytes::BufMut;
use futures_util::TryStreamExt;
use log::{error, info, warn};
use serde::Serialize;
use warp::http::StatusCode;
use warp::multipart::FormData;
use warp::{reply, Filter, Rejection, Reply};

use super::types::{
    ApiResponse, SigmaRequest, TransformRequest, TransformResponse, UploadResponse,
};
use crate::error_handling::types::PipelineError;
use crate::imaging::operation::Parameters;
use crate::pipeline::controller::PipelineController;
use crate::session_management::session::SessionId;

/// Multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "image";

const JSON_BODY_LIMIT: u64 = 16 * 1024;

/// Every HTTP route of the service, with rejection handling and request logging.
pub fn routes(
    pipeline: Arc<PipelineController>,
    max_upload_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    health_route()
        .or(upload_route(pipeline.clone(), max_upload_bytes))
        .or(sigma_route("blur", pipeline.clone()))
        .or(sigma_route("sharpen", pipeline.clone()))
        .or(transform_route(pipeline.clone()))
        .or(download_route(pipeline.clone()))
        .or(end_session_route(pipeline))
        .recover(handle_rejection)
        .with(warp::log("darkroom::http"))
}

/// GET /health
pub fn health_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("health").and(warp::get()).map(|| "OK")
}

/// POST /api/v1/image/upload (multipart, field `image`)
pub fn upload_route(
    pipeline: Arc<PipelineController>,
    max_upload_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "image" / "upload")
        .and(warp::post())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and_then(move |form: FormData| {
            let pipeline = pipeline.clone();
            async move {
                let (filename, bytes) = match read_image_part(form).await {
                    Ok(part) => part,
                    Err(e) => return Ok::<_, Rejection>(failure("upload", &e)),
                };
                let name = filename.clone();
                let result =
                    run_blocking(move || pipeline.begin_session(&bytes, &filename)).await;
                match result {
                    Ok(session_id) => {
                        info!("Session {} created from upload '{}'", session_id, name);
                        Ok(success(&UploadResponse { session_id }, StatusCode::CREATED))
                    }
                    Err(e) => Ok(failure("upload", &e)),
                }
            }
        })
}

/// POST /api/v1/image/{blur|sharpen} with `{sessionId, sigma}`
pub fn sigma_route(
    operation: &'static str,
    pipeline: Arc<PipelineController>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "image" / String)
        .and_then(move |segment: String| async move {
            if segment == operation {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and_then(move |request: SigmaRequest| {
            let pipeline = pipeline.clone();
            async move {
                let (session_id, parameters) = request.parameters();
                Ok::<_, Rejection>(transform(pipeline, session_id, operation.to_string(), parameters).await)
            }
        })
}

/// POST /api/v1/image/transform with `{sessionId, operation, parameters}`
pub fn transform_route(
    pipeline: Arc<PipelineController>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "image" / "transform")
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and_then(move |request: TransformRequest| {
            let pipeline = pipeline.clone();
            async move {
                let (session_id, operation, parameters) = request.parameters();
                Ok::<_, Rejection>(transform(pipeline, session_id, operation, parameters).await)
            }
        })
}

/// GET /api/v1/image/{sessionId} returns the current artifact
pub fn download_route(
    pipeline: Arc<PipelineController>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "image" / String)
        .and(warp::get())
        .and_then(move |id_str: String| {
            let pipeline = pipeline.clone();
            async move {
                let result = match parse_session_id(&id_str) {
                    Ok(id) => run_blocking(move || pipeline.current_artifact(id)).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok((path, bytes)) => {
                        let mime = mime_guess::from_path(&path).first_or_octet_stream();
                        let res = reply::with_status(
                            reply::with_header(bytes, "Content-Type", mime.to_string()),
                            StatusCode::OK,
                        )
                        .into_response();
                        Ok::<_, Rejection>(res)
                    }
                    Err(e) => Ok(failure("download", &e)),
                }
            }
        })
}

/// DELETE /api/v1/image/{sessionId}
pub fn end_session_route(
    pipeline: Arc<PipelineController>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "image" / String)
        .and(warp::delete())
        .and_then(move |id_str: String| {
            let pipeline = pipeline.clone();
            async move {
                let result = match parse_session_id(&id_str) {
                    Ok(id) => {
                        run_blocking(move || pipeline.end_session(id).map(|stale| (id, stale)))
                            .await
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok((id, stale)) => {
                        if let Some(path) = stale {
                            warn!(
                                "Session {}: artifact {} could not be deleted",
                                id,
                                path.display()
                            );
                        }
                        info!("Session {} ended", id);
                        Ok::<_, Rejection>(success(&UploadResponse { session_id: id }, StatusCode::OK))
                    }
                    Err(e) => Ok(failure("end session", &e)),
                }
            }
        })
}

async fn transform(
    pipeline: Arc<PipelineController>,
    session_id: String,
    operation: String,
    parameters: Parameters,
) -> reply::Response {
    let id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(e) => return failure(&operation, &e),
    };
    let op = operation.clone();
    match run_blocking(move || pipeline.apply_transform(id, &op, parameters)).await {
        Ok(outcome) => {
            if let Some(stale) = &outcome.stale_artifact {
                warn!(
                    "Session {}: superseded artifact {} could not be deleted",
                    id,
                    stale.display()
                );
            }
            info!(
                "Session {}: applied {} -> {}",
                id,
                outcome.operation,
                outcome.artifact_path.display()
            );
            success(&TransformResponse::from(outcome), StatusCode::CREATED)
        }
        Err(e) => failure(&operation, &e),
    }
}

/// Session ids that are not valid tokens can never name a live session.
fn parse_session_id(raw: &str) -> Result<SessionId, PipelineError> {
    raw.parse()
        .map_err(|_| PipelineError::SessionNotFound(raw.to_string()))
}

async fn read_image_part(form: FormData) -> Result<(String, Vec<u8>), PipelineError> {
    let mut form = form;
    while let Some(part) = form
        .try_next()
        .await
        .map_err(|e| PipelineError::Ingest(format!("unreadable multipart body: {}", e)))?
    {
        if part.name() != UPLOAD_FIELD {
            continue;
        }
        let filename = part.filename().unwrap_or_default().to_string();
        let bytes = part
            .stream()
            .try_fold(Vec::new(), |mut acc, buf| async move {
                acc.put(buf);
                Ok(acc)
            })
            .await
            .map_err(|e| PipelineError::Ingest(format!("unreadable upload stream: {}", e)))?;
        return Ok((filename, bytes));
    }
    Err(PipelineError::Ingest(format!(
        "missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

/// Runs a pipeline call on the blocking pool; store and codec work is synchronous.
async fn run_blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(PipelineError::Persistence(format!("worker task failed: {}", e))))
}

pub fn status_of(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Ingest(_) | PipelineError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        PipelineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::ArtifactUnavailable(_) => StatusCode::CONFLICT,
        PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_of(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::Ingest(_) => "IngestError",
        PipelineError::SessionNotFound(_) => "SessionNotFoundError",
        PipelineError::ArtifactUnavailable(_) => "ArtifactUnavailableError",
        PipelineError::InvalidParameter(_) => "InvalidParameterError",
        PipelineError::Persistence(_) => "PersistenceError",
    }
}

fn success<T: Serialize>(data: &T, status: StatusCode) -> reply::Response {
    reply::with_status(reply::json(&ApiResponse::ok(data)), status).into_response()
}

fn failure(action: &str, err: &PipelineError) -> reply::Response {
    let status = status_of(err);
    if status.is_server_error() {
        error!("Failed to {}: {}", action, err);
    } else {
        warn!("Rejected {}: {}", action, err);
    }
    reply::with_status(
        reply::json(&ApiResponse::failed(kind_of(err), err.to_string())),
        status,
    )
    .into_response()
}

/// Turns warp rejections into the JSON envelope.
pub async fn handle_rejection(err: Rejection) -> Result<reply::Response, Infallible> {
    let (status, kind, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "NotFound", "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            "BadRequest",
            format!("Failed to decode request body: {}", e),
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "PayloadTooLarge",
            "Payload too large".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowed",
            "Method not allowed".to_string(),
        )
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "BadRequest", "Bad request".to_string())
    };
    warn!("Request rejected ({}): {}", status, message);
    Ok(reply::with_status(
        reply::json(&ApiResponse::failed(kind, message)),
        status,
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::transform::ImagingTransform;
    use crate::session_management::memory_store::MemorySessionStore;
    use crate::storage::file_storage::FileArtifactStore;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const BOUNDARY: &str = "darkroom-test-boundary";

    fn setup() -> (TempDir, Arc<PipelineController>) {
        let dir = TempDir::new().unwrap();
        let pipeline = PipelineController::new(
            Arc::new(MemorySessionStore::new(chrono::Duration::minutes(30))),
            Arc::new(FileArtifactStore::new(dir.path()).unwrap()),
            Arc::new(ImagingTransform::new()),
        );
        (dir, Arc::new(pipeline))
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(12, 12, |x, _| Rgb([(x * 20) as u8, 40, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn json_of(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    fn upload_request(field: &str, filename: &str, data: &[u8]) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("POST")
            .path("/api/v1/image/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(multipart_body(field, filename, data))
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (_dir, pipeline) = setup();
        let api = routes(pipeline, 1024);
        let res = warp::test::request().path("/health").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"OK");
    }

    #[tokio::test]
    async fn upload_blur_sharpen_download_and_delete() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (dir, pipeline) = setup();
        let api = routes(pipeline, 1024 * 1024);

        let res = upload_request(UPLOAD_FIELD, "cat.jpg", &jpeg_bytes()).reply(&api).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_of(res.body());
        assert_eq!(body["success"], true);
        let session_id = body["message"]["sessionId"].as_str().unwrap().to_string();

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/image/blur")
            .json(&serde_json::json!({ "sessionId": session_id, "sigma": "10" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_of(res.body());
        assert_eq!(body["message"]["sessionId"], session_id.as_str());
        assert_eq!(body["message"]["operation"], "blur");
        assert_eq!(body["message"]["sigma"], "10");
        let blurred = PathBuf::from(body["message"]["path"].as_str().unwrap());
        assert!(blurred.to_string_lossy().ends_with(".jpg"));

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/image/sharpen")
            .json(&serde_json::json!({ "sessionId": session_id, "sigma": 5 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert!(!blurred.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let res = warp::test::request()
            .path(&format!("/api/v1/image/{}", session_id))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "image/jpeg");
        assert!(image::load_from_memory(res.body()).is_ok());

        let res = warp::test::request()
            .method("DELETE")
            .path(&format!("/api/v1/image/{}", session_id))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn generic_transform_echoes_parameters() {
        let (_dir, pipeline) = setup();
        let api = routes(pipeline, 1024 * 1024);
        let res = upload_request(UPLOAD_FIELD, "cat.jpg", &jpeg_bytes()).reply(&api).await;
        let session_id = json_of(res.body())["message"]["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/image/transform")
            .json(&serde_json::json!({
                "sessionId": session_id,
                "operation": "sharpen",
                "parameters": { "intensity": 3 }
            }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_of(res.body());
        assert_eq!(body["message"]["operation"], "sharpen");
        assert_eq!(body["message"]["intensity"], "3");
    }

    #[tokio::test]
    async fn unknown_session_is_404_and_creates_no_files() {
        let (dir, pipeline) = setup();
        let api = routes(pipeline, 1024);
        for session_id in ["unknown-id".to_string(), SessionId::generate().to_string()] {
            let res = warp::test::request()
                .method("POST")
                .path("/api/v1/image/sharpen")
                .json(&serde_json::json!({ "sessionId": session_id, "sigma": "5" }))
                .reply(&api)
                .await;
            assert_eq!(res.status(), StatusCode::NOT_FOUND);
            let body = json_of(res.body());
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "SessionNotFoundError");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn non_numeric_sigma_is_400() {
        let (_dir, pipeline) = setup();
        let api = routes(pipeline, 1024 * 1024);
        let res = upload_request(UPLOAD_FIELD, "cat.jpg", &jpeg_bytes()).reply(&api).await;
        let session_id = json_of(res.body())["message"]["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/image/blur")
            .json(&serde_json::json!({ "sessionId": session_id, "sigma": "ten" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(res.body())["error"], "InvalidParameterError");
    }

    #[tokio::test]
    async fn upload_without_image_field_is_400() {
        let (dir, pipeline) = setup();
        let api = routes(pipeline, 1024 * 1024);
        let res = upload_request("file", "cat.jpg", &jpeg_bytes()).reply(&api).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(res.body())["error"], "IngestError");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let (_dir, pipeline) = setup();
        let api = routes(pipeline, 1024);
        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/image/blur")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(res.body())["success"], false);
    }

    #[tokio::test]
    async fn caller_parameters_cannot_replace_reply_fields() {
        let (_dir, pipeline) = setup();
        let api = routes(pipeline, 1024 * 1024);
        let res = upload_request(UPLOAD_FIELD, "cat.jpg", &jpeg_bytes()).reply(&api).await;
        let session_id = json_of(res.body())["message"]["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let res = warp::test::request()
            .method("POST")
            .path("/api/v1/image/transform")
            .json(&serde_json::json!({
                "sessionId": session_id,
                "operation": "blur",
                "parameters": { "sigma": "2", "path": "/etc/passwd", "operation": "rotate" }
            }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_of(res.body());
        let path = body["message"]["path"].as_str().unwrap();
        assert_ne!(path, "/etc/passwd");
        assert!(PathBuf::from(path).exists());
        assert_eq!(body["message"]["operation"], "blur");
        assert_eq!(body["message"]["sigma"], "2");
    }

    #[derive(Debug)]
    struct InternalFailure;

    impl warp::reject::Reject for InternalFailure {}

    #[tokio::test]
    async fn unrecognised_rejection_gets_a_fixed_message() {
        let api = warp::any()
            .and_then(|| async { Err::<String, _>(warp::reject::custom(InternalFailure)) })
            .recover(handle_rejection);
        let res = warp::test::request().reply(&api).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = json_of(res.body());
        assert_eq!(body["message"], "Bad request");
        assert_eq!(body["error"], "BadRequest");
        assert!(!String::from_utf8_lossy(res.body()).contains("InternalFailure"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_of(&PipelineError::Ingest(String::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&PipelineError::ArtifactUnavailable(String::new())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(&PipelineError::Persistence(String::new())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
