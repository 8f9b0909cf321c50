//! Render endpoints: multipart schematic in, image or video bytes out.

use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::info;

use crate::application::render::{ImageOptions, VideoOptions};
use crate::domain::schematic::SchematicUpload;
use crate::infra::http::HttpState;
use crate::infra::http::error::ApiError;
use crate::util::bytes::format_bytes;

const SOURCE_IMAGE: &str = "infra::http::render_schematic";
const SOURCE_VIDEO: &str = "infra::http::render_schematic_video";

pub async fn render_schematic(
    State(state): State<HttpState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let submission = read_submission(multipart, SOURCE_IMAGE).await?;
    submission
        .upload
        .validate(state.upload_limit_bytes)
        .map_err(|err| ApiError::from_schematic_error(SOURCE_IMAGE, err))?;

    let options: ImageOptions = parse_options(submission.fields, SOURCE_IMAGE)?;

    info!(
        target = "schemat::http::render",
        file = %submission.upload.filename,
        size = %format_bytes(submission.upload.bytes.len() as u64),
        "received schematic"
    );

    let buffer = state
        .renderer
        .render_image(&submission.upload.bytes, &options)
        .await
        .map_err(|err| ApiError::from_render_error(SOURCE_IMAGE, err))?;

    let filename = format!(
        "{}.{}",
        sanitize_filename(submission.upload.stem()),
        options.format.extension()
    );
    Ok(attachment_response(buffer, options.format.mime(), &filename))
}

pub async fn render_schematic_video(
    State(state): State<HttpState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let submission = read_submission(multipart, SOURCE_VIDEO).await?;
    submission
        .upload
        .validate(state.upload_limit_bytes)
        .map_err(|err| ApiError::from_schematic_error(SOURCE_VIDEO, err))?;

    let options: VideoOptions = parse_options(submission.fields, SOURCE_VIDEO)?;

    info!(
        target = "schemat::http::render",
        file = %submission.upload.filename,
        size = %format_bytes(submission.upload.bytes.len() as u64),
        "received schematic for video render"
    );

    let buffer = state
        .renderer
        .render_video(&submission.upload.bytes, &options)
        .await
        .map_err(|err| ApiError::from_render_error(SOURCE_VIDEO, err))?;

    let filename = format!(
        "{}_animation.webm",
        sanitize_filename(submission.upload.stem())
    );
    Ok(attachment_response(buffer, "video/webm", &filename))
}

struct Submission {
    upload: SchematicUpload,
    fields: Map<String, Value>,
}

/// Collect the multipart body: the `schematic` file, loose option fields
/// (sent as text, coerced to scalars), and an optional `options` JSON object
/// that overrides the loose fields.
async fn read_submission(
    mut multipart: Multipart,
    source: &'static str,
) -> Result<Submission, ApiError> {
    let mut filename: Option<String> = None;
    let mut data: Option<Bytes> = None;
    let mut fields = Map::new();
    let mut options_json: Option<Value> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        ApiError::bad_request(source, "invalid multipart payload", Some(err.to_string()))
    })? {
        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("schematic") => {
                filename = field.file_name().map(|name| name.to_string());
                data = Some(field.bytes().await.map_err(|err| {
                    ApiError::bad_request(
                        source,
                        "failed to read schematic upload",
                        Some(err.to_string()),
                    )
                })?);
            }
            Some("options") => {
                let text = field.text().await.map_err(|err| {
                    ApiError::bad_request(source, "failed to read options", Some(err.to_string()))
                })?;
                let value: Value = serde_json::from_str(&text).map_err(|err| {
                    ApiError::bad_request(source, "invalid options JSON", Some(err.to_string()))
                })?;
                options_json = Some(value);
            }
            Some(other) => {
                let key = other.to_string();
                let text = field.text().await.map_err(|err| {
                    ApiError::bad_request(source, "failed to read form field", Some(err.to_string()))
                })?;
                fields.insert(key, coerce_scalar(&text));
            }
            None => {}
        }
    }

    let filename = filename
        .ok_or_else(|| ApiError::bad_request(source, "schematic file is required", None))?;
    let data =
        data.ok_or_else(|| ApiError::bad_request(source, "schematic file is required", None))?;

    match options_json {
        Some(Value::Object(map)) => fields.extend(map),
        Some(_) => {
            return Err(ApiError::bad_request(
                source,
                "invalid options JSON",
                Some("options must be a JSON object".to_string()),
            ));
        }
        None => {}
    }

    Ok(Submission {
        upload: SchematicUpload::new(filename, data),
        fields,
    })
}

fn parse_options<T: serde::de::DeserializeOwned>(
    fields: Map<String, Value>,
    source: &'static str,
) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(fields)).map_err(|err| {
        ApiError::bad_request(source, "invalid render options", Some(err.to_string()))
    })
}

/// Form fields arrive as text; numbers and booleans are coerced so they can
/// deserialize into the typed options.
fn coerce_scalar(text: &str) -> Value {
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = text.parse::<f64>() {
        return Value::from(float);
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::from(other),
    }
}

fn attachment_response(buffer: Vec<u8>, mime: &'static str, filename: &str) -> Response {
    let disposition = format!("attachment; filename=\"{filename}\"");
    let mut response = (StatusCode::OK, buffer).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(mime));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(CONTENT_DISPOSITION, value);
    }
    response
}

/// Keep attachment filenames header-safe.
fn sanitize_filename(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim().is_empty() {
        "schematic".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_form_scalars() {
        assert_eq!(coerce_scalar("1920"), Value::from(1920));
        assert_eq!(coerce_scalar("0.95"), Value::from(0.95));
        assert_eq!(coerce_scalar("true"), Value::Bool(true));
        assert_eq!(coerce_scalar("image/png"), Value::from("image/png"));
    }

    #[test]
    fn options_json_overrides_loose_fields() {
        let mut fields = Map::new();
        fields.insert("width".to_string(), Value::from(1920));
        fields.insert("height".to_string(), Value::from(1080));

        let overrides: Value = serde_json::from_str(r#"{"width":640}"#).unwrap();
        if let Value::Object(map) = overrides {
            fields.extend(map);
        }

        let options: ImageOptions = parse_options(fields, "test").unwrap();
        assert_eq!(options.width, 640);
        assert_eq!(options.height, 1080);
    }

    #[test]
    fn sanitizes_header_hostile_filenames() {
        assert_eq!(sanitize_filename("my castle"), "my castle");
        assert_eq!(sanitize_filename("a\"b\r\nc"), "a_b__c");
        assert_eq!(sanitize_filename("\u{7f}"), "_");
    }
}
