// HTTP surface
// Form submission runs the pipeline; stored files are served back by record id

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::config::ConfigError;
use crate::pipeline::{Pipeline, PipelineError, PipelineOutcome};
use crate::state::{self, AudioRecord, DbConnection, DbError, MediaStorage};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/download/:file_id", get(download_audio_file))
        .route("/healthz", get(healthz))
        .with_state(pipeline)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index() -> Html<String> {
    Html(render_page(None))
}

#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    pub video_url: Option<String>,
}

async fn submit(State(pipeline): State<Pipeline>, Form(form): Form<SubmitForm>) -> Response {
    let url = match form.video_url {
        Some(url) if !url.trim().is_empty() => url,
        _ => {
            let outcome = PipelineOutcome::failed(PipelineError::Download);
            return Html(render_page(Some(&outcome))).into_response();
        }
    };

    // Downloading and transcoding block on subprocesses
    match tokio::task::spawn_blocking(move || pipeline.run(&url)).await {
        Ok(outcome) => Html(render_page(Some(&outcome))).into_response(),
        Err(e) => {
            log::error!("Pipeline task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("File not found")]
    NotFound,
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Find the record and the on-disk path of its stored file.
/// A record whose file has disappeared counts as not found.
pub fn resolve_stored_file(
    db: &DbConnection,
    storage: &MediaStorage,
    file_id: i64,
) -> Result<(AudioRecord, PathBuf), RetrieveError> {
    let record = state::get_audio_record(db, file_id)?.ok_or(RetrieveError::NotFound)?;
    let path = storage.path(&record.audio_file);
    if !path.is_file() {
        log::warn!("Record {} points at missing file {}", record.id, path.display());
        return Err(RetrieveError::NotFound);
    }
    Ok((record, path))
}

async fn download_audio_file(
    State(pipeline): State<Pipeline>,
    Path(file_id): Path<String>,
) -> Response {
    let Ok(file_id) = file_id.parse::<i64>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (record, path) = match resolve_stored_file(pipeline.db(), pipeline.storage(), file_id) {
        Ok(found) => found,
        Err(RetrieveError::NotFound) => return StatusCode::NOT_FOUND.into_response(),
        Err(RetrieveError::Db(e)) => {
            log::error!("Failed to look up record {}: {}", file_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The file can still vanish between the check and the open
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            log::error!("Failed to open {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let len = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            log::error!("Failed to stat {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut resp = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(record.file_name())),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&attachment_disposition(record.file_name())) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    resp
}

fn content_type_for(file_name: &str) -> &'static str {
    match std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

fn attachment_disposition(file_name: &str) -> String {
    let escaped: String = file_name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", escaped)
}

/// Render the form page, with the outcome of a submission if there was one
pub fn render_page(outcome: Option<&PipelineOutcome>) -> String {
    let mut body = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Audio Downloader</title></head>\n<body>\n\
         <h1>Audio Downloader</h1>\n\
         <form method=\"post\" action=\"/\">\n\
         <input type=\"url\" name=\"video_url\" placeholder=\"Video URL\" required>\n\
         <button type=\"submit\">Download</button>\n\
         </form>\n",
    );

    if let Some(outcome) = outcome {
        if let Some(record) = &outcome.audio_file {
            body.push_str(&format!(
                "<p class=\"audio-file\">Saved <a href=\"/download/{}\">{}</a> from {}</p>\n",
                record.id,
                escape_html(&record.to_string()),
                escape_html(&record.url),
            ));
        }
        if let Some(path) = &outcome.converted_audio_path {
            body.push_str(&format!(
                "<p class=\"converted-audio-path\">Converted audio: {}</p>\n",
                escape_html(&path.to_string_lossy())
            ));
        }
        if let Some(error) = &outcome.error {
            body.push_str(&format!(
                "<p class=\"error\">{}</p>\n",
                escape_html(&error.to_string())
            ));
        }
    }

    body.push_str("</body>\n</html>\n");
    body
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
