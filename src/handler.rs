//! Transform request handling
//!
//! A request moves through these stages, stopping at the first failure:
//!
//! ```text
//! Received → Parsed → Decoded → SizeChecked → Transformed → Cropped → Encoded → Responded
//! ```
//!
//! Parsing and the body-size check run on the connection task. Everything
//! from decoding on is CPU-bound and runs on the blocking pool under a
//! deadline. Failures become a [`TransformError`], whose
//! [`status`](TransformError::status) picks the response code.

use crate::config::{Config, LimitsConfig};
use crate::error::TransformError;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::transform::{TransformCommand, apply_transform, crop};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Point in time after which a request stops being worked on.
///
/// The blocking pipeline checks it between stages so an expired request
/// does not go on to transform or encode.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn check(&self) -> Result<(), TransformError> {
        if Instant::now() >= self.0 {
            Err(TransformError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Turns upload requests into transformed PNG responses.
#[derive(Debug, Clone)]
pub struct ImageHandler {
    limits: LimitsConfig,
    request_timeout: Duration,
}

impl ImageHandler {
    pub fn new(limits: LimitsConfig, request_timeout: Duration) -> Self {
        Self {
            limits,
            request_timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.limits.clone(), cfg.server.request_timeout())
    }

    /// Handle one request, always producing a response.
    ///
    /// Error responses carry no body.
    pub async fn handle(&self, request: Request) -> Response {
        let path = request.path.clone();
        let started = Instant::now();

        match self.process(request).await {
            Ok(png) => {
                tracing::info!(
                    path = %path,
                    status = 200,
                    bytes = png.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Image transformed"
                );
                Response::png(png)
            }
            Err(e) => {
                let status = e.status();
                match &e {
                    TransformError::InternalFailure(_) | TransformError::Timeout => {
                        tracing::warn!(path = %path, status = status.as_u16(), error = %e, "Transform failed");
                    }
                    _ => {
                        tracing::debug!(path = %path, status = status.as_u16(), error = %e, "Transform rejected");
                    }
                }
                Response::empty(status)
            }
        }
    }

    /// Run the full pipeline and return the encoded PNG.
    pub async fn process(&self, request: Request) -> Result<Vec<u8>, TransformError> {
        let command = TransformCommand::from_path(&request.path)?;

        let declared = request.content_length().max(request.body.len());
        if declared > self.limits.max_body_bytes {
            return Err(TransformError::PayloadTooLarge(format!(
                "body of {} bytes exceeds {} bytes",
                declared, self.limits.max_body_bytes
            )));
        }

        let deadline = Deadline::after(self.request_timeout);
        let limits = self.limits.clone();
        let body = request.body;

        let task = tokio::task::spawn_blocking(move || {
            transform_image(&command, &body, &limits, deadline)
        });

        match timeout(self.request_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(TransformError::InternalFailure(format!(
                "transform task failed: {join_error}"
            ))),
            Err(_) => Err(TransformError::Timeout),
        }
    }
}

/// Decode, check, transform, crop and encode one uploaded image.
///
/// The decoded buffers are owned by this call and dropped on every return
/// path.
pub fn transform_image(
    command: &TransformCommand,
    bytes: &[u8],
    limits: &LimitsConfig,
    deadline: Deadline,
) -> Result<Vec<u8>, TransformError> {
    let decoded = decode(bytes, limits.max_dimension)?;
    deadline.check()?;

    if decoded.width() > limits.max_dimension || decoded.height() > limits.max_dimension {
        return Err(TransformError::PayloadTooLarge(format!(
            "{}x{} image exceeds {}x{}",
            decoded.width(),
            decoded.height(),
            limits.max_dimension,
            limits.max_dimension
        )));
    }

    let transformed = apply_transform(&decoded, command.kind);
    drop(decoded);
    deadline.check()?;

    let cropped = crop(&transformed, &command.crop)?;
    drop(transformed);
    deadline.check()?;

    encode_png(&cropped)
}

fn decode(bytes: &[u8], max_dimension: u32) -> Result<DynamicImage, TransformError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| TransformError::DecodeFailure(e.to_string()))?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    reader.limits(limits);

    reader.decode().map_err(|e| match e {
        ImageError::Limits(limit) => TransformError::PayloadTooLarge(limit.to_string()),
        other => TransformError::DecodeFailure(other.to_string()),
    })
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, TransformError> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| TransformError::InternalFailure(format!("failed to encode PNG: {e}")))?;
    Ok(buffer)
}
