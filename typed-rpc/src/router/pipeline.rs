//! Per-request pipeline of a compiled route.
//!
//! ```text
//! Received -> Decoding -> Validating -> MiddlewareExecuting -> Handling -> Responding
//!                 \            \                 \                 \
//!                  +------------+-----------------+-----------------+--> Erroring -> Responding
//! ```
//!
//! The pipeline is the single error boundary: whatever a stage returns as
//! an [`RpcError`], and any panic, is rendered here with the uniform error
//! envelope.

use crate::codec::{self, FieldDecode, RichValue};
use crate::config::RpcConfig;
use crate::context::Context;
use crate::error::{ErrorConfig, RpcError, RpcResult};
use crate::middleware::{BoxFuture, OperationKind, RequestInfo, Terminal, execute_chain};
use crate::procedure::{Operation, Reply};
use crate::validation::FieldError;
use axum::extract::{Query, Request};
use axum::http::{HeaderMap, Uri, header};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Stage of one request in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestStage {
    Received,
    Decoding,
    Validating,
    MiddlewareExecuting,
    Handling,
    Erroring,
    Responding,
}

impl RequestStage {
    const ALL: [RequestStage; 7] = [
        Self::Received,
        Self::Decoding,
        Self::Validating,
        Self::MiddlewareExecuting,
        Self::Handling,
        Self::Erroring,
        Self::Responding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Decoding => "decoding",
            Self::Validating => "validating",
            Self::MiddlewareExecuting => "middleware",
            Self::Handling => "handling",
            Self::Erroring => "erroring",
            Self::Responding => "responding",
        }
    }

    /// Whether a failure may occur while in this stage.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            Self::Decoding | Self::Validating | Self::MiddlewareExecuting | Self::Handling
        )
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current stage, shared between the pipeline and the handler continuation.
struct StageTracker(AtomicU8);

impl StageTracker {
    fn new() -> Self {
        Self(AtomicU8::new(RequestStage::Received as u8))
    }

    fn set(&self, stage: RequestStage) {
        self.0.store(stage as u8, Ordering::Release);
    }

    fn get(&self) -> RequestStage {
        let raw = self.0.load(Ordering::Acquire);
        RequestStage::ALL
            .get(usize::from(raw))
            .copied()
            .unwrap_or(RequestStage::Received)
    }
}

/// Settings every endpoint of a router shares.
#[derive(Debug, Clone)]
pub(crate) struct PipelineSettings {
    pub(crate) max_body_size: usize,
    pub(crate) strict_envelopes: bool,
    pub(crate) errors: ErrorConfig,
}

impl From<&RpcConfig> for PipelineSettings {
    fn from(config: &RpcConfig) -> Self {
        Self {
            max_body_size: config.max_body_size,
            strict_envelopes: config.strict_envelopes,
            errors: config.error_config(),
        }
    }
}

/// Decoded input before validation.
#[derive(Debug)]
struct DecodedInput {
    value: RichValue,
    malformed: Vec<FieldError>,
}

impl DecodedInput {
    fn empty() -> Self {
        Self {
            value: RichValue::Object(BTreeMap::new()),
            malformed: Vec::new(),
        }
    }
}

/// One compiled operation.
pub(crate) struct Endpoint<S> {
    name: Arc<str>,
    operation: Operation<S>,
    state: Arc<S>,
    settings: Arc<PipelineSettings>,
}

impl<S: Send + Sync + 'static> Endpoint<S> {
    pub(crate) fn new(
        name: &str,
        operation: Operation<S>,
        state: Arc<S>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            name: name.into(),
            operation,
            state,
            settings,
        }
    }

    /// Serve one request. Never fails: errors become envelope responses.
    pub(crate) async fn serve(self: Arc<Self>, request: Request) -> Response {
        let tracker = Arc::new(StageTracker::new());
        let started = Instant::now();

        let outcome = AssertUnwindSafe(Arc::clone(&self).execute(request, Arc::clone(&tracker)))
            .catch_unwind()
            .await;
        let result = outcome.unwrap_or_else(|panic| {
            Err(RpcError::unknown(format!(
                "panic: {}",
                panic_message(&*panic)
            )))
        });

        match result {
            Ok(reply) => {
                tracker.set(RequestStage::Responding);
                trace!(
                    operation = %self.name,
                    status = reply.status.as_u16(),
                    format = ?reply.format,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Request completed"
                );
                reply.into_response()
            }
            Err(error) => {
                let failed_at = tracker.get();
                tracker.set(RequestStage::Erroring);
                if error.code.is_server_error() {
                    warn!(
                        operation = %self.name,
                        stage = %failed_at,
                        code = %error.code,
                        cause = error.cause.as_deref().unwrap_or(""),
                        "Request failed"
                    );
                } else {
                    debug!(
                        operation = %self.name,
                        stage = %failed_at,
                        code = %error.code,
                        status = error.status().as_u16(),
                        "Request rejected"
                    );
                }
                tracker.set(RequestStage::Responding);
                error.into_response_with(&self.settings.errors)
            }
        }
    }

    async fn execute(self: Arc<Self>, request: Request, tracker: Arc<StageTracker>) -> RpcResult<Reply> {
        let kind = self.operation.kind();
        let (parts, body) = request.into_parts();
        let info = Arc::new(RequestInfo {
            operation: self.name.to_string(),
            kind,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
        });
        trace!(operation = %self.name, kind = %kind, "Request received");

        tracker.set(RequestStage::Decoding);
        let decoded = match kind {
            OperationKind::Query => decode_query(&parts.uri)?,
            OperationKind::Mutation => {
                decode_body(&parts.headers, body, self.settings.max_body_size).await?
            }
        };

        tracker.set(RequestStage::Validating);
        let input = self.validate(decoded)?;

        tracker.set(RequestStage::MiddlewareExecuting);
        let ctx = Context::new(Arc::clone(&self.state));
        let endpoint = Arc::clone(&self);
        let handling = Arc::clone(&tracker);
        let handler_request = Arc::clone(&info);
        let terminal: Terminal<S> = Box::new(move |ctx| -> BoxFuture<'static, RpcResult<Reply>> {
            handling.set(RequestStage::Handling);
            endpoint.operation.invoke(input, ctx, handler_request)
        });

        execute_chain(Arc::clone(self.operation.middlewares()), ctx, info, terminal).await
    }

    fn validate(&self, decoded: DecodedInput) -> RpcResult<Box<dyn Any + Send>> {
        if !self.operation.has_input() {
            return self
                .operation
                .parse_input(Value::Null)
                .map_err(RpcError::invalid_input);
        }
        if self.settings.strict_envelopes && !decoded.malformed.is_empty() {
            return Err(RpcError::invalid_input(decoded.malformed));
        }
        self.operation
            .parse_input(decoded.value.to_plain_json())
            .map_err(RpcError::invalid_input)
    }
}

fn decode_query(uri: &Uri) -> RpcResult<DecodedInput> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).map_err(|e| {
        RpcError::bad_request("Malformed query string").with_cause(e.to_string())
    })?;

    let mut decoded = DecodedInput::empty();
    let mut fields = BTreeMap::new();
    for (name, raw) in params {
        let value = decode_raw_field(&name, &raw, &mut decoded.malformed);
        fields.insert(name, value);
    }
    decoded.value = RichValue::Object(fields);
    Ok(decoded)
}

async fn decode_body(
    headers: &HeaderMap,
    body: axum::body::Body,
    max_body_size: usize,
) -> RpcResult<DecodedInput> {
    let too_large =
        || RpcError::payload_too_large(format!("Request body exceeds {} bytes", max_body_size));

    let declared_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_length.is_some_and(|length| length > max_body_size) {
        return Err(too_large());
    }

    // Past the declared length check, a read failure is the limit being hit
    // by a body without (or with a lying) Content-Length.
    let bytes = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|e| too_large().with_cause(e.to_string()))?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(DecodedInput::empty());
    }

    let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
        RpcError::bad_request("Request body is not valid JSON").with_cause(e.to_string())
    })?;

    let mut decoded = DecodedInput::empty();
    decoded.value = match document {
        Value::Object(fields) => {
            let mut values = BTreeMap::new();
            for (name, field) in fields {
                let value = match field {
                    Value::String(raw) => decode_raw_field(&name, &raw, &mut decoded.malformed),
                    other => RichValue::from(other),
                };
                values.insert(name, value);
            }
            RichValue::Object(values)
        }
        Value::String(raw) => decode_raw_field("input", &raw, &mut decoded.malformed),
        other => RichValue::from(other),
    };
    Ok(decoded)
}

fn decode_raw_field(name: &str, raw: &str, malformed: &mut Vec<FieldError>) -> RichValue {
    match codec::decode_field(raw) {
        FieldDecode::Decoded(value) => value,
        FieldDecode::Raw(text) => RichValue::String(text),
        FieldDecode::Malformed(err) => {
            trace!(field = %name, error = %err, "Malformed envelope in input field");
            malformed.push(FieldError::new(
                name,
                format!("{} is not a valid structured value: {}", name, err),
                "malformed_envelope",
            ));
            RichValue::String(raw.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
