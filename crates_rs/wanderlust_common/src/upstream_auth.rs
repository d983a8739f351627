//! Trust boundary between the public gateway and the booking service.
//!
//! The gateway authenticates end users and forwards their id in `x-auth-user-id`. That header
//! is only meaningful when the caller proved it is the gateway, so when the layer is `required`
//! a shared secret (and optionally a caller id from an allow-list) must accompany every request.

use axum::http::{header::HeaderName, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";
pub const INTERNAL_CALLER_HEADER: &str = "x-internal-service-id";
pub const USER_ID_HEADER: &str = "x-auth-user-id";

const MAX_USER_ID_LEN: usize = 128;

/// End user on whose behalf the request is made, as asserted by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamUser(pub String);

impl UpstreamUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Clone)]
pub struct UpstreamAuthLayer {
    required: bool,
    secret: Option<String>,
    allowed_callers: Vec<String>,
}

impl UpstreamAuthLayer {
    pub fn new(required: bool, secret: Option<String>) -> Self {
        Self {
            required,
            secret,
            allowed_callers: Vec::new(),
        }
    }

    pub fn with_allowed_callers(mut self, callers: Vec<String>) -> Self {
        let mut out: Vec<String> = Vec::new();
        for raw in callers {
            let caller = raw.trim().to_ascii_lowercase();
            if caller.is_empty() || out.contains(&caller) {
                continue;
            }
            out.push(caller);
        }
        self.allowed_callers = out;
        self
    }
}

impl<S> Layer<S> for UpstreamAuthLayer {
    type Service = UpstreamAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UpstreamAuthService {
            inner,
            required: self.required,
            secret: self.secret.clone(),
            allowed_callers: self.allowed_callers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UpstreamAuthService<S> {
    inner: S,
    required: bool,
    secret: Option<String>,
    allowed_callers: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

fn reject(status: StatusCode, detail: &'static str) -> Response {
    (status, axum::Json(ErrorBody { detail })).into_response()
}

fn header_str<'a, B>(req: &'a Request<B>, name: &'static str) -> &'a str {
    req.headers()
        .get(HeaderName::from_static(name))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

/// `None` when the header is absent, `Some(Err(()))` when present but malformed.
fn parse_user_id(raw: &str) -> Option<Result<UpstreamUser, ()>> {
    if raw.is_empty() {
        return None;
    }
    let valid = raw.len() <= MAX_USER_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'));
    Some(if valid {
        Ok(UpstreamUser(raw.to_string()))
    } else {
        Err(())
    })
}

impl<S, B> Service<Request<B>> for UpstreamAuthService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let required = self.required;
        let secret = self.secret.clone();
        let allowed_callers = self.allowed_callers.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if required {
                let Some(secret) = secret.filter(|s| !s.trim().is_empty()) else {
                    return Ok(reject(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "internal auth not configured",
                    ));
                };

                let provided = header_str(&req, INTERNAL_SECRET_HEADER);
                if provided.is_empty()
                    || provided.as_bytes().ct_eq(secret.as_bytes()).unwrap_u8() != 1
                {
                    return Ok(reject(StatusCode::UNAUTHORIZED, "internal auth required"));
                }

                if !allowed_callers.is_empty() {
                    let caller = header_str(&req, INTERNAL_CALLER_HEADER).to_ascii_lowercase();
                    if caller.is_empty() || !allowed_callers.contains(&caller) {
                        return Ok(reject(
                            StatusCode::UNAUTHORIZED,
                            "internal caller not allowed",
                        ));
                    }
                }
            }

            match parse_user_id(header_str(&req, USER_ID_HEADER)) {
                None => {}
                Some(Ok(user)) => {
                    req.extensions_mut().insert(user);
                }
                Some(Err(())) => {
                    tracing::warn!("rejecting malformed upstream user id");
                    return Ok(reject(StatusCode::UNAUTHORIZED, "invalid user id"));
                }
            }

            inner.call(req).await
        })
    }
}
