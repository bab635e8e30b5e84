//! Tower middleware enforcing a [`Guard`].
//!
//! `RequireLayer` and `RequireService` wrap any inner service. The request's
//! `Identity` extension (inserted by the authentication layer) is checked
//! against the guard; allowed requests carry the `AccessDecision` onward in
//! their extensions.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::IntoResponse;
use http::{Request, StatusCode};
use rolegate_core::{AccessDecision, Identity};
use tower::{Layer, Service};

use crate::guard::Guard;

/// Tower `Layer` that wraps services with a permission requirement.
#[derive(Clone, Debug)]
pub struct RequireLayer {
    guard: Guard,
}

impl RequireLayer {
    /// Create a new layer enforcing `guard`.
    pub fn new(guard: Guard) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for RequireLayer {
    type Service = RequireService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Tower `Service` that evaluates the guard before forwarding requests.
#[derive(Clone, Debug)]
pub struct RequireService<S> {
    inner: S,
    guard: Guard,
}

impl<S> Service<Request<Body>> for RequireService<S>
where
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
{
    type Response = axum::response::Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let identity = req.extensions().get::<Identity>().cloned();
        let decision = self.guard.check(identity.as_ref());

        Box::pin(async move {
            if !decision.allowed {
                return Ok(match identity {
                    None => {
                        log::warn!(
                            "Access denied for unauthenticated request to {}",
                            req.uri().path()
                        );
                        unauthorized_response()
                    }
                    Some(identity) => {
                        log::warn!(
                            "Access denied for '{}' (role '{}') to {}: missing {}",
                            identity.subject,
                            identity.role_id,
                            req.uri().path(),
                            join_keys(&decision)
                        );
                        forbidden_response(&decision)
                    }
                });
            }

            req.extensions_mut().insert(decision);
            let resp = inner
                .call(req)
                .await
                .unwrap_or_else(|infallible| match infallible {});
            Ok(resp.into_response())
        })
    }
}

fn join_keys(decision: &AccessDecision) -> String {
    decision
        .missing
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a 401 Unauthorized response.
fn unauthorized_response() -> axum::response::Response {
    let body = serde_json::json!({
        "error": {
            "category": "authentication",
            "message": "no identity for this request",
        }
    });
    json_response(StatusCode::UNAUTHORIZED, &body)
}

/// Build a 403 Forbidden response listing the missing permission keys.
fn forbidden_response(decision: &AccessDecision) -> axum::response::Response {
    let body = serde_json::json!({
        "error": {
            "category": "authorization",
            "message": "missing required permissions",
            "missing": decision.missing,
            "evaluated_against_version": decision.evaluated_against_version,
        }
    });
    json_response(StatusCode::FORBIDDEN, &body)
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> axum::response::Response {
    (
        status,
        [(http::header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(body).unwrap_or_default(),
    )
        .into_response()
}
