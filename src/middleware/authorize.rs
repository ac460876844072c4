//! Route-group authorization gates.
//!
//! Runs after [`SessionLayer`](super::session::SessionLayer) and only reads
//! what it attached:
//!
//! | Gate | No session | Wrong role | Otherwise |
//! |---|---|---|---|
//! | [`AuthorizeLayer::authenticated`] | 303 to login | - | pass |
//! | [`AuthorizeLayer::roles`] | 303 to login | 403 | pass |
//!
//! Role checks use the displayed role, so an impersonating admin sees
//! exactly what the impersonated role sees.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::{IntoResponse, Redirect};
use tower::{Layer, Service};
use tracing::debug;

use super::session::LoginPath;
use crate::session::{Role, Session};

/// Requirement a gate enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Authenticated,
    AnyRole(Arc<[Role]>),
}

/// Authorization layer for a route group.
#[derive(Debug, Clone)]
pub struct AuthorizeLayer {
    requirement: Requirement,
}

impl AuthorizeLayer {
    /// Require any live session.
    pub fn authenticated() -> Self {
        Self {
            requirement: Requirement::Authenticated,
        }
    }

    /// Require a live session whose displayed role is one of `roles`.
    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            requirement: Requirement::AnyRole(roles.into_iter().collect()),
        }
    }
}

impl<S> Layer<S> for AuthorizeLayer {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            requirement: self.requirement.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizeService<S> {
    inner: S,
    requirement: Requirement,
}

impl<S> Service<Request<Body>> for AuthorizeService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let Some(session) = req.extensions().get::<Session>() else {
            let login_path = req
                .extensions()
                .get::<LoginPath>()
                .cloned()
                .unwrap_or_default();
            debug!(path = %req.uri().path(), "No session, redirecting to login");
            let response = Redirect::to(login_path.as_str()).into_response();
            return Box::pin(async move { Ok(response) });
        };

        if let Requirement::AnyRole(roles) = &self.requirement
            && !session.has_any_role(roles)
        {
            debug!(
                account_id = %session.account_id,
                role = %session.role,
                path = %req.uri().path(),
                "Role not permitted"
            );
            let response = (StatusCode::FORBIDDEN, "Forbidden").into_response();
            return Box::pin(async move { Ok(response) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
