//! Session authentication middleware.
//!
//! Resolves the session cookie through the [`SessionStore`] and attaches the
//! result to request extensions:
//!
//! - [`Session`]: the live session, if any
//! - [`SessionToken`]: the token it was found under
//! - [`LoginPath`]: where handlers redirect when a session is required
//!
//! This layer never rejects a request. Gating is the job of
//! [`AuthorizeLayer`](super::authorize::AuthorizeLayer) and the
//! [`CurrentSession`] extractor.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Request, Response};
use axum::response::Redirect;
use tower::{Layer, Service};
use tracing::trace;

use crate::session::{Session, SessionCookie, SessionStore, SessionToken};

/// Login page path, attached to every request by [`SessionLayer`].
#[derive(Debug, Clone)]
pub struct LoginPath(pub Arc<str>);

impl LoginPath {
    pub fn new(path: &str) -> Self {
        Self(Arc::from(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LoginPath {
    fn default() -> Self {
        Self::new("/login")
    }
}

/// Layer that attaches the caller's session to each request.
#[derive(Clone)]
pub struct SessionLayer {
    store: SessionStore,
    cookie: Arc<SessionCookie>,
    login_path: LoginPath,
}

impl SessionLayer {
    pub fn new(store: SessionStore, cookie: SessionCookie, login_path: LoginPath) -> Self {
        Self {
            store,
            cookie: Arc::new(cookie),
            login_path,
        }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: self.store.clone(),
            cookie: self.cookie.clone(),
            login_path: self.login_path.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SessionService<S> {
    inner: S,
    store: SessionStore,
    cookie: Arc<SessionCookie>,
    login_path: LoginPath,
}

impl<S> Service<Request<Body>> for SessionService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        req.extensions_mut().insert(self.login_path.clone());

        if let Some(token) = self.cookie.read_token(req.headers())
            && let Some(session) = self.store.get(&token)
        {
            trace!(
                account_id = %session.account_id,
                role = %session.role,
                "Session attached"
            );
            req.extensions_mut().insert(session);
            req.extensions_mut().insert(token);
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

/// The authenticated caller, for handlers behind a session.
///
/// Extraction fails with a `303 See Other` to the login path when the request
/// carries no live session.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: Session,
    pub token: SessionToken,
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().cloned();
        let token = parts.extensions.get::<SessionToken>().cloned();

        match (session, token) {
            (Some(session), Some(token)) => Ok(Self { session, token }),
            _ => {
                let login_path = parts
                    .extensions
                    .get::<LoginPath>()
                    .cloned()
                    .unwrap_or_default();
                Err(Redirect::to(login_path.as_str()))
            }
        }
    }
}
