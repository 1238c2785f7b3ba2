//! Route guards for axum.
//!
//! [`require_authenticated`] and [`require_unauthenticated`] build a tower
//! [`Layer`] that checks the authentication cookie before the wrapped
//! handler runs and redirects when the caller's state does not match.

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue, InvalidHeaderValue};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::store::TokenStore;
use crate::{Authentication, Gatekeeper};

/// Header htmx follows for client side redirects.
pub const HX_REDIRECT: &str = "hx-redirect";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Authenticated,
    Unauthenticated,
}

impl Requirement {
    fn is_met_by(self, auth: &Authentication) -> bool {
        match self {
            Requirement::Authenticated => auth.is_authenticated(),
            Requirement::Unauthenticated => !auth.is_authenticated(),
        }
    }

    /// Outcome when the authentication state cannot be determined.
    fn is_met_on_error(self) -> bool {
        match self {
            Requirement::Authenticated => false,
            Requirement::Unauthenticated => true,
        }
    }
}

/// Only lets authenticated callers through; everyone else is sent to
/// `redirect_to`.
///
/// Store failures while checking the cookie count as not authenticated.
pub fn require_authenticated<S>(
    gatekeeper: Arc<Gatekeeper<S>>,
    redirect_to: &str,
) -> Result<AccessGuardLayer<S>, InvalidHeaderValue> {
    AccessGuardLayer::new(gatekeeper, Requirement::Authenticated, redirect_to)
}

/// Only lets anonymous callers through; authenticated callers are sent to
/// `redirect_to`.
///
/// Store failures while checking the cookie let the request through.
pub fn require_unauthenticated<S>(
    gatekeeper: Arc<Gatekeeper<S>>,
    redirect_to: &str,
) -> Result<AccessGuardLayer<S>, InvalidHeaderValue> {
    AccessGuardLayer::new(gatekeeper, Requirement::Unauthenticated, redirect_to)
}

pub struct AccessGuardLayer<S> {
    gatekeeper: Arc<Gatekeeper<S>>,
    requirement: Requirement,
    redirect_to: HeaderValue,
}

impl<S> AccessGuardLayer<S> {
    fn new(
        gatekeeper: Arc<Gatekeeper<S>>,
        requirement: Requirement,
        redirect_to: &str,
    ) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            gatekeeper,
            requirement,
            redirect_to: HeaderValue::from_str(redirect_to)?,
        })
    }
}

impl<S> Clone for AccessGuardLayer<S> {
    fn clone(&self) -> Self {
        Self {
            gatekeeper: self.gatekeeper.clone(),
            requirement: self.requirement,
            redirect_to: self.redirect_to.clone(),
        }
    }
}

impl<S, I> Layer<I> for AccessGuardLayer<S> {
    type Service = AccessGuard<S, I>;

    fn layer(&self, inner: I) -> Self::Service {
        AccessGuard {
            inner,
            gatekeeper: self.gatekeeper.clone(),
            requirement: self.requirement,
            redirect_to: self.redirect_to.clone(),
        }
    }
}

pub struct AccessGuard<S, I> {
    inner: I,
    gatekeeper: Arc<Gatekeeper<S>>,
    requirement: Requirement,
    redirect_to: HeaderValue,
}

impl<S, I: Clone> Clone for AccessGuard<S, I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gatekeeper: self.gatekeeper.clone(),
            requirement: self.requirement,
            redirect_to: self.redirect_to.clone(),
        }
    }
}

impl<S, I> Service<Request<Body>> for AccessGuard<S, I>
where
    S: TokenStore + 'static,
    I: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    I::Future: Send,
    I::Error: Send + 'static,
{
    type Response = Response;
    type Error = I::Error;
    type Future = BoxFuture<'static, Result<Response, I::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // the clone may not be ready; keep the instance poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let gatekeeper = self.gatekeeper.clone();
        let requirement = self.requirement;
        let redirect_to = self.redirect_to.clone();

        Box::pin(async move {
            let jar = CookieJar::from_headers(req.headers());

            let allowed = match gatekeeper.validate_authentication_token(&jar).await {
                Ok(auth) => {
                    let allowed = requirement.is_met_by(&auth);
                    req.extensions_mut().insert(auth);
                    allowed
                }
                Err(err) => {
                    warn!(error = ?err, "could not check authentication cookie");
                    requirement.is_met_on_error()
                }
            };

            if !allowed {
                debug!(?requirement, path = %req.uri().path(), "redirecting request");
                return Ok(redirect(redirect_to));
            }

            inner.call(req).await
        })
    }
}

fn redirect(target: HeaderValue) -> Response {
    let mut response = StatusCode::TEMPORARY_REDIRECT.into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, target.clone());
    headers.insert(HeaderName::from_static(HX_REDIRECT), target);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CredentialStore, MemoryStore};
    use crate::testing::{FlakyStore, gatekeeper};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn request(cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/account");
        if let Some(value) = cookie {
            builder = builder.header(header::COOKIE, format!("auth={value}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn counting_handler(
        calls: Arc<AtomicUsize>,
    ) -> impl Service<
        Request<Body>,
        Response = Response,
        Error = Infallible,
        Future = impl Future<Output = Result<Response, Infallible>> + Send,
    > + Clone
    + Send
    + 'static {
        tower::service_fn(move |req: Request<Body>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let user = req
                .extensions()
                .get::<Authentication>()
                .and_then(|auth| auth.user_id().map(str::to_string))
                .unwrap_or_default();
            async move { Ok::<_, Infallible>(Response::new(Body::from(format!("hello {user}")))) }
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn signed_in<S: TokenStore>(gk: &Gatekeeper<S>) -> String {
        gk.sign_user_in("a@x.com", "pw", "203.0.113.5", false)
            .await
            .unwrap()
            .value()
            .to_string()
    }

    #[tokio::test]
    async fn anonymous_request_is_redirected_to_login() {
        let gk = Arc::new(gatekeeper(Arc::new(MemoryStore::new())));
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = require_authenticated(gk, "/login")
            .unwrap()
            .layer(counting_handler(calls.clone()));

        let response = svc.oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert_eq!(response.headers()[HX_REDIRECT], "/login");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authenticated_request_reaches_handler() {
        let store = Arc::new(MemoryStore::new());
        let gk = Arc::new(gatekeeper(store.clone()));
        let cookie = signed_in(&gk).await;
        let user = store.find_user("a@x.com").await.unwrap().unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let svc = require_authenticated(gk, "/login")
            .unwrap()
            .layer(counting_handler(calls.clone()));

        let response = svc.oneshot(request(Some(&cookie))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, format!("hello {}", user.id));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tampered_cookie_is_redirected() {
        let gk = Arc::new(gatekeeper(Arc::new(MemoryStore::new())));
        let cookie = signed_in(&gk).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = require_authenticated(gk, "/login")
            .unwrap()
            .layer(counting_handler(calls.clone()));

        let response = svc
            .oneshot(request(Some(&cookie[..cookie.len() - 1])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signed_in_user_is_kept_off_login_page() {
        let gk = Arc::new(gatekeeper(Arc::new(MemoryStore::new())));
        let cookie = signed_in(&gk).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let layer = require_unauthenticated(gk, "/").unwrap();

        let response = layer
            .layer(counting_handler(calls.clone()))
            .oneshot(request(Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let response = layer
            .layer(counting_handler(calls.clone()))
            .oneshot(request(None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_failure_fails_closed_for_protected_routes() {
        let store = Arc::new(FlakyStore::default());
        let gk = Arc::new(gatekeeper(store.clone()));
        let cookie = signed_in(&gk).await;
        store.break_lookups();

        let calls = Arc::new(AtomicUsize::new(0));
        let response = require_authenticated(gk.clone(), "/login")
            .unwrap()
            .layer(counting_handler(calls.clone()))
            .oneshot(request(Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let response = require_unauthenticated(gk, "/")
            .unwrap()
            .layer(counting_handler(calls.clone()))
            .oneshot(request(Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_redirect_target_is_rejected() {
        let gk = Arc::new(gatekeeper(Arc::new(MemoryStore::new())));
        assert!(require_authenticated(gk, "/login\n").is_err());
    }
}
