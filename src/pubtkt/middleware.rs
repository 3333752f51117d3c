//! Tower middleware guarding a service with pubtkt tickets.
//!
//! Authenticated requests reach the inner service with the [`Ticket`] in
//! their extensions. Rejected requests are redirected to the configured
//! login, timeout, refresh or unauth page, or answered with a status.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use base64ct::{Base64, Encoding};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::{
    cipher,
    error::{Error, Result},
    options::AuthPubTktOptions,
    request, AuthPubTkt, Ticket, TicketVerifier,
};

/// Password sent with fake basic auth credentials.
pub const FAKE_BASIC_AUTH_PASSWORD: &str = "password";

/// What to do with an error the middleware has no redirect for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Answer with the configured status code and text.
    #[default]
    RespondWithStatus,
    /// Return the error from the service; the host decides.
    Escalate,
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Authenticated(Ticket),
    Redirect(String),
    Status { code: StatusCode, body: String },
    Escalate(Error),
}

#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError<E> {
    /// Unclassified ticket error under [`ErrorPolicy::Escalate`].
    #[error(transparent)]
    Escalated(Error),
    #[error(transparent)]
    Inner(E),
}

/// Ticket attached to an authenticated request.
#[must_use]
pub fn ticket_request<B>(request: &Request<B>) -> Option<&Ticket> {
    request.extensions().get::<Ticket>()
}

#[derive(Clone)]
struct Settings {
    options: Arc<AuthPubTktOptions>,
    verifier: Arc<dyn TicketVerifier>,
    status_code: StatusCode,
    status_text: String,
    show_error_details: bool,
    error_policy: ErrorPolicy,
}

impl Settings {
    fn decide(&self, verdict: Result<Ticket>, method: &Method, original_url: &str) -> Decision {
        match verdict {
            Ok(ticket) => Decision::Authenticated(ticket),
            Err(err) => self.reject(err, method, original_url),
        }
    }

    fn reject(&self, err: Error, method: &Method, original_url: &str) -> Decision {
        let opts = &self.options;

        let target = match err {
            Error::TicketMissing | Error::SignatureInvalid => first_set(&[&opts.login_url]),
            Error::ValidationExpired if *method == Method::POST => {
                first_set(&[&opts.post_timeout_url, &opts.timeout_url, &opts.login_url])
            }
            Error::ValidationExpired => first_set(&[&opts.timeout_url, &opts.login_url]),
            Error::GracePeriodExpired => first_set(&[&opts.refresh_url, &opts.login_url]),
            Error::NoValidToken => first_set(&[&opts.unauth_url, &opts.login_url]),
            _ => return self.unclassified(err),
        };

        if let Some(url) = target {
            debug!(reason = %err, target = url, "redirecting rejected request");
            Decision::Redirect(format!(
                "{url}?{}={}",
                opts.back_arg_name,
                request::query_escape(original_url)
            ))
        } else {
            debug!(reason = %err, "rejected request, no redirect configured");
            self.status(Some(&err))
        }
    }

    fn unclassified(&self, err: Error) -> Decision {
        warn!(kind = ?err.kind(), "ticket rejected: {err}");

        match self.error_policy {
            ErrorPolicy::Escalate => Decision::Escalate(err),
            ErrorPolicy::RespondWithStatus => self.status(Some(&err)),
        }
    }

    fn status(&self, err: Option<&Error>) -> Decision {
        let body = match err {
            Some(err) if self.show_error_details => {
                format!("{}\nError details: {err}", self.status_text)
            }
            _ => self.status_text.clone(),
        };

        Decision::Status {
            code: self.status_code,
            body,
        }
    }

    /// Rewrite `Authorization` for the upstream when a basic auth mode is on.
    fn authorization(&self, ticket: &Ticket) -> Result<Option<HeaderValue>> {
        let value = if self.options.fake_basic_auth {
            let credentials = format!("{}:{FAKE_BASIC_AUTH_PASSWORD}", ticket.uid);
            format!("Basic {}", Base64::encode_string(credentials.as_bytes()))
        } else if self.options.passthru_basic_auth {
            match self.options.passthru_basic_key() {
                Some(key) => cipher::bauth_decrypt(&ticket.bauth, key)?,
                None => ticket.bauth.clone(),
            }
        } else {
            return Ok(None);
        };

        HeaderValue::from_str(&value)
            .map(Some)
            .map_err(|e| Error::Other(format!("invalid authorization value: {e}")))
    }

    fn respond(&self, decision: Decision) -> std::result::Result<Response, Error> {
        match decision {
            Decision::Redirect(location) => match HeaderValue::from_str(&location) {
                Ok(location) => {
                    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
                }
                Err(e) => {
                    let err = Error::Other(format!("invalid redirect target: {e}"));
                    self.respond(self.unclassified(err))
                }
            },
            Decision::Status { code, body } => Ok((code, body).into_response()),
            Decision::Escalate(err) => Err(err),
            Decision::Authenticated(_) => Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        }
    }
}

fn first_set<'a>(urls: &[&'a String]) -> Option<&'a str> {
    urls.iter().map(|u| u.as_str()).find(|u| !u.is_empty())
}

/// Layer wrapping services with ticket authentication.
#[derive(Clone)]
pub struct AuthPubTktLayer {
    settings: Settings,
}

impl AuthPubTktLayer {
    /// Build the layer and its [`AuthPubTkt`] validator.
    ///
    /// # Errors
    ///
    /// Returns the validator construction error.
    pub fn new(options: AuthPubTktOptions) -> Result<Self> {
        let auth = AuthPubTkt::new(options)?;
        let options = auth.options().clone();
        Ok(Self::from_parts(options, Arc::new(auth)))
    }

    /// Build the layer around a caller supplied verifier.
    #[must_use]
    pub fn with_verifier(options: AuthPubTktOptions, verifier: Arc<dyn TicketVerifier>) -> Self {
        Self::from_parts(Arc::new(options), verifier)
    }

    fn from_parts(options: Arc<AuthPubTktOptions>, verifier: Arc<dyn TicketVerifier>) -> Self {
        Self {
            settings: Settings {
                options,
                verifier,
                status_code: StatusCode::UNAUTHORIZED,
                status_text: "Unauthorized".to_string(),
                show_error_details: false,
                error_policy: ErrorPolicy::default(),
            },
        }
    }

    /// Status used for errors without a redirect.
    #[must_use]
    pub fn with_status(mut self, text: impl Into<String>, code: StatusCode) -> Self {
        self.settings.status_text = text.into();
        self.settings.status_code = code;
        self
    }

    /// Append the error to status response bodies.
    #[must_use]
    pub fn show_error_details(mut self) -> Self {
        self.settings.show_error_details = true;
        self
    }

    /// Return unclassified errors from the service instead of answering.
    #[must_use]
    pub fn escalate_on_error(mut self) -> Self {
        self.settings.error_policy = ErrorPolicy::Escalate;
        self
    }

    #[must_use]
    pub const fn error_policy(&self) -> ErrorPolicy {
        self.settings.error_policy
    }

    /// Map a verification result to the action taken for the request.
    #[must_use]
    pub fn decide(&self, verdict: Result<Ticket>, method: &Method, original_url: &str) -> Decision {
        self.settings.decide(verdict, method, original_url)
    }
}

impl<S> Layer<S> for AuthPubTktLayer {
    type Service = AuthPubTktService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthPubTktService {
            inner,
            settings: Arc::new(self.settings.clone()),
        }
    }
}

#[derive(Clone)]
pub struct AuthPubTktService<S> {
    inner: S,
    settings: Arc<Settings>,
}

type ServiceFuture<E> =
    Pin<Box<dyn Future<Output = std::result::Result<Response, MiddlewareError<E>>> + Send>>;

impl<S> Service<Request<Body>> for AuthPubTktService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = MiddlewareError<S::Error>;
    type Future = ServiceFuture<S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(MiddlewareError::Inner)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let settings = &self.settings;

        let verdict = settings.verifier.verify_from_request(&req);
        let original_url = request::original_url(&req);
        let decision = settings.decide(verdict, req.method(), &original_url);

        let decision = match decision {
            Decision::Authenticated(ticket) => match settings.authorization(&ticket) {
                Ok(authorization) => {
                    if let Some(authorization) = authorization {
                        req.headers_mut().insert(header::AUTHORIZATION, authorization);
                    }
                    debug!(uid = %ticket.uid, "ticket accepted");
                    req.extensions_mut().insert(ticket);

                    return Box::pin(async move {
                        inner.call(req).await.map_err(MiddlewareError::Inner)
                    });
                }
                Err(err) => settings.unclassified(err),
            },
            rejected => rejected,
        };

        let result = settings.respond(decision).map_err(MiddlewareError::Escalated);
        Box::pin(async move { result })
    }
}
