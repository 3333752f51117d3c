//! `mod_auth_pubtkt` compatible tickets.
//!
//! [`AuthPubTkt`] decodes, verifies and issues tickets for one set of
//! [`AuthPubTktOptions`]. Keys are parsed once when it is built; afterwards
//! it is read-only and can be shared across request handlers.

pub mod cipher;
pub mod clock;
pub mod error;
pub mod middleware;
pub mod options;
pub mod request;
pub mod signature;
pub mod ticket;

pub use self::{
    cipher::CipherMethod,
    clock::{Clock, FixedClock, SystemClock},
    error::{Error, ErrorKind, Result},
    middleware::{
        ticket_request, AuthPubTktLayer, AuthPubTktService, Decision, ErrorPolicy, MiddlewareError,
    },
    options::{AuthPubTktOptions, TokenPolicy},
    request::SecureConnection,
    signature::{PrivateKey, PublicKey, SignatureAlgorithm},
    ticket::Ticket,
};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response},
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Anything that can turn a request into a verified ticket.
///
/// The middleware only depends on this trait; [`AuthPubTkt`] is the
/// production implementation.
pub trait TicketVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns the reason the request does not carry a valid ticket.
    fn verify_from_request(&self, request: &Request<Body>) -> Result<Ticket>;
}

pub struct AuthPubTkt {
    options: Arc<AuthPubTktOptions>,
    public_key: PublicKey,
    private_key: Option<PrivateKey>,
    clock: Arc<dyn Clock>,
}

impl AuthPubTkt {
    /// Build a validator reading the wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Options`] for invalid options and [`Error::KeyParse`]
    /// for keys that cannot be read.
    pub fn new(options: AuthPubTktOptions) -> Result<Self> {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Build a validator with an injected time source.
    ///
    /// # Errors
    ///
    /// Same as [`AuthPubTkt::new`].
    pub fn with_clock(options: AuthPubTktOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        options.validate()?;

        let public_key = PublicKey::from_pem(&options.public_key)?;
        let private_key = options.private_key().map(PrivateKey::from_pem).transpose()?;

        debug!(
            algorithm = ?public_key.algorithm(),
            signing = private_key.is_some(),
            "ticket validator ready"
        );

        Ok(Self {
            options: Arc::new(options),
            public_key,
            private_key,
            clock,
        })
    }

    #[must_use]
    pub fn options(&self) -> &Arc<AuthPubTktOptions> {
        &self.options
    }

    /// Decode a wire ticket, decrypting it first when a passphrase is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decrypt`] if decryption fails and
    /// [`Error::Malformed`] if the plaintext is not a ticket.
    pub fn raw_to_ticket(&self, raw: &str) -> Result<Ticket> {
        match self.options.cipher_passphrase() {
            Some(passphrase) => {
                let plaintext = cipher::decrypt(passphrase, raw, self.options.cipher_method)?;
                let plaintext = String::from_utf8(plaintext).map_err(|_| Error::Decrypt)?;
                Ticket::parse(&plaintext)
            }
            None => Ticket::parse(raw),
        }
    }

    /// Recompute the canonical body and its signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Options`] when no private key is configured.
    pub fn sign_ticket(&self, ticket: &mut Ticket) -> Result<()> {
        let key = self
            .private_key
            .as_ref()
            .ok_or_else(|| Error::Options("a private key is required to sign".to_string()))?;

        ticket.raw_data = ticket.data_string();
        ticket.sig = key.sign(ticket.raw_data.as_bytes())?;
        Ok(())
    }

    /// Sign the ticket and render its wire form, encrypted when a passphrase
    /// is set.
    ///
    /// # Errors
    ///
    /// Propagates signing and encryption failures.
    pub fn ticket_to_raw(&self, ticket: &mut Ticket) -> Result<String> {
        self.sign_ticket(ticket)?;
        let plaintext = ticket.to_string();

        match self.options.cipher_passphrase() {
            Some(passphrase) => cipher::encrypt(
                passphrase,
                plaintext.as_bytes(),
                self.options.cipher_method,
            ),
            None => Ok(plaintext),
        }
    }

    /// Check a decoded ticket: signature, expiry, grace period, client ip,
    /// then tokens. The first failing check is returned.
    ///
    /// # Errors
    ///
    /// Returns the taxonomy error of the first failing check.
    #[instrument(skip_all, fields(uid = %ticket.uid))]
    pub fn verify_ticket(&self, ticket: &Ticket, observed_ip: &str) -> Result<()> {
        let body = if ticket.raw_data.is_empty() {
            ticket.data_string()
        } else {
            ticket.raw_data.clone()
        };
        self.public_key.verify(body.as_bytes(), &ticket.sig)?;

        let now = self.clock.now();
        if now > ticket.valid_until {
            debug!(valid_until = ticket.valid_until, now, "ticket expired");
            return Err(Error::ValidationExpired);
        }

        if let Some(grace_period) = ticket.grace_period {
            if now > grace_period {
                debug!(grace_period, now, "ticket grace period expired");
                return Err(Error::GracePeriodExpired);
            }
        }

        if self.options.check_ip && ticket.cip != observed_ip {
            debug!(cip = %ticket.cip, observed_ip, "ticket bound to another ip");
            return Err(Error::WrongIp);
        }

        if !self.has_required_tokens(&ticket.tokens) {
            debug!(tokens = ?ticket.tokens, "ticket lacks required tokens");
            return Err(Error::NoValidToken);
        }

        Ok(())
    }

    fn has_required_tokens(&self, tokens: &[String]) -> bool {
        let required = &self.options.required_tokens;
        if required.is_empty() {
            return true;
        }

        let carried = |token: &String| tokens.contains(token);
        match self.options.token_policy {
            TokenPolicy::AllOf => required.iter().all(carried),
            TokenPolicy::AnyOf => required.iter().any(carried),
        }
    }

    /// Extract, decode and verify the ticket carried by a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TlsRequired`] on a plain connection when TLS is
    /// required, [`Error::TicketMissing`] when no source carries a ticket,
    /// and otherwise the decoding or verification error.
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    pub fn verify_request<B>(&self, request: &Request<B>) -> Result<Ticket> {
        if self.options.require_tls && !request::is_secure(request) {
            debug!("ticket presented over a plain connection");
            return Err(Error::TlsRequired);
        }

        let raw = request::find_raw_ticket(request.headers(), &self.options)
            .ok_or(Error::TicketMissing)?;
        let raw = request::query_unescape(&raw)?;
        let ticket = self.raw_to_ticket(&raw)?;

        let observed_ip = request::observed_ip(request, self.options.check_x_forwarded_ip);
        self.verify_ticket(&ticket, &observed_ip)?;

        Ok(ticket)
    }

    /// Issue the ticket into the request, as the configured cookie or the
    /// first configured header.
    ///
    /// # Errors
    ///
    /// Propagates signing and encryption failures.
    pub fn ticket_in_request<B>(&self, request: &mut Request<B>, ticket: &mut Ticket) -> Result<()> {
        let value = request::query_escape(&self.ticket_to_raw(ticket)?);
        let headers = request.headers_mut();

        match self.placement() {
            Placement::Cookie(name) => {
                let mut cookie = format!("{name}={value}");
                if let Some(existing) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
                    cookie = format!("{existing}; {cookie}");
                }
                headers.insert(header::COOKIE, header_value(&cookie)?);
            }
            Placement::Header(name) => {
                headers.insert(header_name(name)?, header_value(&value)?);
            }
        }

        Ok(())
    }

    /// Issue the ticket into a response, as a `Set-Cookie` or the first
    /// configured header.
    ///
    /// # Errors
    ///
    /// Propagates signing and encryption failures.
    pub fn ticket_in_response<B>(
        &self,
        response: &mut Response<B>,
        ticket: &mut Ticket,
    ) -> Result<()> {
        let value = request::query_escape(&self.ticket_to_raw(ticket)?);
        let headers = response.headers_mut();

        match self.placement() {
            Placement::Cookie(name) => {
                let mut cookie = format!("{name}={value}; Path=/");
                if self.options.require_tls {
                    cookie.push_str("; Secure");
                }
                headers.append(header::SET_COOKIE, header_value(&cookie)?);
            }
            Placement::Header(name) => {
                headers.insert(header_name(name)?, header_value(&value)?);
            }
        }

        Ok(())
    }

    fn placement(&self) -> Placement<'_> {
        match self.options.sources.first() {
            Some(source) if !source.eq_ignore_ascii_case(options::COOKIE_SOURCE) => {
                Placement::Header(source)
            }
            _ => Placement::Cookie(&self.options.cookie_name),
        }
    }
}

impl TicketVerifier for AuthPubTkt {
    fn verify_from_request(&self, request: &Request<Body>) -> Result<Ticket> {
        self.verify_request(request)
    }
}

impl std::fmt::Debug for AuthPubTkt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPubTkt")
            .field("options", &self.options)
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key)
            .finish_non_exhaustive()
    }
}

enum Placement<'a> {
    Cookie(&'a str),
    Header(&'a str),
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Other(format!("invalid header value: {e}")))
}

fn header_name(name: &str) -> Result<header::HeaderName> {
    header::HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::Other(format!("invalid header name {name}: {e}")))
}
