//! Ticket validation errors.
//!
//! Every failure carries a [`ErrorKind`] tag. The middleware maps kinds to
//! HTTP outcomes; anything that is not one of the named kinds is
//! [`ErrorKind::Unclassified`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no ticket found in request")]
    TicketMissing,
    #[error("ticket signature is not valid")]
    SignatureInvalid,
    #[error("ticket validity has expired")]
    ValidationExpired,
    #[error("ticket grace period has expired")]
    GracePeriodExpired,
    #[error("ticket is not bound to the client ip")]
    WrongIp,
    #[error("ticket carries no required token")]
    NoValidToken,
    #[error("a secured connection is required")]
    TlsRequired,
    #[error("malformed ticket: {0}")]
    Malformed(String),
    #[error("failed to decrypt value")]
    Decrypt,
    #[error("failed to parse key: {0}")]
    KeyParse(String),
    #[error("invalid options: {0}")]
    Options(String),
    #[error("{0}")]
    Other(String),
}

/// Taxonomy tag of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TicketMissing,
    SignatureInvalid,
    ValidationExpired,
    GracePeriodExpired,
    WrongIp,
    NoValidToken,
    TlsRequired,
    Unclassified,
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TicketMissing => ErrorKind::TicketMissing,
            Self::SignatureInvalid => ErrorKind::SignatureInvalid,
            Self::ValidationExpired => ErrorKind::ValidationExpired,
            Self::GracePeriodExpired => ErrorKind::GracePeriodExpired,
            Self::WrongIp => ErrorKind::WrongIp,
            Self::NoValidToken => ErrorKind::NoValidToken,
            Self::TlsRequired => ErrorKind::TlsRequired,
            Self::Malformed(_)
            | Self::Decrypt
            | Self::KeyParse(_)
            | Self::Options(_)
            | Self::Other(_) => ErrorKind::Unclassified,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
