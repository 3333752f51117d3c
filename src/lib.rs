//! # authpubtkt
//!
//! Single sign-on tickets compatible with Apache `mod_auth_pubtkt`.
//!
//! A login server signs a ticket (`uid`, validity, client ip, tokens, ...)
//! with its private key and hands it to the browser, usually as a cookie.
//! Every protected service only needs the public key to check it offline.
//!
//! - [`pubtkt::AuthPubTkt`] decodes, verifies and issues tickets.
//! - [`pubtkt::AuthPubTktLayer`] is a tower layer that guards a service and
//!   redirects rejected requests to the login, timeout, refresh or unauth
//!   pages.
//! - [`cli`] and [`server`] make up the `authpubtkt` binary: a demo server
//!   behind the layer and a `sign` command to issue test tickets.

pub mod cli;
pub mod pubtkt;
pub mod server;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
