use crate::{
    cli::actions::read_file,
    pubtkt::{
        cipher, request::query_escape, AuthPubTkt, AuthPubTktOptions, CipherMethod, Clock,
        SystemClock, Ticket,
    },
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Args {
    pub private_key: String,
    pub public_key: String,
    pub uid: String,
    pub cip: Option<String>,
    /// Seconds from now until the ticket expires.
    pub ttl: i64,
    /// Seconds before expiry at which a refresh is required.
    pub grace: Option<i64>,
    pub tokens: Vec<String>,
    pub udata: Option<String>,
    pub bauth: Option<String>,
    pub bauth_key: Option<SecretString>,
    pub passphrase: Option<SecretString>,
    pub cipher_method: Option<CipherMethod>,
    pub escape: bool,
}

/// Print a freshly signed ticket on stdout.
/// # Errors
/// Returns an error if the keys cannot be loaded or signing fails.
pub fn execute(args: &Args) -> Result<()> {
    let ticket = issue(args, SystemClock.now())?;
    println!("{ticket}");
    Ok(())
}

/// Sign a ticket valid from `now` for `args.ttl` seconds.
///
/// # Errors
///
/// Returns an error if the keys cannot be loaded or signing fails.
pub fn issue(args: &Args, now: i64) -> Result<String> {
    let copy_secret = |s: &SecretString| SecretString::from(s.expose_secret().to_string());

    let options = AuthPubTktOptions {
        public_key: read_file(&args.public_key)?,
        private_key: Some(SecretString::from(read_file(&args.private_key)?)),
        cipher_passphrase: args.passphrase.as_ref().map(copy_secret),
        cipher_method: args.cipher_method.unwrap_or_default(),
        passthru_basic_key: args.bauth_key.as_ref().map(copy_secret),
        ..AuthPubTktOptions::default()
    };
    let auth = AuthPubTkt::new(options).context("could not load signing keys")?;

    let bauth = match (&args.bauth, auth.options().passthru_basic_key()) {
        (Some(bauth), Some(key)) => cipher::bauth_encrypt(bauth, key)?,
        (Some(bauth), None) => bauth.clone(),
        (None, _) => String::new(),
    };

    let valid_until = now
        .checked_add(args.ttl)
        .ok_or_else(|| anyhow!("--ttl {} is out of range", args.ttl))?;
    let mut ticket = Ticket {
        uid: args.uid.clone(),
        cip: args.cip.clone().unwrap_or_default(),
        valid_until,
        grace_period: args
            .grace
            .map(|grace| valid_until.saturating_sub(grace)),
        tokens: args.tokens.clone(),
        udata: args.udata.clone().unwrap_or_default(),
        bauth,
        ..Ticket::default()
    };

    let raw = auth.ticket_to_raw(&mut ticket)?;
    debug!(uid = %ticket.uid, valid_until, "ticket signed");

    Ok(if args.escape { query_escape(&raw) } else { raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubtkt::{
        request::query_unescape,
        signature::tests::{RSA_PRIVATE_KEY, RSA_PUBLIC_KEY},
        FixedClock,
    };
    use std::{path::PathBuf, sync::Arc};

    struct Keys {
        private: PathBuf,
        public: PathBuf,
    }

    impl Keys {
        fn new() -> Self {
            let dir = std::env::temp_dir();
            let id = ulid::Ulid::new();
            let private = dir.join(format!("{id}-priv.pem"));
            let public = dir.join(format!("{id}-pub.pem"));
            std::fs::write(&private, RSA_PRIVATE_KEY).unwrap();
            std::fs::write(&public, RSA_PUBLIC_KEY).unwrap();
            Self { private, public }
        }

        fn args(&self, uid: &str) -> Args {
            Args {
                private_key: self.private.display().to_string(),
                public_key: self.public.display().to_string(),
                uid: uid.to_string(),
                ttl: 3600,
                ..Args::default()
            }
        }
    }

    impl Drop for Keys {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.private);
            let _ = std::fs::remove_file(&self.public);
        }
    }

    fn verifier(options: AuthPubTktOptions, now: i64) -> AuthPubTkt {
        AuthPubTkt::with_clock(options, Arc::new(FixedClock(now))).unwrap()
    }

    #[test]
    fn test_issue_verifies() {
        let keys = Keys::new();
        let mut args = keys.args("alice");
        args.cip = Some("10.0.0.1".to_string());
        args.tokens = vec!["admin".to_string(), "ops".to_string()];
        args.udata = Some("extra".to_string());
        args.grace = Some(300);

        let raw = issue(&args, 1_000).unwrap();
        assert!(raw.starts_with("uid=alice;cip=10.0.0.1;validuntil=4600;tokens=admin,ops;"));
        assert!(raw.contains("graceperiod=4300"));

        let auth = verifier(
            AuthPubTktOptions {
                public_key: RSA_PUBLIC_KEY.to_string(),
                ..AuthPubTktOptions::default()
            },
            2_000,
        );
        let ticket = auth.raw_to_ticket(&raw).unwrap();
        assert_eq!(ticket.uid, "alice");
        assert_eq!(ticket.udata, "extra");
        assert!(auth.verify_ticket(&ticket, "10.0.0.1").is_ok());
    }

    #[test]
    fn test_issue_encrypted_and_escaped() {
        let keys = Keys::new();
        let mut args = keys.args("bob");
        args.passphrase = Some(SecretString::from("mypassphrase".to_string()));
        args.cipher_method = Some(CipherMethod::Ecb);
        args.escape = true;

        let escaped = issue(&args, 1_000).unwrap();
        let raw = query_unescape(&escaped).unwrap();
        assert!(!raw.contains("uid="));

        let auth = verifier(
            AuthPubTktOptions {
                public_key: RSA_PUBLIC_KEY.to_string(),
                cipher_passphrase: Some(SecretString::from("mypassphrase".to_string())),
                cipher_method: CipherMethod::Ecb,
                ..AuthPubTktOptions::default()
            },
            1_500,
        );
        let ticket = auth.raw_to_ticket(&raw).unwrap();
        assert_eq!(ticket.uid, "bob");
        assert!(auth.verify_ticket(&ticket, "").is_ok());
    }

    #[test]
    fn test_issue_encrypts_bauth() {
        let keys = Keys::new();
        let mut args = keys.args("carol");
        args.bauth = Some("carol:secret".to_string());
        args.bauth_key = Some(SecretString::from("AZERTYUIOPQSDFGH".to_string()));

        let raw = issue(&args, 1_000).unwrap();
        let ticket = Ticket::parse(&raw).unwrap();
        assert_ne!(ticket.bauth, "carol:secret");
        assert_eq!(
            cipher::bauth_decrypt(&ticket.bauth, "AZERTYUIOPQSDFGH").unwrap(),
            "carol:secret"
        );
    }

    #[test]
    fn test_issue_rejects_overflowing_ttl() {
        let keys = Keys::new();
        let mut args = keys.args("dave");
        args.ttl = i64::MAX;

        let err = issue(&args, 1_000).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_issue_missing_key_file() {
        let args = Args {
            private_key: "/nonexistent/priv.pem".to_string(),
            public_key: "/nonexistent/pub.pem".to_string(),
            uid: "alice".to_string(),
            ttl: 60,
            ..Args::default()
        };
        assert!(issue(&args, 0).is_err());
    }
}
