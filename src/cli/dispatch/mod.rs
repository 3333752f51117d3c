use crate::{
    cli::actions::{server, sign, Action},
    pubtkt::CipherMethod,
};
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;

/// Turn parsed arguments into the [`Action`] to run.
///
/// # Errors
///
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("server", sub_m)) => Ok(Action::Server(server_args(sub_m)?)),
        Some(("sign", sub_m)) => Ok(Action::Sign(sign_args(sub_m)?)),
        _ => Err(anyhow!("unknown subcommand")),
    }
}

fn server_args(matches: &ArgMatches) -> Result<server::Args> {
    let string = |id: &str| matches.get_one::<String>(id).cloned();

    Ok(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        config: string("config"),
        public_key: string("public-key"),
        cookie_name: string("cookie-name"),
        sources: many(matches, "source"),
        passphrase: secret(matches, "passphrase"),
        cipher_method: cipher_method(matches)?,
        check_ip: matches.get_flag("check-ip"),
        check_x_forwarded_ip: matches.get_flag("check-x-forwarded-ip"),
        tokens: many(matches, "token"),
        any_token: matches.get_flag("any-token"),
        require_tls: matches.get_flag("require-tls"),
        login_url: string("login-url"),
        timeout_url: string("timeout-url"),
        post_timeout_url: string("post-timeout-url"),
        unauth_url: string("unauth-url"),
        refresh_url: string("refresh-url"),
        back_arg_name: string("back-arg-name"),
        fake_basic_auth: matches.get_flag("fake-basic-auth"),
        passthru_basic_auth: matches.get_flag("passthru-basic-auth"),
        passthru_basic_key: secret(matches, "passthru-basic-key"),
        show_error_details: matches.get_flag("show-error-details"),
        escalate: matches.get_flag("escalate"),
    })
}

fn sign_args(matches: &ArgMatches) -> Result<sign::Args> {
    let required = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .with_context(|| format!("missing required argument: --{id}"))
    };

    let ttl = matches.get_one::<i64>("ttl").copied().unwrap_or(3600);
    if ttl <= 0 {
        return Err(anyhow!("--ttl must be positive"));
    }

    Ok(sign::Args {
        private_key: required("private-key")?,
        public_key: required("public-key")?,
        uid: required("uid")?,
        cip: matches.get_one::<String>("cip").cloned(),
        ttl,
        grace: matches.get_one::<i64>("grace").copied(),
        tokens: many(matches, "token"),
        udata: matches.get_one::<String>("udata").cloned(),
        bauth: matches.get_one::<String>("bauth").cloned(),
        bauth_key: secret(matches, "bauth-key"),
        passphrase: secret(matches, "passphrase"),
        cipher_method: cipher_method(matches)?,
        escape: matches.get_flag("escape"),
    })
}

fn many(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| {
            values
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn secret(matches: &ArgMatches, id: &str) -> Option<SecretString> {
    matches
        .get_one::<String>(id)
        .filter(|v| !v.is_empty())
        .map(|v| SecretString::from(v.clone()))
}

fn cipher_method(matches: &ArgMatches) -> Result<Option<CipherMethod>> {
    matches
        .get_one::<String>("cipher-method")
        .map(|method| method.parse::<CipherMethod>())
        .transpose()
        .map_err(|e| anyhow!("invalid --cipher-method: {e}"))
}
