use crate::{
    cli::actions::read_file,
    pubtkt::{AuthPubTktLayer, AuthPubTktOptions, CipherMethod, TokenPolicy},
    server,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Debug, Default)]
pub struct Args {
    pub port: u16,
    pub config: Option<String>,
    pub public_key: Option<String>,
    pub cookie_name: Option<String>,
    pub sources: Vec<String>,
    pub passphrase: Option<SecretString>,
    pub cipher_method: Option<CipherMethod>,
    pub check_ip: bool,
    pub check_x_forwarded_ip: bool,
    pub tokens: Vec<String>,
    pub any_token: bool,
    pub require_tls: bool,
    pub login_url: Option<String>,
    pub timeout_url: Option<String>,
    pub post_timeout_url: Option<String>,
    pub unauth_url: Option<String>,
    pub refresh_url: Option<String>,
    pub back_arg_name: Option<String>,
    pub fake_basic_auth: bool,
    pub passthru_basic_auth: bool,
    pub passthru_basic_key: Option<SecretString>,
    pub show_error_details: bool,
    pub escalate: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the options or keys are invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let options = load_options(&args)?;
    log_startup_args(args.port, &options);

    let mut layer = AuthPubTktLayer::new(options).context("invalid ticket options")?;
    if args.show_error_details {
        layer = layer.show_error_details();
    }
    if args.escalate {
        layer = layer.escalate_on_error();
    }

    server::new(args.port, layer).await
}

/// Options from the config file, if any, with command line values on top.
///
/// # Errors
///
/// Returns an error if the config or key file cannot be read or parsed.
pub fn load_options(args: &Args) -> Result<AuthPubTktOptions> {
    let mut options = match &args.config {
        Some(path) => serde_json::from_str(&read_file(path)?)
            .with_context(|| format!("invalid config file {path}"))?,
        None => AuthPubTktOptions::default(),
    };

    if let Some(path) = &args.public_key {
        options.public_key = read_file(path)?;
    }

    apply(args, &mut options);
    Ok(options)
}

fn apply(args: &Args, options: &mut AuthPubTktOptions) {
    let copy_secret = |s: &SecretString| SecretString::from(s.expose_secret().to_string());

    if let Some(name) = &args.cookie_name {
        options.cookie_name.clone_from(name);
    }
    if !args.sources.is_empty() {
        options.sources.clone_from(&args.sources);
    }
    if let Some(passphrase) = &args.passphrase {
        options.cipher_passphrase = Some(copy_secret(passphrase));
    }
    if let Some(method) = args.cipher_method {
        options.cipher_method = method;
    }
    if !args.tokens.is_empty() {
        options.required_tokens.clone_from(&args.tokens);
    }
    if args.any_token {
        options.token_policy = TokenPolicy::AnyOf;
    }
    if let Some(key) = &args.passthru_basic_key {
        options.passthru_basic_key = Some(copy_secret(key));
    }

    options.check_ip |= args.check_ip;
    options.check_x_forwarded_ip |= args.check_x_forwarded_ip;
    options.require_tls |= args.require_tls;
    options.fake_basic_auth |= args.fake_basic_auth;
    options.passthru_basic_auth |= args.passthru_basic_auth;

    let urls = [
        (&args.login_url, &mut options.login_url),
        (&args.timeout_url, &mut options.timeout_url),
        (&args.post_timeout_url, &mut options.post_timeout_url),
        (&args.unauth_url, &mut options.unauth_url),
        (&args.refresh_url, &mut options.refresh_url),
        (&args.back_arg_name, &mut options.back_arg_name),
    ];
    for (arg, option) in urls {
        if let Some(value) = arg {
            option.clone_from(value);
        }
    }
}

fn log_startup_args(port: u16, options: &AuthPubTktOptions) {
    let or_none = |value: &str| {
        if value.is_empty() {
            "none".to_string()
        } else {
            value.to_string()
        }
    };

    let entries = [
        ("listen", format!("tcp:{port}")),
        ("sources", options.sources.join(",")),
        ("cookie_name", options.cookie_name.clone()),
        (
            "encrypted",
            options.cipher_passphrase().is_some().to_string(),
        ),
        ("cipher_method", options.cipher_method.to_string()),
        ("check_ip", options.check_ip.to_string()),
        ("required_tokens", or_none(&options.required_tokens.join(","))),
        ("require_tls", options.require_tls.to_string()),
        ("login_url", or_none(&options.login_url)),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "authpubtkt {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
