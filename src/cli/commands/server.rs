use clap::{Arg, ArgAction, Command};

pub fn command() -> Command {
    let command = Command::new("server")
        .about("Serve a demo application protected by ticket validation")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("AUTHPUBTKT_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON file with validation options, flags override its values")
                .env("AUTHPUBTKT_CONFIG"),
        )
        .arg(
            Arg::new("public-key")
                .long("public-key")
                .help("Path to the PEM public key used to verify ticket signatures")
                .env("AUTHPUBTKT_PUBLIC_KEY"),
        );

    let command = with_source_args(command);
    let command = with_check_args(command);
    let command = with_redirect_args(command);
    with_passthru_args(command)
}

fn with_source_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("cookie-name")
                .long("cookie-name")
                .help("Cookie holding the ticket (default: pubtkt)")
                .env("AUTHPUBTKT_COOKIE_NAME"),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .help("Ticket source in lookup order, `cookie` or a header name")
                .env("AUTHPUBTKT_SOURCES")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("passphrase")
                .long("passphrase")
                .help("Passphrase for encrypted tickets")
                .env("AUTHPUBTKT_PASSPHRASE")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("cipher-method")
                .long("cipher-method")
                .help("Block mode for encrypted tickets")
                .env("AUTHPUBTKT_CIPHER_METHOD")
                .value_parser(["ecb", "cbc"]),
        )
}

fn with_check_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("check-ip")
                .long("check-ip")
                .help("Reject tickets whose cip differs from the client address")
                .env("AUTHPUBTKT_CHECK_IP")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-x-forwarded-ip")
                .long("check-x-forwarded-ip")
                .help("Take the client address from X-Forwarded-For when present")
                .env("AUTHPUBTKT_CHECK_X_FORWARDED_IP")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .help("Token required in the ticket")
                .env("AUTHPUBTKT_TOKENS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("any-token")
                .long("any-token")
                .help("Accept a ticket carrying any one of the required tokens")
                .env("AUTHPUBTKT_ANY_TOKEN")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("require-tls")
                .long("require-tls")
                .help("Refuse tickets not received over a TLS connection")
                .env("AUTHPUBTKT_REQUIRE_TLS")
                .action(ArgAction::SetTrue),
        )
}

fn with_redirect_args(command: Command) -> Command {
    let urls = [
        ("login-url", "AUTHPUBTKT_LOGIN_URL", "Redirect for missing or invalid tickets"),
        ("timeout-url", "AUTHPUBTKT_TIMEOUT_URL", "Redirect for expired tickets"),
        (
            "post-timeout-url",
            "AUTHPUBTKT_POST_TIMEOUT_URL",
            "Redirect for expired tickets on POST",
        ),
        ("unauth-url", "AUTHPUBTKT_UNAUTH_URL", "Redirect for tickets lacking tokens"),
        (
            "refresh-url",
            "AUTHPUBTKT_REFRESH_URL",
            "Redirect for tickets past their grace period",
        ),
    ];

    let command = urls.into_iter().fold(command, |command, (name, env, help)| {
        command.arg(Arg::new(name).long(name).help(help).env(env))
    });

    command
        .arg(
            Arg::new("back-arg-name")
                .long("back-arg-name")
                .help("Query parameter carrying the original URL (default: back)")
                .env("AUTHPUBTKT_BACK_ARG_NAME"),
        )
        .arg(
            Arg::new("show-error-details")
                .long("show-error-details")
                .help("Put the rejection reason in the response body")
                .env("AUTHPUBTKT_SHOW_ERROR_DETAILS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("escalate")
                .long("escalate")
                .help("Fail the request with a server error on unclassified rejections")
                .env("AUTHPUBTKT_ESCALATE")
                .action(ArgAction::SetTrue),
        )
}

fn with_passthru_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("fake-basic-auth")
                .long("fake-basic-auth")
                .help("Forward an Authorization header built from the ticket uid")
                .env("AUTHPUBTKT_FAKE_BASIC_AUTH")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("passthru-basic-auth")
                .long("passthru-basic-auth")
                .help("Forward the ticket bauth field as the Authorization header")
                .env("AUTHPUBTKT_PASSTHRU_BASIC_AUTH")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("passthru-basic-key")
                .long("passthru-basic-key")
                .help("16 byte key decrypting the bauth field")
                .env("AUTHPUBTKT_PASSTHRU_BASIC_KEY")
                .hide_env_values(true),
        )
}
