mod server;
mod sign;

use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("authpubtkt")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(server::command())
        .subcommand(sign::command())
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("AUTHPUBTKT_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "authpubtkt");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_server_args() {
        temp_env::with_vars_unset(
            ["AUTHPUBTKT_PORT", "AUTHPUBTKT_SOURCES", "AUTHPUBTKT_TOKENS"],
            || {
                let matches = new().get_matches_from(vec![
                    "authpubtkt",
                    "server",
                    "--port",
                    "9090",
                    "--public-key",
                    "/etc/pubtkt/pub.pem",
                    "--source",
                    "x-authpubtkt",
                    "--source",
                    "cookie",
                    "--token",
                    "admin",
                    "--check-ip",
                    "--login-url",
                    "https://login.example.com",
                ]);

                let (name, sub) = matches.subcommand().unwrap();
                assert_eq!(name, "server");
                assert_eq!(sub.get_one::<u16>("port").copied(), Some(9090));
                assert_eq!(
                    sub.get_one::<String>("public-key").map(String::as_str),
                    Some("/etc/pubtkt/pub.pem")
                );
                assert_eq!(
                    sub.get_many::<String>("source")
                        .unwrap()
                        .map(String::as_str)
                        .collect::<Vec<_>>(),
                    vec!["x-authpubtkt", "cookie"]
                );
                assert_eq!(
                    sub.get_many::<String>("token")
                        .unwrap()
                        .map(String::as_str)
                        .collect::<Vec<_>>(),
                    vec!["admin"]
                );
                assert!(sub.get_flag("check-ip"));
                assert!(!sub.get_flag("require-tls"));
            },
        );
    }

    #[test]
    fn test_server_env() {
        temp_env::with_vars(
            [
                ("AUTHPUBTKT_PORT", Some("443")),
                ("AUTHPUBTKT_PUBLIC_KEY", Some("/keys/pub.pem")),
                ("AUTHPUBTKT_COOKIE_NAME", Some("auth_pubtkt")),
                ("AUTHPUBTKT_REQUIRE_TLS", Some("true")),
                ("AUTHPUBTKT_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["authpubtkt", "server"]);
                let sub = matches.subcommand_matches("server").unwrap();

                assert_eq!(sub.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    sub.get_one::<String>("public-key").map(String::as_str),
                    Some("/keys/pub.pem")
                );
                assert_eq!(
                    sub.get_one::<String>("cookie-name").map(String::as_str),
                    Some("auth_pubtkt")
                );
                assert!(sub.get_flag("require-tls"));
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_sign_args() {
        temp_env::with_vars_unset(["AUTHPUBTKT_PASSPHRASE"], || {
            let matches = new().get_matches_from(vec![
                "authpubtkt",
                "sign",
                "--private-key",
                "priv.pem",
                "--public-key",
                "pub.pem",
                "--uid",
                "alice",
                "--ttl",
                "600",
                "--token",
                "a",
                "--token",
                "b",
            ]);
            let sub = matches.subcommand_matches("sign").unwrap();

            assert_eq!(
                sub.get_one::<String>("uid").map(String::as_str),
                Some("alice")
            );
            assert_eq!(sub.get_one::<i64>("ttl").copied(), Some(600));
            assert_eq!(sub.get_one::<i64>("grace"), None);
            assert_eq!(sub.get_many::<String>("token").unwrap().count(), 2);
        });
    }

    #[test]
    fn test_sign_requires_uid() {
        let result = new().try_get_matches_from(vec![
            "authpubtkt",
            "sign",
            "--private-key",
            "priv.pem",
            "--public-key",
            "pub.pem",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("AUTHPUBTKT_LOG_LEVEL", Some(level)),
                    ("AUTHPUBTKT_PUBLIC_KEY", Some("pub.pem")),
                ],
                || {
                    let matches = new().get_matches_from(vec!["authpubtkt", "server"]);
                    assert_eq!(
                        matches.get_one::<u8>("verbosity").copied(),
                        Some(index as u8)
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("AUTHPUBTKT_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "authpubtkt".to_string(),
                    "server".to_string(),
                    "--public-key".to_string(),
                    "pub.pem".to_string(),
                ];

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(index as u8)
                );
            });
        }
    }
}
