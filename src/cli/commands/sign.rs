use clap::{Arg, ArgAction, Command};

pub fn command() -> Command {
    Command::new("sign")
        .about("Issue a signed ticket")
        .arg(
            Arg::new("private-key")
                .long("private-key")
                .help("Path to the PEM private key")
                .env("AUTHPUBTKT_PRIVATE_KEY")
                .required(true),
        )
        .arg(
            Arg::new("public-key")
                .long("public-key")
                .help("Path to the matching PEM public key")
                .env("AUTHPUBTKT_PUBLIC_KEY")
                .required(true),
        )
        .arg(Arg::new("uid").long("uid").help("User id").required(true))
        .arg(Arg::new("cip").long("cip").help("Client IP bound to the ticket"))
        .arg(
            Arg::new("ttl")
                .long("ttl")
                .help("Seconds the ticket stays valid")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("grace")
                .long("grace")
                .help("Seconds before expiry after which a refresh is required")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .help("Token granted by the ticket")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(Arg::new("udata").long("udata").help("Opaque user data"))
        .arg(
            Arg::new("bauth")
                .long("bauth")
                .help("Basic auth credentials carried by the ticket"),
        )
        .arg(
            Arg::new("bauth-key")
                .long("bauth-key")
                .help("16 byte key encrypting the bauth field")
                .env("AUTHPUBTKT_PASSTHRU_BASIC_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("passphrase")
                .long("passphrase")
                .help("Encrypt the whole ticket with this passphrase")
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
        .arg(
            Arg::new("escape")
                .long("escape")
                .help("Print the ticket query escaped, ready for a cookie")
                .action(ArgAction::SetTrue),
        )
}
