//! The ticket record and its canonical text form.

use std::fmt;

use super::error::{Error, Result};

const SIG_FIELD: &str = "sig=";
const SIG_SEPARATOR: &str = ";sig=";

/// Identity assertion carried by a pubtkt cookie or header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ticket {
    pub uid: String,
    pub cip: String,
    /// Expiry, unix seconds.
    pub valid_until: i64,
    /// Soft expiry, unix seconds.
    pub grace_period: Option<i64>,
    pub tokens: Vec<String>,
    pub udata: String,
    pub bauth: String,
    pub sig: String,
    /// Exact signed body, everything before `;sig=`.
    pub raw_data: String,
}

impl Ticket {
    /// Canonical body: the signed part of the ticket.
    #[must_use]
    pub fn data_string(&self) -> String {
        let mut fields: Vec<String> = Vec::with_capacity(7);

        if !self.uid.is_empty() {
            fields.push(format!("uid={}", self.uid));
        }
        if !self.cip.is_empty() {
            fields.push(format!("cip={}", self.cip));
        }
        if self.valid_until != 0 {
            fields.push(format!("validuntil={}", self.valid_until));
        }
        if !self.tokens.is_empty() {
            fields.push(format!("tokens={}", self.tokens.join(",")));
        }
        if !self.udata.is_empty() {
            fields.push(format!("udata={}", self.udata));
        }
        if let Some(grace_period) = self.grace_period.filter(|g| *g != 0) {
            fields.push(format!("graceperiod={grace_period}"));
        }
        if !self.bauth.is_empty() {
            fields.push(format!("bauth={}", self.bauth));
        }

        fields.join(";")
    }

    /// Parse the plaintext wire form `body;sig=signature`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the signature field or the uid is
    /// missing, or if a numeric field is not an integer.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        let (body, sig) = if let Some(sig) = raw.strip_prefix(SIG_FIELD) {
            ("", sig)
        } else {
            raw.rsplit_once(SIG_SEPARATOR)
                .ok_or_else(|| Error::Malformed("missing sig field".to_string()))?
        };

        let mut ticket = Self {
            sig: sig.to_string(),
            raw_data: body.to_string(),
            ..Self::default()
        };

        for field in body.split(';').filter(|f| !f.is_empty()) {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };

            match key {
                "uid" => ticket.uid = value.to_string(),
                "cip" => ticket.cip = value.to_string(),
                "validuntil" => ticket.valid_until = parse_timestamp(key, value)?,
                "graceperiod" => {
                    ticket.grace_period = Some(parse_timestamp(key, value)?).filter(|g| *g != 0);
                }
                "tokens" => {
                    ticket.tokens = value
                        .split(',')
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "udata" => ticket.udata = value.to_string(),
                "bauth" => ticket.bauth = value.to_string(),
                _ => {}
            }
        }

        if ticket.uid.is_empty() {
            return Err(Error::Malformed("missing uid field".to_string()));
        }

        Ok(ticket)
    }
}

fn parse_timestamp(key: &str, value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| Error::Malformed(format!("{key} is not a unix timestamp: {value}")))
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SIG_SEPARATOR}{}", self.data_string(), self.sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            uid: "myuser".to_string(),
            cip: "127.0.0.1".to_string(),
            valid_until: 1,
            tokens: vec!["token1".to_string(), "token2".to_string()],
            ..Ticket::default()
        }
    }

    #[test]
    fn parse_plain_ticket() {
        let parsed =
            Ticket::parse("uid=myuser;validuntil=1;tokens=token1,token2;sig=mysignature").unwrap();

        assert_eq!(
            parsed,
            Ticket {
                uid: "myuser".to_string(),
                valid_until: 1,
                tokens: vec!["token1".to_string(), "token2".to_string()],
                sig: "mysignature".to_string(),
                raw_data: "uid=myuser;validuntil=1;tokens=token1,token2".to_string(),
                ..Ticket::default()
            }
        );
    }

    #[test]
    fn parse_every_field() {
        let raw = "uid=u;cip=10.0.0.1;validuntil=20;tokens=a,b,a;udata=x=y;graceperiod=10;bauth=QmFzaWM=;sig=c2ln==";
        let parsed = Ticket::parse(raw).unwrap();

        assert_eq!(parsed.uid, "u");
        assert_eq!(parsed.cip, "10.0.0.1");
        assert_eq!(parsed.valid_until, 20);
        assert_eq!(parsed.grace_period, Some(10));
        assert_eq!(parsed.tokens, vec!["a", "b", "a"]);
        assert_eq!(parsed.udata, "x=y");
        assert_eq!(parsed.bauth, "QmFzaWM=");
        assert_eq!(parsed.sig, "c2ln==");
        assert_eq!(parsed.data_string(), parsed.raw_data);
    }

    #[test]
    fn parse_ignores_unknown_keys_but_keeps_them_signed() {
        let parsed = Ticket::parse("uid=u;validuntil=5;future=1;sig=s").unwrap();
        assert_eq!(parsed.uid, "u");
        assert_eq!(parsed.raw_data, "uid=u;validuntil=5;future=1");
    }

    #[test]
    fn parse_requires_sig() {
        assert!(matches!(
            Ticket::parse("uid=myuser;validuntil=1"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn parse_requires_uid() {
        assert!(matches!(
            Ticket::parse("validuntil=1;sig=abc"),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(Ticket::parse("sig=abc"), Err(Error::Malformed(_))));
    }

    #[test]
    fn parse_rejects_non_numeric_validuntil() {
        assert!(matches!(
            Ticket::parse("uid=u;validuntil=tomorrow;sig=abc"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn data_string_skips_empty_fields() {
        assert_eq!(
            ticket().data_string(),
            "uid=myuser;cip=127.0.0.1;validuntil=1;tokens=token1,token2"
        );

        let bare = Ticket {
            uid: "u".to_string(),
            grace_period: Some(0),
            ..Ticket::default()
        };
        assert_eq!(bare.data_string(), "uid=u");
    }

    #[test]
    fn data_string_field_order() {
        let full = Ticket {
            udata: "d".to_string(),
            grace_period: Some(2),
            bauth: "b".to_string(),
            ..ticket()
        };
        assert_eq!(
            full.data_string(),
            "uid=myuser;cip=127.0.0.1;validuntil=1;tokens=token1,token2;udata=d;graceperiod=2;bauth=b"
        );
    }

    #[test]
    fn display_appends_signature() {
        let signed = Ticket {
            sig: "abc=".to_string(),
            ..ticket()
        };
        let rendered = signed.to_string();
        assert_eq!(
            rendered,
            "uid=myuser;cip=127.0.0.1;validuntil=1;tokens=token1,token2;sig=abc="
        );

        let parsed = Ticket::parse(&rendered).unwrap();
        assert_eq!(parsed.raw_data, signed.data_string());
        assert_eq!(parsed.sig, "abc=");
    }
}
