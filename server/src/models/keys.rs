//! Persisted composite-string codecs (spec §6.5). These formats are
//! observed by the GSI, by change-stream consumers, and by the
//! websocket protocol, so the split is kept as two typed fields at the
//! call site but the exact wire string is preserved on the way in and
//! out of the store.

use anyhow::{anyhow, Result};

/// Builds a `UMS = "<owner-PK>#<status>"` string (spec §6.5). `owner_pk`
/// itself contains one `#` (e.g. `user#<ksuid>`), so the full string has
/// three `#`-separated segments.
pub fn ums(owner_pk: &str, status: i64) -> String {
    format!("{owner_pk}#{status}")
}

/// Splits a UMS string back into `(owner_pk, status)`.
pub fn parse_ums(s: &str) -> Result<(String, i64)> {
    let (owner_pk, status) = s
        .rsplit_once('#')
        .ok_or_else(|| anyhow!("malformed UMS {s:?}: missing '#'"))?;
    let status: i64 = status
        .parse()
        .map_err(|_| anyhow!("malformed UMS {s:?}: non-numeric status"))?;
    Ok((owner_pk.to_string(), status))
}

/// Builds a `bot#<name>#<kind>` PK (spec §3 I6). `name`/`kind` must not
/// themselves contain `#`.
pub fn bot_pk(name: &str, kind: &str) -> Result<String> {
    if name.contains('#') || kind.contains('#') {
        return Err(anyhow!("bot name/kind must not contain '#'"));
    }
    Ok(format!("bot#{name}#{kind}"))
}

pub fn parse_bot_pk(s: &str) -> Result<(String, String)> {
    let rest = s
        .strip_prefix("bot#")
        .ok_or_else(|| anyhow!("malformed bot PK {s:?}: missing 'bot#' prefix"))?;
    let (name, kind) = rest
        .split_once('#')
        .ok_or_else(|| anyhow!("malformed bot PK {s:?}: missing kind segment"))?;
    Ok((name.to_string(), kind.to_string()))
}

pub fn user_pk(ksuid: &str) -> String {
    format!("user#{ksuid}")
}

pub fn email_pk(addr: &str) -> String {
    format!("email#{addr}")
}

pub fn tel_pk(number: &str) -> String {
    format!("tel#{number}")
}

pub fn linked_account_pk(chat_id: &str) -> String {
    format!("tgacc#{chat_id}")
}

pub fn message_pk(ksuid: &str) -> String {
    format!("msg#{ksuid}")
}

pub fn invite_pk(bot_pk: &str, otp: &str) -> String {
    format!("inv#{bot_pk}#{otp}")
}

pub fn token_pk(ksuid: &str) -> String {
    format!("token#{ksuid}")
}

pub fn login_request_pk(ksuid: &str) -> String {
    format!("inreq#{ksuid}")
}

pub fn wsconn_sk(conn_id: &str) -> String {
    format!("wsconn#{conn_id}")
}

pub fn subs_sk(conn_id: &str) -> String {
    format!("subs#{conn_id}")
}

pub fn message_file_sk(kind: &str) -> String {
    format!("file#{kind}")
}

pub fn folder_sk(id: &str) -> String {
    format!("fldr#{id}")
}

pub fn user_perm_sk(folder_pk: &str, folder_sk: &str, value: &str) -> String {
    format!("perm#{folder_pk}#{folder_sk}#{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ums_round_trips() {
        let s = ums("user#abc", 5);
        assert_eq!(s, "user#abc#5");
        assert_eq!(parse_ums(&s).unwrap(), ("user#abc".to_string(), 5));
    }

    #[test]
    fn bot_pk_rejects_hash_in_name() {
        assert!(bot_pk("foo#bar", "tg").is_err());
    }

    #[test]
    fn bot_pk_round_trips() {
        let pk = bot_pk("foobot", "tg").unwrap();
        assert_eq!(pk, "bot#foobot#tg");
        assert_eq!(
            parse_bot_pk(&pk).unwrap(),
            ("foobot".to_string(), "tg".to_string())
        );
    }
}
