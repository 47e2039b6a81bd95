//! WS Authorizer (spec §4.F): validates a one-shot or time-bounded
//! token presented on websocket open.

use crate::error::{Error, Result};
use crate::models::{self, Token};
use crate::store::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow { principal_id: String },
    Deny,
}

/// Fetches the token, denies on absence/expiry, and — for one-off
/// tokens — marks it expired before returning Allow so a second use is
/// denied (spec S6).
pub async fn authorize(table: &dyn Table, token_id: &str, now: i64) -> Result<Decision> {
    let pk = models::keys::token_pk(token_id);
    let item = match table.get(&pk, &pk).await {
        Ok(item) => item,
        Err(Error::NoSuchItem) => return Ok(Decision::Deny),
        Err(e) => return Err(e),
    };

    let token = Token::from_item(&item).map_err(Error::Other)?;
    if token.is_expired(now) {
        return Ok(Decision::Deny);
    }

    if token.one_off {
        // TTL is a top-level column, not an attrs field, so expiring a
        // one-off token goes through `put` rather than `update_map_field`.
        let mut expired = token.clone();
        expired.ttl = now;
        table.put(expired.to_item(), Default::default()).await?;
    }

    Ok(Decision::Allow {
        principal_id: token.user_pk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{memory::MemoryTable, PutOptions};

    #[tokio::test]
    async fn absent_token_denies() {
        let table = MemoryTable::new();
        let decision = authorize(&table, "nope", 1_700_000_000).await.unwrap();
        assert_eq!(decision, Decision::Deny);
    }

    #[tokio::test]
    async fn expired_token_denies() {
        let table = MemoryTable::new();
        let token = Token::new("user#u1".to_string(), 1_600_000_000, false, 1_600_000_000);
        let token_id = token.pk.strip_prefix("token#").unwrap().to_string();
        table.put(token.to_item(), PutOptions::unique()).await.unwrap();
        let decision = authorize(&table, &token_id, 1_700_000_000).await.unwrap();
        assert_eq!(decision, Decision::Deny);
    }

    #[tokio::test]
    async fn one_off_token_is_consumed() {
        let table = MemoryTable::new();
        let token = Token::new("user#u1".to_string(), 1_800_000_000, true, 1_700_000_000);
        let token_id = token.pk.strip_prefix("token#").unwrap().to_string();
        table.put(token.to_item(), PutOptions::unique()).await.unwrap();

        let first = authorize(&table, &token_id, 1_700_000_100).await.unwrap();
        assert_eq!(
            first,
            Decision::Allow {
                principal_id: "user#u1".to_string()
            }
        );

        let second = authorize(&table, &token_id, 1_700_000_200).await.unwrap();
        assert_eq!(second, Decision::Deny);
    }
}
