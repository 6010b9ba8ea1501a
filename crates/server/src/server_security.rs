use anyhow::{Context as AnyhowContext, Result};
use getrandom::getrandom;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

/// Resolves `bind` and refuses non-loopback addresses unless `public` is set.
pub(crate) async fn resolve_guarded_bind_addrs(bind: &str, public: bool) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
        .await
        .with_context(|| format!("Failed to resolve bind address: {bind}"))?
        .collect();
    if addrs.is_empty() {
        anyhow::bail!("Bind address resolved to zero socket addrs: {bind}")
    }
    if addrs.iter().any(|addr| !addr.ip().is_loopback()) && !public {
        anyhow::bail!(
            "Refusing to bind to non-loopback address without --public: {bind}. Pass --public to expose the server."
        )
    }
    Ok(addrs)
}

/// `len_bytes` random bytes, hex encoded.
pub(crate) fn random_hex(len_bytes: usize) -> Result<String> {
    let mut bytes = vec![0u8; len_bytes];
    getrandom(&mut bytes).map_err(|err| anyhow::anyhow!("OS random source unavailable: {err}"))?;
    Ok(hex(&bytes))
}

pub(crate) fn new_session_token() -> Result<String> {
    random_hex(32)
}

/// Session tokens are stored only as digests.
pub(crate) fn token_digest(token: &str) -> String {
    hex(&Sha256::digest(token.as_bytes()))
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_random_and_digests_stable() {
        let a = new_session_token().unwrap();
        let b = new_session_token().unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(token_digest(&a), token_digest(&a));
        assert_ne!(token_digest(&a), a);
    }

    #[tokio::test]
    async fn bind_guard_requires_public_for_non_loopback() {
        resolve_guarded_bind_addrs("127.0.0.1:0", false).await.unwrap();
        assert!(resolve_guarded_bind_addrs("0.0.0.0:0", false).await.is_err());
        resolve_guarded_bind_addrs("0.0.0.0:0", true).await.unwrap();
    }
}
