//! Utility functions for identifiers and record hashing

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32m with the given prefix
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// sha256 over the previous link and the record contents.
pub fn chain_digest(prev_hash: Option<&str>, contents: &[u8]) -> String {
    let mut buf = Vec::with_capacity(contents.len() + 64);
    if let Some(prev) = prev_hash {
        buf.extend_from_slice(prev.as_bytes());
    }
    buf.extend_from_slice(contents);
    sha256::digest(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_previous_link() {
        let a = chain_digest(None, b"entry");
        let b = chain_digest(Some(&a), b"entry");
        assert_ne!(a, b);
        assert_eq!(a, chain_digest(None, b"entry"));
    }
}
