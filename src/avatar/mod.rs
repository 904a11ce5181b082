use sha2::{Digest, Sha256};

const PLACEHOLDER_HASH: &str = "00000000000000000000000000000000";

/// Hash-based avatar for a commenter. Without an email the service's generic
/// placeholder is forced.
pub fn avatar_url(email: Option<&str>, base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let email = email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());

    match email {
        Some(email) => {
            let digest = Sha256::digest(email.as_bytes());
            format!("{base_url}/{digest:x}?d=identicon&s=48")
        }
        None => format!("{base_url}/{PLACEHOLDER_HASH}?d=mp&f=y"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.gravatar.com/avatar";

    #[test]
    fn email_is_normalized_before_hashing() {
        let a = avatar_url(Some("  Coach@Club.example "), BASE);
        let b = avatar_url(Some("coach@club.example"), BASE);
        assert_eq!(a, b);
        assert!(a.starts_with("https://www.gravatar.com/avatar/"));
        assert!(a.ends_with("?d=identicon&s=48"));

        let hash = a
            .trim_start_matches("https://www.gravatar.com/avatar/")
            .trim_end_matches("?d=identicon&s=48");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn missing_email_gets_placeholder() {
        let expected = format!("{BASE}/{PLACEHOLDER_HASH}?d=mp&f=y");
        assert_eq!(avatar_url(None, BASE), expected);
        assert_eq!(avatar_url(Some("   "), &format!("{BASE}/")), expected);
    }
}
