//! Mugshot URLs.

use sha2::{Digest, Sha256};

use crate::config::MugshotConfig;

const GRAVATAR_SECURE: &str = "https://secure.gravatar.com/avatar/";
const GRAVATAR_PLAIN: &str = "http://www.gravatar.com/avatar/";

/// Gravatar URL for `email`.
///
/// # Examples
///
/// ```
/// use userbase::config::MugshotConfig;
/// use userbase::profile::gravatar_url;
///
/// let url = gravatar_url("Alice@Example.com ", &MugshotConfig::default());
/// assert!(url.starts_with("https://secure.gravatar.com/avatar/"));
/// assert!(url.ends_with("?s=80&d=identicon"));
/// ```
pub fn gravatar_url(email: &str, settings: &MugshotConfig) -> String {
    let hash = hex::encode(Sha256::digest(email.trim().to_lowercase().as_bytes()));
    let base = if settings.gravatar_secure {
        GRAVATAR_SECURE
    } else {
        GRAVATAR_PLAIN
    };
    format!(
        "{base}{hash}?s={}&d={}",
        settings.size,
        urlencoding::encode(&settings.default)
    )
}

/// URL to show for a user: the uploaded image, else Gravatar when enabled.
pub fn mugshot_url(uploaded: Option<&str>, email: &str, settings: &MugshotConfig) -> Option<String> {
    match uploaded.map(str::trim).filter(|s| !s.is_empty()) {
        Some(url) => Some(url.to_string()),
        None if settings.gravatar && !email.trim().is_empty() => {
            Some(gravatar_url(email, settings))
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravatar_hash_normalizes_email() {
        let settings = MugshotConfig::default();
        assert_eq!(
            gravatar_url("alice@example.com", &settings),
            gravatar_url("  ALICE@example.COM ", &settings)
        );
    }

    #[test]
    fn test_gravatar_url_shape() {
        let settings = MugshotConfig {
            gravatar_secure: false,
            default: "https://example.com/default.png".to_string(),
            size: 120,
            ..Default::default()
        };
        let url = gravatar_url("alice@example.com", &settings);
        let hash = hex::encode(Sha256::digest(b"alice@example.com"));
        assert_eq!(
            url,
            format!(
                "http://www.gravatar.com/avatar/{hash}?s=120&d=https%3A%2F%2Fexample.com%2Fdefault.png"
            )
        );
    }

    #[test]
    fn test_mugshot_url_fallbacks() {
        let settings = MugshotConfig::default();
        assert_eq!(
            mugshot_url(Some("https://cdn.example.com/a.png"), "a@example.com", &settings),
            Some("https://cdn.example.com/a.png".to_string())
        );
        assert!(mugshot_url(Some("  "), "a@example.com", &settings)
            .unwrap()
            .starts_with(GRAVATAR_SECURE));
        assert!(mugshot_url(None, "", &settings).is_none());

        let no_gravatar = MugshotConfig {
            gravatar: false,
            ..Default::default()
        };
        assert!(mugshot_url(None, "a@example.com", &no_gravatar).is_none());
    }
}
