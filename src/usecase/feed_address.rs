use reqwest::Url;

use crate::usecase::error::ClientError;

pub const DEFAULT_NOTIFICATIONS_PATH: &str = "/appointments/notifications";

/// Builds the realtime feed address from the HTTP API base.
///
/// The scheme is swapped for its websocket twin, the base path is kept, the
/// notification path is appended and the session token, when there is one,
/// travels as the `token` query parameter.
pub fn feed_url(
    base_url: Option<&str>,
    notifications_path: &str,
    access_token: Option<&str>,
) -> Result<Url, ClientError> {
    let base = base_url
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ClientError::Configuration("API base URL is not set".to_string()))?;

    let mut url = Url::parse(base)
        .map_err(|e| ClientError::Configuration(format!("invalid API base URL {base:?}: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ClientError::Configuration(format!(
                "unsupported API base URL scheme {other:?}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Configuration(format!("cannot use {scheme} for {base:?}")))?;

    let endpoint = match notifications_path.trim() {
        "" => DEFAULT_NOTIFICATIONS_PATH.to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{p}"),
    };
    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base_path}{endpoint}"));

    url.set_query(None);
    url.set_fragment(None);
    // Both only fail for URLs that cannot carry credentials; nothing to clear then.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_encrypted_schemes() {
        let url = feed_url(Some("http://localhost:3000"), DEFAULT_NOTIFICATIONS_PATH, None).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3000/appointments/notifications");

        let url = feed_url(Some("https://api.salon.test"), DEFAULT_NOTIFICATIONS_PATH, None).unwrap();
        assert_eq!(url.as_str(), "wss://api.salon.test/appointments/notifications");
    }

    #[test]
    fn test_base_path_and_relative_endpoint() {
        let url = feed_url(Some("https://api.salon.test/v2/"), "events", None).unwrap();
        assert_eq!(url.as_str(), "wss://api.salon.test/v2/events");

        let url = feed_url(Some("http://10.0.0.5:8080/"), "", None).unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.5:8080/appointments/notifications");
    }

    #[test]
    fn test_token_query_parameter() {
        let url = feed_url(
            Some("http://localhost:3000?debug=1"),
            DEFAULT_NOTIFICATIONS_PATH,
            Some("a b&c"),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:3000/appointments/notifications?token=a+b%26c"
        );

        let url = feed_url(Some("http://localhost:3000"), DEFAULT_NOTIFICATIONS_PATH, Some("")).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_missing_or_malformed_base() {
        for base in [None, Some(""), Some("   "), Some("not a url"), Some("ftp://files.test")] {
            let result = feed_url(base, DEFAULT_NOTIFICATIONS_PATH, None);
            assert!(
                matches!(result, Err(ClientError::Configuration(_))),
                "base {base:?}"
            );
        }
    }
}
