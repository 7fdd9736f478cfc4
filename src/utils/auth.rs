//! Authentication utilities for API requests
//!
//! Attaches the bearer credential and any gateway identification headers.

/// Add bearer authentication and identification headers to a request.
///
/// # Arguments
/// * `request` - The reqwest RequestBuilder to add headers to
/// * `api_key` - The credential supplied by the user
/// * `identity` - Provider-specific header pairs such as `HTTP-Referer`
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    api_key: &str,
    identity: &[(&'static str, String)],
) -> reqwest::RequestBuilder {
    let request = request.header("Authorization", format!("Bearer {api_key}"));
    identity
        .iter()
        .fold(request, |request, (name, value)| request.header(*name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header<'a>(request: &'a reqwest::Request, name: &str) -> Option<&'a str> {
        request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn bearer_header_is_always_set() {
        let client = reqwest::Client::new();
        let request = add_auth_headers(client.post("https://example.com"), "test-key", &[])
            .build()
            .unwrap();

        assert_eq!(header(&request, "Authorization"), Some("Bearer test-key"));
        assert_eq!(header(&request, "X-Title"), None);
    }

    #[test]
    fn identity_headers_are_forwarded() {
        let client = reqwest::Client::new();
        let identity = vec![
            ("HTTP-Referer", "https://example.org".to_string()),
            ("X-Title", "Chat".to_string()),
        ];
        let request = add_auth_headers(client.post("https://example.com"), "k", &identity)
            .build()
            .unwrap();

        assert_eq!(header(&request, "HTTP-Referer"), Some("https://example.org"));
        assert_eq!(header(&request, "X-Title"), Some("Chat"));
    }
}
