//! Credential stamp: the request-side stage of the pipeline
//!
//! Runs last before transmission so the header always reflects the token
//! stored at send time, including right after a refresh.

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use session_auth::{BEARER_PLACEHOLDER, CredentialStore, TokenKey};
use tracing::warn;

/// Overwrite `Authorization` with the currently stored access token.
///
/// Any prior value is replaced, including the placeholder. With no usable
/// token the placeholder is sent and the server decides.
pub async fn stamp_credential(store: &dyn CredentialStore, headers: &mut HeaderMap) {
    let token = store.get(TokenKey::Access).await;
    headers.insert(AUTHORIZATION, authorization_value(token.as_ref()));
}

/// Build the `Authorization` value for an optional access token.
pub fn authorization_value(token: Option<&Secret<String>>) -> HeaderValue {
    let Some(token) = token.filter(|t| !t.expose_str().is_empty()) else {
        return HeaderValue::from_static(BEARER_PLACEHOLDER);
    };
    match HeaderValue::from_str(&format!("Bearer {}", token.expose_str())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            value
        }
        Err(_) => {
            warn!("stored access token is not a valid header value, sending placeholder");
            HeaderValue::from_static(BEARER_PLACEHOLDER)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_auth::{MemoryCredentialStore, TokenPair};

    #[tokio::test]
    async fn stamps_stored_access_token() {
        let store = MemoryCredentialStore::with_tokens("A1", "R1");
        let mut headers = HeaderMap::new();

        stamp_credential(&store, &mut headers).await;

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer A1");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn overwrites_placeholder_and_client_values() {
        let store = MemoryCredentialStore::with_tokens("A1", "R1");
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        headers.append(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));

        stamp_credential(&store, &mut headers).await;

        let values: Vec<_> = headers.get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values, vec!["Bearer A1"]);
    }

    #[tokio::test]
    async fn missing_token_sends_placeholder() {
        let store = MemoryCredentialStore::new();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));

        stamp_credential(&store, &mut headers).await;

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer");
    }

    #[tokio::test]
    async fn reflects_token_at_stamp_time() {
        let store = MemoryCredentialStore::with_tokens("A1", "R1");
        let mut first = HeaderMap::new();
        let mut second = HeaderMap::new();
        let mut third = HeaderMap::new();

        stamp_credential(&store, &mut first).await;
        stamp_credential(&store, &mut second).await;
        store.replace(TokenPair::new("A2", "R2")).await.unwrap();
        stamp_credential(&store, &mut third).await;

        assert_eq!(first.get(AUTHORIZATION), second.get(AUTHORIZATION));
        assert_eq!(third.get(AUTHORIZATION).unwrap(), "Bearer A2");
    }

    #[test]
    fn empty_token_is_treated_as_absent() {
        let token = Secret::from("");
        assert_eq!(authorization_value(Some(&token)), "Bearer");
    }

    #[test]
    fn unencodable_token_falls_back_to_placeholder() {
        let token = Secret::from("bad\ntoken");
        assert_eq!(authorization_value(Some(&token)), "Bearer");
    }
}
