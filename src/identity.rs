// Resolve the account that will own migrated data.
// Ref: https://cloud.google.com/identity-platform/docs/reference/rest/v1/accounts

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, RwLock};
use url::Url;

use crate::{MigrationError, OwnerId};

pub const DEFAULT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com";

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Called once per run, before anything is written.
    async fn resolve_owner_id(&self) -> Result<OwnerId, MigrationError>;
}

#[async_trait]
impl<T: IdentityResolver + ?Sized> IdentityResolver for Box<T> {
    async fn resolve_owner_id(&self) -> Result<OwnerId, MigrationError> {
        (**self).resolve_owner_id().await
    }
}

/// Bearer token shared between a sign-in and the store that needs it.
#[derive(Clone, Debug, Default)]
pub struct TokenCell(Arc<RwLock<Option<String>>>);

impl TokenCell {
    pub fn set(&self, token: String) {
        *self.0.write().expect("token cell poisoned") = Some(token);
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().expect("token cell poisoned").clone()
    }
}

/// An owner id the operator already knows.
#[derive(Debug, Clone)]
pub struct StaticOwner(pub OwnerId);

#[async_trait]
impl IdentityResolver for StaticOwner {
    async fn resolve_owner_id(&self) -> Result<OwnerId, MigrationError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn endpoint_url(endpoint: &Url, resource: &str) -> Result<Url, MigrationError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| MigrationError::Config(format!("invalid identity endpoint {}", endpoint)))?
        .pop_if_empty()
        .push("v1")
        .extend(resource.split('/'));
    Ok(url)
}

fn default_endpoint() -> Url {
    // DEFAULT_ENDPOINT is a valid absolute URL
    Url::parse(DEFAULT_ENDPOINT).expect("default endpoint")
}

fn error_code(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        // Messages look like "TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account..."
        Ok(ErrorBody { error }) => error
            .message
            .split(|c: char| c == ' ' || c == ':')
            .next()
            .unwrap_or_default()
            .to_owned(),
        Err(_) => body.trim().to_owned(),
    }
}

fn classify_sign_in_error(email: &str, body: &str) -> MigrationError {
    let code = error_code(body);
    match code.as_str() {
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => MigrationError::IdentityNotFound(email.to_owned()),
        _ => MigrationError::AuthenticationFailed(code),
    }
}

/// Sign in with email and password, like the web client does.
///
/// The ID token obtained is published to [`PasswordSignIn::token`] so the
/// store can act as the signed-in user.
pub struct PasswordSignIn {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    email: String,
    password: String,
    token: TokenCell,
}

impl PasswordSignIn {
    pub fn new(http: reqwest::Client, api_key: String, email: String, password: String) -> Self {
        PasswordSignIn {
            http,
            endpoint: default_endpoint(),
            api_key,
            email,
            password,
            token: TokenCell::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn token(&self) -> TokenCell {
        self.token.clone()
    }
}

#[async_trait]
impl IdentityResolver for PasswordSignIn {
    async fn resolve_owner_id(&self) -> Result<OwnerId, MigrationError> {
        let mut url = endpoint_url(&self.endpoint, "accounts:signInWithPassword")?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        tracing::info!("Signing in as {}", self.email);
        let response = self
            .http
            .post(url)
            .json(&json!({
                "email": self.email,
                "password": self.password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_sign_in_error(&self.email, &body));
        }
        let body: SignInResponse = response.json().await?;
        self.token.set(body.id_token);
        OwnerId::new(body.local_id)
    }
}

/// Find an account by email with admin credentials.
pub struct EmailLookup {
    http: reqwest::Client,
    endpoint: Url,
    project_id: String,
    email: String,
    access_token: String,
}

impl EmailLookup {
    pub fn new(
        http: reqwest::Client,
        project_id: String,
        email: String,
        access_token: String,
    ) -> Self {
        EmailLookup {
            http,
            endpoint: default_endpoint(),
            project_id,
            email,
            access_token,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }
}

fn first_local_id(email: &str, response: LookupResponse) -> Result<OwnerId, MigrationError> {
    match response.users.into_iter().next() {
        Some(user) => OwnerId::new(user.local_id),
        None => Err(MigrationError::IdentityNotFound(email.to_owned())),
    }
}

#[async_trait]
impl IdentityResolver for EmailLookup {
    async fn resolve_owner_id(&self) -> Result<OwnerId, MigrationError> {
        let url = endpoint_url(
            &self.endpoint,
            &format!("projects/{}/accounts:lookup", self.project_id),
        )?;
        tracing::info!("Looking up account {}", self.email);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "email": [self.email] }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                404 => MigrationError::IdentityNotFound(self.email.clone()),
                _ => MigrationError::AuthenticationFailed(format!(
                    "lookup returned {}: {}",
                    status,
                    error_code(&body)
                )),
            });
        }
        first_local_id(&self.email, response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_classify_sign_in_error() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_NOT_FOUND","errors":[]}}"#;
        assert!(matches!(
            classify_sign_in_error("demo@byki.com", body),
            MigrationError::IdentityNotFound(email) if email == "demo@byki.com"
        ));

        let body = r#"{"error":{"code":400,"message":"INVALID_LOGIN_CREDENTIALS"}}"#;
        assert!(matches!(
            classify_sign_in_error("demo@byki.com", body),
            MigrationError::AuthenticationFailed(code) if code == "INVALID_LOGIN_CREDENTIALS"
        ));

        let body = r#"{"error":{"code":400,"message":"TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"}}"#;
        assert!(matches!(
            classify_sign_in_error("demo@byki.com", body),
            MigrationError::AuthenticationFailed(code) if code == "TOO_MANY_ATTEMPTS_TRY_LATER"
        ));
    }

    #[test]
    fn test_lookup_response() {
        let body = r#"{"kind":"identitytoolkit#GetAccountInfoResponse","users":[{"localId":"uid-123","email":"demo@byki.com"}]}"#;
        let owner = first_local_id("demo@byki.com", serde_json::from_str(body).unwrap()).unwrap();
        assert_eq!(owner.as_str(), "uid-123");

        let body = r#"{"kind":"identitytoolkit#GetAccountInfoResponse"}"#;
        assert!(matches!(
            first_local_id("demo@byki.com", serde_json::from_str(body).unwrap()),
            Err(MigrationError::IdentityNotFound(_))
        ));
    }

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url(&default_endpoint(), "projects/p/accounts:lookup").unwrap();
        assert_eq!(
            url.as_str(),
            "https://identitytoolkit.googleapis.com/v1/projects/p/accounts:lookup"
        );
    }

    #[test(tokio::test)]
    async fn test_static_owner() {
        let resolver: Box<dyn IdentityResolver> =
            Box::new(StaticOwner(OwnerId::new("u1").unwrap()));
        assert_eq!(resolver.resolve_owner_id().await.unwrap().as_str(), "u1");
    }

    #[test]
    fn test_token_cell_is_shared() {
        let cell = TokenCell::default();
        let other = cell.clone();
        assert_eq!(other.get(), None);
        cell.set("abc".into());
        assert_eq!(other.get().as_deref(), Some("abc"));
    }
}
