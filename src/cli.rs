// Command-line pieces shared by the binaries.

use clap::{Args, ValueEnum};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::{
    identity::{self, EmailLookup, IdentityResolver, PasswordSignIn},
    store::{firestore, Credential, FirestoreClient},
    MigrationError, OwnerId, DEFAULT_PROJECT_ID, DEMO_EMAIL,
};

/// `info` unless `RUST_LOG` says otherwise. Logs go to stderr so stdout only
/// carries the report.
pub fn init_logging() {
    let filter = format!("info,{}", std::env::var("RUST_LOG").unwrap_or_default());
    let enable_color = std::env::var("NO_COLOR").is_err();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_ansi(enable_color)
        .with_writer(std::io::stderr)
        .init();
}

/// How the binaries authenticate against the project.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Admin access token; owner found by email lookup.
    Admin,
    /// Email and password sign-in; the store acts as that user.
    SignIn,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    #[arg(long, env = "BYKI_PROJECT_ID", default_value = DEFAULT_PROJECT_ID)]
    pub project_id: String,

    #[arg(long, env = "BYKI_TRANSPORT", value_enum, default_value_t = Transport::SignIn)]
    pub transport: Transport,

    #[arg(long, env = "BYKI_EMAIL", default_value = DEMO_EMAIL)]
    pub email: String,

    #[arg(long, env = "BYKI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Web API key of the project (sign-in transport)
    #[arg(long, env = "BYKI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OAuth2 access token (admin transport)
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = "FIRESTORE_ENDPOINT", default_value = firestore::DEFAULT_ENDPOINT)]
    pub firestore_endpoint: Url,

    #[arg(long, env = "IDENTITY_ENDPOINT", default_value = identity::DEFAULT_ENDPOINT)]
    pub identity_endpoint: Url,

    /// Documents per list request
    #[arg(long, default_value_t = 300)]
    pub page_size: usize,

    /// HTTP request timeout
    #[arg(long, default_value = "30s")]
    pub timeout: humantime::Duration,

    #[arg(long, default_value = "byki-migrate")]
    pub user_agent: String,
}

/// A store and the identity resolver that goes with it.
pub struct Connection {
    pub store: FirestoreClient,
    pub identity: Box<dyn IdentityResolver>,
    pub transport: Transport,
}

impl Connection {
    /// Owner for tools that may be handed one on the command line.
    ///
    /// With the sign-in transport the store only works once signed in, and
    /// only for the signed-in user's own data, so a requested owner must
    /// match the account.
    pub async fn owner(&self, requested: Option<&str>) -> Result<OwnerId, MigrationError> {
        match (self.transport, requested) {
            (_, None) => self.identity.resolve_owner_id().await,
            (Transport::Admin, Some(id)) => OwnerId::new(id),
            (Transport::SignIn, Some(id)) => {
                let owner = OwnerId::new(id)?;
                let signed_in = self.identity.resolve_owner_id().await?;
                if signed_in != owner {
                    return Err(MigrationError::AuthenticationFailed(format!(
                        "signed in as {}, which cannot act for {}",
                        signed_in, owner
                    )));
                }
                Ok(owner)
            }
        }
    }
}

fn required(value: &Option<String>, flag: &str, transport: &str) -> Result<String, MigrationError> {
    value.clone().filter(|v| !v.is_empty()).ok_or_else(|| {
        MigrationError::Config(format!(
            "{} is required for the {} transport",
            flag, transport
        ))
    })
}

impl ConnectionArgs {
    pub fn connect(&self) -> Result<Connection, MigrationError> {
        let http = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(*self.timeout)
            .build()?;
        let (credential, identity): (Credential, Box<dyn IdentityResolver>) =
            match self.transport {
                Transport::Admin => {
                    let token = required(&self.access_token, "--access-token", "admin")?;
                    let lookup = EmailLookup::new(
                        http.clone(),
                        self.project_id.clone(),
                        self.email.clone(),
                        token.clone(),
                    )
                    .with_endpoint(self.identity_endpoint.clone());
                    (Credential::AccessToken(token), Box::new(lookup))
                }
                Transport::SignIn => {
                    let api_key = required(&self.api_key, "--api-key", "sign-in")?;
                    let password = required(&self.password, "--password", "sign-in")?;
                    let sign_in =
                        PasswordSignIn::new(http.clone(), api_key, self.email.clone(), password)
                            .with_endpoint(self.identity_endpoint.clone());
                    (Credential::SignedIn(sign_in.token()), Box::new(sign_in))
                }
            };
        let store = FirestoreClient::new(http, &self.project_id, credential)
            .with_endpoint(self.firestore_endpoint.clone())
            .with_page_size(self.page_size);
        Ok(Connection {
            store,
            identity,
            transport: self.transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        connection: ConnectionArgs,
    }

    #[test]
    fn test_admin_requires_token() {
        let cli = TestCli::parse_from(["test", "--transport", "admin", "--access-token", ""]);
        assert!(matches!(
            cli.connection.connect(),
            Err(MigrationError::Config(_))
        ));
    }

    #[test]
    fn test_sign_in_builds() {
        let cli = TestCli::parse_from([
            "test",
            "--transport",
            "sign-in",
            "--api-key",
            "key",
            "--password",
            "secret",
            "--email",
            "demo@byki.com",
        ]);
        assert_eq!(cli.connection.project_id, DEFAULT_PROJECT_ID);
        assert_eq!(cli.connection.page_size, 300);
        assert!(cli.connection.connect().is_ok());
    }
}
