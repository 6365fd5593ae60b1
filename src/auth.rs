use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use google_gmail1::oauth2;
use thiserror::Error;
use tracing::{info, warn};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    read_application_secret,
};

use crate::transport::MailTransport;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.labels",
    "https://mail.google.com/",
];

pub type GmailAuthenticator =
    oauth2::authenticator::Authenticator<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read client secret {}", path.display())]
    Secret {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build authenticator")]
    Flow(#[source] std::io::Error),
    #[error("consent or token exchange failed")]
    Token(#[source] yup_oauth2::Error),
    #[error("failed to set up HTTPS client")]
    Tls(#[source] std::io::Error),
}

/// Produces an authorized mailbox session on demand.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MailTransport>, AuthError>;
}

/// Logs the consent URL and tries to open it in a browser.
pub struct BrowserDelegate;

impl InstalledFlowDelegate for BrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            info!("Grant mailbox access at: {}", url);
            if let Err(e) = open::that(url) {
                warn!("Could not open browser: {}", e);
            }
            if need_code {
                // Only the HTTP redirect flow is used, which never asks for a pasted code.
                Err("authorization code entry is not supported".to_string())
            } else {
                Ok(String::new())
            }
        })
    }
}

pub struct Authenticator;

impl Authenticator {
    pub async fn load_secret<P: AsRef<Path>>(path: P) -> Result<ApplicationSecret, AuthError> {
        let path = path.as_ref();
        read_application_secret(path)
            .await
            .map_err(|source| AuthError::Secret {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Runs the installed-app consent flow and waits for a token covering [`SCOPES`].
    ///
    /// Tokens are kept in memory only.
    pub async fn authenticate(secret: ApplicationSecret) -> Result<GmailAuthenticator, AuthError> {
        let auth = InstalledFlowAuthenticator::builder(
            secret,
            InstalledFlowReturnMethod::HTTPRedirect,
        )
        .flow_delegate(Box::new(BrowserDelegate))
        .build()
        .await
        .map_err(AuthError::Flow)?;

        auth.token(SCOPES).await.map_err(AuthError::Token)?;
        info!("Authentication successful");

        Ok(auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_secret_file_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let err = Authenticator::load_secret(&path).await.unwrap_err();

        assert!(matches!(err, AuthError::Secret { path: p, .. } if p == path));
    }

    #[tokio::test]
    async fn installed_secret_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed":{"client_id":"id.apps.googleusercontent.com","client_secret":"s","auth_uri":"https://accounts.google.com/o/oauth2/auth","token_uri":"https://oauth2.googleapis.com/token","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();

        let secret = Authenticator::load_secret(&path).await.unwrap();

        assert_eq!(secret.client_id, "id.apps.googleusercontent.com");
    }
}
