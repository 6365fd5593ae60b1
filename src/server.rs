use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::MailboxConnector;
use crate::config::{Config, ResponderConfig};
use crate::responder::{Responder, ResponderHandle};

pub const LOGIN_OK: &str = "Successfully logged in to the Automated Gmail Responder";
pub const ALREADY_RUNNING: &str = "Automated Gmail Responder is already running";
pub const LOGIN_IN_PROGRESS: &str = "A login is already in progress";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginOutcome {
    Started,
    AlreadyRunning,
    InProgress,
}

pub struct AppState {
    connector: Box<dyn MailboxConnector>,
    responder_config: ResponderConfig,
    consent_timeout: Duration,
    /// Held for the whole login, so at most one consent flow runs.
    login: Mutex<()>,
    responder: Mutex<Option<ResponderHandle>>,
}

impl AppState {
    pub fn new(
        connector: Box<dyn MailboxConnector>,
        responder_config: ResponderConfig,
        consent_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            responder_config,
            consent_timeout,
            login: Mutex::new(()),
            responder: Mutex::new(None),
        }
    }

    /// Authenticates and arms the responder unless one is already running.
    ///
    /// The responder slot is only locked briefly, never across the consent
    /// flow, so status checks and shutdown are not blocked by a pending login.
    async fn login(&self) -> Result<LoginOutcome> {
        let Ok(_login) = self.login.try_lock() else {
            info!("Login requested while another login is in progress");
            return Ok(LoginOutcome::InProgress);
        };

        if let Some(handle) = self.responder.lock().await.as_ref().filter(|h| h.is_running()) {
            info!(state = ?handle.state(), "Login requested while responder is running");
            return Ok(LoginOutcome::AlreadyRunning);
        }

        let transport = tokio::time::timeout(self.consent_timeout, self.connector.connect())
            .await
            .map_err(|_| anyhow!("Authentication timed out after {:?}", self.consent_timeout))?
            .context("Authentication failed")?;

        let mut responder = Responder::new(transport, self.responder_config.clone());
        if let Err(e) = responder.prepare().await {
            // Retried at the start of every cycle.
            error!("{:#}", anyhow::Error::from(e));
        }
        *self.responder.lock().await = Some(responder.start());

        Ok(LoginOutcome::Started)
    }

    pub async fn shutdown(&self) {
        if let Some(handle) = self.responder.lock().await.take() {
            handle.stop().await;
        }
    }
}

pub async fn handle(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => match state.login().await {
            Ok(LoginOutcome::Started) => text(StatusCode::OK, LOGIN_OK),
            Ok(LoginOutcome::AlreadyRunning) => text(StatusCode::OK, ALREADY_RUNNING),
            Ok(LoginOutcome::InProgress) => text(StatusCode::CONFLICT, LOGIN_IN_PROGRESS),
            Err(e) => {
                error!("{:#}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        },
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

pub async fn serve(config: &Config, connector: Box<dyn MailboxConnector>) -> Result<()> {
    let state = Arc::new(AppState::new(
        connector,
        config.responder.clone(),
        Duration::from_secs(config.server.consent_timeout_secs),
    ));

    let service_state = state.clone();
    let make_svc = make_service_fn(move |_conn| {
        let state = service_state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req))) }
    });

    let server = Server::try_bind(&config.server.bind)
        .with_context(|| format!("Failed to bind {}", config.server.bind))?
        .serve(make_svc);
    info!("App is running on http://{}", config.server.bind);

    server
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("Server error")?;

    info!("Shutting down");
    state.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::transport::MailTransport;
    use crate::transport::fake::FakeTransport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeConnector {
        transport: Arc<FakeTransport>,
        connects: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl MailboxConnector for FakeConnector {
        async fn connect(&self) -> Result<Arc<dyn MailTransport>, AuthError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuthError::Flow(std::io::Error::other("consent denied")));
            }
            Ok(self.transport.clone())
        }
    }

    /// Never finishes the consent flow.
    struct PendingConnector;

    #[async_trait]
    impl MailboxConnector for PendingConnector {
        async fn connect(&self) -> Result<Arc<dyn MailTransport>, AuthError> {
            std::future::pending().await
        }
    }

    const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

    fn state(fail: bool) -> (Arc<AppState>, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let connector = FakeConnector {
            transport: Arc::new(FakeTransport::new()),
            connects: connects.clone(),
            fail,
        };
        let state = AppState::new(Box::new(connector), ResponderConfig::default(), CONSENT_TIMEOUT);
        (Arc::new(state), connects)
    }

    async fn get(state: &Arc<AppState>, path: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let res = handle(state.clone(), req).await.unwrap();
        let status = res.status();
        let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn login_arms_responder_once() {
        let (state, connects) = state(false);

        assert_eq!(get(&state, "/").await, (StatusCode::OK, LOGIN_OK.to_string()));
        assert_eq!(get(&state, "/").await, (StatusCode::OK, ALREADY_RUNNING.to_string()));
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        state.shutdown().await;
    }

    #[tokio::test]
    async fn failed_authentication_is_a_plain_500() {
        let (state, _) = state(true);

        let (status, body) = get(&state, "/").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Internal Server Error");
        assert!(state.responder.lock().await.is_none());
    }

    #[tokio::test]
    async fn other_routes_are_not_found() {
        let (state, connects) = state(false);

        assert_eq!(get(&state, "/status").await.0, StatusCode::NOT_FOUND);
        let post = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let res = handle(state.clone(), post).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn login_after_shutdown_starts_again() {
        let (state, connects) = state(false);

        get(&state, "/").await;
        state.shutdown().await;
        assert_eq!(get(&state, "/").await.1, LOGIN_OK);
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pending_login_does_not_block_other_requests_or_shutdown() {
        let state = Arc::new(AppState::new(
            Box::new(PendingConnector),
            ResponderConfig::default(),
            CONSENT_TIMEOUT,
        ));

        let first = tokio::spawn({
            let state = state.clone();
            async move { get(&state, "/").await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let second = tokio::time::timeout(Duration::from_secs(1), get(&state, "/"))
            .await
            .expect("second login must not wait for the first");
        assert_eq!(second, (StatusCode::CONFLICT, LOGIN_IN_PROGRESS.to_string()));

        tokio::time::timeout(Duration::from_secs(1), state.shutdown())
            .await
            .expect("shutdown must not wait for a pending login");

        let (status, _) = first.await.unwrap();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.responder.lock().await.is_none());
    }
}
