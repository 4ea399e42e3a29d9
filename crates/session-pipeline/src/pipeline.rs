//! Authenticated request pipeline
//!
//! Every call runs the same named stages:
//!
//! 1. `stamp`    : attach the stored access token (see `stamp.rs`)
//! 2. `transmit` : send through the transport
//! 3. `recover`  : inspect the outcome; on the first 401 of a call, refresh
//!    and hand the call back for one more send. A failed refresh has already
//!    expired the session by the time `recover` sees it.
//!
//! The per-call `Call` context carries the attempt. A call in its `Retry`
//! attempt can never enter the refresh path again, so a server that keeps
//! rejecting the refreshed token costs exactly one extra send.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use session_auth::{CredentialStore, TokenKey, TokenRefresher};
use tracing::{debug, warn};
use transport::{Outcome, RequestDescriptor, Transport};

use crate::expiry::{SessionEvents, SessionExpiryHandler};
use crate::refresh::{RefreshCoordinator, RefreshMode};
use crate::stamp::{authorization_value, stamp_credential};

/// Which send of a call this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Retry,
}

/// Per-call context: the caller's request plus the retry marker.
///
/// The request is never mutated; each send stamps a fresh copy.
#[derive(Debug, Clone)]
pub struct Call {
    request: RequestDescriptor,
    attempt: Attempt,
}

impl Call {
    pub fn new(request: RequestDescriptor) -> Self {
        Self {
            request,
            attempt: Attempt::Initial,
        }
    }

    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    fn can_recover(&self) -> bool {
        self.attempt == Attempt::Initial
    }

    fn into_retry(self) -> Self {
        Self {
            attempt: Attempt::Retry,
            ..self
        }
    }
}

/// What `recover` decided.
enum Step {
    Finish(Outcome),
    Resend(Call),
}

/// Credential-attaching, self-refreshing HTTP pipeline.
pub struct AuthPipeline {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    refresh: RefreshCoordinator,
    expiry: Arc<SessionExpiryHandler>,
}

impl AuthPipeline {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn TokenRefresher>,
        events: SessionEvents,
        mode: RefreshMode,
    ) -> Self {
        let expiry = Arc::new(SessionExpiryHandler::new(store.clone(), events.clone()));
        Self {
            refresh: RefreshCoordinator::new(refresher, expiry.clone(), events, mode),
            expiry,
            store,
            transport,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    pub fn expiry_handler(&self) -> &SessionExpiryHandler {
        &self.expiry
    }

    /// Send `request` with the current credential, recovering once from an
    /// expired session.
    ///
    /// Returns the outcome of the last send. If the refresh fails the session
    /// is expired and the caller gets the original 401 failure.
    pub async fn execute(&self, request: RequestDescriptor) -> Outcome {
        let mut call = Call::new(request);
        loop {
            let outcome = self.transmit(&call).await;
            match self.recover(call, outcome).await {
                Step::Finish(outcome) => return outcome,
                Step::Resend(next) => call = next,
            }
        }
    }

    async fn transmit(&self, call: &Call) -> Outcome {
        let mut request = call.request.clone();
        stamp_credential(self.store.as_ref(), &mut request.headers).await;
        self.transport.send(request).await
    }

    async fn recover(&self, call: Call, outcome: Outcome) -> Step {
        let failure = match outcome {
            Ok(response) => return Step::Finish(Ok(response)),
            Err(f) => f,
        };
        if !failure.is_unauthorized() || !call.can_recover() {
            return Step::Finish(Err(failure));
        }

        let call = call.into_retry();
        if self.rotated_since(&failure.request).await {
            debug!(url = %call.request.url, "token rotated while request was in flight, resending");
            metrics::counter!("session_retries_total").increment(1);
            return Step::Resend(call);
        }
        debug!(method = %call.request.method, url = %call.request.url, "access token rejected, refreshing session");

        match self.refresh.refresh().await {
            Ok(()) => {
                metrics::counter!("session_retries_total").increment(1);
                Step::Resend(call)
            }
            Err(e) => {
                warn!(error = %e, url = %call.request.url, "session refresh failed, returning original 401");
                Step::Finish(Err(failure))
            }
        }
    }

    /// Whether the store now holds a different token than the one `sent`
    /// carried, meaning another call already refreshed the session.
    async fn rotated_since(&self, sent: &RequestDescriptor) -> bool {
        let Some(token) = self
            .store
            .get(TokenKey::Access)
            .await
            .filter(|t| !t.expose_str().is_empty())
        else {
            return false;
        };
        let current = authorization_value(Some(&token));
        sent.headers
            .get(AUTHORIZATION)
            .is_none_or(|v| v.as_bytes() != current.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::SessionEvent;
    use reqwest::StatusCode;
    use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
    use session_auth::{BoxFuture, MemoryCredentialStore, TokenKey, TokenPair};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use transport::{Failure, FailureKind, Response};

    type Script = Box<dyn Fn(&str) -> std::result::Result<StatusCode, FailureKind> + Send + Sync>;

    /// Transport that records the Authorization header of every send and
    /// answers according to `script`.
    struct ScriptedTransport {
        script: Script,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(
            script: impl Fn(&str) -> std::result::Result<StatusCode, FailureKind> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                sent: Mutex::new(Vec::new()),
            })
        }

        /// 200 for `Bearer <token>`, 401 for anything else.
        fn accepting(token: &'static str) -> Arc<Self> {
            Self::new(move |auth| {
                if auth == format!("Bearer {token}") {
                    Ok(StatusCode::OK)
                } else {
                    Ok(StatusCode::UNAUTHORIZED)
                }
            })
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: RequestDescriptor) -> Pin<Box<dyn Future<Output = Outcome> + Send + '_>> {
            let auth = request
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            self.sent.lock().unwrap().push(auth.clone());
            let answer = (self.script)(&auth);
            Box::pin(async move {
                tokio::task::yield_now().await;
                match answer {
                    Ok(status) => {
                        let response = Response {
                            status,
                            headers: HeaderMap::new(),
                            body: bytes::Bytes::from(format!("seen {auth}")),
                        };
                        if status.is_success() {
                            Ok(response)
                        } else {
                            Err(Failure::from_response(request, response))
                        }
                    }
                    Err(kind) => Err(Failure {
                        kind,
                        request,
                        response: None,
                    }),
                }
            })
        }
    }

    /// Refresher that installs `next` into the store (or fails when `None`)
    /// after `delay`, counting calls.
    struct ScriptedRefresher {
        store: Arc<dyn CredentialStore>,
        next: Option<(&'static str, &'static str)>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedRefresher {
        fn new(
            store: Arc<dyn CredentialStore>,
            next: Option<(&'static str, &'static str)>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                store,
                next,
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenRefresher for ScriptedRefresher {
        fn refresh(&self) -> BoxFuture<'_, session_auth::Result<()>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                match self.next {
                    Some((access, refresh)) => self.store.replace(TokenPair::new(access, refresh)).await,
                    None => Err(session_auth::Error::InvalidCredentials(
                        "refresh token expired".into(),
                    )),
                }
            })
        }
    }

    struct Harness {
        store: Arc<MemoryCredentialStore>,
        transport: Arc<ScriptedTransport>,
        refresher: Arc<ScriptedRefresher>,
        events: tokio::sync::broadcast::Receiver<SessionEvent>,
        pipeline: AuthPipeline,
    }

    fn harness(
        transport: Arc<ScriptedTransport>,
        next: Option<(&'static str, &'static str)>,
        mode: RefreshMode,
    ) -> Harness {
        let store = Arc::new(MemoryCredentialStore::with_tokens("A1", "R1"));
        let refresher = ScriptedRefresher::new(store.clone(), next, Duration::from_millis(20));
        let events = SessionEvents::new();
        let rx = events.subscribe();
        let pipeline = AuthPipeline::new(
            store.clone(),
            transport.clone(),
            refresher.clone(),
            events,
            mode,
        );
        Harness {
            store,
            transport,
            refresher,
            events: rx,
            pipeline,
        }
    }

    async fn stored(store: &MemoryCredentialStore) -> (Option<String>, Option<String>) {
        (
            store.get(TokenKey::Access).await.map(|s| s.expose().clone()),
            store.get(TokenKey::Refresh).await.map(|s| s.expose().clone()),
        )
    }

    fn api(path: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("http://api.test{path}"))
    }

    #[tokio::test]
    async fn valid_token_is_stamped_and_sent_once() {
        let mut h = harness(ScriptedTransport::accepting("A1"), None, RefreshMode::SingleFlight);

        let response = h.pipeline.execute(api("/posts")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(h.transport.sent(), vec!["Bearer A1"]);
        assert_eq!(h.refresher.calls(), 0);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn placeholder_header_is_replaced_before_send() {
        let h = harness(ScriptedTransport::accepting("A1"), None, RefreshMode::SingleFlight);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));

        h.pipeline
            .execute(api("/posts").with_headers(headers))
            .await
            .unwrap();

        assert_eq!(h.transport.sent(), vec!["Bearer A1"]);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_retried_once() {
        let mut h = harness(
            ScriptedTransport::accepting("A2"),
            Some(("A2", "R2")),
            RefreshMode::SingleFlight,
        );

        let response = h.pipeline.execute(api("/posts")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"seen Bearer A2");
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.transport.sent(), vec!["Bearer A1", "Bearer A2"]);
        assert_eq!(stored(&h.store).await, (Some("A2".into()), Some("R2".into())));
        assert_eq!(h.events.try_recv().unwrap(), SessionEvent::Refreshed);
    }

    #[tokio::test]
    async fn retry_that_is_still_unauthorized_is_returned_without_second_refresh() {
        let h = harness(
            ScriptedTransport::new(|_| Ok(StatusCode::UNAUTHORIZED)),
            Some(("A2", "R2")),
            RefreshMode::SingleFlight,
        );

        let failure = h.pipeline.execute(api("/posts")).await.unwrap_err();

        assert!(failure.is_unauthorized());
        assert_eq!(failure.request.headers.get(AUTHORIZATION).unwrap(), "Bearer A2");
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.transport.sent(), vec!["Bearer A1", "Bearer A2"]);
        // Still holds the refreshed pair; a retry 401 does not expire the session
        assert_eq!(stored(&h.store).await, (Some("A2".into()), Some("R2".into())));
    }

    #[tokio::test]
    async fn retry_failure_of_another_kind_is_returned_as_is() {
        let h = harness(
            ScriptedTransport::new(|auth| {
                if auth == "Bearer A1" {
                    Ok(StatusCode::UNAUTHORIZED)
                } else {
                    Ok(StatusCode::SERVICE_UNAVAILABLE)
                }
            }),
            Some(("A2", "R2")),
            RefreshMode::SingleFlight,
        );

        let failure = h.pipeline.execute(api("/posts")).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::Status(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(h.refresher.calls(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_expires_session_and_surfaces_original_401() {
        let mut h = harness(
            ScriptedTransport::new(|_| Ok(StatusCode::UNAUTHORIZED)),
            None,
            RefreshMode::SingleFlight,
        );

        let failure = h.pipeline.execute(api("/posts")).await.unwrap_err();

        // The caller sees the first send's failure, untouched
        let mut expected_request = api("/posts");
        expected_request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer A1"));
        assert_eq!(failure.kind, FailureKind::Unauthorized);
        assert_eq!(failure.request, expected_request);
        assert_eq!(&failure.response.as_ref().unwrap().body[..], b"seen Bearer A1");

        assert_eq!(h.transport.sent(), vec!["Bearer A1"]);
        assert_eq!(stored(&h.store).await, (None, None));
        assert_eq!(h.events.try_recv().unwrap(), SessionEvent::Expired);
        assert!(h.events.try_recv().is_err(), "navigation must be requested exactly once");
    }

    #[tokio::test]
    async fn non_401_failures_never_refresh() {
        for kind in [
            Ok(StatusCode::INTERNAL_SERVER_ERROR),
            Ok(StatusCode::FORBIDDEN),
            Err(FailureKind::Timeout(Duration::from_millis(5000))),
            Err(FailureKind::Network("connection reset".into())),
        ] {
            let mut h = harness(
                ScriptedTransport::new(move |_| kind.clone()),
                Some(("A2", "R2")),
                RefreshMode::SingleFlight,
            );

            let failure = h.pipeline.execute(api("/posts")).await.unwrap_err();

            assert!(!failure.is_unauthorized());
            assert_eq!(h.refresher.calls(), 0, "{failure} must not refresh");
            assert_eq!(h.transport.sent().len(), 1);
            assert_eq!(stored(&h.store).await, (Some("A1".into()), Some("R1".into())));
            assert!(h.events.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn missing_session_sends_placeholder_and_expires_on_401() {
        let transport = ScriptedTransport::accepting("A1");
        let store = Arc::new(MemoryCredentialStore::new());
        let refresher = ScriptedRefresher::new(store.clone(), None, Duration::from_millis(1));
        let events = SessionEvents::new();
        let mut rx = events.subscribe();
        let pipeline = AuthPipeline::new(
            store,
            transport.clone(),
            refresher.clone(),
            events,
            RefreshMode::SingleFlight,
        );

        let failure = pipeline.execute(api("/posts")).await.unwrap_err();

        assert!(failure.is_unauthorized());
        assert_eq!(transport.sent(), vec!["Bearer"]);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Expired);
    }

    #[tokio::test]
    async fn header_tracks_the_stored_token_between_calls() {
        let h = harness(
            ScriptedTransport::new(|_| Ok(StatusCode::OK)),
            None,
            RefreshMode::SingleFlight,
        );

        h.pipeline.execute(api("/a")).await.unwrap();
        h.pipeline.execute(api("/a")).await.unwrap();
        h.store.replace(TokenPair::new("A9", "R9")).await.unwrap();
        h.pipeline.execute(api("/a")).await.unwrap();

        assert_eq!(h.transport.sent(), vec!["Bearer A1", "Bearer A1", "Bearer A9"]);
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh() {
        let h = harness(
            ScriptedTransport::accepting("A2"),
            Some(("A2", "R2")),
            RefreshMode::SingleFlight,
        );

        let outcomes = futures_util::future::join_all(
            (0..5).map(|i| h.pipeline.execute(api(&format!("/posts/{i}")))),
        )
        .await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(h.refresher.calls(), 1);
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 10, "each request sends at most twice");
        assert_eq!(sent.iter().filter(|s| *s == "Bearer A2").count(), 5);
    }

    #[tokio::test]
    async fn late_401_for_rotated_token_resends_without_refresh() {
        let h = harness(ScriptedTransport::accepting("A1"), Some(("A2", "R2")), RefreshMode::SingleFlight);

        // Sent with a token that has since been replaced by A1
        let mut sent = api("/posts");
        sent.headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer A0"));
        let rejected = Response {
            status: StatusCode::UNAUTHORIZED,
            headers: HeaderMap::new(),
            body: bytes::Bytes::from_static(b"expired"),
        };
        let failure = Failure::from_response(sent, rejected);

        let step = h.pipeline.recover(Call::new(api("/posts")), Err(failure)).await;

        match step {
            Step::Resend(call) => assert_eq!(call.attempt(), Attempt::Retry),
            Step::Finish(outcome) => panic!("expected a resend, got {outcome:?}"),
        }
        assert_eq!(h.refresher.calls(), 0);
        assert_eq!(stored(&h.store).await, (Some("A1".into()), Some("R1".into())));
    }

    #[tokio::test]
    async fn late_401_after_expiry_still_refreshes() {
        let h = harness(ScriptedTransport::accepting("A2"), None, RefreshMode::SingleFlight);
        h.store.clear().await.unwrap();

        let mut sent = api("/posts");
        sent.headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer A0"));
        let rejected = Response {
            status: StatusCode::UNAUTHORIZED,
            headers: HeaderMap::new(),
            body: bytes::Bytes::new(),
        };
        let failure = Failure::from_response(sent, rejected);

        let step = h.pipeline.recover(Call::new(api("/posts")), Err(failure)).await;

        assert!(matches!(step, Step::Finish(Err(_))));
        assert_eq!(h.refresher.calls(), 1, "an empty store is not a rotation");
    }

    #[tokio::test]
    async fn independent_mode_refreshes_per_request() {
        let h = harness(
            ScriptedTransport::accepting("A2"),
            Some(("A2", "R2")),
            RefreshMode::Independent,
        );

        let outcomes = futures_util::future::join_all(
            (0..5).map(|i| h.pipeline.execute(api(&format!("/posts/{i}")))),
        )
        .await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(h.refresher.calls(), 5);
        assert_eq!(h.transport.sent().len(), 10);
    }

    #[tokio::test]
    async fn concurrent_401s_with_failing_refresh_expire_once() {
        let mut h = harness(
            ScriptedTransport::new(|_| Ok(StatusCode::UNAUTHORIZED)),
            None,
            RefreshMode::SingleFlight,
        );

        let outcomes = futures_util::future::join_all(
            (0..3).map(|_| h.pipeline.execute(api("/posts"))),
        )
        .await;

        assert_eq!(h.refresher.calls(), 1);
        for outcome in outcomes {
            let failure = outcome.unwrap_err();
            assert_eq!(failure.request.headers.get(AUTHORIZATION).unwrap(), "Bearer A1");
        }
        // One failed flight ends the session once for all of its waiters
        assert_eq!(h.events.try_recv().unwrap(), SessionEvent::Expired);
        assert!(h.events.try_recv().is_err());
        assert_eq!(stored(&h.store).await, (None, None));
    }

    #[test]
    fn call_starts_initial_and_moves_to_retry() {
        let call = Call::new(api("/x"));
        assert_eq!(call.attempt(), Attempt::Initial);
        assert!(call.can_recover());

        let retry = call.into_retry();
        assert_eq!(retry.attempt(), Attempt::Retry);
        assert!(!retry.can_recover());
        assert_eq!(retry.request().url, "http://api.test/x");
    }

    #[test]
    fn request_body_is_kept_across_attempts() {
        let call = Call::new(
            RequestDescriptor::new(reqwest::Method::POST, "http://api.test/posts").with_body("{}"),
        );
        let retry = call.into_retry();
        assert_eq!(retry.request().body.as_deref(), Some(&b"{}"[..]));
    }

    /// API + refresh endpoint on one server. `/posts` accepts only the
    /// current access token; `/auth/refresh` rotates R1 into (A2, R2) once.
    async fn start_api(refresh_hits: Arc<AtomicUsize>) -> String {
        use axum::response::IntoResponse;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new()
                .route(
                    "/posts",
                    axum::routing::get(|headers: axum::http::HeaderMap| async move {
                        match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                            Some("Bearer A2") => (StatusCode::OK, "[]").into_response(),
                            _ => (StatusCode::UNAUTHORIZED, "expired").into_response(),
                        }
                    }),
                )
                .route(
                    "/auth/refresh",
                    axum::routing::post(move |axum::Json(body): axum::Json<serde_json::Value>| {
                        let hits = refresh_hits.clone();
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            if body["refreshToken"] == "R1" {
                                axum::Json(serde_json::json!({
                                    "accessToken": "A2",
                                    "refreshToken": "R2",
                                }))
                                .into_response()
                            } else {
                                (StatusCode::UNAUTHORIZED, "refresh token expired").into_response()
                            }
                        }
                    }),
                );
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn http_pipeline(base: &str, store: Arc<MemoryCredentialStore>) -> AuthPipeline {
        let client = reqwest::Client::new();
        let transport = Arc::new(transport::HttpTransport::new(
            client.clone(),
            Duration::from_millis(5000),
        ));
        let refresher = Arc::new(session_auth::HttpTokenRefresher::new(
            client,
            format!("{base}/auth/refresh"),
            Duration::from_millis(5000),
            store.clone(),
        ));
        AuthPipeline::new(
            store,
            transport,
            refresher,
            SessionEvents::new(),
            RefreshMode::SingleFlight,
        )
    }

    #[tokio::test]
    async fn end_to_end_refresh_over_http() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = start_api(hits.clone()).await;
        let store = Arc::new(MemoryCredentialStore::with_tokens("A1", "R1"));
        let pipeline = http_pipeline(&base, store.clone());

        let response = pipeline
            .execute(RequestDescriptor::get(format!("{base}/posts")))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"[]");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(stored(&store).await, (Some("A2".into()), Some("R2".into())));
    }

    #[tokio::test]
    async fn end_to_end_rejected_refresh_clears_session() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = start_api(hits.clone()).await;
        let store = Arc::new(MemoryCredentialStore::with_tokens("A1", "R-stale"));
        let pipeline = http_pipeline(&base, store.clone());

        let failure = pipeline
            .execute(RequestDescriptor::get(format!("{base}/posts")))
            .await
            .unwrap_err();

        assert!(failure.is_unauthorized());
        assert_eq!(&failure.response.unwrap().body[..], b"expired");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(stored(&store).await, (None, None));
    }
}
