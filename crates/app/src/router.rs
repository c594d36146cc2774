use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;

use payboard_storage::{Database, StatementExecutor, ViewCache};
use payboard_util::SessionConfig;

use crate::actions;
use crate::auth::{AuthenticationGate, CredentialVerifier, OperatorDirectory};
use crate::effects::EffectsCoordinator;
use crate::executor::{Clock, MutationExecutor};
use crate::pipeline::MutationPipeline;
use crate::problem::ProblemResponse;
use crate::session::SessionManager;
use crate::submission::SubmissionGuard;
use crate::telemetry;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    pipeline: MutationPipeline,
    gate: AuthenticationGate,
    guard: SubmissionGuard,
    secure_cookies: bool,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        database: &Database,
        session: &SessionConfig,
        secure_cookies: bool,
    ) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        let store: Arc<dyn StatementExecutor> = Arc::new(database.clone());
        let pipeline = MutationPipeline::new(
            MutationExecutor::new(store, clock.clone()),
            EffectsCoordinator::new(Arc::new(ViewCache::new())),
        );
        let sessions = SessionManager::new(
            database.sessions(),
            &session.secret,
            session.ttl,
            clock.clone(),
        );
        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(OperatorDirectory::new(database.operators()));

        Self {
            metrics,
            pipeline,
            gate: AuthenticationGate::new(verifier, sessions),
            guard: SubmissionGuard::new(),
            secure_cookies,
        }
    }

    #[cfg(test)]
    pub fn with_store(
        mut self,
        store: Arc<dyn StatementExecutor>,
        views: Arc<dyn payboard_storage::ViewInvalidator>,
    ) -> Self {
        self.pipeline = MutationPipeline::new(
            MutationExecutor::new(store, Arc::new(Utc::now)),
            EffectsCoordinator::new(views),
        );
        self
    }

    #[cfg(test)]
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.gate = AuthenticationGate::new(verifier, self.gate.sessions().clone());
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn pipeline(&self) -> &MutationPipeline {
        &self.pipeline
    }

    pub fn gate(&self) -> &AuthenticationGate {
        &self.gate
    }

    pub fn guard(&self) -> &SubmissionGuard {
        &self.guard
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/login", post(actions::login))
        .route("/logout", post(actions::logout))
        .route("/dashboard/invoices/create", post(actions::create_invoice))
        .route("/dashboard/invoices/:id/edit", post(actions::update_invoice))
        .route("/dashboard/invoices/:id/delete", post(actions::delete_invoice))
        .route("/dashboard/customers/create", post(actions::create_customer))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ProblemResponse> {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .map(IntoResponse::into_response)
        .map_err(|_| {
            ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "metrics_render_failed",
                "failed to render metrics",
            )
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::seed_operator;
    use crate::executor::testing::RecordingExecutor;
    use crate::session::SESSION_COOKIE;
    use payboard_storage::{customers, CachedView, NewCustomer};

    async fn setup() -> (Database, AppState) {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let database = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");
        seed_operator(
            &database.operators(),
            "User",
            "user@nextmail.com",
            "123456",
            Utc::now(),
        )
        .await
        .expect("seed operator");
        database
            .execute(&customers::insert_statement(&NewCustomer {
                id: "c1",
                name: "Evil Rabbit",
                email: "evil@rabbit.com",
                image_url: "/evil_rabbit",
            }))
            .await
            .expect("seed customer");

        let session = SessionConfig {
            secret: b"router-secret".to_vec(),
            ttl: Duration::from_secs(3600),
            fallback_secret: false,
        };
        let state = AppState::new(metrics, &database, &session, false);
        (database, state)
    }

    fn form_request(uri: &str, cookie: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={cookie}"));
        }
        let body = serde_urlencoded::to_string(fields).expect("encode form");
        builder.body(Body::from(body)).unwrap()
    }

    async fn sign_in(state: &AppState) -> String {
        let response = app_router(state.clone())
            .oneshot(form_request(
                "/login",
                None,
                &[("email", "user@nextmail.com"), ("password", "123456")],
            ))
            .await
            .expect("login responds");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");

        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .expect("cookie header");
        assert!(cookie.contains("HttpOnly"));
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, token)| token.to_string())
            .expect("session token")
    }

    async fn json_body(response: Response) -> Value {
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        serde_json::from_slice(&collected.to_bytes()).expect("json body")
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (_db, state) = setup().await;
        let response = app_router(state)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let (_db, state) = setup().await;
        let response = app_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::OK);

        let collected = response.into_body().collect().await.expect("body");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn wrong_password_returns_invalid_credentials() {
        let (_db, state) = setup().await;
        let response = app_router(state)
            .oneshot(form_request(
                "/login",
                None,
                &[("email", "user@nextmail.com"), ("password", "wrong-password")],
            ))
            .await
            .expect("login responds");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = json_body(response).await;
        assert_eq!(body["message"], "Invalid credentials.");
    }

    #[tokio::test]
    async fn unclassified_sign_in_failure_is_a_problem_response() {
        use crate::auth::{PasswordError, VerifiedOperator, VerifierError};
        use async_trait::async_trait;
        use payboard_core::Credentials;

        struct Broken;

        #[async_trait]
        impl CredentialVerifier for Broken {
            async fn verify(
                &self,
                _credentials: &Credentials,
            ) -> Result<Option<VerifiedOperator>, VerifierError> {
                Err(VerifierError::Password(PasswordError::Hasher))
            }
        }

        let (_db, state) = setup().await;
        let response = app_router(state.with_verifier(Arc::new(Broken)))
            .oneshot(form_request(
                "/login",
                None,
                &[("email", "user@nextmail.com"), ("password", "123456")],
            ))
            .await
            .expect("login responds");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );
    }

    #[tokio::test]
    async fn unreadable_form_bodies_are_problem_responses() {
        let (_db, state) = setup().await;
        let token = sign_in(&state).await;

        let cases = [
            ("/login", None),
            ("/dashboard/invoices/create", Some(token.as_str())),
            ("/dashboard/invoices/inv-1/edit", Some(token.as_str())),
            ("/dashboard/customers/create", Some(token.as_str())),
        ];
        for (uri, cookie) in cases {
            let mut builder = Request::builder().method("POST").uri(uri);
            if let Some(cookie) = cookie {
                builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={cookie}"));
            }
            let response = app_router(state.clone())
                .oneshot(builder.body(Body::from("email=user%40nextmail.com")).unwrap())
                .await
                .expect("handler responds");

            assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE, "{uri}");
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/problem+json",
                "{uri}"
            );
            let body = json_body(response).await;
            assert_eq!(body["type"], "invalid_form");
            assert_eq!(body["status"], 415);
        }
    }

    #[tokio::test]
    async fn mutations_require_a_session() {
        let (_db, state) = setup().await;
        let response = app_router(state)
            .oneshot(form_request(
                "/dashboard/customers/create",
                None,
                &[
                    ("name", "Evil Rabbit"),
                    ("email", "evil@rabbit.com"),
                    ("imageUrl", "/evil_rabbit"),
                ],
            ))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["type"], "missing_session");
    }

    #[tokio::test]
    async fn create_invoice_redirects_and_invalidates_listing() {
        let (db, state) = setup().await;
        let cache = ViewCache::new();
        cache.store(
            "/dashboard/invoices",
            CachedView {
                body: "stale".into(),
                rendered_at: Utc::now(),
            },
        );
        let token = sign_in(&state).await;
        let state = state.with_store(Arc::new(db.clone()), Arc::new(cache.clone()));

        let response = app_router(state.clone())
            .oneshot(form_request(
                "/dashboard/invoices/create",
                Some(&token),
                &[("customerId", "c1"), ("amount", "19.99"), ("status", "pending")],
            ))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard/invoices");
        assert!(cache.get("/dashboard/invoices").is_none());
        assert_eq!(db.invoices().count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn invalid_customer_returns_field_errors() {
        let (_db, state) = setup().await;
        let token = sign_in(&state).await;

        let response = app_router(state)
            .oneshot(form_request(
                "/dashboard/customers/create",
                Some(&token),
                &[("name", ""), ("email", "not-an-email")],
            ))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Missing Fields. Failed to Create Customer.");
        assert_eq!(body["errors"]["name"][0], "Please enter a name.");
        assert_eq!(body["errors"]["email"][0], "Please enter a valid email.");
        assert_eq!(
            body["errors"]["imageUrl"][0],
            "Please select an image like /customers/evil-rabbit.png"
        );
    }

    #[tokio::test]
    async fn delete_of_missing_invoice_is_not_found() {
        let (_db, state) = setup().await;
        let token = sign_in(&state).await;

        let response = app_router(state)
            .oneshot(form_request(
                "/dashboard/invoices/missing/delete",
                Some(&token),
                &[],
            ))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Invoice not found. Failed to Delete Invoice.");
    }

    #[tokio::test]
    async fn delete_returns_no_content() {
        let (_db, state) = setup().await;
        let token = sign_in(&state).await;
        let state = state.with_store(
            Arc::new(RecordingExecutor::affecting(1)),
            Arc::new(ViewCache::new()),
        );

        let response = app_router(state)
            .oneshot(form_request(
                "/dashboard/invoices/inv-1/delete",
                Some(&token),
                &[],
            ))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn update_failure_is_reported_as_database_error() {
        let (_db, state) = setup().await;
        let token = sign_in(&state).await;
        let state = state.with_store(
            Arc::new(RecordingExecutor::failing()),
            Arc::new(ViewCache::new()),
        );

        let response = app_router(state)
            .oneshot(form_request(
                "/dashboard/invoices/inv-1/edit",
                Some(&token),
                &[("customerId", "c1"), ("amount", "5"), ("status", "paid")],
            ))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Database Error: Failed to Update Invoice.");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn in_flight_submission_is_rejected() {
        let (_db, state) = setup().await;
        let token = sign_in(&state).await;
        let session = state
            .gate()
            .sessions()
            .verify(&token)
            .await
            .expect("session");
        let _held = state
            .guard()
            .try_acquire(format!("{}:invoice:update:inv-1", session.session_id))
            .expect("first submission");

        let response = app_router(state)
            .oneshot(form_request(
                "/dashboard/invoices/inv-1/edit",
                Some(&token),
                &[("customerId", "c1"), ("amount", "5"), ("status", "paid")],
            ))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn logout_revokes_the_session() {
        let (_db, state) = setup().await;
        let token = sign_in(&state).await;

        let response = app_router(state.clone())
            .oneshot(form_request("/logout", Some(&token), &[]))
            .await
            .expect("logout responds");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response.headers()[header::SET_COOKIE]
            .to_str()
            .expect("cookie")
            .contains("Max-Age=0"));

        let response = app_router(state)
            .oneshot(form_request(
                "/dashboard/invoices/create",
                Some(&token),
                &[("customerId", "c1"), ("amount", "1"), ("status", "paid")],
            ))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
