use std::collections::HashMap;

use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use tracing::{debug, error, info, warn};

use payboard_core::{FormState, RawForm};

use crate::auth::SignInOutcome;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::{
    cleared_session_cookie, session_cookie, token_from_headers, ActiveSession, SessionError,
};
use crate::submission::SubmissionPermit;

const DASHBOARD_ROUTE: &str = "/dashboard";
const LOGIN_ROUTE: &str = "/login";

type FormFields = Result<Form<HashMap<String, String>>, FormRejection>;

pub async fn login(
    State(state): State<AppState>,
    fields: FormFields,
) -> Result<Response, ProblemResponse> {
    let form = raw_form(fields)?;
    match state.gate().sign_in(&form).await {
        Ok(SignInOutcome::Authenticated(session)) => {
            let cookie = session_cookie(
                &session.token,
                state.gate().sessions().ttl(),
                state.secure_cookies(),
            );
            let cookie = HeaderValue::from_str(&cookie).map_err(|_| {
                ProblemResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "session_cookie_invalid",
                    "failed to build session cookie",
                )
            })?;
            let mut response = Redirect::to(DASHBOARD_ROUTE).into_response();
            response.headers_mut().insert(header::SET_COOKIE, cookie);
            Ok(response)
        }
        Ok(SignInOutcome::Rejected(message)) => Ok((
            StatusCode::UNAUTHORIZED,
            Json(FormState::with_message(message)),
        )
            .into_response()),
        Err(err) => {
            error!(stage = "auth", error = %err, "sign-in failed unexpectedly");
            Err(ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "sign_in_failed",
                "sign-in failed unexpectedly",
            ))
        }
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = token_from_headers(&headers) {
        match state.gate().sessions().revoke(&token).await {
            Ok(revoked) => info!(stage = "auth", revoked, "operator signed out"),
            Err(err) => warn!(stage = "auth", error = %err, "failed to revoke session"),
        }
    }

    let mut response = Redirect::to(LOGIN_ROUTE).into_response();
    if let Ok(cookie) = HeaderValue::from_str(&cleared_session_cookie()) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

pub async fn create_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    fields: FormFields,
) -> Result<Response, ProblemResponse> {
    let form = raw_form(fields)?;
    let _permit = admit(&state, &headers, "invoice:create".to_string()).await?;
    let outcome = state.pipeline().create_invoice(&form).await;
    Ok(outcome.into_response())
}

pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    fields: FormFields,
) -> Result<Response, ProblemResponse> {
    let form = raw_form(fields)?;
    let _permit = admit(&state, &headers, format!("invoice:update:{id}")).await?;
    let outcome = state.pipeline().update_invoice(&id, &form).await;
    Ok(outcome.into_response())
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ProblemResponse> {
    let _permit = admit(&state, &headers, format!("invoice:delete:{id}")).await?;
    let outcome = state.pipeline().delete_invoice(&id).await;
    Ok(outcome.into_response())
}

pub async fn create_customer(
    State(state): State<AppState>,
    headers: HeaderMap,
    fields: FormFields,
) -> Result<Response, ProblemResponse> {
    let form = raw_form(fields)?;
    let _permit = admit(&state, &headers, "customer:create".to_string()).await?;
    let outcome = state.pipeline().create_customer(&form).await;
    Ok(outcome.into_response())
}

/// Unwraps the urlencoded body or answers with a problem response.
fn raw_form(fields: FormFields) -> Result<RawForm, ProblemResponse> {
    match fields {
        Ok(Form(fields)) => Ok(RawForm::from(fields)),
        Err(rejection) => {
            let status = rejection.status();
            info!(stage = "app", %status, error = %rejection, "form body rejected");
            Err(ProblemResponse::new(status, "invalid_form", rejection.body_text()))
        }
    }
}

/// Requires an active session and claims the in-flight slot for `form_key`.
async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    form_key: String,
) -> Result<SubmissionPermit, ProblemResponse> {
    let session = authorize(state, headers).await?;
    debug!(stage = "auth", operator_id = %session.operator_id, form = %form_key, "session accepted");
    state
        .guard()
        .try_acquire(format!("{}:{form_key}", session.session_id))
        .ok_or_else(|| {
            warn!(stage = "app", form = %form_key, "duplicate submission rejected");
            ProblemResponse::new(
                StatusCode::CONFLICT,
                "submission_in_progress",
                "this form is already being submitted",
            )
        })
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<ActiveSession, ProblemResponse> {
    let token = token_from_headers(headers).ok_or_else(|| {
        ProblemResponse::new(
            StatusCode::UNAUTHORIZED,
            "missing_session",
            "sign in to continue",
        )
    })?;

    state
        .gate()
        .sessions()
        .verify(&token)
        .await
        .map_err(|err| match err {
            SessionError::Storage(err) => {
                error!(stage = "auth", error = %err, "failed to load session");
                ProblemResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "session_lookup_failed",
                    "failed to load session",
                )
            }
            other => {
                info!(stage = "auth", error = %other, "session rejected");
                ProblemResponse::new(
                    StatusCode::UNAUTHORIZED,
                    "invalid_session",
                    "session is invalid or expired",
                )
            }
        })
}
