/*!
Interoperation between the client (browser) and server.

(Not the application and the account file; that's covered by `account` and
`store`.)

Every API response body is a `Reply`: an explicit `success` flag plus a
message meant only for display.
*/
use std::{path::Path, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::account::{AccountError, LoginData, SettingsData, SignupData};
use crate::config::Glob;
use crate::profile::ProfileKind;
use crate::stats::Stats;

static LIVENESS: &str = "Hello World from CarPal (test route)!";
static STATS_MESSAGE: &str = "Statistics displayed in terminal";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reply {
    pub success: bool,
    pub message: String,
}

pub type ApiResponse = (StatusCode, Json<Reply>);

pub fn respond_ok(message: &str) -> ApiResponse {
    (
        StatusCode::OK,
        Json(Reply { success: true, message: message.to_owned() })
    )
}

/**
Turn an `AccountError` into a response.

Problems with the request get their own message; problems on our end are
logged and the client just hears that something went wrong `during` what.
*/
pub fn respond_error(e: AccountError, during: &str) -> ApiResponse {
    let status = match &e {
        AccountError::InvalidDomain(_) => StatusCode::BAD_REQUEST,
        AccountError::DuplicateAccount => StatusCode::BAD_REQUEST,
        AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AccountError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        AccountError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("Error during {}: {}", during, &e);
        format!("Internal server error during {}.", during)
    } else {
        log::trace!("respond_error( {:?}, {:?} ): {}", &e, during, &status);
        e.to_string()
    };

    (status, Json(Reply { success: false, message }))
}

/// A body that isn't the JSON we expect gets a `Reply` like anything else.
pub fn respond_rejection(e: JsonRejection, during: &str) -> ApiResponse {
    log::debug!("Unusable {} request body: {}", during, &e);
    (
        StatusCode::BAD_REQUEST,
        Json(Reply {
            success: false,
            message: format!("Invalid request body: {}", &e.body_text()),
        })
    )
}

fn respond<T: AsRef<str>>(res: Result<T, AccountError>, during: &str) -> ApiResponse {
    match res {
        Ok(msg) => respond_ok(msg.as_ref()),
        Err(e) => respond_error(e, during),
    }
}

pub async fn signup(
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<SignupData>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(data)) => respond(glob.accounts.signup(data).await, "signup"),
        Err(e) => respond_rejection(e, "signup"),
    }
}

pub async fn login(
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<LoginData>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(data)) => respond(glob.accounts.login(data).await, "login"),
        Err(e) => respond_rejection(e, "login"),
    }
}

pub async fn settings(
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<SettingsData>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(data)) => respond(glob.accounts.update_settings(data).await, "settings update"),
        Err(e) => respond_rejection(e, "settings update"),
    }
}

pub async fn driver_signup(
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(body)) => respond_ok(glob.profiles.submit(ProfileKind::Driver, body).await),
        Err(e) => respond_rejection(e, "driver signup"),
    }
}

pub async fn passenger_signup(
    Extension(glob): Extension<Arc<Glob>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResponse {
    match body {
        Ok(Json(body)) => respond_ok(glob.profiles.submit(ProfileKind::Passenger, body).await),
        Err(e) => respond_rejection(e, "passenger signup"),
    }
}

/// Counts go to the log, not to the client.
pub async fn stats(Extension(glob): Extension<Arc<Glob>>) -> ApiResponse {
    match glob.accounts.accounts().await {
        Ok(accounts) => {
            Stats::compute(&accounts).report();
            respond_ok(STATS_MESSAGE)
        },
        Err(e) => {
            log::error!("Unable to read accounts for statistics: {}", &e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Reply {
                    success: false,
                    message: "Error displaying statistics".to_owned(),
                })
            )
        },
    }
}

pub async fn liveness() -> &'static str { LIVENESS }

/// Middleware that logs each request along with the status it got.
pub async fn log_request<B>(
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;
    log::debug!("{} {} -> {}", &method, &uri, &response.status());
    response
}

/// All routes; anything unrouted is looked for in `public_dir`.
pub fn router<P: AsRef<Path>>(glob: Arc<Glob>, public_dir: P) -> Router {
    Router::new()
        .route("/test", get(liveness))
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/api/driverSignup", post(driver_signup))
        .route("/api/passengerSignup", post(passenger_signup))
        .route("/api/settings", post(settings))
        .route("/api/stats", get(stats))
        .fallback_service(ServeDir::new(public_dir.as_ref()))
        .layer(Extension(glob))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_request))
}
