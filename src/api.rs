// src/api.rs
use crate::auth::{
    check_trigger_token, hash_password, verify_password, SessionContext, SessionKeys,
    SESSION_COOKIE,
};
use crate::batch::DigestBatch;
use crate::db::AccountStore;
use crate::error::{AppError, AuthError, StoreError};
use crate::models::{normalize_symbol, ListKind};
use crate::pages::{DashboardPage, LoginPage, SignupPage};
use askama::Template;
use chrono::Local;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::{HeaderValue, LOCATION, SET_COOKIE};
use warp::http::StatusCode;
use warp::filters::BoxedFilter;
use warp::hyper::Body;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const FLASH_COOKIE: &str = "flash";
const TRIGGER_HEADER: &str = "x-trigger-token";
const FORM_LIMIT: u64 = 16 * 1024;

pub struct AppState {
    pub store: Arc<dyn AccountStore>,
    pub keys: SessionKeys,
    pub batch: DigestBatch,
    pub trigger_token: Option<String>,
    pub secure_cookies: bool,
}

#[derive(Deserialize)]
struct CredentialsForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct AddStockForm {
    symbol: String,
    list_type: String,
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(with_session(state.clone()))
        .and_then(index_handler);

    let signup_page = warp::path!("signup")
        .and(warp::get())
        .and(with_flash())
        .and_then(signup_page_handler);

    let signup = warp::path!("signup")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form::<CredentialsForm>())
        .and_then(signup_handler);

    let login_page = warp::path!("login")
        .and(warp::get())
        .and(with_flash())
        .and_then(login_page_handler);

    let login = warp::path!("login")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form::<CredentialsForm>())
        .and_then(login_handler);

    let dashboard = warp::path!("dashboard")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_session(state.clone()))
        .and(with_flash())
        .and_then(dashboard_handler);

    let add_stock = warp::path!("add_stock")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_session(state.clone()))
        .and(form::<AddStockForm>())
        .and_then(add_stock_handler);

    let remove_stock = warp::path!("remove_stock" / String / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_session(state.clone()))
        .and_then(remove_stock_handler);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and_then(logout_handler);

    let trigger = warp::path!("tasks" / "send-digests")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::header::optional::<String>(TRIGGER_HEADER))
        .and_then(trigger_handler);

    index
        .or(signup_page)
        .or(signup)
        .or(login_page)
        .or(login)
        .or(dashboard)
        .or(add_stock)
        .or(remove_stock)
        .or(logout)
        .or(trigger)
        .recover(handle_rejection)
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the session cookie into the caller's context, if it verifies.
fn with_session(state: Arc<AppState>) -> BoxedFilter<(Option<SessionContext>,)> {
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .map(move |token: Option<String>| {
            token.and_then(|token| state.keys.verify(&token).ok())
        })
        .boxed()
}

fn with_flash() -> BoxedFilter<(Option<String>,)> {
    warp::cookie::optional::<String>(FLASH_COOKIE)
        .map(|raw: Option<String>| {
            raw.filter(|value| !value.is_empty())
                .and_then(|value| urlencoding::decode(&value).ok().map(|v| v.into_owned()))
        })
        .boxed()
}

fn form<T: serde::de::DeserializeOwned + Send + 'static>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(FORM_LIMIT).and(warp::body::form())
}

fn flash_cookie(message: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=60",
        FLASH_COOKIE,
        urlencoding::encode(message)
    )
}

fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

fn session_cookie(state: &AppState, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        state.keys.max_age()
    );
    if state.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie
}

fn append_cookies(response: &mut Response, cookies: &[String]) {
    for cookie in cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!("Dropping unrepresentable cookie: {}", e),
        }
    }
}

fn redirect(location: &'static str, cookies: &[String]) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SEE_OTHER;
    response
        .headers_mut()
        .insert(LOCATION, HeaderValue::from_static(location));
    append_cookies(&mut response, cookies);
    response
}

fn redirect_with_flash(location: &'static str, message: &str) -> Response {
    redirect(location, &[flash_cookie(message)])
}

/// Renders a page and drops the flash cookie it just displayed.
fn page<T: Template>(template: T, flash_shown: bool) -> Result<Response, Rejection> {
    let html = template
        .render()
        .map_err(|e| warp::reject::custom(AppError::from(e)))?;
    let mut response = warp::reply::html(html).into_response();
    if flash_shown {
        append_cookies(&mut response, &[clear_cookie(FLASH_COOKIE)]);
    }
    Ok(response)
}

fn store_failure(location: &'static str, e: StoreError) -> Response {
    error!("Account store failure: {}", e);
    redirect_with_flash(location, "Something went wrong. Please try again.")
}

async fn index_handler(session: Option<SessionContext>) -> Result<Response, Rejection> {
    Ok(match session {
        Some(_) => redirect("/dashboard", &[]),
        None => redirect("/login", &[]),
    })
}

async fn signup_page_handler(flash: Option<String>) -> Result<Response, Rejection> {
    let shown = flash.is_some();
    page(SignupPage { flash }, shown)
}

async fn login_page_handler(flash: Option<String>) -> Result<Response, Rejection> {
    let shown = flash.is_some();
    page(LoginPage { flash }, shown)
}

async fn signup_handler(
    state: Arc<AppState>,
    form: CredentialsForm,
) -> Result<Response, Rejection> {
    let email = form.email.trim().to_lowercase();
    if !email.contains('@') || form.password.is_empty() {
        return Ok(redirect_with_flash(
            "/signup",
            "Please provide a valid email and password.",
        ));
    }

    let hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Failed to hash password for {}: {}", email, e);
            return Ok(redirect_with_flash(
                "/signup",
                "Something went wrong. Please try again.",
            ));
        }
    };

    match state.store.create_account(&email, &hash).await {
        Ok(()) => {
            info!("Account created for {}", email);
            Ok(redirect_with_flash(
                "/login",
                "Sign up successful! Please log in.",
            ))
        }
        Err(StoreError::DuplicateAccount(_)) => {
            Ok(redirect_with_flash("/signup", "Email already exists."))
        }
        Err(e) => Ok(store_failure("/signup", e)),
    }
}

async fn login_handler(
    state: Arc<AppState>,
    form: CredentialsForm,
) -> Result<Response, Rejection> {
    let email = form.email.trim().to_lowercase();
    let account = match state.store.find_account(&email).await {
        Ok(account) => account,
        Err(e) => return Ok(store_failure("/login", e)),
    };

    let verified = match account {
        Some(account) => verify_password(&form.password, &account.password_hash),
        None => Err(AuthError::InvalidCredentials),
    };
    match verified {
        Ok(()) => {}
        Err(AuthError::InvalidCredentials) => {
            return Ok(redirect_with_flash("/login", "Invalid email or password."))
        }
        Err(e) => {
            error!("Login check failed for {}: {}", email, e);
            return Ok(redirect_with_flash("/login", "Invalid email or password."));
        }
    }

    match state.keys.issue(&email) {
        Ok(token) => Ok(redirect(
            "/dashboard",
            &[session_cookie(&state, &token)],
        )),
        Err(e) => {
            error!("Failed to issue session for {}: {}", email, e);
            Ok(redirect_with_flash(
                "/login",
                "Something went wrong. Please try again.",
            ))
        }
    }
}

async fn dashboard_handler(
    state: Arc<AppState>,
    session: Option<SessionContext>,
    flash: Option<String>,
) -> Result<Response, Rejection> {
    let Some(session) = session else {
        return Ok(redirect("/login", &[]));
    };

    let holdings = state
        .store
        .tracked_symbols(&session.email, ListKind::Holdings)
        .await;
    let watchlist = state
        .store
        .tracked_symbols(&session.email, ListKind::Watchlist)
        .await;
    let (holdings, watchlist) = match (holdings, watchlist) {
        (Ok(h), Ok(w)) => (h, w),
        (Err(e), _) | (_, Err(e)) => return Ok(store_failure("/login", e)),
    };

    let shown = flash.is_some();
    page(
        DashboardPage {
            flash,
            email: session.email,
            holdings,
            watchlist,
        },
        shown,
    )
}

async fn add_stock_handler(
    state: Arc<AppState>,
    session: Option<SessionContext>,
    form: AddStockForm,
) -> Result<Response, Rejection> {
    let Some(session) = session else {
        return Ok(redirect("/login", &[]));
    };
    let list: ListKind = match form.list_type.parse() {
        Ok(list) => list,
        Err(_) => return Ok(redirect_with_flash("/dashboard", "Unknown list type.")),
    };
    let Some(symbol) = normalize_symbol(&form.symbol) else {
        return Ok(redirect_with_flash(
            "/dashboard",
            "Please enter a valid stock symbol.",
        ));
    };

    match state.store.add_symbol(&session.email, list, &symbol).await {
        Ok(()) => Ok(redirect("/dashboard", &[])),
        Err(e) => Ok(store_failure("/dashboard", e)),
    }
}

async fn remove_stock_handler(
    list_type: String,
    symbol: String,
    state: Arc<AppState>,
    session: Option<SessionContext>,
) -> Result<Response, Rejection> {
    let Some(session) = session else {
        return Ok(redirect("/login", &[]));
    };
    let list: ListKind = match list_type.parse() {
        Ok(list) => list,
        Err(_) => return Ok(redirect_with_flash("/dashboard", "Unknown list type.")),
    };

    match state.store.remove_symbol(&session.email, list, &symbol).await {
        Ok(_) => Ok(redirect("/dashboard", &[])),
        Err(e) => Ok(store_failure("/dashboard", e)),
    }
}

async fn logout_handler() -> Result<Response, Rejection> {
    Ok(redirect("/login", &[clear_cookie(SESSION_COOKIE)]))
}

async fn trigger_handler(
    state: Arc<AppState>,
    token: Option<String>,
) -> Result<Response, Rejection> {
    if check_trigger_token(state.trigger_token.as_deref(), token.as_deref()).is_err() {
        warn!("Rejected digest trigger without a valid token");
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({"status": "unauthorized"})),
            StatusCode::UNAUTHORIZED,
        )
        .into_response());
    }

    match state.batch.try_run(Local::now().date_naive()).await {
        None => Ok(warp::reply::with_status(
            warp::reply::json(&json!({"status": "already_running"})),
            StatusCode::CONFLICT,
        )
        .into_response()),
        Some(Ok(report)) => Ok(warp::reply::json(&json!({
            "status": "completed",
            "accounts": report.accounts,
            "skipped": report.skipped,
            "sent": report.sent,
            "failed": report.failed,
        }))
        .into_response()),
        Some(Err(e)) => {
            error!("Digest batch could not start: {}", e);
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({"status": "failed", "message": e.to_string()})),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into_response())
        }
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<AppError>() {
        error!("Request failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({"code": code.as_u16(), "message": message})),
        code,
    )
    .into_response())
}
