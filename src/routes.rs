use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use cookie::{Cookie, SameSite};
use log::{error, info, trace};
use serde::Serialize;
use warp::http::{self, header, HeaderValue, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::{AuthAttempt, SessionId, SESSION_COOKIE};
use crate::dashboard::{Dashboard, DashboardAuthed, Error};
use crate::field::{FieldSegment, FieldValue};
use crate::flash::{Flash, FLASH_COOKIE};
use crate::pages::Pages;

const DEFAULT_API_RESULTS: u32 = 50;
const FORM_LIMIT: u64 = 4 * 1024;

#[derive(Debug, Default, Serialize)]
struct FieldSeries {
    labels: Vec<Option<String>>,
    values: Vec<Option<FieldValue>>,
}

pub fn routes(
    dash: Arc<Dashboard>,
    pages: Pages,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let with_dash = warp::any().map(move || Arc::clone(&dash));
    let with_pages = warp::any().map(move || pages.clone());
    let session = || warp::cookie::optional(SESSION_COOKIE);
    let flash = || warp::cookie::optional(FLASH_COOKIE);
    let form = || {
        warp::body::content_length_limit(FORM_LIMIT).and(warp::body::form::<AuthAttempt>())
    };

    let index = warp::path::end()
        .and(warp::get())
        .and(with_dash.clone())
        .and(session())
        .and_then(index);

    let signup = {
        let page = warp::path!("signup")
            .and(warp::get())
            .and(with_pages.clone())
            .and_then(|pages: Pages| async move { html(pages.signup(None)) });

        let submit = warp::path!("signup")
            .and(warp::post())
            .and(with_dash.clone())
            .and(with_pages.clone())
            .and(form())
            .and_then(signup);

        page.or(submit)
    };

    let login = {
        let page = warp::path!("login")
            .and(warp::get())
            .and(with_pages.clone())
            .and(flash())
            .and_then(|pages: Pages, flash: Option<String>| async move {
                let flash = parse_flash(flash);
                html(pages.login(flash)).map(|page| with_flash_shown(page, flash))
            });

        let submit = warp::path!("login")
            .and(warp::post())
            .and(with_dash.clone())
            .and(with_pages.clone())
            .and(form())
            .and_then(login);

        page.or(submit)
    };

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(with_dash.clone())
        .and(session())
        .and_then(logout);

    let dashboard = warp::path!("dashboard")
        .and(warp::get())
        .and(with_dash.clone())
        .and(with_pages.clone())
        .and(session())
        .and(flash())
        .and_then(dashboard);

    let simulation = warp::path!("simulation")
        .and(warp::get())
        .and(with_dash.clone())
        .and(with_pages.clone())
        .and(session())
        .and_then(simulation);

    let details = warp::path!("details" / FieldSegment)
        .and(warp::get())
        .and(with_dash.clone())
        .and(with_pages.clone())
        .and(session())
        .and_then(details);

    let api_field = warp::path!("api" / "field" / FieldSegment)
        .and(warp::get())
        .and(with_dash.clone())
        .and(session())
        .and(warp::query::<HashMap<String, String>>())
        .and_then(api_field);

    let about = warp::path!("about")
        .and(warp::get())
        .and(with_pages)
        .and_then(|pages: Pages| async move { html(pages.about()) });

    let health = warp::path!("health").and(warp::get()).map(|| "OK");

    let script = warp::path!("static" / "dashboard.js")
        .and(warp::get())
        .map(|| {
            warp::reply::with_header(
                include_str!("../static/dashboard.js"),
                header::CONTENT_TYPE,
                "application/javascript",
            )
        });

    index
        .or(signup)
        .or(login)
        .or(logout)
        .or(dashboard)
        .or(simulation)
        .or(details)
        .or(api_field)
        .or(about)
        .or(health)
        .or(script)
        .recover(handle_rejection)
        .with(warp::log("sensordash"))
}

type Result<T> = std::result::Result<T, Rejection>;

/// Resolves the session cookie. `None` means nobody is logged in.
async fn gate(dash: &Arc<Dashboard>, session: Option<String>) -> Result<Option<DashboardAuthed>> {
    match dash.authenticate_cookie(session.as_deref()).await {
        Ok(authed) => Ok(Some(authed)),
        Err(Error::Unauthorized) => Ok(None),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

fn html(page: std::result::Result<String, Error>) -> Result<Response> {
    page.map(|page| warp::reply::html(page).into_response())
        .map_err(warp::reject::custom)
}

fn redirect(to: &'static str) -> Response {
    warp::redirect::see_other(Uri::from_static(to)).into_response()
}

fn with_cookie(mut response: Response, cookie: Cookie<'_>) -> Response {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => error!("couldn't encode cookie {}: {e:?}", cookie.name()),
    }
    response
}

fn parse_flash(cookie: Option<String>) -> Option<Flash> {
    cookie.and_then(|c| c.parse().ok())
}

/// A notice is only shown once.
fn with_flash_shown(response: Response, shown: Option<Flash>) -> Response {
    match shown {
        Some(_) => with_cookie(response, Flash::clear_cookie()),
        None => response,
    }
}

fn session_cookie(session_id: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn session_removal() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}

async fn index(dash: Arc<Dashboard>, session: Option<String>) -> Result<Response> {
    Ok(match gate(&dash, session).await? {
        Some(_) => redirect("/dashboard"),
        None => redirect("/login"),
    })
}

async fn signup(dash: Arc<Dashboard>, pages: Pages, attempt: AuthAttempt) -> Result<Response> {
    let shown = match dash.create_user(attempt.user(), attempt.pass()).await {
        Ok(_) => {
            return Ok(with_cookie(redirect("/login"), Flash::AccountCreated.cookie()));
        }
        Err(Error::InvalidInput) => Flash::InvalidInput,
        Err(Error::DuplicateUsername) => Flash::DuplicateUsername,
        Err(e) => return Err(warp::reject::custom(e)),
    };

    html(pages.signup(Some(shown)))
}

async fn login(dash: Arc<Dashboard>, pages: Pages, attempt: AuthAttempt) -> Result<Response> {
    match dash.login(&attempt).await {
        Ok(authed) => {
            let cookie = session_cookie(authed.session_id(), dash.config().secure_cookies);
            Ok(with_cookie(redirect("/dashboard"), cookie))
        }
        Err(Error::AuthFailure) => html(pages.login(Some(Flash::InvalidCredentials))),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

async fn logout(dash: Arc<Dashboard>, session: Option<String>) -> Result<Response> {
    if let Some(authed) = gate(&dash, session).await? {
        authed.logout().await.map_err(warp::reject::custom)?;
    }

    let response = with_cookie(redirect("/login"), session_removal());
    Ok(with_cookie(response, Flash::LoggedOut.cookie()))
}

async fn dashboard(
    dash: Arc<Dashboard>,
    pages: Pages,
    session: Option<String>,
    flash: Option<String>,
) -> Result<Response> {
    let Some(authed) = gate(&dash, session).await? else {
        return Ok(redirect("/login"));
    };
    trace!("dashboard for user {}", authed.user_id());

    let latest = authed.latest().await;
    let flash = parse_flash(flash);
    let page = pages.dashboard(authed.username(), flash, latest.as_ref(), &dash.config().fields);

    html(page).map(|page| with_flash_shown(page, flash))
}

async fn simulation(dash: Arc<Dashboard>, pages: Pages, session: Option<String>) -> Result<Response> {
    let Some(authed) = gate(&dash, session).await? else {
        return Ok(redirect("/login"));
    };

    html(pages.simulation(authed.username()))
}

async fn details(
    field: FieldSegment,
    dash: Arc<Dashboard>,
    pages: Pages,
    session: Option<String>,
) -> Result<Response> {
    let Some(authed) = gate(&dash, session).await? else {
        return Ok(redirect("/login"));
    };

    let history = match field.number() {
        Some(field) => authed.field_history(field).await.map(|h| (field, h)),
        None => {
            info!("{} asked for out of range field {field}", authed.username());
            Err(Error::UnknownField)
        }
    };

    match history {
        Ok((field, (title, history))) => html(pages.details(authed.username(), field, title, &history)),
        Err(Error::UnknownField) => Ok(with_cookie(
            redirect("/dashboard"),
            Flash::InvalidField.cookie(),
        )),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

async fn api_field(
    field: FieldSegment,
    dash: Arc<Dashboard>,
    session: Option<String>,
    query: HashMap<String, String>,
) -> Result<Response> {
    let Some(authed) = gate(&dash, session).await? else {
        return Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "error": "unauthorized" })),
            http::StatusCode::UNAUTHORIZED,
        )
        .into_response());
    };

    // like the form fields, an unparseable count falls back to the default
    let results = query
        .get("results")
        .and_then(|r| r.trim().parse().ok())
        .unwrap_or(DEFAULT_API_RESULTS);

    // no upstream field can have this number
    let Some(field) = field.number() else {
        info!("{} asked for out of range field {field}", authed.username());
        return Ok(warp::reply::json(&FieldSeries::default()).into_response());
    };

    let (labels, values) = authed
        .field_series(field, results)
        .await
        .into_iter()
        .map(|reading| (reading.timestamp, reading.value))
        .unzip();

    Ok(warp::reply::json(&FieldSeries { labels, values }).into_response())
}

async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let status: http::StatusCode = if err.is_not_found() {
        http::StatusCode::NOT_FOUND
    } else if let Some(e) = err.find::<Error>() {
        error!("request failed: {e:?}");
        (*e).into()
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        http::StatusCode::PAYLOAD_TOO_LARGE
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        http::StatusCode::METHOD_NOT_ALLOWED
    } else {
        info!("bad request: {err:?}");
        http::StatusCode::BAD_REQUEST
    };

    let reason = status.canonical_reason().unwrap_or("Error");
    Ok(warp::reply::with_status(reason, status).into_response())
}
