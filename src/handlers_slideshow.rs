use log::info;
use serde::Serialize;
use warp::{reject, Filter, Rejection, Reply};

use crate::db_types::{NewSlideshow, SlideshowId, SubmissionId};
use crate::slideshow::{PlaybackState, Slide, SlideshowSession, SlideshowSessions};
use crate::submission_store::{SqliteSubmissionStore, StoreError, SubmissionStore};
use crate::warp_helpers::{store_rejection, with_sessions, with_store, NotFoundError, ValidationError};

/// What the renderer needs to draw the next frame.
#[derive(Debug, Serialize)]
pub struct SlideResponse<'a> {
    pub state: PlaybackState,
    pub display_duration_ms: u64,
    pub slide: Option<&'a Slide>,
}

fn slide_reply(session: &SlideshowSession) -> warp::reply::Json {
    let slide = session.current_slide();
    warp::reply::json(&SlideResponse {
        state: session.state(),
        display_duration_ms: session.settings().display_duration_ms,
        slide: slide.as_deref(),
    })
}

/// Display ids name a physical screen, e.g. `lobby-left`.
fn validate_display_id(display: &str) -> Result<(), Rejection> {
    let valid = !display.is_empty()
        && display.len() <= 64
        && display
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(reject::custom(ValidationError {
            message: format!(
                "Invalid display id '{}': use up to 64 letters, digits, '-' or '_'",
                display
            ),
        }))
    }
}

pub async fn create_slideshow(
    new: NewSlideshow,
    store: SqliteSubmissionStore,
) -> Result<impl Reply, Rejection> {
    let slideshow = store.create_slideshow(&new).await.map_err(store_rejection)?;
    info!(
        "Created slideshow {} '{}' for {}",
        slideshow.id, slideshow.name, slideshow.scope
    );
    Ok(warp::reply::with_status(
        warp::reply::json(&slideshow),
        warp::http::StatusCode::CREATED,
    ))
}

pub async fn get_slideshow(
    id: SlideshowId,
    store: SqliteSubmissionStore,
) -> Result<impl Reply, Rejection> {
    match store.load_slideshow(id).await {
        Ok(Some(slideshow)) => Ok(warp::reply::json(&slideshow)),
        Ok(None) => Err(store_rejection(StoreError::SlideshowNotFound(id))),
        Err(e) => Err(store_rejection(e)),
    }
}

pub async fn current_slide(
    id: SlideshowId,
    display: String,
    sessions: SlideshowSessions,
) -> Result<impl Reply, Rejection> {
    validate_display_id(&display)?;
    let session = sessions
        .get_or_start(id, &display)
        .await
        .map_err(store_rejection)?;
    Ok(slide_reply(&session))
}

pub async fn slide_displayed(
    id: SlideshowId,
    display: String,
    sessions: SlideshowSessions,
) -> Result<impl Reply, Rejection> {
    validate_display_id(&display)?;
    let session = sessions
        .get_or_start(id, &display)
        .await
        .map_err(store_rejection)?;
    session.advance();
    Ok(slide_reply(&session))
}

pub async fn session_status(
    id: SlideshowId,
    display: String,
    sessions: SlideshowSessions,
) -> Result<impl Reply, Rejection> {
    match sessions.get(id, &display) {
        Some(session) => Ok(warp::reply::json(&session.status())),
        None => Err(reject::custom(NotFoundError {
            message: format!(
                "No running session for slideshow {} on display {}",
                id, display
            ),
        })),
    }
}

pub async fn close_session(
    id: SlideshowId,
    display: String,
    sessions: SlideshowSessions,
) -> Result<impl Reply, Rejection> {
    let closed = sessions.close(id, &display);
    Ok(warp::reply::json(&serde_json::json!({
        "success": true,
        "closed": closed
    })))
}

pub async fn hide_submission(
    slideshow_id: SlideshowId,
    submission_id: SubmissionId,
    store: SqliteSubmissionStore,
) -> Result<impl Reply, Rejection> {
    store
        .hide_in_slideshow(slideshow_id, submission_id)
        .await
        .map_err(store_rejection)?;
    info!(
        "Submission {} hidden from slideshow {}",
        submission_id, slideshow_id
    );
    Ok(warp::reply::json(&serde_json::json!({ "success": true })))
}

pub async fn unhide_submission(
    slideshow_id: SlideshowId,
    submission_id: SubmissionId,
    store: SqliteSubmissionStore,
) -> Result<impl Reply, Rejection> {
    store
        .unhide_in_slideshow(slideshow_id, submission_id)
        .await
        .map_err(store_rejection)?;
    Ok(warp::reply::json(&serde_json::json!({ "success": true })))
}

pub fn build_slideshow_routes(
    store: SqliteSubmissionStore,
    sessions: SlideshowSessions,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let create = warp::path!("api" / "slideshows")
        .and(warp::post())
        .and(warp::body::json::<NewSlideshow>())
        .and(with_store(store.clone()))
        .and_then(create_slideshow);

    let get = warp::path!("api" / "slideshows" / SlideshowId)
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(get_slideshow);

    let slide = warp::path!("api" / "slideshows" / SlideshowId / "displays" / String / "slide")
        .and(warp::get())
        .and(with_sessions(sessions.clone()))
        .and_then(current_slide);

    let displayed = warp::path!("api" / "slideshows" / SlideshowId / "displays" / String / "displayed")
        .and(warp::post())
        .and(with_sessions(sessions.clone()))
        .and_then(slide_displayed);

    let status = warp::path!("api" / "slideshows" / SlideshowId / "displays" / String / "status")
        .and(warp::get())
        .and(with_sessions(sessions.clone()))
        .and_then(session_status);

    let close = warp::path!("api" / "slideshows" / SlideshowId / "displays" / String)
        .and(warp::delete())
        .and(with_sessions(sessions))
        .and_then(close_session);

    let hide = warp::path!("api" / "slideshows" / SlideshowId / "hidden" / SubmissionId)
        .and(warp::put())
        .and(with_store(store.clone()))
        .and_then(hide_submission);

    let unhide = warp::path!("api" / "slideshows" / SlideshowId / "hidden" / SubmissionId)
        .and(warp::delete())
        .and(with_store(store))
        .and_then(unhide_submission);

    create
        .or(get)
        .or(slide)
        .or(displayed)
        .or(status)
        .or(close)
        .or(hide)
        .or(unhide)
}
