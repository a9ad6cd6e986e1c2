use log::info;
use warp::{Filter, Rejection, Reply};

use crate::db_types::{NewSubmission, SubmissionId, VisibilityUpdate};
use crate::submission_store::SqliteSubmissionStore;
use crate::warp_helpers::{store_rejection, with_store};

/// Registers a photo that is already stored; the URL is served as is.
pub async fn create_submission(
    new: NewSubmission,
    store: SqliteSubmissionStore,
) -> Result<impl Reply, Rejection> {
    let submission = store
        .create_submission(&new)
        .await
        .map_err(store_rejection)?;
    info!(
        "Submission {} added to event {}",
        submission.id, submission.event_id
    );
    Ok(warp::reply::with_status(
        warp::reply::json(&submission),
        warp::http::StatusCode::CREATED,
    ))
}

pub async fn update_visibility(
    id: SubmissionId,
    update: VisibilityUpdate,
    store: SqliteSubmissionStore,
) -> Result<impl Reply, Rejection> {
    let submission = store
        .set_visibility(id, &update)
        .await
        .map_err(store_rejection)?;
    info!(
        "Submission {} visibility: hidden={}, archived={}",
        id, submission.hidden, submission.archived
    );
    Ok(warp::reply::json(&submission))
}

pub fn build_submission_routes(
    store: SqliteSubmissionStore,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let create = warp::path!("api" / "submissions")
        .and(warp::post())
        .and(warp::body::json::<NewSubmission>())
        .and(with_store(store.clone()))
        .and_then(create_submission);

    let visibility = warp::path!("api" / "submissions" / SubmissionId / "visibility")
        .and(warp::put())
        .and(warp::body::json::<VisibilityUpdate>())
        .and(with_store(store))
        .and_then(update_visibility);

    create.or(visibility)
}
