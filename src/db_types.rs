use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SubmissionId = i64;
pub type SlideshowId = i64;

/// Which submissions a slideshow draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SlideshowScope {
    Event(String),
    Partner(String),
}

impl SlideshowScope {
    pub fn kind(&self) -> &'static str {
        match self {
            SlideshowScope::Event(_) => "event",
            SlideshowScope::Partner(_) => "partner",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SlideshowScope::Event(id) | SlideshowScope::Partner(id) => id,
        }
    }

    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "event" => Some(SlideshowScope::Event(id)),
            "partner" => Some(SlideshowScope::Partner(id)),
            _ => None,
        }
    }
}

impl fmt::Display for SlideshowScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Slideshow {
    pub id: SlideshowId,
    pub name: String,
    pub scope: SlideshowScope,
    pub display_duration_ms: Option<u64>,
    pub target_slides: Option<usize>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SlideshowRow {
    pub id: i64,
    pub name: String,
    pub scope_kind: String,
    pub scope_id: String,
    pub display_duration_ms: Option<i64>,
    pub target_slides: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl SlideshowRow {
    pub(crate) fn into_slideshow(self) -> Option<Slideshow> {
        let scope = SlideshowScope::from_parts(&self.scope_kind, self.scope_id)?;
        Some(Slideshow {
            id: self.id,
            name: self.name,
            scope,
            display_duration_ms: self.display_duration_ms.and_then(|v| u64::try_from(v).ok()),
            target_slides: self.target_slides.and_then(|v| usize::try_from(v).ok()),
            created_at: self.created_at,
        })
    }
}

/// The subset of a submission the slideshow engine reads.
///
/// `play_count` is the counter of the slideshow the summary was queried for,
/// so fairness is tracked per display.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SubmissionSummary {
    pub id: SubmissionId,
    pub image_url: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub play_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Submission {
    pub id: SubmissionId,
    pub event_id: String,
    pub partner_id: String,
    pub image_url: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub hidden: bool,
    pub archived: bool,
    pub play_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubmission {
    pub event_id: String,
    pub partner_id: String,
    pub image_url: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSlideshow {
    pub name: String,
    pub scope: SlideshowScope,
    pub display_duration_ms: Option<u64>,
    pub target_slides: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisibilityUpdate {
    pub hidden: Option<bool>,
    pub archived: Option<bool>,
}
