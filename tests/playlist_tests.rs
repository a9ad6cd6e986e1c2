use chrono::{TimeZone, Utc};
use std::collections::HashSet;

use snapwall::db_types::{SubmissionId, SubmissionSummary};
use snapwall::slideshow::*;

fn submission(id: SubmissionId, width: i64, height: i64, play_count: i64) -> SubmissionSummary {
    SubmissionSummary {
        id,
        image_url: format!("https://cdn.example.com/{}.jpg", id),
        width: Some(width),
        height: Some(height),
        play_count,
        created_at: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
            + chrono::Duration::minutes(id),
    }
}

fn builder() -> PlaylistBuilder {
    PlaylistBuilder::new(Classifier::default(), None)
}

#[test]
fn test_bucket_layouts() {
    let landscape = SlideLayout::for_bucket(Bucket::Landscape);
    assert_eq!(landscape.kind, SlideKind::Single);
    assert_eq!(landscape.aspect_ratio, AspectRatio::Wide);
    assert_eq!(landscape.group_size(), 1);

    let square = SlideLayout::for_bucket(Bucket::Square);
    assert_eq!(square.kind, SlideKind::Mosaic);
    assert_eq!(square.aspect_ratio, AspectRatio::Square);
    assert_eq!(square.group_size(), 6);

    let portrait = SlideLayout::for_bucket(Bucket::Portrait);
    assert_eq!(portrait.aspect_ratio, AspectRatio::Tall);
    assert_eq!(portrait.group_size(), 3);
}

#[test]
fn test_mixed_wall_rotates_slide_types() {
    let mut candidates = Vec::new();
    candidates.extend((1..=4).map(|id| submission(id, 4032, 3024, 0)));
    candidates.extend((10..22).map(|id| submission(id, 2000, 2000, 0)));
    candidates.extend((30..36).map(|id| submission(id, 1080, 1920, 0)));

    let playlist = builder().build_from(candidates, &HashSet::new());

    let ratios: Vec<AspectRatio> = playlist.slides().iter().map(|s| s.aspect_ratio).collect();
    assert_eq!(
        ratios,
        vec![
            AspectRatio::Wide,
            AspectRatio::Square,
            AspectRatio::Tall,
            AspectRatio::Wide,
            AspectRatio::Square,
            AspectRatio::Tall,
            AspectRatio::Wide,
            AspectRatio::Wide,
        ]
    );
    // every candidate is used exactly once
    assert_eq!(playlist.submission_ids().len(), 4 + 12 + 6);
}

#[test]
fn test_leftovers_smaller_than_a_mosaic_are_not_shown() {
    let mut candidates: Vec<_> = (1..=5).map(|id| submission(id, 1000, 1000, 0)).collect();
    candidates.push(submission(9, 1080, 1920, 0));
    candidates.push(submission(10, 1080, 1920, 0));

    let playlist = builder().build_from(candidates, &HashSet::new());
    assert!(playlist.is_empty());
}

#[test]
fn test_least_played_fill_mosaics_first() {
    let mut candidates: Vec<_> = (1..=4)
        .map(|id| submission(id, 1080, 1920, 3))
        .collect();
    candidates.extend((5..=7).map(|id| submission(id, 1080, 1920, 0)));

    let playlist = builder().build_from(candidates, &HashSet::new());
    assert_eq!(playlist.len(), 2);

    let first: Vec<SubmissionId> = playlist.get(0).unwrap().member_ids().collect();
    assert_eq!(first, vec![5, 6, 7]);
    let second: Vec<SubmissionId> = playlist.get(1).unwrap().member_ids().collect();
    assert_eq!(second, vec![1, 2, 3]);
}

#[test]
fn test_excluded_submissions_never_appear() {
    let candidates: Vec<_> = (1..=10).map(|id| submission(id, 1920, 1080, 0)).collect();
    let exclude: HashSet<SubmissionId> = [2, 4, 6].into_iter().collect();

    let playlist = builder().build_from(candidates, &exclude);
    assert_eq!(playlist.len(), 7);
    assert!(playlist.submission_ids().is_disjoint(&exclude));
}

#[test]
fn test_target_slides_cap() {
    let candidates: Vec<_> = (1..=50).map(|id| submission(id, 1920, 1080, 0)).collect();
    let playlist =
        PlaylistBuilder::new(Classifier::default(), Some(12)).build_from(candidates, &HashSet::new());
    assert_eq!(playlist.len(), 12);
}

#[test]
fn test_slide_json_shape() {
    let playlist = builder().build_from(vec![submission(1, 1920, 1080, 0)], &HashSet::new());
    let json = serde_json::to_value(playlist.get(0).unwrap().as_ref()).unwrap();

    assert_eq!(json["kind"], "single");
    assert_eq!(json["aspect_ratio"], "16:9");
    assert_eq!(json["members"][0]["id"], 1);
    assert_eq!(json["members"][0]["image_url"], "https://cdn.example.com/1.jpg");
}
