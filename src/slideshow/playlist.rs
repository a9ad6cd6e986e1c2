use log::debug;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::classifier::{Bucket, Classifier};
use crate::db_types::{SubmissionId, SubmissionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideKind {
    Single,
    Mosaic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Tall,
}

/// Slide layout produced from one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideLayout {
    pub kind: SlideKind,
    pub aspect_ratio: AspectRatio,
    pub columns: usize,
    pub rows: usize,
}

impl SlideLayout {
    pub fn for_bucket(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Landscape => SlideLayout {
                kind: SlideKind::Single,
                aspect_ratio: AspectRatio::Wide,
                columns: 1,
                rows: 1,
            },
            // 3x2 grid
            Bucket::Square => SlideLayout {
                kind: SlideKind::Mosaic,
                aspect_ratio: AspectRatio::Square,
                columns: 3,
                rows: 2,
            },
            // 1x3 row of tall images
            Bucket::Portrait => SlideLayout {
                kind: SlideKind::Mosaic,
                aspect_ratio: AspectRatio::Tall,
                columns: 3,
                rows: 1,
            },
        }
    }

    pub fn group_size(&self) -> usize {
        self.columns * self.rows
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slide {
    pub kind: SlideKind,
    pub aspect_ratio: AspectRatio,
    pub columns: usize,
    pub rows: usize,
    pub members: Vec<SubmissionSummary>,
}

impl Slide {
    fn new(layout: SlideLayout, members: Vec<SubmissionSummary>) -> Self {
        debug_assert_eq!(members.len(), layout.group_size());
        Self {
            kind: layout.kind,
            aspect_ratio: layout.aspect_ratio,
            columns: layout.columns,
            rows: layout.rows,
            members,
        }
    }

    pub fn member_ids(&self) -> impl Iterator<Item = SubmissionId> + '_ {
        self.members.iter().map(|m| m.id)
    }

    pub fn shares_member_with(&self, ids: &HashSet<SubmissionId>) -> bool {
        self.member_ids().any(|id| ids.contains(&id))
    }
}

/// One generation of slides for a rotation slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    slides: Vec<Arc<Slide>>,
}

impl Playlist {
    pub fn new(slides: Vec<Slide>) -> Self {
        Self {
            slides: slides.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Slide>> {
        self.slides.get(index)
    }

    pub fn slides(&self) -> &[Arc<Slide>] {
        &self.slides
    }

    pub fn submission_ids(&self) -> HashSet<SubmissionId> {
        self.slides.iter().flat_map(|s| s.member_ids()).collect()
    }

    pub fn contains_submission(&self, id: SubmissionId) -> bool {
        self.slides.iter().any(|s| s.member_ids().any(|m| m == id))
    }

    /// Drops every slide that shares a member with `ids`. Returns how many were dropped.
    ///
    /// Whole slides go; a mosaic never has holes.
    pub fn remove_overlapping(&mut self, ids: &HashSet<SubmissionId>) -> usize {
        let before = self.slides.len();
        self.slides.retain(|slide| !slide.shares_member_with(ids));
        before - self.slides.len()
    }
}

/// Eligible candidates partitioned by aspect-ratio bucket, each least played first.
#[derive(Debug, Clone, Default)]
pub struct Buckets {
    landscape: VecDeque<SubmissionSummary>,
    square: VecDeque<SubmissionSummary>,
    portrait: VecDeque<SubmissionSummary>,
}

impl Buckets {
    pub fn partition<I>(
        candidates: I,
        classifier: &Classifier,
        exclude: &HashSet<SubmissionId>,
    ) -> Self
    where
        I: IntoIterator<Item = SubmissionSummary>,
    {
        let mut landscape = Vec::new();
        let mut square = Vec::new();
        let mut portrait = Vec::new();
        let mut seen = HashSet::new();

        for candidate in candidates {
            if exclude.contains(&candidate.id) || !seen.insert(candidate.id) {
                continue;
            }
            match classifier.classify(candidate.width, candidate.height) {
                Bucket::Landscape => landscape.push(candidate),
                Bucket::Square => square.push(candidate),
                Bucket::Portrait => portrait.push(candidate),
            }
        }

        for bucket in [&mut landscape, &mut square, &mut portrait] {
            bucket.sort_by(|a, b| {
                a.play_count
                    .cmp(&b.play_count)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
        }

        Self {
            landscape: landscape.into(),
            square: square.into(),
            portrait: portrait.into(),
        }
    }

    fn remaining(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Landscape => self.landscape.len(),
            Bucket::Square => self.square.len(),
            Bucket::Portrait => self.portrait.len(),
        }
    }

    fn queue_mut(&mut self, bucket: Bucket) -> &mut VecDeque<SubmissionSummary> {
        match bucket {
            Bucket::Landscape => &mut self.landscape,
            Bucket::Square => &mut self.square,
            Bucket::Portrait => &mut self.portrait,
        }
    }

    /// Takes the next `count` least-played members of `bucket`, or nothing if
    /// fewer remain.
    fn take(&mut self, bucket: Bucket, count: usize) -> Option<Vec<SubmissionSummary>> {
        let queue = self.queue_mut(bucket);
        if queue.len() < count {
            return None;
        }
        Some(queue.drain(..count).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaylistBuilder {
    classifier: Classifier,
    max_slides: Option<usize>,
}

impl PlaylistBuilder {
    pub fn new(classifier: Classifier, max_slides: Option<usize>) -> Self {
        Self {
            classifier,
            max_slides,
        }
    }

    /// Partitions `candidates` (minus `exclude`) and builds one playlist.
    pub fn build_from<I>(&self, candidates: I, exclude: &HashSet<SubmissionId>) -> Playlist
    where
        I: IntoIterator<Item = SubmissionSummary>,
    {
        self.build(Buckets::partition(candidates, &self.classifier, exclude))
    }

    /// Round-robin over landscape single, square mosaic and portrait mosaic,
    /// skipping a type whose bucket cannot fill a whole slide, until nothing
    /// more can be built or `max_slides` is reached.
    pub fn build(&self, mut buckets: Buckets) -> Playlist {
        let cap = self.max_slides.unwrap_or(usize::MAX);
        let mut slides = Vec::new();

        'rounds: loop {
            let mut built_this_round = false;

            for bucket in Bucket::ALL {
                if slides.len() >= cap {
                    break 'rounds;
                }
                let layout = SlideLayout::for_bucket(bucket);
                if let Some(members) = buckets.take(bucket, layout.group_size()) {
                    slides.push(Slide::new(layout, members));
                    built_this_round = true;
                }
            }

            if !built_this_round {
                break;
            }
        }

        for bucket in Bucket::ALL {
            let left = buckets.remaining(bucket);
            if left > 0 {
                debug!("{} {} submissions left out of this playlist", left, bucket);
            }
        }

        Playlist::new(slides)
    }
}
