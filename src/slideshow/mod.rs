//! Slideshow playback engine: aspect-ratio classification, playlist
//! generation and the three-slot playback scheduler.

pub mod classifier;
pub mod playlist;
pub mod registry;
pub mod session;

pub use classifier::{classify, Bucket, Classifier};
pub use playlist::{AspectRatio, Buckets, Playlist, PlaylistBuilder, Slide, SlideKind, SlideLayout};
pub use registry::SlideshowSessions;
pub use session::{PlaybackState, SessionStatus, SlideshowSession, SlotId};
