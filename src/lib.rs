pub mod config;
pub mod db_pool;
pub mod db_schema;
pub mod db_types;
pub mod handlers_health;
pub mod handlers_slideshow;
pub mod handlers_submission;
pub mod maintenance;
pub mod slideshow;
pub mod submission_store;
pub mod warp_helpers;
