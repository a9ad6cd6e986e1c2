use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SlideshowConfig {
    pub display_duration_ms: u64,
    /// Upper bound on slides per playlist generation. `None` means uncapped.
    pub target_slides: Option<usize>,
    /// Upper bound on candidates fetched per rebuild. `None` means unlimited.
    pub candidate_limit: Option<u32>,
    pub square_tolerance: f64,
    pub rebuild_timeout: Duration,
    pub retry_interval: Duration,
    pub session_idle: Duration,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            display_duration_ms: 8000,
            target_slides: Some(30),
            candidate_limit: Some(600),
            square_tolerance: 1.2,
            rebuild_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(15),
            session_idle: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub db_path: String,
    pub max_connections: u32,
    pub slideshow: SlideshowConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let target_slides: usize = env::var("SNAPWALL_TARGET_SLIDES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;
        let candidate_limit: u32 = env::var("SNAPWALL_CANDIDATE_LIMIT")
            .unwrap_or_else(|_| "600".to_string())
            .parse()?;

        Ok(Config {
            port: env::var("SNAPWALL_PORT")
                .unwrap_or_else(|_| "18480".to_string())
                .parse()?,
            host: env::var("SNAPWALL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            db_path: env::var("SNAPWALL_DB_PATH")
                .unwrap_or_else(|_| "./data/database/snapwall.db".to_string()),
            max_connections: env::var("SNAPWALL_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "16".to_string())
                .parse()?,
            slideshow: SlideshowConfig {
                display_duration_ms: env::var("SNAPWALL_DISPLAY_DURATION_MS")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                // 0 disables the cap
                target_slides: (target_slides > 0).then_some(target_slides),
                candidate_limit: (candidate_limit > 0).then_some(candidate_limit),
                square_tolerance: env::var("SNAPWALL_SQUARE_TOLERANCE")
                    .unwrap_or_else(|_| "1.2".to_string())
                    .parse()?,
                rebuild_timeout: Duration::from_secs(
                    env::var("SNAPWALL_REBUILD_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "10".to_string())
                        .parse()?,
                ),
                retry_interval: Duration::from_secs(
                    env::var("SNAPWALL_RETRY_INTERVAL_SECS")
                        .unwrap_or_else(|_| "15".to_string())
                        .parse()?,
                ),
                session_idle: Duration::from_secs(
                    env::var("SNAPWALL_SESSION_IDLE_SECS")
                        .unwrap_or_else(|_| "900".to_string())
                        .parse()?,
                ),
            },
        })
    }
}
