use lazy_static::lazy_static;
use std::env;
use std::path::PathBuf;
use std::sync::RwLock;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Process-level configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// RTSP control listener address.
    pub rtsp_addr: String,
    /// HTTP manifest listener address.
    pub http_addr: String,
    /// Overrides the default exe-adjacent media directory when set.
    pub media_dir: Option<PathBuf>,
}

impl Config {
    fn new() -> Self {
        // Defaults serve the LAN-only use case out of the box.
        let mut config = Config {
            rtsp_addr: String::from("localhost:8554"),
            http_addr: String::from("localhost:8080"),
            media_dir: None,
        };

        if let Ok(addr) = env::var("PICAST_RTSP_ADDR") {
            config.rtsp_addr = addr;
        }
        if let Ok(addr) = env::var("PICAST_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Ok(dir) = env::var("PICAST_MEDIA_DIR") {
            if !dir.is_empty() {
                config.media_dir = Some(PathBuf::from(dir));
            }
        }

        config
    }

    /// Re-reads configuration from the environment.
    pub fn reload() {
        let new_config = Config::new();
        if let Ok(mut config) = CONFIG.write() {
            *config = new_config;
        }
    }
}

/// Returns the RTSP listener address from configuration.
pub fn rtsp_addr() -> String {
    CONFIG.read().unwrap().rtsp_addr.clone()
}

/// Returns the HTTP listener address from configuration.
pub fn http_addr() -> String {
    CONFIG.read().unwrap().http_addr.clone()
}

/// Returns the configured media directory override, if any.
pub fn media_dir_override() -> Option<PathBuf> {
    CONFIG.read().unwrap().media_dir.clone()
}
