//! Registry configuration
//!
//! Values here are resolved when a stream is registered and never mutated by
//! the registry. Loading them from a file is the embedding server's job; the
//! structs derive `Deserialize` so any serde format works.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pool::PoolConfig;
use crate::sink::SinkKind;

/// Invalid configuration value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("application name cannot be empty (applications[{0}])")]
    EmptyAppName(usize),
    #[error("gop_num must be at least 1")]
    ZeroGopNum,
    #[error("sink_queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("sink_write_timeout must be non-zero")]
    ZeroWriteTimeout,
}

/// Per-application enable flags
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Application {
    /// Application name, the first path segment of a stream key
    #[serde(alias = "appname")]
    pub name: String,
    /// Accept publishers and players
    pub live: bool,
    /// Allow HLS segmenters to attach
    pub hls: bool,
    /// Allow HTTP-FLV / RTMP relay writers to attach
    pub flv: bool,
    /// Allow control-plane taps to attach
    pub api: bool,
}

impl Default for Application {
    fn default() -> Self {
        Self {
            name: "live".to_string(),
            live: true,
            hls: true,
            flv: true,
            api: true,
        }
    }
}

impl Application {
    /// Create an application with every feature enabled
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check whether a sink of this kind may attach
    pub fn permits(&self, kind: SinkKind) -> bool {
        self.live
            && match kind {
                SinkKind::Player => true,
                SinkKind::Segmenter => self.hls,
                SinkKind::Relay => self.flv,
                SinkKind::Tap => self.api,
            }
    }
}

/// Registry configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of GOPs retained for late joiners
    pub gop_num: usize,

    /// Optional byte ceiling for each stream's GOP cache
    ///
    /// Off by default: a ceiling smaller than a real GOP leaves late joiners
    /// without a keyframe until the next one arrives.
    pub max_gop_bytes: Option<usize>,

    /// Packets queued per sink before it is dropped as too slow
    pub sink_queue_capacity: usize,

    /// Longest a single sink write may take
    pub sink_write_timeout: Duration,

    /// Per-stream payload buffer pool
    pub pool: PoolConfig,

    /// Applications that may be published to
    pub applications: Vec<Application>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            gop_num: 1,
            max_gop_bytes: None,
            sink_queue_capacity: 1024,
            sink_write_timeout: Duration::from_secs(10),
            pool: PoolConfig::default(),
            applications: vec![Application::default()],
        }
    }
}

impl RegistryConfig {
    /// Set the number of retained GOPs
    pub fn gop_num(mut self, n: usize) -> Self {
        self.gop_num = n;
        self
    }

    /// Set the GOP cache byte ceiling
    pub fn max_gop_bytes(mut self, bytes: usize) -> Self {
        self.max_gop_bytes = Some(bytes);
        self
    }

    /// Set the per-sink queue capacity
    pub fn sink_queue_capacity(mut self, capacity: usize) -> Self {
        self.sink_queue_capacity = capacity;
        self
    }

    /// Set the sink write timeout
    pub fn sink_write_timeout(mut self, timeout: Duration) -> Self {
        self.sink_write_timeout = timeout;
        self
    }

    /// Set the buffer pool configuration
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Add (or replace) an application
    pub fn application(mut self, app: Application) -> Self {
        self.applications.retain(|a| a.name != app.name);
        self.applications.push(app);
        self
    }

    /// Look up an application by name
    pub fn find_application(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name == name)
    }

    /// Check whether streams may be published under `app`
    pub fn is_live(&self, app: &str) -> bool {
        self.find_application(app).is_some_and(|a| a.live)
    }

    /// Check every value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gop_num == 0 {
            return Err(ConfigError::ZeroGopNum);
        }
        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.sink_write_timeout.is_zero() {
            return Err(ConfigError::ZeroWriteTimeout);
        }
        if let Some(i) = self.applications.iter().position(|a| a.name.is_empty()) {
            return Err(ConfigError::EmptyAppName(i));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.gop_num, 1);
        assert_eq!(config.max_gop_bytes, None);
        assert_eq!(config.sink_write_timeout, Duration::from_secs(10));
        assert!(config.is_live("live"));
        assert!(!config.is_live("other"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .gop_num(3)
            .max_gop_bytes(1024)
            .sink_queue_capacity(16)
            .sink_write_timeout(Duration::from_millis(250));

        assert_eq!(config.gop_num, 3);
        assert_eq!(config.max_gop_bytes, Some(1024));
        assert_eq!(config.sink_queue_capacity, 16);
        assert_eq!(config.sink_write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_application_replaces_existing() {
        let config = RegistryConfig::default().application(Application {
            live: false,
            ..Application::new("live")
        });

        assert_eq!(config.applications.len(), 1);
        assert!(!config.is_live("live"));
    }

    #[test]
    fn test_application_permits() {
        let app = Application {
            hls: false,
            ..Application::new("live")
        };

        assert!(app.permits(SinkKind::Player));
        assert!(app.permits(SinkKind::Relay));
        assert!(!app.permits(SinkKind::Segmenter));

        let disabled = Application {
            live: false,
            ..Application::new("off")
        };
        assert!(!disabled.permits(SinkKind::Player));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            RegistryConfig::default().gop_num(0).validate(),
            Err(ConfigError::ZeroGopNum)
        ));
        assert!(matches!(
            RegistryConfig::default().sink_queue_capacity(0).validate(),
            Err(ConfigError::ZeroQueueCapacity)
        ));
        assert!(matches!(
            RegistryConfig::default()
                .application(Application::new(""))
                .validate(),
            Err(ConfigError::EmptyAppName(1))
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{
            "gop_num": 2,
            "applications": [{"appname": "live", "hls": false}, {"name": "vod", "live": false}],
            "pool": {"strategy": "recycling", "max_pooled_size": 65536}
        }"#;
        let config: RegistryConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.gop_num, 2);
        assert_eq!(config.sink_queue_capacity, 1024);
        assert!(config.is_live("live"));
        assert!(!config.find_application("live").unwrap().hls);
        assert!(!config.is_live("vod"));
        assert_eq!(config.pool.max_pooled_size, 65536);
    }
}
