//! # host-config
//!
//! TOML configuration loading and validation for the Nacos service host.
//!
//! ## Quick Start
//!
//! ```rust
//! use host_config::{parse_config_from_str, validate_config};
//!
//! let toml = r#"
//! [server]
//! host = "http://127.0.0.1:8848"
//! username = "nacos"
//! password = "nacos"
//! heartbeat_interval = 5
//!
//! [instance]
//! ip = "192.168.1.10"
//! port = 9000
//! weight = 100.0
//! timeout_threshold = 3000
//!
//! [health]
//! stat_window_size = 50
//! adjust_cool_down = 30
//!
//! [service.demo]
//! serviceName = "demo-service"
//! "#;
//!
//! let config = parse_config_from_str(toml).expect("valid config");
//! validate_config(&config).expect("validation passes");
//!
//! assert_eq!(config.instance.port, 9000);
//! assert_eq!(config.service.len(), 1);
//! ```
//!
//! ## Validation Rules
//!
//! - Base weight must be strictly positive
//! - The statistics window size must be at least 10 (component C requires
//!   10 samples before it will evaluate)
//! - The adjustment cooldown must be non-zero
//! - Every enabled service identifier must carry a non-empty `serviceName`

pub mod error;
pub mod parser;
pub mod types;
pub mod validator;

pub use error::{HostConfigError, Result};
pub use parser::{parse_config, parse_config_from_str};
pub use types::*;
pub use validator::validate_config;
