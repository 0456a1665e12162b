pub mod error;
pub mod health;
pub mod server;
pub mod settings;
pub mod telemetry;

use dotenvy::dotenv;

use error::ObservabilityError;

pub type Result<T> = std::result::Result<T, ObservabilityError>;

pub use settings::{AppConfig, ObservabilityConfig};
pub use telemetry::Telemetry;

/// 初始化环境变量
pub fn init_env() {
    dotenv().ok();
}
