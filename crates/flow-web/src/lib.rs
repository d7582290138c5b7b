//! # 患者流转 Web 接口
//!
//! 基于 axum 的 HTTP/JSON 接口，包装队列服务与运行指标

pub mod handlers;
pub mod server;

pub use handlers::{ApiError, AppState};
pub use server::WebServer;
