//! # Patient Flow Core
//!
//! 患者流转系统的核心模块，提供排队患者数据模型、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{FlowError, Result};
pub use models::*;
