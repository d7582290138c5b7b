//! 错误定义模块

use thiserror::Error;

/// 患者流转系统统一错误类型
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态转换: 从 {from} 到 {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// 内部不变量被破坏，说明上游存在缺陷
    #[error("内部不变量违例: {0}")]
    InvariantViolation(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl FlowError {
    /// 可由调用方直接展示给用户的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FlowError::Validation(_) | FlowError::InvalidTransition { .. } | FlowError::NotFound(_)
        )
    }
}

/// 患者流转系统统一结果类型
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(FlowError::Validation("age".into()).is_recoverable());
        assert!(FlowError::NotFound("p".into()).is_recoverable());
        assert!(FlowError::InvalidTransition {
            from: "completed".into(),
            to: "waiting".into(),
            reason: "terminal".into(),
        }
        .is_recoverable());
        assert!(!FlowError::InvariantViolation("end before start".into()).is_recoverable());
        assert!(!FlowError::Internal("boom".into()).is_recoverable());
        assert!(!FlowError::Config("bad jitter".into()).is_recoverable());
    }

    #[test]
    fn test_transition_message_names_both_states() {
        let err = FlowError::InvalidTransition {
            from: "in-progress".into(),
            to: "waiting".into(),
            reason: "no edge".into(),
        };
        let message = err.to_string();
        assert!(message.contains("in-progress"));
        assert!(message.contains("waiting"));
    }
}
