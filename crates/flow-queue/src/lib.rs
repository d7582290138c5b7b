//! # 患者排队模块
//!
//! 提供患者排队的完整业务逻辑，包括：
//! - 患者状态机：管理候诊、就诊与终态之间的转换
//! - 优先级分类：根据症状表推断患者优先级
//! - 等待时间估算：结合优先级、科室负载与人员配置
//! - 队列排序：按优先级与到达时间生成确定的候诊顺序
//! - 资源建议：根据当前负载给出人员与设备配置建议
//! - 队列服务：协调以上组件的统一入口

pub mod advisor;
pub mod classifier;
pub mod estimator;
pub mod ordering;
pub mod repository;
pub mod service;
pub mod state_machine;
pub mod stats;

// 重新导出主要类型
pub use advisor::{
    AdvisorConfig, CapacityAlert, CostConfig, CostProjection, DepartmentDistribution,
    ResourceAdvisor, ResourceCategory, ResourceRecommendation, StaffingRecommendation,
    UtilizationReading,
};
pub use classifier::{
    Classification, ClassificationSource, PriorityClassifier, SymptomPriorityTable, TierWeights,
};
pub use estimator::{BaselineWaitMinutes, EstimatorConfig, WaitTimeEstimator};
pub use ordering::{QueueFilter, QueueOrderer};
pub use repository::{InMemoryPatientStore, PatientRepository};
pub use service::{PageLimits, QueueEntry, QueueService, QueueSettings, QueueSnapshot};
pub use state_machine::{PatientStateMachine, TimelineEffect};
pub use stats::QueueStats;
