//! 核心数据模型定义

use crate::error::{FlowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

/// 科室
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    General,     // 普通门诊
    Emergency,   // 急诊
    Pediatrics,  // 儿科
    Cardiology,  // 心内科
    Orthopedics, // 骨科
    Neurology,   // 神经科
    Radiology,   // 放射科
}

impl Department {
    pub const ALL: [Department; 7] = [
        Department::General,
        Department::Emergency,
        Department::Pediatrics,
        Department::Cardiology,
        Department::Orthopedics,
        Department::Neurology,
        Department::Radiology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::General => "general",
            Department::Emergency => "emergency",
            Department::Pediatrics => "pediatrics",
            Department::Cardiology => "cardiology",
            Department::Orthopedics => "orthopedics",
            Department::Neurology => "neurology",
            Department::Radiology => "radiology",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 性别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// 优先级分层，声明顺序即紧急程度（Low最低）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,      // 低
    Medium,   // 中
    High,     // 高
    Critical, // 危重
}

impl Priority {
    /// 从最紧急到最不紧急
    pub const BY_URGENCY: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// 排序用的优先级分值
    pub fn score(&self) -> u32 {
        match self {
            Priority::Critical => 100,
            Priority::High => 75,
            Priority::Medium => 50,
            Priority::Low => 25,
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Priority::High | Priority::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 患者排队状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PatientStatus {
    Waiting,    // 候诊
    InProgress, // 就诊中
    Completed,  // 已完成
    Cancelled,  // 已取消
    NoShow,     // 未到诊
}

impl PatientStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PatientStatus::Completed | PatientStatus::Cancelled | PatientStatus::NoShow
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Waiting => "waiting",
            PatientStatus::InProgress => "in-progress",
            PatientStatus::Completed => "completed",
            PatientStatus::Cancelled => "cancelled",
            PatientStatus::NoShow => "no-show",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 患者所需资源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResourceTag {
    Doctor,
    Nurse,
    Lab,
    Imaging,
    Specialist,
}

impl ResourceTag {
    pub const ALL: [ResourceTag; 5] = [
        ResourceTag::Doctor,
        ResourceTag::Nurse,
        ResourceTag::Specialist,
        ResourceTag::Lab,
        ResourceTag::Imaging,
    ];

    /// 由人员提供的资源（其余为设备）
    pub fn is_staff(&self) -> bool {
        matches!(
            self,
            ResourceTag::Doctor | ResourceTag::Nurse | ResourceTag::Specialist
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceTag::Doctor => "doctor",
            ResourceTag::Nurse => "nurse",
            ResourceTag::Lab => "lab",
            ResourceTag::Imaging => "imaging",
            ResourceTag::Specialist => "specialist",
        }
    }
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 预计等待时间
///
/// 科室无在岗人员时无法给出数值，调用方需区别展示 `Unknown`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitEstimate {
    Minutes { minutes: u32 },
    Unknown { reason: String },
}

impl WaitEstimate {
    pub fn minutes(minutes: u32) -> Self {
        WaitEstimate::Minutes { minutes }
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        WaitEstimate::Unknown {
            reason: reason.into(),
        }
    }

    pub fn as_minutes(&self) -> Option<u32> {
        match self {
            WaitEstimate::Minutes { minutes } => Some(*minutes),
            WaitEstimate::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, WaitEstimate::Unknown { .. })
    }
}

impl Default for WaitEstimate {
    fn default() -> Self {
        WaitEstimate::unknown("尚未估算")
    }
}

/// 患者登记信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIntake {
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    pub gender: Gender,
    pub department: Department,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceTag>,
    #[serde(default)]
    pub priority_override: Option<Priority>,
}

impl PatientIntake {
    pub const MAX_AGE: i64 = 150;

    /// 校验登记信息，失败时不会创建任何患者记录
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() {
            return Err(FlowError::Validation("first_name 不能为空".to_string()));
        }
        if self.last_name.trim().is_empty() {
            return Err(FlowError::Validation("last_name 不能为空".to_string()));
        }
        if self.age <= 0 {
            return Err(FlowError::Validation(format!(
                "age 必须为正整数, 实际为 {}",
                self.age
            )));
        }
        if self.age > Self::MAX_AGE {
            return Err(FlowError::Validation(format!(
                "age 超出范围: {}",
                self.age
            )));
        }
        let has_symptom = self.symptoms.iter().any(|s| !s.trim().is_empty());
        if !has_symptom && self.priority_override.is_none() {
            return Err(FlowError::Validation(
                "至少需要一个症状或显式优先级".to_string(),
            ));
        }
        Ok(())
    }
}

/// 排队患者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub ticket: u64, // 登记序号，同一到达时间内的先后
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub gender: Gender,
    pub department: Department,
    pub symptoms: Vec<String>,
    pub priority: Priority,
    pub priority_overridden: bool,
    pub status: PatientStatus,
    pub arrival_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_wait: WaitEstimate,
    pub actual_wait_minutes: Option<i64>,
    pub actual_procedure_minutes: Option<i64>,
    pub resources: BTreeSet<ResourceTag>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// 由已校验的登记信息创建候诊患者
    pub fn from_intake(
        intake: PatientIntake,
        ticket: u64,
        priority: Priority,
        arrival_time: DateTime<Utc>,
    ) -> Self {
        let mut resources: BTreeSet<ResourceTag> = intake.resources.into_iter().collect();
        if resources.is_empty() {
            resources.insert(ResourceTag::Doctor);
        }

        let symptoms = intake
            .symptoms
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            id: Uuid::new_v4(),
            ticket,
            first_name: intake.first_name.trim().to_string(),
            last_name: intake.last_name.trim().to_string(),
            // validate() 已保证 0 < age <= MAX_AGE
            age: intake.age as u32,
            gender: intake.gender,
            department: intake.department,
            symptoms,
            priority,
            priority_overridden: intake.priority_override.is_some(),
            status: PatientStatus::Waiting,
            arrival_time,
            start_time: None,
            end_time: None,
            estimated_wait: WaitEstimate::default(),
            actual_wait_minutes: None,
            actual_procedure_minutes: None,
            resources,
            updated_at: arrival_time,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn requires(&self, resource: ResourceTag) -> bool {
        self.resources.contains(&resource)
    }

    /// 检查时间线与状态是否一致
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |detail: String| {
            Err(FlowError::InvariantViolation(format!(
                "patient {}: {}",
                self.id, detail
            )))
        };

        if let Some(start) = self.start_time {
            if start < self.arrival_time {
                return violation(format!(
                    "start_time {} 早于 arrival_time {}",
                    start, self.arrival_time
                ));
            }
        }

        if let Some(end) = self.end_time {
            let floor = self.start_time.unwrap_or(self.arrival_time);
            if end < floor {
                return violation(format!("end_time {} 早于 {}", end, floor));
            }
        }

        let shape_ok = match self.status {
            PatientStatus::Waiting => self.start_time.is_none() && self.end_time.is_none(),
            PatientStatus::InProgress => self.start_time.is_some() && self.end_time.is_none(),
            PatientStatus::Completed => self.start_time.is_some() && self.end_time.is_some(),
            PatientStatus::Cancelled => self.end_time.is_some(),
            PatientStatus::NoShow => self.start_time.is_none() && self.end_time.is_some(),
        };
        if !shape_ok {
            return violation(format!(
                "状态 {} 与时间戳不一致 (start={:?}, end={:?})",
                self.status, self.start_time, self.end_time
            ));
        }

        if matches!(self.actual_wait_minutes, Some(m) if m < 0) {
            return violation("actual_wait_minutes 为负数".to_string());
        }
        if matches!(self.actual_procedure_minutes, Some(m) if m < 0) {
            return violation("actual_procedure_minutes 为负数".to_string());
        }

        Ok(())
    }
}

/// 全院资源总量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityResources {
    pub doctors: u32,
    pub nurses: u32,
    pub specialists: u32,
    pub rooms: u32,
    pub beds: u32,
    pub lab_units: u32,
    pub imaging_units: u32,
}

impl FacilityResources {
    /// 某类资源的当前容量
    pub fn capacity(&self, resource: ResourceTag) -> u32 {
        match resource {
            ResourceTag::Doctor => self.doctors,
            ResourceTag::Nurse => self.nurses,
            ResourceTag::Specialist => self.specialists,
            ResourceTag::Lab => self.lab_units,
            ResourceTag::Imaging => self.imaging_units,
        }
    }
}

/// 科室在岗人员
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffAllocation {
    pub doctors: u32,
    pub nurses: u32,
    pub specialists: u32,
}

impl StaffAllocation {
    /// 人员类资源的在岗人数，设备类资源返回 None
    pub fn count(&self, role: ResourceTag) -> Option<u32> {
        match role {
            ResourceTag::Doctor => Some(self.doctors),
            ResourceTag::Nurse => Some(self.nurses),
            ResourceTag::Specialist => Some(self.specialists),
            ResourceTag::Lab | ResourceTag::Imaging => None,
        }
    }
}

/// 院区运行状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityState {
    pub resources: FacilityResources,
    pub department_staff: HashMap<Department, StaffAllocation>,
    pub department_loads: HashMap<Department, f64>,
    pub average_processing_minutes: HashMap<Department, f64>,
}

impl FacilityState {
    pub const DEFAULT_LOAD: f64 = 1.0;
    pub const DEFAULT_PROCESSING_MINUTES: f64 = 15.0;

    /// 科室负载系数，未配置时为 1.0
    pub fn department_load(&self, department: Department) -> f64 {
        self.department_loads
            .get(&department)
            .copied()
            .unwrap_or(Self::DEFAULT_LOAD)
    }

    pub fn processing_minutes(&self, department: Department) -> f64 {
        self.average_processing_minutes
            .get(&department)
            .copied()
            .unwrap_or(Self::DEFAULT_PROCESSING_MINUTES)
    }

    /// 科室在岗人员，未配置视为无人在岗
    pub fn staff(&self, department: Department) -> StaffAllocation {
        self.department_staff
            .get(&department)
            .copied()
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        for (department, load) in &self.department_loads {
            if !load.is_finite() || *load < 0.0 {
                return Err(FlowError::Validation(format!(
                    "科室 {} 负载系数无效: {}",
                    department, load
                )));
            }
        }
        for (department, minutes) in &self.average_processing_minutes {
            if !minutes.is_finite() || *minutes <= 0.0 {
                return Err(FlowError::Validation(format!(
                    "科室 {} 平均处理时长无效: {}",
                    department, minutes
                )));
            }
        }
        Ok(())
    }
}

impl Default for FacilityState {
    fn default() -> Self {
        let mut department_staff = HashMap::new();
        let mut department_loads = HashMap::new();
        let mut average_processing_minutes = HashMap::new();

        for department in Department::ALL {
            let (staff, load, minutes) = match department {
                Department::Emergency => (
                    StaffAllocation { doctors: 4, nurses: 6, specialists: 1 },
                    1.5,
                    25.0,
                ),
                Department::Cardiology => (
                    StaffAllocation { doctors: 2, nurses: 3, specialists: 1 },
                    1.2,
                    30.0,
                ),
                Department::General => (
                    StaffAllocation { doctors: 3, nurses: 3, specialists: 0 },
                    1.0,
                    15.0,
                ),
                _ => (
                    StaffAllocation { doctors: 2, nurses: 2, specialists: 1 },
                    1.0,
                    20.0,
                ),
            };
            department_staff.insert(department, staff);
            department_loads.insert(department, load);
            average_processing_minutes.insert(department, minutes);
        }

        Self {
            resources: FacilityResources {
                doctors: 17,
                nurses: 22,
                specialists: 6,
                rooms: 20,
                beds: 40,
                lab_units: 4,
                imaging_units: 3,
            },
            department_staff,
            department_loads,
            average_processing_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn intake() -> PatientIntake {
        PatientIntake {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            age: 36,
            gender: Gender::Female,
            department: Department::Cardiology,
            symptoms: vec!["chest pain".to_string()],
            resources: vec![],
            priority_override: None,
        }
    }

    #[test]
    fn test_priority_scores() {
        assert_eq!(Priority::Critical.score(), 100);
        assert_eq!(Priority::High.score(), 75);
        assert_eq!(Priority::Medium.score(), 50);
        assert_eq!(Priority::Low.score(), 25);
        assert!(Priority::Critical > Priority::Low);
    }

    #[test]
    fn test_intake_validation() {
        assert!(intake().validate().is_ok());

        let mut bad = intake();
        bad.age = 0;
        assert!(matches!(bad.validate(), Err(FlowError::Validation(_))));

        let mut bad = intake();
        bad.first_name = "   ".to_string();
        assert!(bad.validate().is_err());

        let mut bad = intake();
        bad.symptoms.clear();
        assert!(bad.validate().is_err());
        bad.priority_override = Some(Priority::High);
        assert!(bad.validate().is_ok());
    }

    #[test]
    fn test_from_intake_defaults_to_doctor() {
        let now = Utc::now();
        let patient = Patient::from_intake(intake(), 1, Priority::High, now);
        assert_eq!(patient.status, PatientStatus::Waiting);
        assert!(patient.requires(ResourceTag::Doctor));
        assert_eq!(patient.arrival_time, now);
        assert!(patient.start_time.is_none());
        assert!(!patient.priority_overridden);
        assert!(patient.check_invariants().is_ok());
    }

    #[test]
    fn test_invariant_end_before_start() {
        let now = Utc::now();
        let mut patient = Patient::from_intake(intake(), 1, Priority::High, now);
        patient.status = PatientStatus::Completed;
        patient.start_time = Some(now + Duration::minutes(10));
        patient.end_time = Some(now + Duration::minutes(5));
        assert!(matches!(
            patient.check_invariants(),
            Err(FlowError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&PatientStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let status: PatientStatus = serde_json::from_str("\"no-show\"").unwrap();
        assert_eq!(status, PatientStatus::NoShow);
    }

    #[test]
    fn test_wait_estimate_serialization() {
        let json = serde_json::to_value(WaitEstimate::minutes(12)).unwrap();
        assert_eq!(json["kind"], "minutes");
        assert_eq!(json["minutes"], 12);

        let json = serde_json::to_value(WaitEstimate::unknown("no staff")).unwrap();
        assert_eq!(json["kind"], "unknown");
    }

    #[test]
    fn test_facility_validation() {
        let mut facility = FacilityState::default();
        assert!(facility.validate().is_ok());
        facility.department_loads.insert(Department::General, -1.0);
        assert!(facility.validate().is_err());
    }
}
