//! 等待时间估算
//!
//! 预计等待 = 基准时长 × 抖动系数 × 科室负载 ÷ 资源可用系数

use flow_core::utils::seed_fraction;
use flow_core::{
    FacilityState, FlowError, Patient, Priority, ResourceTag, Result, StaffAllocation,
    WaitEstimate,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 各优先级的基准等待时长（分钟）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineWaitMinutes {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl BaselineWaitMinutes {
    pub fn get(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }
}

impl Default for BaselineWaitMinutes {
    fn default() -> Self {
        Self {
            low: 60.0,
            medium: 40.0,
            high: 20.0,
            critical: 5.0,
        }
    }
}

/// 估算参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub baseline: BaselineWaitMinutes,
    pub jitter_min: f64,
    pub jitter_max: f64,
    pub availability_min: f64,
    pub availability_max: f64,
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        let baselines_ok = Priority::BY_URGENCY
            .iter()
            .all(|p| self.baseline.get(*p).is_finite() && self.baseline.get(*p) > 0.0);
        if !baselines_ok {
            return Err(FlowError::Config("基准等待时长必须为正数".to_string()));
        }
        if !(self.jitter_min > 0.0 && self.jitter_min <= self.jitter_max) {
            return Err(FlowError::Config(format!(
                "抖动区间无效: [{}, {}]",
                self.jitter_min, self.jitter_max
            )));
        }
        if !(self.availability_min > 0.0 && self.availability_min <= self.availability_max) {
            return Err(FlowError::Config(format!(
                "资源可用系数区间无效: [{}, {}]",
                self.availability_min, self.availability_max
            )));
        }
        Ok(())
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            baseline: BaselineWaitMinutes::default(),
            jitter_min: 0.8,
            jitter_max: 1.2,
            availability_min: 0.5,
            availability_max: 2.0,
        }
    }
}

/// 等待时间估算器
#[derive(Debug, Clone, Default)]
pub struct WaitTimeEstimator {
    config: EstimatorConfig,
}

impl WaitTimeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// 以患者 id 为种子的抖动系数，落在 [jitter_min, jitter_max]
    pub fn jitter(&self, seed: &Uuid) -> f64 {
        let span = self.config.jitter_max - self.config.jitter_min;
        self.config.jitter_min + span * seed_fraction(seed)
    }

    /// 资源可用系数 = 在岗 ÷ 建议，限制在配置区间内
    pub fn availability_factor(&self, staffed: u32, recommended: u32) -> f64 {
        if recommended == 0 {
            return self.config.availability_max;
        }
        (staffed as f64 / recommended as f64)
            .clamp(self.config.availability_min, self.config.availability_max)
    }

    /// 估算候诊患者的等待时间
    ///
    /// `recommended` 为该科室的建议人员配置。患者所需的任一人员类资源在科室内
    /// 无人在岗时返回 `WaitEstimate::Unknown`。
    pub fn estimate(
        &self,
        patient: &Patient,
        facility: &FacilityState,
        recommended: &StaffAllocation,
    ) -> WaitEstimate {
        let mut roles: Vec<ResourceTag> = patient
            .resources
            .iter()
            .copied()
            .filter(ResourceTag::is_staff)
            .collect();
        if roles.is_empty() {
            roles.push(ResourceTag::Doctor);
        }

        let staff = facility.staff(patient.department);
        let mut staffed_total = 0u32;
        let mut recommended_total = 0u32;

        for role in roles {
            let staffed = staff.count(role).unwrap_or(0);
            if staffed == 0 {
                tracing::debug!(
                    "No {} staffed in {}, estimate for patient {} unknown",
                    role,
                    patient.department,
                    patient.id
                );
                return WaitEstimate::unknown(format!(
                    "{} 科室无在岗 {}",
                    patient.department, role
                ));
            }
            staffed_total = staffed_total.saturating_add(staffed);
            recommended_total = recommended_total.saturating_add(recommended.count(role).unwrap_or(0));
        }

        let baseline = self.config.baseline.get(patient.priority);
        let jitter = self.jitter(&patient.id);
        let load = facility.department_load(patient.department);
        let availability = self.availability_factor(staffed_total, recommended_total);

        let minutes = (baseline * jitter * load / availability).round();
        WaitEstimate::minutes(minutes.max(0.0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flow_core::{Department, Gender, PatientIntake};
    use proptest::prelude::*;

    fn patient(department: Department, priority: Priority, resources: Vec<ResourceTag>) -> Patient {
        let intake = PatientIntake {
            first_name: "Alan".to_string(),
            last_name: "Turing".to_string(),
            age: 41,
            gender: Gender::Male,
            department,
            symptoms: vec!["chest pain".to_string()],
            resources,
            priority_override: None,
        };
        Patient::from_intake(intake, 1, priority, Utc::now())
    }

    fn one_doctor() -> StaffAllocation {
        StaffAllocation {
            doctors: 1,
            nurses: 0,
            specialists: 0,
        }
    }

    #[test]
    fn test_zero_doctors_is_unknown() {
        let estimator = WaitTimeEstimator::default();
        let mut facility = FacilityState::default();
        facility.department_staff.insert(
            Department::Cardiology,
            StaffAllocation {
                doctors: 0,
                nurses: 3,
                specialists: 1,
            },
        );

        let p = patient(Department::Cardiology, Priority::High, vec![ResourceTag::Doctor]);
        let estimate = estimator.estimate(&p, &facility, &one_doctor());
        assert!(estimate.is_unknown());
        assert_eq!(estimate.as_minutes(), None);
    }

    #[test]
    fn test_missing_department_staff_is_unknown() {
        let estimator = WaitTimeEstimator::default();
        let mut facility = FacilityState::default();
        facility.department_staff.remove(&Department::Neurology);

        let p = patient(Department::Neurology, Priority::Low, vec![]);
        assert!(estimator.estimate(&p, &facility, &one_doctor()).is_unknown());
    }

    #[test]
    fn test_formula() {
        let estimator = WaitTimeEstimator::default();
        let mut facility = FacilityState::default();
        facility.department_loads.insert(Department::General, 1.5);
        facility.department_staff.insert(Department::General, one_doctor());

        let p = patient(Department::General, Priority::Medium, vec![ResourceTag::Doctor]);
        let jitter = estimator.jitter(&p.id);
        // 在岗 1 / 建议 1 => 可用系数 1.0
        let expected = (40.0 * jitter * 1.5).round() as u32;
        assert_eq!(
            estimator.estimate(&p, &facility, &one_doctor()).as_minutes(),
            Some(expected)
        );
    }

    #[test]
    fn test_availability_clamp() {
        let estimator = WaitTimeEstimator::default();
        assert_eq!(estimator.availability_factor(10, 1), 2.0);
        assert_eq!(estimator.availability_factor(1, 10), 0.5);
        assert_eq!(estimator.availability_factor(3, 2), 1.5);
        assert_eq!(estimator.availability_factor(3, 0), 2.0);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let estimator = WaitTimeEstimator::default();
        let facility = FacilityState::default();
        let p = patient(Department::Emergency, Priority::Critical, vec![]);
        let first = estimator.estimate(&p, &facility, &one_doctor());
        let second = estimator.estimate(&p, &facility, &one_doctor());
        assert_eq!(first, second);
    }

    #[test]
    fn test_extreme_staff_counts_saturate() {
        let estimator = WaitTimeEstimator::default();
        let mut facility = FacilityState::default();
        facility.department_staff.insert(
            Department::General,
            StaffAllocation {
                doctors: u32::MAX,
                nurses: 5,
                specialists: 0,
            },
        );
        let recommended = StaffAllocation {
            doctors: u32::MAX,
            nurses: 1,
            specialists: 0,
        };

        let p = patient(
            Department::General,
            Priority::High,
            vec![ResourceTag::Doctor, ResourceTag::Nurse],
        );
        // 两项均饱和为 u32::MAX，可用系数为 1.0
        let jitter = estimator.jitter(&p.id);
        assert_eq!(
            estimator.estimate(&p, &facility, &recommended).as_minutes(),
            Some((20.0 * jitter).round() as u32)
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(EstimatorConfig::default().validate().is_ok());

        let mut config = EstimatorConfig::default();
        config.jitter_min = 1.5;
        assert!(config.validate().is_err());

        let mut config = EstimatorConfig::default();
        config.availability_min = 0.0;
        assert!(config.validate().is_err());

        let mut config = EstimatorConfig::default();
        config.baseline.critical = 0.0;
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_jitter_within_bounds(bytes in any::<[u8; 16]>()) {
            let estimator = WaitTimeEstimator::default();
            let jitter = estimator.jitter(&Uuid::from_bytes(bytes));
            prop_assert!((0.8..=1.2).contains(&jitter));
        }

        #[test]
        fn prop_estimate_bounded_and_non_negative(
            load in 0.0f64..5.0,
            doctors in 1u32..20,
            recommended in 0u32..20,
        ) {
            let estimator = WaitTimeEstimator::default();
            let mut facility = FacilityState::default();
            facility.department_loads.insert(Department::Orthopedics, load);
            facility.department_staff.insert(
                Department::Orthopedics,
                StaffAllocation { doctors, nurses: 0, specialists: 0 },
            );
            let p = patient(Department::Orthopedics, Priority::Low, vec![]);
            let recommended = StaffAllocation { doctors: recommended, nurses: 0, specialists: 0 };

            let minutes = estimator.estimate(&p, &facility, &recommended).as_minutes();
            prop_assert!(minutes.is_some());
            // 60 × 1.2 × load ÷ 0.5
            prop_assert!(minutes.unwrap() as f64 <= (60.0 * 1.2 * load / 0.5).ceil());
        }
    }
}
