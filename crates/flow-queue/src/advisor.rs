//! 资源配置建议
//!
//! 根据活跃患者与院区状态给出人员、设备配置建议及各科室分布

use chrono::{DateTime, Utc};
use flow_core::{
    Department, FacilityState, FlowError, Patient, PatientStatus, ResourceTag, Result,
    StaffAllocation,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 成本常量，仅用于展示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// 每类资源每小时成本
    pub hourly_rates: BTreeMap<ResourceTag, f64>,
    pub shift_hours: f64,
    /// 患者每等待一分钟的成本
    pub cost_per_waiting_minute: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        let hourly_rates = [
            (ResourceTag::Doctor, 120.0),
            (ResourceTag::Nurse, 55.0),
            (ResourceTag::Specialist, 180.0),
            (ResourceTag::Lab, 40.0),
            (ResourceTag::Imaging, 90.0),
        ]
        .into_iter()
        .collect();

        Self {
            hourly_rates,
            shift_hours: 8.0,
            cost_per_waiting_minute: 2.5,
        }
    }
}

/// 建议参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// 每单位加权需求所需的资源数量
    pub staffing_factors: BTreeMap<ResourceTag, f64>,
    pub costs: CostConfig,
}

impl AdvisorConfig {
    pub fn factor(&self, resource: ResourceTag) -> f64 {
        self.staffing_factors.get(&resource).copied().unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<()> {
        for (resource, factor) in &self.staffing_factors {
            if !factor.is_finite() || *factor <= 0.0 {
                return Err(FlowError::Config(format!(
                    "资源 {} 的配置系数无效: {}",
                    resource, factor
                )));
            }
        }
        if !self.costs.shift_hours.is_finite() || self.costs.shift_hours <= 0.0 {
            return Err(FlowError::Config("班次时长必须为正数".to_string()));
        }
        Ok(())
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        let staffing_factors = [
            (ResourceTag::Doctor, 0.25),
            (ResourceTag::Nurse, 0.5),
            (ResourceTag::Specialist, 0.2),
            (ResourceTag::Lab, 0.2),
            (ResourceTag::Imaging, 0.15),
        ]
        .into_iter()
        .collect();

        Self {
            staffing_factors,
            costs: CostConfig::default(),
        }
    }
}

/// 单类资源的配置建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingRecommendation {
    pub resource: ResourceTag,
    pub demand_proxy: f64,
    pub current: u32,
    pub recommended: u32,
    pub delta: i64,
}

/// 科室分布
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentDistribution {
    pub department: Department,
    pub waiting: usize,
    pub in_progress: usize,
    pub load: f64,
    pub staffed_doctors: u32,
    pub recommended_doctors: u32,
    /// 清空当前候诊所需分钟数，无在岗医生时为空
    pub projected_clearance_minutes: Option<u32>,
}

/// 利用率统计类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Beds,
    Rooms,
    Equipment,
}

/// 利用率
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReading {
    pub category: ResourceCategory,
    pub assigned: u32,
    pub capacity: u32,
    /// 展示用，限制在 [0, 1]
    pub utilization: f64,
    pub over_capacity: bool,
    /// 未截断的原始比值，容量为 0 且有负载时为无穷大
    #[serde(skip)]
    pub raw_ratio: f64,
}

impl UtilizationReading {
    fn new(category: ResourceCategory, assigned: u32, capacity: u32) -> Self {
        let raw_ratio = match (assigned, capacity) {
            (0, _) => 0.0,
            (_, 0) => f64::INFINITY,
            (a, c) => a as f64 / c as f64,
        };
        Self {
            category,
            assigned,
            capacity,
            utilization: raw_ratio.clamp(0.0, 1.0),
            over_capacity: raw_ratio > 1.0,
            raw_ratio,
        }
    }
}

/// 超容量告警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityAlert {
    pub category: ResourceCategory,
    pub assigned: u32,
    pub capacity: u32,
    /// 容量为 0 时为空
    pub raw_ratio: Option<f64>,
    pub message: String,
}

/// 成本与回报估算，不参与建议计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostProjection {
    pub additional_staff_cost: f64,
    pub waiting_cost: f64,
    pub roi: Option<f64>,
}

/// 资源配置建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecommendation {
    pub generated_at: DateTime<Utc>,
    pub staffing: Vec<StaffingRecommendation>,
    pub departments: Vec<DepartmentDistribution>,
    pub utilization: Vec<UtilizationReading>,
    pub alerts: Vec<CapacityAlert>,
    pub cost: CostProjection,
}

/// 资源建议器
#[derive(Debug, Clone, Default)]
pub struct ResourceAdvisor {
    config: AdvisorConfig,
}

impl ResourceAdvisor {
    pub fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// 需求代理值：需要该资源的活跃患者数，按科室负载加权
    pub fn demand_proxy<'a, I>(&self, patients: I, facility: &FacilityState, resource: ResourceTag) -> f64
    where
        I: IntoIterator<Item = &'a Patient>,
    {
        patients
            .into_iter()
            .filter(|p| p.status.is_active() && p.requires(resource))
            .map(|p| facility.department_load(p.department))
            .sum()
    }

    /// 建议数量 = ceil(需求代理值 × 配置系数)
    pub fn recommended_count(&self, demand_proxy: f64, resource: ResourceTag) -> u32 {
        let value = (demand_proxy * self.config.factor(resource)).ceil();
        if value.is_finite() && value > 0.0 {
            value as u32
        } else {
            0
        }
    }

    /// 各科室建议的人员配置
    pub fn recommended_department_staff(
        &self,
        patients: &[Patient],
        facility: &FacilityState,
    ) -> HashMap<Department, StaffAllocation> {
        let mut by_department: HashMap<Department, Vec<&Patient>> = HashMap::new();
        for patient in patients.iter().filter(|p| p.status.is_active()) {
            by_department.entry(patient.department).or_default().push(patient);
        }

        by_department
            .into_iter()
            .map(|(department, members)| {
                let count = |role| {
                    self.recommended_count(
                        self.demand_proxy(members.iter().copied(), facility, role),
                        role,
                    )
                };
                let allocation = StaffAllocation {
                    doctors: count(ResourceTag::Doctor),
                    nurses: count(ResourceTag::Nurse),
                    specialists: count(ResourceTag::Specialist),
                };
                (department, allocation)
            })
            .collect()
    }

    /// 床位、诊室、设备利用率
    pub fn utilization(&self, patients: &[Patient], facility: &FacilityState) -> Vec<UtilizationReading> {
        let active = patients.iter().filter(|p| p.status.is_active()).count() as u32;
        let in_progress = patients
            .iter()
            .filter(|p| p.status == PatientStatus::InProgress)
            .count() as u32;
        let needs_equipment = patients
            .iter()
            .filter(|p| {
                p.status.is_active()
                    && (p.requires(ResourceTag::Lab) || p.requires(ResourceTag::Imaging))
            })
            .count() as u32;
        let equipment = facility
            .resources
            .lab_units
            .saturating_add(facility.resources.imaging_units);

        vec![
            UtilizationReading::new(ResourceCategory::Beds, active, facility.resources.beds),
            UtilizationReading::new(ResourceCategory::Rooms, in_progress, facility.resources.rooms),
            UtilizationReading::new(ResourceCategory::Equipment, needs_equipment, equipment),
        ]
    }

    /// 生成完整建议
    ///
    /// `waiting_minutes` 为候诊患者的数值型预计等待，仅用于成本展示。
    pub fn recommend(
        &self,
        patients: &[Patient],
        facility: &FacilityState,
        waiting_minutes: &[u32],
        now: DateTime<Utc>,
    ) -> ResourceRecommendation {
        let staffing: Vec<StaffingRecommendation> = ResourceTag::ALL
            .iter()
            .map(|resource| {
                let demand_proxy = self.demand_proxy(patients, facility, *resource);
                let recommended = self.recommended_count(demand_proxy, *resource);
                let current = facility.resources.capacity(*resource);
                StaffingRecommendation {
                    resource: *resource,
                    demand_proxy,
                    current,
                    recommended,
                    delta: recommended as i64 - current as i64,
                }
            })
            .collect();

        let recommended_staff = self.recommended_department_staff(patients, facility);
        let departments = Department::ALL
            .iter()
            .map(|department| {
                let waiting = patients
                    .iter()
                    .filter(|p| p.department == *department && p.status == PatientStatus::Waiting)
                    .count();
                let in_progress = patients
                    .iter()
                    .filter(|p| p.department == *department && p.status == PatientStatus::InProgress)
                    .count();
                let staffed_doctors = facility.staff(*department).doctors;
                let projected_clearance_minutes = (staffed_doctors > 0).then(|| {
                    let minutes = waiting as f64 * facility.processing_minutes(*department)
                        / staffed_doctors as f64;
                    minutes.ceil() as u32
                });

                DepartmentDistribution {
                    department: *department,
                    waiting,
                    in_progress,
                    load: facility.department_load(*department),
                    staffed_doctors,
                    recommended_doctors: recommended_staff
                        .get(department)
                        .map(|s| s.doctors)
                        .unwrap_or(0),
                    projected_clearance_minutes,
                }
            })
            .collect();

        let utilization = self.utilization(patients, facility);
        let alerts = capacity_alerts(&utilization);
        for alert in &alerts {
            tracing::warn!("Capacity alert: {}", alert.message);
        }

        let cost = self.cost_projection(&staffing, waiting_minutes);

        ResourceRecommendation {
            generated_at: now,
            staffing,
            departments,
            utilization,
            alerts,
            cost,
        }
    }

    /// 成本估算，只读取已经算好的建议结果
    pub fn cost_projection(
        &self,
        staffing: &[StaffingRecommendation],
        waiting_minutes: &[u32],
    ) -> CostProjection {
        let costs = &self.config.costs;
        let additional_staff_cost: f64 = staffing
            .iter()
            .filter(|s| s.delta > 0)
            .map(|s| {
                let rate = costs.hourly_rates.get(&s.resource).copied().unwrap_or(0.0);
                s.delta as f64 * rate * costs.shift_hours
            })
            .sum();
        let waiting_cost = waiting_minutes.iter().map(|m| *m as f64).sum::<f64>()
            * costs.cost_per_waiting_minute;
        let roi = (additional_staff_cost > 0.0)
            .then(|| (waiting_cost - additional_staff_cost) / additional_staff_cost);

        CostProjection {
            additional_staff_cost,
            waiting_cost,
            roi,
        }
    }
}

fn capacity_alerts(readings: &[UtilizationReading]) -> Vec<CapacityAlert> {
    readings
        .iter()
        .filter(|r| r.over_capacity)
        .map(|r| {
            let raw_ratio = r.raw_ratio.is_finite().then_some(r.raw_ratio);
            let message = match raw_ratio {
                Some(ratio) => format!(
                    "{:?} 超出容量: {} / {} ({:.0}%)",
                    r.category,
                    r.assigned,
                    r.capacity,
                    ratio * 100.0
                ),
                None => format!("{:?} 无可用容量, 当前负载 {}", r.category, r.assigned),
            };
            CapacityAlert {
                category: r.category,
                assigned: r.assigned,
                capacity: r.capacity,
                raw_ratio,
                message,
            }
        })
        .collect()
}
