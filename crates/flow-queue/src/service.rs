//! 队列服务
//!
//! 协调状态机、优先级分类、等待估算、队列排序与资源建议的统一入口

use crate::{
    advisor::{AdvisorConfig, ResourceAdvisor, ResourceRecommendation},
    classifier::{Classification, PriorityClassifier, SymptomPriorityTable},
    estimator::{EstimatorConfig, WaitTimeEstimator},
    ordering::{QueueFilter, QueueOrderer},
    repository::PatientRepository,
    state_machine::PatientStateMachine,
    stats::QueueStats,
};
use chrono::{DateTime, Utc};
use flow_core::{
    Department, FacilityState, FlowError, Patient, PatientIntake, PatientStatus, Priority, Result,
    WaitEstimate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 分页限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

/// 队列服务参数
#[derive(Debug, Clone, Default)]
pub struct QueueSettings {
    pub facility: FacilityState,
    pub symptom_table: SymptomPriorityTable,
    pub estimator: EstimatorConfig,
    pub advisor: AdvisorConfig,
    pub page_limits: PageLimits,
}

/// 队列中的一项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// 从 1 开始的位置
    pub position: usize,
    pub priority_score: u32,
    pub patient: Patient,
}

/// 队列快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub generated_at: DateTime<Utc>,
    pub department: Option<Department>,
    pub total_waiting: usize,
    pub total_in_progress: usize,
    pub entries: Vec<QueueEntry>,
}

/// 队列服务
///
/// 所有修改都经由存储的 `update_with` 串行执行，排序与估算每次从当前状态重新推导。
pub struct QueueService {
    repository: Arc<dyn PatientRepository>,
    facility: RwLock<FacilityState>,
    state_machine: PatientStateMachine,
    classifier: PriorityClassifier,
    estimator: WaitTimeEstimator,
    orderer: QueueOrderer,
    advisor: ResourceAdvisor,
    page_limits: PageLimits,
    next_ticket: AtomicU64,
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("classifier_version", &self.classifier.table().version)
            .field("page_limits", &self.page_limits)
            .field("next_ticket", &self.next_ticket.load(Ordering::Relaxed))
            .finish()
    }
}

impl QueueService {
    /// 创建队列服务，登记序号从存储中已有的最大值之后继续
    pub async fn new(repository: Arc<dyn PatientRepository>, settings: QueueSettings) -> Result<Self> {
        settings.facility.validate()?;
        settings.symptom_table.validate()?;
        settings.estimator.validate()?;
        settings.advisor.validate()?;

        let last_ticket = repository
            .list()
            .await?
            .iter()
            .map(|p| p.ticket)
            .max()
            .unwrap_or(0);

        tracing::info!(
            "Queue service ready (symptom table {}, next ticket {})",
            settings.symptom_table.version,
            last_ticket + 1
        );

        Ok(Self {
            repository,
            facility: RwLock::new(settings.facility),
            state_machine: PatientStateMachine::new(),
            classifier: PriorityClassifier::new(settings.symptom_table),
            estimator: WaitTimeEstimator::new(settings.estimator),
            orderer: QueueOrderer::new(),
            advisor: ResourceAdvisor::new(settings.advisor),
            page_limits: settings.page_limits,
            next_ticket: AtomicU64::new(last_ticket + 1),
        })
    }

    /// 登记新患者
    pub async fn add_patient(&self, intake: PatientIntake) -> Result<Patient> {
        self.add_patient_at(intake, Utc::now()).await
    }

    pub async fn add_patient_at(&self, intake: PatientIntake, now: DateTime<Utc>) -> Result<Patient> {
        intake.validate()?;

        let classification =
            self.classifier
                .classify(intake.department, &intake.symptoms, intake.priority_override);
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let patient = Patient::from_intake(intake, ticket, classification.priority, now);
        let patient_id = patient.id;

        tracing::info!(
            "Admitting patient {} (ticket {}) to {} with priority {:?} via {:?}",
            patient_id,
            ticket,
            patient.department,
            classification.priority,
            classification.source
        );

        self.repository.insert(patient.clone()).await?;
        self.refresh_after_commit(patient).await
    }

    /// 查询患者
    pub async fn get_patient(&self, patient_id: Uuid) -> Result<Patient> {
        self.repository
            .get(patient_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("Patient {} not found", patient_id)))
    }

    /// 变更患者状态
    pub async fn change_status(&self, patient_id: Uuid, status: PatientStatus) -> Result<Patient> {
        self.change_status_at(patient_id, status, Utc::now()).await
    }

    pub async fn change_status_at(
        &self,
        patient_id: Uuid,
        status: PatientStatus,
        now: DateTime<Utc>,
    ) -> Result<Patient> {
        let result = self
            .repository
            .update_with(patient_id, &|patient| self.state_machine.apply(patient, status, now))
            .await;

        match &result {
            Ok(patient) => tracing::info!(
                "Patient {} moved to {} (wait {:?} min, procedure {:?} min)",
                patient_id,
                patient.status,
                patient.actual_wait_minutes,
                patient.actual_procedure_minutes
            ),
            Err(e @ FlowError::InvalidTransition { .. }) => {
                tracing::warn!("Rejected transition for patient {}: {}", patient_id, e)
            }
            Err(e @ FlowError::InvariantViolation(_)) => {
                tracing::error!("Invariant violated for patient {}: {}", patient_id, e)
            }
            Err(_) => {}
        }

        self.refresh_after_commit(result?).await
    }

    /// 调整优先级
    ///
    /// 指定优先级时作为显式覆盖；为空时按已记录的症状重新分类。
    pub async fn reprioritize(&self, patient_id: Uuid, priority: Option<Priority>) -> Result<Patient> {
        let now = Utc::now();
        let patient = self
            .repository
            .update_with(patient_id, &|patient| {
                if patient.status.is_terminal() {
                    return Err(FlowError::InvalidTransition {
                        from: patient.status.to_string(),
                        to: patient.status.to_string(),
                        reason: "终态患者不可调整优先级".to_string(),
                    });
                }
                let classification = self.classify_patient(patient, priority);
                patient.priority = classification.priority;
                patient.priority_overridden = priority.is_some();
                patient.updated_at = now;
                Ok(())
            })
            .await?;

        tracing::info!("Patient {} reprioritized to {:?}", patient_id, patient.priority);

        self.refresh_after_commit(patient).await
    }

    /// 患者当前的分类详情
    pub fn classify_patient(&self, patient: &Patient, priority: Option<Priority>) -> Classification {
        self.classifier
            .classify(patient.department, &patient.symptoms, priority)
    }

    /// 获取队列快照
    pub async fn get_queue_snapshot(&self, filter: &QueueFilter) -> Result<QueueSnapshot> {
        let facility = self.facility.read().await.clone();
        let patients = self.repository.list().await?;

        for patient in patients.iter().filter(|p| p.status.is_active()) {
            if let Err(e) = patient.check_invariants() {
                tracing::error!("Queue snapshot aborted: {}", e);
                return Err(e);
            }
        }

        let estimates = self.compute_estimates(&patients, &facility);
        let ordered: Vec<&Patient> = self
            .orderer
            .order(&patients)
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect();

        let total_waiting = ordered
            .iter()
            .filter(|p| p.status == PatientStatus::Waiting)
            .count();
        let total_in_progress = ordered.len() - total_waiting;

        let offset = filter.offset.unwrap_or(0);
        let limit = filter
            .limit
            .unwrap_or(self.page_limits.default_page_size)
            .min(self.page_limits.max_page_size);

        let entries = ordered
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(index, patient)| {
                let mut patient = patient.clone();
                if let Some((_, estimate)) = estimates.get(&patient.id) {
                    patient.estimated_wait = estimate.clone();
                }
                QueueEntry {
                    position: index + 1,
                    priority_score: patient.priority.score(),
                    patient,
                }
            })
            .collect();

        Ok(QueueSnapshot {
            generated_at: Utc::now(),
            department: filter.department,
            total_waiting,
            total_in_progress,
            entries,
        })
    }

    /// 获取资源配置建议
    pub async fn get_facility_recommendations(&self) -> Result<ResourceRecommendation> {
        let facility = self.facility.read().await.clone();
        let patients = self.repository.list().await?;

        let estimates = self.compute_estimates(&patients, &facility);
        let waiting_minutes: Vec<u32> = patients
            .iter()
            .filter(|p| p.status == PatientStatus::Waiting)
            .filter_map(|p| estimates.get(&p.id).and_then(|(_, e)| e.as_minutes()))
            .collect();

        Ok(self
            .advisor
            .recommend(&patients, &facility, &waiting_minutes, Utc::now()))
    }

    /// 获取统计
    pub async fn get_stats(&self) -> Result<QueueStats> {
        self.get_stats_at(Utc::now()).await
    }

    pub async fn get_stats_at(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let patients = self.repository.list().await?;
        QueueStats::compute(&patients, now).map_err(|e| {
            tracing::error!("Stats computation aborted: {}", e);
            e
        })
    }

    /// 当前院区状态
    pub async fn facility_state(&self) -> FacilityState {
        self.facility.read().await.clone()
    }

    /// 更新院区状态
    pub async fn update_facility_state(&self, state: FacilityState) -> Result<FacilityState> {
        state.validate()?;
        {
            let mut facility = self.facility.write().await;
            *facility = state.clone();
        }

        tracing::info!(
            "Facility state updated: {} doctors, {} nurses, {} rooms",
            state.resources.doctors,
            state.resources.nurses,
            state.resources.rooms
        );

        if let Err(e) = self.refresh_estimates().await {
            tracing::error!("Estimate refresh failed after facility update: {}", e);
        }
        Ok(state)
    }

    /// 重新计算并写回所有活跃患者的预计等待
    pub async fn refresh_estimates(&self) -> Result<usize> {
        let facility = self.facility.read().await.clone();
        let patients = self.repository.list().await?;
        let estimates = self.compute_estimates(&patients, &facility);
        let written = self.repository.update_estimates(&estimates).await?;
        tracing::debug!("Refreshed {} wait estimates", written);
        Ok(written)
    }

    /// 患者的修改已经提交后刷新估算
    ///
    /// 刷新失败不影响已提交的修改，只记录日志并返回已提交的记录。
    async fn refresh_after_commit(&self, committed: Patient) -> Result<Patient> {
        if let Err(e) = self.refresh_estimates().await {
            tracing::error!(
                "Estimate refresh failed after update of patient {}: {}",
                committed.id,
                e
            );
            return Ok(committed);
        }
        self.get_patient(committed.id).await
    }

    /// 按患者当前状态计算估算，结果带上计算时的状态
    fn compute_estimates(
        &self,
        patients: &[Patient],
        facility: &FacilityState,
    ) -> HashMap<Uuid, (PatientStatus, WaitEstimate)> {
        let recommended = self.advisor.recommended_department_staff(patients, facility);

        patients
            .iter()
            .filter_map(|patient| {
                let estimate = match patient.status {
                    PatientStatus::Waiting => self.estimator.estimate(
                        patient,
                        facility,
                        &recommended
                            .get(&patient.department)
                            .copied()
                            .unwrap_or_default(),
                    ),
                    PatientStatus::InProgress => WaitEstimate::minutes(0),
                    _ => return None,
                };
                Some((patient.id, (patient.status, estimate)))
            })
            .collect()
    }

    /// 获取状态机实例
    pub fn state_machine(&self) -> &PatientStateMachine {
        &self.state_machine
    }

    /// 获取分类器实例
    pub fn classifier(&self) -> &PriorityClassifier {
        &self.classifier
    }

    /// 获取估算器实例
    pub fn estimator(&self) -> &WaitTimeEstimator {
        &self.estimator
    }
}
