//! 患者记录存储
//!
//! 持久化由外部存储负责，这里定义存储接口并提供内存实现

use async_trait::async_trait;
use flow_core::{FlowError, Patient, PatientStatus, Result, WaitEstimate};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 患者记录存储接口
///
/// `update_with` 必须对同一患者串行执行：闭包在持有写权限期间运行，
/// 闭包返回错误时记录保持原样。
#[async_trait]
pub trait PatientRepository: Send + Sync {
    /// 新增患者
    async fn insert(&self, patient: Patient) -> Result<()>;

    /// 按 id 查询患者
    async fn get(&self, id: Uuid) -> Result<Option<Patient>>;

    /// 所有患者的一致快照，按登记序号排列
    async fn list(&self) -> Result<Vec<Patient>>;

    /// 原子地修改单个患者并返回修改后的记录
    async fn update_with(
        &self,
        id: Uuid,
        apply: &(dyn for<'p> Fn(&'p mut Patient) -> Result<()> + Send + Sync),
    ) -> Result<Patient>;

    /// 批量写入预计等待时间，返回写入数量
    ///
    /// 每个估算附带计算时患者所处的状态，只有当前状态与之相同的记录才会写入。
    async fn update_estimates(
        &self,
        estimates: &HashMap<Uuid, (PatientStatus, WaitEstimate)>,
    ) -> Result<usize>;
}

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    patients: RwLock<HashMap<Uuid, Patient>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.patients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.patients.read().await.is_empty()
    }
}

#[async_trait]
impl PatientRepository for InMemoryPatientStore {
    async fn insert(&self, patient: Patient) -> Result<()> {
        let mut patients = self.patients.write().await;
        if patients.contains_key(&patient.id) {
            return Err(FlowError::Internal(format!(
                "Patient {} already exists",
                patient.id
            )));
        }
        tracing::debug!("Stored patient {} (ticket {})", patient.id, patient.ticket);
        patients.insert(patient.id, patient);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Patient>> {
        Ok(self.patients.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Patient>> {
        let patients = self.patients.read().await;
        let mut all: Vec<Patient> = patients.values().cloned().collect();
        all.sort_by_key(|p| p.ticket);
        Ok(all)
    }

    async fn update_with(
        &self,
        id: Uuid,
        apply: &(dyn for<'p> Fn(&'p mut Patient) -> Result<()> + Send + Sync),
    ) -> Result<Patient> {
        let mut patients = self.patients.write().await;
        let current = patients
            .get_mut(&id)
            .ok_or_else(|| FlowError::NotFound(format!("Patient {} not found", id)))?;

        // 在副本上修改，成功后才写回
        let mut draft = current.clone();
        apply(&mut draft)?;
        *current = draft.clone();
        Ok(draft)
    }

    async fn update_estimates(
        &self,
        estimates: &HashMap<Uuid, (PatientStatus, WaitEstimate)>,
    ) -> Result<usize> {
        let mut patients = self.patients.write().await;
        let mut written = 0;
        for (id, (computed_for, estimate)) in estimates {
            match patients.get_mut(id) {
                Some(patient) if patient.status == *computed_for && patient.status.is_active() => {
                    patient.estimated_wait = estimate.clone();
                    written += 1;
                }
                Some(patient) => tracing::debug!(
                    "Skipped stale estimate for patient {} ({} -> {})",
                    id,
                    computed_for,
                    patient.status
                ),
                None => {}
            }
        }
        Ok(written)
    }
}
