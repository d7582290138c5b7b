//! 队列排序
//!
//! 为活跃患者生成确定的候诊顺序

use flow_core::{Department, Patient, PatientStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 队列过滤器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueFilter {
    pub department: Option<Department>,
    pub status: Option<PatientStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueueFilter {
    pub fn for_department(department: Department) -> Self {
        Self {
            department: Some(department),
            ..Default::default()
        }
    }

    pub fn matches(&self, patient: &Patient) -> bool {
        if let Some(department) = self.department {
            if patient.department != department {
                return false;
            }
        }
        if let Some(status) = self.status {
            if patient.status != status {
                return false;
            }
        }
        true
    }
}

/// 队列排序器
///
/// 优先级分值降序，同分按到达时间升序，再按登记序号升序。
/// 排序只依赖输入集合本身，同一输入总是得到同一顺序。
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOrderer;

impl QueueOrderer {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(a: &Patient, b: &Patient) -> Ordering {
        b.priority
            .score()
            .cmp(&a.priority.score())
            .then_with(|| a.arrival_time.cmp(&b.arrival_time))
            .then_with(|| a.ticket.cmp(&b.ticket))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// 对候诊与就诊中的患者排序，终态患者被排除
    pub fn order<'a, I>(&self, patients: I) -> Vec<&'a Patient>
    where
        I: IntoIterator<Item = &'a Patient>,
    {
        let mut active: Vec<&Patient> = patients
            .into_iter()
            .filter(|patient| patient.status.is_active())
            .collect();
        active.sort_by(|a, b| Self::compare(a, b));
        active
    }
}
