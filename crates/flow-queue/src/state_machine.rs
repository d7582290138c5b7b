//! 患者状态机
//!
//! 管理患者从候诊到终态的状态转换，并维护就诊时间线

use chrono::{DateTime, Utc};
use flow_core::utils::minutes_between;
use flow_core::{FlowError, Patient, PatientStatus, Result, WaitEstimate};
use std::collections::HashMap;

/// 状态转换对时间线的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEffect {
    /// 设置 start_time
    Start,
    /// 设置 end_time
    End,
}

/// 患者状态机
#[derive(Debug)]
pub struct PatientStateMachine {
    transitions: HashMap<(PatientStatus, PatientStatus), TimelineEffect>,
}

impl PatientStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((PatientStatus::Waiting, PatientStatus::InProgress), TimelineEffect::Start);
        transitions.insert((PatientStatus::InProgress, PatientStatus::Completed), TimelineEffect::End);
        transitions.insert((PatientStatus::Waiting, PatientStatus::Cancelled), TimelineEffect::End);
        transitions.insert((PatientStatus::InProgress, PatientStatus::Cancelled), TimelineEffect::End);
        transitions.insert((PatientStatus::Waiting, PatientStatus::NoShow), TimelineEffect::End);

        Self { transitions }
    }

    /// 检查状态转换是否存在
    pub fn can_transition(&self, from: PatientStatus, to: PatientStatus) -> bool {
        self.transitions.contains_key(&(from, to))
    }

    /// 查找状态转换对应的时间线影响
    pub fn transition(&self, from: PatientStatus, to: PatientStatus) -> Result<TimelineEffect> {
        if from.is_terminal() {
            return Err(rejected(from, to, "终态不允许任何转换"));
        }
        self.transitions
            .get(&(from, to))
            .copied()
            .ok_or_else(|| rejected(from, to, "不存在该状态转换"))
    }

    /// 对患者执行状态转换
    ///
    /// 所有检查先于任何写入，失败时患者记录保持不变。
    pub fn apply(&self, patient: &mut Patient, to: PatientStatus, now: DateTime<Utc>) -> Result<()> {
        let from = patient.status;
        let effect = self.transition(from, to)?;

        match effect {
            TimelineEffect::Start => {
                if patient.start_time.is_some() {
                    return Err(rejected(from, to, "start_time 已设置"));
                }
                if now < patient.arrival_time {
                    return Err(FlowError::InvariantViolation(format!(
                        "patient {}: 开始时间 {} 早于到达时间 {}",
                        patient.id, now, patient.arrival_time
                    )));
                }

                patient.start_time = Some(now);
                patient.actual_wait_minutes = Some(minutes_between(patient.arrival_time, now));
                patient.estimated_wait = WaitEstimate::minutes(0);
            }
            TimelineEffect::End => {
                if patient.end_time.is_some() {
                    return Err(rejected(from, to, "end_time 已设置"));
                }
                if to == PatientStatus::Completed && patient.start_time.is_none() {
                    return Err(rejected(from, to, "start_time 未设置"));
                }
                let floor = patient.start_time.unwrap_or(patient.arrival_time);
                if now < floor {
                    return Err(FlowError::InvariantViolation(format!(
                        "patient {}: 结束时间 {} 早于 {}",
                        patient.id, now, floor
                    )));
                }

                patient.end_time = Some(now);
                if let (PatientStatus::Completed, Some(start)) = (to, patient.start_time) {
                    patient.actual_procedure_minutes = Some(minutes_between(start, now));
                }
            }
        }

        patient.status = to;
        patient.updated_at = now;
        Ok(())
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<PatientStatus> {
        vec![
            PatientStatus::Waiting,
            PatientStatus::InProgress,
            PatientStatus::Completed,
            PatientStatus::Cancelled,
            PatientStatus::NoShow,
        ]
    }

    /// 获取当前状态可转换到的目标状态
    pub fn get_possible_targets(&self, current: PatientStatus) -> Vec<PatientStatus> {
        let mut targets: Vec<PatientStatus> = self
            .transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, to)| *to)
            .collect();
        targets.sort_by_key(|status| status.as_str());
        targets
    }
}

impl Default for PatientStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn rejected(from: PatientStatus, to: PatientStatus, reason: &str) -> FlowError {
    FlowError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.to_string(),
    }
}
