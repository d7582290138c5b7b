//! 队列统计

use chrono::{DateTime, Utc};
use flow_core::utils::same_utc_day;
use flow_core::{Patient, PatientStatus, Result};
use serde::{Deserialize, Serialize};

/// 队列统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// 今日开始就诊患者的平均实际等待（分钟），无数据时为 0
    pub average_wait_minutes: f64,
    /// 活跃患者中 High 与 Critical 的数量
    pub high_priority_count: usize,
    /// 今日结束的患者中完成就诊的比例，无数据时为 0
    pub efficiency: f64,
    pub waiting: usize,
    pub in_progress: usize,
    pub completed_today: usize,
    pub cancelled_today: usize,
    pub no_show_today: usize,
    pub average_procedure_minutes: f64,
}

impl QueueStats {
    /// 由患者集合计算统计
    ///
    /// 任一患者时间线不一致时返回 `InvariantViolation`。
    pub fn compute(patients: &[Patient], now: DateTime<Utc>) -> Result<Self> {
        let mut stats = QueueStats {
            average_wait_minutes: 0.0,
            high_priority_count: 0,
            efficiency: 0.0,
            waiting: 0,
            in_progress: 0,
            completed_today: 0,
            cancelled_today: 0,
            no_show_today: 0,
            average_procedure_minutes: 0.0,
        };

        let mut waits = Vec::new();
        let mut procedures = Vec::new();

        for patient in patients {
            patient.check_invariants()?;

            match patient.status {
                PatientStatus::Waiting => stats.waiting += 1,
                PatientStatus::InProgress => stats.in_progress += 1,
                _ => {}
            }

            if patient.status.is_active() && patient.priority.is_high() {
                stats.high_priority_count += 1;
            }

            if let (Some(start), Some(wait)) = (patient.start_time, patient.actual_wait_minutes) {
                if same_utc_day(start, now) {
                    waits.push(wait);
                }
            }

            let ended_today = patient.end_time.map(|end| same_utc_day(end, now)).unwrap_or(false);
            if !ended_today {
                continue;
            }
            match patient.status {
                PatientStatus::Completed => {
                    stats.completed_today += 1;
                    if let Some(minutes) = patient.actual_procedure_minutes {
                        procedures.push(minutes);
                    }
                }
                PatientStatus::Cancelled => stats.cancelled_today += 1,
                PatientStatus::NoShow => stats.no_show_today += 1,
                _ => {}
            }
        }

        stats.average_wait_minutes = mean(&waits);
        stats.average_procedure_minutes = mean(&procedures);

        let ended = stats.completed_today + stats.cancelled_today + stats.no_show_today;
        if ended > 0 {
            stats.efficiency = stats.completed_today as f64 / ended as f64;
        }

        Ok(stats)
    }
}

fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<i64>() as f64 / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use flow_core::{Department, FlowError, Gender, PatientIntake, Priority};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn patient(priority: Priority) -> Patient {
        let intake = PatientIntake {
            first_name: "Edward".to_string(),
            last_name: "Jenner".to_string(),
            age: 60,
            gender: Gender::Male,
            department: Department::General,
            symptoms: vec!["fever".to_string()],
            resources: vec![],
            priority_override: None,
        };
        Patient::from_intake(intake, 1, priority, noon() - Duration::hours(2))
    }

    fn completed(wait: i64, procedure: i64) -> Patient {
        let mut p = patient(Priority::Medium);
        let start = p.arrival_time + Duration::minutes(wait);
        p.status = PatientStatus::Completed;
        p.start_time = Some(start);
        p.end_time = Some(start + Duration::minutes(procedure));
        p.actual_wait_minutes = Some(wait);
        p.actual_procedure_minutes = Some(procedure);
        p
    }

    #[test]
    fn test_empty_stats() {
        let stats = QueueStats::compute(&[], noon()).unwrap();
        assert_eq!(stats.average_wait_minutes, 0.0);
        assert_eq!(stats.efficiency, 0.0);
        assert_eq!(stats.waiting, 0);
    }

    #[test]
    fn test_aggregates() {
        let mut cancelled = patient(Priority::High);
        cancelled.status = PatientStatus::Cancelled;
        cancelled.end_time = Some(noon() - Duration::minutes(30));

        let patients = vec![
            completed(10, 20),
            completed(30, 40),
            cancelled,
            patient(Priority::Critical),
            patient(Priority::Low),
        ];
        let stats = QueueStats::compute(&patients, noon()).unwrap();

        assert_eq!(stats.waiting, 2);
        assert_eq!(stats.high_priority_count, 1);
        assert_eq!(stats.completed_today, 2);
        assert_eq!(stats.cancelled_today, 1);
        assert!((stats.average_wait_minutes - 20.0).abs() < 1e-9);
        assert!((stats.average_procedure_minutes - 30.0).abs() < 1e-9);
        assert!((stats.efficiency - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_previous_day_excluded() {
        let mut old = completed(10, 10);
        old.start_time = old.start_time.map(|t| t - Duration::days(1));
        old.arrival_time = old.arrival_time - Duration::days(1);
        old.end_time = old.end_time.map(|t| t - Duration::days(1));

        let stats = QueueStats::compute(&[old], noon()).unwrap();
        assert_eq!(stats.completed_today, 0);
        assert_eq!(stats.average_wait_minutes, 0.0);
    }

    #[test]
    fn test_invariant_violation_surfaces() {
        let mut broken = completed(10, 10);
        broken.end_time = broken.start_time.map(|t| t - Duration::minutes(1));
        let result = QueueStats::compute(&[broken], noon());
        assert!(matches!(result, Err(FlowError::InvariantViolation(_))));
    }
}
