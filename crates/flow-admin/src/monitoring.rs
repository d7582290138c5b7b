//! 队列监控
//!
//! 以 Prometheus 指标的形式暴露队列规模、等待时长、效率与容量告警

use anyhow::Result;
use flow_core::PatientStatus;
use flow_queue::{QueueStats, ResourceRecommendation};
use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::time::Instant;
use tracing::debug;

/// 队列指标收集器
#[derive(Debug)]
pub struct QueueMonitor {
    /// Prometheus指标注册表
    registry: Registry,
    /// 候诊人数
    waiting_patients: IntGauge,
    /// 就诊中人数
    in_progress_patients: IntGauge,
    /// 高优先级活跃患者数
    high_priority_patients: IntGauge,
    /// 当天平均等待分钟数
    average_wait_minutes: Gauge,
    /// 当天完成率
    efficiency_ratio: Gauge,
    /// 超容量的资源类别数
    over_capacity_categories: IntGauge,
    /// 登记患者总数
    admitted_total: IntCounter,
    /// 已执行的状态转换，按目标状态区分
    transitions_total: IntCounterVec,
    /// 被拒绝的状态转换
    rejected_transitions_total: IntCounter,
    /// 启动时间
    start_time: Instant,
}

impl QueueMonitor {
    /// 创建新的队列监控器
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let waiting_patients = IntGauge::with_opts(Opts::new(
            "flow_waiting_patients",
            "Number of patients currently waiting",
        ))?;

        let in_progress_patients = IntGauge::with_opts(Opts::new(
            "flow_in_progress_patients",
            "Number of patients currently being seen",
        ))?;

        let high_priority_patients = IntGauge::with_opts(Opts::new(
            "flow_high_priority_patients",
            "Number of active patients at high or critical priority",
        ))?;

        let average_wait_minutes = Gauge::with_opts(Opts::new(
            "flow_average_wait_minutes",
            "Average wait in minutes of patients started today",
        ))?;

        let efficiency_ratio = Gauge::with_opts(Opts::new(
            "flow_efficiency_ratio",
            "Completed patients over patients that ended today",
        ))?;

        let over_capacity_categories = IntGauge::with_opts(Opts::new(
            "flow_over_capacity_categories",
            "Number of resource categories above capacity",
        ))?;

        let admitted_total = IntCounter::with_opts(Opts::new(
            "flow_admitted_patients_total",
            "Total number of admitted patients",
        ))?;

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "flow_status_transitions_total",
                "Total number of applied status transitions",
            ),
            &["to"],
        )?;

        let rejected_transitions_total = IntCounter::with_opts(Opts::new(
            "flow_rejected_transitions_total",
            "Total number of rejected status transitions",
        ))?;

        // 注册所有指标
        registry.register(Box::new(waiting_patients.clone()))?;
        registry.register(Box::new(in_progress_patients.clone()))?;
        registry.register(Box::new(high_priority_patients.clone()))?;
        registry.register(Box::new(average_wait_minutes.clone()))?;
        registry.register(Box::new(efficiency_ratio.clone()))?;
        registry.register(Box::new(over_capacity_categories.clone()))?;
        registry.register(Box::new(admitted_total.clone()))?;
        registry.register(Box::new(transitions_total.clone()))?;
        registry.register(Box::new(rejected_transitions_total.clone()))?;

        Ok(Self {
            registry,
            waiting_patients,
            in_progress_patients,
            high_priority_patients,
            average_wait_minutes,
            efficiency_ratio,
            over_capacity_categories,
            admitted_total,
            transitions_total,
            rejected_transitions_total,
            start_time: Instant::now(),
        })
    }

    /// 记录患者登记
    pub fn record_admission(&self) {
        self.admitted_total.inc();
    }

    /// 记录状态转换结果
    pub fn record_transition(&self, to: PatientStatus, applied: bool) {
        debug!("Status transition to {} (applied: {})", to, applied);
        if applied {
            self.transitions_total.with_label_values(&[to.as_str()]).inc();
        } else {
            self.rejected_transitions_total.inc();
        }
    }

    /// 用最新统计刷新队列规模指标
    pub fn observe_stats(&self, stats: &QueueStats) {
        self.waiting_patients.set(stats.waiting as i64);
        self.in_progress_patients.set(stats.in_progress as i64);
        self.high_priority_patients.set(stats.high_priority_count as i64);
        self.average_wait_minutes.set(stats.average_wait_minutes);
        self.efficiency_ratio.set(stats.efficiency);
    }

    /// 用最新资源建议刷新容量指标
    pub fn observe_recommendation(&self, recommendation: &ResourceRecommendation) {
        self.over_capacity_categories
            .set(recommendation.alerts.len() as i64);
    }

    /// 获取Prometheus指标
    pub fn get_prometheus_metrics(&self) -> Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    /// 运行时长（秒）
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_exported() {
        let monitor = QueueMonitor::new().unwrap();
        monitor.record_admission();
        monitor.record_admission();
        monitor.record_transition(PatientStatus::InProgress, true);
        monitor.record_transition(PatientStatus::Waiting, false);

        let text = monitor.get_prometheus_metrics().unwrap();
        assert!(text.contains("flow_admitted_patients_total 2"));
        assert!(text.contains("flow_status_transitions_total{to=\"in-progress\"} 1"));
        assert!(text.contains("flow_rejected_transitions_total 1"));
    }

    #[test]
    fn test_observe_stats() {
        let monitor = QueueMonitor::new().unwrap();
        let stats = QueueStats {
            average_wait_minutes: 12.5,
            high_priority_count: 3,
            efficiency: 0.75,
            waiting: 7,
            in_progress: 2,
            completed_today: 3,
            cancelled_today: 1,
            no_show_today: 0,
            average_procedure_minutes: 20.0,
        };
        monitor.observe_stats(&stats);

        let text = monitor.get_prometheus_metrics().unwrap();
        assert!(text.contains("flow_waiting_patients 7"));
        assert!(text.contains("flow_in_progress_patients 2"));
        assert!(text.contains("flow_high_priority_patients 3"));
        assert!(text.contains("flow_average_wait_minutes 12.5"));
        assert!(text.contains("flow_efficiency_ratio 0.75"));
    }
}
