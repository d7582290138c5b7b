//! 优先级分类
//!
//! 根据症状优先级表推断患者的优先级分层

use flow_core::utils::normalize_tag;
use flow_core::{Department, FlowError, Priority, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 单个症状在各优先级上的权重
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl TierWeights {
    pub fn weight(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }

    fn add(&mut self, other: &TierWeights) {
        self.low += other.low;
        self.medium += other.medium;
        self.high += other.high;
        self.critical += other.critical;
    }
}

/// 带版本号的症状优先级表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymptomPriorityTable {
    pub version: String,
    pub entries: BTreeMap<String, TierWeights>,
    pub department_defaults: HashMap<Department, Priority>,
    pub fallback: Priority,
}

impl SymptomPriorityTable {
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(FlowError::Config("症状优先级表缺少版本号".to_string()));
        }
        for (tag, weights) in &self.entries {
            if normalize_tag(tag) != *tag {
                return Err(FlowError::Config(format!("症状标签未规范化: {:?}", tag)));
            }
            let valid = Priority::BY_URGENCY
                .iter()
                .all(|p| weights.weight(*p).is_finite() && weights.weight(*p) >= 0.0);
            if !valid {
                return Err(FlowError::Config(format!("症状 {} 的权重无效", tag)));
            }
        }
        Ok(())
    }

    /// 科室默认优先级
    pub fn department_default(&self, department: Department) -> Priority {
        self.department_defaults
            .get(&department)
            .copied()
            .unwrap_or(self.fallback)
    }
}

impl Default for SymptomPriorityTable {
    fn default() -> Self {
        let w = |low: f64, medium: f64, high: f64, critical: f64| TierWeights {
            low,
            medium,
            high,
            critical,
        };

        let entries = [
            ("chest pain", w(0.0, 0.0, 0.4, 0.6)),
            ("shortness of breath", w(0.0, 0.0, 0.5, 0.5)),
            ("difficulty breathing", w(0.0, 0.0, 0.4, 0.6)),
            ("unconscious", w(0.0, 0.0, 0.0, 1.0)),
            ("severe bleeding", w(0.0, 0.0, 0.2, 0.8)),
            ("stroke symptoms", w(0.0, 0.0, 0.1, 0.9)),
            ("fracture", w(0.0, 0.3, 0.7, 0.0)),
            ("high fever", w(0.0, 0.5, 0.5, 0.0)),
            ("abdominal pain", w(0.0, 0.6, 0.4, 0.0)),
            ("headache", w(0.5, 0.5, 0.0, 0.0)),
            ("fever", w(0.3, 0.7, 0.0, 0.0)),
            ("cough", w(0.7, 0.3, 0.0, 0.0)),
            ("sprain", w(0.6, 0.4, 0.0, 0.0)),
            ("rash", w(0.8, 0.2, 0.0, 0.0)),
            ("follow-up", w(1.0, 0.0, 0.0, 0.0)),
        ]
        .into_iter()
        .map(|(tag, weights)| (tag.to_string(), weights))
        .collect();

        let mut department_defaults = HashMap::new();
        department_defaults.insert(Department::Emergency, Priority::High);

        Self {
            version: "2024.1".to_string(),
            entries,
            department_defaults,
            fallback: Priority::Medium,
        }
    }
}

/// 分类结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Override,
    SymptomTable,
    DepartmentDefault,
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub priority: Priority,
    pub score: u32,
    pub source: ClassificationSource,
    pub matched_tags: Vec<String>,
    pub table_version: String,
}

/// 优先级分类器
#[derive(Debug, Clone)]
pub struct PriorityClassifier {
    table: SymptomPriorityTable,
}

impl PriorityClassifier {
    pub fn new(table: SymptomPriorityTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SymptomPriorityTable {
        &self.table
    }

    /// 推断优先级
    ///
    /// 显式指定的优先级直接生效；否则累加各匹配症状的权重，取权重最高的分层，
    /// 权重相同时取更紧急的分层；没有任何匹配时使用科室默认值。
    pub fn classify(
        &self,
        department: Department,
        symptoms: &[String],
        priority_override: Option<Priority>,
    ) -> Classification {
        if let Some(priority) = priority_override {
            return self.result(priority, ClassificationSource::Override, Vec::new());
        }

        let mut total = TierWeights::default();
        let mut matched_tags = Vec::new();

        for symptom in symptoms {
            let symptom = normalize_tag(symptom);
            if symptom.is_empty() {
                continue;
            }
            for (tag, weights) in &self.table.entries {
                if phrase_matches(&symptom, tag) {
                    total.add(weights);
                    if !matched_tags.contains(tag) {
                        matched_tags.push(tag.clone());
                    }
                }
            }
        }

        let has_weight = Priority::BY_URGENCY.iter().any(|p| total.weight(*p) > 0.0);
        if !has_weight {
            let priority = self.table.department_default(department);
            tracing::debug!(
                "No symptom matched for {} patient, falling back to {:?}",
                department,
                priority
            );
            return self.result(priority, ClassificationSource::DepartmentDefault, matched_tags);
        }

        // BY_URGENCY 从最紧急开始，只有严格更大才替换，平局保留更紧急的分层
        let mut best = Priority::Critical;
        for priority in Priority::BY_URGENCY {
            if total.weight(priority) > total.weight(best) {
                best = priority;
            }
        }

        self.result(best, ClassificationSource::SymptomTable, matched_tags)
    }

    fn result(
        &self,
        priority: Priority,
        source: ClassificationSource,
        matched_tags: Vec<String>,
    ) -> Classification {
        Classification {
            priority,
            score: priority.score(),
            source,
            matched_tags,
            table_version: self.table.version.clone(),
        }
    }
}

impl Default for PriorityClassifier {
    fn default() -> Self {
        Self::new(SymptomPriorityTable::default())
    }
}

/// 症状文本是否以完整短语的形式包含表中的标签
fn phrase_matches(symptom: &str, tag: &str) -> bool {
    symptom == tag || format!(" {} ", symptom).contains(&format!(" {} ", tag))
}
