//! 患者排队演示程序
//!
//! 展示患者登记、优先级分类、状态转换、队列快照与资源建议

use flow_core::{Department, Gender, PatientIntake, PatientStatus, ResourceTag, WaitEstimate};
use flow_queue::{InMemoryPatientStore, QueueFilter, QueueService, QueueSettings};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let service = QueueService::new(
        Arc::new(InMemoryPatientStore::new()),
        QueueSettings::default(),
    )
    .await?;

    println!("🏥 患者排队演示\n");

    // 1. 登记患者
    let intakes = vec![
        intake("Li", "Wei", 67, Department::Cardiology, &["chest pain"], &[ResourceTag::Doctor, ResourceTag::Imaging]),
        intake("Chen", "Jing", 8, Department::Pediatrics, &["high fever", "cough"], &[ResourceTag::Doctor, ResourceTag::Nurse]),
        intake("Wang", "Fang", 34, Department::Orthopedics, &["ankle sprain"], &[ResourceTag::Doctor]),
        intake("Zhao", "Lei", 52, Department::Emergency, &["severe bleeding"], &[ResourceTag::Doctor, ResourceTag::Nurse]),
        intake("Sun", "Mei", 29, Department::General, &["follow-up"], &[]),
    ];

    let mut admitted = Vec::new();
    for intake in intakes {
        let patient = service.add_patient(intake).await?;
        println!(
            "📋 登记 {} [{}] 优先级 {} ({})",
            patient.full_name(),
            patient.department,
            patient.priority,
            patient.priority.score()
        );
        admitted.push(patient);
    }

    // 2. 状态转换
    let first = &admitted[3];
    service.change_status(first.id, PatientStatus::InProgress).await?;
    println!("\n▶️  {} 开始就诊", first.full_name());

    if let Err(e) = service.change_status(first.id, PatientStatus::Waiting).await {
        println!("⛔ 拒绝回到候诊: {}", e);
    }

    service.change_status(admitted[4].id, PatientStatus::NoShow).await?;
    println!("🚫 {} 未到诊", admitted[4].full_name());

    // 3. 队列快照
    let snapshot = service.get_queue_snapshot(&QueueFilter::default()).await?;
    println!(
        "\n📊 当前队列 (候诊 {}, 就诊中 {}):",
        snapshot.total_waiting, snapshot.total_in_progress
    );
    for entry in &snapshot.entries {
        let wait = match &entry.patient.estimated_wait {
            WaitEstimate::Minutes { minutes } => format!("{} 分钟", minutes),
            WaitEstimate::Unknown { reason } => format!("未知 ({})", reason),
        };
        println!(
            "   {}. {} [{}] {} - {} - 预计等待 {}",
            entry.position,
            entry.patient.full_name(),
            entry.patient.department,
            entry.patient.priority,
            entry.patient.status,
            wait
        );
    }

    // 4. 资源建议
    let recommendation = service.get_facility_recommendations().await?;
    println!("\n👩‍⚕️ 资源建议:");
    for staffing in &recommendation.staffing {
        println!(
            "   {}: 当前 {} / 建议 {} (需求 {:.2})",
            staffing.resource, staffing.current, staffing.recommended, staffing.demand_proxy
        );
    }
    for reading in &recommendation.utilization {
        println!(
            "   {:?} 利用率 {:.0}%",
            reading.category,
            reading.utilization * 100.0
        );
    }
    println!(
        "   额外人员成本 {:.2}, 等待成本 {:.2}",
        recommendation.cost.additional_staff_cost, recommendation.cost.waiting_cost
    );

    // 5. 统计
    let stats = service.get_stats().await?;
    println!("\n📈 统计:");
    println!("   平均等待: {:.1} 分钟", stats.average_wait_minutes);
    println!("   高优先级患者: {}", stats.high_priority_count);
    println!("   效率: {:.0}%", stats.efficiency * 100.0);

    println!("\n✅ 演示完成");
    Ok(())
}

fn intake(
    first_name: &str,
    last_name: &str,
    age: i64,
    department: Department,
    symptoms: &[&str],
    resources: &[ResourceTag],
) -> PatientIntake {
    PatientIntake {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        age,
        gender: Gender::Other,
        department,
        symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
        resources: resources.to_vec(),
        priority_override: None,
    }
}
