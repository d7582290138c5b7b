//! 患者流转服务器主程序

use anyhow::Context;
use clap::Parser;
use flow_admin::{ConfigManager, FlowConfig, QueueMonitor};
use flow_queue::{InMemoryPatientStore, QueueService};
use flow_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 患者流转服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "flow-server")]
#[command(about = "患者排队与流转管理服务器")]
struct Args {
    /// 监听主机，覆盖配置文件
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigManager::new(path)?.get_config().await,
        None => FlowConfig::default(),
    };

    // 初始化日志
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_new(level).context("Invalid log level")?;
    if config.logging.is_json() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("启动患者流转服务器...");
    if let Some(path) = &args.config {
        info!("  配置文件: {}", path);
    }

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    info!("服务器配置:");
    info!("  名称: {}", config.server.name);
    info!("  监听地址: {}", addr);
    info!("  症状表版本: {}", config.classifier.version);

    let service = QueueService::new(
        Arc::new(InMemoryPatientStore::new()),
        config.to_queue_settings(),
    )
    .await?;
    let monitor = QueueMonitor::new()?;
    let state = AppState::new(Arc::new(service), Arc::new(monitor));

    let server = WebServer::new(
        addr,
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}
