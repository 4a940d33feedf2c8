//! chat-consumers 服务
//!
//! 从 Kafka 读取聊天事件，运行持久化核对、通知与统计三个消费者组。

use std::sync::Arc;

use anyhow::Context;
use application::ChannelEventPublisher;
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("chat-consumers 启动中...");

    let app_config = AppConfig::load().context("加载配置失败")?;
    app_config
        .validate()
        .map_err(|e| anyhow::anyhow!("配置验证失败: {}", e))?;
    if !app_config.kafka.enabled {
        anyhow::bail!("chat-consumers 需要启用 Kafka (CHATROOM_KAFKA__ENABLED=true)");
    }

    let infra = Infrastructure::build(&app_config).await?;
    let (publisher, publisher_task) =
        ChannelEventPublisher::spawn(infra.producer.clone(), infra.topics.clone());

    let shutdown = CancellationToken::new();
    let consumers = chat_consumers::spawn_background(
        &infra,
        &app_config,
        Arc::new(publisher),
        shutdown.clone(),
    )
    .await?;
    let verifier = consumers.verifier.clone();
    let analytics = consumers.analytics.clone();

    info!("chat-consumers 启动完成，开始处理事件...");
    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，停止消费者");

    shutdown.cancel();
    consumers.join().await;

    // 消费者持有的发布器句柄都已释放，等待剩余通知发送完毕
    if let Err(err) = publisher_task.await {
        tracing::error!(error = %err, "事件发布任务异常退出");
    }

    let snapshot = analytics.snapshot().await;
    info!(
        total = snapshot.total,
        anomalies = verifier.anomaly_count(),
        "chat-consumers 已退出"
    );
    Ok(())
}
