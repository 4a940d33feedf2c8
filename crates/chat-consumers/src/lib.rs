//! 消费者组装配
//!
//! 把消费者处理器挂到代理订阅上运行。`chat-consumers` 进程运行后台组，
//! 主服务在使用进程内代理时也复用这里的装配。

use std::sync::Arc;
use std::time::Duration;

use application::{
    AnalyticsConsumer, BrokerDeadLetterSink, BrokerError, ChatEventHandler, ConsumerRunner,
    DeliveryConsumer, EventPublisher, FanoutService, NotificationConsumer,
    PersistenceVerificationConsumer,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 订阅指定主题并在后台运行消费循环
pub async fn spawn_group(
    infra: &Infrastructure,
    group: &str,
    topics: Vec<String>,
    handler: Arc<dyn ChatEventHandler>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, BrokerError> {
    let subscription = infra.subscriber.subscribe(&topics, group).await?;
    let runner = ConsumerRunner::new(
        group,
        infra.topics.clone(),
        Arc::new(BrokerDeadLetterSink::new(infra.producer.clone())),
    );
    tracing::info!(group = %group, topics = ?topics, "消费者组已就绪");
    Ok(tokio::spawn(async move {
        runner.run(subscription, handler, shutdown).await;
    }))
}

/// 实时投递组：消息、房间事件和个人通知都推送到本进程的流式连接
pub async fn spawn_delivery(
    infra: &Infrastructure,
    config: &AppConfig,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, BrokerError> {
    let fanout = Arc::new(FanoutService::new(infra.broadcaster.clone()));
    spawn_group(
        infra,
        &config.kafka.groups.delivery,
        vec![
            infra.topics.messages.clone(),
            infra.topics.room_events.clone(),
            infra.topics.notifications.clone(),
        ],
        Arc::new(DeliveryConsumer::new(fanout)),
        shutdown,
    )
    .await
}

/// 后台消费者组的句柄
pub struct BackgroundConsumers {
    pub verifier: Arc<PersistenceVerificationConsumer>,
    pub analytics: Arc<AnalyticsConsumer>,
    pub handles: Vec<JoinHandle<()>>,
}

impl BackgroundConsumers {
    /// 等待所有消费循环退出
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "消费者任务异常退出");
            }
        }
    }
}

/// 启动持久化核对、通知与统计三个消费者组
pub async fn spawn_background(
    infra: &Infrastructure,
    config: &AppConfig,
    publisher: Arc<dyn EventPublisher>,
    shutdown: CancellationToken,
) -> Result<BackgroundConsumers, BrokerError> {
    let groups = &config.kafka.groups;
    let chat_topics = vec![infra.topics.messages.clone(), infra.topics.room_events.clone()];

    let verifier = Arc::new(PersistenceVerificationConsumer::new(
        infra.message_repository.clone(),
    ));
    let analytics = Arc::new(AnalyticsConsumer::new());
    let notifier = Arc::new(NotificationConsumer::new(
        infra.room_repository.clone(),
        publisher,
    ));

    let mut handles = vec![
        spawn_group(
            infra,
            &groups.persistence,
            vec![infra.topics.messages.clone()],
            verifier.clone(),
            shutdown.clone(),
        )
        .await?,
        spawn_group(
            infra,
            &groups.notification,
            chat_topics.clone(),
            notifier,
            shutdown.clone(),
        )
        .await?,
        spawn_group(
            infra,
            &groups.analytics,
            chat_topics,
            analytics.clone(),
            shutdown.clone(),
        )
        .await?,
    ];
    handles.push(analytics.spawn_reporter(
        Duration::from_secs(config.consumers.analytics_report_secs),
        shutdown,
    ));

    Ok(BackgroundConsumers {
        verifier,
        analytics,
        handles,
    })
}
