//! 主应用程序入口
//!
//! 装配基础设施与用例服务，启动 Axum Web API 服务和实时投递消费者。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use application::{
    ChannelEventPublisher, ChatService, ChatServiceDependencies, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config = AppConfig::load().context("加载配置失败")?;
    app_config
        .validate()
        .map_err(|e| anyhow::anyhow!("配置验证失败: {}", e))?;

    let infra = Infrastructure::build(&app_config).await?;
    let shutdown = CancellationToken::new();

    let (publisher, publisher_task) =
        ChannelEventPublisher::spawn(infra.producer.clone(), infra.topics.clone());
    let publisher = Arc::new(publisher);
    let clock = Arc::new(SystemClock);
    let jwt_service = Arc::new(JwtService::new(&app_config.jwt));

    let user_service = UserService::new(UserServiceDependencies {
        user_repository: infra.user_repository.clone(),
        password_hasher: infra.password_hasher.clone(),
        token_service: jwt_service.clone(),
        clock: clock.clone(),
    });
    let chat_service = ChatService::new(ChatServiceDependencies {
        room_repository: infra.room_repository.clone(),
        message_repository: infra.message_repository.clone(),
        user_repository: infra.user_repository.clone(),
        clock,
        publisher: publisher.clone(),
    });

    // 投递组始终在本进程运行，推送到本进程持有的流式连接
    let mut tasks = vec![chat_consumers::spawn_delivery(&infra, &app_config, shutdown.clone()).await?];

    // 进程内代理无法跨进程共享，未启用 Kafka 时后台组必须内嵌运行
    if app_config.consumers.embedded || !app_config.kafka.enabled {
        let background =
            chat_consumers::spawn_background(&infra, &app_config, publisher, shutdown.clone())
                .await?;
        tasks.extend(background.handles);
        tracing::info!("后台消费者组以内嵌方式运行");
    } else {
        drop(publisher);
    }

    tasks.push(infra.session_store.spawn_sweeper(
        Duration::from_secs(app_config.session.sweep_interval_secs),
        shutdown.clone(),
    ));

    let state = AppState::new(
        Arc::new(user_service),
        Arc::new(chat_service),
        jwt_service,
        infra.session_store.clone(),
        infra.broadcaster.clone(),
        app_config.jwt.cookie_name.clone(),
    );

    // 启动 Web 服务器
    let addr = app_config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {addr} 失败"))?;
    tracing::info!("聊天室服务器启动在 http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    tracing::info!("HTTP 服务已停止，等待后台任务退出");
    shutdown.cancel();
    infra.shutdown();
    for task in tasks {
        if let Err(err) = task.await {
            tracing::error!(error = %err, "后台任务异常退出");
        }
    }
    // 仍在关闭中的连接可能持有发布器句柄，最多等待剩余事件发送一段时间
    if tokio::time::timeout(Duration::from_secs(5), publisher_task).await.is_err() {
        tracing::warn!("事件发布任务未在超时内结束");
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "监听退出信号失败");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
