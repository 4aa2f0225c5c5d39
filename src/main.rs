mod common;
mod gemini;
mod model;
mod openai;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use model::arg::Args;
use model::config::Config;
use openai::{AdapterOptions, AppState, ModelMapper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 加载配置
    let mut config = Config::load(&args.config)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let http = build_http_client(&config)?;
    let mapper = ModelMapper::with_aliases(&config.model_aliases);
    let options = AdapterOptions {
        safety_threshold: config.safety_threshold,
    };

    let state = AppState::new(http)
        .with_mapper(mapper)
        .with_options(options)
        .with_base_url(config.gemini_base_url.clone());
    let app = openai::create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {} 失败", addr))?;

    tracing::info!("启动 Gemini OpenAI 兼容网关: {}", addr);
    tracing::info!("上游: {}", config.gemini_base_url);
    tracing::info!("可用 API:");
    tracing::info!("  GET  /v1/models");
    tracing::info!("  POST /v1/chat/completions");
    tracing::info!("  POST /v1/embeddings");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP 服务异常退出")?;

    tracing::info!("服务已停止");
    Ok(())
}

/// 构建进程共享的上游 HTTP 客户端
fn build_http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(20))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60));

    if let Some(proxy_url) = config.proxy_url.as_deref().filter(|url| !url.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy_url)
            .with_context(|| format!("无效的代理地址: {}", proxy_url))?;
        builder = builder.proxy(proxy);
        tracing::info!("上游请求使用代理: {}", proxy_url);
    }

    builder.build().context("创建 HTTP 客户端失败")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭...");
}
