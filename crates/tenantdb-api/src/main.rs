//! TenantDB API 服务入口

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tenantdb_api::auth::{JwksVerifier, TokenVerifier};
use tenantdb_api::config::AppConfig;
use tenantdb_api::health::HealthChecker;
use tenantdb_api::metrics::Metrics;
use tenantdb_api::{build_router, AppState, RouterOptions};
use tenantdb_provisioner::{ClusterGateway, KubeGateway, ManifestRenderer, ProvisioningService};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "tenantdb-api", version, about = "租户数据库自助服务 API")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, env = "TENANTDB_CONFIG")]
    config: Option<PathBuf>,

    /// 覆盖监听端口
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("无法加载配置")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    init_tracing(&config.log_level);
    info!("启动 TenantDB API");

    let gateway: Arc<dyn ClusterGateway> = Arc::new(
        KubeGateway::connect(config.kubeconfig.as_deref())
            .await
            .context("无法连接 Kubernetes API 服务器")?,
    );

    let renderer = match &config.template_path {
        Some(path) => ManifestRenderer::from_file(path),
        None => ManifestRenderer::default(),
    };
    let service = ProvisioningService::new(gateway.clone(), renderer, config.provisioning_config());

    let verifier: Option<Arc<dyn TokenVerifier>> = if config.auth.enabled {
        let verifier = JwksVerifier::fetch(&config.auth)
            .await
            .context("无法初始化令牌校验")?;
        Some(Arc::new(verifier))
    } else {
        warn!("认证已关闭，所有接口均可匿名访问");
        None
    };

    let shutdown = CancellationToken::new();
    let health = Arc::new(HealthChecker::new(
        gateway,
        Duration::from_secs(config.health.interval_seconds),
    ));
    let health_task = health.clone().spawn(shutdown.clone());

    let state = AppState {
        service,
        metrics: Metrics::new().context("无法注册指标")?,
        health,
        shutdown: shutdown.clone(),
        credentials_timeout: config.credentials_timeout(),
    };
    let app = build_router(
        state,
        RouterOptions {
            verifier,
            user_roles: config.auth.user_roles.clone(),
            admin_roles: config.auth.admin_roles.clone(),
            request_timeout: config.request_timeout(),
            cors_origins: config.server.cors_origins.clone(),
        },
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;
    info!("TenantDB API 监听在 {}", addr);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("收到停止信号，开始关闭");
            signal_token.cancel();
        })
        .await
        .context("HTTP 服务异常退出")?;

    shutdown.cancel();
    if let Err(e) = health_task.await {
        warn!("健康检查任务异常退出: {}", e);
    }
    info!("TenantDB API 已停止");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
