//! 指标收集与导出模块
//!
//! 记录各类供给操作的次数与结果，以及创建流程的耗时，
//! 并通过 Prometheus 文本格式在 `/metrics` 导出。

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// 指标收集器
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus 注册表
    registry: Registry,
    /// 操作计数器，按操作与结果区分
    operations_total: IntCounterVec,
    /// 创建流程耗时
    provision_duration: Histogram,
}

impl Metrics {
    /// 创建新的指标收集器
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new(
                "tenantdb_operations_total",
                "Total number of provisioning operations by outcome",
            ),
            &["operation", "outcome"],
        )?;

        let provision_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tenantdb_provision_duration_seconds",
                "Time taken to provision a database until credentials are available",
            )
            .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 180.0, 300.0]),
        )?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(provision_duration.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            provision_duration,
        })
    }

    /// 记录一次操作
    pub fn record(&self, operation: &str, outcome: &str) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// 记录一次成功创建的耗时
    pub fn observe_provision(&self, seconds: f64) {
        self.provision_duration.observe(seconds);
    }

    /// 某个操作的计数
    pub fn count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .get()
    }

    /// 以文本格式导出
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
