//! Blockbeat 指标收集模块
//!
//! 区块源与分发器在每个区块、每轮分发时调用这些函数。

use std::collections::HashMap;
use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// 记录分发器收到新 beat
pub fn record_beat_received(height: u32) {
    counter!("blockbeat_beats_received_total").increment(1);
    gauge!("blockbeat_current_height").set(f64::from(height));
}

/// 记录一轮分发耗时（全部队列完成）
pub fn record_round_duration(elapsed: Duration) {
    counter!("blockbeat_rounds_completed_total").increment(1);
    histogram!("blockbeat_round_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
}

/// 记录致命错误（分发停止）
pub fn record_fatal_error() {
    counter!("blockbeat_fatal_errors_total").increment(1);
}

/// 记录单个 consumer 处理结果
pub fn record_consumer_processed(consumer: &str, elapsed: Duration, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "blockbeat_consumer_beats_total",
        "consumer" => consumer.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "blockbeat_consumer_process_ms",
        "consumer" => consumer.to_string()
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}

/// 记录队列完成一轮通知
pub fn record_queue_dispatched(queue_id: u32, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "blockbeat_queue_rounds_total",
        "queue" => queue_id.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 分发指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DispatchStatsAggregator {
    /// 成功轮数
    pub rounds_completed: u64,

    /// 失败轮数
    pub rounds_failed: u64,

    /// 最新高度
    pub last_height: Option<u32>,

    /// 每轮耗时统计 (ms)
    pub round_stats: RunningStats,

    /// 相邻区块间隔统计 (ms)
    pub interval_stats: RunningStats,
}

impl DispatchStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新一轮成功分发
    pub fn record_round(&mut self, height: u32, elapsed: Duration) {
        self.rounds_completed += 1;
        self.last_height = Some(height);
        self.round_stats.push(elapsed.as_secs_f64() * 1000.0);
    }

    /// 更新一轮失败分发
    pub fn record_failure(&mut self, height: u32) {
        self.rounds_failed += 1;
        self.last_height = Some(height);
    }

    /// 记录两个区块之间的间隔
    pub fn record_interval(&mut self, interval: Duration) {
        self.interval_stats.push(interval.as_secs_f64() * 1000.0);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let total = self.rounds_completed + self.rounds_failed;
        MetricsSummary {
            rounds_completed: self.rounds_completed,
            rounds_failed: self.rounds_failed,
            last_height: self.last_height,
            failure_rate: if total > 0 {
                self.rounds_failed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            round_ms: StatsSummary::from(&self.round_stats),
            block_interval_ms: StatsSummary::from(&self.interval_stats),
            consumer_counts: HashMap::new(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub rounds_completed: u64,
    pub rounds_failed: u64,
    pub last_height: Option<u32>,
    pub failure_rate: f64,
    pub round_ms: StatsSummary,
    pub block_interval_ms: StatsSummary,
    /// 每个队列的 consumer 数量（由调用方填写）
    pub consumer_counts: HashMap<String, usize>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Blockbeat Summary ===")?;
        match self.last_height {
            Some(height) => writeln!(f, "Last height: {height}")?,
            None => writeln!(f, "Last height: N/A")?,
        }
        writeln!(f, "Rounds completed: {}", self.rounds_completed)?;
        writeln!(
            f,
            "Rounds failed: {} ({:.2}%)",
            self.rounds_failed, self.failure_rate
        )?;
        writeln!(f, "Round duration (ms): {}", self.round_ms)?;
        writeln!(f, "Block interval (ms): {}", self.block_interval_ms)?;

        if !self.consumer_counts.is_empty() {
            writeln!(f, "Queues:")?;
            let mut queues: Vec<_> = self.consumer_counts.iter().collect();
            queues.sort();
            for (queue, count) in queues {
                writeln!(f, "  {queue}: {count} consumers")?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
