//! # Dispatcher
//!
//! 区块心跳（blockbeat）分发模块。
//!
//! 负责：
//! - 订阅区块源，每个新区块生成一个 `Beat`
//! - 队列之间并发通知，队列内部按注册顺序串行通知
//! - 每轮全部队列完成后才接收下一个区块
//! - 任一 consumer 失败即视为致命错误，停止分发

pub mod consumers;
pub mod dispatcher;
pub mod error;
pub mod fatal;
pub mod metrics;
pub mod queue;

pub use consumers::{BeatConsumer, BeatReceiver, BeatRequest, FaultConsumer, LogConsumer};
pub use contracts::{Beat, BlockSource, Consumer};
pub use dispatcher::{
    create_consumer, create_dispatcher, BlockbeatDispatcher, DispatcherConfig, DispatcherState,
};
pub use error::DispatchError;
pub use fatal::{FatalErrorHandler, FatalHook};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use queue::{dispatch_concurrent, dispatch_sequential, ConsumerQueue, QueueId};
