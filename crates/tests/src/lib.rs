//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 区块源 → 分发器 → consumer 的端到端场景
//! - 配置驱动的节点装配

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use contracts::{Beat, BlockEpoch, BlockHash, Consumer, ContractError};

    /// Recorded consumer activity, in global order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Seed(&'static str, u32),
        Start(&'static str, u32),
        End(&'static str, u32),
    }

    pub type Journal = Arc<Mutex<Vec<Event>>>;

    pub fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn events(journal: &Journal) -> Vec<Event> {
        journal.lock().unwrap().clone()
    }

    pub fn position(journal: &Journal, event: &Event) -> usize {
        events(journal)
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing {event:?}"))
    }

    /// Consumer that writes every call into a shared journal
    pub struct Recorder {
        name: &'static str,
        journal: Journal,
        delay: Duration,
        fail_at: Option<u32>,
    }

    impl Recorder {
        pub fn new(name: &'static str, journal: &Journal) -> Arc<Self> {
            Self::build(name, journal, Duration::ZERO, None)
        }

        pub fn slow(name: &'static str, journal: &Journal, delay: Duration) -> Arc<Self> {
            Self::build(name, journal, delay, None)
        }

        pub fn failing(name: &'static str, journal: &Journal, fail_at: u32) -> Arc<Self> {
            Self::build(name, journal, Duration::ZERO, Some(fail_at))
        }

        fn build(
            name: &'static str,
            journal: &Journal,
            delay: Duration,
            fail_at: Option<u32>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                journal: Arc::clone(journal),
                delay,
                fail_at,
            })
        }

        fn push(&self, event: Event) {
            self.journal.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl Consumer for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn process_beat(&self, beat: &Beat) -> Result<(), ContractError> {
            self.push(Event::Start(self.name, beat.height()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.push(Event::End(self.name, beat.height()));

            if self.fail_at == Some(beat.height()) {
                return Err(ContractError::consumer(self.name, "cannot handle block"));
            }
            Ok(())
        }

        fn seed_beat(&self, beat: &Beat) {
            self.push(Event::Seed(self.name, beat.height()));
        }
    }

    pub fn epoch(height: u32) -> BlockEpoch {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&height.to_be_bytes());
        BlockEpoch::new(height, BlockHash::new(bytes))
    }

    /// Poll `condition` until it holds or two seconds pass
    pub async fn eventually(mut condition: impl FnMut() -> bool) {
        let polled = tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(polled.is_ok(), "condition not met within 2s");
    }
}

#[cfg(test)]
mod contract_tests {
    use contracts::{Beat, BlockEpoch, BlockHash, ConfigVersion};
    use lnwire::{ExtraOpaqueData, TypeMap, WireTlvMap, MIN_CUSTOM_RECORDS_TLV_TYPE};

    #[test]
    fn test_contracts_compile() {
        let _ = ConfigVersion::V1;
        let beat = Beat::new(BlockEpoch::new(7, BlockHash::ZERO));
        assert_eq!(beat.height(), 7);
        assert_eq!(beat.hash(), BlockHash::ZERO);
    }

    /// 自定义类型 70000 与官方类型 1 打包后原样取回，并按阈值划分
    #[test]
    fn test_tlv_custom_and_official_partition() {
        let mut records = TypeMap::new();
        records.insert(70000, vec![0xca, 0xfe]);
        records.insert(1, vec![0x01]);

        let extra = ExtraOpaqueData::from_type_map(&records);
        let extracted = extra.extract_records(&mut []).unwrap();
        assert_eq!(extracted, records);

        let wire = WireTlvMap::new(extracted);
        assert_eq!(wire.official_types().keys().copied().collect::<Vec<_>>(), [1]);
        assert_eq!(wire.custom_types().keys().copied().collect::<Vec<_>>(), [70000]);
        assert!(wire.custom_types().keys().all(|t| *t >= MIN_CUSTOM_RECORDS_TLV_TYPE));
    }

    #[test]
    fn test_tlv_empty_round_trip() {
        let extra = ExtraOpaqueData::from_type_map(&TypeMap::new());
        assert!(extra.is_empty());
        assert!(extra.extract_records(&mut []).unwrap().is_empty());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use block_source::{BlockProducer, ChainNotifier, ProducerConfig};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::Consumer;
    use dispatcher::{BeatConsumer, BlockbeatDispatcher, DispatchError, DispatcherState};
    use tokio_util::sync::CancellationToken;

    use crate::support::*;

    /// 场景 1：同一队列内顺序处理，不同队列之间并发
    #[tokio::test]
    async fn test_queue_order_and_cross_queue_overlap() {
        let journal = journal();
        let x = Recorder::slow("x", &journal, Duration::from_millis(30));
        let y = Recorder::new("y", &journal);
        let z = Recorder::new("z", &journal);

        let notifier = ChainNotifier::new(4);
        let mut dispatcher = BlockbeatDispatcher::new(notifier.clone());
        dispatcher
            .register_queue(vec![x as Arc<dyn Consumer>, y])
            .unwrap();
        dispatcher.register_queue(vec![z as Arc<dyn Consumer>]).unwrap();
        dispatcher.start().await.unwrap();

        notifier.connect_block(epoch(100)).await.unwrap();
        eventually(|| events(&journal).len() == 6).await;

        let x_end = position(&journal, &Event::End("x", 100));
        let y_start = position(&journal, &Event::Start("y", 100));
        let z_start = position(&journal, &Event::Start("z", 100));
        assert!(x_end < y_start, "y must wait for x");
        assert!(z_start < x_end, "z runs while x is still processing");

        dispatcher.stop().await;
        assert_eq!(dispatcher.metrics().rounds_completed, 1);
    }

    /// 场景 2：任一 consumer 出错后，下一个区块不再分发
    #[tokio::test]
    async fn test_error_halts_next_beat() {
        let journal = journal();
        let x = Recorder::new("x", &journal);
        let y = Recorder::failing("y", &journal, 100);
        let z = Recorder::slow("z", &journal, Duration::from_millis(10));

        let shutdown = CancellationToken::new();
        let notifier = ChainNotifier::new(4);
        let mut dispatcher = BlockbeatDispatcher::new(notifier.clone()).with_shutdown(&shutdown);
        dispatcher
            .register_queue(vec![x as Arc<dyn Consumer>, y])
            .unwrap();
        dispatcher.register_queue(vec![z as Arc<dyn Consumer>]).unwrap();
        dispatcher.start().await.unwrap();

        notifier.connect_block(epoch(100)).await.unwrap();
        let _ = notifier.connect_block(epoch(101)).await;

        tokio::time::timeout(Duration::from_secs(2), dispatcher.join())
            .await
            .expect("dispatch loop exits on fatal error");

        assert!(shutdown.is_cancelled());
        assert!(events(&journal)
            .iter()
            .all(|e| !matches!(e, Event::Start(_, 101))));
        // 另一个队列仍完成了高度 100
        position(&journal, &Event::End("z", 100));

        let fatal = dispatcher.fatal_error().unwrap();
        assert!(matches!(*fatal, DispatchError::Queue { height: 100, .. }));
        assert_eq!(dispatcher.metrics().rounds_failed, 1);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    /// 场景 3：SetInitialBeat 对每个 consumer 恰好播种一次，先于任何处理
    #[tokio::test]
    async fn test_initial_beat_seeds_before_processing() {
        let journal = journal();
        let a = Recorder::new("a", &journal);
        let b = Recorder::new("b", &journal);

        let notifier = ChainNotifier::new(4);
        notifier.connect_block(epoch(50)).await.unwrap();

        let mut dispatcher = BlockbeatDispatcher::new(notifier.clone());
        dispatcher.register_queue(vec![a as Arc<dyn Consumer>]).unwrap();
        dispatcher.register_queue(vec![b as Arc<dyn Consumer>]).unwrap();
        dispatcher.set_initial_beat().await.unwrap();
        assert_eq!(dispatcher.current_beat().map(|b| b.height()), Some(50));

        dispatcher.start().await.unwrap();
        notifier.connect_block(epoch(51)).await.unwrap();
        eventually(|| events(&journal).len() == 6).await;
        dispatcher.stop().await;

        let recorded = events(&journal);
        assert_eq!(
            &recorded[..2],
            [Event::Seed("a", 50), Event::Seed("b", 50)].as_slice()
        );
        assert_eq!(
            recorded
                .iter()
                .filter(|e| matches!(e, Event::Seed(..)))
                .count(),
            2
        );
        // 高度 50 只播种，不重复处理
        assert!(recorded.iter().all(|e| !matches!(e, Event::Start(_, 50))));
        assert_eq!(dispatcher.metrics().consumers_seeded, 2);
    }

    /// 场景 4：Stop 等待进行中的 ProcessBeat 返回
    #[tokio::test]
    async fn test_stop_waits_for_in_flight_beat() {
        let (consumer, mut subsystem) = BeatConsumer::new("sweeper");
        let consumer = Arc::new(consumer);

        let notifier = ChainNotifier::new(4);
        let mut dispatcher = BlockbeatDispatcher::new(notifier.clone());
        dispatcher
            .register_queue(vec![consumer.clone() as Arc<dyn Consumer>])
            .unwrap();
        dispatcher.start().await.unwrap();

        notifier.connect_block(epoch(200)).await.unwrap();
        let request = subsystem.recv().await.unwrap();
        assert_eq!(request.beat().height(), 200);

        let stopping = tokio::spawn(async move {
            dispatcher.stop().await;
            dispatcher
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished(), "stop returned with a beat in flight");

        request.notify_processed(Ok(()));
        let dispatcher = tokio::time::timeout(Duration::from_secs(2), stopping)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(consumer.current_beat().map(|b| b.height()), Some(200));

        let _ = notifier.connect_block(epoch(201)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(consumer.current_beat().map(|b| b.height()), Some(200));
        assert_eq!(dispatcher.metrics().rounds_completed, 1);
    }

    /// 慢队列未确认前，其他队列也拿不到下一个区块
    #[tokio::test]
    async fn test_round_barrier_across_queues() {
        let journal = journal();
        let fast = Recorder::new("fast", &journal);
        let (slow, mut subsystem) = BeatConsumer::new("slow");

        let notifier = ChainNotifier::new(4);
        let mut dispatcher = BlockbeatDispatcher::new(notifier.clone());
        dispatcher
            .register_queue(vec![Arc::new(slow) as Arc<dyn Consumer>])
            .unwrap();
        dispatcher.register_queue(vec![fast as Arc<dyn Consumer>]).unwrap();
        dispatcher.start().await.unwrap();

        notifier.connect_block(epoch(1)).await.unwrap();
        notifier.connect_block(epoch(2)).await.unwrap();

        let first = subsystem.recv().await.unwrap();
        eventually(|| events(&journal).contains(&Event::End("fast", 1))).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!events(&journal).contains(&Event::Start("fast", 2)));

        first.notify_processed(Ok(()));
        let second = subsystem.recv().await.unwrap();
        assert_eq!(second.beat().height(), 2);
        second.notify_processed(Ok(()));

        eventually(|| events(&journal).contains(&Event::End("fast", 2))).await;
        dispatcher.stop().await;
    }

    /// 配置驱动：TOML → 分发器 → 区块生产者，故障 consumer 触发致命错误
    #[tokio::test]
    async fn test_blueprint_driven_node_escalates_fault() {
        let toml = r#"
[source]
start_height = 1000
block_interval_ms = 20
max_blocks = 0
buffer_size = 4

[dispatcher]
set_initial_beat = true

[[queues]]
name = "chain"

[[queues.consumers]]
name = "chain_arbitrator"
consumer_type = "log"

[[queues]]
name = "sweep"

[[queues.consumers]]
name = "sweeper"
consumer_type = "fault"

[queues.consumers.params]
fail_at_height = "1003"
"#;
        let blueprint = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();

        let shutdown = CancellationToken::new();
        let notifier = ChainNotifier::new(blueprint.source.buffer_size);
        let mut dispatcher = dispatcher::create_dispatcher(notifier.clone(), &blueprint)
            .unwrap()
            .with_shutdown(&shutdown);

        let producer = BlockProducer::new(notifier, ProducerConfig::from(&blueprint.source));
        let mined = producer.spawn(shutdown.child_token());

        dispatcher.set_initial_beat().await.unwrap();
        let initial = dispatcher.current_beat().unwrap().height();
        assert!(initial < 1003);
        dispatcher.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), shutdown.cancelled())
            .await
            .expect("fault consumer escalates");
        dispatcher.join().await;

        let fatal = dispatcher.fatal_error().unwrap();
        assert!(fatal.to_string().contains("height 1003"), "{fatal}");
        assert_eq!(dispatcher.metrics().consumers_seeded, 2);
        assert_eq!(dispatcher.metrics().rounds_completed, u64::from(1002 - initial));
        assert!(mined.await.unwrap() >= 4);
    }
}
