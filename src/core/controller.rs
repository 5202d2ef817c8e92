//! Controller lifecycle: wires the shared state to the event loop and the two
//! periodic tasks, and stops all three on shutdown.

use std::sync::Arc;
use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use crate::core::dispatcher::EventDispatcher;
use crate::core::mitigation::MitigationEngine;
use crate::core::monitoring::{Monitoring, SampleLog};
use crate::core::state::ControllerState;
use crate::models::Config;
use crate::platform::PlatformEvent;

const EVENT_QUEUE_DEPTH: usize = 1024;

pub struct Controller {
    config: Config,
    state: Arc<ControllerState>,
    dispatcher: Arc<EventDispatcher>,
    events_tx: mpsc::Sender<PlatformEvent>,
    events_rx: Option<mpsc::Receiver<PlatformEvent>>,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self::with_dispatcher(config, EventDispatcher::with_core_handlers())
    }

    pub fn with_dispatcher(config: Config, dispatcher: EventDispatcher) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (shutdown, _) = broadcast::channel(1);
        Self {
            state: Arc::new(ControllerState::new(&config)),
            config,
            dispatcher: Arc::new(dispatcher),
            events_tx,
            events_rx: Some(events_rx),
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> Arc<ControllerState> {
        self.state.clone()
    }

    /// Queue through which the platform delivers events
    pub fn events(&self) -> mpsc::Sender<PlatformEvent> {
        self.events_tx.clone()
    }

    /// Spawn the event loop, the stats poller and the mitigation engine
    pub async fn start(&mut self) -> Result<()> {
        let events_rx = self
            .events_rx
            .take()
            .context("controller already started")?;

        let sample_log = SampleLog::create(&self.config.monitoring.sample_log_path)
            .await
            .with_context(|| format!("creating sample log {}", self.config.monitoring.sample_log_path))?;

        let monitoring = Arc::new(Monitoring::new(
            self.state.registry.clone(),
            self.state.stats.clone(),
            self.state.forwarding.clone(),
            self.state.installer.clone(),
            Some(sample_log),
            self.config.monitoring.clone(),
        ));
        let mitigation = Arc::new(MitigationEngine::new(
            self.state.registry.clone(),
            self.state.stats.clone(),
            self.state.watchlist.clone(),
            self.state.blocks.clone(),
            self.state.installer.clone(),
            self.config.mitigation.clone(),
        ));

        self.tasks.push(tokio::spawn(run_event_loop(
            self.state.clone(),
            self.dispatcher.clone(),
            events_rx,
            self.shutdown.subscribe(),
        )));
        self.tasks
            .push(tokio::spawn(monitoring.start_monitoring(self.shutdown.subscribe())));
        self.tasks
            .push(tokio::spawn(mitigation.run(self.shutdown.subscribe())));

        info!(
            "Controller started: polling every {}s, mitigation every {}s, static threshold {} bytes/sec",
            self.config.monitoring.poll_interval_seconds,
            self.config.mitigation.interval_seconds,
            self.config.mitigation.static_threshold
        );
        Ok(())
    }

    /// Signal every task to exit and wait for them
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Controller task ended abnormally: {}", e);
            }
        }
        info!("Controller stopped");
    }
}

async fn run_event_loop(
    state: Arc<ControllerState>,
    dispatcher: Arc<EventDispatcher>,
    mut events: mpsc::Receiver<PlatformEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("Starting event loop...");
    loop {
        tokio::select! {
            // Drain queued events before honouring shutdown
            biased;
            event = events.recv() => match event {
                Some(event) => {
                    dispatcher.dispatch(&state, event).await;
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    info!("Event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::core::mitigation::PortState;
    use crate::models::MitigationConfig;
    use crate::platform::frame::build_frame;
    use crate::platform::testing::RecordingSession;
    use crate::platform::{Action, MacAddr, PacketIn, PortCounters, PseudoPort};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.monitoring.sample_log_path = std::env::temp_dir()
            .join(format!("sdn-controller-{}.log", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();
        config.monitoring.poll_interval_seconds = 3600;
        config.mitigation = MitigationConfig {
            interval_seconds: 3600,
            static_threshold: 300_000.0,
            ..MitigationConfig::default()
        };
        config
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let config = test_config();
        let log_path = config.monitoring.sample_log_path.clone();
        let mut controller = Controller::new(config);
        let session = Arc::new(RecordingSession::default());

        controller.start().await.unwrap();
        assert!(controller.start().await.is_err());

        controller
            .events()
            .send(PlatformEvent::DeviceJoined {
                device_id: 1,
                session: session.clone(),
            })
            .await
            .unwrap();
        let state = controller.state();
        tokio::time::timeout(std::time::Duration::from_secs(5), controller.stop())
            .await
            .unwrap();

        assert!(state.registry.get(1).await.is_some());
        assert!(session.flow_mods().iter().any(|fm| fm.priority == 0));
        let _ = tokio::fs::remove_file(log_path).await;
    }

    #[tokio::test]
    async fn test_stats_scenario_normal_then_suspect() {
        let controller = Controller::new(test_config());
        let state = controller.state();
        let t0 = Utc::now();
        state
            .on_device_joined(1, Arc::new(RecordingSession::default()), t0)
            .await
            .unwrap();

        let reply = |rx| vec![PortCounters { port_no: 2, rx_bytes: rx, tx_bytes: 0 }];
        state.on_port_stats_reply(1, &reply(0), t0).await.unwrap();
        state
            .on_port_stats_reply(1, &reply(1_000_000), t0 + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(state.stats.get(1, 2).await.unwrap().rx_throughput, Some(200_000.0));
        assert!(!state.watchlist.contains(1, 2).await);

        state
            .on_port_stats_reply(1, &reply(3_000_000), t0 + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(state.stats.get(1, 2).await.unwrap().rx_throughput, Some(400_000.0));
        assert!(state.watchlist.contains(1, 2).await);
    }

    #[tokio::test]
    async fn test_unknown_destination_scenario_floods() {
        let controller = Controller::new(test_config());
        let state = controller.state();
        let session = Arc::new(RecordingSession::default());
        state.on_device_joined(2, session.clone(), Utc::now()).await.unwrap();
        session.clear();

        let data = build_frame(MacAddr([0, 0, 0, 0, 0, 9]), MacAddr([0, 0, 0, 0, 0, 1]), 0x0800, &[0; 46]);
        let packet = PacketIn {
            in_port: 1,
            buffer_id: None,
            total_len: data.len() as u16,
            data,
        };
        state.on_packet_in(2, &packet, Utc::now()).await.unwrap();

        assert!(session.flow_mods().is_empty());
        let outs = session.packet_outs();
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].actions, vec![Action::output(PseudoPort::Flood)]);
    }

    #[tokio::test]
    async fn test_full_mitigation_cycle() {
        let config = test_config();
        let controller = Controller::new(config.clone());
        let state = controller.state();
        let session = Arc::new(RecordingSession::default());
        let t0 = Utc::now();
        state.on_device_joined(1, session.clone(), t0).await.unwrap();

        let zeros: Vec<PortCounters> = (1..=3)
            .map(|p| PortCounters { port_no: p, rx_bytes: 0, tx_bytes: 0 })
            .collect();
        let surge: Vec<PortCounters> = (1..=3)
            .map(|p| PortCounters { port_no: p, rx_bytes: 2_000_000 + p as u64, tx_bytes: 0 })
            .collect();
        state.on_port_stats_reply(1, &zeros, t0).await.unwrap();
        state
            .on_port_stats_reply(1, &surge, t0 + Duration::seconds(5))
            .await
            .unwrap();

        let engine = MitigationEngine::new(
            state.registry.clone(),
            state.stats.clone(),
            state.watchlist.clone(),
            state.blocks.clone(),
            state.installer.clone(),
            config.mitigation,
        );
        let report = engine.run_cycle(t0).await;
        assert_eq!(report.blocked, vec![(1, 1), (1, 2), (1, 3)]);

        // Traffic stops; ports leave the watchlist but stay blocked for the grace period
        let quiet: Vec<PortCounters> = surge.clone();
        state
            .on_port_stats_reply(1, &quiet, t0 + Duration::seconds(10))
            .await
            .unwrap();
        engine.run_cycle(t0).await;
        engine.run_cycle(t0).await;
        assert_eq!(engine.port_state(1, 1).await, PortState::Blocked { grace_ticks: 2 });

        let report = engine.run_cycle(t0).await;
        assert_eq!(report.unblocked.len(), 3);
        assert_eq!(engine.port_state(1, 1).await, PortState::Normal);
    }
}
