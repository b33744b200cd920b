use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use robovac::{
    event_channel, with_deadline, Command, DpsMessage, EventSender, RaceHandle,
    Result, RoboVac, RobovacConfig, SetRequest, Transport, TransportEvent,
};
use serde_json::json;
use tracing::info;

/// Simulated RoboVac 15C that keeps its data points in memory
struct SimulatedVac {
    connected: AtomicBool,
    dps: Mutex<DpsMessage>,
    events: EventSender,
}

impl SimulatedVac {
    fn new(events: EventSender) -> Self {
        Self {
            connected: AtomicBool::new(false),
            dps: Mutex::new(DpsMessage::new([
                (2, json!(false)),
                (15, json!("Sleeping")),
                (101, json!(false)),
                (103, json!(false)),
                (104, json!(83)),
                (106, json!("no_error")),
            ])),
            events,
        }
    }
}

#[async_trait]
impl Transport for SimulatedVac {
    async fn find(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_schema(&self) -> Result<DpsMessage> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(self.dps.lock().map(|dps| dps.clone()).unwrap_or_default())
    }

    async fn set(&self, request: SetRequest) -> Result<()> {
        let changed = DpsMessage::new([(request.dps, request.set)]);
        if let Ok(mut dps) = self.dps.lock() {
            dps.dps.extend(changed.dps.clone());
        }
        let _ = self.events.send(TransportEvent::Data(changed));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🧹 RoboVac Basic Control Example");

    let (sender, receiver) = event_channel();
    let transport = Arc::new(SimulatedVac::new(sender));

    let config = RobovacConfig {
        model: Some("T2118".to_string()),
        ..Default::default()
    };
    let vac = RoboVac::new(config, transport)?;
    let listener = vac.spawn_listener(receiver);

    vac.on_status_update(|status, updated| {
        println!("📊 {updated} fields updated");
        for (command, value) in status.iter() {
            println!("   {command}: {value}");
        }
    })
    .await;
    vac.on_command_change(Command::Running, |value| {
        println!("▶️  Running is now {value}");
    })
    .await;

    // Race a read against the presentation-layer deadline
    let handle = Arc::new(RaceHandle::new());
    let reader = vac.clone();
    let read_handle = handle.clone();
    let level = with_deadline(handle, vac.callback_timeout(), async move {
        reader.get_battery_level(Some(&read_handle)).await
    })
    .await?;
    info!("🔋 Battery level: {:?}", level);

    vac.set_play_pause(true).await?;
    vac.set_find_robot(true).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!("🔎 Find robot: {:?}", vac.find_robot_cached().await);

    vac.set_go_home(true).await?;
    vac.disconnect().await?;

    drop(vac);
    listener.abort();
    info!("✅ Done");

    Ok(())
}
