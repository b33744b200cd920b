use crate::{
    error::{Result, RobovacError},
    models::{resolve_model, FALLBACK_MODEL_ID},
    protocol::{describe_dps, encode_set, ingest, DpsMessage, IngestReport, TransportEvent},
    race::RaceHandle,
    registry::ModelRegistry,
    transport::{EventReceiver, Transport},
    types::{
        Command, CommandValue, ConnectionState, RobovacConfig, RobovacStatus, SemanticValue,
        StringValue,
    },
    values::SpecialCommand,
};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

/// Callback receiving the full snapshot and the number of decoded fields
pub type StatusObserver = Arc<dyn Fn(&RobovacStatus, usize) + Send + Sync>;

/// Callback receiving the new value of one command
pub type CommandObserver = Arc<dyn Fn(&CommandValue) + Send + Sync>;

type FetchFuture = Shared<BoxFuture<'static, Result<RobovacStatus>>>;

#[derive(Debug, Default)]
struct StatusCache {
    status: RobovacStatus,
    last_update: Option<Instant>,
    valid: bool,
}

#[derive(Default)]
struct Observers {
    status: Vec<StatusObserver>,
    commands: HashMap<Command, Vec<CommandObserver>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateSource {
    /// Full schema fetch, validates the snapshot
    Fetch,
    /// Unsolicited push, refreshes the timestamp of a valid snapshot
    Push,
    /// Partial refresh, merges values only
    Refresh,
}

/// Typed, cached view of one RoboVac
///
/// `RoboVac` owns the logical connection to a device through a [`Transport`],
/// translates between data point codes and [`Command`]s with the model's
/// [`ModelRegistry`], and keeps the last known [`RobovacStatus`].
///
/// # Caching
///
/// A successful fetch is served from cache for
/// [`RobovacConfig::caching_duration_ms`]. Concurrent reads of a stale
/// snapshot share a single device round-trip. The fetch runs on its own task,
/// so callers that stop waiting never cancel it.
///
/// # Observers
///
/// - [`RoboVac::on_status_update`] fires after every successful fetch and
///   every push that decoded at least one field.
/// - [`RoboVac::on_command_change`] fires when a command's decoded value
///   changes, and for reads whose [`RaceHandle`] expired before the value
///   arrived.
///
/// The handle is cheap to clone; clones share all state.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use robovac::{RoboVac, RobovacConfig, Transport};
///
/// async fn report(transport: Arc<dyn Transport>) -> robovac::Result<()> {
///     let config = RobovacConfig {
///         model: Some("T2118".to_string()),
///         ..Default::default()
///     };
///     let vac = RoboVac::new(config, transport)?;
///
///     if let Some(level) = vac.get_battery_level(None).await? {
///         println!("Battery at {level}%");
///     }
///     vac.set_go_home(true).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RoboVac {
    config: Arc<RobovacConfig>,
    registry: Arc<ModelRegistry>,
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<ConnectionState>>,
    cache: Arc<RwLock<StatusCache>>,
    ongoing: Arc<Mutex<Option<(u64, FetchFuture)>>>,
    fetch_generation: Arc<AtomicU64>,
    observers: Arc<RwLock<Observers>>,
}

impl RoboVac {
    /// Create a device handle for the configured model
    ///
    /// No I/O happens here; the connection is opened on first use or by
    /// [`RoboVac::connect`]. Without a configured model the minimal command
    /// set of [`FALLBACK_MODEL_ID`] is used.
    ///
    /// # Errors
    ///
    /// Returns [`RobovacError::UnsupportedModel`] if the model id is unknown.
    pub fn new(config: RobovacConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let model_id = match config.model.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                warn!(
                    "No model configured for device '{}', falling back to {}",
                    config.connection.device_id, FALLBACK_MODEL_ID
                );
                FALLBACK_MODEL_ID.to_string()
            }
        };

        let registry = resolve_model(&model_id)?;
        info!(
            "Set up RoboVac {} ({})",
            registry.model_name(),
            registry.model_id()
        );

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            transport,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            cache: Arc::new(RwLock::new(StatusCache::default())),
            ongoing: Arc::new(Mutex::new(None)),
            fetch_generation: Arc::new(AtomicU64::new(0)),
            observers: Arc::new(RwLock::new(Observers::default())),
        })
    }

    /// Model id in use
    #[must_use]
    pub fn model_id(&self) -> &str {
        self.registry.model_id()
    }

    /// Command registry of the model
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Device configuration
    #[must_use]
    pub fn config(&self) -> &RobovacConfig {
        &self.config
    }

    /// Deadline presentation-layer reads should race against
    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.config.callback_timeout_ms)
    }

    fn caching_duration(&self) -> Duration {
        Duration::from_millis(self.config.caching_duration_ms)
    }

    /// Current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Whether the snapshot holds a complete fetch that was not invalidated
    pub async fn is_status_valid(&self) -> bool {
        self.cache.read().await.valid
    }

    /// Open a session with the device
    ///
    /// The device is located with a discovery broadcast first unless a fixed
    /// address is configured.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if discovery or connecting fails; the
    /// state is then [`ConnectionState::Disconnected`].
    pub async fn connect(&self) -> Result<()> {
        *self.state.write().await = ConnectionState::Connecting;

        let result = self.open_session().await;
        match &result {
            Ok(()) => {
                *self.state.write().await = ConnectionState::Connected;
                info!("Connected to RoboVac {}", self.registry.model_id());
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                error!(
                    "Failed to connect to RoboVac {}: {}",
                    self.registry.model_id(),
                    e
                );
            }
        }

        result
    }

    async fn open_session(&self) -> Result<()> {
        let connection = &self.config.connection;
        if connection.is_direct_connect() {
            debug!(
                "Connecting to device '{}' at {}",
                connection.device_id,
                connection.device_ip.as_deref().unwrap_or_default()
            );
        } else {
            info!("Searching for device '{}'", connection.device_id);
            self.transport.find().await?;
        }

        self.transport.connect().await
    }

    /// Close the session and forget the snapshot
    ///
    /// A fetch already running keeps running, but later reads no longer join
    /// it.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if closing the session fails.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from RoboVac {}", self.registry.model_id());

        self.ongoing.lock().await.take();
        self.invalidate().await;
        *self.state.write().await = ConnectionState::Disconnected;

        if self.transport.is_connected().await {
            self.transport.disconnect().await?;
        }

        Ok(())
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.transport.is_connected().await {
            *self.state.write().await = ConnectionState::Connected;
            return Ok(());
        }
        self.connect().await
    }

    async fn invalidate(&self) {
        self.cache.write().await.valid = false;
    }

    async fn handle_failure(&self, operation: &str, error: &RobovacError) {
        error!(
            "{} failed for RoboVac {}: {}",
            operation,
            self.registry.model_id(),
            error
        );

        self.invalidate().await;
        *self.state.write().await = ConnectionState::Disconnected;

        if let Err(e) = self.transport.disconnect().await {
            debug!("Ignoring disconnect error after failed {}: {}", operation, e);
        }
    }

    /// Current snapshot, from cache while it is fresh
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_status(&self) -> Result<RobovacStatus> {
        {
            let cache = self.cache.read().await;
            let fresh = cache
                .last_update
                .is_some_and(|at| at.elapsed() <= self.caching_duration());
            if cache.valid && fresh {
                debug!("Serving status of {} from cache", self.registry.model_id());
                return Ok(cache.status.clone());
            }
        }

        self.fetch_from_device().await
    }

    /// Fetch the full status, joining a fetch that is already in flight
    ///
    /// # Errors
    ///
    /// Returns the transport's error; every caller joined to the same fetch
    /// receives the same error.
    pub async fn fetch_from_device(&self) -> Result<RobovacStatus> {
        let fetch = {
            let mut ongoing = self.ongoing.lock().await;
            match ongoing.as_ref() {
                Some((_, fetch)) => {
                    debug!("Joining status fetch already in flight");
                    fetch.clone()
                }
                None => {
                    let (generation, fetch) = self.start_fetch();
                    *ongoing = Some((generation, fetch.clone()));
                    fetch
                }
            }
        };

        fetch.await
    }

    fn start_fetch(&self) -> (u64, FetchFuture) {
        let generation = self.fetch_generation.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();

        let task = tokio::spawn(async move {
            let result = this.execute_fetch().await;

            let mut ongoing = this.ongoing.lock().await;
            if ongoing.as_ref().is_some_and(|(g, _)| *g == generation) {
                *ongoing = None;
            }

            result
        });

        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(RobovacError::Other(format!("Status fetch task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        (generation, fetch)
    }

    async fn execute_fetch(&self) -> Result<RobovacStatus> {
        info!("Fetching status of RoboVac {}", self.registry.model_id());

        let result = async {
            self.ensure_connected().await?;
            self.transport.get_schema().await
        }
        .await;

        match result {
            Ok(message) => {
                debug!("{}", describe_dps(&self.registry, &message));
                Ok(self.apply(&message, UpdateSource::Fetch).await)
            }
            Err(e) => {
                self.handle_failure("Status fetch", &e).await;
                Err(e)
            }
        }
    }

    async fn apply(&self, message: &DpsMessage, source: UpdateSource) -> RobovacStatus {
        let (status, report) = {
            let mut cache = self.cache.write().await;
            let report = ingest(&self.registry, &mut cache.status, message);

            match source {
                UpdateSource::Fetch => {
                    cache.valid = true;
                    cache.last_update = Some(Instant::now());
                }
                UpdateSource::Push if cache.valid => {
                    cache.last_update = Some(Instant::now());
                }
                UpdateSource::Push | UpdateSource::Refresh => {}
            }

            (cache.status.clone(), report)
        };

        let notify_all = source == UpdateSource::Fetch || report.updated > 0;
        self.notify(&status, &report, notify_all).await;

        status
    }

    async fn notify(&self, status: &RobovacStatus, report: &IngestReport, notify_all: bool) {
        let (status_observers, changes) = {
            let observers = self.observers.read().await;
            let changes: Vec<(CommandObserver, CommandValue)> = report
                .changed
                .iter()
                .filter_map(|command| status.get(*command).map(|value| (command, value)))
                .flat_map(|(command, value)| {
                    observers
                        .commands
                        .get(command)
                        .into_iter()
                        .flatten()
                        .map(move |observer| (observer.clone(), value.clone()))
                })
                .collect();
            (observers.status.clone(), changes)
        };

        if notify_all {
            for observer in &status_observers {
                observer(status, report.updated);
            }
        }
        for (observer, value) in &changes {
            observer(value);
        }
    }

    /// Handle one event pushed by the transport
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("RoboVac {} connected", self.registry.model_id());
                *self.state.write().await = ConnectionState::Connected;
            }
            TransportEvent::Disconnected => {
                info!("RoboVac {} disconnected", self.registry.model_id());
                self.invalidate().await;
                *self.state.write().await = ConnectionState::Disconnected;
            }
            TransportEvent::Data(message) => {
                debug!("Received data: {}", describe_dps(&self.registry, &message));
                self.apply(&message, UpdateSource::Push).await;
            }
            TransportEvent::DpRefresh(message) => {
                debug!(
                    "Received refresh: {}",
                    describe_dps(&self.registry, &message)
                );
                self.apply(&message, UpdateSource::Refresh).await;
            }
            TransportEvent::Error(cause) => {
                error!(
                    "Transport error on RoboVac {}: {}",
                    self.registry.model_id(),
                    cause
                );
                if let Err(e) = self.disconnect().await {
                    warn!("Disconnect after transport error failed: {}", e);
                }
            }
        }
    }

    /// Consume transport events until the channel closes
    pub async fn listen(&self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Event channel of RoboVac {} closed", self.registry.model_id());
    }

    /// Run [`RoboVac::listen`] on its own task
    #[must_use]
    pub fn spawn_listener(&self, events: EventReceiver) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.listen(events).await })
    }

    /// Register a callback fired with the whole snapshot after every update
    pub async fn on_status_update<F>(&self, callback: F)
    where
        F: Fn(&RobovacStatus, usize) + Send + Sync + 'static,
    {
        self.observers.write().await.status.push(Arc::new(callback));
    }

    /// Register a callback fired with new values of one command
    pub async fn on_command_change<F>(&self, command: Command, callback: F)
    where
        F: Fn(&CommandValue) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .await
            .commands
            .entry(command)
            .or_default()
            .push(Arc::new(callback));
    }

    async fn read<T>(
        &self,
        command: Command,
        race: Option<&RaceHandle>,
        extract: fn(&RobovacStatus) -> Option<T>,
    ) -> Result<Option<T>> {
        let status = self.get_status().await?;

        if let Some(race) = race.filter(|race| !race.still_active()) {
            if let Some(value) = status.get(command) {
                let observers: Vec<CommandObserver> = self
                    .observers
                    .read()
                    .await
                    .commands
                    .get(&command)
                    .cloned()
                    .unwrap_or_default();

                if !observers.is_empty() {
                    info!(
                        "[{}] Late {} value {}, notifying observers",
                        race, command, value
                    );
                    for observer in &observers {
                        observer(value);
                    }
                }
            }
        }

        Ok(extract(&status))
    }

    async fn cached<T>(&self, extract: fn(&RobovacStatus) -> Option<T>) -> Option<T> {
        let cache = self.cache.read().await;
        if cache.valid {
            extract(&cache.status)
        } else {
            None
        }
    }

    /// Whether the robot is cleaning
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_running(&self, race: Option<&RaceHandle>) -> Result<Option<bool>> {
        self.read(Command::Running, race, RobovacStatus::running)
            .await
    }

    /// Manual driving direction
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_direction(&self, race: Option<&RaceHandle>) -> Result<Option<StringValue>> {
        self.read(Command::Direction, race, RobovacStatus::direction)
            .await
    }

    /// Cleaning program
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_work_mode(&self, race: Option<&RaceHandle>) -> Result<Option<StringValue>> {
        self.read(Command::WorkMode, race, RobovacStatus::work_mode)
            .await
    }

    /// What the robot is doing
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_work_status(
        &self,
        race: Option<&RaceHandle>,
    ) -> Result<Option<StringValue>> {
        self.read(Command::WorkStatus, race, RobovacStatus::work_status)
            .await
    }

    /// Whether the robot is heading home
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_return_home(&self, race: Option<&RaceHandle>) -> Result<Option<bool>> {
        self.read(Command::ReturnHome, race, RobovacStatus::return_home)
            .await
    }

    /// Suction power
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_fan_speed(&self, race: Option<&RaceHandle>) -> Result<Option<StringValue>> {
        self.read(Command::FanSpeed, race, RobovacStatus::fan_speed)
            .await
    }

    /// Whether the robot is beeping
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_find_robot(&self, race: Option<&RaceHandle>) -> Result<Option<bool>> {
        self.read(Command::FindRobot, race, RobovacStatus::find_robot)
            .await
    }

    /// Battery charge in percent
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_battery_level(&self, race: Option<&RaceHandle>) -> Result<Option<i64>> {
        self.read(Command::BatteryLevel, race, RobovacStatus::battery_level)
            .await
    }

    /// Current device error
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a fetch was needed and failed.
    pub async fn get_error_code(&self, race: Option<&RaceHandle>) -> Result<Option<StringValue>> {
        self.read(Command::Error, race, RobovacStatus::error_code)
            .await
    }

    /// Running state from the snapshot, without I/O
    pub async fn running_cached(&self) -> Option<bool> {
        self.cached(RobovacStatus::running).await
    }

    /// Direction from the snapshot, without I/O
    pub async fn direction_cached(&self) -> Option<StringValue> {
        self.cached(RobovacStatus::direction).await
    }

    /// Work mode from the snapshot, without I/O
    pub async fn work_mode_cached(&self) -> Option<StringValue> {
        self.cached(RobovacStatus::work_mode).await
    }

    /// Work status from the snapshot, without I/O
    pub async fn work_status_cached(&self) -> Option<StringValue> {
        self.cached(RobovacStatus::work_status).await
    }

    /// Return-home flag from the snapshot, without I/O
    pub async fn return_home_cached(&self) -> Option<bool> {
        self.cached(RobovacStatus::return_home).await
    }

    /// Fan speed from the snapshot, without I/O
    pub async fn fan_speed_cached(&self) -> Option<StringValue> {
        self.cached(RobovacStatus::fan_speed).await
    }

    /// Find-robot flag from the snapshot, without I/O
    pub async fn find_robot_cached(&self) -> Option<bool> {
        self.cached(RobovacStatus::find_robot).await
    }

    /// Battery level from the snapshot, without I/O
    pub async fn battery_level_cached(&self) -> Option<i64> {
        self.cached(RobovacStatus::battery_level).await
    }

    /// Device error from the snapshot, without I/O
    pub async fn error_code_cached(&self) -> Option<StringValue> {
        self.cached(RobovacStatus::error_code).await
    }

    /// Write a command value to the device
    ///
    /// The value is validated against the model before any I/O; the
    /// connection is opened when needed.
    ///
    /// # Errors
    ///
    /// - [`RobovacError::CommandNotSupported`] if the model lacks the command
    /// - [`RobovacError::TypeMismatch`] if the value kind is wrong
    /// - [`RobovacError::ValueNotSupported`] if the model has no token for
    ///   the semantic value
    /// - the transport's error if connecting or writing fails, after which
    ///   the snapshot is invalid and the session closed
    pub async fn set(&self, command: Command, value: impl Into<CommandValue>) -> Result<()> {
        let value = value.into();
        let request = encode_set(&self.registry, command, &value)?;
        info!("Setting {} to {} (code {})", command, value, request.dps);

        let result = async {
            self.ensure_connected().await?;
            self.transport.set(request).await
        }
        .await;

        if let Err(e) = &result {
            self.handle_failure("Set", e).await;
        }

        result
    }

    /// Start or pause cleaning
    ///
    /// # Errors
    ///
    /// See [`RoboVac::set`].
    pub async fn set_play_pause(&self, running: bool) -> Result<()> {
        self.set(Command::Running, running).await
    }

    /// Drive in a direction, see [`crate::values::Direction`]
    ///
    /// # Errors
    ///
    /// See [`RoboVac::set`].
    pub async fn set_direction(&self, direction: SemanticValue) -> Result<()> {
        self.set(Command::Direction, direction).await
    }

    /// Select a cleaning program, see [`crate::values::WorkMode`]
    ///
    /// # Errors
    ///
    /// See [`RoboVac::set`].
    pub async fn set_work_mode(&self, mode: SemanticValue) -> Result<()> {
        self.set(Command::WorkMode, mode).await
    }

    /// Select the suction power, see [`crate::values::FanSpeed`]
    ///
    /// # Errors
    ///
    /// See [`RoboVac::set`].
    pub async fn set_fan_speed(&self, speed: SemanticValue) -> Result<()> {
        self.set(Command::FanSpeed, speed).await
    }

    /// Send the robot back to its base
    ///
    /// Models that multiplex actions onto a special command only act on
    /// `true`; `false` is a no-op there.
    ///
    /// # Errors
    ///
    /// See [`RoboVac::set`].
    pub async fn set_go_home(&self, go_home: bool) -> Result<()> {
        self.set_action(Command::ReturnHome, SpecialCommand::RETURN_HOME, go_home)
            .await
    }

    /// Make the robot beep
    ///
    /// Models that multiplex actions onto a special command only act on
    /// `true`; `false` is a no-op there.
    ///
    /// # Errors
    ///
    /// See [`RoboVac::set`].
    pub async fn set_find_robot(&self, find: bool) -> Result<()> {
        self.set_action(Command::FindRobot, SpecialCommand::FIND_ROBOT, find)
            .await
    }

    async fn set_action(
        &self,
        command: Command,
        special: SemanticValue,
        enable: bool,
    ) -> Result<()> {
        let multiplexed = !self.registry.supports(command)
            && self.registry.supports(Command::SpecialCommand);
        if !multiplexed {
            return self.set(command, enable).await;
        }

        if enable {
            self.set(Command::SpecialCommand, special).await
        } else {
            debug!(
                "{} cannot be cleared on model {}",
                command,
                self.registry.model_id()
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::SetRequest,
        race::with_deadline,
        transport::{event_channel, mock::MockTransport},
        types::ConnectionConfig,
        values::{DeviceError, Direction, WorkMode},
    };
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio_test::{assert_err, assert_ok};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn e2e_response() -> DpsMessage {
        DpsMessage::new([
            (2, json!(true)),
            (104, json!(57)),
            (106, json!("Stuck_5_min")),
        ])
    }

    fn device_for(model: &str, transport: &Arc<MockTransport>) -> RoboVac {
        let config = RobovacConfig {
            model: Some(model.to_string()),
            ..Default::default()
        };
        RoboVac::new(config, transport.clone()).unwrap()
    }

    async fn record_updates(vac: &RoboVac) -> Arc<StdMutex<Vec<(usize, RobovacStatus)>>> {
        let updates = Arc::new(StdMutex::new(Vec::new()));
        let sink = updates.clone();
        vac.on_status_update(move |status, count| {
            sink.lock().unwrap().push((count, status.clone()));
        })
        .await;
        updates
    }

    async fn record_changes(vac: &RoboVac, command: Command) -> Arc<StdMutex<Vec<CommandValue>>> {
        let changes = Arc::new(StdMutex::new(Vec::new()));
        let sink = changes.clone();
        vac.on_command_change(command, move |value| {
            sink.lock().unwrap().push(value.clone());
        })
        .await;
        changes
    }

    #[test]
    fn test_model_resolution() {
        let transport = Arc::new(MockTransport::default());

        let vac = RoboVac::new(RobovacConfig::default(), transport.clone()).unwrap();
        assert_eq!(vac.model_id(), FALLBACK_MODEL_ID);
        assert_eq!(vac.callback_timeout(), Duration::from_secs(1));

        let config = RobovacConfig {
            model: Some("T9999".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            RoboVac::new(config, transport),
            Err(RobovacError::UnsupportedModel { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_discovers_without_address() {
        init_tracing();
        let transport = Arc::new(MockTransport::default());
        let vac = device_for("T2118", &transport);
        assert_eq!(vac.connection_state().await, ConnectionState::Disconnected);

        assert_ok!(vac.connect().await);
        assert_eq!(transport.find_calls(), 1);
        assert_eq!(transport.connect_calls(), 1);
        assert_eq!(vac.connection_state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_direct_with_address() {
        let transport = Arc::new(MockTransport::default());
        let config = RobovacConfig {
            model: Some("T2118".to_string()),
            connection: ConnectionConfig::new("abc", "key").with_ip("192.168.1.20"),
            ..Default::default()
        };
        let vac = RoboVac::new(config, transport.clone()).unwrap();

        vac.connect().await.unwrap();
        assert_eq!(transport.find_calls(), 0);
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_fetch() {
        let transport =
            Arc::new(MockTransport::new(e2e_response()).with_delay(Duration::from_millis(50)));
        let vac = device_for("T2118", &transport);

        let results = join_all((0..5).map(|_| vac.get_status())).await;

        assert_eq!(transport.get_calls(), 1);
        assert_eq!(transport.connect_calls(), 1);
        let first = results[0].clone().unwrap();
        assert_eq!(first.battery_level(), Some(57));
        for result in &results {
            assert_eq!(result.as_ref().unwrap(), &first);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_served_from_cache() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let vac = device_for("T2118", &transport);

        vac.get_status().await.unwrap();
        assert_eq!(transport.get_calls(), 1);
        assert!(vac.is_status_valid().await);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(vac.get_battery_level(None).await.unwrap(), Some(57));
        assert_eq!(transport.get_calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        vac.get_status().await.unwrap();
        assert_eq!(transport.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_reaches_every_waiter() {
        init_tracing();
        let transport =
            Arc::new(MockTransport::new(e2e_response()).with_delay(Duration::from_millis(10)));
        let vac = device_for("T2118", &transport);
        vac.get_status().await.unwrap();
        assert_eq!(vac.battery_level_cached().await, Some(57));

        let failure = RobovacError::Transport("socket closed".to_string());
        transport.fail_gets(failure.clone());
        tokio::time::advance(Duration::from_secs(61)).await;

        let results = join_all((0..3).map(|_| vac.get_status())).await;

        assert_eq!(transport.get_calls(), 2);
        for result in results {
            assert_eq!(result, Err(failure.clone()));
        }
        assert!(!vac.is_status_valid().await);
        assert_eq!(vac.battery_level_cached().await, None);
        assert_eq!(vac.connection_state().await, ConnectionState::Disconnected);
        assert_eq!(transport.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_then_read_reconnects() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let vac = device_for("T2118", &transport);

        vac.get_status().await.unwrap();
        vac.disconnect().await.unwrap();
        assert!(!vac.is_status_valid().await);
        assert_eq!(transport.disconnect_calls(), 1);

        vac.disconnect().await.unwrap();
        assert_eq!(transport.disconnect_calls(), 1);

        transport.set_response(DpsMessage::new([(104, json!(12))]));
        assert_eq!(vac.get_battery_level(None).await.unwrap(), Some(12));
        assert_eq!(transport.connect_calls(), 2);
        assert_eq!(vac.running_cached().await, Some(true));
    }

    #[tokio::test]
    async fn test_set_validation_happens_before_io() {
        let transport = Arc::new(MockTransport::default());

        let l50 = device_for("T2275", &transport);
        match l50.set(Command::Running, true).await {
            Err(RobovacError::CommandNotSupported { command, model_id }) => {
                assert_eq!(command, Command::Running);
                assert_eq!(model_id, "T2275");
            }
            other => panic!("expected CommandNotSupported, got {other:?}"),
        }

        let classic = device_for("T2118", &transport);
        let result = classic
            .set(
                Command::Running,
                CommandValue::Text(StringValue::Unmapped("true".to_string())),
            )
            .await;
        assert!(matches!(result, Err(RobovacError::TypeMismatch { .. })));

        let error = assert_err!(classic.set_direction(Direction::BRAKE).await);
        assert!(matches!(error, RobovacError::ValueNotSupported { .. }));

        assert_eq!(transport.connect_calls(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_set_connects_lazily_and_writes_token() {
        let transport = Arc::new(MockTransport::default());
        let vac = device_for("T2080", &transport);

        vac.set_work_mode(WorkMode::PAUSE).await.unwrap();
        vac.set_play_pause(false).await.unwrap();

        assert_eq!(transport.connect_calls(), 1);
        assert_eq!(
            transport.sent(),
            vec![
                SetRequest {
                    dps: 152,
                    set: json!("AggN")
                },
                SetRequest {
                    dps: 2,
                    set: json!(false)
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_actions_on_special_command_models() {
        let transport = Arc::new(MockTransport::default());
        let vac = device_for("T2320", &transport);

        vac.set_go_home(true).await.unwrap();
        vac.set_find_robot(true).await.unwrap();
        vac.set_go_home(false).await.unwrap();

        assert_eq!(
            transport.sent(),
            vec![
                SetRequest {
                    dps: 152,
                    set: json!("return_home")
                },
                SetRequest {
                    dps: 152,
                    set: json!("locate")
                },
            ]
        );

        let classic = device_for("T2118", &transport);
        classic.set_go_home(true).await.unwrap();
        assert_eq!(
            transport.sent()[2],
            SetRequest {
                dps: 101,
                set: json!(true)
            }
        );
    }

    #[tokio::test]
    async fn test_push_decodes_and_notifies_once() {
        let transport = Arc::new(MockTransport::default());
        let vac = device_for("T2118", &transport);
        let updates = record_updates(&vac).await;

        vac.handle_event(TransportEvent::Data(e2e_response())).await;

        let updates = updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        let (count, status) = &updates[0];
        assert_eq!(*count, 3);
        assert_eq!(status.running(), Some(true));
        assert_eq!(status.battery_level(), Some(57));
        assert_eq!(
            status.error_code(),
            Some(StringValue::Mapped(DeviceError::STUCK_5_MIN))
        );

        // pushes never validate the snapshot
        assert!(!vac.is_status_valid().await);
        assert_eq!(transport.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_codes_are_ignored() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let vac = device_for("T2118", &transport);
        let updates = record_updates(&vac).await;
        let before = vac.get_status().await.unwrap();

        vac.handle_event(TransportEvent::Data(DpsMessage::new([
            (1, json!(true)),
            (999, json!(5)),
        ])))
        .await;

        assert_eq!(vac.get_status().await.unwrap(), before);
        assert_eq!(updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_command_observers_fire_on_change() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let vac = device_for("T2118", &transport);
        let battery = record_changes(&vac, Command::BatteryLevel).await;

        vac.get_status().await.unwrap();
        vac.handle_event(TransportEvent::DpRefresh(DpsMessage::new([(
            104,
            json!(57),
        )])))
        .await;
        vac.handle_event(TransportEvent::DpRefresh(DpsMessage::new([(
            104,
            json!(56),
        )])))
        .await;

        assert_eq!(
            *battery.lock().unwrap(),
            vec![CommandValue::Number(57), CommandValue::Number(56)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_refreshes_valid_snapshot() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let vac = device_for("T2118", &transport);
        vac.get_status().await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        vac.handle_event(TransportEvent::Data(DpsMessage::new([(104, json!(50))])))
            .await;
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(vac.get_battery_level(None).await.unwrap(), Some(50));
        assert_eq!(transport.get_calls(), 1);

        tokio::time::advance(Duration::from_secs(50)).await;
        vac.handle_event(TransportEvent::DpRefresh(DpsMessage::new([(
            104,
            json!(49),
        )])))
        .await;
        tokio::time::advance(Duration::from_secs(20)).await;
        vac.get_status().await.unwrap();
        assert_eq!(transport.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_and_error_events() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let vac = device_for("T2118", &transport);
        vac.get_status().await.unwrap();

        vac.handle_event(TransportEvent::Disconnected).await;
        assert!(!vac.is_status_valid().await);
        assert_eq!(vac.connection_state().await, ConnectionState::Disconnected);

        vac.get_status().await.unwrap();
        vac.handle_event(TransportEvent::Connected).await;
        assert_eq!(vac.connection_state().await, ConnectionState::Connected);

        vac.handle_event(TransportEvent::Error("checksum mismatch".to_string()))
            .await;
        assert_eq!(transport.disconnect_calls(), 1);
        assert!(!vac.is_status_valid().await);
        assert_eq!(vac.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_fetch_restores_connected_state() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let vac = device_for("T2118", &transport);
        vac.get_status().await.unwrap();

        // the session survives a disconnect notice
        vac.handle_event(TransportEvent::Disconnected).await;
        assert_eq!(vac.connection_state().await, ConnectionState::Disconnected);
        assert!(transport.is_connected().await);

        vac.fetch_from_device().await.unwrap();
        assert_eq!(vac.connection_state().await, ConnectionState::Connected);
        assert!(vac.is_status_valid().await);
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_reaches_reader() {
        let transport = Arc::new(MockTransport::new(e2e_response()));
        let failure = RobovacError::ConnectionFailed("no route to host".to_string());
        transport.fail_connects(failure.clone());
        let vac = device_for("T2118", &transport);

        assert_eq!(vac.get_status().await, Err(failure));
        assert_eq!(vac.connection_state().await, ConnectionState::Disconnected);
        assert!(!vac.is_status_valid().await);
        assert_eq!(transport.get_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_fetch_keeps_new_fetch_shared() {
        let transport =
            Arc::new(MockTransport::new(e2e_response()).with_delay(Duration::from_secs(2)));
        let vac = device_for("T2118", &transport);

        let first = tokio::spawn({
            let vac = vac.clone();
            async move { vac.get_status().await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.get_calls(), 1);

        vac.disconnect().await.unwrap();
        assert!(vac.ongoing.lock().await.is_none());

        let second = tokio::spawn({
            let vac = vac.clone();
            async move { vac.get_status().await }
        });
        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(first.is_finished());
        assert_eq!(transport.get_calls(), 2);

        // the stale fetch must leave the newer marker in place
        let generation = vac.ongoing.lock().await.as_ref().map(|(g, _)| *g);
        assert_eq!(generation, Some(1));

        let third = vac.fetch_from_device().await;
        assert!(third.is_ok());
        assert_eq!(transport.get_calls(), 2);

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert!(vac.ongoing.lock().await.is_none());
        assert_eq!(transport.connect_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_read_notifies_observer() {
        init_tracing();
        let transport =
            Arc::new(MockTransport::new(e2e_response()).with_delay(Duration::from_secs(2)));
        let vac = device_for("T2118", &transport);
        let battery = record_changes(&vac, Command::BatteryLevel).await;

        let handle = Arc::new(RaceHandle::new());
        let reader = vac.clone();
        let read_handle = handle.clone();
        let result = with_deadline(handle.clone(), Duration::from_secs(1), async move {
            reader.get_battery_level(Some(&read_handle)).await
        })
        .await;

        assert_eq!(result, Err(RobovacError::Timeout { timeout_ms: 1000 }));
        assert!(!handle.still_active());
        assert!(battery.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;

        // one change notification from the fetch, one for the abandoned read
        assert_eq!(
            *battery.lock().unwrap(),
            vec![CommandValue::Number(57), CommandValue::Number(57)]
        );
        assert_eq!(vac.battery_level_cached().await, Some(57));
        assert_eq!(transport.get_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_in_time_skips_late_delivery() {
        let transport =
            Arc::new(MockTransport::new(e2e_response()).with_delay(Duration::from_millis(100)));
        let vac = device_for("T2118", &transport);
        let battery = record_changes(&vac, Command::BatteryLevel).await;

        let handle = Arc::new(RaceHandle::new());
        let reader = vac.clone();
        let read_handle = handle.clone();
        let level = with_deadline(handle.clone(), vac.callback_timeout(), async move {
            reader.get_battery_level(Some(&read_handle)).await
        })
        .await
        .unwrap();

        assert_eq!(level, Some(57));
        assert!(handle.still_active());
        assert_eq!(battery.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listener_consumes_events() {
        let transport = Arc::new(MockTransport::default());
        let vac = device_for("T2118", &transport);
        let updates = record_updates(&vac).await;

        let (sender, receiver) = event_channel();
        let listener = vac.spawn_listener(receiver);

        sender.send(TransportEvent::Connected).unwrap();
        sender.send(TransportEvent::Data(e2e_response())).unwrap();
        drop(sender);
        listener.await.unwrap();

        assert_eq!(vac.connection_state().await, ConnectionState::Connected);
        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 3);
    }
}
