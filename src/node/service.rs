use dashmap::DashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::state::Core;
use super::types::{NodeStatus, WhoAmI};
use crate::config::SwimConfig;
use crate::effect::{Effect, TimerKey};
use crate::error::{Result, SwimError};
use crate::event::SwimEvent;
use crate::membership::{Member, NodeAddr};
use crate::metadata::{MetaEntry, NodeMetadata};
use crate::net::{MAX_DATAGRAM_SIZE, Transport};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A SWIM cluster member.
///
/// ```no_run
/// # async fn demo() -> swim_cluster::Result<()> {
/// use swim_cluster::{SwimConfig, SwimNode};
///
/// let mut node = SwimNode::new(SwimConfig::local());
/// let mut events = node.subscribe();
/// let port = node.start().await?;
/// # let _ = (port, events.recv().await);
/// node.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct SwimNode {
    config: SwimConfig,
    events: broadcast::Sender<SwimEvent>,
    generation: u64,
    running: Option<Running>,
}

struct Running {
    runtime: Arc<Runtime>,
    loops: Vec<JoinHandle<()>>,
}

/// An encoded datagram waiting for the core lock to be released.
struct Outbound {
    to: NodeAddr,
    kind: &'static str,
    bytes: Vec<u8>,
}

/// Everything that exists only while the node runs.
struct Runtime {
    generation: u64,
    config: SwimConfig,
    core: Mutex<Core>,
    transport: Transport,
    events: broadcast::Sender<SwimEvent>,

    /// Armed timers. The id tells a firing timer apart from the one that
    /// replaced it under the same key.
    timers: DashMap<TimerKey, (u64, JoinHandle<()>)>,
    next_timer_id: AtomicU64,

    /// Set once `stop` begins. A timer caught mid-firing must not arm new ones.
    stopped: AtomicBool,
}

impl SwimNode {
    pub fn new(config: SwimConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            events,
            generation: 0,
            running: None,
        }
    }

    pub fn config(&self) -> &SwimConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwimEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Binds the socket, starts the join protocol and the background loops.
    /// Returns the bound port.
    pub async fn start(&mut self) -> Result<u16> {
        if self.running.is_some() {
            return Err(SwimError::AlreadyRunning);
        }
        self.config.validate()?;

        let transport = match Transport::bind(self.config.bind_ip, self.config.port).await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!("Failed to start: {}", e);
                let event = match &e {
                    SwimError::Bind { addr, source } => SwimError::Bind {
                        addr: *addr,
                        source: io::Error::new(source.kind(), source.to_string()),
                    },
                    other => SwimError::Io(io::Error::other(other.to_string())),
                };
                let _ = self.events.send(SwimEvent::Error(Arc::new(event)));
                return Err(e);
            }
        };

        let port = transport.local_port();
        self.generation += 1;

        let runtime = Arc::new(Runtime {
            generation: self.generation,
            config: self.config.clone(),
            core: Mutex::new(Core::new(&self.config, port, self.generation)),
            transport,
            events: self.events.clone(),
            timers: DashMap::new(),
            next_timer_id: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        });

        info!("SWIM node listening on {}:{}", self.config.bind_ip, port);
        let _ = self.events.send(SwimEvent::Up(port));

        runtime.run(Core::start).await;

        let loops = vec![
            tokio::spawn(runtime.clone().receive_loop()),
            tokio::spawn(runtime.clone().probe_loop()),
            tokio::spawn(runtime.clone().metadata_loop()),
            tokio::spawn(runtime.clone().cleanup_loop()),
        ];

        tracing::debug!("All background tasks started");
        self.running = Some(Running { runtime, loops });

        Ok(port)
    }

    /// Stops the loops and every timer, then releases the socket. Calling it on
    /// a stopped node does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.runtime.stopped.store(true, Ordering::SeqCst);

        for handle in &running.loops {
            handle.abort();
        }
        for handle in running.loops {
            let _ = handle.await;
        }

        let _ = running.runtime.core.lock().await.stop();
        running.runtime.cancel_timers().await;

        info!("SWIM node stopped");
    }

    pub async fn members(&self) -> Vec<NodeAddr> {
        match &self.running {
            Some(running) => running.runtime.core.lock().await.members(),
            None => Vec::new(),
        }
    }

    pub async fn member_records(&self) -> Vec<Member> {
        match &self.running {
            Some(running) => running.runtime.core.lock().await.member_records(),
            None => Vec::new(),
        }
    }

    pub async fn whoami(&self) -> WhoAmI {
        match &self.running {
            Some(running) => running.runtime.core.lock().await.whoami(),
            None => WhoAmI {
                host: self.config.host.clone(),
                port: self.config.port,
                status: NodeStatus::Stopped,
            },
        }
    }

    pub async fn metadata(&self) -> Vec<NodeMetadata> {
        match &self.running {
            Some(running) => running.runtime.core.lock().await.metadata(),
            None => Vec::new(),
        }
    }

    /// Replaces our own metadata entries and announces them to every member.
    pub async fn set_metadata(&self, entries: Vec<MetaEntry>) -> Result<()> {
        self.runtime()?
            .try_run(|core| core.set_metadata(entries))
            .await
    }

    pub async fn insert_metadata(&self, key: impl Into<String>, value: Vec<u8>) -> Result<()> {
        let key = key.into();
        self.runtime()?
            .try_run(|core| core.insert_metadata(key, value))
            .await
    }

    pub async fn remove_metadata(&self, key: &str) -> Result<()> {
        self.runtime()?.run(|core| core.remove_metadata(key)).await;
        Ok(())
    }

    /// Asks `node` for all the metadata it knows. The answer arrives as a
    /// [`SwimEvent::NewMetadata`] if it contains anything new.
    pub async fn request_all_metadata(&self, node: &NodeAddr) -> Result<()> {
        self.runtime()?
            .run(|core| core.request_all_metadata(node))
            .await;
        Ok(())
    }

    fn runtime(&self) -> Result<&Arc<Runtime>> {
        self.running
            .as_ref()
            .map(|running| &running.runtime)
            .ok_or(SwimError::NotRunning)
    }
}

impl Drop for SwimNode {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.runtime.stopped.store(true, Ordering::SeqCst);
            for handle in &running.loops {
                handle.abort();
            }
            running.runtime.abort_timers();
        }
    }
}

impl Runtime {
    /// Runs one handler against the core and carries out its effects.
    ///
    /// Timers are armed and disarmed before the core lock is released, so a
    /// handler running next always sees the timers this one left behind. Only
    /// the datagrams go out after the lock is dropped.
    async fn run<F>(self: &Arc<Self>, handler: F)
    where
        F: FnOnce(&mut Core) -> Vec<Effect>,
    {
        let outbound = {
            let mut core = self.core.lock().await;
            let effects = handler(&mut *core);
            self.stage(&mut *core, effects)
        };
        self.send_all(outbound).await;
    }

    /// Like [`Runtime::run`] for handlers that can reject their input.
    async fn try_run<F>(self: &Arc<Self>, handler: F) -> Result<()>
    where
        F: FnOnce(&mut Core) -> Result<Vec<Effect>>,
    {
        let outbound = {
            let mut core = self.core.lock().await;
            let effects = handler(&mut *core)?;
            self.stage(&mut *core, effects)
        };
        self.send_all(outbound).await;
        Ok(())
    }

    /// Applies timer and event effects and encodes the datagrams. Must be
    /// called with the same guard the effects were computed under.
    fn stage(self: &Arc<Self>, core: &mut Core, effects: Vec<Effect>) -> Vec<Outbound> {
        if self.is_stopped() {
            return Vec::new();
        }

        let mut outbound = Vec::new();
        for effect in effects {
            match effect {
                Effect::Send { to, message } => {
                    let kind = message.kind();
                    match core.seal(message) {
                        Ok(bytes) => outbound.push(Outbound { to, kind, bytes }),
                        Err(e) => tracing::warn!("Failed to encode {} for {}: {}", kind, to, e),
                    }
                }
                Effect::Arm { timer, after } => self.arm(timer, after),
                Effect::Disarm(timer) => self.disarm(&timer),
                Effect::Emit(event) => {
                    let _ = self.events.send(event);
                }
            }
        }
        outbound
    }

    async fn send_all(&self, outbound: Vec<Outbound>) {
        for Outbound { to, kind, bytes } in outbound {
            match self.transport.send(&to, &bytes).await {
                Ok(()) => tracing::trace!("Sent {} to {}", kind, to),
                Err(e) => {
                    tracing::warn!("Failed to send {} to {}: {}", kind, to, e);
                    let _ = self.events.send(SwimEvent::Error(Arc::new(e)));
                }
            }
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn arm(self: &Arc<Self>, timer: TimerKey, after: Duration) {
        if self.is_stopped() {
            return;
        }

        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let runtime = Arc::clone(self);
        let key = timer.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            runtime.fire(id, key).await;
        });

        if let Some((_, (_, previous))) = self.timers.remove(&timer) {
            previous.abort();
        }
        self.timers.insert(timer, (id, handle));
    }

    fn disarm(&self, timer: &TimerKey) {
        if let Some((_, (_, handle))) = self.timers.remove(timer) {
            handle.abort();
        }
    }

    async fn fire(self: Arc<Self>, id: u64, timer: TimerKey) {
        // Once removed, a concurrent disarm can no longer abort this firing
        // half-way through.
        if self
            .timers
            .remove_if(&timer, |_, (armed, _)| *armed == id)
            .is_none()
        {
            return;
        }

        let generation = self.generation;
        self.run(|core| core.handle_timer(generation, timer)).await;
    }

    async fn cancel_timers(&self) {
        let keys: Vec<TimerKey> = self.timers.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<JoinHandle<()>> = keys
            .iter()
            .filter_map(|key| self.timers.remove(key).map(|(_, (_, handle))| handle))
            .collect();

        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn abort_timers(&self) {
        for entry in self.timers.iter() {
            entry.value().1.abort();
        }
        self.timers.clear();
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            match self.transport.recv(&mut buf).await {
                Ok((sender, message)) => {
                    self.run(|core| core.handle_message(sender, message)).await;
                }
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn probe_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            self.run(Core::probe_tick).await;
        }
    }

    async fn metadata_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.metadata_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;

            self.run(Core::metadata_tick).await;
        }
    }

    async fn cleanup_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.cleanup_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            self.core.lock().await.cleanup(Instant::now());
        }
    }
}
