use std::time::{Duration, Instant};

use crate::config::SwimConfig;
use crate::dissemination::DisseminationEngine;
use crate::effect::{Effect, TimerKey};
use crate::error::{Result, SwimError};
use crate::event::SwimEvent;
use crate::failure::FailureDetector;
use crate::join::{JoinProtocol, JoinState};
use crate::membership::{Member, MemberState, MembershipTable, NodeAddr, TableEvent};
use crate::metadata::{MetaEntry, MetadataStore, NodeMetadata};
use crate::net::{self, Message};

use super::types::{NodeStatus, WhoAmI};

/// Protocol state of one running node.
///
/// Owns every component by value and routes inbound messages and timer
/// firings to them. Never performs I/O: every handler returns the effects the
/// runtime must carry out.
pub struct Core {
    generation: u64,
    port: u16,
    suspect_timeout: Duration,

    table: MembershipTable,
    dissemination: DisseminationEngine,
    detector: FailureDetector,
    join: JoinProtocol,
    metadata: MetadataStore,
}

impl Core {
    pub fn new(config: &SwimConfig, port: u16, generation: u64) -> Self {
        let mut table = MembershipTable::new(None);
        if let Some(host) = config.initial_host() {
            table.set_me(NodeAddr::new(host, port));
        }

        Self {
            generation,
            port,
            suspect_timeout: config.suspect_timeout(),
            table,
            dissemination: DisseminationEngine::new(config),
            detector: FailureDetector::new(config),
            join: JoinProtocol::new(config, port),
            metadata: MetadataStore::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn start(&mut self) -> Vec<Effect> {
        self.join.start()
    }

    pub fn stop(&mut self) -> Vec<Effect> {
        let mut effects = self.join.stop();
        effects.extend(self.detector.stop());
        effects
    }

    // ==================== Inbound ====================

    /// Applies the piggybacked updates, then dispatches by message kind.
    pub fn handle_message(&mut self, sender: NodeAddr, mut message: Message) -> Vec<Effect> {
        tracing::trace!("Received {} from {}", message.kind(), sender);

        let updates = message.take_updates();
        self.dissemination.accept_incoming(&mut self.table, updates);

        let mut effects = match message {
            Message::Join { destination } => self.join.on_join(
                &mut self.table,
                &mut self.dissemination,
                &sender,
                &destination,
            ),
            Message::JoinAck {
                destination,
                members,
            } => self.join.on_join_ack(
                &mut self.table,
                &mut self.dissemination,
                &sender,
                &destination,
                members,
            ),
            Message::Ping { .. } => self.detector.on_ping(&sender),
            Message::PingReq { request, .. } => {
                self.detector.on_ping_req(&self.table, &sender, request)
            }
            Message::Ack { request, .. } => self.detector.on_ack(
                &mut self.table,
                &mut self.dissemination,
                &sender,
                request,
            ),
            Message::Meta { metadata } => {
                if self.metadata.merge(metadata, self.table.me()) {
                    vec![self.new_metadata_event()]
                } else {
                    Vec::new()
                }
            }
            Message::AllMeta { .. } => vec![Effect::Send {
                to: sender.clone(),
                message: Message::Meta {
                    metadata: self.metadata.all(self.table.me()),
                },
            }],
        };

        self.drain_table_events(&mut effects);
        effects
    }

    /// Timer firings from another generation are stale and ignored.
    ///
    /// A running node never delivers one: each start builds a fresh core and
    /// `stop` aborts every timer before the next start. The check is a second
    /// line of defence should a timer outlive its runtime.
    pub fn handle_timer(&mut self, generation: u64, timer: TimerKey) -> Vec<Effect> {
        if generation != self.generation {
            tracing::debug!(
                "Ignoring {:?} from generation {} (current {})",
                timer,
                generation,
                self.generation
            );
            return Vec::new();
        }

        let mut effects = match timer {
            TimerKey::Ping(target) => {
                self.detector
                    .on_ping_timeout(&mut self.table, &mut self.dissemination, &target)
            }
            TimerKey::PingReq(target) => {
                self.detector
                    .on_ping_req_timeout(&mut self.table, &mut self.dissemination, &target)
            }
            TimerKey::Suspect(node) => {
                self.dissemination.mark_faulty(&mut self.table, &node);
                Vec::new()
            }
            TimerKey::Join => self.join.on_timeout(),
        };

        self.drain_table_events(&mut effects);
        effects
    }

    // ==================== Periodic ====================

    pub fn probe_tick(&mut self) -> Vec<Effect> {
        let mut effects = self.detector.tick(&mut self.table);
        self.drain_table_events(&mut effects);
        effects
    }

    /// Pushes our own metadata to the next pingable member.
    pub fn metadata_tick(&mut self) -> Vec<Effect> {
        let Some(me) = self.table.me().cloned() else {
            return Vec::new();
        };
        let Some(member) = self.table.pingable_member() else {
            return Vec::new();
        };

        vec![Effect::Send {
            to: member.node,
            message: Message::Meta {
                metadata: vec![self.metadata.own(&me)],
            },
        }]
    }

    pub fn cleanup(&mut self, now: Instant) {
        self.dissemination.prune(now);
    }

    // ==================== Outbound ====================

    /// Encodes a message, filling its piggyback slot with the next batch of
    /// pending updates.
    ///
    /// The batch is only taken from the queue once the datagram fits. An
    /// oversized one is retried with half as many updates.
    pub fn seal(&mut self, mut message: Message) -> Result<Vec<u8>> {
        if message.updates_mut().is_none() {
            return net::encode(&message);
        }

        let mut count = self.dissemination.batch_size();
        loop {
            if let Some(slot) = message.updates_mut() {
                *slot = self.dissemination.peek_batch(count);
            }

            match net::encode(&message) {
                Ok(bytes) => {
                    let member_count = self.table.len();
                    self.dissemination.take_batch(member_count, count);
                    return Ok(bytes);
                }
                Err(SwimError::DatagramTooLarge { size, .. }) if count > 0 => {
                    tracing::debug!(
                        "{} with {} update(s) is {} bytes, shrinking the batch",
                        message.kind(),
                        count,
                        size
                    );
                    count /= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ==================== Metadata ====================

    pub fn set_metadata(&mut self, entries: Vec<MetaEntry>) -> Result<Vec<Effect>> {
        self.metadata.set_entries(entries)?;
        Ok(self.announce_metadata())
    }

    pub fn insert_metadata(&mut self, key: String, value: Vec<u8>) -> Result<Vec<Effect>> {
        self.metadata.insert(key, value)?;
        Ok(self.announce_metadata())
    }

    pub fn remove_metadata(&mut self, key: &str) -> Vec<Effect> {
        self.metadata.remove(key);
        self.announce_metadata()
    }

    pub fn request_all_metadata(&self, node: &NodeAddr) -> Vec<Effect> {
        vec![Effect::Send {
            to: node.clone(),
            message: Message::AllMeta {
                destination: node.clone(),
            },
        }]
    }

    pub fn metadata(&self) -> Vec<NodeMetadata> {
        self.metadata.all(self.table.me())
    }

    /// Sends our metadata to every other member. Skipped until we know who we are.
    fn announce_metadata(&self) -> Vec<Effect> {
        let Some(me) = self.table.me() else {
            return Vec::new();
        };
        let own = self.metadata.own(me);

        self.table
            .others()
            .into_iter()
            .map(|node| Effect::Send {
                to: node,
                message: Message::Meta {
                    metadata: vec![own.clone()],
                },
            })
            .collect()
    }

    fn new_metadata_event(&self) -> Effect {
        Effect::Emit(SwimEvent::NewMetadata(self.metadata()))
    }

    // ==================== Queries ====================

    pub fn members(&self) -> Vec<NodeAddr> {
        self.table.nodes()
    }

    pub fn member_records(&self) -> Vec<Member> {
        self.table.members().to_vec()
    }

    pub fn status(&self) -> NodeStatus {
        match self.join.state() {
            JoinState::Joined => NodeStatus::Joined,
            _ => NodeStatus::Started,
        }
    }

    pub fn whoami(&self) -> WhoAmI {
        WhoAmI {
            host: self.table.me().map(|me| me.host.clone()),
            port: self.port,
            status: self.status(),
        }
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn dissemination(&self) -> &DisseminationEngine {
        &self.dissemination
    }

    /// Turns table change signals into events, suspicion timers and probe
    /// cleanup.
    fn drain_table_events(&mut self, effects: &mut Vec<Effect>) {
        for event in self.table.take_events() {
            match event {
                TableEvent::PeerUp(node) => {
                    if let Some(me) = self.table.me() {
                        effects.push(Effect::Send {
                            to: node.clone(),
                            message: Message::Meta {
                                metadata: vec![self.metadata.own(me)],
                            },
                        });
                    }
                    effects.push(Effect::Emit(SwimEvent::PeerUp(node)));
                }
                TableEvent::PeerDown(node) => {
                    effects.push(Effect::Disarm(TimerKey::Suspect(node.clone())));
                    effects.extend(self.detector.forget(&node));
                    effects.push(Effect::Emit(SwimEvent::PeerDown(node.clone())));
                    if self.metadata.forget(&node) {
                        effects.push(self.new_metadata_event());
                    }
                }
                TableEvent::Suspected { node, .. } => {
                    effects.push(Effect::Arm {
                        timer: TimerKey::Suspect(node.clone()),
                        after: self.suspect_timeout,
                    });
                    effects.push(Effect::Emit(SwimEvent::PeerSuspected(node)));
                }
                TableEvent::Replaced => {
                    // Suspicions inherited from a join snapshot still expire.
                    for member in self.table.members() {
                        if member.state == MemberState::Suspect {
                            effects.push(Effect::Arm {
                                timer: TimerKey::Suspect(member.node.clone()),
                                after: self.suspect_timeout,
                            });
                        }
                    }
                    effects.push(Effect::Emit(SwimEvent::UpdatedMembers(self.table.nodes())));
                }
            }
        }
    }
}
