use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::types::Update;
use crate::config::SwimConfig;
use crate::membership::{MemberState, MembershipTable, NodeAddr};

pub struct DisseminationEngine {
    /// Pending updates, ascending by `gossip_count`. Ties keep insertion order.
    queue: Vec<Update>,

    /// uuids of evicted updates and when they were evicted.
    expired: HashMap<Uuid, Instant>,

    /// Nodes recently declared FAULTY: incarnation at removal and when.
    recent_faulty: HashMap<NodeAddr, (u64, Instant)>,

    max_batch: usize,
    factor: f64,
    expired_retention: Duration,
    faulty_retention: Duration,
}

impl DisseminationEngine {
    pub fn new(config: &SwimConfig) -> Self {
        Self {
            queue: Vec::new(),
            expired: HashMap::new(),
            recent_faulty: HashMap::new(),
            max_batch: config.updates_max_size,
            factor: config.dissemination_factor,
            expired_retention: config.expired_retention(),
            faulty_retention: config.faulty_retention(),
        }
    }

    /// How many times an update is piggybacked before eviction, given the
    /// current member count. Always at least once.
    pub fn limit(&self, member_count: usize) -> u32 {
        let limit = (self.factor * ((member_count + 1) as f64).log10()).ceil();
        (limit as u32).max(1)
    }

    /// Takes the next batch to piggyback on an outbound message.
    ///
    /// Returns the least gossiped updates first, at most `updates_max_size` of
    /// them, and bumps their counters. Updates that reached the limit are evicted
    /// and their uuids move to the expiry set.
    pub fn outbound_updates(&mut self, member_count: usize) -> Vec<Update> {
        self.take_batch(member_count, self.max_batch)
    }

    /// Number of updates the next outbound batch will carry.
    pub fn batch_size(&self) -> usize {
        self.queue.len().min(self.max_batch)
    }

    /// The first `count` updates [`take_batch`](Self::take_batch) would return,
    /// leaving the queue untouched.
    pub fn peek_batch(&self, count: usize) -> Vec<Update> {
        self.queue
            .iter()
            .take(count.min(self.max_batch))
            .cloned()
            .collect()
    }

    /// Like [`outbound_updates`](Self::outbound_updates) with at most `count`
    /// updates.
    pub fn take_batch(&mut self, member_count: usize, count: usize) -> Vec<Update> {
        if self.queue.is_empty() || count == 0 {
            return Vec::new();
        }

        let limit = self.limit(member_count);
        let take = self.queue.len().min(self.max_batch).min(count);

        let mut batch = Vec::with_capacity(take);
        for update in self.queue.iter_mut().take(take) {
            update.gossip_count += 1;
            batch.push(update.clone());
        }

        let now = Instant::now();
        let mut kept = Vec::with_capacity(self.queue.len());
        for update in self.queue.drain(..) {
            if update.gossip_count >= limit {
                tracing::trace!(
                    "Update {} about {} expired after {} rounds",
                    update.uuid,
                    update.node,
                    update.gossip_count
                );
                self.expired.insert(update.uuid, now);
            } else {
                kept.push(update);
            }
        }

        // The batch was a prefix and each of its counters grew by one, so this is
        // a merge of two sorted runs.
        kept.sort_by_key(|u| u.gossip_count);
        self.queue = kept;

        batch
    }

    /// Queues an update for dissemination.
    ///
    /// `uuid` is `None` for assertions made by this node; a fresh one is
    /// generated. Returns `false` when the update was dropped because its uuid
    /// already expired or an equivalent claim is already queued.
    pub fn enqueue(
        &mut self,
        node: NodeAddr,
        set_by: NodeAddr,
        state: MemberState,
        incarnation: u64,
        uuid: Option<Uuid>,
    ) -> bool {
        if let Some(uuid) = &uuid
            && self.is_known(uuid)
        {
            return false;
        }

        if self
            .queue
            .iter()
            .any(|u| u.is_equivalent(&node, state, incarnation))
        {
            return false;
        }

        let mut update = Update::new(node, set_by, state, incarnation);
        if let Some(uuid) = uuid {
            update.uuid = uuid;
        }

        tracing::debug!(
            "Queued {:?} update about {} (inc={})",
            update.state,
            update.node,
            update.incarnation
        );

        let index = self.queue.partition_point(|u| u.gossip_count == 0);
        self.queue.insert(index, update);

        true
    }

    /// Processes the updates piggybacked on one inbound message.
    ///
    /// A FAULTY claim about a node discards every ALIVE/SUSPECT claim about the
    /// same node in this batch. The rest is applied ALIVE first, then SUSPECT,
    /// then FAULTY.
    pub fn accept_incoming(&mut self, table: &mut MembershipTable, updates: Vec<Update>) {
        if updates.is_empty() {
            return;
        }

        let faulty_nodes: HashSet<NodeAddr> = updates
            .iter()
            .filter(|u| u.state == MemberState::Faulty)
            .map(|u| u.node.clone())
            .collect();

        let mut alive = Vec::new();
        let mut suspect = Vec::new();
        let mut faulty = Vec::new();

        for update in updates {
            match update.state {
                MemberState::Faulty => faulty.push(update),
                _ if faulty_nodes.contains(&update.node) => {
                    tracing::trace!(
                        "Dropping {:?} about {}: FAULTY claim in the same batch",
                        update.state,
                        update.node
                    );
                }
                MemberState::Alive => alive.push(update),
                MemberState::Suspect => suspect.push(update),
            }
        }

        for update in alive {
            self.resolve_alive(table, update);
        }
        for update in suspect {
            self.resolve_suspect(table, update);
        }
        for update in faulty {
            self.resolve_faulty(table, update);
        }
    }

    fn resolve_alive(&mut self, table: &mut MembershipTable, update: Update) {
        if self.is_known(&update.uuid) || table.is_me(&update.node) {
            return;
        }

        if self.recently_faulty(&update.node, update.incarnation) {
            tracing::debug!(
                "Ignoring stale ALIVE about {} (inc={}): recently FAULTY",
                update.node,
                update.incarnation
            );
            return;
        }

        let accept = match table.find(&update.node) {
            None => true,
            Some(member) => member.incarnation <= update.incarnation,
        };

        if accept {
            table.add_or_update(
                update.node.clone(),
                MemberState::Alive,
                update.set_by.clone(),
                update.incarnation,
            );
            self.propagate(update);
        }
    }

    fn resolve_suspect(&mut self, table: &mut MembershipTable, update: Update) {
        if self.is_known(&update.uuid) {
            return;
        }

        if table.is_me(&update.node) {
            self.defend_self(table, update.incarnation);
            return;
        }

        if self.recently_faulty(&update.node, update.incarnation) {
            return;
        }

        let accept = match table.find(&update.node) {
            None => true,
            Some(member) => member.incarnation <= update.incarnation,
        };

        if accept {
            if table.find(&update.node).map(|m| m.state) != Some(MemberState::Suspect) {
                tracing::info!(
                    "{} suspects {} (inc={})",
                    update.set_by,
                    update.node,
                    update.incarnation
                );
            }
            table.add_or_update(
                update.node.clone(),
                MemberState::Suspect,
                update.set_by.clone(),
                update.incarnation,
            );
            self.propagate(update);
        }
    }

    fn resolve_faulty(&mut self, table: &mut MembershipTable, update: Update) {
        if self.is_known(&update.uuid) {
            return;
        }

        if table.is_me(&update.node) {
            self.defend_self(table, update.incarnation);
            return;
        }

        let accept = match table.find(&update.node) {
            None => false,
            Some(member) => member.incarnation <= update.incarnation,
        };

        if accept {
            tracing::info!(
                "{} declared {} FAULTY (inc={})",
                update.set_by,
                update.node,
                update.incarnation
            );
            table.remove(&update.node);
            self.remember_faulty(update.node.clone(), update.incarnation);
            self.propagate(update);
        }
    }

    /// Answers a SUSPECT/FAULTY claim about ourselves with a fresh ALIVE whose
    /// incarnation beats the claim.
    fn defend_self(&mut self, table: &mut MembershipTable, claimed: u64) {
        let Some(me) = table.me().cloned() else {
            return;
        };

        let incarnation = table.refute(claimed);
        self.enqueue(me.clone(), me, MemberState::Alive, incarnation, None);
    }

    fn propagate(&mut self, update: Update) {
        self.enqueue(
            update.node,
            update.set_by,
            update.state,
            update.incarnation,
            Some(update.uuid),
        );
    }

    /// Records a state decided by this node and queues it for dissemination.
    pub fn record(
        &mut self,
        table: &mut MembershipTable,
        node: NodeAddr,
        state: MemberState,
        set_by: NodeAddr,
        incarnation: u64,
    ) {
        table.add_or_update(node.clone(), state, set_by.clone(), incarnation);
        if state == MemberState::Faulty {
            self.remember_faulty(node.clone(), incarnation);
        }
        self.enqueue(node, set_by, state, incarnation, None);
    }

    /// A SUSPECT member answered a probe: move it back to ALIVE.
    pub fn mark_alive(&mut self, table: &mut MembershipTable, node: &NodeAddr) -> bool {
        let Some(me) = table.me().cloned() else {
            return false;
        };

        match table.find(node) {
            Some(member) if member.state == MemberState::Suspect => {
                let incarnation = member.incarnation;
                tracing::info!("{} answered, back to ALIVE (inc={})", node, incarnation);
                self.record(table, node.clone(), MemberState::Alive, me, incarnation);
                true
            }
            _ => false,
        }
    }

    /// The probe cycle for `node` failed: move it from ALIVE to SUSPECT.
    pub fn mark_suspect(&mut self, table: &mut MembershipTable, node: &NodeAddr) -> bool {
        let Some(me) = table.me().cloned() else {
            return false;
        };

        match table.find(node) {
            Some(member) if member.state == MemberState::Alive => {
                let incarnation = member.incarnation;
                tracing::info!("Marking {} SUSPECT (inc={})", node, incarnation);
                self.record(table, node.clone(), MemberState::Suspect, me, incarnation);
                true
            }
            _ => false,
        }
    }

    /// The suspicion timer for `node` expired: if it is still SUSPECT, remove
    /// it and queue the FAULTY update.
    pub fn mark_faulty(&mut self, table: &mut MembershipTable, node: &NodeAddr) -> bool {
        let Some(me) = table.me().cloned() else {
            return false;
        };

        match table.find(node) {
            Some(member) if member.state == MemberState::Suspect => {
                let incarnation = member.incarnation;
                tracing::info!("Suspicion of {} expired, marking FAULTY", node);
                self.record(table, node.clone(), MemberState::Faulty, me, incarnation);
                true
            }
            _ => false,
        }
    }

    /// Drops expiry-set entries older than their retention window.
    pub fn prune(&mut self, now: Instant) {
        let expired_retention = self.expired_retention;
        self.expired
            .retain(|_, at| now.saturating_duration_since(*at) < expired_retention);

        let faulty_retention = self.faulty_retention;
        self.recent_faulty
            .retain(|_, (_, at)| now.saturating_duration_since(*at) < faulty_retention);
    }

    /// Whether an assertion with this uuid is queued or recently expired.
    pub fn is_known(&self, uuid: &Uuid) -> bool {
        self.expired.contains_key(uuid) || self.queue.iter().any(|u| &u.uuid == uuid)
    }

    pub fn pending(&self) -> &[Update] {
        &self.queue
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.expired.clear();
        self.recent_faulty.clear();
    }

    fn remember_faulty(&mut self, node: NodeAddr, incarnation: u64) {
        self.recent_faulty.insert(node, (incarnation, Instant::now()));
    }

    fn recently_faulty(&self, node: &NodeAddr, incarnation: u64) -> bool {
        matches!(self.recent_faulty.get(node), Some((at_removal, _)) if incarnation <= *at_removal)
    }
}
