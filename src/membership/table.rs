use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{HashSet, VecDeque};

use super::types::{Member, MemberState, NodeAddr};

/// Change signals produced by table mutations.
///
/// The table has no knowledge of networking or timers; whoever owns it drains
/// these after each mutation and reacts (peer notifications, suspicion timers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    /// A previously unknown node was added as ALIVE. Never raised for self.
    PeerUp(NodeAddr),
    /// A node was removed from the table. Never raised for self.
    PeerDown(NodeAddr),
    /// A node entered SUSPECT with the given incarnation.
    Suspected { node: NodeAddr, incarnation: u64 },
    /// The whole list was replaced by a join snapshot.
    Replaced,
}

/// Outcome of [`MembershipTable::add_or_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberChange {
    Added,
    Updated,
    Removed,
    Unknown,
}

pub struct MembershipTable {
    /// Our own identity. `None` until the externally visible host is known.
    me: Option<NodeAddr>,

    /// Our own incarnation number. Only this node ever raises it.
    incarnation: u64,

    /// ALIVE and SUSPECT members, in probe order.
    members: Vec<Member>,

    /// Index of the next member handed out by `next_probe_targets`.
    cursor: usize,

    events: VecDeque<TableEvent>,
}

impl MembershipTable {
    pub fn new(me: Option<NodeAddr>) -> Self {
        Self {
            me,
            incarnation: 0,
            members: Vec::new(),
            cursor: 0,
            events: VecDeque::new(),
        }
    }

    pub fn me(&self) -> Option<&NodeAddr> {
        self.me.as_ref()
    }

    /// Learns our own identity and records ourselves as ALIVE.
    pub fn set_me(&mut self, me: NodeAddr) {
        tracing::info!("Local identity is now {}", me);
        self.me = Some(me.clone());
        self.add_or_update(me.clone(), MemberState::Alive, me, self.incarnation);
    }

    pub fn is_me(&self, node: &NodeAddr) -> bool {
        self.me.as_ref() == Some(node)
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    /// Raises our incarnation above `claimed` (if it is not already) and
    /// re-records ourselves as ALIVE. Returns the incarnation to assert.
    pub fn refute(&mut self, claimed: u64) -> u64 {
        if self.incarnation <= claimed {
            self.incarnation = claimed + 1;
            tracing::info!("Refuting claim about self, incarnation now {}", self.incarnation);
        }

        if let Some(me) = self.me.clone() {
            self.add_or_update(me.clone(), MemberState::Alive, me, self.incarnation);
        }

        self.incarnation
    }

    /// Inserts `node` at a random position, or overwrites its record in place.
    ///
    /// A FAULTY state is never stored: it removes the member instead.
    pub fn add_or_update(
        &mut self,
        node: NodeAddr,
        state: MemberState,
        set_by: NodeAddr,
        incarnation: u64,
    ) -> MemberChange {
        if state == MemberState::Faulty {
            return match self.remove(&node) {
                Some(_) => MemberChange::Removed,
                None => MemberChange::Unknown,
            };
        }

        if let Some(current) = self.members.iter_mut().find(|m| m.node == node) {
            let was = current.state;
            current.state = state;
            current.set_by = set_by;
            current.incarnation = incarnation;

            if was != MemberState::Suspect && state == MemberState::Suspect {
                self.events.push_back(TableEvent::Suspected { node, incarnation });
            }

            return MemberChange::Updated;
        }

        let index = rand::thread_rng().gen_range(0..=self.members.len());
        if index < self.cursor {
            self.cursor += 1;
        }

        let is_me = self.is_me(&node);
        match state {
            MemberState::Alive if !is_me => {
                tracing::info!("Peer {} is up (inc={})", node, incarnation);
                self.events.push_back(TableEvent::PeerUp(node.clone()));
            }
            MemberState::Suspect => {
                self.events.push_back(TableEvent::Suspected {
                    node: node.clone(),
                    incarnation,
                });
            }
            _ => {}
        }

        self.members.insert(
            index,
            Member {
                node,
                state,
                set_by,
                incarnation,
            },
        );

        MemberChange::Added
    }

    pub fn remove(&mut self, node: &NodeAddr) -> Option<Member> {
        let index = self.members.iter().position(|m| &m.node == node)?;
        let removed = self.members.remove(index);

        if index < self.cursor {
            self.cursor -= 1;
        }

        if !self.is_me(node) {
            tracing::info!("Peer {} is down", node);
            self.events.push_back(TableEvent::PeerDown(node.clone()));
        }

        Some(removed)
    }

    pub fn find(&self, node: &NodeAddr) -> Option<&Member> {
        self.members.iter().find(|m| &m.node == node)
    }

    /// Replaces the entire list with a join snapshot.
    ///
    /// Duplicate identities in the snapshot keep their first occurrence. A record
    /// about ourselves never lowers our own incarnation.
    pub fn replace_all(&mut self, snapshot: Vec<Member>) {
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(snapshot.len());

        for member in snapshot {
            if member.state == MemberState::Faulty || !seen.insert(member.node.clone()) {
                continue;
            }
            if self.is_me(&member.node) && member.incarnation > self.incarnation {
                self.incarnation = member.incarnation;
            }
            members.push(member);
        }

        members.shuffle(&mut rand::thread_rng());
        self.members = members;
        self.cursor = 0;
        self.events.push_back(TableEvent::Replaced);
    }

    /// Returns up to `count` members, walking the table circularly from the
    /// persistent cursor and skipping anything in `exclude`.
    ///
    /// Each call visits every member at most once. If the walk passes the end of
    /// the table, the table is reshuffled and the cursor restarts at 0.
    pub fn next_probe_targets(&mut self, exclude: &[&NodeAddr], count: usize) -> Vec<Member> {
        let mut picked = Vec::new();
        if count == 0 || self.members.is_empty() {
            return picked;
        }

        if self.cursor >= self.members.len() {
            self.cursor = 0;
        }

        let start = self.cursor;
        let mut curr = start;
        let mut wrapped = false;

        loop {
            let member = &self.members[curr];
            if !exclude.contains(&&member.node) {
                picked.push(member.clone());
            }

            curr += 1;
            if curr == self.members.len() {
                curr = 0;
                wrapped = true;
            }

            if picked.len() == count || curr == start {
                break;
            }
        }

        self.cursor = curr;
        if wrapped {
            self.members.shuffle(&mut rand::thread_rng());
            self.cursor = 0;
        }

        picked
    }

    /// Next direct-probe target (never ourselves).
    pub fn pingable_member(&mut self) -> Option<Member> {
        let me = self.me.clone();
        let exclude: Vec<&NodeAddr> = me.iter().collect();
        self.next_probe_targets(&exclude, 1).into_iter().next()
    }

    /// Members to ask for an indirect probe of `target` (never ourselves or `target`).
    pub fn ping_req_group(&mut self, target: &NodeAddr, group_size: usize) -> Vec<Member> {
        let me = self.me.clone();
        let mut exclude: Vec<&NodeAddr> = me.iter().collect();
        exclude.push(target);
        self.next_probe_targets(&exclude, group_size)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn nodes(&self) -> Vec<NodeAddr> {
        self.members.iter().map(|m| m.node.clone()).collect()
    }

    /// Every member except ourselves.
    pub fn others(&self) -> Vec<NodeAddr> {
        self.members
            .iter()
            .filter(|m| !self.is_me(&m.node))
            .map(|m| m.node.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<TableEvent> {
        self.events.drain(..).collect()
    }
}
