use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::SwimConfig;
use crate::dissemination::DisseminationEngine;
use crate::effect::{Effect, TimerKey};
use crate::membership::{MembershipTable, NodeAddr};
use crate::net::{Message, ProbeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeStage {
    /// PING sent, waiting for the direct ACK.
    Direct,
    /// PING-REQs sent, waiting for any relayed ACK.
    Indirect,
}

/// A PING sent on behalf of another node's PING-REQ.
#[derive(Debug, Clone)]
struct Relay {
    requester: NodeAddr,
    since: Instant,
}

pub struct FailureDetector {
    ping_timeout: Duration,
    ping_req_timeout: Duration,
    group_size: usize,

    /// Targets of our own outstanding probes.
    probes: HashMap<NodeAddr, ProbeStage>,

    /// Relayed probes, by target. Entries older than `ping_req_timeout` are
    /// dropped: the requester has given up by then.
    relays: HashMap<NodeAddr, Vec<Relay>>,
}

impl FailureDetector {
    pub fn new(config: &SwimConfig) -> Self {
        Self {
            ping_timeout: config.ping_timeout(),
            ping_req_timeout: config.ping_req_timeout(),
            group_size: config.ping_req_group_size,
            probes: HashMap::new(),
            relays: HashMap::new(),
        }
    }

    /// One probe round: PING the next member and arm its ping timer.
    pub fn tick(&mut self, table: &mut MembershipTable) -> Vec<Effect> {
        self.prune_relays(Instant::now());

        let Some(target) = table.pingable_member() else {
            return Vec::new();
        };
        let target = target.node;

        if self.probes.contains_key(&target) {
            tracing::trace!("Probe of {} still in flight, skipping", target);
            return Vec::new();
        }

        tracing::trace!("Pinging {}", target);
        self.probes.insert(target.clone(), ProbeStage::Direct);

        vec![
            Effect::Send {
                to: target.clone(),
                message: Message::ping(target.clone()),
            },
            Effect::Arm {
                timer: TimerKey::Ping(target),
                after: self.ping_timeout,
            },
        ]
    }

    pub fn on_ping(&mut self, sender: &NodeAddr) -> Vec<Effect> {
        vec![Effect::Send {
            to: sender.clone(),
            message: Message::ack(sender.clone(), None),
        }]
    }

    /// Probes `request.target` on behalf of `request.requester`.
    pub fn on_ping_req(
        &mut self,
        table: &MembershipTable,
        sender: &NodeAddr,
        request: ProbeRequest,
    ) -> Vec<Effect> {
        // Asked to probe ourselves: we are obviously up.
        if table.is_me(&request.target) {
            return vec![Effect::Send {
                to: sender.clone(),
                message: Message::ack(sender.clone(), Some(request)),
            }];
        }

        tracing::trace!(
            "Probing {} on behalf of {}",
            request.target,
            request.requester
        );

        let relays = self.relays.entry(request.target.clone()).or_default();
        match relays.iter_mut().find(|r| r.requester == request.requester) {
            Some(relay) => relay.since = Instant::now(),
            None => relays.push(Relay {
                requester: request.requester,
                since: Instant::now(),
            }),
        }

        vec![Effect::Send {
            to: request.target.clone(),
            message: Message::ping(request.target),
        }]
    }

    /// Handles an ACK, either direct (`request == None`) or relayed.
    pub fn on_ack(
        &mut self,
        table: &mut MembershipTable,
        engine: &mut DisseminationEngine,
        sender: &NodeAddr,
        request: Option<ProbeRequest>,
    ) -> Vec<Effect> {
        match request {
            Some(request) => {
                if !table.is_me(&request.requester) {
                    tracing::debug!(
                        "Dropping relayed ACK for {} meant for {}",
                        request.target,
                        request.requester
                    );
                    return Vec::new();
                }
                tracing::trace!("{} answered through {}", request.target, sender);
                self.confirm(table, engine, &request.target)
            }
            None => {
                let mut effects = self.confirm(table, engine, sender);

                // Forward to everyone who asked us to probe this sender.
                for relay in self.relays.remove(sender).unwrap_or_default() {
                    effects.push(Effect::Send {
                        to: relay.requester.clone(),
                        message: Message::ack(
                            relay.requester.clone(),
                            Some(ProbeRequest {
                                target: sender.clone(),
                                requester: relay.requester,
                            }),
                        ),
                    });
                }

                effects
            }
        }
    }

    /// The direct PING went unanswered: escalate to PING-REQ, or straight to
    /// SUSPECT when nobody can relay.
    pub fn on_ping_timeout(
        &mut self,
        table: &mut MembershipTable,
        engine: &mut DisseminationEngine,
        target: &NodeAddr,
    ) -> Vec<Effect> {
        if self.probes.get(target) != Some(&ProbeStage::Direct) {
            return Vec::new();
        }

        let Some(me) = table.me().cloned() else {
            self.probes.remove(target);
            return Vec::new();
        };

        let group = table.ping_req_group(target, self.group_size);
        if group.is_empty() {
            tracing::debug!("No member can relay a probe of {}", target);
            self.probes.remove(target);
            engine.mark_suspect(table, target);
            return Vec::new();
        }

        tracing::debug!(
            "No ACK from {}, asking {} member(s) to probe it",
            target,
            group.len()
        );
        self.probes.insert(target.clone(), ProbeStage::Indirect);

        let mut effects: Vec<Effect> = group
            .into_iter()
            .map(|member| Effect::Send {
                to: member.node.clone(),
                message: Message::ping_req(
                    member.node,
                    ProbeRequest {
                        target: target.clone(),
                        requester: me.clone(),
                    },
                ),
            })
            .collect();

        effects.push(Effect::Arm {
            timer: TimerKey::PingReq(target.clone()),
            after: self.ping_req_timeout,
        });

        effects
    }

    pub fn on_ping_req_timeout(
        &mut self,
        table: &mut MembershipTable,
        engine: &mut DisseminationEngine,
        target: &NodeAddr,
    ) -> Vec<Effect> {
        if self.probes.get(target) == Some(&ProbeStage::Indirect) {
            self.probes.remove(target);
            tracing::debug!("No relayed ACK for {}", target);
            engine.mark_suspect(table, target);
        }
        Vec::new()
    }

    /// Cancels the probe of a node that left the table.
    pub fn forget(&mut self, node: &NodeAddr) -> Vec<Effect> {
        self.relays.remove(node);
        match self.probes.remove(node) {
            Some(_) => vec![
                Effect::Disarm(TimerKey::Ping(node.clone())),
                Effect::Disarm(TimerKey::PingReq(node.clone())),
            ],
            None => Vec::new(),
        }
    }

    pub fn stop(&mut self) -> Vec<Effect> {
        self.relays.clear();
        self.probes
            .drain()
            .flat_map(|(node, _)| {
                [
                    Effect::Disarm(TimerKey::Ping(node.clone())),
                    Effect::Disarm(TimerKey::PingReq(node)),
                ]
            })
            .collect()
    }

    pub fn in_flight(&self, node: &NodeAddr) -> bool {
        self.probes.contains_key(node)
    }

    pub fn relay_count(&self) -> usize {
        self.relays.values().map(Vec::len).sum()
    }

    fn confirm(
        &mut self,
        table: &mut MembershipTable,
        engine: &mut DisseminationEngine,
        target: &NodeAddr,
    ) -> Vec<Effect> {
        let effects = match self.probes.remove(target) {
            Some(_) => vec![
                Effect::Disarm(TimerKey::Ping(target.clone())),
                Effect::Disarm(TimerKey::PingReq(target.clone())),
            ],
            None => Vec::new(),
        };

        engine.mark_alive(table, target);
        effects
    }

    fn prune_relays(&mut self, now: Instant) {
        let max_age = self.ping_req_timeout;
        for relays in self.relays.values_mut() {
            relays.retain(|r| now.saturating_duration_since(r.since) < max_age);
        }
        self.relays.retain(|_, relays| !relays.is_empty());
    }
}
