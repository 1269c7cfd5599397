use std::sync::Arc;
use std::time::Duration;

use crate::config::SwimConfig;
use crate::dissemination::DisseminationEngine;
use crate::effect::{Effect, TimerKey};
use crate::error::SwimError;
use crate::event::SwimEvent;
use crate::membership::{Member, MemberState, MembershipTable, NodeAddr};
use crate::net::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// No join attempted: started without seeds, or stopped.
    Idle,
    Joining,
    Joined,
    /// No seed answered in time. A late JOIN-ACK is still accepted.
    TimedOut,
}

pub struct JoinProtocol {
    seeds: Vec<NodeAddr>,
    timeout: Duration,
    /// Our own bound port, combined with a learnt host to build our identity.
    port: u16,
    state: JoinState,
}

impl JoinProtocol {
    pub fn new(config: &SwimConfig, port: u16) -> Self {
        Self {
            seeds: config.seeds.clone(),
            timeout: config.join_timeout(),
            port,
            state: JoinState::Idle,
        }
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Sends JOIN to every seed and arms the join timer. Without seeds this
    /// node forms a cluster on its own.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.seeds.is_empty() {
            tracing::info!("No seeds configured, starting a new cluster");
            return Vec::new();
        }

        tracing::info!("Joining cluster via {} seed node(s)", self.seeds.len());
        self.state = JoinState::Joining;

        let mut effects: Vec<Effect> = self
            .seeds
            .iter()
            .map(|seed| Effect::Send {
                to: seed.clone(),
                message: Message::Join {
                    destination: seed.clone(),
                },
            })
            .collect();

        effects.push(Effect::Arm {
            timer: TimerKey::Join,
            after: self.timeout,
        });

        effects
    }

    /// Sponsor side: records the joiner as ALIVE and replies with our table.
    pub fn on_join(
        &mut self,
        table: &mut MembershipTable,
        engine: &mut DisseminationEngine,
        sender: &NodeAddr,
        destination: &NodeAddr,
    ) -> Vec<Effect> {
        let me = self.learn_identity(table, engine, destination);

        tracing::info!("{} asked to join", sender);

        // A rejoining node may have restarted at incarnation 0; never go below
        // what we already know about it.
        let incarnation = table.find(sender).map_or(0, |m| m.incarnation);
        engine.record(table, sender.clone(), MemberState::Alive, me, incarnation);

        vec![Effect::Send {
            to: sender.clone(),
            message: Message::JoinAck {
                destination: sender.clone(),
                members: table.members().to_vec(),
            },
        }]
    }

    /// Joiner side: the first JOIN-ACK wins, later ones are ignored. A reply
    /// arriving after the join timer fired is still taken.
    pub fn on_join_ack(
        &mut self,
        table: &mut MembershipTable,
        engine: &mut DisseminationEngine,
        sender: &NodeAddr,
        destination: &NodeAddr,
        members: Vec<Member>,
    ) -> Vec<Effect> {
        if !matches!(self.state, JoinState::Joining | JoinState::TimedOut) {
            tracing::debug!("Ignoring JOIN-ACK from {} ({:?})", sender, self.state);
            return Vec::new();
        }

        let me = self.learn_identity(table, engine, destination);

        tracing::info!(
            "Joined cluster through {} ({} member(s))",
            sender,
            members.len()
        );
        table.replace_all(members);

        if table.find(&me).is_none() {
            let incarnation = table.incarnation();
            table.add_or_update(me.clone(), MemberState::Alive, me, incarnation);
        }

        self.state = JoinState::Joined;
        vec![Effect::Disarm(TimerKey::Join), Effect::Emit(SwimEvent::Joined)]
    }

    pub fn on_timeout(&mut self) -> Vec<Effect> {
        if self.state != JoinState::Joining {
            return Vec::new();
        }

        self.state = JoinState::TimedOut;
        let error = SwimError::JoinTimeout {
            seeds: self.seeds.clone(),
        };
        tracing::warn!("{}", error);

        vec![Effect::Emit(SwimEvent::JoinTimeout(Arc::new(error)))]
    }

    pub fn stop(&mut self) -> Vec<Effect> {
        let was = std::mem::replace(&mut self.state, JoinState::Idle);
        if was == JoinState::Joining {
            vec![Effect::Disarm(TimerKey::Join)]
        } else {
            Vec::new()
        }
    }

    /// Returns our identity, adopting the host of `destination` if we did not
    /// know it yet.
    fn learn_identity(
        &self,
        table: &mut MembershipTable,
        engine: &mut DisseminationEngine,
        destination: &NodeAddr,
    ) -> NodeAddr {
        if let Some(me) = table.me() {
            return me.clone();
        }

        let me = NodeAddr::new(destination.host.clone(), self.port);
        table.set_me(me.clone());
        engine.enqueue(me.clone(), me.clone(), MemberState::Alive, table.incarnation(), None);
        me
    }
}
