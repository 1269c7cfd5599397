//! Failure Detector Tests
//!
//! ## Test Scopes
//! - **Direct Probe**: PING emission, ACK handling, skip when in flight.
//! - **Indirect Probe**: PING-REQ group, relay bookkeeping and forwarded ACKs.
//! - **Escalation**: timeouts leading to SUSPECT, 2-node shortcut, cancellation.

#[cfg(test)]
mod tests {
    use crate::config::SwimConfig;
    use crate::dissemination::DisseminationEngine;
    use crate::effect::{Effect, TimerKey};
    use crate::failure::FailureDetector;
    use crate::membership::{MemberState, MembershipTable, NodeAddr};
    use crate::net::{Message, ProbeRequest};

    fn me() -> NodeAddr {
        NodeAddr::new("127.0.0.1", 10000)
    }

    fn peer(i: u16) -> NodeAddr {
        NodeAddr::new("127.0.0.1", 10000 + i)
    }

    struct Fixture {
        table: MembershipTable,
        engine: DisseminationEngine,
        detector: FailureDetector,
    }

    fn fixture(peers: u16) -> Fixture {
        let config = SwimConfig::local();
        let mut table = MembershipTable::new(None);
        table.set_me(me());
        for i in 1..=peers {
            table.add_or_update(peer(i), MemberState::Alive, me(), 0);
        }
        table.take_events();

        Fixture {
            table,
            engine: DisseminationEngine::new(&config),
            detector: FailureDetector::new(&config),
        }
    }

    fn sends(effects: &[Effect]) -> Vec<(NodeAddr, Message)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send { to, message } => Some((to.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    fn disarms(effects: &[Effect], key: &TimerKey) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::Disarm(timer) if timer == key))
    }

    fn arms(effects: &[Effect], key: &TimerKey) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::Arm { timer, .. } if timer == key))
    }

    fn ping_target(effects: &[Effect]) -> NodeAddr {
        match sends(effects).as_slice() {
            [(to, Message::Ping { .. })] => to.clone(),
            other => panic!("Expected a single PING, got {:?}", other),
        }
    }

    // ============================================================
    // DIRECT PROBE TESTS
    // ============================================================

    #[test]
    fn test_tick_pings_and_arms_timer() {
        let mut f = fixture(3);

        let effects = f.detector.tick(&mut f.table);
        let target = ping_target(&effects);

        assert_ne!(target, me());
        assert!(arms(&effects, &TimerKey::Ping(target.clone())));
        assert!(f.detector.in_flight(&target));
    }

    #[test]
    fn test_tick_with_no_peers_does_nothing() {
        let mut f = fixture(0);
        assert!(f.detector.tick(&mut f.table).is_empty());
    }

    #[test]
    fn test_tick_skips_target_already_in_flight() {
        let mut f = fixture(1);

        assert!(!f.detector.tick(&mut f.table).is_empty());
        assert!(f.detector.tick(&mut f.table).is_empty());
    }

    #[test]
    fn test_ping_is_answered_with_plain_ack() {
        let mut f = fixture(1);

        let effects = f.detector.on_ping(&peer(1));

        match sends(&effects).as_slice() {
            [(to, Message::Ack { request: None, .. })] => assert_eq!(*to, peer(1)),
            other => panic!("Expected ACK, got {:?}", other),
        }
    }

    #[test]
    fn test_direct_ack_disarms_timers() {
        let mut f = fixture(1);
        f.detector.tick(&mut f.table);

        let effects = f
            .detector
            .on_ack(&mut f.table, &mut f.engine, &peer(1), None);

        assert!(disarms(&effects, &TimerKey::Ping(peer(1))));
        assert!(!f.detector.in_flight(&peer(1)));
    }

    #[test]
    fn test_ack_restores_suspect_member() {
        let mut f = fixture(1);
        f.engine.mark_suspect(&mut f.table, &peer(1));
        f.detector.tick(&mut f.table);

        f.detector
            .on_ack(&mut f.table, &mut f.engine, &peer(1), None);

        assert_eq!(f.table.find(&peer(1)).unwrap().state, MemberState::Alive);
    }

    // ============================================================
    // INDIRECT PROBE TESTS
    // ============================================================

    #[test]
    fn test_ping_timeout_sends_ping_reqs() {
        let mut f = fixture(5);
        let target = ping_target(&f.detector.tick(&mut f.table));

        let effects = f
            .detector
            .on_ping_timeout(&mut f.table, &mut f.engine, &target);
        let ping_reqs = sends(&effects);

        assert_eq!(ping_reqs.len(), 3);
        for (to, message) in &ping_reqs {
            assert_ne!(*to, target);
            assert_ne!(*to, me());
            match message {
                Message::PingReq { request, .. } => {
                    assert_eq!(request.target, target);
                    assert_eq!(request.requester, me());
                }
                other => panic!("Expected PING_REQ, got {:?}", other),
            }
        }
        assert!(arms(&effects, &TimerKey::PingReq(target.clone())));
        assert_eq!(f.table.find(&target).unwrap().state, MemberState::Alive);
    }

    #[test]
    fn test_relay_pings_target_and_forwards_ack() {
        let mut f = fixture(3);
        let requester = peer(1);
        let target = peer(2);
        let request = ProbeRequest {
            target: target.clone(),
            requester: requester.clone(),
        };

        let effects = f.detector.on_ping_req(&f.table, &requester, request.clone());
        assert_eq!(ping_target(&effects), target);
        assert_eq!(f.detector.relay_count(), 1);

        let effects = f
            .detector
            .on_ack(&mut f.table, &mut f.engine, &target, None);

        match sends(&effects).as_slice() {
            [(to, Message::Ack { request: Some(forwarded), .. })] => {
                assert_eq!(*to, requester);
                assert_eq!(*forwarded, request);
            }
            other => panic!("Expected relayed ACK, got {:?}", other),
        }
        assert_eq!(f.detector.relay_count(), 0);
    }

    #[test]
    fn test_relayed_ack_confirms_target() {
        let mut f = fixture(3);
        let target = ping_target(&f.detector.tick(&mut f.table));
        f.detector
            .on_ping_timeout(&mut f.table, &mut f.engine, &target);

        let relayer = f.table.others().into_iter().find(|n| *n != target).unwrap();
        let effects = f.detector.on_ack(
            &mut f.table,
            &mut f.engine,
            &relayer,
            Some(ProbeRequest {
                target: target.clone(),
                requester: me(),
            }),
        );

        assert!(disarms(&effects, &TimerKey::PingReq(target.clone())));
        assert!(!f.detector.in_flight(&target));

        f.detector
            .on_ping_req_timeout(&mut f.table, &mut f.engine, &target);
        assert_eq!(f.table.find(&target).unwrap().state, MemberState::Alive);
    }

    #[test]
    fn test_ping_req_about_self_acked_directly() {
        let mut f = fixture(2);
        let request = ProbeRequest {
            target: me(),
            requester: peer(1),
        };

        let effects = f.detector.on_ping_req(&f.table, &peer(1), request.clone());

        match sends(&effects).as_slice() {
            [(to, Message::Ack { request: Some(r), .. })] => {
                assert_eq!(*to, peer(1));
                assert_eq!(*r, request);
            }
            other => panic!("Expected ACK, got {:?}", other),
        }
        assert_eq!(f.detector.relay_count(), 0);
    }

    // ============================================================
    // ESCALATION TESTS
    // ============================================================

    #[test]
    fn test_ping_req_timeout_marks_suspect() {
        let mut f = fixture(4);
        let target = ping_target(&f.detector.tick(&mut f.table));
        f.detector
            .on_ping_timeout(&mut f.table, &mut f.engine, &target);

        f.detector
            .on_ping_req_timeout(&mut f.table, &mut f.engine, &target);

        let member = f.table.find(&target).unwrap();
        assert_eq!(member.state, MemberState::Suspect);
        assert_eq!(member.set_by, me());
        assert!(f.engine.pending().iter().any(|u| u.node == target
            && u.state == MemberState::Suspect));
    }

    #[test]
    fn test_two_node_cluster_goes_straight_to_suspect() {
        let mut f = fixture(1);
        f.detector.tick(&mut f.table);

        let effects = f
            .detector
            .on_ping_timeout(&mut f.table, &mut f.engine, &peer(1));

        assert!(sends(&effects).is_empty());
        assert_eq!(f.table.find(&peer(1)).unwrap().state, MemberState::Suspect);
        assert!(!f.detector.in_flight(&peer(1)));
    }

    #[test]
    fn test_stale_timeouts_are_ignored() {
        let mut f = fixture(3);

        assert!(f
            .detector
            .on_ping_timeout(&mut f.table, &mut f.engine, &peer(1))
            .is_empty());
        f.detector
            .on_ping_req_timeout(&mut f.table, &mut f.engine, &peer(1));

        assert_eq!(f.table.find(&peer(1)).unwrap().state, MemberState::Alive);
    }

    #[test]
    fn test_forget_and_stop_cancel_probes() {
        let mut f = fixture(2);
        let first = ping_target(&f.detector.tick(&mut f.table));

        let effects = f.detector.forget(&first);
        assert!(disarms(&effects, &TimerKey::Ping(first.clone())));
        assert!(!f.detector.in_flight(&first));

        let second = ping_target(&f.detector.tick(&mut f.table));
        let effects = f.detector.stop();
        assert!(disarms(&effects, &TimerKey::PingReq(second.clone())));
        assert!(!f.detector.in_flight(&second));
    }
}
