//! Wire Protocol Tests
//!
//! ## Test Scopes
//! - **Codec**: per-kind encoding, piggyback slot handling, size limit and garbage input.
//! - **Transport**: loopback send/receive and bind failures.

#[cfg(test)]
mod tests {
    use crate::dissemination::Update;
    use crate::error::SwimError;
    use crate::membership::{Member, MemberState, NodeAddr};
    use crate::metadata::{MetaEntry, NodeMetadata};
    use crate::net::{MAX_DATAGRAM_SIZE, Message, ProbeRequest, Transport, decode, encode};
    use std::net::{IpAddr, Ipv4Addr};

    fn node(port: u16) -> NodeAddr {
        NodeAddr::new("127.0.0.1", port)
    }

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[test]
    fn test_ping_req_roundtrip_keeps_request() {
        let request = ProbeRequest {
            target: node(2),
            requester: node(1),
        };
        let message = Message::ping_req(node(3), request.clone());

        let decoded = decode(&encode(&message).unwrap()).unwrap();

        match decoded {
            Message::PingReq {
                destination,
                request: got,
                updates,
            } => {
                assert_eq!(destination, node(3));
                assert_eq!(got, request);
                assert!(updates.is_empty());
            }
            other => panic!("Expected PING_REQ, got {:?}", other),
        }
    }

    #[test]
    fn test_join_ack_carries_snapshot() {
        let members = vec![
            Member {
                node: node(1),
                state: MemberState::Alive,
                set_by: node(1),
                incarnation: 4,
            },
            Member {
                node: node(2),
                state: MemberState::Suspect,
                set_by: node(1),
                incarnation: 0,
            },
        ];
        let message = Message::JoinAck {
            destination: node(3),
            members: members.clone(),
        };

        assert_eq!(decode(&encode(&message).unwrap()).unwrap(), message);
    }

    #[test]
    fn test_gossip_counter_not_on_the_wire() {
        let mut update = Update::new(node(2), node(1), MemberState::Suspect, 7);
        update.gossip_count = 9;

        let mut message = Message::ping(node(2));
        message.updates_mut().unwrap().push(update.clone());

        let mut decoded = decode(&encode(&message).unwrap()).unwrap();
        let updates = decoded.take_updates();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].uuid, update.uuid);
        assert_eq!(updates[0].incarnation, 7);
        assert_eq!(updates[0].gossip_count, 0);
    }

    #[test]
    fn test_only_probe_messages_have_piggyback_slot() {
        assert!(Message::ping(node(1)).updates_mut().is_some());
        assert!(Message::ack(node(1), None).updates_mut().is_some());
        assert!(
            Message::Join {
                destination: node(1)
            }
            .updates_mut()
            .is_none()
        );
        assert!(
            Message::AllMeta {
                destination: node(1)
            }
            .updates_mut()
            .is_none()
        );
        assert!(Message::Meta { metadata: vec![] }.take_updates().is_empty());
    }

    #[test]
    fn test_meta_roundtrip() {
        let message = Message::Meta {
            metadata: vec![NodeMetadata {
                owner: node(1),
                version: 3,
                entries: vec![MetaEntry::new("role", b"storage".to_vec())],
            }],
        };

        assert_eq!(decode(&encode(&message).unwrap()).unwrap(), message);
        assert_eq!(message.kind(), "META");
    }

    #[test]
    fn test_oversized_message_rejected() {
        let message = Message::Meta {
            metadata: vec![NodeMetadata {
                owner: node(1),
                version: 1,
                entries: vec![MetaEntry::new("blob", vec![0u8; MAX_DATAGRAM_SIZE])],
            }],
        };

        assert!(matches!(
            encode(&message),
            Err(SwimError::DatagramTooLarge { max: MAX_DATAGRAM_SIZE, .. })
        ));
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        assert!(matches!(decode(&[0xff; 16]), Err(SwimError::Codec(_))));
        assert!(decode(&[]).is_err());
    }

    // ============================================================
    // TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_transport_loopback() {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let a = Transport::bind(localhost, 0).await.expect("bind a");
        let b = Transport::bind(localhost, 0).await.expect("bind b");
        assert_ne!(a.local_port(), 0);

        let bytes = encode(&Message::ping(node(b.local_port()))).unwrap();
        a.send(&node(b.local_port()), &bytes).await.expect("send");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (sender, message) = b.recv(&mut buf).await.expect("recv");

        assert_eq!(sender, node(a.local_port()));
        assert_eq!(message.kind(), "PING");
    }

    #[tokio::test]
    async fn test_transport_drops_malformed_datagrams() {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let a = Transport::bind(localhost, 0).await.expect("bind a");
        let b = Transport::bind(localhost, 0).await.expect("bind b");
        let to_b = node(b.local_port());

        a.send(&to_b, &[0xff; 8]).await.expect("send garbage");
        let ack = encode(&Message::ack(to_b.clone(), None)).unwrap();
        a.send(&to_b, &ack).await.expect("send ack");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (_, message) = tokio::time::timeout(std::time::Duration::from_secs(2), b.recv(&mut buf))
            .await
            .expect("timed out")
            .expect("recv");

        assert_eq!(message.kind(), "ACK");
    }

    #[tokio::test]
    async fn test_bind_port_in_use() {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let first = Transport::bind(localhost, 0).await.expect("bind");

        let second = Transport::bind(localhost, first.local_port()).await;

        match second {
            Err(SwimError::Bind { addr, .. }) => assert_eq!(addr.port(), first.local_port()),
            Err(other) => panic!("Expected bind error, got {}", other),
            Ok(_) => panic!("Second bind on the same port should fail"),
        }
    }
}
