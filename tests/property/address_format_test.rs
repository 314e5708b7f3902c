// tests/property/address_format_test.rs

//! Property-based tests for server accumulation, payload formatting and
//! reply decoding

use crate::fixtures::afsdb_response;
use keyupcall::core::keys::DnsErrorCode;
use keyupcall::dns::message::{Message, RecordData, read_name};
use keyupcall::dns::server_set::{MAX_PAYLOAD_LEN, MAX_SERVERS};
use keyupcall::dns::{ServerRecord, ServerSet};
use proptest::prelude::*;
use std::collections::HashSet;
use std::net::IpAddr;

fn any_ip() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<[u8; 4]>().prop_map(IpAddr::from),
        any::<[u16; 8]>().prop_map(IpAddr::from),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_server_set_invariants(
        records in prop::collection::vec(("[a-dA-D]{1,3}", any_ip(), 1u32..100_000), 0..40)
    ) {
        let mut set = ServerSet::new();
        let mut seen = HashSet::new();
        let mut accepted_ttls = Vec::new();
        for (name, address, ttl) in &records {
            let fresh = !seen.contains(&name.to_ascii_lowercase());
            let before = set.len();
            set.insert(ServerRecord { name: name.clone(), address: *address, ttl: *ttl });
            if set.len() > before {
                prop_assert!(fresh);
                seen.insert(name.to_ascii_lowercase());
                accepted_ttls.push(*ttl);
            }
        }

        prop_assert!(set.len() <= MAX_SERVERS);
        prop_assert_eq!(set.min_ttl(), accepted_ttls.iter().copied().min());

        match set.into_payload() {
            None => prop_assert!(accepted_ttls.is_empty()),
            Some(payload) => {
                let text = payload.to_string();
                prop_assert!(text.len() <= MAX_PAYLOAD_LEN);
                let parsed: Vec<IpAddr> = text.split(',').map(|s| s.parse().unwrap()).collect();
                prop_assert_eq!(&parsed, &payload.addresses);
                let data = payload.to_key_data();
                prop_assert_eq!(data.last(), Some(&0u8));
            }
        }
    }

    #[test]
    fn test_every_status_maps_to_a_payload(status in any::<i32>()) {
        let payload = DnsErrorCode::from_status(status).payload();
        prop_assert!(payload.starts_with("#dnserror="));
        prop_assert!(payload["#dnserror=".len()..].parse::<i32>().unwrap() > 0);
    }

    #[test]
    fn test_parse_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Message::parse(&bytes);
        for start in 0..bytes.len().min(16) {
            let _ = read_name(&bytes, start);
        }
    }

    #[test]
    fn test_afsdb_host_names_decode(
        hosts in prop::collection::vec("[a-z]{1,10}(\\.[a-z]{1,10}){0,3}", 0..10),
        ttl in any::<u32>(),
    ) {
        let records: Vec<(u16, &str, u32)> = hosts.iter().map(|h| (1, h.as_str(), ttl)).collect();
        let reply = afsdb_response(9, "cell.example.org", &records);
        let message = Message::parse(&reply).unwrap();

        let decoded: Vec<&str> = message
            .answers
            .iter()
            .filter_map(|r| match &r.data {
                RecordData::Afsdb { hostname, .. } => Some(hostname.as_str()),
                RecordData::Other(_) => None,
            })
            .collect();
        let expected: Vec<&str> = hosts.iter().map(String::as_str).collect();
        prop_assert_eq!(decoded, expected);
        prop_assert!(message.answers.iter().all(|r| r.ttl == ttl));
    }
}
