// tests/integration/dns_handler_test.rs

//! End-to-end tests of the `dns_resolver` handler against canned
//! directory replies and an in-memory key service.

use super::fixtures::*;
use keyupcall::core::UpcallError;
use keyupcall::core::keys::{Completion, DnsErrorCode, KeyDescription, KeyState};
use keyupcall::dns::message::RecordType;
use keyupcall::dns::server_set::MAX_SERVERS;
use keyupcall::dns::{
    AddressFamily, DnsResolverHandler, LookupRequest, QueryFailure, Resolution, ResolverStatus,
};
use std::sync::atomic::Ordering;

const NEGATIVE_TIMEOUT: u32 = 60;

fn request(cell: &str) -> LookupRequest {
    LookupRequest {
        name: cell.to_string(),
        family: AddressFamily::Any,
    }
}

#[tokio::test]
async fn test_resolved_key_gets_address_list_and_min_ttl() {
    let reply = afsdb_response(
        1,
        "example.com",
        &[
            (1, "afs1.example.com", 300),
            (1, "afs2.example.com", 120),
            (1, "afs3.example.com", 600),
        ],
    );
    let resolver = StaticResolver::new()
        .with_host("afs1.example.com", &["192.0.2.1"])
        .with_host("afs2.example.com", &["192.0.2.2"])
        .with_host("afs3.example.com", &["2001:db8::3"]);
    let handler = DnsResolverHandler::new(StaticDirectory::answering(reply), resolver);

    let keys = MockKeyring::new();
    let mut completion = Completion::new(&keys, TEST_KEY, NEGATIVE_TIMEOUT);
    handler
        .complete(&request("example.com"), &mut completion)
        .await
        .unwrap();

    assert_eq!(completion.state(), KeyState::Instantiated);
    assert_eq!(
        keys.ops(),
        vec![
            KeyOp::SetTimeout {
                key: TEST_KEY,
                timeout: 120
            },
            KeyOp::Instantiate {
                key: TEST_KEY,
                payload: b"192.0.2.1,192.0.2.2,2001:db8::3\0".to_vec(),
            },
        ]
    );
}

#[tokio::test]
async fn test_duplicate_hosts_differing_in_case_resolve_once() {
    let reply = afsdb_response(
        1,
        "example.com",
        &[(1, "Host.Example.com", 300), (1, "host.example.com", 100)],
    );
    let resolver = StaticResolver::new().with_host("host.example.com", &["192.0.2.7"]);
    let handler = DnsResolverHandler::new(StaticDirectory::answering(reply), resolver);

    let resolution = handler.resolve(&request("example.com")).await.unwrap();
    let Resolution::Resolved(payload) = resolution else {
        panic!("expected a resolved payload, got {resolution:?}");
    };
    assert_eq!(payload.to_string(), "192.0.2.7");
    // The duplicate was dropped before resolution, so its TTL never counts.
    assert_eq!(payload.ttl, 300);
}

#[tokio::test]
async fn test_duplicate_is_not_resolved_twice() {
    let reply = afsdb_response(
        1,
        "example.com",
        &[(1, "Host.Example.com", 300), (1, "host.example.com", 100)],
    );
    let resolver = StaticResolver::new().with_host("host.example.com", &["192.0.2.7"]);
    let lookups = resolver.lookup_counter();
    let handler = DnsResolverHandler::new(StaticDirectory::answering(reply), resolver);

    handler.resolve(&request("example.com")).await.unwrap();
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_answer_completes_with_nodata_payload() {
    let reply = afsdb_response(1, "example.com", &[]);
    let handler = DnsResolverHandler::new(StaticDirectory::answering(reply), StaticResolver::new());

    let keys = MockKeyring::new();
    let mut completion = Completion::new(&keys, TEST_KEY, NEGATIVE_TIMEOUT);
    let resolution = handler
        .complete(&request("example.com"), &mut completion)
        .await
        .unwrap();

    assert_eq!(resolution, Resolution::Failed(DnsErrorCode::NoData));
    assert_eq!(completion.state(), KeyState::Instantiated);
    assert_eq!(
        keys.instantiated_payload().unwrap(),
        format!("#dnserror={}\0", libc::ENODATA).into_bytes()
    );
    assert_eq!(keys.last_timeout(), Some(NEGATIVE_TIMEOUT));
}

#[tokio::test]
async fn test_unresolvable_servers_complete_with_nodata() {
    let reply = afsdb_response(1, "example.com", &[(1, "gone.example.com", 300)]);
    let handler = DnsResolverHandler::new(StaticDirectory::answering(reply), StaticResolver::new());

    let resolution = handler.resolve(&request("example.com")).await.unwrap();
    assert_eq!(resolution, Resolution::Failed(DnsErrorCode::NoData));
}

#[tokio::test]
async fn test_query_failure_maps_status_and_uses_negative_timeout() {
    let cases = [
        (ResolverStatus::HostNotFound, libc::ENODATA),
        (ResolverStatus::TryAgain, libc::EAGAIN),
        (ResolverStatus::NoRecovery, libc::ECONNREFUSED),
        (ResolverStatus::NoData, libc::ENODATA),
        (ResolverStatus::Internal, libc::ECONNREFUSED),
    ];
    for (status, errno) in cases {
        let directory = StaticDirectory::failing(QueryFailure::new(status, "test"));
        let handler = DnsResolverHandler::new(directory, StaticResolver::new());

        let keys = MockKeyring::new();
        let mut completion = Completion::new(&keys, TEST_KEY, NEGATIVE_TIMEOUT);
        handler
            .complete(&request("example.com"), &mut completion)
            .await
            .unwrap();

        assert_eq!(
            keys.instantiated_payload().unwrap(),
            format!("#dnserror={errno}\0").into_bytes(),
            "status {status}"
        );
        assert_eq!(keys.last_timeout(), Some(NEGATIVE_TIMEOUT));
    }
}

#[tokio::test]
async fn test_family_restriction_skips_other_family() {
    let reply = afsdb_response(
        1,
        "example.com",
        &[(1, "v6only.example.com", 300), (1, "dual.example.com", 200)],
    );
    let resolver = StaticResolver::new()
        .with_host("v6only.example.com", &["2001:db8::1"])
        .with_host("dual.example.com", &["2001:db8::2", "192.0.2.2"]);
    let handler = DnsResolverHandler::new(StaticDirectory::answering(reply), resolver);

    let request = LookupRequest {
        name: "example.com".to_string(),
        family: AddressFamily::Ipv4,
    };
    let Resolution::Resolved(payload) = handler.resolve(&request).await.unwrap() else {
        panic!("expected a resolved payload");
    };
    assert_eq!(payload.to_string(), "192.0.2.2");
    assert_eq!(payload.ttl, 200);
}

#[tokio::test]
async fn test_server_list_is_capped() {
    let hosts: Vec<String> = (0..MAX_SERVERS + 5)
        .map(|i| format!("afs{i}.example.com"))
        .collect();
    let records: Vec<AfsdbRecord<'_>> = hosts.iter().map(|h| (1, h.as_str(), 300)).collect();
    let reply = afsdb_response(1, "example.com", &records);

    let mut resolver = StaticResolver::new();
    for (i, host) in hosts.iter().enumerate() {
        resolver = resolver.with_host(host, &[format!("10.0.0.{i}").as_str()]);
    }
    let lookups = resolver.lookup_counter();
    let handler = DnsResolverHandler::new(StaticDirectory::answering(reply), resolver);

    let Resolution::Resolved(payload) = handler.resolve(&request("example.com")).await.unwrap()
    else {
        panic!("expected a resolved payload");
    };
    assert_eq!(payload.addresses.len(), MAX_SERVERS);
    assert_eq!(lookups.load(Ordering::SeqCst), MAX_SERVERS);
}

#[tokio::test]
async fn test_asks_directory_for_afsdb_of_cell() {
    let directory = StaticDirectory::answering(afsdb_response(1, "grand.central.org", &[]));
    let queries = directory.query_log();
    let handler = DnsResolverHandler::new(directory, StaticResolver::new());
    handler.resolve(&request("grand.central.org")).await.unwrap();
    assert_eq!(
        *queries.lock().unwrap(),
        vec![("grand.central.org".to_string(), RecordType::Afsdb)]
    );
}

#[tokio::test]
async fn test_malformed_reply_is_fatal() {
    let mut reply = afsdb_response(1, "example.com", &[(1, "afs1.example.com", 300)]).to_vec();
    reply.truncate(reply.len() - 4);
    let handler =
        DnsResolverHandler::new(StaticDirectory::answering(reply.into()), StaticResolver::new());

    let keys = MockKeyring::new();
    let mut completion = Completion::new(&keys, TEST_KEY, NEGATIVE_TIMEOUT);
    let err = handler
        .complete(&request("example.com"), &mut completion)
        .await
        .unwrap_err();
    assert!(matches!(err, UpcallError::Directory(_)));
    assert_eq!(completion.state(), KeyState::Pending);

    completion.abandon();
    assert_eq!(
        keys.ops(),
        vec![KeyOp::Negate {
            key: TEST_KEY,
            timeout: NEGATIVE_TIMEOUT
        }]
    );
}

#[tokio::test]
async fn test_instantiate_failure_is_fatal() {
    let reply = afsdb_response(1, "example.com", &[(1, "afs1.example.com", 300)]);
    let handler = DnsResolverHandler::new(
        StaticDirectory::answering(reply),
        StaticResolver::new().with_host("afs1.example.com", &["192.0.2.1"]),
    );

    let keys = MockKeyring::new().failing_instantiate();
    let mut completion = Completion::new(&keys, TEST_KEY, NEGATIVE_TIMEOUT);
    let err = handler
        .complete(&request("example.com"), &mut completion)
        .await
        .unwrap_err();
    assert!(matches!(err, UpcallError::KeyOperation { .. }));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_lookup_request_from_key_description() {
    let described = KeyDescription::parse("dns_resolver;0;0;3f010000;afsdb:example.com").unwrap();
    let request = LookupRequest::from_key(&described, "ipv6").unwrap();
    assert_eq!(request.name, "example.com");
    assert_eq!(request.family, AddressFamily::Ipv6);

    let described = KeyDescription::parse("user;0;0;3f010000;afsdb:example.com").unwrap();
    assert!(matches!(
        LookupRequest::from_key(&described, ""),
        Err(UpcallError::UnsupportedKeyType(t)) if t == "user"
    ));

    let described = KeyDescription::parse("dns_resolver;0;0;3f010000;example.com").unwrap();
    assert!(matches!(
        LookupRequest::from_key(&described, ""),
        Err(UpcallError::MissingQueryType(_))
    ));

    let described = KeyDescription::parse("dns_resolver;0;0;3f010000;srv:example.com").unwrap();
    assert!(matches!(
        LookupRequest::from_key(&described, ""),
        Err(UpcallError::UnsupportedQueryType(q)) if q == "srv"
    ));
}
