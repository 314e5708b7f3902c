// src/core/dns/client.rs

//! The directory client: a stub that forwards one question to the
//! configured recursive name servers and hands back the raw reply.

use super::message::{Header, Query, Rcode, RecordType};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use strum_macros::Display;
use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::{debug, warn};

pub const DNS_PORT: u16 = 53;
/// Most name servers consulted, as with the system resolver.
pub const MAX_NAMESERVERS: usize = 3;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ATTEMPTS: u32 = 2;
const MAX_TIMEOUT_SECS: u64 = 30;
const MAX_ATTEMPTS: u32 = 5;
const MAX_UDP_REPLY: usize = 65_535;

/// Outcome classes of a failed query, numbered like the host resolver's
/// `h_errno` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ResolverStatus {
    Internal,
    HostNotFound,
    TryAgain,
    NoRecovery,
    NoData,
}

impl ResolverStatus {
    pub fn code(self) -> i32 {
        match self {
            ResolverStatus::Internal => 0,
            ResolverStatus::HostNotFound => 1,
            ResolverStatus::TryAgain => 2,
            ResolverStatus::NoRecovery => 3,
            ResolverStatus::NoData => 4,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {detail}")]
pub struct QueryFailure {
    pub status: ResolverStatus,
    pub detail: String,
}

impl QueryFailure {
    pub fn new(status: ResolverStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

/// Something that can answer a directory question.
///
/// A successful result is a complete reply with a `NOERROR` code and at
/// least one answer. Everything else is a [`QueryFailure`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn query(&self, name: &str, rtype: RecordType) -> Result<Bytes, QueryFailure>;
}

/// The subset of resolv.conf the stub client honours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvConf {
    pub nameservers: Vec<SocketAddr>,
    pub timeout: Duration,
    pub attempts: u32,
    pub use_tcp: bool,
}

impl Default for ResolvConf {
    fn default() -> Self {
        Self {
            nameservers: vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DNS_PORT)],
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            use_tcp: false,
        }
    }
}

impl ResolvConf {
    /// Parses resolv.conf text. Unknown directives and malformed values are
    /// skipped, as the system resolver does.
    pub fn parse(text: &str) -> Self {
        let mut conf = Self::default();
        let mut nameservers = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let mut words = line.split_whitespace();
            match words.next() {
                Some("nameserver") => {
                    if nameservers.len() >= MAX_NAMESERVERS {
                        continue;
                    }
                    if let Some(ip) = words.next().and_then(|w| w.parse::<IpAddr>().ok()) {
                        nameservers.push(SocketAddr::new(ip, DNS_PORT));
                    }
                }
                Some("options") => {
                    for option in words {
                        conf.apply_option(option);
                    }
                }
                _ => {}
            }
        }

        if !nameservers.is_empty() {
            conf.nameservers = nameservers;
        }
        conf
    }

    fn apply_option(&mut self, option: &str) {
        if let Some(v) = option.strip_prefix("timeout:") {
            if let Ok(secs) = v.parse::<u64>() {
                self.timeout = Duration::from_secs(secs.clamp(1, MAX_TIMEOUT_SECS));
            }
        } else if let Some(v) = option.strip_prefix("attempts:") {
            if let Ok(n) = v.parse::<u32>() {
                self.attempts = n.clamp(1, MAX_ATTEMPTS);
            }
        } else if option == "use-vc" || option == "usevc" {
            self.use_tcp = true;
        }
    }

    /// Reads resolv.conf; a missing or unreadable file means defaults.
    pub fn load(path: &str) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) => {
                warn!("Cannot read {}: {}. Using default name server.", path, e);
                Self::default()
            }
        }
    }

    /// Replaces the name servers when `servers` is non-empty.
    pub fn with_nameservers(mut self, servers: Vec<SocketAddr>) -> Self {
        if !servers.is_empty() {
            self.nameservers = servers;
        }
        self
    }
}

/// What to do with a reply from one server.
enum Verdict {
    Accept,
    Stop(ResolverStatus),
    Next(ResolverStatus),
}

fn classify(header: &Header) -> Verdict {
    match header.rcode() {
        Rcode::NoError if header.ancount == 0 => Verdict::Stop(ResolverStatus::NoData),
        Rcode::NoError => Verdict::Accept,
        Rcode::NxDomain => Verdict::Stop(ResolverStatus::HostNotFound),
        Rcode::ServFail => Verdict::Next(ResolverStatus::TryAgain),
        _ => Verdict::Next(ResolverStatus::NoRecovery),
    }
}

/// A directory client that talks to name servers directly over UDP,
/// switching to TCP for truncated replies.
#[derive(Debug, Clone)]
pub struct StubDirectoryClient {
    conf: ResolvConf,
}

impl StubDirectoryClient {
    pub fn new(conf: ResolvConf) -> Self {
        Self { conf }
    }

    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    async fn exchange_udp(&self, server: SocketAddr, packet: &[u8], id: u16) -> io::Result<Bytes> {
        let local = match server {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;
        socket.send(packet).await?;

        let mut buf = vec![0u8; MAX_UDP_REPLY];
        timeout(self.conf.timeout, async {
            loop {
                let n = socket.recv(&mut buf).await?;
                // Stray datagrams for other queries are dropped.
                match Header::parse(&buf[..n]) {
                    Ok(h) if h.id == id && h.is_response() => {
                        return Ok::<_, io::Error>(Bytes::copy_from_slice(&buf[..n]));
                    }
                    _ => debug!("Ignoring unrelated datagram from {}", server),
                }
            }
        })
        .await?
    }

    async fn exchange_tcp(&self, server: SocketAddr, packet: &[u8]) -> io::Result<Bytes> {
        let stream = timeout(self.conf.timeout, TcpStream::connect(server)).await??;
        let mut framed = LengthDelimitedCodec::builder()
            .length_field_length(2)
            .new_framed(stream);
        framed.send(Bytes::copy_from_slice(packet)).await?;

        let frame = timeout(self.conf.timeout, framed.next())
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))??;
        Ok(frame.freeze())
    }

    async fn exchange(&self, server: SocketAddr, packet: &[u8], id: u16) -> io::Result<Bytes> {
        if self.conf.use_tcp {
            return self.exchange_tcp(server, packet).await;
        }
        let reply = self.exchange_udp(server, packet, id).await?;
        match Header::parse(&reply) {
            Ok(h) if h.is_truncated() => {
                debug!("Truncated reply from {}, retrying over TCP", server);
                self.exchange_tcp(server, packet).await
            }
            _ => Ok(reply),
        }
    }
}

#[async_trait]
impl DirectoryClient for StubDirectoryClient {
    async fn query(&self, name: &str, rtype: RecordType) -> Result<Bytes, QueryFailure> {
        let id: u16 = rand::random();
        let mut packet = BytesMut::new();
        Query { id, name, rtype }
            .encode(&mut packet)
            .map_err(|e| QueryFailure::new(ResolverStatus::NoRecovery, e.to_string()))?;

        let mut last = QueryFailure::new(ResolverStatus::TryAgain, "no name server answered");
        for attempt in 0..self.conf.attempts {
            for &server in &self.conf.nameservers {
                debug!("Query {} attempt {} via {}", name, attempt + 1, server);
                let reply = match self.exchange(server, &packet, id).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        debug!("Name server {} failed: {}", server, e);
                        last = QueryFailure::new(ResolverStatus::TryAgain, e.to_string());
                        continue;
                    }
                };
                let header = match Header::parse(&reply) {
                    Ok(h) if h.id == id => h,
                    _ => {
                        last = QueryFailure::new(ResolverStatus::TryAgain, "unusable reply");
                        continue;
                    }
                };
                match classify(&header) {
                    Verdict::Accept => return Ok(reply),
                    Verdict::Stop(status) => {
                        return Err(QueryFailure::new(status, format!("answer from {server}")));
                    }
                    Verdict::Next(status) => {
                        last = QueryFailure::new(status, format!("{:?} from {server}", header.rcode()));
                    }
                }
            }
        }
        Err(last)
    }
}
