//! GeoIP Enricher
//! ==============
//! Address classification plus country/city lookup through an injected
//! GeoIP database provider.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

use crate::enrich::Enricher;
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::CanonicalRecord;

/// Address class derived from the IP itself, before any database lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Private,
    Reserved,
    Multicast,
    Public,
}

/// GeoIP attributes attached to a canonical record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpInfo {
    pub ip: String,
    pub kind: AddressKind,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Resolved location for a public address
#[derive(Debug, Clone)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
}

/// GeoIP database provider. Implementations may be absent entirely, in
/// which case public addresses carry no location.
pub trait GeoDb: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLocation>;
}

/// MaxMind GeoLite2/GeoIP2 database provider
pub struct MaxmindGeoDb {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxmindGeoDb {
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let reader = maxminddb::Reader::open_readfile(path.as_ref()).map_err(|e| {
            PipelineError::Enrichment {
                enricher: "geoip".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { reader })
    }
}

impl GeoDb for MaxmindGeoDb {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        let city: maxminddb::geoip2::City = self.reader.lookup(ip).ok()?;
        let country = city
            .country
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").map(|s| s.to_string()));
        let city = city
            .city
            .and_then(|c| c.names)
            .and_then(|names| names.get("en").map(|s| s.to_string()));
        Some(GeoLocation { country, city })
    }
}

/// Classify an address without consulting any database.
pub fn classify_ip(ip: IpAddr) -> AddressKind {
    match ip {
        IpAddr::V4(v4) => {
            if v4.is_private() || v4.is_loopback() || v4.is_link_local() {
                AddressKind::Private
            } else if v4.is_multicast() {
                AddressKind::Multicast
            } else if v4.is_broadcast() || v4.is_documentation() || v4.is_unspecified() {
                AddressKind::Reserved
            } else {
                AddressKind::Public
            }
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                AddressKind::Private
            } else if v6.is_multicast() {
                AddressKind::Multicast
            } else if v6.is_unspecified() {
                AddressKind::Reserved
            } else if (v6.segments()[0] & 0xfe00) == 0xfc00 {
                // Unique local fc00::/7
                AddressKind::Private
            } else {
                AddressKind::Public
            }
        }
    }
}

/// Enricher adding [`GeoIpInfo`] when the record carries a usable IP
pub struct GeoIpEnricher {
    db: Option<Box<dyn GeoDb>>,
}

impl GeoIpEnricher {
    pub fn new(db: Option<Box<dyn GeoDb>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Enricher for GeoIpEnricher {
    fn name(&self) -> &'static str {
        "geoip"
    }

    async fn enrich(&self, record: &mut CanonicalRecord) -> PipelineResult<()> {
        let Some(ip) = record.source_ip() else {
            return Ok(());
        };

        let kind = classify_ip(ip);
        let location = match (kind, self.db.as_ref()) {
            (AddressKind::Public, Some(db)) => db.lookup(ip),
            _ => None,
        };

        record.geoip = Some(GeoIpInfo {
            ip: ip.to_string(),
            kind,
            country: location.as_ref().and_then(|l| l.country.clone()),
            city: location.and_then(|l| l.city),
        });
        debug!(ip = %ip, ?kind, "geoip attributes attached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::ingest::Normalizer;

    struct StaticDb;

    impl GeoDb for StaticDb {
        fn lookup(&self, _ip: IpAddr) -> Option<GeoLocation> {
            Some(GeoLocation {
                country: Some("Norway".to_string()),
                city: Some("Oslo".to_string()),
            })
        }
    }

    fn record(json: &str) -> CanonicalRecord {
        let parsed = serde_json::from_str(json).unwrap();
        Normalizer::new(&IngestConfig::default()).normalize(parsed, json, "test")
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_ip("10.0.0.1".parse().unwrap()), AddressKind::Private);
        assert_eq!(classify_ip("224.0.0.5".parse().unwrap()), AddressKind::Multicast);
        assert_eq!(classify_ip("8.8.8.8".parse().unwrap()), AddressKind::Public);
        assert_eq!(classify_ip("192.0.2.7".parse().unwrap()), AddressKind::Reserved);
    }

    #[tokio::test]
    async fn test_private_ip_gets_no_lookup() {
        let enricher = GeoIpEnricher::new(Some(Box::new(StaticDb)));
        let mut rec = record(r#"{"message":"x","src_ip":"192.168.0.4"}"#);
        enricher.enrich(&mut rec).await.unwrap();
        let geo = rec.geoip.unwrap();
        assert_eq!(geo.kind, AddressKind::Private);
        assert!(geo.country.is_none());
    }

    #[tokio::test]
    async fn test_public_ip_resolved() {
        let enricher = GeoIpEnricher::new(Some(Box::new(StaticDb)));
        let mut rec = record(r#"{"message":"x","src_ip":"8.8.8.8"}"#);
        enricher.enrich(&mut rec).await.unwrap();
        let geo = rec.geoip.unwrap();
        assert_eq!(geo.country.as_deref(), Some("Norway"));
    }

    #[tokio::test]
    async fn test_no_ip_is_a_noop() {
        let enricher = GeoIpEnricher::new(None);
        let mut rec = record(r#"{"message":"no addresses here"}"#);
        enricher.enrich(&mut rec).await.unwrap();
        assert!(rec.geoip.is_none());
    }
}
