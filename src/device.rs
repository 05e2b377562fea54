//! Device families this crate knows how to talk to.

use bluest::Uuid;

use crate::frame::schemas::{LIVE_FRAME_TYPES, LOG_FRAME_TYPES};
use crate::frame::FrameKind;
use crate::router::Routing;
use crate::transport::Advertisement;

pub const SEC_UUID: Uuid = Uuid::from_u128(0x4b616901_40bd_428b_bf06_698e5e422cd9);
pub const LOG_UUID: Uuid = Uuid::from_u128(0x4b616907_40bd_428b_bf06_698e5e422cd9);
pub const LIVE_UUID: Uuid = Uuid::from_u128(0x4b616912_40bd_428b_bf06_698e5e422cd9);

/// What an endpoint carries, which decides how it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// Current measurements, polled or notified.
    Live,
    /// Circular day log behind a single auto-advancing register.
    Log,
    /// Device time of day. Reading or writing it rewinds the log cursor.
    Clock,
}

#[derive(Debug)]
pub struct Endpoint {
    pub name: &'static str,
    pub uuid: Uuid,
    pub role: EndpointRole,
    pub routing: Routing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementFilter {
    NamePrefix(&'static str),
    /// Case-insensitive.
    AddressPrefix(&'static str),
}

impl AdvertisementFilter {
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        match self {
            AdvertisementFilter::NamePrefix(prefix) => advertisement
                .name
                .as_deref()
                .is_some_and(|name| name.starts_with(prefix)),
            AdvertisementFilter::AddressPrefix(prefix) => advertisement
                .address
                .to_ascii_lowercase()
                .starts_with(&prefix.to_ascii_lowercase()),
        }
    }
}

#[derive(Debug)]
pub struct DeviceFamily {
    pub name: &'static str,
    /// A device belongs to the family if any filter matches.
    pub filters: &'static [AdvertisementFilter],
    pub endpoints: &'static [Endpoint],
}

impl DeviceFamily {
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        self.filters.iter().any(|filter| filter.matches(advertisement))
    }

    pub fn endpoint(&self, role: EndpointRole) -> Option<&'static Endpoint> {
        let endpoints: &'static [Endpoint] = self.endpoints;
        endpoints.iter().find(|endpoint| endpoint.role == role)
    }
}

pub static BLUEBATTERY: DeviceFamily = DeviceFamily {
    name: "BlueBattery",
    filters: &[AdvertisementFilter::NamePrefix("BlueBattery_")],
    endpoints: &[
        Endpoint {
            name: "sec",
            uuid: SEC_UUID,
            role: EndpointRole::Clock,
            routing: Routing::Fixed(FrameKind::Sec),
        },
        Endpoint {
            name: "live",
            uuid: LIVE_UUID,
            role: EndpointRole::Live,
            routing: Routing::Switch {
                offset: 0,
                width: 2,
                table: LIVE_FRAME_TYPES,
            },
        },
        Endpoint {
            name: "log",
            uuid: LOG_UUID,
            role: EndpointRole::Log,
            routing: Routing::Switch {
                offset: 36,
                width: 1,
                table: LOG_FRAME_TYPES,
            },
        },
    ],
};

pub static KNOWN_FAMILIES: &[&DeviceFamily] = &[&BLUEBATTERY];

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement(address: &str, name: Option<&str>) -> Advertisement {
        Advertisement {
            address: address.to_string(),
            name: name.map(str::to_string),
            rssi: Some(-60),
        }
    }

    #[test]
    fn test_bluebattery_matches_by_name() {
        assert!(BLUEBATTERY.matches(&advertisement("AA:BB", Some("BlueBattery_4711"))));
        assert!(!BLUEBATTERY.matches(&advertisement("AA:BB", Some("Other"))));
        assert!(!BLUEBATTERY.matches(&advertisement("AA:BB", None)));
    }

    #[test]
    fn test_address_prefix_ignores_case() {
        let filter = AdvertisementFilter::AddressPrefix("c4:7a");
        assert!(filter.matches(&advertisement("C4:7A:11:22:33:44", None)));
        assert!(!filter.matches(&advertisement("C4:7B:11:22:33:44", None)));
    }

    #[test]
    fn test_endpoint_by_role() {
        assert_eq!(BLUEBATTERY.endpoint(EndpointRole::Log).map(|e| e.uuid), Some(LOG_UUID));
        assert_eq!(BLUEBATTERY.endpoint(EndpointRole::Clock).map(|e| e.name), Some("sec"));
    }
}
