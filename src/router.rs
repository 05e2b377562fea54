use std::collections::HashMap;

use crate::device::Endpoint;
use crate::error::FrameError;
use crate::frame::{decode, DecodeContext, DecodedFrame, FrameKind, FrameSchema};

/// How an endpoint picks the schema for a payload.
#[derive(Debug, Clone, Copy)]
pub enum Routing {
    /// Every payload has the same layout.
    Fixed(FrameKind),
    /// The bytes at `offset..offset + width` select the layout.
    Switch {
        offset: usize,
        width: usize,
        table: &'static [(&'static [u8], FrameKind)],
    },
}

#[derive(Debug)]
enum Route {
    Fixed(FrameKind),
    Table {
        offset: usize,
        width: usize,
        kinds: HashMap<&'static [u8], FrameKind>,
    },
}

/// Selects and applies the schema for payloads read from one endpoint.
#[derive(Debug)]
pub struct FrameTypeRouter {
    endpoint: &'static str,
    route: Route,
}

impl FrameTypeRouter {
    pub fn new(endpoint: &Endpoint) -> Self {
        let route = match endpoint.routing {
            Routing::Fixed(kind) => Route::Fixed(kind),
            Routing::Switch {
                offset,
                width,
                table,
            } => Route::Table {
                offset,
                width,
                kinds: table.iter().copied().collect(),
            },
        };
        Self {
            endpoint: endpoint.name,
            route,
        }
    }

    /// The schema for `bytes`.
    pub fn route(&self, bytes: &[u8]) -> Result<&'static FrameSchema, FrameError> {
        match &self.route {
            Route::Fixed(kind) => Ok(kind.schema()),
            Route::Table {
                offset,
                width,
                kinds,
            } => {
                let key = bytes
                    .get(*offset..offset + width)
                    .ok_or(FrameError::TooShort {
                        schema: self.endpoint,
                        needed: offset + width,
                        got: bytes.len(),
                    })?;
                kinds
                    .get(key)
                    .map(|kind| kind.schema())
                    .ok_or_else(|| FrameError::UnknownFrameType {
                        endpoint: self.endpoint,
                        discriminator: hex::encode(key),
                    })
            }
        }
    }

    pub fn dispatch(
        &self,
        bytes: &[u8],
        context: &mut DecodeContext,
    ) -> Result<Vec<DecodedFrame>, FrameError> {
        let schema = self.route(bytes)?;
        decode(schema, bytes, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{EndpointRole, BLUEBATTERY};
    use crate::frame::Value;

    fn router(role: EndpointRole) -> FrameTypeRouter {
        FrameTypeRouter::new(BLUEBATTERY.endpoint(role).unwrap())
    }

    #[test]
    fn test_every_table_key_routes_to_its_schema() {
        for endpoint in BLUEBATTERY.endpoints {
            let Routing::Switch {
                offset,
                width,
                table,
            } = endpoint.routing
            else {
                continue;
            };
            let router = FrameTypeRouter::new(endpoint);
            for (key, kind) in table {
                let mut payload = vec![0u8; 64];
                payload[offset..offset + width].copy_from_slice(key);
                assert_eq!(router.route(&payload).unwrap().kind, *kind);
            }
        }
    }

    #[test]
    fn test_tables_have_no_duplicate_keys() {
        for endpoint in BLUEBATTERY.endpoints {
            if let Routing::Switch { table, .. } = endpoint.routing {
                let unique: HashMap<_, _> = table.iter().copied().collect();
                assert_eq!(unique.len(), table.len(), "{}", endpoint.name);
            }
        }
    }

    #[test]
    fn test_unknown_live_frame_type() {
        let result = router(EndpointRole::Live).dispatch(
            &hex::decode("0707326403e8fffc18").unwrap(),
            &mut DecodeContext::default(),
        );
        assert_eq!(
            result,
            Err(FrameError::UnknownFrameType {
                endpoint: "live",
                discriminator: "0707".to_string()
            })
        );
    }

    #[test]
    fn test_log_payload_without_type_byte() {
        let result = router(EndpointRole::Log).route(&[0u8; 20]);
        assert_eq!(
            result.map(|schema| schema.name),
            Err(FrameError::TooShort {
                schema: "log",
                needed: 37,
                got: 20
            })
        );
    }

    #[test]
    fn test_dispatch_live_measurement() {
        let frames = router(EndpointRole::Live)
            .dispatch(
                &hex::decode("0007326403e8fffc18").unwrap(),
                &mut DecodeContext::default(),
            )
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::LiveMeasurement);
        assert_eq!(frames[0].get("battery_current_A"), Some(&Value::Float(-1.0)));
    }

    #[test]
    fn test_dispatch_log_by_type_byte() {
        let mut record = vec![0u8; 39];
        record[11] = 3;
        record[13] = 5;
        let frames = router(EndpointRole::Log)
            .dispatch(&record, &mut DecodeContext::default())
            .unwrap();
        assert_eq!(frames[0].kind, FrameKind::LogDays);
        assert_eq!(frames[0].output_id, "log/day/-2");
    }

    #[test]
    fn test_fixed_route() {
        let frames = router(EndpointRole::Clock)
            .dispatch(&[0x00, 0x00, 0x0e, 0x10], &mut DecodeContext::default())
            .unwrap();
        assert_eq!(frames[0].fields, vec![("time_of_day_s", Value::Int(3600))]);
    }
}
