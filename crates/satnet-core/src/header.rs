//! In-band metadata carried alongside simulated packets
//!
//! ## Core Components
//!
//! - [`GeoHeader`]: destination cells for geographic forwarding, four
//!   big-endian `u16` values on the wire
//! - [`TelemetrySidecar`]: congestion telemetry piggybacked between neighbours
//! - [`PacketSidecar`]: the metadata block attached to a packet in flight

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::HeaderError;
use crate::geometry::{quantize, Cell, GroundPhases, TorusDims};

/// Field value marking a header with no usable destination coordinates
pub const UNREACHABLE_CELL: u16 = u16::MAX;

/// Destination ground station cells in ascending and descending form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoHeader {
    pub asc_alpha: u16,
    pub asc_gamma: u16,
    pub desc_alpha: u16,
    pub desc_gamma: u16,
}

impl GeoHeader {
    /// Encoded size in bytes
    pub const LEN: usize = 8;

    /// Header for two cells; values at or above the sentinel are rejected
    pub fn new(ascending: Cell, descending: Cell) -> Result<Self, HeaderError> {
        let narrow = |value: u32| match u16::try_from(value) {
            Ok(v) if v != UNREACHABLE_CELL => Ok(v),
            _ => Err(HeaderError::CellOutOfRange { value }),
        };
        Ok(Self {
            asc_alpha: narrow(ascending.alpha)?,
            asc_gamma: narrow(ascending.gamma)?,
            desc_alpha: narrow(descending.alpha)?,
            desc_gamma: narrow(descending.gamma)?,
        })
    }

    /// Header with every field set to the unreachable sentinel
    pub fn unreachable() -> Self {
        Self {
            asc_alpha: UNREACHABLE_CELL,
            asc_gamma: UNREACHABLE_CELL,
            desc_alpha: UNREACHABLE_CELL,
            desc_gamma: UNREACHABLE_CELL,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        *self == Self::unreachable()
    }

    /// Quantise a ground station's phases onto the torus
    pub fn from_phases(phases: &GroundPhases, dims: &TorusDims) -> Result<Self, HeaderError> {
        let cell = |alpha: f64, gamma: f64| {
            Cell::new(
                quantize(alpha, dims.alpha_base()),
                quantize(gamma, dims.gamma_base()),
            )
        };
        Self::new(
            cell(phases.ascending.alpha_deg, phases.ascending.gamma_deg),
            cell(phases.descending.alpha_deg, phases.descending.gamma_deg),
        )
    }

    pub fn ascending(&self) -> Cell {
        Cell::new(self.asc_alpha as u32, self.asc_gamma as u32)
    }

    pub fn descending(&self) -> Cell {
        Cell::new(self.desc_alpha as u32, self.desc_gamma as u32)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(Self::LEN);
        buf.put_u16(self.asc_alpha);
        buf.put_u16(self.asc_gamma);
        buf.put_u16(self.desc_alpha);
        buf.put_u16(self.desc_gamma);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::LEN {
            return Err(HeaderError::Truncated {
                expected: Self::LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            asc_alpha: data.get_u16(),
            asc_gamma: data.get_u16(),
            desc_alpha: data.get_u16(),
            desc_gamma: data.get_u16(),
        })
    }
}

/// One congestion estimate per ground station
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueDistanceVector(Vec<u64>);

impl QueueDistanceVector {
    pub fn new(num_ground_stations: usize) -> Self {
        Self(vec![0; num_ground_stations])
    }

    pub fn from_vec(values: Vec<u64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, gs_index: usize) -> Option<u64> {
        self.0.get(gs_index).copied()
    }

    pub fn set(&mut self, gs_index: usize, value: u64) {
        if let Some(slot) = self.0.get_mut(gs_index) {
            *slot = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.0.iter().copied().enumerate()
    }
}

/// Congestion telemetry piggybacked on a data-plane frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetrySidecar {
    /// Queue-distance for a single destination ground station
    Flow { flow_id: u32, distance: u64 },
    /// Queue-distance for every ground station
    Vector(QueueDistanceVector),
}

impl TelemetrySidecar {
    pub fn to_bytes(&self) -> Result<Vec<u8>, HeaderError> {
        postcard::to_allocvec(self).map_err(|e| HeaderError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        postcard::from_bytes(bytes).map_err(|e| HeaderError::Decode(e.to_string()))
    }
}

/// Metadata travelling with a packet, outside its payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PacketSidecar {
    pub geo: Option<GeoHeader>,
    pub telemetry: Option<TelemetrySidecar>,
}

impl PacketSidecar {
    pub fn with_geo(geo: GeoHeader) -> Self {
        Self {
            geo: Some(geo),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySidecar) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Remove and return the telemetry record, leaving the geographic header
    pub fn take_telemetry(&mut self) -> Option<TelemetrySidecar> {
        self.telemetry.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ground_station_phases;

    #[test]
    fn test_geo_header_wire_layout() {
        let header = GeoHeader::new(Cell::new(1, 2), Cell::new(0x0304, 0xfffe)).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..], &[0, 1, 0, 2, 3, 4, 0xff, 0xfe]);
        assert_eq!(GeoHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_geo_header_truncated() {
        let err = GeoHeader::decode(&[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            HeaderError::Truncated {
                expected: 8,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_unreachable_sentinel() {
        let header = GeoHeader::unreachable();
        assert!(header.is_unreachable());
        assert_eq!(&header.to_bytes()[..], &[0xff; 8]);
        assert!(!GeoHeader::new(Cell::new(0, 0), Cell::new(0, 0)).unwrap().is_unreachable());
    }

    #[test]
    fn test_header_rejects_oversized_cells() {
        assert!(matches!(
            GeoHeader::new(Cell::new(70_000, 0), Cell::new(0, 0)),
            Err(HeaderError::CellOutOfRange { value: 70_000 })
        ));
        assert!(matches!(
            GeoHeader::new(Cell::new(0, 0), Cell::new(3, 0xffff)),
            Err(HeaderError::CellOutOfRange { value: 0xffff })
        ));
    }

    #[test]
    fn test_header_from_phases() {
        let dims = TorusDims::new(4, 4, 5);
        let phases = ground_station_phases(0.0, 90.0, 53.0, 0.0);
        let header = GeoHeader::from_phases(&phases, &dims).unwrap();
        assert_eq!(header.ascending(), Cell::new(5, 0));
        assert_eq!(header.descending(), Cell::new(15, 10));
    }

    #[test]
    fn test_telemetry_sidecar_postcard() {
        let flow = TelemetrySidecar::Flow {
            flow_id: 5,
            distance: 120,
        };
        let bytes = flow.to_bytes().unwrap();
        assert_eq!(TelemetrySidecar::from_bytes(&bytes).unwrap(), flow);

        let vector = TelemetrySidecar::Vector(QueueDistanceVector::from_vec(vec![0, 7, 42]));
        let bytes = vector.to_bytes().unwrap();
        assert_eq!(TelemetrySidecar::from_bytes(&bytes).unwrap(), vector);

        assert!(TelemetrySidecar::from_bytes(&[0xff]).is_err());
    }

    #[test]
    fn test_queue_distance_vector_bounds() {
        let mut v = QueueDistanceVector::new(2);
        v.set(1, 9);
        v.set(5, 3);
        assert_eq!(v.get(1), Some(9));
        assert_eq!(v.get(5), None);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(0, 0), (1, 9)]);
    }

    #[test]
    fn test_packet_sidecar_take_telemetry() {
        let mut sidecar = PacketSidecar::with_geo(GeoHeader::unreachable()).with_telemetry(
            TelemetrySidecar::Flow {
                flow_id: 1,
                distance: 2,
            },
        );
        assert!(sidecar.take_telemetry().is_some());
        assert!(sidecar.telemetry.is_none());
        assert!(sidecar.geo.is_some());
    }
}
