//! Event type enumeration and event body wire format. Generalizes the
//! `mqtt::protocol` length-prefixed string/byte helpers into a small
//! serialization contract every event body implements.

use std::io::{self, Read, Write};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

use crate::error::EventError;

/// The fixed, append-only enumeration of domain event kinds.
/// New variants must be appended, never inserted, to preserve wire
/// compatibility with already-stored ordinal values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RoomBooked = 0,
    BookingCancelled = 1,
    CustomerCreated = 2,
    CustomerUpdated = 3,
    BookingPaid = 4,
    RoomCreated = 5,
    RoomUpdated = 6,
}

impl TryFrom<u8> for EventType {
    type Error = EventError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(EventType::RoomBooked),
            1 => Ok(EventType::BookingCancelled),
            2 => Ok(EventType::CustomerCreated),
            3 => Ok(EventType::CustomerUpdated),
            4 => Ok(EventType::BookingPaid),
            5 => Ok(EventType::RoomCreated),
            6 => Ok(EventType::RoomUpdated),
            other => Err(EventError::UnknownType(other)),
        }
    }
}

impl From<EventType> for u8 {
    fn from(event_type: EventType) -> Self {
        event_type as u8
    }
}

/// A type whose instances can be written as, and read back from, the body
/// of a `PUBLISH`/`CONSUME` payload (the bytes following the leading event
/// type identifier byte).
///
/// Implementers should serialize fields in a fixed declaration order; the
/// serializer does not carry field names or a schema, so producers and
/// consumers must agree on layout out of band.
pub trait EventBody: Sized {
    /// The fixed event type identifier this body is carried under.
    const EVENT_TYPE: EventType;

    fn write_body(&self, buf: &mut impl Write) -> io::Result<()>;
    fn read_body(buf: &mut impl Read) -> io::Result<Self>;
}

/// Writes a 128-bit unique identifier as two big-endian `u64`s, most
/// significant half first.
pub fn write_id(buf: &mut impl Write, id: u128) -> io::Result<()> {
    buf.write_u64::<NetworkEndian>((id >> 64) as u64)?;
    buf.write_u64::<NetworkEndian>(id as u64)
}

/// Reads a 128-bit unique identifier written by [`write_id`].
pub fn read_id(buf: &mut impl Read) -> io::Result<u128> {
    let high = buf.read_u64::<NetworkEndian>()? as u128;
    let low = buf.read_u64::<NetworkEndian>()? as u128;
    Ok((high << 64) | low)
}

/// Writes a length-prefixed UTF-8 string, mirroring
/// `mqtt::protocol::write_string`.
pub fn write_string(buf: &mut impl Write, value: &str) -> io::Result<()> {
    let bytes = value.as_bytes();
    buf.write_u16::<NetworkEndian>(bytes.len() as u16)?;
    buf.write_all(bytes)
}

/// Reads a length-prefixed UTF-8 string written by [`write_string`].
pub fn read_string(buf: &mut impl Read) -> io::Result<String> {
    let length = buf.read_u16::<NetworkEndian>()?;
    let mut bytes = vec![0u8; length as usize];
    buf.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf8"))
}

/// Splits a raw `PUBLISH`/`CONSUME` payload into its leading event type
/// identifier and body bytes. Empty payloads are malformed.
pub fn split_payload(payload: &[u8]) -> Result<(u8, &[u8]), EventError> {
    match payload.split_first() {
        Some((type_identifier, body)) => Ok((*type_identifier, body)),
        None => Err(EventError::EmptyPayload),
    }
}

/// `ROOM_BOOKED` event body: a booking for a room by a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomBooked {
    pub booking_id: u128,
    pub room_id: u128,
    pub customer_id: u128,
}

impl EventBody for RoomBooked {
    const EVENT_TYPE: EventType = EventType::RoomBooked;

    fn write_body(&self, buf: &mut impl Write) -> io::Result<()> {
        write_id(buf, self.booking_id)?;
        write_id(buf, self.room_id)?;
        write_id(buf, self.customer_id)
    }

    fn read_body(buf: &mut impl Read) -> io::Result<Self> {
        Ok(Self {
            booking_id: read_id(buf)?,
            room_id: read_id(buf)?,
            customer_id: read_id(buf)?,
        })
    }
}

/// `CUSTOMER_CREATED` event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerCreated {
    pub customer_id: u128,
    pub name: String,
}

impl EventBody for CustomerCreated {
    const EVENT_TYPE: EventType = EventType::CustomerCreated;

    fn write_body(&self, buf: &mut impl Write) -> io::Result<()> {
        write_id(buf, self.customer_id)?;
        write_string(buf, &self.name)
    }

    fn read_body(buf: &mut impl Read) -> io::Result<Self> {
        Ok(Self {
            customer_id: read_id(buf)?,
            name: read_string(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_u8() {
        for ordinal in 0..=6u8 {
            let event_type = EventType::try_from(ordinal).unwrap();
            assert_eq!(u8::from(event_type), ordinal);
        }
        assert!(EventType::try_from(7).is_err());
    }

    #[test]
    fn id_round_trips_across_the_64_bit_boundary() {
        let id = 0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10u128;
        let mut buf = Vec::new();
        write_id(&mut buf, id).unwrap();
        assert_eq!(buf.len(), 16);
        let decoded = read_id(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn room_booked_round_trips() {
        let event = RoomBooked {
            booking_id: 1,
            room_id: 2,
            customer_id: 3,
        };
        let mut buf = Vec::new();
        event.write_body(&mut buf).unwrap();
        let decoded = RoomBooked::read_body(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn customer_created_round_trips_with_string_field() {
        let event = CustomerCreated {
            customer_id: 42,
            name: "Ada Lovelace".to_string(),
        };
        let mut buf = Vec::new();
        event.write_body(&mut buf).unwrap();
        let decoded = CustomerCreated::read_body(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn split_payload_rejects_empty() {
        assert!(matches!(split_payload(&[]), Err(EventError::EmptyPayload)));
        let (type_identifier, body) = split_payload(&[2, 9, 9]).unwrap();
        assert_eq!(type_identifier, 2);
        assert_eq!(body, &[9, 9]);
    }
}
