//! Standard MIDI File serialisation.
//!
//! We only ever write format 0 (a single track), so this is much simpler than a general SMF
//! writer: a fixed 14-byte header chunk followed by one track chunk. All multi-byte integers are
//! big-endian, and delta times and meta event lengths are variable-length quantities.

use crate::{
    error::EncodingError,
    events::{MidiEvent, Tick},
};
use arrayvec::ArrayVec;
use std::convert::TryFrom;

/// Header chunk magic
pub const HEADER_MAGIC: &[u8; 4] = b"MThd";
/// Track chunk magic
pub const TRACK_MAGIC: &[u8; 4] = b"MTrk";
/// The header chunk's body is always 6 bytes: format, track count, division
pub const HEADER_LEN: u32 = 6;
/// SMF format 0, a single multi-channel track
pub const FORMAT_SINGLE_TRACK: u16 = 0;
/// Status byte that introduces a meta event
pub const META_PREFIX: u8 = 0xFF;
/// The largest value that fits in a 4-byte VLQ, which is the most a MIDI file allows
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;
/// The largest value that fits in 24 bits
pub const MAX_U24: u32 = 0x00FF_FFFF;
/// The largest ticks-per-quarter-note division. Setting the top bit means SMPTE timing instead.
pub const MAX_DIVISION: u16 = 0x7FFF;
/// The largest channel data byte. Anything above this would be read back as a status byte.
pub const MAX_DATA: u8 = 0x7F;

/// The bytes of a single VLQ. These are at most 4 bytes long so we never need to allocate.
pub type Vlq = ArrayVec<[u8; 4]>;

/// Encode a value as a MIDI variable-length quantity: 7 bits per byte, most significant group
/// first, with the high bit set on every byte except the last.
pub fn encode_vlq(value: u32) -> Result<Vlq, EncodingError> {
    if value > MAX_VLQ {
        return Err(EncodingError::VlqOverflow(value));
    }

    let mut out = Vlq::new();

    // Once one group is non-zero every group below it has to be written too, and since we're
    // shifting by less each time every following `value >> shift` is non-zero as well.
    for &shift in &[21, 14, 7] {
        if value >> shift != 0 {
            out.push((value >> shift) as u8 & 0x7F | 0x80);
        }
    }

    out.push(value as u8 & 0x7F);

    Ok(out)
}

/// Decode a variable-length quantity from the start of `bytes`, returning the value and the
/// number of bytes it took up. Returns `None` if the input ends mid-quantity or the quantity is
/// longer than 4 bytes.
pub fn decode_vlq(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;

    for (i, &byte) in bytes.iter().take(4).enumerate() {
        value = value << 7 | (byte & 0x7F) as u32;

        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }

    None
}

/// Pack the low 24 bits of `value` as 3 raw big-endian bytes. Unlike a VLQ there are no
/// continuation bits, this is the format of the tempo meta event.
pub fn pack_u24(value: u32) -> [u8; 3] {
    debug_assert!(value <= MAX_U24);

    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

/// The number of data bytes that follow a channel voice status byte. Program change and channel
/// pressure only take one.
fn data_len(status: u8) -> Result<usize, EncodingError> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => Ok(2),
        0xC0..=0xDF => Ok(1),
        _ => Err(EncodingError::InvalidStatus(status)),
    }
}

/// An event along with its time relative to the previous event in the track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEvent {
    /// Ticks since the previous event (or since the start, for the first event)
    pub delta: Tick,
    /// The event itself. Its absolute tick is kept but not written.
    pub event: MidiEvent,
}

impl DeltaEvent {
    /// Append the encoded event (delta time included) to `out`
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), EncodingError> {
        out.extend(encode_vlq(self.delta)?);

        match self.event {
            MidiEvent::Channel {
                status,
                data1,
                data2,
                ..
            } => {
                let len = data_len(status)?;

                for &data in [data1, data2].iter().take(len) {
                    if data > MAX_DATA {
                        return Err(EncodingError::InvalidData(data));
                    }
                }

                out.push(status);
                out.push(data1);

                if len == 2 {
                    out.push(data2);
                }
            }
            MidiEvent::Meta { kind, ref payload, .. } => {
                let len = u32::try_from(payload.len())
                    .map_err(|_| EncodingError::VlqOverflow(u32::MAX))?;

                out.push(META_PREFIX);
                out.push(kind);
                out.extend(encode_vlq(len)?);
                out.extend_from_slice(payload);
            }
        }

        Ok(())
    }
}

/// A fully-encoded track: the events with their delta times, and the bytes they encode to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackChunk {
    /// The events in the order they're written
    events: Vec<DeltaEvent>,
    /// The encoded event stream, not including the chunk header
    data: Vec<u8>,
}

impl TrackChunk {
    /// Compute delta times and encode the events. The events must already be sorted by tick, if
    /// they aren't this fails instead of writing a negative delta.
    pub fn new(events: &[MidiEvent]) -> Result<Self, EncodingError> {
        let mut previous = 0;
        let mut delta_events = Vec::with_capacity(events.len());
        let mut data = Vec::new();

        for (index, event) in events.iter().enumerate() {
            let tick = event.tick();
            let delta = tick
                .checked_sub(previous)
                .ok_or(EncodingError::NegativeDelta {
                    index,
                    tick,
                    previous,
                })?;

            let delta_event = DeltaEvent {
                delta,
                event: event.clone(),
            };

            delta_event.encode(&mut data)?;
            delta_events.push(delta_event);
            previous = tick;
        }

        if data.len() > u32::MAX as usize {
            return Err(EncodingError::TrackTooLong(data.len()));
        }

        Ok(TrackChunk {
            events: delta_events,
            data,
        })
    }

    /// The events, with delta times
    pub fn events(&self) -> &[DeltaEvent] {
        &self.events
    }

    /// The length of the encoded event stream, as written in the chunk header
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Whether the track has no events at all. A valid SMF track always has at least an
    /// end-of-track event, so this being `true` means the file won't be valid.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append the whole chunk, header included, to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(TRACK_MAGIC);
        out.extend_from_slice(&self.len().to_be_bytes());
        out.extend_from_slice(&self.data);
    }
}

/// Append a format 0 header chunk to `out`.
fn write_header(out: &mut Vec<u8>, resolution: u16) -> Result<(), EncodingError> {
    // If the top bit is set the division is SMPTE frames rather than PPQN
    if resolution == 0 || resolution > MAX_DIVISION {
        return Err(EncodingError::InvalidDivision(resolution));
    }

    out.extend_from_slice(HEADER_MAGIC);
    out.extend_from_slice(&HEADER_LEN.to_be_bytes());
    out.extend_from_slice(&FORMAT_SINGLE_TRACK.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&resolution.to_be_bytes());

    Ok(())
}

/// Serialise a sorted list of events into a complete single-track SMF with the given number of
/// ticks per quarter note. Either the whole file is produced or nothing is.
pub fn encode(events: &[MidiEvent], resolution: u16) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::new();

    write_header(&mut out, resolution)?;

    let track = TrackChunk::new(events)?;

    out.reserve(8 + track.len() as usize);
    track.write_to(&mut out);

    Ok(out)
}
