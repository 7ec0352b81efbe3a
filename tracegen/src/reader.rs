//! Decoding of trace files written by a [`Session`](crate::Session) back
//! into tracks and events with interned names resolved.
//!
//! Used by the `inspect` subcommand and by tests. Interning state is tracked
//! per packet sequence, in packet order, and reset whenever a packet sets the
//! incremental-state-cleared flag.

use crate::annotation;
use crate::intern::SourceLocation;
use crate::packet::{CounterValue, EventKind};
use crate::track::TrackKind;
use crate::{Args, Result};
use perfetto_format::trace_packet::{Data, SequenceFlags};
use perfetto_format::track_descriptor::StaticOrDynamicName;
use perfetto_format::track_event::{self, CounterValueField, NameField, SourceLocationField};
use perfetto_format::{decode_trace, packet_sequence_id, TracePacket};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    ClockSnapshot,
    TraceConfig,
    SequenceDefaults,
    TrackDescriptor,
    TrackEvent,
    Other,
}

pub fn packet_kind(packet: &TracePacket) -> PacketKind {
    match &packet.data {
        Some(Data::ClockSnapshot(_)) => PacketKind::ClockSnapshot,
        Some(Data::TraceConfig(_)) => PacketKind::TraceConfig,
        Some(Data::TrackDescriptor(_)) => PacketKind::TrackDescriptor,
        Some(Data::TrackEvent(_)) => PacketKind::TrackEvent,
        None if packet.trace_packet_defaults.is_some() => PacketKind::SequenceDefaults,
        None => PacketKind::Other,
    }
}

/// A decoded track descriptor. Group tracks are written as plain named
/// tracks and read back as [`TrackKind::Normal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRecord {
    pub uuid: u64,
    pub name: String,
    pub parent: Option<u64>,
    pub kind: TrackKind,
    pub pid: Option<i32>,
    pub process_name: Option<String>,
    pub unit_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub track_uuid: u64,
    pub timestamp: u64,
    pub name: Option<String>,
    pub args: Args,
    pub flows: Vec<u64>,
    pub location: Option<SourceLocation>,
    pub counter: Option<CounterValue>,
    /// Index of the carrying packet in [`TraceView::packets`].
    pub packet_index: usize,
}

#[derive(Debug, Default)]
struct SequenceState {
    event_names: HashMap<u64, String>,
    source_locations: HashMap<u64, SourceLocation>,
}

/// Fully decoded trace.
#[derive(Debug, Default)]
pub struct TraceView {
    packets: Vec<TracePacket>,
    tracks: Vec<TrackRecord>,
    events: Vec<EventRecord>,
    name_definitions: HashMap<String, usize>,
    unresolved: usize,
}

impl TraceView {
    pub fn packets(&self) -> &[TracePacket] {
        &self.packets
    }

    /// Track descriptors in file order.
    pub fn tracks(&self) -> &[TrackRecord] {
        &self.tracks
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn track(&self, uuid: u64) -> Option<&TrackRecord> {
        self.tracks.iter().find(|track| track.uuid == uuid)
    }

    pub fn track_by_name(&self, name: &str) -> Option<&TrackRecord> {
        self.tracks.iter().find(|track| track.name == name)
    }

    pub fn events_on(&self, uuid: u64) -> impl Iterator<Item = &EventRecord> {
        self.events.iter().filter(move |event| event.track_uuid == uuid)
    }

    /// How many times `name` was defined in interned data.
    pub fn name_definitions(&self, name: &str) -> usize {
        self.name_definitions.get(name).copied().unwrap_or(0)
    }

    /// References to interned ids that had no earlier definition.
    pub fn unresolved_references(&self) -> usize {
        self.unresolved
    }
}

pub fn read_file(path: impl AsRef<Path>) -> Result<TraceView> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

pub fn decode(bytes: &[u8]) -> Result<TraceView> {
    let trace = decode_trace(bytes)?;
    let mut view = TraceView::default();
    let mut sequences: HashMap<u32, SequenceState> = HashMap::new();

    for (index, packet) in trace.packet.iter().enumerate() {
        let sequence = sequences
            .entry(packet_sequence_id(packet).unwrap_or(0))
            .or_default();
        let flags = packet.sequence_flags.unwrap_or(0);
        if flags & SequenceFlags::SeqIncrementalStateCleared as u32 != 0 {
            *sequence = SequenceState::default();
        }

        if let Some(interned) = &packet.interned_data {
            for entry in &interned.event_names {
                let name = entry.name().to_string();
                *view.name_definitions.entry(name.clone()).or_default() += 1;
                sequence.event_names.insert(entry.iid(), name);
            }
            for entry in &interned.source_locations {
                let location = SourceLocation::new(
                    entry.file_name(),
                    entry.function_name(),
                    entry.line_number(),
                );
                sequence.source_locations.insert(entry.iid(), location);
            }
        }

        match &packet.data {
            Some(Data::TrackDescriptor(desc)) => {
                let kind = if desc.process.is_some() {
                    TrackKind::Process
                } else if desc.counter.is_some() {
                    TrackKind::Counter
                } else {
                    TrackKind::Normal
                };
                let name = match &desc.static_or_dynamic_name {
                    Some(StaticOrDynamicName::Name(name))
                    | Some(StaticOrDynamicName::StaticName(name)) => name.clone(),
                    None => desc
                        .process
                        .as_ref()
                        .map(|p| p.process_name().to_string())
                        .unwrap_or_default(),
                };
                view.tracks.push(TrackRecord {
                    uuid: desc.uuid(),
                    name,
                    parent: desc.parent_uuid,
                    kind,
                    pid: desc.process.as_ref().and_then(|p| p.pid),
                    process_name: desc.process.as_ref().and_then(|p| p.process_name.clone()),
                    unit_name: desc.counter.as_ref().and_then(|c| c.unit_name.clone()),
                });
            }
            Some(Data::TrackEvent(event)) => {
                let kind = match event.r#type() {
                    track_event::Type::SliceBegin => EventKind::SliceBegin,
                    track_event::Type::SliceEnd => EventKind::SliceEnd,
                    track_event::Type::Instant => EventKind::Instant,
                    track_event::Type::Counter => EventKind::Counter,
                    track_event::Type::Unspecified => continue,
                };
                let name = match &event.name_field {
                    Some(NameField::Name(name)) => Some(name.clone()),
                    Some(NameField::NameIid(iid)) => {
                        let name = sequence.event_names.get(iid).cloned();
                        view.unresolved += usize::from(name.is_none());
                        name
                    }
                    None => None,
                };
                let location = match &event.source_location_field {
                    Some(SourceLocationField::SourceLocationIid(iid)) => {
                        let location = sequence.source_locations.get(iid).cloned();
                        view.unresolved += usize::from(location.is_none());
                        location
                    }
                    None => None,
                };
                view.events.push(EventRecord {
                    kind,
                    track_uuid: event.track_uuid(),
                    timestamp: packet.timestamp(),
                    name,
                    args: annotation::decode(&event.debug_annotations),
                    flows: event.flow_ids.clone(),
                    location,
                    counter: event.counter_value_field.as_ref().map(|value| match value {
                        CounterValueField::CounterValue(v) => CounterValue::Int(*v),
                        CounterValueField::DoubleCounterValue(v) => CounterValue::Double(*v),
                    }),
                    packet_index: index,
                });
            }
            _ => {}
        }
    }

    view.packets = trace.packet;
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::SequenceInterner;
    use crate::packet::{event_packet, Event, EventOptions};
    use perfetto_format::{
        child_track_descriptor, clock_snapshot_packet, encode_packets, sequence_defaults_packet,
    };

    fn encode(packets: Vec<TracePacket>) -> Vec<u8> {
        encode_packets(packets).unwrap().to_vec()
    }

    fn begin(interner: &mut SequenceInterner, ts: u64, name: &str) -> TracePacket {
        event_packet(
            Event::slice_begin(7, ts, name, EventOptions::default()),
            interner,
            16,
        )
    }

    #[test]
    fn resolves_interned_names_across_containers() {
        let mut interner = SequenceInterner::new();
        let first = encode(vec![
            sequence_defaults_packet(),
            child_track_descriptor(7, None, "lane".into(), None),
            begin(&mut interner, 10, "work"),
        ]);
        let second = encode(vec![
            event_packet(Event::slice_end(7, 20, vec![]), &mut interner, 16),
            begin(&mut interner, 30, "work"),
        ]);

        let view = decode(&[first, second].concat()).unwrap();
        assert_eq!(view.tracks().len(), 1);
        assert_eq!(view.track_by_name("lane").map(|t| t.uuid), Some(7));
        let names: Vec<_> = view.events().iter().map(|e| e.name.as_deref()).collect();
        assert_eq!(names, vec![Some("work"), None, Some("work")]);
        assert_eq!(view.name_definitions("work"), 1);
        assert_eq!(view.unresolved_references(), 0);
    }

    #[test]
    fn cleared_state_forgets_definitions() {
        let mut interner = SequenceInterner::new();
        let define = begin(&mut interner, 1, "a");
        let reuse = begin(&mut interner, 2, "a");
        let bytes = encode(vec![define, sequence_defaults_packet(), reuse]);

        let view = decode(&bytes).unwrap();
        assert_eq!(view.events()[1].name, None);
        assert_eq!(view.unresolved_references(), 1);
    }

    #[test]
    fn classifies_packets() {
        assert_eq!(packet_kind(&clock_snapshot_packet()), PacketKind::ClockSnapshot);
        assert_eq!(packet_kind(&sequence_defaults_packet()), PacketKind::SequenceDefaults);
        assert_eq!(packet_kind(&TracePacket::default()), PacketKind::Other);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode(&[0x0a, 0xff]).is_err());
    }
}
