use bytes::BytesMut;
use prost::Message;

#[allow(clippy::all)]
#[rustfmt::skip]
pub mod perfetto;

pub use perfetto::*;

/// Sequence carrying the clock snapshot and trace config.
pub const CLOCK_SEQUENCE_ID: u32 = 1;
/// Sequence carrying defaults, track descriptors and track events. Interned
/// data is scoped to this sequence.
pub const TRACK_SEQUENCE_ID: u32 = 2;
/// Track uuid advertised in the sequence defaults. No descriptor is ever
/// written for it; allocated uuids start far above it.
pub const DEFAULT_TRACK_UUID: u64 = 1;
/// Category iid attached to named events. It is never defined in interned
/// data, so the UI shows the events without a category name.
pub const DEFAULT_CATEGORY_IID: u64 = 1;
/// Clock used for every event timestamp on the track sequence.
pub const DEFAULT_CLOCK_ID: u32 = BuiltinClock::Realtime as u32;

const SNAPSHOT_CLOCKS: [BuiltinClock; 6] = [
    BuiltinClock::Realtime,
    BuiltinClock::RealtimeCoarse,
    BuiltinClock::Monotonic,
    BuiltinClock::MonotonicCoarse,
    BuiltinClock::MonotonicRaw,
    BuiltinClock::Boottime,
];

fn sequence_id(id: u32) -> Option<trace_packet::OptionalTrustedPacketSequenceId> {
    Some(trace_packet::OptionalTrustedPacketSequenceId::TrustedPacketSequenceId(id))
}

pub fn packet_sequence_id(packet: &TracePacket) -> Option<u32> {
    match packet.optional_trusted_packet_sequence_id {
        Some(trace_packet::OptionalTrustedPacketSequenceId::TrustedPacketSequenceId(id)) => {
            Some(id)
        }
        None => None,
    }
}

/// Declares every builtin clock at offset zero with boottime as the primary
/// trace clock.
pub fn clock_snapshot_packet() -> TracePacket {
    let clocks = SNAPSHOT_CLOCKS
        .iter()
        .map(|clock| clock_snapshot::Clock {
            clock_id: Some(*clock as u32),
            timestamp: Some(0),
        })
        .collect();

    TracePacket {
        data: Some(trace_packet::Data::ClockSnapshot(ClockSnapshot {
            clocks,
            primary_trace_clock: Some(BuiltinClock::Boottime as i32),
        })),
        optional_trusted_packet_sequence_id: sequence_id(CLOCK_SEQUENCE_ID),
        ..Default::default()
    }
}

pub fn trace_config_packet(buffer_size_kb: u32, data_source_name: &str) -> TracePacket {
    let config = TraceConfig {
        buffers: vec![trace_config::BufferConfig {
            size_kb: Some(buffer_size_kb),
        }],
        data_sources: vec![trace_config::DataSource {
            config: Some(DataSourceConfig {
                name: Some(data_source_name.to_string()),
            }),
        }],
    };

    TracePacket {
        data: Some(trace_packet::Data::TraceConfig(config)),
        optional_trusted_packet_sequence_id: sequence_id(CLOCK_SEQUENCE_ID),
        ..Default::default()
    }
}

/// Opens the track sequence: clears incremental state and sets the default
/// track and timestamp clock for every later packet on it.
pub fn sequence_defaults_packet() -> TracePacket {
    TracePacket {
        trace_packet_defaults: Some(TracePacketDefaults {
            track_event_defaults: Some(TrackEventDefaults {
                track_uuid: Some(DEFAULT_TRACK_UUID),
            }),
            timestamp_clock_id: Some(DEFAULT_CLOCK_ID),
        }),
        sequence_flags: Some(trace_packet::SequenceFlags::SeqIncrementalStateCleared as u32),
        optional_trusted_packet_sequence_id: sequence_id(TRACK_SEQUENCE_ID),
        ..Default::default()
    }
}

fn track_sequence_packet(
    timestamp: u64,
    data: trace_packet::Data,
    interned_data: Option<InternedData>,
) -> TracePacket {
    TracePacket {
        timestamp: Some(timestamp),
        data: Some(data),
        interned_data,
        sequence_flags: Some(trace_packet::SequenceFlags::SeqNeedsIncrementalState as u32),
        optional_trusted_packet_sequence_id: sequence_id(TRACK_SEQUENCE_ID),
        ..Default::default()
    }
}

pub fn process_track_descriptor(
    uuid: u64,
    pid: i32,
    process_name: String,
    track_name: Option<String>,
) -> TracePacket {
    let name = track_name.unwrap_or_else(|| process_name.clone());
    let track_desc = TrackDescriptor {
        uuid: Some(uuid),
        process: Some(ProcessDescriptor {
            pid: Some(pid),
            process_name: Some(process_name),
        }),
        static_or_dynamic_name: Some(track_descriptor::StaticOrDynamicName::Name(name)),
        ..Default::default()
    };

    track_sequence_packet(0, trace_packet::Data::TrackDescriptor(track_desc), None)
}

pub fn child_track_descriptor(
    uuid: u64,
    parent_uuid: Option<u64>,
    name: String,
    counter: Option<CounterDescriptor>,
) -> TracePacket {
    let track_desc = TrackDescriptor {
        uuid: Some(uuid),
        parent_uuid,
        static_or_dynamic_name: Some(track_descriptor::StaticOrDynamicName::Name(name)),
        counter,
        ..Default::default()
    };

    track_sequence_packet(0, trace_packet::Data::TrackDescriptor(track_desc), None)
}

pub fn counter_descriptor(unit_name: Option<String>) -> CounterDescriptor {
    CounterDescriptor {
        categories: vec!["dummy".to_string()],
        unit_name,
    }
}

pub fn track_event_packet(
    timestamp: u64,
    event: TrackEvent,
    interned_data: Option<InternedData>,
) -> TracePacket {
    track_sequence_packet(timestamp, trace_packet::Data::TrackEvent(event), interned_data)
}

pub fn track_event(track_uuid: u64, kind: track_event::Type) -> TrackEvent {
    TrackEvent {
        track_uuid: Some(track_uuid),
        r#type: Some(kind as i32),
        ..Default::default()
    }
}

pub fn create_debug_annotation(
    name: Option<String>,
    value: debug_annotation::Value,
) -> DebugAnnotation {
    DebugAnnotation {
        name_field: name.map(debug_annotation::NameField::Name),
        value: Some(value),
        ..Default::default()
    }
}

pub fn event_name_entry(iid: u64, name: &str) -> EventName {
    EventName {
        iid: Some(iid),
        name: Some(name.to_string()),
    }
}

pub fn source_location_entry(iid: u64, file: &str, function: &str, line: u32) -> SourceLocation {
    SourceLocation {
        iid: Some(iid),
        file_name: Some(file.to_string()),
        function_name: Some(function.to_string()),
        line_number: Some(line),
    }
}

/// Serializes a batch as one `Trace` container. Containers can be appended
/// back to back: the concatenation still parses as a single `Trace`.
pub fn encode_packets(packets: Vec<TracePacket>) -> Result<BytesMut, prost::EncodeError> {
    let trace = Trace { packet: packets };
    let mut buf = BytesMut::with_capacity(trace.encoded_len());
    trace.encode(&mut buf)?;
    Ok(buf)
}

pub fn decode_trace(bytes: &[u8]) -> Result<Trace, prost::DecodeError> {
    Trace::decode(bytes)
}
