use crate::annotation::{self, Args};
use crate::intern::{SequenceInterner, SourceLocation};
use bon::Builder;
use perfetto_format::track_event::{self, CounterValueField, NameField, SourceLocationField};
use perfetto_format::{track_event_packet, TracePacket, DEFAULT_CATEGORY_IID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SliceBegin,
    SliceEnd,
    Instant,
    Counter,
}

impl From<EventKind> for track_event::Type {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::SliceBegin => track_event::Type::SliceBegin,
            EventKind::SliceEnd => track_event::Type::SliceEnd,
            EventKind::Instant => track_event::Type::Instant,
            EventKind::Counter => track_event::Type::Counter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterValue {
    Int(i64),
    Double(f64),
}

/// Optional payload of a begin or instant event.
#[derive(Debug, Clone, Default, Builder)]
pub struct EventOptions {
    #[builder(default)]
    pub args: Args,
    #[builder(default)]
    pub flows: Vec<u64>,
    pub location: Option<SourceLocation>,
}

impl EventOptions {
    pub fn with_args(args: Args) -> Self {
        Self {
            args,
            ..Default::default()
        }
    }
}

/// A single timestamped record on one track.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub track_uuid: u64,
    pub timestamp: u64,
    pub name: Option<String>,
    pub args: Args,
    pub flows: Vec<u64>,
    pub location: Option<SourceLocation>,
    pub counter: Option<CounterValue>,
}

impl Event {
    fn new(kind: EventKind, track_uuid: u64, timestamp: u64) -> Self {
        Self {
            kind,
            track_uuid,
            timestamp,
            name: None,
            args: Vec::new(),
            flows: Vec::new(),
            location: None,
            counter: None,
        }
    }

    fn with_options(mut self, name: &str, options: EventOptions) -> Self {
        self.name = Some(name.to_string());
        self.args = options.args;
        self.flows = options.flows;
        self.location = options.location;
        self
    }

    pub fn slice_begin(track_uuid: u64, timestamp: u64, name: &str, options: EventOptions) -> Self {
        Self::new(EventKind::SliceBegin, track_uuid, timestamp).with_options(name, options)
    }

    pub fn slice_end(track_uuid: u64, timestamp: u64, flows: Vec<u64>) -> Self {
        Self {
            flows,
            ..Self::new(EventKind::SliceEnd, track_uuid, timestamp)
        }
    }

    pub fn instant(track_uuid: u64, timestamp: u64, name: &str, options: EventOptions) -> Self {
        Self::new(EventKind::Instant, track_uuid, timestamp).with_options(name, options)
    }

    pub fn counter(track_uuid: u64, timestamp: u64, value: CounterValue) -> Self {
        Self {
            counter: Some(value),
            ..Self::new(EventKind::Counter, track_uuid, timestamp)
        }
    }
}

/// Lowers an event into a track-sequence packet. Slice names go through the
/// name table; instant names are written inline. Names or locations seen for
/// the first time are defined in this packet's interned data.
pub fn event_packet(
    event: Event,
    interner: &mut SequenceInterner,
    max_annotation_entries: usize,
) -> TracePacket {
    let mut interned = None;
    let mut proto_event = perfetto_format::track_event(event.track_uuid, event.kind.into());

    proto_event.name_field = match (event.kind, event.name) {
        (EventKind::SliceBegin, Some(name)) => {
            Some(NameField::NameIid(interner.event_name(&name, &mut interned)))
        }
        (EventKind::Instant, Some(name)) => Some(NameField::Name(name)),
        _ => None,
    };
    if matches!(event.kind, EventKind::SliceBegin | EventKind::Instant) {
        proto_event.category_iids = vec![DEFAULT_CATEGORY_IID];
    }

    if !event.args.is_empty() {
        proto_event.debug_annotations = annotation::encode(&event.args, max_annotation_entries);
    }
    proto_event.flow_ids = event.flows;

    if let Some(location) = &event.location {
        let iid = interner.source_location(location, &mut interned);
        proto_event.source_location_field = Some(SourceLocationField::SourceLocationIid(iid));
    }

    proto_event.counter_value_field = event.counter.map(|value| match value {
        CounterValue::Int(v) => CounterValueField::CounterValue(v),
        CounterValue::Double(v) => CounterValueField::DoubleCounterValue(v),
    });

    track_event_packet(event.timestamp, proto_event, interned)
}
