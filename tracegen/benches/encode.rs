use divan::Bencher;
use std::hint::black_box;
use tracegen::annotation;
use tracegen::intern::SequenceInterner;
use tracegen::packet::{event_packet, Event};
use tracegen::{Args, Config, DebugValue, EventOptions, Session, SliceTrack};

#[global_allocator]
static ALLOC: divan::AllocProfiler = divan::AllocProfiler::system();

fn main() {
    divan::main();
}

fn create_args(num_args: usize) -> Args {
    (0..num_args)
        .map(|i| {
            let value = match i % 4 {
                0 => DebugValue::from(format!("value_{}", i)),
                1 => DebugValue::from(i as i64 * 100),
                2 => DebugValue::from(i % 2 == 0),
                _ => DebugValue::from(vec![1.5f64, 2.5, 3.5]),
            };
            (format!("arg_{}", i), value)
        })
        .collect()
}

#[divan::bench(args = [0, 2, 5, 10, 20])]
fn encode_annotations(bencher: Bencher, num_args: usize) {
    let args = create_args(num_args);
    bencher.bench_local(|| black_box(annotation::encode(black_box(&args), 16)));
}

#[divan::bench(args = [0, 5, 20])]
fn slice_begin_packet(bencher: Bencher, num_args: usize) {
    let args = create_args(num_args);
    let mut interner = SequenceInterner::new();
    bencher.bench_local(|| {
        let options = EventOptions::with_args(args.clone());
        let event = Event::slice_begin(1_234_567, 1_000, "work", options);
        black_box(event_packet(event, &mut interner, 16))
    });
}

#[divan::bench]
fn session_slice_pair(bencher: Bencher) {
    let session = Session::open(std::io::sink(), Config::default());
    let track = session.create_group("bench", None);
    let mut ts = 0;
    bencher.bench_local(|| {
        ts += 2;
        track.open(ts, "work").close(ts + 1);
    });
}

#[divan::bench]
fn session_scope(bencher: Bencher) {
    let session = Session::open(std::io::sink(), Config::default());
    bencher.bench_local(|| {
        let _scope = session.trace_scope("work", Args::new());
    });
}
