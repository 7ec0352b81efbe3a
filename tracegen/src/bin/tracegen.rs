use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracegen::reader::{self, TraceView};
use tracegen::{
    args, global, source_location, Config, EventKind, EventOptions, Session, SliceTrack,
};

#[derive(Parser)]
#[command(name = "tracegen")]
#[command(about = "perfetto trace generator and inspector")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a multi-threaded synthetic workload.
    Demo {
        #[arg(
            short,
            long,
            default_value = "trace.perfetto",
            help = "output file for trace data"
        )]
        output: PathBuf,

        #[arg(short, long, default_value_t = 4, help = "number of worker threads")]
        threads: usize,

        #[arg(
            short,
            long,
            default_value = "1s",
            value_parser = humantime::parse_duration,
            help = "how long to run the workload (e.g. 500ms, 10s)"
        )]
        duration: Duration,

        #[arg(short, long, help = "configuration file path (toml format)")]
        config: Option<PathBuf>,
    },
    /// Print a summary of a trace file.
    Inspect {
        #[arg(help = "trace file to read")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Command::Demo {
            output,
            threads,
            duration,
            config,
        } => {
            let config = match config {
                Some(path) => Config::load(&path)
                    .with_context(|| format!("failed to load config path={}", path.display()))?,
                None => Config::default(),
            };
            demo(output, threads.max(1), duration, config)
        }
        Command::Inspect { path } => {
            let view = reader::read_file(&path)
                .with_context(|| format!("failed to read trace path={}", path.display()))?;
            print_summary(&view);
            Ok(())
        }
    }
}

fn demo(output: PathBuf, threads: usize, duration: Duration, config: Config) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received ctrl+c, shutting down gracefully...");
        r.store(false, Ordering::SeqCst);
    })?;

    let session = Session::create(&output, config)
        .with_context(|| format!("failed to create trace path={}", output.display()))?;
    let guard = global::open(&session)?;

    let pipeline = session.create_group("pipeline", Some("scheduler"));
    let queue_depth = pipeline.create_counter_track_with_unit("queue depth", Some("items"));
    let stages = pipeline.create_group("stages");
    let collector = stages.create_track("collector");

    let (tx, rx) = mpsc::channel::<(usize, Vec<u64>)>();
    let start = Instant::now();
    let keep_going = {
        let running = running.clone();
        move || running.load(Ordering::SeqCst) && start.elapsed() < duration
    };

    let collector_thread = {
        let session = session.clone();
        let queue_depth = queue_depth.clone();
        thread::Builder::new()
            .name("collector".to_string())
            .spawn(move || {
                for (worker, flows) in rx {
                    let ts = session.now();
                    queue_depth.increment(ts, -1);
                    let options = EventOptions::builder()
                        .args(args! { "worker" => worker })
                        .flows(flows)
                        .build();
                    collector.open_with(ts, "collect", options);
                    collector.close(session.now());
                }
            })?
    };

    let mut workers = Vec::with_capacity(threads);
    for worker in 0..threads {
        let session = session.clone();
        let tx = tx.clone();
        let queue_depth = queue_depth.clone();
        let keep_going = keep_going.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{}", worker))
            .spawn(move || {
                let mut iteration = 0u64;
                while keep_going() {
                    let mut scope = session.trace_scope_with(
                        "iteration",
                        EventOptions::builder()
                            .args(args! { "worker" => worker, "iteration" => iteration })
                            .location(source_location!())
                            .build(),
                    );
                    global::traced("compute", || thread::sleep(Duration::from_millis(2)));
                    if iteration % 8 == 0 {
                        global::instant("checkpoint", args! { "iteration" => iteration });
                    }
                    let flows = scope.allocate_flow_ids(1);
                    queue_depth.increment(session.now(), 1);
                    if tx.send((worker, flows)).is_err() {
                        break;
                    }
                    drop(scope);
                    iteration += 1;
                }
                iteration
            })?;
        workers.push(handle);
    }
    drop(tx);

    let mut iterations = 0;
    for worker in workers {
        iterations += worker
            .join()
            .map_err(|_| eyre::eyre!("worker thread panicked"))?;
    }
    collector_thread
        .join()
        .map_err(|_| eyre::eyre!("collector thread panicked"))?;

    guard.close()?;
    let stats = session.stats();
    session.close()?;

    tracing::info!(
        output = %output.display(),
        iterations,
        tracks = stats.tracks,
        packets = stats.writer.packets_written,
        bytes = stats.writer.bytes_written,
        "trace collection complete"
    );
    Ok(())
}

fn print_summary(view: &TraceView) {
    println!("packets: {}", view.packets().len());
    println!("tracks: {}", view.tracks().len());
    for track in view.tracks() {
        let depth = ancestors(view, track.uuid);
        println!(
            "  {}{} [{:?}] uuid={}",
            "  ".repeat(depth),
            track.name,
            track.kind,
            track.uuid
        );
    }

    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    let mut names: BTreeMap<&str, usize> = BTreeMap::new();
    for event in view.events() {
        *kinds.entry(format!("{:?}", event.kind)).or_default() += 1;
        if event.kind != EventKind::SliceEnd {
            if let Some(name) = &event.name {
                *names.entry(name.as_str()).or_default() += 1;
            }
        }
    }
    println!("events: {}", view.events().len());
    for (kind, count) in kinds {
        println!("  {}: {}", kind, count);
    }
    println!("names:");
    for (name, count) in names {
        println!("  {}: {}", name, count);
    }
    let flows: usize = view.events().iter().map(|e| e.flows.len()).sum();
    println!("flow references: {}", flows);
    if view.unresolved_references() > 0 {
        println!("unresolved interned references: {}", view.unresolved_references());
    }
}

fn ancestors(view: &TraceView, uuid: u64) -> usize {
    let mut depth = 0;
    let mut current = view.track(uuid).and_then(|t| t.parent);
    while let Some(parent) = current {
        depth += 1;
        current = view.track(parent).and_then(|t| t.parent);
    }
    depth
}
