//! Threaded merge sort instrumented through the process-wide session.

use eyre::Result;
use std::thread;
use tracegen::{args, global, Config, Session};

fn merge(x1: &[u32], x2: &[u32]) -> Vec<u32> {
    let _scope = global::trace("merge", args! { "left" => x1.len(), "right" => x2.len() });
    let mut out = Vec::with_capacity(x1.len() + x2.len());
    let (mut p1, mut p2) = (0, 0);
    while p1 < x1.len() && p2 < x2.len() {
        if x1[p1] > x2[p2] {
            out.push(x2[p2]);
            p2 += 1;
        } else {
            out.push(x1[p1]);
            p1 += 1;
        }
    }
    out.extend_from_slice(&x1[p1..]);
    out.extend_from_slice(&x2[p2..]);
    out
}

fn merge_sort(x: Vec<u32>) -> Vec<u32> {
    let _scope = global::trace("merge_sort", args! { "len" => x.len() });
    let len = x.len();
    if len < 4096 {
        let mut x = x;
        x.sort_unstable();
        return x;
    }

    let (left, right) = x.split_at(len / 2);
    let (x1, x2) = if len < 40_000 {
        (merge_sort(left.to_vec()), merge_sort(right.to_vec()))
    } else {
        global::instant("INVOKE_THREAD", args! {});
        let (left, right) = (left.to_vec(), right.to_vec());
        let t1 = thread::spawn(move || merge_sort(left));
        let t2 = thread::spawn(move || merge_sort(right));
        (
            t1.join().unwrap_or_default(),
            t2.join().unwrap_or_default(),
        )
    };
    merge(&x1, &x2)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "profile.perfetto".to_string());
    let session = Session::create(&path, Config::default())?;
    let guard = global::open(&session)?;

    let sorted = global::traced("SORT", || {
        let xs: Vec<u32> = (0..100_000u32).map(|x| (17 * x + 8) % 100).collect();
        merge_sort(xs)
    });

    global::traced("VALIDATE", || {
        global::instant("CHECKING", args! { "final_result" => sorted.clone() });
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
    });

    guard.close()?;
    session.close()?;
    println!("Done");
    Ok(())
}
