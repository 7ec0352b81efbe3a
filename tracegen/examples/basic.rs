//! Writes a small hand-built trace with groups, counters, flows and nested
//! annotations. Timestamps are explicit and deliberately out of order.

use eyre::Result;
use std::collections::BTreeMap;
use tracegen::{args, Config, DebugValue, EventOptions, Session, SliceTrack};

fn flows(ids: &[u64]) -> EventOptions {
    EventOptions::builder().flows(ids.to_vec()).build()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "basic.perfetto".to_string());
    let session = Session::create(&path, Config::default())?;

    let aaa = session.create_group("aaa", Some("example_track"));
    aaa.open(100, "SOME_TRACK");
    aaa.close_with_flows(250, &[4]);

    let global_counter = session.create_counter_track("bbb");
    global_counter.count(0, 3).count(200, 5).count(400, 7).count(700, 2);

    let group_counter = aaa.create_counter_track("bbb");
    group_counter.count(0, 2).count(200, 4).count(400, 5).count(700, 1);

    let ddd = aaa.create_track("ddd");
    ddd.open(100, "WXX");
    ddd.close_with_flows(300, &[3]);

    session.flush()?;

    let vvv = session.create_group("vvv", None);
    vvv.create_counter_track("bbb2")
        .count(0, 2)
        .count(300, 400)
        .count(400, 500)
        .count(700, 1000);

    let ddd2 = vvv.create_track("ddd2");
    let ddd3 = vvv.create_track("ddd3");
    ddd3.instant(200, "WXYZ");
    ddd2.open(222, "XXX");
    ddd3.open_with(
        300,
        "WXX3",
        EventOptions::with_args(args! { "aaa" => "bbb", "ccc" => "ddd" }),
    );
    ddd3.instant_with(
        300,
        "ABCDE",
        EventOptions::with_args(args! { "aaa" => "bbb", "ccc" => "xxx" }),
    );
    ddd2.close(333);
    ddd3.open_with(
        400,
        "WXX4",
        EventOptions::builder()
            .args(args! { "aaa" => "bbb", "ccc" => "ddd" })
            .flows(vec![3, 4])
            .build(),
    );
    ddd3.instant(400, "ABCDE");

    let nested: BTreeMap<String, String> = [("aaa", "abc"), ("ccc", "ddd")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ddd3.instant_with(
        600,
        "ADE",
        EventOptions::with_args(args! { "aaa" => "abc", "ccc" => "xxx", "eee" => nested }),
    );
    ddd3.close_with_flows(670, &[2]);

    let complex = serde_json::json!({
        "aaa": "abc",
        "ccc": [1, 2, 3, 4, "a", "b", {"abcdef": "fdsa", "ggg": true}],
        "eee": {"aaa": "abc", "ccc": true, "eee": {"fff": "ggg", "hhh": 0x1234567}},
        "jjj": "kkk"
    });
    let DebugValue::Map(complex_args) = DebugValue::from(complex) else {
        eyre::bail!("json object did not convert to a map");
    };
    ddd3.instant_with(
        700,
        "ADE2",
        EventOptions::builder().args(complex_args).flows(vec![2]).build(),
    );
    ddd3.close_with_flows(900, &[1]);
    ddd2.open_with(900, "WXX2", flows(&[1]));
    ddd2.close(1000);

    let abc = session.create_group("abc.2", None);
    let xx = abc.create_group("XX");
    let t1 = xx.create_track("t1");
    let t2 = xx.create_track("t2");
    t1.open(100, "X");
    t2.open(300, "Y");
    t1.close(500);
    t2.close(600);

    session.close()?;
    tracing::info!(path = %path, "trace written");
    Ok(())
}
