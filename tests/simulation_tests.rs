//! End-to-end tests: trace files through the simulator.

use std::io::Write;
use std::sync::Arc;

use evict_sim::config::{PolicyConfig, SimulationConfig};
use evict_sim::engine::PolicyKind;
use evict_sim::sim::trace::encode_oracle_general;
use evict_sim::sim::{
    run_simulation, simulate_at_multi_sizes, Request, ShardsSampler, TraceFormat, TraceReader,
};

fn sim_config(cache_sizes: Vec<u64>) -> SimulationConfig {
    SimulationConfig {
        cache_sizes,
        workers: 4,
        history_budget: None,
        ignore_obj_size: false,
        report_interval: 0,
    }
}

fn write_trace(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Skewed workload: a few hot objects interleaved with a long cold scan.
fn skewed_trace(len: u64) -> Vec<Request> {
    (0..len)
        .map(|i| {
            let obj_id = if i % 2 == 0 { i % 8 } else { 1_000 + i };
            Request {
                clock_time: i,
                obj_id,
                obj_size: 100,
            }
        })
        .collect()
}

#[test]
fn test_csv_trace_through_simulator() {
    let csv = "time,obj_id,obj_size\n\
               1,1,100\n\
               2,2,100\n\
               3,1,100\n\
               # comment\n\
               4,3,100\n\
               5,1,100\n\
               6,2,100\n";
    let file = write_trace(".csv", csv.as_bytes());

    let reader = TraceReader::open(file.path(), None).unwrap();
    assert_eq!(reader.format(), TraceFormat::Csv);
    let requests = reader.read_all().unwrap();
    assert_eq!(requests.len(), 6);

    // Room for two objects: 1 stays hot, 2 is pushed out by 3.
    let sim = sim_config(vec![200]);
    let stats = run_simulation(&requests, 200, None, &sim, &PolicyConfig::default()).unwrap();
    assert_eq!(stats.n_req, 6);
    assert_eq!(stats.n_miss, 4);
    assert_eq!(stats.n_evictions, 2);
    assert_eq!(stats.n_miss_byte, 400);
}

#[test]
fn test_compressed_binary_trace() {
    let requests = skewed_trace(500);
    let encoded = encode_oracle_general(&requests).unwrap();
    let compressed = zstd::encode_all(encoded.as_slice(), 3).unwrap();
    let file = write_trace(".oracleGeneral.bin.zst", &compressed);

    let reader = TraceReader::open(file.path(), None).unwrap();
    assert_eq!(reader.format(), TraceFormat::OracleGeneral);
    assert_eq!(reader.read_all().unwrap(), requests);
}

#[test]
fn test_sampled_trace_keeps_whole_objects() {
    let requests = skewed_trace(2_000);
    let file = write_trace(".bin", &encode_oracle_general(&requests).unwrap());
    let sampler = ShardsSampler::new(0.5).unwrap();

    let sampled = TraceReader::open(file.path(), None)
        .unwrap()
        .with_sampler(sampler)
        .read_all()
        .unwrap();

    assert!(!sampled.is_empty() && sampled.len() < requests.len());
    for id in sampled.iter().map(|r| r.obj_id) {
        let all = requests.iter().filter(|r| r.obj_id == id).count();
        let kept = sampled.iter().filter(|r| r.obj_id == id).count();
        assert_eq!(all, kept);
    }
}

#[tokio::test]
async fn test_lru_miss_ratio_does_not_increase_with_size() {
    let requests: Arc<[Request]> = skewed_trace(4_000).into();
    let sim = sim_config(vec![400, 200, 1_600, 800, 100]);

    let results =
        simulate_at_multi_sizes(requests, &sim, &PolicyConfig::default(), None, None).await;

    assert_eq!(results.len(), 5);
    let ratios: Vec<f64> = results
        .iter()
        .map(|r| r.stats.expect("run succeeded").miss_ratio())
        .collect();
    for pair in ratios.windows(2) {
        assert!(pair[1] <= pair[0], "miss ratios not monotone: {ratios:?}");
    }
}

/// Four hot objects warmed up, then each hot access followed by three
/// never-seen objects.
fn warmed_scan_trace(cycles: u64) -> Vec<Request> {
    let warmup = (0..3).flat_map(|_| 0..4u64);
    let scan = (0..cycles).flat_map(|c| {
        let hot = c % 4;
        let cold = (0..3).map(move |k| 10_000 + c * 3 + k);
        std::iter::once(hot).chain(cold)
    });
    warmup
        .chain(scan)
        .enumerate()
        .map(|(i, obj_id)| Request {
            clock_time: i as u64,
            obj_id,
            obj_size: 100,
        })
        .collect()
}

#[tokio::test]
async fn test_frequency_policy_beats_lru_on_scan() {
    let requests: Arc<[Request]> = warmed_scan_trace(400).into();
    let sim = sim_config(vec![600]);

    let lru = simulate_at_multi_sizes(
        Arc::clone(&requests),
        &sim,
        &PolicyConfig::default(),
        None,
        None,
    )
    .await;
    let lfu = simulate_at_multi_sizes(
        requests,
        &sim,
        &PolicyConfig {
            kind: PolicyKind::LfuLru,
            ..Default::default()
        },
        None,
        None,
    )
    .await;

    let lru = lru[0].stats.unwrap();
    let lfu = lfu[0].stats.unwrap();
    // LRU loses the hot set once the first cold objects arrive; LFU-LRU
    // keeps it resident for the whole scan.
    assert_eq!(lru.n_req - lru.n_miss, 8 + 1);
    assert_eq!(lfu.n_req - lfu.n_miss, 8 + 400);
}

#[test]
fn test_every_policy_replays_cleanly() {
    let requests = skewed_trace(1_000);
    let sim = sim_config(vec![500]);
    for kind in PolicyKind::ALL {
        let policy = PolicyConfig {
            kind,
            ..Default::default()
        };
        let stats = run_simulation(&requests, 500, None, &sim, &policy).unwrap();
        assert_eq!(stats.n_req, 1_000, "{kind}");
        assert!(stats.n_miss >= 500, "{kind}: cold scan always misses");
    }
}

#[test]
fn test_oversized_objects_bypass() {
    let requests = vec![
        Request {
            clock_time: 0,
            obj_id: 1,
            obj_size: 50,
        },
        Request {
            clock_time: 1,
            obj_id: 2,
            obj_size: 500,
        },
        Request {
            clock_time: 2,
            obj_id: 1,
            obj_size: 50,
        },
    ];
    let sim = sim_config(vec![100]);
    let stats = run_simulation(&requests, 100, None, &sim, &PolicyConfig::default()).unwrap();
    assert_eq!(stats.n_miss, 2);
    assert_eq!(stats.n_bypass, 1);
    assert_eq!(stats.n_evictions, 0);
}
