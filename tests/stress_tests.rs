use rand::Rng;
use sluice::{Pipeline, PipelineOpts, Termination};
use std::thread;
use std::time::{Duration, Instant};

fn opts(workers: usize) -> PipelineOpts {
    PipelineOpts {
        workers,
        shutdown_grace: Duration::from_secs(3),
        ..PipelineOpts::default()
    }
}

// --- cancellation under load ---

/// Many independent pipelines, each cancelled after a random delay: every one must shut down
/// cleanly within its grace period, and whatever it emitted before cancelling must be a prefix of
/// the uncancelled result.
#[test]
fn test_random_cancel_timing_many_pipelines() {
    let mut rng = rand::thread_rng();
    let runs: Vec<_> = (0..24)
        .map(|_| {
            let delay = Duration::from_micros(rng.gen_range(0..5_000));
            let cap = rng.gen_range(0..4);
            thread::spawn(move || {
                let p = Pipeline::new(PipelineOpts {
                    channel_cap: cap,
                    ..opts(2)
                });
                let running = p
                    .source(0_u64..)
                    .stage(|v| v * 2)
                    .stage(|v| v + 1)
                    .finish();
                let shutdown = running.shutdown.clone();
                let canceller = thread::spawn(move || {
                    thread::sleep(delay);
                    shutdown.shutdown();
                });
                let got: Vec<u64> = running.output.iter().collect();
                canceller.join().unwrap();
                running.shutdown.shutdown_and_wait().unwrap();
                assert_eq!(running.shutdown.active_tasks(), 0);
                assert_eq!(running.shutdown.termination(), Termination::Cancelled);
                let expected: Vec<u64> = (0..got.len() as u64).map(|v| v * 2 + 1).collect();
                assert_eq!(got, expected);
            })
        })
        .collect();
    for r in runs {
        r.join().unwrap();
    }
}

#[test]
fn test_random_cancel_timing_fan_out() {
    let mut rng = rand::thread_rng();
    for _ in 0..16 {
        let workers = rng.gen_range(1..8);
        let delay = Duration::from_micros(rng.gen_range(0..3_000));
        let p = Pipeline::new(opts(workers));
        let running = p
            .source(0_u32..)
            .fan_out_default(|v| v.wrapping_mul(7))
            .stage(|v| v ^ 1)
            .finish();
        let shutdown = running.shutdown.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(delay);
            shutdown.shutdown();
        });
        let start = Instant::now();
        let drained = running.output.iter().count();
        canceller.join().unwrap();
        running.shutdown.shutdown_and_wait().unwrap();
        assert!(start.elapsed() < Duration::from_secs(3), "drained {}", drained);
        assert_eq!(running.shutdown.active_tasks(), 0);
    }
}

/// A thousand fan-out pipelines alive at once, each cancelled by its own deadline at a random
/// moment. Every one must shut down inside its grace period with no task left behind.
#[test]
fn test_thousand_concurrent_pipelines_random_deadlines() {
    let mut rng = rand::thread_rng();
    let start = Instant::now();
    let runs: Vec<_> = (0..1000)
        .map(|_| {
            let p = Pipeline::new(opts(rng.gen_range(1..3)));
            let running = p
                .source(0_u64..)
                .fan_out_default(|v| v.wrapping_mul(3))
                .stage(|v| v + 1)
                .finish();
            running
                .shutdown
                .token()
                .fire_after(Duration::from_micros(rng.gen_range(0..20_000)));
            running
        })
        .collect();

    let mut total = 0;
    for running in runs {
        total += running.output.iter().count();
        running.shutdown.shutdown_and_wait().unwrap();
        assert_eq!(running.shutdown.active_tasks(), 0);
        assert_eq!(running.shutdown.termination(), Termination::Cancelled);
    }
    assert!(
        start.elapsed() < Duration::from_secs(30),
        "{} item(s) in {:?}",
        total,
        start.elapsed()
    );
}

#[test]
fn test_finite_pipelines_complete_under_contention() {
    let mut rng = rand::thread_rng();
    let runs: Vec<_> = (0..12)
        .map(|_| {
            let n = rng.gen_range(0..400_u32);
            let workers = rng.gen_range(1..6);
            thread::spawn(move || {
                let p = Pipeline::new(opts(workers));
                let (mut out, ended) = p
                    .source(0..n)
                    .fan_out_default(|v| v + 1)
                    .collect()
                    .unwrap();
                out.sort_unstable();
                assert_eq!(out, (1..=n).collect::<Vec<_>>());
                assert_eq!(ended, Termination::Completed);
            })
        })
        .collect();
    for r in runs {
        r.join().unwrap();
    }
}
