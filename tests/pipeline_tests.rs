use sluice::pipeline::{
    PipelineContext, check_error_threshold, consume_results, generate, or_done, repeat,
    repeat_fn, run_fallible_stage, run_stage, take,
};
use sluice::{Pipeline, PipelineError, PipelineOpts, Termination, new_pipeline};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn opts() -> PipelineOpts {
    PipelineOpts {
        workers: 4,
        shutdown_grace: Duration::from_secs(2),
        ..PipelineOpts::default()
    }
}

// --- generate / run_stage ---

#[test]
fn test_generate_then_two_stages_in_order() {
    let ctx = PipelineContext::default();
    let src = generate(&ctx, vec![1, 2, 3, 4]);
    let doubled = run_stage(&ctx, src, |v: i32| v * 2);
    let out = run_stage(&ctx, doubled, |v: i32| v + 1);
    let got: Vec<i32> = out.iter().collect();
    assert_eq!(got, vec![3, 5, 7, 9]);
    ctx.tasks().join_all().unwrap();
    assert_eq!(ctx.tasks().active(), 0);
}

#[test]
fn test_empty_source_closes_immediately() {
    let ctx = PipelineContext::default();
    let out = run_stage(&ctx, generate(&ctx, Vec::<u8>::new()), |v| v);
    assert!(out.recv_timeout(Duration::from_secs(1)).is_err());
    ctx.tasks().join_all().unwrap();
}

#[test]
fn test_stage_output_is_a_fresh_channel() {
    let ctx = PipelineContext::default();
    let src = generate(&ctx, 0..3);
    let probe = src.clone();
    let out = run_stage(&ctx, src, |v: i32| v + 10);
    assert_eq!(out.iter().collect::<Vec<_>>(), vec![10, 11, 12]);
    // The source channel is fully drained by the stage, never handed back.
    assert!(probe.try_recv().is_err());
    ctx.tasks().join_all().unwrap();
}

#[test]
fn test_cancel_stops_infinite_generator() {
    let ctx = PipelineContext::default();
    let out = run_stage(&ctx, repeat_fn(&ctx, || 7_u8), |v| v);
    for _ in 0..10 {
        assert_eq!(out.recv().unwrap(), 7);
    }
    ctx.token().fire();
    ctx.tasks().wait_idle(Duration::from_secs(2)).unwrap();
    // Anything still buffered aside, the output must close.
    assert!(out.iter().count() <= 1);
    ctx.tasks().join_all().unwrap();
}

#[test]
fn test_dropping_output_unwinds_upstream_without_token() {
    let ctx = PipelineContext::default();
    let out = run_stage(&ctx, repeat_fn(&ctx, || 1_u64), |v| v * 2);
    assert_eq!(out.recv().unwrap(), 2);
    drop(out);
    ctx.tasks().wait_idle(Duration::from_secs(2)).unwrap();
    assert!(!ctx.token().is_fired());
}

#[test]
fn test_fired_token_wins_over_ready_input() {
    let ctx = PipelineContext::default();
    ctx.token().fire();
    let out = run_stage(&ctx, generate(&ctx, 0..1000), |v: i32| v);
    assert_eq!(out.iter().count(), 0);
    ctx.tasks().join_all().unwrap();
}

#[test]
fn test_stage_panic_closes_output_and_is_reported() {
    let ctx = PipelineContext::default();
    let out = run_stage(&ctx, generate(&ctx, 0..10), |v: i32| {
        if v == 3 {
            panic!("boom");
        }
        v
    });
    let got: Vec<i32> = out.iter().collect();
    assert_eq!(got, vec![0, 1, 2]);
    ctx.token().fire();
    match ctx.tasks().join_all() {
        Err(PipelineError::TaskPanicked { name }) => assert!(name.contains("stage")),
        other => panic!("expected TaskPanicked, got {:?}", other),
    }
}

// --- take / repeat / or_done ---

#[test]
fn test_take_from_repeat() {
    let ctx = PipelineContext::default();
    let out = take(&ctx, repeat(&ctx, vec!['a', 'b', 'c']), 7);
    let got: String = out.iter().collect();
    assert_eq!(got, "abcabca");
    ctx.token().fire();
    ctx.tasks().wait_idle(Duration::from_secs(2)).unwrap();
}

#[test]
fn test_repeat_empty_closes() {
    let ctx = PipelineContext::default();
    let out = repeat(&ctx, Vec::<u8>::new());
    assert!(out.recv_timeout(Duration::from_secs(1)).is_err());
}

#[test]
fn test_take_more_than_available() {
    let ctx = PipelineContext::default();
    let out = take(&ctx, generate(&ctx, 0..3), 10);
    assert_eq!(out.iter().collect::<Vec<i32>>(), vec![0, 1, 2]);
    ctx.tasks().join_all().unwrap();
}

#[test]
fn test_repeat_fn_counts_up() {
    let ctx = PipelineContext::default();
    let mut n = 0;
    let out = take(
        &ctx,
        repeat_fn(&ctx, move || {
            n += 1;
            n
        }),
        5,
    );
    assert_eq!(out.iter().collect::<Vec<i32>>(), vec![1, 2, 3, 4, 5]);
    ctx.token().fire();
}

#[test]
fn test_or_done_ends_plain_loop_on_cancel() {
    let ctx = PipelineContext::default();
    let (_keep_open, never_closes) = crossbeam_channel::bounded::<u32>(0);
    let out = or_done(&ctx, never_closes);
    let token = ctx.token().clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        token.fire();
    });
    let start = Instant::now();
    assert_eq!(out.iter().count(), 0);
    assert!(start.elapsed() < Duration::from_secs(2));
}

// --- fallible items ---

#[test]
fn test_fallible_stage_passes_errors_through() {
    let ctx = PipelineContext::default();
    let src = generate(
        &ctx,
        vec![Ok(1), Err("bad".to_string()), Ok(3)],
    );
    let out = run_fallible_stage(&ctx, src, |v: i32| {
        if v > 2 { Err(format!("{} too big", v)) } else { Ok(v * 10) }
    });
    let got: Vec<Result<i32, String>> = out.iter().collect();
    assert_eq!(
        got,
        vec![Ok(10), Err("bad".to_string()), Err("3 too big".to_string())]
    );
}

#[test]
fn test_consume_results_trips_threshold_and_fires_token() {
    let p = Pipeline::new(opts());
    let running = p
        .source(0..)
        .stage(|v: u64| if v % 2 == 1 { Err(format!("odd {}", v)) } else { Ok(v) })
        .finish();
    let mut seen = Vec::new();
    let report = consume_results(&running.shutdown, running.output, 3, |v| seen.push(v));
    assert!(report.tripped);
    assert_eq!(report.errors, 3);
    assert_eq!(seen, vec![0, 2, 4]);
    assert!(running.shutdown.is_cancelled());
    running.shutdown.shutdown_and_wait().unwrap();
    assert_eq!(running.shutdown.active_tasks(), 0);

    match check_error_threshold(&report, 3) {
        Err(PipelineError::TooManyErrors { count, threshold }) => {
            assert_eq!((count, threshold), (3, 3));
        }
        other => panic!("expected TooManyErrors, got {:?}", other),
    }
}

#[test]
fn test_consume_results_tolerates_errors_below_threshold() {
    let p = Pipeline::new(opts());
    let running = p
        .source(vec![Ok(1), Err("x"), Ok(2)])
        .finish();
    let report = consume_results(&running.shutdown, running.output, 2, |_| {});
    assert!(!report.tripped);
    assert_eq!((report.ok, report.errors), (2, 1));
    assert!(!running.shutdown.is_cancelled());
    assert!(check_error_threshold(&report, 2).is_ok());
    running.shutdown.wait().unwrap();
}

// --- Pipeline composer ---

#[test]
fn test_composer_example() {
    let p = new_pipeline(&opts()).unwrap();
    let (out, ended) = p
        .source(vec![1, 2, 3, 4])
        .stage(|v: i32| v * 2)
        .stage(|v: i32| v + 1)
        .collect()
        .unwrap();
    assert_eq!(out, vec![3, 5, 7, 9]);
    assert_eq!(ended, Termination::Completed);
}

#[test]
fn test_composer_empty_source() {
    let p = Pipeline::new(opts());
    let (out, ended) = p.source(Vec::<i32>::new()).stage(|v| v).collect().unwrap();
    assert!(out.is_empty());
    assert_eq!(ended, Termination::Completed);
}

#[test]
fn test_composer_take_then_collect() {
    let p = Pipeline::new(opts());
    let running = p.source(1_u32..).stage(|v| v * v).take(4).finish();
    let got: Vec<u32> = running.output.iter().collect();
    assert_eq!(got, vec![1, 4, 9, 16]);
    running.shutdown.shutdown_and_wait().unwrap();
    assert_eq!(running.shutdown.termination(), Termination::Cancelled);
}

#[test]
fn test_shutdown_stops_every_task_within_grace() {
    let p = Pipeline::new(opts());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let running = p
        .source(0_u64..)
        .stage(|v| v + 1)
        .fan_out_default(move |v| {
            counter.fetch_add(1, Ordering::Relaxed);
            v * 2
        })
        .stage(|v| v - 1)
        .finish();
    for _ in 0..50 {
        running.output.recv().unwrap();
    }
    assert!(running.shutdown.active_tasks() > 0);
    let start = Instant::now();
    running.shutdown.shutdown_and_wait().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(running.shutdown.active_tasks(), 0);
    assert!(seen.load(Ordering::Relaxed) >= 50);
    // Output is closed once every task has exited.
    assert!(running.output.iter().count() <= 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let p = Pipeline::new(opts());
    let handle = p.shutdown_handle();
    let running = p.source(0..).stage(|v: i64| v).finish();
    handle.shutdown();
    handle.shutdown();
    running.shutdown.shutdown_and_wait().unwrap();
    handle.shutdown_and_wait().unwrap();
    assert!(handle.is_cancelled());
}

#[test]
fn test_sequenced_fan_out_restores_order() {
    let p = Pipeline::new(opts());
    let (out, ended) = p
        .source_sequenced(0_u32..200)
        .fan_out(4, |item| {
            item.map(|v| {
                if v % 7 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
                v * 3
            })
        })
        .resequence()
        .collect()
        .unwrap();
    assert_eq!(out, (0..200).map(|v| v * 3).collect::<Vec<_>>());
    assert_eq!(ended, Termination::Completed);
}

#[test]
fn test_try_stage_in_composer() {
    let p = Pipeline::new(opts());
    let (out, _) = p
        .source(vec![Ok::<i32, String>(2), Err("nope".to_string()), Ok(5)])
        .try_stage(|v| Ok(v + 1))
        .collect()
        .unwrap();
    assert_eq!(out, vec![Ok(3), Err("nope".to_string()), Ok(6)]);
}

// --- configuration ---

#[test]
fn test_new_pipeline_rejects_stall_timeout_not_above_pulse() {
    let bad = PipelineOpts {
        pulse_interval: Duration::from_millis(100),
        stall_timeout: Duration::from_millis(100),
        ..PipelineOpts::default()
    };
    assert!(new_pipeline(&bad).is_err());
}

#[test]
fn test_new_pipeline_rejects_zero_max_errors() {
    let bad = PipelineOpts {
        max_errors: 0,
        ..PipelineOpts::default()
    };
    let err = new_pipeline(&bad).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::InvalidConfig(_))
    ));
}

#[test]
fn test_zero_workers_is_accepted() {
    let zero = PipelineOpts {
        workers: 0,
        ..opts()
    };
    let p = new_pipeline(&zero).unwrap();
    let (mut out, _) = p.source(0..10).fan_out_default(|v: i32| v).collect().unwrap();
    out.sort();
    assert_eq!(out, (0..10).collect::<Vec<_>>());
}
