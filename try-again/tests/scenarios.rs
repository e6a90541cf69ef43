use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use try_again::{
    AbortController, Decision, DefaultDecider, ExecutionRecord, MaybeAsync, Options, RetryError,
    Run, wrap,
};

type Args = (String, u32);

#[derive(Debug, Clone, PartialEq)]
struct Value {
    name: &'static str,
}

const FINAL: Value = Value { name: "Final" };

fn args() -> Args {
    ("arg1".to_string(), 123)
}

#[tokio::test(start_paused = true)]
async fn fails_four_times_then_succeeds() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let handle = wrap(move |_args: Args| {
        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
        match n {
            1 | 3 => MaybeAsync::err(format!("E{}", n)),
            2 | 4 => MaybeAsync::future(async move { Err(format!("E{}", n)) }),
            _ => MaybeAsync::future(async {
                sleep(Duration::from_millis(30)).await;
                Ok(FINAL)
            }),
        }
    })
    .with_options(Options::default().with_retries(10));

    let value = handle.call(args()).await.unwrap();

    assert_eq!(value, FINAL);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    let records = handle.executions().snapshot();
    assert_eq!(records.len(), 5);

    let mut last_delay = Duration::ZERO;
    for (i, record) in records[..4].iter().enumerate() {
        assert_eq!(record.args, args());
        assert_eq!(record.error(), Some(&format!("E{}", i + 1)));
        let delay = record
            .decision
            .as_ref()
            .and_then(|d| d.delay())
            .expect("retry with a delay");
        assert!(delay > last_delay);
        last_delay = delay;
    }
    assert_eq!(records[4].returned_value(), Some(&FINAL));
    assert_eq!(records[4].decision, Some(Decision::Return(FINAL)));
    assert!(records.iter().all(|r| !r.aborted));
}

#[tokio::test(start_paused = true)]
async fn always_failing_stops_after_retries() {
    let handle = wrap(|_args: Args| MaybeAsync::<Value, String>::err("E".to_string()))
        .with_options(Options::default().with_retries(3));

    let err = handle.call(args()).await.unwrap_err();

    assert_eq!(err.inner().map(String::as_str), Some("E"));
    assert!(matches!(err, RetryError::Stopped(_)));
    let records = handle.executions().snapshot();
    assert_eq!(records.len(), 4);
    assert_eq!(records[3].decision, Some(Decision::Stop("E".to_string())));
}

#[tokio::test(start_paused = true)]
async fn retry_count_bounds_attempts() {
    for retries in 0..5 {
        let handle = wrap(|_args: Args| MaybeAsync::<Value, String>::err("E".to_string()))
            .with_options(
                Options::default()
                    .with_retries(retries)
                    .with_delay_multiplier(10),
            );
        assert!(handle.call(args()).await.is_err());
        assert_eq!(handle.executions().len(), retries as usize + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn slow_attempts_exhaust_the_time_budget() {
    let handle = wrap(|_args: Args| {
        MaybeAsync::<Value, String>::future(async {
            sleep(Duration::from_millis(400)).await;
            Err("slow".to_string())
        })
    })
    .with_options(
        Options::default()
            .with_retries(10)
            .with_delay_multiplier(100)
            .with_total_timeout(1_000),
    );

    let err = handle.call(args()).await.unwrap_err();

    assert_eq!(err.to_string(), "slow");
    assert_eq!(handle.executions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn aborted_signal_rejects_before_first_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let signal = AbortController::aborted("X");
    let handle = wrap(move |_args: Args| {
        c.fetch_add(1, Ordering::SeqCst);
        MaybeAsync::<Value, String>::ok(FINAL)
    })
    .with_options(Options::default().with_signal(Arc::new(signal)));

    let err = handle.call(args()).await.unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(err.to_string(), "Aborted: X");
    assert!(handle.executions().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn decider_failure_on_second_call() {
    let decisions = Arc::new(AtomicU32::new(0));
    let d = decisions.clone();
    let handle = wrap(|_args: Args| MaybeAsync::<Value, String>::err("E".to_string()))
        .with_decider(
            move |_run: &Run<Args, Value, String>| -> MaybeAsync<Decision<Args, Value, String>, String> {
                if d.fetch_add(1, Ordering::SeqCst) == 0 {
                    MaybeAsync::ok(Decision::try_again_in(Duration::from_millis(10)))
                } else {
                    MaybeAsync::err("decider".to_string())
                }
            },
            None,
        );

    let err = handle.call(args()).await.unwrap_err();

    assert!(matches!(&err, RetryError::Protocol(e) if e == "decider"));
    let records = handle.executions().snapshot();
    assert_eq!(records.len(), 2);
    assert!(records[0].decision.is_some());
    assert_eq!(records[1].decision, None);
}

#[tokio::test(start_paused = true)]
async fn external_abort_between_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let signal = AbortController::new();
    let handle = wrap(move |_args: Args| {
        c.fetch_add(1, Ordering::SeqCst);
        MaybeAsync::<Value, String>::err("E".to_string())
    })
    .with_options(Options::default().with_signal(Arc::new(signal.clone())));

    let fut = handle.call(args());
    sleep(Duration::from_millis(500)).await;
    signal.abort("X");

    let err = fut.await.unwrap_err();
    assert_eq!(err.to_string(), "Aborted: X");

    sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let record = handle.executions().last().unwrap();
    assert!(record.aborted);
    assert!(record.decision.as_ref().is_some_and(|d| d.is_try_again()));
    assert_eq!(signal.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn default_decider_on_handmade_history() {
    let decider = DefaultDecider::new(Options::default().with_delay_multiplier(50));
    let start = Instant::now();
    let failed = |ms: u64| -> ExecutionRecord<Args, Value, String> {
        ExecutionRecord::new(args(), start, start + Duration::from_millis(ms), Err("E".to_string()))
    };

    assert_eq!(
        decider.decide_from(&[failed(10)]),
        Decision::try_again_in(Duration::from_millis(50))
    );
    assert_eq!(
        decider.decide_from(&[failed(10), failed(10), failed(10)]),
        Decision::Stop("E".to_string())
    );

    let done = ExecutionRecord::new(args(), start, start, Ok(FINAL));
    assert_eq!(decider.decide_from(&[failed(10), done]), Decision::Return(FINAL));
}

