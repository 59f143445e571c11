use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskgraph::dag::{Task, TaskGraph};
use taskgraph::engine::{ChainPhase, GraphOutcome, InterceptorChain, interceptor_fn};
use taskgraph::errors::CancelReason;
use taskgraph::exec::confirm::ConfirmInterceptor;
use taskgraph_test_utils::builders::recorded;
use taskgraph_test_utils::fixtures::test_executor;
use taskgraph_test_utils::recorder::{Event, EventLog};
use taskgraph_test_utils::{init_tracing, wait_until, with_timeout};

/// Stores the chain handle so the test decides when to release it.
#[derive(Default, Clone)]
struct Parked(Arc<Mutex<Option<InterceptorChain>>>);

impl Parked {
    fn interceptor(&self, name: &str) -> Arc<dyn taskgraph::engine::TaskInterceptor> {
        let slot = self.clone();
        interceptor_fn(name, move |chain| {
            *slot.0.lock().unwrap() = Some(chain);
        })
    }

    fn wait(&self) -> InterceptorChain {
        assert!(
            wait_until(Duration::from_secs(5), || self.0.lock().unwrap().is_some()),
            "interceptor never called"
        );
        self.0.lock().unwrap().clone().unwrap()
    }
}

#[tokio::test]
async fn synchronous_proceed_runs_the_body() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&calls);
    let graph = TaskGraph::builder("sync")
        .task(
            recorded("A", &log)
                .interceptor(interceptor_fn("count", move |chain| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    chain.proceed();
                }))
                .build()
                .unwrap(),
        )
        .build();

    let outcome = with_timeout(executor.execute(graph).unwrap().outcome())
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(log.has_run("A"));
}

#[tokio::test]
async fn interceptors_run_in_insertion_order() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();

    let step = |name: &'static str| {
        let order = Arc::clone(&order);
        interceptor_fn(name, move |chain| {
            order.lock().unwrap().push(name);
            chain.proceed();
        })
    };

    let log = EventLog::new();
    let graph = TaskGraph::builder("ordered")
        .task(
            recorded("A", &log)
                .interceptor(step("one"))
                .interceptor(step("two"))
                .interceptor(step("three"))
                .build()
                .unwrap(),
        )
        .build();

    with_timeout(executor.execute(graph).unwrap().outcome())
        .await
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["one", "two", "three"]);
}

#[tokio::test]
async fn worker_chain_waits_for_asynchronous_proceed() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();
    let parked = Parked::default();

    let graph = TaskGraph::builder("async-worker")
        .task(
            recorded("A", &log)
                .interceptor(parked.interceptor("gate"))
                .build()
                .unwrap(),
        )
        .build();

    let handle = executor.execute(graph).unwrap();
    let chain = parked.wait();

    std::thread::sleep(Duration::from_millis(50));
    assert!(!log.has_run("A"), "body must wait for proceed");
    assert!(!handle.is_finished());
    assert_eq!(
        handle.graph_controller().controller("A").unwrap().phase(),
        ChainPhase::Intercepting
    );

    std::thread::spawn(move || chain.proceed());

    let outcome = with_timeout(handle.outcome()).await.unwrap();
    assert!(outcome.is_completed());
    assert!(log.has_run("A"));
}

#[tokio::test]
async fn coordinator_chain_resumes_from_another_thread() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();
    let parked = Parked::default();

    let graph = TaskGraph::builder("async-coordinator")
        .task(
            recorded("ui", &log)
                .on_coordinator()
                .priority(1)
                .interceptor(parked.interceptor("dialog"))
                .build()
                .unwrap(),
        )
        .task(recorded("other", &log).on_coordinator().build().unwrap())
        .build();

    let handle = executor.execute(graph).unwrap();
    let chain = parked.wait();

    // The coordinator is not blocked by the paused chain.
    assert!(wait_until(Duration::from_secs(5), || log.has_run("other")));
    assert!(!log.has_run("ui"));

    std::thread::spawn(move || chain.proceed());

    let outcome = with_timeout(handle.outcome()).await.unwrap();
    assert!(outcome.is_completed());
    assert!(log.has_run("ui"));
}

#[tokio::test]
async fn second_proceed_on_a_step_is_ignored() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();

    let graph = TaskGraph::builder("double")
        .task(
            recorded("A", &log)
                .interceptor(interceptor_fn("twice", |chain| {
                    chain.proceed();
                    chain.proceed();
                }))
                .interceptor(interceptor_fn("pass", |chain| chain.proceed()))
                .build()
                .unwrap(),
        )
        .build();

    with_timeout(executor.execute(graph).unwrap().outcome())
        .await
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(log.ran(), vec!["A"]);
    assert_eq!(log.count(|e| matches!(e, Event::Finished(_))), 1);
}

#[tokio::test]
async fn late_proceed_after_completion_has_no_effect() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();
    let parked = Parked::default();

    let slot = parked.clone();
    let graph = TaskGraph::builder("late")
        .task(
            recorded("A", &log)
                .interceptor(interceptor_fn("keep", move |chain| {
                    *slot.0.lock().unwrap() = Some(chain.clone());
                    chain.proceed();
                }))
                .build()
                .unwrap(),
        )
        .build();

    let outcome = with_timeout(executor.execute(graph).unwrap().outcome())
        .await
        .unwrap();
    assert!(outcome.is_completed());

    let chain = parked.wait();
    chain.proceed();
    chain.cancel();

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(log.ran(), vec!["A"]);
}

#[tokio::test]
async fn cancel_from_interceptor_cancels_the_graph() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();

    let graph = TaskGraph::builder("veto")
        .task(
            recorded("A", &log)
                .interceptor(interceptor_fn("veto", |chain| chain.cancel()))
                .build()
                .unwrap(),
        )
        .task(recorded("B", &log).depends_on("A").build().unwrap())
        .listener(log.as_graph_listener())
        .build();

    let outcome = with_timeout(executor.execute(graph).unwrap().outcome())
        .await
        .unwrap();

    let GraphOutcome::Canceled(cancel) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(cancel.task, "A");
    assert_eq!(cancel.reason, CancelReason::Interceptor("veto".into()));
    assert!(!cancel.interrupted);
    assert_eq!(cancel.to_string(), "A canceled, because veto cancel");

    assert!(log.ran().is_empty());
    assert_eq!(log.cancellations(), vec![cancel]);
    assert_eq!(log.count(|e| matches!(e, Event::GraphEnd(_))), 0);
}

#[tokio::test]
async fn interrupting_a_waiting_chain_cancels_it() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();
    let parked = Parked::default();

    let graph = TaskGraph::builder("interrupt")
        .task(
            recorded("A", &log)
                .interceptor(parked.interceptor("never"))
                .build()
                .unwrap(),
        )
        .listener(log.as_graph_listener())
        .build();

    let handle = executor.execute(graph).unwrap();
    let _chain = parked.wait();
    handle.interrupt();

    let outcome = with_timeout(handle.outcome()).await.unwrap();
    let GraphOutcome::Canceled(cancel) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(cancel.reason, CancelReason::ThreadInterrupted);
    assert!(cancel.interrupted);
    assert_eq!(log.cancellations().len(), 1);
    assert!(!log.has_run("A"));
}

#[tokio::test]
async fn interrupt_leaves_idle_and_released_chains_alone() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();

    // B is still idle behind A when the interrupt arrives; its interceptor
    // releases synchronously once it does run.
    let graph = TaskGraph::builder("not-waiting")
        .task(
            Task::builder("A")
                .body(log.slow_body("A", Duration::from_millis(300)))
                .listener(log.as_task_listener())
                .build()
                .unwrap(),
        )
        .task(
            recorded("B", &log)
                .depends_on("A")
                .interceptor(interceptor_fn("pass", |chain| chain.proceed()))
                .build()
                .unwrap(),
        )
        .build();

    let handle = executor.execute(graph).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        log.position(&Event::Started("A".into())).is_some()
    }));
    assert_eq!(
        handle.graph_controller().controller("B").unwrap().phase(),
        ChainPhase::Idle
    );
    handle.interrupt();

    let outcome = with_timeout(handle.outcome()).await.unwrap();
    assert!(outcome.is_completed(), "unexpected outcome {outcome:?}");
    assert_eq!(log.ran(), vec!["A", "B"]);
}

#[tokio::test]
async fn confirmation_answer_drives_the_chain() {
    init_tracing();
    let (executor, _coordinator) = test_executor();
    let log = EventLog::new();

    let approve = ConfirmInterceptor::with_prompter(Arc::new(|_q: &str| Ok::<_, std::io::Error>(true)));
    let reject = ConfirmInterceptor::with_prompter(Arc::new(|_q: &str| Ok::<_, std::io::Error>(false)));

    let approved = TaskGraph::builder("approved")
        .task(recorded("A", &log).interceptor(Arc::new(approve)).build().unwrap())
        .build();
    let outcome = with_timeout(executor.execute(approved).unwrap().outcome())
        .await
        .unwrap();
    assert!(outcome.is_completed());

    let rejected = TaskGraph::builder("rejected")
        .task(recorded("B", &log).interceptor(Arc::new(reject)).build().unwrap())
        .build();
    let outcome = with_timeout(executor.execute(rejected).unwrap().outcome())
        .await
        .unwrap();
    let GraphOutcome::Canceled(cancel) = outcome else {
        panic!("expected cancellation");
    };
    assert_eq!(cancel.reason, CancelReason::Interceptor("confirm".into()));
    assert_eq!(log.ran(), vec!["A"]);
}
