use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};
use ytdlp_queue::downloader::correlator::UNKNOWN_JOB;
use ytdlp_queue::downloader::{
    DrainSummary, EventCorrelator, JobMonitor, JobOutcome, ProcessorState, QueueEvent,
    SequentialProcessor, SpawnOutcome, StartOutcome, WorkerSignal, signal_channel,
};
use ytdlp_queue::queue::{
    EditMode, EditSession, Job, JobForm, JobQueue, JobRequest, MemoryQueueRecord,
    QueuePersistence, QueueRecord,
};

mod common;

use common::{Script, ScriptedGateway, job};

struct Setup {
    processor: SequentialProcessor,
    monitor: JobMonitor,
    calls: Arc<Mutex<Vec<JobRequest>>>,
    overlapped: Arc<AtomicBool>,
}

// 处理器、关联器和假下载进程共用一个信号通道
fn setup<F>(queue: &JobQueue, build: F) -> Setup
where
    F: FnOnce(ScriptedGateway) -> ScriptedGateway,
{
    let (sender, receiver) = signal_channel();
    let monitor = JobMonitor::new();
    EventCorrelator::new(monitor.clone()).spawn(receiver);

    let gateway = build(ScriptedGateway::new(sender));
    let calls = gateway.calls();
    let overlapped = gateway.overlapped();
    let processor = SequentialProcessor::new(queue.clone(), Arc::new(gateway), monitor.clone());
    Setup {
        processor,
        monitor,
        calls,
        overlapped,
    }
}

async fn queue_with(urls: &[&str]) -> (JobQueue, MemoryQueueRecord) {
    let record = MemoryQueueRecord::new();
    let queue = JobQueue::new(QueuePersistence::new(Arc::new(record.clone()), true));
    for url in urls {
        queue.append(job(url)).await.unwrap();
    }
    (queue, record)
}

async fn record_urls(record: &MemoryQueueRecord) -> Vec<String> {
    record
        .read()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.url)
        .collect()
}

async fn wait_for_current(monitor: &JobMonitor, url: &str) {
    while monitor.current.url().await.as_deref() != Some(url) {
        tokio::task::yield_now().await;
    }
}

async fn called_urls(calls: &Mutex<Vec<JobRequest>>) -> Vec<String> {
    calls
        .lock()
        .await
        .iter()
        .map(|request| request.url.clone())
        .collect()
}

fn started(outcome: SpawnOutcome) -> tokio::task::JoinHandle<DrainSummary> {
    match outcome {
        SpawnOutcome::Started(handle) => handle,
        SpawnOutcome::AlreadyDraining => panic!("first start must succeed"),
    }
}

fn finished(outcome: StartOutcome) -> DrainSummary {
    match outcome {
        StartOutcome::Finished(summary) => summary,
        StartOutcome::AlreadyDraining => panic!("drain was not started"),
    }
}

#[tokio::test]
async fn test_drain_runs_jobs_in_order_without_overlap() {
    let (queue, _) = queue_with(&["A", "B", "C"]).await;
    let setup = setup(&queue, |gateway| {
        gateway.script(
            "B",
            Script::Signals(vec![
                WorkerSignal::Log("[download] Destination: b.mp4".to_string()),
                WorkerSignal::Progress(10),
                WorkerSignal::Progress(90),
                WorkerSignal::Complete(0),
            ]),
        )
    });

    let summary = finished(setup.processor.drain().await);

    let urls: Vec<String> = setup
        .calls
        .lock()
        .await
        .iter()
        .map(|request| request.url.clone())
        .collect();
    assert_eq!(urls, vec!["A", "B", "C"]);
    assert!(!setup.overlapped.load(Ordering::SeqCst));
    assert_eq!(summary.completed, vec!["A", "B", "C"]);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.total(), 3);
    assert!(queue.is_empty().await);
    assert_eq!(setup.processor.state(), ProcessorState::Idle);
}

#[tokio::test]
async fn test_job_fields_are_passed_to_gateway() {
    let (queue, _) = queue_with(&[]).await;
    let mut audio = Job::new("A", "/music");
    audio.format_only_audio = true;
    audio.strip_sponsor_segments = true;
    queue.append(audio).await.unwrap();

    let setup = setup(&queue, |gateway| gateway);
    finished(setup.processor.drain().await);

    let calls = setup.calls.lock().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].destination_path.to_str(), Some("/music"));
    assert!(calls[0].options.only_audio);
    assert!(!calls[0].options.expand_playlist);
    assert!(calls[0].options.strip_sponsor_segments);
}

#[tokio::test]
async fn test_progress_then_complete_leaves_empty_record() {
    let (queue, record) = queue_with(&["A"]).await;
    let setup = setup(&queue, |gateway| {
        gateway.script(
            "A",
            Script::Signals(vec![WorkerSignal::Progress(50), WorkerSignal::Complete(0)]),
        )
    });
    let mut events = setup.monitor.subscribe();

    let summary = finished(setup.processor.drain().await);
    assert_eq!(summary.completed, vec!["A"]);

    assert!(record.exists().await);
    assert!(record_urls(&record).await.is_empty());
    assert!(setup.monitor.current.job().await.is_none());
    assert_eq!(setup.monitor.activity.status().await, "");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&QueueEvent::Progress {
        url: Some("A".to_string()),
        percent: 50,
    }));
    assert!(seen.contains(&QueueEvent::JobFinished {
        url: "A".to_string(),
        outcome: JobOutcome::Completed { exit_code: 0 },
    }));
    assert_eq!(
        seen.last(),
        Some(&QueueEvent::DrainFinished {
            completed: 1,
            failed: 0
        })
    );
}

#[tokio::test]
async fn test_record_keeps_running_job_until_it_finishes() {
    let (queue, record) = queue_with(&["A", "B"]).await;
    let gate = Arc::new(Notify::new());
    let setup = setup(&queue, |gateway| gateway.gated(Arc::clone(&gate)));

    let handle = match setup.processor.spawn().await {
        SpawnOutcome::Started(handle) => handle,
        SpawnOutcome::AlreadyDraining => panic!("first start must succeed"),
    };

    wait_for_current(&setup.monitor, "A").await;
    assert_eq!(queue.snapshot().await.urls(), vec!["B"]);
    // 出队时不写记录，中途退出后当前任务还能恢复
    assert_eq!(record_urls(&record).await, vec!["A", "B"]);

    gate.notify_one();
    wait_for_current(&setup.monitor, "B").await;
    assert_eq!(record_urls(&record).await, vec!["B"]);

    gate.notify_one();
    handle.await.unwrap();
    assert!(record_urls(&record).await.is_empty());
}

#[tokio::test]
async fn test_edit_during_drain_updates_waiting_job() {
    let (queue, record) = queue_with(&["A", "B", "C"]).await;
    let gate = Arc::new(Notify::new());
    let setup = setup(&queue, |gateway| gateway.gated(Arc::clone(&gate)));

    let mut session = EditSession::new(JobForm::with_destination("/d"));
    session.begin_edit(&queue, 1).await.unwrap();
    session.form_mut().destination_path = "/new".to_string();

    let handle = started(setup.processor.spawn().await);
    wait_for_current(&setup.monitor, "A").await;

    // A 已出队，B 移到了第 0 项
    let editor = ScriptedGateway::new(signal_channel().0);
    let mode = session.commit(&queue, &editor).await.unwrap();
    assert_eq!(mode, EditMode::Update { index: 0 });

    let waiting = queue.snapshot().await.to_vec();
    assert_eq!(waiting.len(), 2);
    assert_eq!(waiting[0].url, "B");
    assert_eq!(waiting[0].destination_path, "/new");
    assert_eq!(waiting[1].url, "C");
    assert_eq!(waiting[1].destination_path, "/d");

    let saved = record.read().await.unwrap();
    let saved: Vec<_> = saved
        .iter()
        .map(|job| (job.url.as_str(), job.destination_path.as_str()))
        .collect();
    assert_eq!(saved, vec![("A", "/d"), ("B", "/new"), ("C", "/d")]);

    gate.notify_one();
    wait_for_current(&setup.monitor, "B").await;
    gate.notify_one();
    wait_for_current(&setup.monitor, "C").await;
    gate.notify_one();
    handle.await.unwrap();

    let calls = setup.calls.lock().await;
    assert_eq!(calls[1].url, "B");
    assert_eq!(calls[1].destination_path.to_str(), Some("/new"));
    assert!(record_urls(&record).await.is_empty());
}

#[tokio::test]
async fn test_append_during_drain_is_processed_and_recorded() {
    let (queue, record) = queue_with(&["A"]).await;
    let gate = Arc::new(Notify::new());
    let setup = setup(&queue, |gateway| gateway.gated(Arc::clone(&gate)));

    let handle = started(setup.processor.spawn().await);
    wait_for_current(&setup.monitor, "A").await;

    queue.append(job("B")).await.unwrap();
    assert_eq!(queue.snapshot().await.urls(), vec!["B"]);
    assert_eq!(record_urls(&record).await, vec!["A", "B"]);

    gate.notify_one();
    wait_for_current(&setup.monitor, "B").await;
    assert!(queue.is_empty().await);
    assert_eq!(record_urls(&record).await, vec!["B"]);

    gate.notify_one();
    let summary = handle.await.unwrap();
    assert_eq!(summary.completed, vec!["A", "B"]);
    assert!(record_urls(&record).await.is_empty());
}

#[tokio::test]
async fn test_remove_during_drain_keeps_running_job_in_record() {
    let (queue, record) = queue_with(&["A", "B", "C"]).await;
    let gate = Arc::new(Notify::new());
    let setup = setup(&queue, |gateway| gateway.gated(Arc::clone(&gate)));

    let handle = started(setup.processor.spawn().await);
    wait_for_current(&setup.monitor, "A").await;

    queue.remove_at([1]).await;
    assert_eq!(queue.snapshot().await.urls(), vec!["B"]);
    assert_eq!(record_urls(&record).await, vec!["A", "B"]);

    // 清空会删除记录，执行中的任务仍由处理器持有
    queue.clear().await;
    assert!(queue.is_empty().await);
    assert!(!record.exists().await);
    assert_eq!(queue.in_flight().await.map(|job| job.url), Some("A".to_string()));

    gate.notify_one();
    let summary = handle.await.unwrap();
    assert_eq!(summary.completed, vec!["A"]);
    assert_eq!(called_urls(&setup.calls).await, vec!["A"]);
    assert!(queue.in_flight().await.is_none());
    assert!(record_urls(&record).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_job_added_while_drain_ends_is_not_stranded() {
    for round in 0..50 {
        let (queue, _) = queue_with(&["A"]).await;
        let setup = setup(&queue, |gateway| gateway);

        let first = setup.processor.spawn().await;
        let second = {
            let queue = queue.clone();
            let processor = setup.processor.clone();
            tokio::spawn(async move {
                queue.append(job("B")).await.unwrap();
                processor.spawn().await
            })
        }
        .await
        .unwrap();

        for outcome in [first, second] {
            if let SpawnOutcome::Started(handle) = outcome {
                handle.await.unwrap();
            }
        }

        assert!(queue.is_empty().await, "round {}", round);
        assert_eq!(called_urls(&setup.calls).await, vec!["A", "B"], "round {}", round);
        assert!(!setup.overlapped.load(Ordering::SeqCst));
        assert_eq!(setup.processor.state(), ProcessorState::Idle);
    }
}

#[tokio::test]
async fn test_error_signal_does_not_stop_drain() {
    let (queue, _) = queue_with(&["A", "B", "C"]).await;
    let setup = setup(&queue, |gateway| {
        gateway.script(
            "A",
            Script::Signals(vec![
                WorkerSignal::Log("connecting".to_string()),
                WorkerSignal::Error("network".to_string()),
            ]),
        )
    });

    let summary = finished(setup.processor.drain().await);

    assert_eq!(summary.failed, vec![("A".to_string(), "network".to_string())]);
    assert_eq!(summary.completed, vec!["B", "C"]);
    assert_eq!(setup.calls.lock().await.len(), 3);

    let lines = setup.monitor.activity.log_lines().await;
    assert!(lines.contains(&"Failed to download A: network".to_string()));
    assert!(lines.contains(&"Finished C".to_string()));
}

#[tokio::test]
async fn test_start_failure_counts_as_failed_job() {
    let (queue, record) = queue_with(&["A", "B"]).await;
    let setup = setup(&queue, |gateway| gateway.script("A", Script::RejectStart));

    let summary = finished(setup.processor.drain().await);

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "A");
    assert!(summary.failed[0].1.contains("yt-dlp"));
    assert_eq!(summary.completed, vec!["B"]);
    assert!(record_urls(&record).await.is_empty());
}

#[tokio::test]
async fn test_second_start_while_draining_is_rejected() {
    let (queue, _) = queue_with(&["A"]).await;
    let gate = Arc::new(Notify::new());
    let setup = setup(&queue, |gateway| gateway.gated(Arc::clone(&gate)));

    let handle = match setup.processor.spawn().await {
        SpawnOutcome::Started(handle) => handle,
        SpawnOutcome::AlreadyDraining => panic!("first start must succeed"),
    };
    assert_eq!(setup.processor.state(), ProcessorState::Draining);

    assert!(matches!(
        setup.processor.drain().await,
        StartOutcome::AlreadyDraining
    ));
    assert!(matches!(
        setup.processor.spawn().await,
        SpawnOutcome::AlreadyDraining
    ));
    assert!(
        setup
            .monitor
            .activity
            .log_lines()
            .await
            .contains(&"A download is already in progress".to_string())
    );

    gate.notify_one();
    let summary = handle.await.unwrap();
    assert_eq!(summary.completed, vec!["A"]);
    assert_eq!(setup.processor.state(), ProcessorState::Idle);
}

#[tokio::test]
async fn test_drain_on_empty_queue_finishes_immediately() {
    let queue = JobQueue::in_memory();
    let setup = setup(&queue, |gateway| gateway);

    let summary = finished(setup.processor.drain().await);
    assert_eq!(summary.total(), 0);
    assert!(setup.calls.lock().await.is_empty());
    assert!(setup.monitor.current.job().await.is_none());
    assert_eq!(setup.processor.state(), ProcessorState::Idle);
}

#[tokio::test]
async fn test_signals_without_current_job_go_to_unknown() {
    let monitor = JobMonitor::new();
    let correlator = EventCorrelator::new(monitor.clone());
    let mut events = monitor.subscribe();

    correlator.handle(WorkerSignal::Progress(30)).await;
    correlator
        .handle(WorkerSignal::Log("stray line".to_string()))
        .await;
    correlator.handle(WorkerSignal::Complete(0)).await;

    assert!(monitor.current.job().await.is_none());
    assert_eq!(monitor.activity.status().await, "");
    let log = monitor.activity.log().await;
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|entry| entry.job == UNKNOWN_JOB));

    assert_eq!(
        events.try_recv().unwrap(),
        QueueEvent::Progress {
            url: None,
            percent: 30
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        QueueEvent::Log {
            url: None,
            line: "stray line".to_string()
        }
    );
}

#[tokio::test]
async fn test_correlator_attributes_signals_to_current_job() {
    let monitor = JobMonitor::new();
    let correlator = EventCorrelator::new(monitor.clone());

    let done = monitor.current.begin(job("A").with_title("Video A")).await;
    correlator.handle(WorkerSignal::Progress(42)).await;
    correlator
        .handle(WorkerSignal::Log("[download] 42.0%".to_string()))
        .await;

    let current = monitor.current.job().await.unwrap();
    assert_eq!(current.progress_percent, 42);
    assert_eq!(monitor.activity.status().await, "Video A: 42%");

    // 退出码只用于展示
    correlator.handle(WorkerSignal::Complete(3)).await;
    assert_eq!(done.await.unwrap(), JobOutcome::Completed { exit_code: 3 });

    // 重复的终止信号不会出错
    correlator
        .handle(WorkerSignal::Error("late".to_string()))
        .await;

    let log = monitor.activity.log().await;
    assert!(log.iter().all(|entry| entry.job == "A"));
}

#[tokio::test]
async fn test_closed_channel_fails_active_job() {
    let monitor = JobMonitor::new();
    let (sender, receiver) = signal_channel();
    let handle = EventCorrelator::new(monitor.clone()).spawn(receiver);

    let done = monitor.current.begin(job("A")).await;
    drop(sender);
    handle.await.unwrap();

    assert!(done.await.unwrap().is_failed());
}
