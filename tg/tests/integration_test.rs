//! Integration tests for TaskGate
//!
//! These drive a real worker over HTTP and read back the completion log.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use taskgate::config::Config;
use taskgate::rate::{LimitsConfig, RateBudget};
use taskgate::scheduler::SchedulerStats;
use taskgate::server::TASK_PATH;
use taskgate::worker;
use taskgate::CompletionLog;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const PACE: Duration = Duration::from_millis(100);

struct TestWorker {
    addr: SocketAddr,
    log: CompletionLog,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<eyre::Result<SchedulerStats>>,
    _dir: TempDir,
}

impl TestWorker {
    async fn start(burst: u32) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.completion.log_path = dir.path().join("task_logs.txt");
        config.limits = LimitsConfig {
            burst: RateBudget::new(burst, Duration::from_secs(60)),
            pace: RateBudget::new(1, PACE),
            retry_delay_ms: None,
        };

        let listener = worker::bind_shared(config.server.socket_addr().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let log = CompletionLog::new(&config.completion.log_path);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            worker::serve(listener, &config, async move {
                let _ = stop_rx.await;
            })
            .await
        });

        Self {
            addr,
            log,
            stop_tx,
            task,
            _dir: dir,
        }
    }

    fn url(&self) -> String {
        format!("http://{}{}", self.addr, TASK_PATH)
    }

    async fn wait_for_lines(&self, count: usize) -> Vec<String> {
        for _ in 0..400 {
            let lines = self.log.tail(usize::MAX, None).unwrap();
            if lines.len() >= count {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} completion lines, got {:?}", count, self.log.tail(usize::MAX, None));
    }

    async fn stop(self) -> SchedulerStats {
        self.stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("worker should stop")
            .unwrap()
            .unwrap()
    }
}

fn parse_line(line: &str) -> (String, DateTime<Utc>) {
    let (owner, stamp) = line.split_once(" - task completed at - ").expect("completion line format");
    let stamp = DateTime::parse_from_rfc3339(stamp).expect("rfc3339 timestamp");
    (owner.to_string(), stamp.with_timezone(&Utc))
}

async fn post(client: &reqwest::Client, url: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
    let response = client.post(url).json(&body).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn test_accepts_then_rate_limits_over_http() {
    let worker = TestWorker::start(3).await;
    let client = reqwest::Client::new();
    let url = worker.url();

    for _ in 0..3 {
        let (status, body) = post(&client, &url, json!({"user_id": "alice"})).await;
        assert_eq!(status, 202);
        assert_eq!(body, json!({"message": "Task accepted and queued for processing"}));
    }

    let (status, body) = post(&client, &url, json!({"user_id": "alice"})).await;
    assert_eq!(status, 429);
    assert_eq!(body, json!({"error": "Rate limit exceeded. Task queued for processing"}));

    // Another user has a budget of their own
    let (status, _) = post(&client, &url, json!({"user_id": "bob"})).await;
    assert_eq!(status, 202);

    worker.wait_for_lines(4).await;
    let stats = worker.stop().await;
    assert_eq!(stats.accepted, 4);
    assert_eq!(stats.burst_rejected, 1);
    assert_eq!(stats.executed, 4);
}

#[tokio::test]
async fn test_rejects_missing_user_id() {
    let worker = TestWorker::start(5).await;
    let client = reqwest::Client::new();
    let url = worker.url();

    for body in [json!({}), json!({"user_id": ""}), json!({"user_id": 7}), json!({"user_id": null})] {
        let (status, reply) = post(&client, &url, body.clone()).await;
        assert_eq!(status, 400, "{}", body);
        assert_eq!(reply, json!({"error": "User ID is required"}));
    }

    let response = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let stats = worker.stop().await;
    assert_eq!(stats.submitted, 0);
    assert_eq!(stats.executed, 0);
}

// =============================================================================
// Ordered, paced execution
// =============================================================================

#[tokio::test]
async fn test_tasks_complete_in_order_and_paced() {
    let worker = TestWorker::start(20).await;
    let client = reqwest::Client::new();
    let url = worker.url();

    for i in 0..4 {
        let (status, _) = post(&client, &url, json!({"user_id": "alice", "seq": i})).await;
        assert_eq!(status, 202);
    }

    let lines = worker.wait_for_lines(4).await;
    let stamps: Vec<DateTime<Utc>> = lines
        .iter()
        .map(|line| {
            let (owner, stamp) = parse_line(line);
            assert_eq!(owner, "alice");
            stamp
        })
        .collect();

    for pair in stamps.windows(2) {
        let gap = (pair[1] - pair[0]).num_milliseconds();
        // Millisecond timestamps, so allow one tick of truncation
        assert!(gap >= PACE.as_millis() as i64 - 1, "gap {}ms in {:?}", gap, lines);
    }

    worker.stop().await;
}

#[tokio::test]
async fn test_users_drain_independently() {
    let worker = TestWorker::start(20).await;
    let client = reqwest::Client::new();
    let url = worker.url();

    for _ in 0..3 {
        post(&client, &url, json!({"user_id": "alice"})).await;
    }
    post(&client, &url, json!({"user_id": "bob"})).await;

    let lines = worker.wait_for_lines(4).await;
    let owners: Vec<String> = lines.iter().map(|line| parse_line(line).0).collect();

    // bob's only task does not wait behind alice's backlog
    let bob = owners.iter().position(|o| o == "bob").expect("bob completed");
    assert!(bob < 3, "{:?}", owners);

    worker.stop().await;
}

#[tokio::test]
async fn test_concurrent_submissions_share_one_budget() {
    let worker = TestWorker::start(5).await;
    let client = reqwest::Client::new();
    let url = worker.url();

    let requests = (0..8).map(|_| post(&client, &url, json!({"user_id": "carol"})));
    let statuses: Vec<u16> = futures::future::join_all(requests)
        .await
        .into_iter()
        .map(|(status, _)| status)
        .collect();

    assert_eq!(statuses.iter().filter(|&&s| s == 202).count(), 5);
    assert_eq!(statuses.iter().filter(|&&s| s == 429).count(), 3);

    let stats = worker.stop().await;
    assert_eq!(stats.accepted, 5);
    assert_eq!(stats.burst_rejected, 3);
}
