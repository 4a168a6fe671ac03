mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{Behavior, ScriptedHandler};
use webhook_queue::handlers::HandlerRegistry;
use webhook_queue::models::JobStatus;
use webhook_queue::queue::{QueueSettings, WebhookQueue};
use webhook_queue::worker;

const INTERVAL: Duration = Duration::from_secs(30);

#[tokio::test(start_paused = true)]
async fn first_tick_runs_immediately() {
    let stripe = ScriptedHandler::new("stripe", Behavior::Succeed);
    let h = common::harness(common::registry(&[stripe.clone()]));

    let id = h.queue.enqueue("stripe", &json!({ "type": "invoice.paid" })).await.unwrap();

    let processor = worker::spawn_processor(h.queue.clone(), INTERVAL);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.job(id).await.status, JobStatus::Completed);
    assert_eq!(stripe.calls(), 1);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn processor_exhausts_retries_on_schedule() {
    let a2e = ScriptedHandler::new("a2e", Behavior::Fail("timeout".to_string()));
    let h = common::harness(common::registry(&[a2e.clone()]));

    let id = h.queue.enqueue("a2e", &json!({ "task_id": "t-9" })).await.unwrap();
    let processor = worker::spawn_processor(h.queue.clone(), INTERVAL);

    // Ticks at 0s and 30s.
    tokio::time::sleep(Duration::from_secs(35)).await;
    let job = h.job(id).await;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 2);

    // Tick at 60s exhausts the job.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let job = h.job(id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 3);

    // Further ticks leave it alone.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(a2e.calls(), 3);
    assert_eq!(h.job(id).await.retry_count, 3);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn processor_picks_up_jobs_enqueued_later() {
    let youtube = ScriptedHandler::new("youtube", Behavior::Succeed);
    let h = common::harness(common::registry(&[youtube.clone()]));

    let processor = worker::spawn_processor(h.queue.clone(), INTERVAL);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let id = h.queue.enqueue("youtube", &json!({ "videoId": "abc" })).await.unwrap();
    assert_eq!(h.job(id).await.status, JobStatus::Pending);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.job(id).await.status, JobStatus::Completed);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn processor_survives_store_outage() {
    let queue = Arc::new(WebhookQueue::new(
        Arc::new(common::UnavailableStore),
        HandlerRegistry::with_defaults(),
        QueueSettings::default(),
    ));

    let processor = worker::spawn_processor(queue, INTERVAL);
    tokio::time::sleep(Duration::from_secs(95)).await;

    assert!(!processor.is_finished());
    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_loop() {
    let h = common::harness(HandlerRegistry::with_defaults());

    let processor = worker::spawn_processor(h.queue.clone(), INTERVAL);
    tokio::time::sleep(Duration::from_secs(1)).await;
    processor.stop().await;

    // Jobs enqueued after stop stay pending.
    let id = h.queue.enqueue("stripe", &json!({ "type": "invoice.paid" })).await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.job(id).await.status, JobStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn cleanup_sweeper_purges_expired_jobs() {
    let h = common::harness(HandlerRegistry::with_defaults());

    let old = h.queue.enqueue("stripe", &json!({ "type": "invoice.paid" })).await.unwrap();
    h.queue.process_pending().await;

    h.clock.advance(chrono::Duration::days(45));
    let recent = h.queue.enqueue("stripe", &json!({ "type": "invoice.paid" })).await.unwrap();
    h.queue.process_pending().await;

    let sweeper = worker::spawn_cleanup(h.queue.clone(), Duration::from_secs(3600), 30);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.queue.get_status(old).await.unwrap().is_none());
    assert_eq!(h.job(recent).await.status, JobStatus::Completed);

    sweeper.stop().await;
}
