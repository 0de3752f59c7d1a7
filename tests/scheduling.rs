//! Add, fire, edit and delete through the bootstrapped runtime

mod common;

use common::{boot, workspace, RecordingMailer, Reminder};
use durable_jobs::{engine::TriggerKind, JobConfiguration, SchedulerError};
use serde_json::json;
use std::{sync::Arc, time::Duration};

const HOUR: Duration = Duration::from_secs(3600);

fn reminder(value: &str) -> Reminder {
    Reminder { value: value.to_string() }
}

#[tokio::test]
async fn bounded_job_fires_exactly_repeat_count_times_then_removes_itself() {
    let dir = workspace();
    let mailer = Arc::new(RecordingMailer::default());
    let runtime = boot(dir.path(), mailer.clone()).await;
    let jobs = &runtime.scheduler;

    let configuration = JobConfiguration::interval(Duration::from_secs(5)).repeat(5).delayed(HOUR);
    jobs.add("reminder", "1001", &reminder("hi"), configuration).await.unwrap();

    for _ in 0..5 {
        assert!(jobs.trigger_now("reminder", "1001").await.unwrap());
    }
    assert!(!jobs.trigger_now("reminder", "1001").await.unwrap());

    assert_eq!(mailer.sent(), vec!["hi"; 5]);
    assert!(jobs.get("reminder", "1001").await.unwrap().is_none());
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn scripts_schedule_the_extracted_action() {
    let dir = workspace();
    let mailer = Arc::new(RecordingMailer::default());
    let runtime = boot(dir.path(), mailer.clone()).await;

    assert!(runtime.store.contains("reminder").await.unwrap());
    let next_fire = runtime
        .scripts
        .run("reminders", "schedule", json!({"key": "1001", "value": "Welcome, please activate"}))
        .await
        .unwrap();
    assert!(next_fire.is_string());

    runtime.scheduler.trigger_now("reminder", "1001").await.unwrap();
    assert_eq!(mailer.sent(), vec!["Welcome, please activate"]);

    let job = runtime.scheduler.get("reminder", "1001").await.unwrap().unwrap();
    assert_eq!(job.trigger.times_triggered, 1);
    assert!(matches!(job.trigger.kind, TriggerKind::Simple { repeat_count: Some(5), .. }));
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn editing_an_absent_job_is_a_no_op() {
    let dir = workspace();
    let runtime = boot(dir.path(), Arc::new(RecordingMailer::default())).await;

    let edited = runtime
        .scheduler
        .edit("reminder", "1001", &reminder("late"), Duration::from_secs(10), Some(HOUR))
        .await
        .unwrap();

    assert!(!edited);
    assert!(runtime.scheduler.list().await.unwrap().is_empty());
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn editing_reschedules_on_the_new_interval_and_recompiles() {
    let dir = workspace();
    let mailer = Arc::new(RecordingMailer::default());
    let runtime = boot(dir.path(), mailer.clone()).await;
    let jobs = &runtime.scheduler;
    let cache = runtime.gate.cache();

    let configuration = JobConfiguration::interval(Duration::from_secs(5)).repeat(5).delayed(HOUR);
    jobs.add("reminder", "1001", &reminder("hi"), configuration).await.unwrap();
    jobs.trigger_now("reminder", "1001").await.unwrap();
    assert!(cache.is_compiled("reminder").await);

    let edited = jobs
        .edit("reminder", "1001", &reminder("every ten"), Duration::from_secs(10), Some(HOUR))
        .await
        .unwrap();
    assert!(edited);
    assert!(!cache.is_compiled("reminder").await);

    let job = jobs.get("reminder", "1001").await.unwrap().unwrap();
    assert_eq!(job.trigger.times_triggered, 0);
    assert_eq!(
        job.trigger.kind,
        TriggerKind::Simple {
            interval_ms: 10_000,
            repeat_count: None
        }
    );

    jobs.trigger_now("reminder", "1001").await.unwrap();
    assert!(cache.is_compiled("reminder").await);
    assert_eq!(mailer.sent(), vec!["hi", "every ten"]);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn delete_then_add_starts_fresh() {
    let dir = workspace();
    let runtime = boot(dir.path(), Arc::new(RecordingMailer::default())).await;
    let jobs = &runtime.scheduler;
    let configuration = JobConfiguration::interval(Duration::from_secs(5)).repeat(2).delayed(HOUR);

    jobs.add("reminder", "1001", &reminder("first"), configuration.clone()).await.unwrap();
    jobs.trigger_now("reminder", "1001").await.unwrap();
    assert!(matches!(
        jobs.add("reminder", "1001", &reminder("dup"), configuration.clone()).await,
        Err(SchedulerError::JobAlreadyExists(_))
    ));

    assert!(jobs.delete("reminder", "1001").await.unwrap());
    assert!(!jobs.delete("reminder", "1001").await.unwrap());

    jobs.add("reminder", "1001", &reminder("second"), configuration).await.unwrap();
    let job = jobs.get("reminder", "1001").await.unwrap().unwrap();
    assert_eq!(job.trigger.times_triggered, 0);

    // the fresh job gets its full repeat budget
    assert!(jobs.trigger_now("reminder", "1001").await.unwrap());
    assert!(jobs.trigger_now("reminder", "1001").await.unwrap());
    assert!(jobs.get("reminder", "1001").await.unwrap().is_none());
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn script_edit_and_delete_go_through_the_facade() {
    let dir = workspace();
    let mailer = Arc::new(RecordingMailer::default());
    let runtime = boot(dir.path(), mailer.clone()).await;
    let scripts = &runtime.scripts;

    let absent = scripts
        .run("reminders", "reschedule", json!({"key": "7", "value": "x"}))
        .await
        .unwrap();
    assert_eq!(absent, json!(false));

    scripts.run("reminders", "schedule", json!({"key": "7", "value": "a"})).await.unwrap();
    let edited = scripts
        .run("reminders", "reschedule", json!({"key": "7", "value": "b"}))
        .await
        .unwrap();
    assert_eq!(edited, json!(true));

    runtime.scheduler.trigger_now("reminder", "7").await.unwrap();
    assert_eq!(mailer.sent(), vec!["b"]);

    let deleted = scripts.run("reminders", "cancel", json!({"key": "7"})).await.unwrap();
    assert_eq!(deleted, json!(true));
    assert!(runtime.scheduler.list().await.unwrap().is_empty());
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_schedules_are_rejected_before_anything_is_stored() {
    let dir = workspace();
    let runtime = boot(dir.path(), Arc::new(RecordingMailer::default())).await;

    let result = runtime
        .scheduler
        .add("reminder", "1", &reminder("x"), JobConfiguration::cron("not a cron"))
        .await;
    assert!(matches!(result, Err(SchedulerError::InvalidConfiguration(_))));
    assert!(runtime.scheduler.list().await.unwrap().is_empty());
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn identifiers_that_could_collide_in_job_keys_are_rejected() {
    let dir = workspace();
    let runtime = boot(dir.path(), Arc::new(RecordingMailer::default())).await;
    let configuration = JobConfiguration::interval(Duration::from_secs(5)).delayed(HOUR);

    runtime.scheduler.add("a", "_b", &reminder("x"), configuration.clone()).await.unwrap();
    let clash = runtime.scheduler.add("a_", "b", &reminder("y"), configuration).await;
    assert!(matches!(clash, Err(SchedulerError::InvalidConfiguration(_))));

    let jobs = runtime.scheduler.list().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].key, "a___b");
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn jobs_for_unknown_actions_fail_each_fire() {
    let dir = workspace();
    let runtime = boot(dir.path(), Arc::new(RecordingMailer::default())).await;
    let configuration = JobConfiguration::interval(Duration::from_secs(5)).repeat(2).delayed(HOUR);

    runtime.scheduler.add("ghost", "1", &reminder("x"), configuration).await.unwrap();
    assert!(matches!(
        runtime.scheduler.trigger_now("ghost", "1").await,
        Err(SchedulerError::ActionNotFound(id)) if id == "ghost"
    ));
    // the failed fire still counts
    let job = runtime.scheduler.get("ghost", "1").await.unwrap().unwrap();
    assert_eq!(job.trigger.times_triggered, 1);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn sub_millisecond_intervals_are_rejected_everywhere() {
    let dir = workspace();
    let runtime = boot(dir.path(), Arc::new(RecordingMailer::default())).await;

    let result = runtime
        .scheduler
        .add("reminder", "1", &reminder("x"), JobConfiguration::interval(Duration::from_micros(500)))
        .await;
    assert!(matches!(result, Err(SchedulerError::InvalidConfiguration(_))));

    runtime
        .scheduler
        .add("reminder", "2", &reminder("x"), JobConfiguration::interval(Duration::from_secs(5)).delayed(HOUR))
        .await
        .unwrap();
    let edited = runtime
        .scheduler
        .edit("reminder", "2", &reminder("y"), Duration::from_micros(500), None)
        .await;
    assert!(matches!(edited, Err(SchedulerError::InvalidConfiguration(_))));
    assert!(runtime.scheduler.get("reminder", "2").await.unwrap().is_some());

    assert!(runtime.scheduler.get("reminder", "1").await.unwrap().is_none());
    runtime.shutdown().await.unwrap();
}
