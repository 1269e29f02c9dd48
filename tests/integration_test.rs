use async_trait::async_trait;
use model_batch::orchestrator::{BatchState, RunPhase};
use model_batch::{
    BatchRunner, RunOutcome, RunnerConfig, Task, TaskHandler, TaskId, TaskOutcome,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 模拟远程操作：固定耗时，指定的任务失败
#[derive(Default)]
struct RemoteOp {
    failing: HashSet<String>,
    running: AtomicUsize,
    peak: AtomicUsize,
    side_effects: Mutex<Vec<String>>,
}

#[async_trait]
impl TaskHandler<u32> for RemoteOp {
    async fn execute(&self, task: &Task<u32>) -> anyhow::Result<TaskOutcome> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200 + u64::from(task.payload % 3) * 50)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(task.id.as_str()) {
            return Ok(TaskOutcome::failure("remote returned 500"));
        }
        Ok(TaskOutcome::success())
    }

    async fn on_success(&self, task: &Task<u32>, _: &TaskOutcome) -> anyhow::Result<()> {
        self.side_effects.lock().unwrap().push(task.id.to_string());
        Ok(())
    }
}

fn tasks(n: u32) -> Vec<Task<u32>> {
    (1..=n).map(|i| Task::new(format!("task{}", i), i)).collect()
}

fn scenario_config() -> RunnerConfig {
    RunnerConfig {
        concurrency_limit: 5,
        batch_size: 10,
        cooldown_secs: 3,
        jitter_min_ms: 0,
        jitter_max_ms: 0,
        pause_poll_ms: 500,
        cooldown_after_last_batch: true,
    }
}

#[tokio::test(start_paused = true)]
async fn test_all_tasks_succeed_in_three_batches() {
    let op = Arc::new(RemoteOp::default());
    let runner = BatchRunner::new(scenario_config(), Arc::clone(&op)).unwrap();

    let summary = runner.run(tasks(23)).await.unwrap();

    let ranges: Vec<(usize, usize)> = summary
        .batches
        .iter()
        .map(|b| (b.first_item, b.last_item))
        .collect();
    assert_eq!(ranges, vec![(1, 10), (11, 20), (21, 23)]);
    assert!(summary.batches.iter().all(|b| b.state == BatchState::Success));

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.completed, 23);
    assert!(summary.failed_task_ids.is_empty());
    assert_eq!(summary.cooldowns_entered, 3);

    assert_eq!(op.peak.load(Ordering::SeqCst), 5);
    assert_eq!(op.side_effects.lock().unwrap().len(), 23);

    let snapshot = runner.reporter().snapshot();
    assert_eq!(snapshot.phase, RunPhase::Finished(RunOutcome::Completed));
    assert_eq!(snapshot.current_range, None);
    assert_eq!(snapshot.cooldown_remaining_secs, None);
}

#[tokio::test(start_paused = true)]
async fn test_single_failure_is_isolated() {
    let op = Arc::new(RemoteOp {
        failing: ["task5".to_string()].into(),
        ..Default::default()
    });
    let runner = BatchRunner::new(scenario_config(), Arc::clone(&op)).unwrap();

    let summary = runner.run(tasks(23)).await.unwrap();

    assert_eq!(summary.completed, 23);
    assert_eq!(summary.failed_task_ids, vec![TaskId::new("task5")]);
    assert_eq!(summary.succeeded(), 22);

    let states: Vec<BatchState> = summary.batches.iter().map(|b| b.state).collect();
    assert_eq!(
        states,
        vec![
            BatchState::PartialFailure,
            BatchState::Success,
            BatchState::Success
        ]
    );
    let message = summary.batches[0].message.as_deref().unwrap();
    assert!(message.contains("task5"));
    assert!(message.contains("remote returned 500"));

    let side_effects = op.side_effects.lock().unwrap();
    assert_eq!(side_effects.len(), 22);
    assert!(!side_effects.iter().any(|id| id == "task5"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_cooldown_stops_before_next_batch() {
    let op = Arc::new(RemoteOp::default());
    let config = RunnerConfig {
        cooldown_secs: 60,
        ..scenario_config()
    };
    let runner = BatchRunner::new(config, Arc::clone(&op)).unwrap();
    let control = runner.control();
    let mut rx = runner.reporter().subscribe();

    let ui = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.phase == RunPhase::Cooldown {
                control.cancel();
                return snapshot.completed;
            }
        }
        0
    });

    let summary = runner.run(tasks(23)).await.unwrap();
    let completed_at_cancel = ui.await.unwrap();

    assert_eq!(completed_at_cancel, 10);
    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert_eq!(summary.completed, 10);
    let states: Vec<BatchState> = summary.batches.iter().map(|b| b.state).collect();
    assert_eq!(
        states,
        vec![
            BatchState::Success,
            BatchState::Pending,
            BatchState::Pending
        ]
    );
    assert_eq!(summary.cooldowns_entered, 1);
    assert!(runner.pool().is_idle());
    assert_eq!(
        runner.reporter().snapshot().phase,
        RunPhase::Finished(RunOutcome::Cancelled)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_cooldown_returns_quickly() {
    let op = Arc::new(RemoteOp::default());
    let config = RunnerConfig {
        cooldown_secs: 600,
        ..scenario_config()
    };
    let runner = BatchRunner::new(config, Arc::clone(&op)).unwrap();
    let control = runner.control();
    let mut rx = runner.reporter().subscribe();

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            if rx.borrow_and_update().cooldown_remaining_secs == Some(598) {
                control.cancel();
                break;
            }
        }
    });

    let started = tokio::time::Instant::now();
    let summary = runner.run(tasks(15)).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
}
