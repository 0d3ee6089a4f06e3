mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::{EventEmitter, StubEngine, start_coordinator, start_coordinator_with};
use compactor_core::{
    AgentDefinition, AgentId, AgentStatus, EventFilter, EventKind, EventType, HealthLevel,
    JobConfig, JobStatus, Priority, Tier,
};

use common::{drain, fast_config, next_event, single_agent, wait_for_status, wait_until};

#[tokio::test]
async fn test_queues_sharing_a_swarm_wake_each_other() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup().await;
    let config = fast_config(single_agent("compress"), 1);
    let coordinator = start_coordinator(config.clone(), Arc::new(StubEngine::new(100_000))).await?;
    let first = coordinator.queue();
    let second = coordinator.spawn_queue(config.queue).await?;

    let hog = first.submit(JobConfig::compress("/data/hog"), Priority::Low).await?;
    wait_for_status(first, hog, JobStatus::Running).await;

    let waiting = second
        .submit(JobConfig::compress("/data/next"), Priority::Critical)
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        second.job(waiting).await?.map(|j| j.status),
        Some(JobStatus::Queued)
    );

    first.cancel(hog).await?;
    let job = wait_for_status(&second, waiting, JobStatus::Running).await;
    assert_eq!(job.agent_id, Some(AgentId::new("solo-1")));

    second.shutdown().await?;
    coordinator.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_degraded_agent_waits_for_reset() -> Result<(), Box<dyn Error>> {
    let guard = common::setup().await;
    let mut config = fast_config(single_agent("compress"), 1);
    config.swarm.failure_threshold = 1;
    config.swarm.fallback_to_degraded = false;
    let coordinator = start_coordinator(
        config,
        Arc::new(StubEngine::new(3).failing_on("/data/bad")),
    )
    .await?;
    let queue = coordinator.queue();
    let swarm = coordinator.swarm();
    let solo = AgentId::new("solo-1");
    let (_, mut status) = guard.emitter.subscribe_channel(
        EventFilter::types([EventType::AgentStatusChanged]).for_agent(solo.clone()),
    );

    let bad = queue.submit(JobConfig::compress("/data/bad"), Priority::Normal).await?;
    wait_for_status(queue, bad, JobStatus::Failed).await;
    let degraded = next_event(&mut status, |e| {
        matches!(
            e.kind,
            EventKind::AgentStatusChanged {
                new_status: AgentStatus::Degraded,
                ..
            }
        )
    })
    .await;
    assert!(degraded.sequence > 0);

    let good = queue.submit(JobConfig::compress("/data/good"), Priority::Normal).await?;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(queue.queue_len().await?, 1);

    swarm.reset(&solo)?;
    wait_for_status(queue, good, JobStatus::Completed).await;
    assert_eq!(swarm.agent(&solo).map(|a| a.failure_streak), Some(0));

    coordinator.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_degraded_agent_is_last_resort() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup().await;
    let mut config = fast_config(single_agent("compress"), 1);
    config.swarm.failure_threshold = 1;
    let coordinator = start_coordinator(
        config,
        Arc::new(StubEngine::new(3).failing_on("/data/bad")),
    )
    .await?;
    let queue = coordinator.queue();
    let solo = AgentId::new("solo-1");

    let bad = queue.submit(JobConfig::compress("/data/bad"), Priority::Normal).await?;
    wait_for_status(queue, bad, JobStatus::Failed).await;
    assert_eq!(
        coordinator.swarm().agent(&solo).map(|a| a.status),
        Some(AgentStatus::Degraded)
    );

    let good = queue.submit(JobConfig::compress("/data/good"), Priority::Normal).await?;
    let job = wait_for_status(queue, good, JobStatus::Completed).await;
    assert_eq!(job.agent_id, Some(solo.clone()));
    assert_eq!(
        coordinator.swarm().agent(&solo).map(|a| a.status),
        Some(AgentStatus::Idle)
    );

    coordinator.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_unfinished_jobs() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup().await;
    // An explicit emitter leaves the process-wide one untouched.
    let emitter = Arc::new(EventEmitter::new(64));
    let engine = Arc::new(StubEngine::new(100_000));
    let coordinator = start_coordinator_with(
        fast_config(single_agent("compress"), 1),
        engine.clone(),
        emitter.clone(),
    )
    .await?;
    let swarm = coordinator.swarm().clone();
    let (_, mut cancelled) =
        emitter.subscribe_channel(EventFilter::types([EventType::JobCancelled]));

    let queue = coordinator.queue();
    let running = queue.submit(JobConfig::compress("/data/a"), Priority::Normal).await?;
    let queued = queue.submit(JobConfig::compress("/data/b"), Priority::Normal).await?;
    wait_for_status(queue, running, JobStatus::Running).await;

    coordinator.shutdown().await?;

    let mut ids: Vec<_> = drain(&mut cancelled)
        .into_iter()
        .filter_map(|e| e.job_id())
        .collect();
    ids.sort_by_key(|id| id.0);
    let mut expected = vec![running, queued];
    expected.sort_by_key(|id| id.0);
    assert_eq!(ids, expected);

    assert_eq!(
        swarm.agent(&AgentId::new("solo-1")).map(|a| a.status),
        Some(AgentStatus::Idle)
    );
    assert_eq!(engine.active_runs(), 0);
    assert_eq!(emitter.subscriber_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_health_level_follows_offline_agents() -> Result<(), Box<dyn Error>> {
    let guard = common::setup().await;
    let agents = vec![AgentDefinition::new("zstd", Tier::Balanced, "compress").with_replicas(4)];
    let coordinator = start_coordinator(fast_config(agents, 1), Arc::new(StubEngine::new(3))).await?;
    let swarm = coordinator.swarm();
    let health = swarm.watch_health();
    let (_, mut changes) = guard
        .emitter
        .subscribe_channel(EventFilter::types([EventType::SwarmHealthChanged]));

    swarm.mark_offline(&AgentId::new("zstd-1"))?;
    swarm.mark_offline(&AgentId::new("zstd-2"))?;
    swarm.mark_offline(&AgentId::new("zstd-3"))?;
    wait_until("three agents offline", || health.borrow().offline == 3).await;

    let levels: Vec<HealthLevel> = drain(&mut changes)
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::SwarmHealthChanged { health } => Some(health.level),
            _ => None,
        })
        .collect();
    assert_eq!(levels, vec![HealthLevel::Strained, HealthLevel::Critical]);
    assert_eq!(swarm.swarm_health().level, HealthLevel::Critical);

    swarm.mark_online(&AgentId::new("zstd-1"))?;
    swarm.mark_online(&AgentId::new("zstd-2"))?;
    assert_eq!(swarm.swarm_health().level, HealthLevel::Healthy);

    coordinator.shutdown().await?;
    Ok(())
}
