//! Background report generation: a bounded queue drained by a fixed worker
//! pool, plus an optional sweep that re-dispatches reports left in
//! `analyzing` (for example after a restart).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::pipeline::ReportPipeline;
use crate::store::{SessionStore, StoreError};

/// Non-blocking hand-off of a session to report generation.
pub trait ReportTrigger: Send + Sync {
    fn dispatch(&self, session_id: &str);
}

/// Sessions queued or running. A dispatch for one of them is folded into a
/// single rerun once the current run settles.
#[derive(Default)]
struct InFlight(Mutex<Claims>);

#[derive(Default)]
struct Claims {
    active: HashSet<String>,
    rerun: HashSet<String>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, Claims> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns false when the session is already claimed; it is then marked for a rerun.
    fn claim(&self, session_id: &str) -> bool {
        let mut claims = self.lock();
        if claims.active.insert(session_id.to_string()) {
            return true;
        }
        claims.rerun.insert(session_id.to_string());
        false
    }

    /// Ends a run. Returns true, keeping the claim, when a rerun was requested meanwhile.
    fn finish(&self, session_id: &str) -> bool {
        let mut claims = self.lock();
        if claims.rerun.remove(session_id) {
            return true;
        }
        claims.active.remove(session_id);
        false
    }

    fn release(&self, session_id: &str) {
        let mut claims = self.lock();
        claims.active.remove(session_id);
        claims.rerun.remove(session_id);
    }
}

/// Sends an already-claimed session to the workers, dropping the claim if it cannot be queued.
fn enqueue(sender: &mpsc::Sender<String>, in_flight: &InFlight, session_id: &str) {
    match sender.try_send(session_id.to_string()) {
        Ok(()) => debug!("Report for {session_id} queued"),
        Err(TrySendError::Full(_)) => {
            in_flight.release(session_id);
            warn!("Report queue full, {session_id} left for the sweep");
        }
        Err(TrySendError::Closed(_)) => {
            in_flight.release(session_id);
            error!("Report queue closed, {session_id} not dispatched");
        }
    }
}

/// Called by a worker after a run; requeues the session if it was dispatched again meanwhile.
fn settle(sender: &mpsc::WeakSender<String>, in_flight: &InFlight, session_id: &str) {
    if !in_flight.finish(session_id) {
        return;
    }
    match sender.upgrade() {
        Some(sender) => {
            info!("Report for {session_id} requested again during generation, requeueing");
            enqueue(&sender, in_flight, session_id);
        }
        None => in_flight.release(session_id),
    }
}

#[derive(Clone)]
pub struct ReportQueue {
    sender: mpsc::Sender<String>,
    in_flight: Arc<InFlight>,
}

impl ReportQueue {
    /// Spawns `workers` tasks sharing one channel of `capacity` slots.
    pub fn start(pipeline: Arc<ReportPipeline>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<String>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let in_flight = Arc::new(InFlight::default());

        for worker in 0..workers.max(1) {
            let receiver = receiver.clone();
            let requeue = sender.downgrade();
            let pipeline = pipeline.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(session_id) = next else {
                        debug!("Report worker {worker} stopping, queue closed");
                        break;
                    };
                    match pipeline.generate(&session_id).await {
                        Ok(outcome) => debug!("Report worker {worker}: {session_id} -> {outcome:?}"),
                        Err(e) => error!("Report worker {worker}: storing report for {session_id} failed: {e}"),
                    }
                    settle(&requeue, &in_flight, &session_id);
                }
            });
        }

        info!("Report queue started: workers={}, capacity={}", workers.max(1), capacity.max(1));
        Self { sender, in_flight }
    }

    /// Starts the periodic sweep for stuck `analyzing` reports.
    pub fn spawn_sweep(&self, store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Report sweep started (interval: {}ms)", every.as_millis());

            loop {
                ticker.tick().await;
                match queue.sweep_once(store.as_ref()).await {
                    Ok(0) => {}
                    Ok(n) => info!("Report sweep dispatched {n} pending report(s)"),
                    Err(e) => warn!("Report sweep failed: {e}"),
                }
            }
        })
    }

    /// Dispatches every pending report the queue has room for. Returns how many were found.
    pub async fn sweep_once(&self, store: &dyn SessionStore) -> Result<usize, StoreError> {
        let limit = i64::try_from(self.sender.max_capacity()).unwrap_or(i64::MAX);
        let pending = store.pending_reports(limit).await?;
        for session_id in &pending {
            self.dispatch(session_id);
        }
        Ok(pending.len())
    }
}

impl ReportTrigger for ReportQueue {
    fn dispatch(&self, session_id: &str) {
        if !self.in_flight.claim(session_id) {
            debug!("Report for {session_id} in flight, rerun requested");
            return;
        }
        enqueue(&self.sender, &self.in_flight, session_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::ai::testing::ScriptedReports;
    use crate::models::interview::{
        QuestionType, ReportStatus, Session, SessionStatus, Topic, Turn,
    };
    use crate::store::{AnsweredTurn, InMemorySessionStore};

    async fn analyzing_session(store: &InMemorySessionStore, id: &str) {
        let session = Session {
            session_id: id.to_string(),
            owner_id: None,
            title: None,
            topic: Topic {
                main_topic_id: "backend".to_string(),
                sub_topic_ids: vec!["redis".to_string()],
            },
            status: SessionStatus::InProgress,
            current_turn: 1,
            followup_streak: 0,
            turn_limit_sec: 60,
            total_limit_sec: 600,
            started_at: Utc::now(),
            ended_at: None,
        };
        let turn = Turn {
            session_id: id.to_string(),
            turn_index: 1,
            question_type: QuestionType::Base,
            question_text: "What is eviction?".to_string(),
            answer_text: String::new(),
            submitted_at: None,
            metrics: json!({}),
        };
        store.create_session(&session, &turn).await.unwrap();
        store
            .complete_session(
                &AnsweredTurn {
                    session_id: id.to_string(),
                    turn_index: 1,
                    answer_text: "LRU and TTL.".to_string(),
                    submitted_at: Utc::now(),
                    metrics: json!({}),
                },
                Utc::now(),
            )
            .await
            .unwrap();
    }

    async fn wait_for_done(store: &InMemorySessionStore, id: &str) {
        for _ in 0..200 {
            if let Some(report) = store.load_report(id).await.unwrap() {
                if report.status == ReportStatus::Done {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("report for {id} never finished");
    }

    fn queue(store: &Arc<InMemorySessionStore>, reports: &Arc<ScriptedReports>) -> ReportQueue {
        let pipeline = Arc::new(ReportPipeline::new(store.clone(), reports.clone()));
        ReportQueue::start(pipeline, 2, 8)
    }

    #[tokio::test]
    async fn test_dispatch_generates_in_background() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        analyzing_session(&store, "intv_q").await;

        queue(&store, &reports).dispatch("intv_q");
        wait_for_done(&store, "intv_q").await;

        let data = store.load_session("intv_q").await.unwrap().unwrap();
        assert_eq!(data.session.status, SessionStatus::Done);
        assert_eq!(reports.calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_dispatch_is_suppressed() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        analyzing_session(&store, "intv_q").await;

        // The current-thread test runtime does not run workers until we yield.
        let queue = queue(&store, &reports);
        queue.dispatch("intv_q");
        queue.dispatch("intv_q");
        wait_for_done(&store, "intv_q").await;

        assert_eq!(reports.calls(), 1);
    }

    #[tokio::test]
    async fn test_sweep_picks_up_stuck_reports() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        analyzing_session(&store, "intv_a").await;
        analyzing_session(&store, "intv_b").await;

        let queue = queue(&store, &reports);
        let found = queue.sweep_once(store.as_ref()).await.unwrap();
        assert_eq!(found, 2);

        wait_for_done(&store, "intv_a").await;
        wait_for_done(&store, "intv_b").await;
        assert!(store.pending_reports(10).await.unwrap().is_empty());
        assert_eq!(queue.sweep_once(store.as_ref()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_releases_claim() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        let pipeline = Arc::new(ReportPipeline::new(store.clone(), reports));
        let queue = ReportQueue::start(pipeline, 1, 1);

        queue.dispatch("intv_1");
        queue.dispatch("intv_2");
        assert!(queue.in_flight.lock().active.contains("intv_1"));
        assert!(!queue.in_flight.lock().active.contains("intv_2"));
    }

    #[tokio::test]
    async fn test_dispatch_during_settling_run_is_rerun() {
        let store = Arc::new(InMemorySessionStore::new());
        let reports = ScriptedReports::new();
        analyzing_session(&store, "intv_q").await;

        let queue = queue(&store, &reports);
        queue.dispatch("intv_q");
        wait_for_done(&store, "intv_q").await;

        // The first run has stored its report but its worker still holds the claim.
        queue.in_flight.lock().active.insert("intv_q".to_string());
        store.begin_regeneration("intv_q").await.unwrap();
        queue.dispatch("intv_q");
        assert!(queue.in_flight.lock().rerun.contains("intv_q"));

        settle(&queue.sender.downgrade(), &queue.in_flight, "intv_q");
        wait_for_done(&store, "intv_q").await;

        assert_eq!(reports.calls(), 2);
        for _ in 0..200 {
            if !queue.in_flight.lock().active.contains("intv_q") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!queue.in_flight.lock().active.contains("intv_q"));
        assert!(queue.in_flight.lock().rerun.is_empty());
    }

    #[test]
    fn test_finish_without_rerun_releases_claim() {
        let in_flight = InFlight::default();
        assert!(in_flight.claim("intv_1"));
        assert!(!in_flight.finish("intv_1"));
        assert!(in_flight.claim("intv_1"));
    }
}
