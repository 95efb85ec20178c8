//! Shared mutable session store
//!
//! Holds the actor arena, the live round queue, the persistent pools and
//! tool-result subscriptions. Queues and pools refer to actors by
//! [`ActorId`], so enrolling one identity from several sources schedules it
//! once.

use super::actor::{Actor, ActorId, ActorKind};
use super::error::SessionError;
use super::message::{ToolEnvelope, Transcript};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Entry of the live round queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntry {
    Actor(ActorId),
    /// Sentinel: the round closes when a scan reaches it
    EndOfRound,
}

/// How an injected actor is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionMode {
    /// Added once to the current round's live queue
    Deferred,
    /// Added to a pool that is re-enrolled at the start of every round
    Persistent,
}

/// Handler invoked with every result produced under a subscribed tool name
pub type SubscriptionHandler =
    Box<dyn FnMut(&ToolEnvelope, &mut SessionState) -> Result<(), SessionError> + Send + Sync>;

pub struct SessionState {
    session_id: Uuid,
    created_at: DateTime<Utc>,
    round: u64,
    round_active: bool,
    pub(super) actors: HashMap<ActorId, Actor>,
    pub(super) transcript: Transcript,
    history: Vec<Transcript>,
    queue: Vec<QueueEntry>,
    /// Deferred injections made while no round is active
    pending_deferred: Vec<ActorId>,
    evicted: HashSet<ActorId>,
    system_pool: Vec<ActorId>,
    tool_pool: Vec<ActorId>,
    assistant_pool: Vec<ActorId>,
    main_assistant: ActorId,
    /// Registered for the whole session, never dropped at round close
    pinned: HashSet<ActorId>,
    subscriptions: HashMap<String, Vec<SubscriptionHandler>>,
}

impl SessionState {
    pub(super) fn new(main_assistant: Actor) -> Self {
        let main_id = main_assistant.id();
        let mut actors = HashMap::new();
        actors.insert(main_id, main_assistant);
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            round: 0,
            round_active: false,
            actors,
            transcript: Transcript::new(),
            history: Vec::new(),
            queue: Vec::new(),
            pending_deferred: Vec::new(),
            evicted: HashSet::new(),
            system_pool: Vec::new(),
            tool_pool: Vec::new(),
            assistant_pool: Vec::new(),
            main_assistant: main_id,
            pinned: HashSet::new(),
            subscriptions: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of the active round, or of the last round that closed
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn is_round_active(&self) -> bool {
        self.round_active
    }

    /// Transcript of the round in progress
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Finalized transcripts, one per closed round
    pub fn history(&self) -> &[Transcript] {
        &self.history
    }

    pub fn queue(&self) -> &[QueueEntry] {
        &self.queue
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    /// Assistant invoked whenever the queue drains without closing the round
    pub fn main_assistant(&self) -> ActorId {
        self.main_assistant
    }

    pub fn is_evicted(&self, id: ActorId) -> bool {
        self.evicted.contains(&id)
    }

    pub fn persistent_pool(&self, kind: ActorKind) -> &[ActorId] {
        match kind {
            ActorKind::System => &self.system_pool,
            ActorKind::Tool => &self.tool_pool,
            ActorKind::Assistant => &self.assistant_pool,
            ActorKind::User => &[],
        }
    }

    pub(super) fn into_history(self) -> Vec<Transcript> {
        self.history
    }

    /// Add an actor for the rest of the session without scheduling it;
    /// deliver it with [`SessionState::reenroll`]
    pub fn register(&mut self, actor: Actor) -> Result<ActorId, SessionError> {
        let id = self.admit(actor)?;
        self.pinned.insert(id);
        Ok(id)
    }

    /// Add an actor that lives until the round closes, unless a pool or
    /// the main assistant slot still refers to it
    pub(super) fn admit(&mut self, actor: Actor) -> Result<ActorId, SessionError> {
        let id = actor.id();
        if self.actors.contains_key(&id) {
            return Err(SessionError::DuplicateActor(id));
        }
        self.actors.insert(id, actor);
        Ok(id)
    }

    /// Reset round-scoped state and build the queue for a new round.
    ///
    /// The queue is the concatenation of `static_actors` and the system,
    /// tool and assistant pools, deduplicated by identity in first-seen
    /// order, followed by deferred injections made while idle.
    pub fn enroll_for_round(&mut self, static_actors: &[ActorId]) -> Result<(), SessionError> {
        self.queue.clear();
        self.evicted.clear();
        for actor in self.actors.values_mut() {
            actor.turns_taken = 0;
        }

        let mut seen = HashSet::new();
        let sources = static_actors
            .iter()
            .chain(&self.system_pool)
            .chain(&self.tool_pool)
            .chain(&self.assistant_pool);
        for &id in sources {
            if !self.actors.contains_key(&id) {
                return Err(SessionError::UnknownActor(id));
            }
            if seen.insert(id) {
                self.queue.push(QueueEntry::Actor(id));
            }
        }
        for id in std::mem::take(&mut self.pending_deferred) {
            self.queue.push(QueueEntry::Actor(id));
        }

        self.round += 1;
        self.round_active = true;
        tracing::info!(
            session_id = %self.session_id,
            round = self.round,
            queue_len = self.queue.len(),
            "Round started"
        );
        Ok(())
    }

    /// Register a new actor and deliver it to the queue or a pool
    pub fn inject(&mut self, actor: Actor, mode: InjectionMode) -> Result<ActorId, SessionError> {
        let kind = actor.kind();
        Self::check_deliverable(kind, mode)?;
        let id = self.admit(actor)?;
        self.deliver(id, kind, mode);
        Ok(id)
    }

    /// Deliver an already registered actor again, keeping its identity
    pub fn reenroll(&mut self, id: ActorId, mode: InjectionMode) -> Result<(), SessionError> {
        let kind = self
            .actors
            .get(&id)
            .map(Actor::kind)
            .ok_or(SessionError::UnknownActor(id))?;
        Self::check_deliverable(kind, mode)?;
        self.deliver(id, kind, mode);
        Ok(())
    }

    pub fn inject_system_prompt(
        &mut self,
        content: impl Into<String>,
        mode: InjectionMode,
    ) -> Result<ActorId, SessionError> {
        self.inject(Actor::system(content), mode)
    }

    /// Replace the main assistant for the next fallback turn and every later round
    pub fn inject_main_assistant(&mut self, actor: Actor) -> Result<ActorId, SessionError> {
        let kind = actor.kind();
        if kind != ActorKind::Assistant {
            return Err(SessionError::InvalidMainAssistant { kind });
        }
        let id = self.admit(actor)?;
        tracing::info!(
            session_id = %self.session_id,
            previous = %self.main_assistant,
            actor_id = %id,
            "Main assistant replaced"
        );
        self.main_assistant = id;
        Ok(id)
    }

    /// Register a handler for every result produced under `tool`
    pub fn subscribe(
        &mut self,
        tool: impl Into<String>,
        handler: impl FnMut(&ToolEnvelope, &mut SessionState) -> Result<(), SessionError>
            + Send
            + Sync
            + 'static,
    ) {
        self.subscriptions
            .entry(tool.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Bar an actor from further turns this round
    pub fn evict(&mut self, id: ActorId) {
        if self.evicted.insert(id) {
            tracing::debug!(actor_id = %id, round = self.round, "Actor evicted");
        }
    }

    fn check_deliverable(kind: ActorKind, mode: InjectionMode) -> Result<(), SessionError> {
        if mode == InjectionMode::Persistent && kind == ActorKind::User {
            return Err(SessionError::UnpooledKind { kind });
        }
        Ok(())
    }

    fn deliver(&mut self, id: ActorId, kind: ActorKind, mode: InjectionMode) {
        match mode {
            InjectionMode::Deferred if self.round_active => {
                self.queue.push(QueueEntry::Actor(id));
            }
            InjectionMode::Deferred => self.pending_deferred.push(id),
            InjectionMode::Persistent => {
                let pool = match kind {
                    ActorKind::System => &mut self.system_pool,
                    ActorKind::Tool => &mut self.tool_pool,
                    ActorKind::Assistant | ActorKind::User => &mut self.assistant_pool,
                };
                if !pool.contains(&id) {
                    pool.push(id);
                }
                // Persistent injections also join the round in progress
                if self.round_active && !self.queue.contains(&QueueEntry::Actor(id)) {
                    self.queue.push(QueueEntry::Actor(id));
                }
            }
        }
        tracing::debug!(actor_id = %id, %kind, ?mode, "Actor injected");
    }

    /// First entry that is the sentinel or an actor not yet processed
    pub(super) fn next_entry(&self, processed: &HashSet<ActorId>) -> Option<QueueEntry> {
        self.queue.iter().copied().find(|entry| match entry {
            QueueEntry::EndOfRound => true,
            QueueEntry::Actor(id) => !processed.contains(id),
        })
    }

    pub(super) fn enqueue(&mut self, id: ActorId) {
        self.queue.push(QueueEntry::Actor(id));
    }

    pub(super) fn end_round(&mut self) {
        self.queue.push(QueueEntry::EndOfRound);
    }

    /// Run every handler subscribed to `tool` with its latest result.
    ///
    /// Handlers subscribed while dispatching only see later results.
    pub(super) fn notify_subscribers(
        &mut self,
        tool: &str,
        envelope: &ToolEnvelope,
    ) -> Result<(), SessionError> {
        let Some(mut handlers) = self.subscriptions.remove(tool) else {
            return Ok(());
        };
        let outcome = handlers
            .iter_mut()
            .try_for_each(|handler| handler(envelope, self));
        if let Some(added) = self.subscriptions.remove(tool) {
            handlers.extend(added);
        }
        self.subscriptions.insert(tool.to_string(), handlers);
        outcome
    }

    /// Move the round transcript into history and reset round-scoped state.
    ///
    /// Returns the length of the finalized transcript.
    pub(super) fn close_round(
        &mut self,
        processed: &HashSet<ActorId>,
        retain: &[ActorId],
    ) -> Result<usize, SessionError> {
        let is_pending =
            |entry: &&QueueEntry| matches!(entry, QueueEntry::Actor(id) if !processed.contains(id));
        let sentinel = self
            .queue
            .iter()
            .position(|entry| *entry == QueueEntry::EndOfRound)
            .unwrap_or(self.queue.len());
        let (before, after) = self.queue.split_at(sentinel);
        let count = before.iter().filter(is_pending).count();
        if count > 0 {
            return Err(SessionError::UnprocessedAtClose {
                round: self.round,
                count,
            });
        }
        let dropped = after.iter().filter(is_pending).count();
        if dropped > 0 {
            tracing::warn!(
                session_id = %self.session_id,
                round = self.round,
                dropped,
                "Discarding actors queued after end of round"
            );
        }

        let transcript = std::mem::take(&mut self.transcript);
        let len = transcript.len();
        self.history.push(transcript);
        self.queue.clear();
        self.evicted.clear();
        self.round_active = false;
        self.drop_round_scoped(retain);
        Ok(len)
    }

    /// Abandon an enrolled round without touching history
    pub(super) fn discard_round(&mut self, retain: &[ActorId]) {
        self.transcript = Transcript::new();
        self.queue.clear();
        self.evicted.clear();
        self.round_active = false;
        self.round = self.round.saturating_sub(1);
        self.drop_round_scoped(retain);
    }

    /// Forget actors that only lived for the closed round
    fn drop_round_scoped(&mut self, retain: &[ActorId]) {
        let keep: HashSet<ActorId> = retain
            .iter()
            .chain(&self.pinned)
            .chain(&self.system_pool)
            .chain(&self.tool_pool)
            .chain(&self.assistant_pool)
            .chain(&self.pending_deferred)
            .chain(std::iter::once(&self.main_assistant))
            .copied()
            .collect();
        self.actors.retain(|id, _| keep.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::ScriptedResponder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn new_state() -> SessionState {
        SessionState::new(Actor::assistant(Arc::new(ScriptedResponder::new())))
    }

    fn actor_ids(state: &SessionState) -> Vec<ActorId> {
        state
            .queue()
            .iter()
            .filter_map(|entry| match entry {
                QueueEntry::Actor(id) => Some(*id),
                QueueEntry::EndOfRound => None,
            })
            .collect()
    }

    #[test]
    fn test_enroll_orders_static_then_pools() {
        let mut state = new_state();
        let user = state.register(Actor::user("hi")).unwrap();
        let assistant = state
            .inject(
                Actor::assistant(Arc::new(ScriptedResponder::new())),
                InjectionMode::Persistent,
            )
            .unwrap();
        let tool = state
            .inject(Actor::injected_tool("reminder", "x".into()), InjectionMode::Persistent)
            .unwrap();
        let system = state
            .inject_system_prompt("rules", InjectionMode::Persistent)
            .unwrap();

        state.enroll_for_round(&[user]).unwrap();

        assert_eq!(actor_ids(&state), vec![user, system, tool, assistant]);
        assert!(state.is_round_active());
        assert_eq!(state.round(), 1);
    }

    #[test]
    fn test_enroll_deduplicates_identity() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        state.reenroll(system, InjectionMode::Persistent).unwrap();
        state.reenroll(system, InjectionMode::Persistent).unwrap();

        state.enroll_for_round(&[system, system]).unwrap();

        assert_eq!(actor_ids(&state), vec![system]);
        assert_eq!(state.persistent_pool(ActorKind::System), &[system]);
    }

    #[test]
    fn test_enroll_resets_turn_counters() {
        let mut state = new_state();
        let user = state.register(Actor::user("hi")).unwrap();
        state.actors.get_mut(&user).unwrap().turns_taken = 4;
        let main = state.main_assistant();
        state.actors.get_mut(&main).unwrap().turns_taken = 2;

        state.enroll_for_round(&[user]).unwrap();

        assert_eq!(state.actor(user).unwrap().turns_taken(), 0);
        assert_eq!(state.actor(main).unwrap().turns_taken(), 0);
    }

    #[test]
    fn test_enroll_rejects_unknown_actor() {
        let mut state = new_state();
        let stranger = ActorId::random();
        assert!(matches!(
            state.enroll_for_round(&[stranger]),
            Err(SessionError::UnknownActor(id)) if id == stranger
        ));
    }

    #[test]
    fn test_deferred_injection_while_idle_waits_for_next_round() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        let user = state.inject(Actor::user("hi"), InjectionMode::Deferred).unwrap();
        assert!(state.queue().is_empty());

        state.enroll_for_round(&[system]).unwrap();
        assert_eq!(actor_ids(&state), vec![system, user]);
    }

    #[test]
    fn test_deferred_injection_appends_to_live_queue() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        state.enroll_for_round(&[system]).unwrap();
        state.end_round();

        let user = state.inject(Actor::user("late"), InjectionMode::Deferred).unwrap();
        assert_eq!(
            state.queue(),
            &[
                QueueEntry::Actor(system),
                QueueEntry::EndOfRound,
                QueueEntry::Actor(user)
            ]
        );
    }

    #[test]
    fn test_persistent_injection_joins_active_round_once() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        state.enroll_for_round(&[system]).unwrap();

        let reminder = state
            .inject(Actor::injected_tool("reminder", "x".into()), InjectionMode::Persistent)
            .unwrap();
        state.reenroll(reminder, InjectionMode::Persistent).unwrap();

        assert_eq!(actor_ids(&state), vec![system, reminder]);
        assert_eq!(state.persistent_pool(ActorKind::Tool), &[reminder]);
    }

    #[test]
    fn test_user_actors_cannot_be_persistent() {
        let mut state = new_state();
        let err = state
            .inject(Actor::user("hi"), InjectionMode::Persistent)
            .unwrap_err();
        assert!(matches!(err, SessionError::UnpooledKind { kind: ActorKind::User }));
        assert_eq!(state.actors.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut state = new_state();
        let id = ActorId::random();
        state.register(Actor::system("a").with_id(id)).unwrap();
        let err = state.register(Actor::system("b").with_id(id)).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_main_assistant_must_be_assistant() {
        let mut state = new_state();
        let err = state.inject_main_assistant(Actor::system("nope")).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidMainAssistant {
                kind: ActorKind::System
            }
        ));
    }

    #[test]
    fn test_next_entry_skips_processed() {
        let mut state = new_state();
        let a = state.register(Actor::system("a")).unwrap();
        let b = state.register(Actor::user("b")).unwrap();
        state.enroll_for_round(&[a, b]).unwrap();

        let mut processed = HashSet::new();
        assert_eq!(state.next_entry(&processed), Some(QueueEntry::Actor(a)));
        processed.insert(a);
        assert_eq!(state.next_entry(&processed), Some(QueueEntry::Actor(b)));
        processed.insert(b);
        assert_eq!(state.next_entry(&processed), None);
        state.end_round();
        assert_eq!(state.next_entry(&processed), Some(QueueEntry::EndOfRound));
    }

    #[test]
    fn test_subscribers_receive_results_and_can_inject() {
        let mut state = new_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        state.subscribe("classify", move |envelope, state| {
            c.fetch_add(1, Ordering::SeqCst);
            if envelope.result == "search" {
                state.inject_system_prompt("search mode", InjectionMode::Persistent)?;
            }
            Ok(())
        });

        state
            .notify_subscribers("classify", &ToolEnvelope::success("search"))
            .unwrap();
        state
            .notify_subscribers("other", &ToolEnvelope::success("search"))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.persistent_pool(ActorKind::System).len(), 1);
    }

    #[test]
    fn test_subscription_added_during_dispatch_sees_later_results() {
        let mut state = new_state();
        let late_calls = Arc::new(AtomicUsize::new(0));
        let late = late_calls.clone();
        let mut armed = false;
        state.subscribe("probe", move |_, state| {
            if !armed {
                armed = true;
                let late = late.clone();
                state.subscribe("probe", move |_, _| {
                    late.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            Ok(())
        });

        let envelope = ToolEnvelope::success("x");
        state.notify_subscribers("probe", &envelope).unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        state.notify_subscribers("probe", &envelope).unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_round_moves_transcript_and_drops_round_actors() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        state.enroll_for_round(&[system]).unwrap();
        let deferred = state.inject(Actor::user("hi"), InjectionMode::Deferred).unwrap();
        state.transcript.upsert_system("rules");
        state.end_round();

        let processed: HashSet<ActorId> = [system, deferred].into_iter().collect();
        let len = state.close_round(&processed, &[system]).unwrap();

        assert_eq!(len, 1);
        assert_eq!(state.history().len(), 1);
        assert!(state.transcript().is_empty());
        assert!(state.queue().is_empty());
        assert!(!state.is_round_active());
        assert!(state.actor(system).is_some());
        assert!(state.actor(deferred).is_none());
        assert!(state.actor(state.main_assistant()).is_some());
    }

    #[test]
    fn test_registered_actors_survive_round_close() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        let spare = state.register(Actor::system("spare")).unwrap();
        state.enroll_for_round(&[system]).unwrap();
        state.end_round();

        let processed: HashSet<ActorId> = [system].into_iter().collect();
        state.close_round(&processed, &[]).unwrap();

        assert!(state.actor(spare).is_some());
        state.reenroll(spare, InjectionMode::Deferred).unwrap();
        state.enroll_for_round(&[system]).unwrap();
        assert_eq!(actor_ids(&state), vec![system, spare]);
    }

    #[test]
    fn test_close_round_with_unprocessed_entries_is_invariant_violation() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        state.enroll_for_round(&[system]).unwrap();
        state.end_round();

        let err = state.close_round(&HashSet::new(), &[system]).unwrap_err();
        assert!(matches!(
            err,
            SessionError::UnprocessedAtClose { round: 1, count: 1 }
        ));
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_close_round_discards_entries_behind_sentinel() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        state.enroll_for_round(&[system]).unwrap();
        state.end_round();
        let late = state.inject(Actor::user("late"), InjectionMode::Deferred).unwrap();

        let processed: HashSet<ActorId> = [system].into_iter().collect();
        state.close_round(&processed, &[system]).unwrap();

        assert_eq!(state.history().len(), 1);
        assert!(state.actor(late).is_none());
    }

    #[test]
    fn test_discard_round_keeps_history_untouched() {
        let mut state = new_state();
        let system = state.register(Actor::system("rules")).unwrap();
        state.enroll_for_round(&[system]).unwrap();
        state.transcript.upsert_system("rules");

        state.discard_round(&[system]);

        assert_eq!(state.round(), 0);
        assert!(state.history().is_empty());
        assert!(state.transcript().is_empty());
    }
}
