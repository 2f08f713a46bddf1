//! The vote coordinator owns the whole election lifecycle:
//!
//! ```text
//! Idle -> DelayPending -> Active -> Tallying -> Idle
//! ```
//!
//! It runs as a single actor task. Tailers reach it only through a [`CoordinatorHandle`], and
//! both timers are polled inside the actor's own select loop, so phase, candidates and ballot are
//! never touched from more than one place at a time. A vote that races the closing timer is either
//! processed before the tally or after the phase has left `Active`; it can never be half-counted.

use std::{
    fmt,
    pin::Pin,
    time::Duration,
};

use tokio::{
    sync::{
        broadcast,
        mpsc,
    },
    time::Sleep,
};

use crate::{
    candidates::CandidateProvider,
    config::VoteSettings,
    events::{
        LogEvent,
        VoterId,
    },
    gateway::ServerGateway,
    tally::{
        tally,
        Ballot,
        BallotIndex,
        CandidateSet,
        TallyOutcome,
    },
    utils::dynamic_fut,
};

const EVENT_CHANNEL_SIZE: usize = 128;

const PHASE_CHANNEL_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionPhase {
    Idle,
    /// A round just ended and the vote opens once `vote_delay` passes
    DelayPending,
    Active,
    /// Only ever observed through [`PhaseChange`]s; the actor leaves it before handling anything
    /// else
    Tallying,
}

impl fmt::Display for ElectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: ElectionPhase,
    pub to: ElectionPhase,
}

/// [`CoordinatorHandle`] is how tailers feed events to the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    event_trigger: mpsc::Sender<LogEvent>,
}

impl CoordinatorHandle {
    pub fn from_sender(event_trigger: mpsc::Sender<LogEvent>) -> Self {
        Self { event_trigger }
    }

    /// Fails only once the coordinator has shut down
    pub async fn send(&self, event: LogEvent) -> Result<(), mpsc::error::SendError<LogEvent>> {
        self.event_trigger.send(event).await
    }
}

pub struct VoteCoordinator<P, G> {
    settings: VoteSettings,
    provider: P,
    gateway: G,

    phase: ElectionPhase,
    candidates: CandidateSet,
    ballot: Ballot,

    /// Armed while `DelayPending`
    delay_timer: Option<Pin<Box<Sleep>>>,
    /// Armed while `Active`
    duration_timer: Option<Pin<Box<Sleep>>>,

    event_alert: mpsc::Receiver<LogEvent>,
    /// Cleared once every handle has been dropped
    events_open: bool,

    phase_trigger: broadcast::Sender<PhaseChange>,
}

impl<P, G> VoteCoordinator<P, G>
where
    P: CandidateProvider,
    G: ServerGateway,
{
    pub fn new(settings: VoteSettings, provider: P, gateway: G) -> (Self, CoordinatorHandle) {
        let (event_trigger, event_alert) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (phase_trigger, _) = broadcast::channel(PHASE_CHANNEL_SIZE);
        let coordinator = Self {
            settings,
            provider,
            gateway,
            phase: ElectionPhase::Idle,
            candidates: CandidateSet::default(),
            ballot: Ballot::default(),
            delay_timer: None,
            duration_timer: None,
            event_alert,
            events_open: true,
            phase_trigger,
        };
        (coordinator, CoordinatorHandle::from_sender(event_trigger))
    }

    pub fn phase(&self) -> ElectionPhase {
        self.phase
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn ballot(&self) -> &Ballot {
        &self.ballot
    }

    /// Every phase change from now on, including the transient `Tallying`
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseChange> {
        self.phase_trigger.subscribe()
    }

    /// Runs until every handle is dropped and any election in progress has finished
    pub async fn run(mut self) {
        tracing::info!("Vote coordinator running");
        while self.step().await {}
        tracing::info!("Vote coordinator stopped; no event sources left");
    }

    /// Waits for the next timer or event and handles it. Returns `false` once there is nothing
    /// left that could ever happen.
    pub async fn step(&mut self) -> bool {
        if !self.events_open && self.phase == ElectionPhase::Idle {
            return false;
        }
        let delay_elapsed = dynamic_fut(self.delay_timer.as_mut());
        let duration_elapsed = dynamic_fut(self.duration_timer.as_mut());
        tokio::select! {
            biased;
            _ = delay_elapsed => {
                self.delay_timer = None;
                self.on_delay_elapsed().await;
            },
            _ = duration_elapsed => {
                self.duration_timer = None;
                self.on_duration_elapsed().await;
            },
            event = self.event_alert.recv(), if self.events_open => match event {
                Some(event) => self.handle_event(event).await,
                None => self.events_open = false,
            },
        }
        true
    }

    pub async fn handle_event(&mut self, event: LogEvent) {
        match event {
            LogEvent::RoundTransition => self.on_round_transition(),
            LogEvent::VoteInitiate { actor_id, is_admin } => {
                self.on_vote_initiate(actor_id, is_admin).await
            }
            LogEvent::VoteCast { voter, raw_choice } => self.on_vote_cast(voter, &raw_choice),
        }
    }

    fn on_round_transition(&mut self) {
        if self.phase != ElectionPhase::Idle {
            tracing::info!(
                "Round transition seen while {}; not scheduling another vote",
                self.phase
            );
            return;
        }
        let delay = self.settings.vote_delay;
        self.delay_timer = Some(Box::pin(tokio::time::sleep(delay)));
        self.transition(ElectionPhase::DelayPending);
        tracing::info!("Voting will begin in {:.1} seconds", delay.as_secs_f64());
    }

    async fn on_vote_initiate(&mut self, actor_id: VoterId, is_admin: bool) {
        if !is_admin {
            tracing::info!(
                "{} tried to start a map vote outside of admin chat; ignoring",
                actor_id
            );
            return;
        }
        // An admin can skip a pending delay, but never restart a running vote
        if !matches!(self.phase, ElectionPhase::Idle | ElectionPhase::DelayPending) {
            tracing::info!(
                "{} tried to start a map vote while {}; ignoring",
                actor_id,
                self.phase
            );
            return;
        }
        tracing::info!("Map vote manually started by {}", actor_id);
        self.open_vote().await;
    }

    fn on_vote_cast(&mut self, voter: VoterId, raw_choice: &str) {
        if self.phase != ElectionPhase::Active {
            tracing::debug!("Vote from {} outside of the voting window", voter);
            return;
        }
        let Ok(index) = raw_choice.parse::<BallotIndex>() else {
            tracing::info!("{} submitted an invalid vote value ({:?})", voter, raw_choice);
            return;
        };
        if !self.candidates.contains(index) {
            tracing::info!("{} voted for option {}, which is not on the ballot", voter, index);
            return;
        }
        match self.ballot.cast(voter.clone(), index) {
            Some(previous) if previous != index => {
                tracing::info!("{} changed their vote from {} to {}", voter, previous, index)
            }
            _ => tracing::info!("{} voted for option {}", voter, index),
        }
    }

    async fn on_delay_elapsed(&mut self) {
        // A stale timer must not open a second vote
        if self.phase != ElectionPhase::DelayPending {
            tracing::debug!("Vote delay elapsed while {}; ignoring", self.phase);
            return;
        }
        self.open_vote().await;
    }

    async fn on_duration_elapsed(&mut self) {
        if self.phase != ElectionPhase::Active {
            tracing::debug!("Vote duration elapsed while {}; ignoring", self.phase);
            return;
        }
        self.close_vote().await;
    }

    async fn open_vote(&mut self) {
        self.delay_timer = None;
        let candidates = match self
            .provider
            .candidates(self.settings.num_map_candidates)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("Could not start the map vote: {}", e);
                self.transition(ElectionPhase::Idle);
                return;
            }
        };

        self.candidates = candidates;
        self.ballot.clear();
        self.transition(ElectionPhase::Active);

        let listing = self.candidates.listing();
        tracing::info!("Map candidates are:\n{}", listing);
        self.broadcast(&format!(
            "Map voting has begun! Type !vote followed by a number to vote.\n{}\nExample: !vote 1",
            listing
        ))
        .await;

        let duration = self.settings.vote_duration;
        self.duration_timer = Some(Box::pin(tokio::time::sleep(duration)));
        tracing::info!(
            "Voting has started and will end in {:.1} seconds",
            duration.as_secs_f64()
        );
    }

    async fn close_vote(&mut self) {
        self.duration_timer = None;
        self.transition(ElectionPhase::Tallying);

        match tally(&self.ballot, &self.candidates) {
            TallyOutcome::Winner { label, votes } => {
                tracing::info!(
                    "Winning map is {} with {} / {} votes",
                    label,
                    votes,
                    self.ballot.len()
                );
                self.broadcast(&format!(
                    "Voting has ended. {} has won with {} votes!",
                    label, votes
                ))
                .await;
                if let Err(e) = self.gateway.set_next_map(&label).await {
                    tracing::error!("Failed to set next map to {}: {:#}", label, e);
                }
            }
            TallyOutcome::NoVotes => {
                tracing::info!("Voting has ended. No votes were cast!");
                self.broadcast("Voting has ended. No votes were cast!").await;
            }
            TallyOutcome::Unresolved(index) => {
                tracing::error!(
                    "Winning option {} is not among the candidates; no map will be set",
                    index
                );
                self.broadcast("Voting has ended without a winner.").await;
            }
        }

        self.candidates = CandidateSet::default();
        self.transition(ElectionPhase::Idle);
    }

    async fn broadcast(&self, text: &str) {
        if let Err(e) = self.gateway.broadcast(text).await {
            tracing::warn!("Broadcast failed: {:#}", e);
        }
    }

    fn transition(&mut self, to: ElectionPhase) {
        let from = self.phase;
        self.phase = to;
        tracing::debug!("Election phase {} -> {}", from, to);
        // Nobody listening is fine
        let _ = self.phase_trigger.send(PhaseChange { from, to });
    }
}

impl<P, G> VoteCoordinator<P, G> {
    /// Time left before whichever timer is armed fires
    pub fn time_remaining(&self) -> Option<Duration> {
        let timer = self.delay_timer.as_ref().or(self.duration_timer.as_ref())?;
        Some(
            timer
                .deadline()
                .saturating_duration_since(tokio::time::Instant::now()),
        )
    }
}
