//! Async driver for a [`Session`].
//!
//! One task owns the session and the sink. Control goes in through a
//! single-consumer command channel; state comes out through a `watch`
//! channel written only by that task.

use std::time::Duration;

use midi_file::DecodedFile;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::session::{PlayerState, Session, SessionOptions};
use crate::sink::MidiSink;

#[derive(Debug)]
pub enum PlayerCommand {
    Load(Box<DecodedFile>),
    Play { tempo: Option<f64> },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub position_beats: f64,
    pub tempo_bpm: f64,
}

impl PlayerStatus {
    fn of(session: &Session) -> Self {
        Self {
            state: session.state(),
            position_beats: session.position_beats(),
            tempo_bpm: session.tempo_bpm(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerOptions {
    pub poll_interval: Duration,
    pub session: SessionOptions,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            session: SessionOptions::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("player task has stopped")]
    Closed,
}

/// Control surface for a spawned player.
pub struct PlayerHandle<S> {
    commands: mpsc::Sender<PlayerCommand>,
    status: watch::Receiver<PlayerStatus>,
    cancel: CancellationToken,
    task: JoinHandle<S>,
}

impl<S> PlayerHandle<S> {
    pub async fn load(&self, file: DecodedFile) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Load(Box::new(file))).await
    }

    pub async fn play(&self, tempo: Option<f64>) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Play { tempo }).await
    }

    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.send(PlayerCommand::Stop).await
    }

    /// Stop and wait until the task has settled.
    ///
    /// Resolves with `Completed` instead of `Stopped` when playback finished
    /// on its own before the stop was handled.
    pub async fn stop_and_wait(&self) -> Result<PlayerStatus, PlayerError> {
        self.stop().await?;
        self.wait_for_state(PlayerState::is_settled).await
    }

    async fn send(&self, command: PlayerCommand) -> Result<(), PlayerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PlayerError::Closed)
    }

    pub fn status(&self) -> PlayerStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    /// Wait until the published state satisfies `f`.
    pub async fn wait_for_state(
        &self,
        f: impl Fn(PlayerState) -> bool,
    ) -> Result<PlayerStatus, PlayerError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| f(s.state))
            .await
            .map_err(|_| PlayerError::Closed)?;
        Ok(*status)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop playback, end the task, and hand back the sink.
    pub async fn shutdown(self) -> Result<S, PlayerError> {
        self.cancel.cancel();
        self.task.await.map_err(|_| PlayerError::Closed)
    }
}

/// Spawn the player task on the current tokio runtime.
///
/// Cancelling the returned handle's token stops playback (sending
/// all-notes-off) and ends the task. Dropping every handle does the same.
pub fn spawn_player<S, C>(sink: S, clock: C, options: PlayerOptions) -> PlayerHandle<S>
where
    S: MidiSink + 'static,
    C: Clock + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = watch::channel(PlayerStatus::of(&Session::new(options.session)));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run(
        sink,
        clock,
        options,
        commands_rx,
        status_tx,
        cancel.clone(),
    ));

    PlayerHandle {
        commands: commands_tx,
        status: status_rx,
        cancel,
        task,
    }
}

async fn run<S, C>(
    mut sink: S,
    clock: C,
    options: PlayerOptions,
    mut commands: mpsc::Receiver<PlayerCommand>,
    status: watch::Sender<PlayerStatus>,
    cancel: CancellationToken,
) -> S
where
    S: MidiSink,
    C: Clock,
{
    let mut session = Session::new(options.session);
    let mut ticker = tokio::time::interval(options.poll_interval.max(Duration::from_micros(100)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                session.stop(&mut sink);
                status.send_replace(PlayerStatus::of(&session));
                info!("player task shutting down");
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    session.stop(&mut sink);
                    status.send_replace(PlayerStatus::of(&session));
                    debug!("all player handles dropped");
                    break;
                };
                match command {
                    PlayerCommand::Load(file) => {
                        session.load(&file, &mut sink);
                    }
                    PlayerCommand::Play { tempo } => {
                        if session.play(clock.now(), tempo, &mut sink) {
                            ticker.reset_immediately();
                        }
                    }
                    PlayerCommand::Stop => {
                        session.stop(&mut sink);
                    }
                }
                status.send_replace(PlayerStatus::of(&session));
            }
            _ = ticker.tick(), if session.is_playing() => {
                session.poll(clock.now(), &mut sink);
                status.send_replace(PlayerStatus::of(&session));
            }
        }
    }

    sink
}
