//! Recorder actor.
//!
//! One task owns the [`RouteSession`] and runs every mutation to completion
//! before taking the next event. Events come from three places:
//!
//! - commands sent through a [`RecorderHandle`] (bounded `mpsc`);
//! - fixes broadcast by the [`LocationHub`];
//! - the end of a start/resume grace window.
//!
//! While a pause or stop awaits its best-fix capture, the platform keeps
//! publishing into the hub; fixes that queue up for the actor meanwhile are
//! processed afterwards and ignored if the session is no longer recording.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::SharedConfig;
use crate::error::{RecorderError, Result};
use crate::location::LocationHub;
use crate::metrics::MetricsResult;
use crate::route::{ExportProperties, RouteRecord, SegmentGeometry};
use crate::session::{RouteSession, SessionStatus};
use crate::FixSample;

/// Pending commands before senders wait.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

enum Command {
    Start(oneshot::Sender<Result<()>>),
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
    CreateRoute(String, oneshot::Sender<Option<RouteRecord>>),
    ExportSegments(ExportProperties, oneshot::Sender<SegmentGeometry>),
    Metrics(oneshot::Sender<MetricsResult>),
}

/// Cloneable handle to a running recorder.
#[derive(Clone)]
pub struct RecorderHandle {
    commands: mpsc::Sender<Command>,
    hub: Arc<LocationHub>,
    config: SharedConfig,
    status: watch::Receiver<SessionStatus>,
}

impl RecorderHandle {
    /// Platform callback entry point: validate and broadcast a fix.
    pub fn publish_fix(&self, fix: FixSample) -> Result<()> {
        self.hub.publish(fix)
    }

    pub fn hub(&self) -> &Arc<LocationHub> {
        &self.hub
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Latest status. Never waits on the actor, so it reflects the
    /// finalizing state while a pause or stop is in flight.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub async fn start(&self) -> Result<()> {
        self.request(Command::Start).await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Command::Resume).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    pub async fn create_route(&self, name: impl Into<String>) -> Result<Option<RouteRecord>> {
        let name = name.into();
        self.request(|reply| Command::CreateRoute(name, reply)).await
    }

    pub async fn export_segments(&self, properties: ExportProperties) -> Result<SegmentGeometry> {
        self.request(|reply| Command::ExportSegments(properties, reply)).await
    }

    pub async fn distance_and_ascent(&self) -> Result<MetricsResult> {
        self.request(Command::Metrics).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| RecorderError::RecorderClosed)?;
        response.await.map_err(|_| RecorderError::RecorderClosed)
    }
}

/// Spawn the actor for `session` on the current tokio runtime.
///
/// The fix subscription is taken here, so fixes published right after this
/// returns are not missed. The task ends when every [`RecorderHandle`] is
/// dropped.
pub fn spawn_recorder(session: RouteSession) -> (RecorderHandle, JoinHandle<()>) {
    let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let handle = RecorderHandle {
        commands,
        hub: session.hub().clone(),
        config: session.config().clone(),
        status: session.subscribe_status(),
    };
    let fixes = session.hub().subscribe();
    let task = tokio::spawn(run(session, receiver, fixes));
    (handle, task)
}

async fn run(
    mut session: RouteSession,
    mut commands: mpsc::Receiver<Command>,
    mut fixes: broadcast::Receiver<FixSample>,
) {
    info!("[RecorderActor] Started");

    loop {
        let grace = session.grace_deadline();

        // Fixes first: a command sees every fix published before it was sent.
        tokio::select! {
            biased;

            received = fixes.recv() => match received {
                Ok(fix) => {
                    session.record_fix(&fix);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[RecorderActor] Fell behind, skipped {} fixes", skipped);
                }
                Err(RecvError::Closed) => break,
            },

            command = commands.recv() => match command {
                Some(command) => handle_command(&mut session, command).await,
                None => break,
            },

            _ = tokio::time::sleep_until(grace.unwrap_or_else(tokio::time::Instant::now)), if grace.is_some() => {
                session.end_grace();
            }
        }
    }

    info!("[RecorderActor] Stopped");
}

async fn handle_command(session: &mut RouteSession, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::Start(reply) => {
            let _ = reply.send(session.start());
        }
        Command::Pause(reply) => {
            session.pause().await;
            let _ = reply.send(());
        }
        Command::Resume(reply) => {
            session.resume();
            let _ = reply.send(());
        }
        Command::Stop(reply) => {
            session.stop().await;
            let _ = reply.send(());
        }
        Command::CreateRoute(name, reply) => {
            let _ = reply.send(session.create_route(&name));
        }
        Command::ExportSegments(properties, reply) => {
            let _ = reply.send(session.export_segments(properties));
        }
        Command::Metrics(reply) => {
            debug!("[RecorderActor] Computing metrics");
            let _ = reply.send(session.distance_and_ascent());
        }
    }
}
