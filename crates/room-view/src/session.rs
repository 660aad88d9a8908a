//! Room session
//!
//! [`RoomViewSession::connect`] joins a room and builds the controller;
//! [`RoomViewSession::run`] then drives it from a single event loop fed by
//! collaborator events, host lifecycle hooks, finished camera
//! re-acquisitions, and commands sent through a [`SessionHandle`]. The value
//! `run` resolves to is the outcome of the whole join.

use crate::config::{Platform, RoomViewConfig, VideoDeviceConfig};
use crate::controller::{PresentationState, RoomViewController};
use crate::error::{Error, Result};
use crate::host::{HostEnvironment, HostEvent, HostEventKind, HostEventSender, HostListener, Visibility};
use crate::presentation::PresentationPort;
use crate::quality::NetworkQualitySink;
use crate::sdk::{ParticipantSid, PublicationSnapshot, RoomConnector, RoomEvent, RoomSession};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    TogglePin {
        participant: ParticipantSid,
        reply: Reply<Result<()>>,
    },
    Leave {
        reply: Reply<()>,
    },
    SetVisibility {
        visibility: Visibility,
        reply: Reply<Result<()>>,
    },
    Snapshot {
        reply: Reply<PresentationState>,
    },
}

/// Outcome of one camera re-acquisition task
struct Reacquired {
    generation: u64,
    outcome: Result<PublicationSnapshot>,
}

/// A joined room and everything needed to run its view
pub struct RoomViewSession {
    connector: Arc<dyn RoomConnector>,
    room: Arc<dyn RoomSession>,
    platform: Platform,
    video: VideoDeviceConfig,
    controller: RoomViewController,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    host_events: mpsc::UnboundedReceiver<HostEvent>,
    commands: mpsc::Receiver<Command>,
    listeners: Vec<HostListener>,
    reacquired_tx: mpsc::UnboundedSender<Reacquired>,
    reacquired_rx: mpsc::UnboundedReceiver<Reacquired>,
    /// Callers waiting on each in-flight re-acquisition
    waiters: HashMap<u64, Vec<Reply<Result<()>>>>,
    latest_generation: Option<u64>,
}

impl RoomViewSession {
    /// Join a room and render its current state
    ///
    /// Installs the host hooks the configured platform needs; they stay
    /// installed until the session ends.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` does not validate and
    /// `Error::Connection` if the collaborator refuses the join.
    pub async fn connect(
        connector: Arc<dyn RoomConnector>,
        token: &str,
        config: RoomViewConfig,
        presenter: Box<dyn PresentationPort>,
        quality: Box<dyn NetworkQualitySink>,
        host: &dyn HostEnvironment,
    ) -> Result<(Self, SessionHandle)> {
        config.validate()?;

        info!("Connecting to room '{}'", config.room_name);
        let connection = match connector.connect(token, &config.connect_options()).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Unable to connect to room '{}': {}", config.room_name, e);
                return Err(e);
            }
        };

        let room = Arc::clone(&connection.session);
        let controller = RoomViewController::new(
            connection.session,
            connection.snapshot,
            presenter,
            quality,
        );

        let (host_tx, host_events) = mpsc::unbounded_channel();
        let sender = HostEventSender::new(host_tx);
        let platform = host.platform();
        let listeners = HostEventKind::required_for(platform)
            .iter()
            .map(|kind| host.listen(*kind, sender.clone()))
            .collect::<Vec<_>>();
        debug!("Installed {} host listener(s) for {:?}", listeners.len(), platform);

        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (reacquired_tx, reacquired_rx) = mpsc::unbounded_channel();

        let session = Self {
            connector,
            room,
            platform,
            video: config.video,
            controller,
            events: connection.events,
            host_events,
            commands,
            listeners,
            reacquired_tx,
            reacquired_rx,
            waiters: HashMap::new(),
            latest_generation: None,
        };
        Ok((session, SessionHandle { tx: command_tx }))
    }

    /// Run the view until the room is left or lost
    ///
    /// # Errors
    ///
    /// Returns `Error::Disconnected` if the collaborator ended the session
    /// abnormally. Leaving, page unload and a normal disconnect resolve to
    /// `Ok(())`.
    pub async fn run(mut self) -> Result<()> {
        let outcome = loop {
            tokio::select! {
                biased;

                event = self.events.recv() => {
                    let event = event.unwrap_or(RoomEvent::Disconnected(None));
                    if let ControlFlow::Break(reason) = self.controller.handle_event(event) {
                        break match reason {
                            Some(reason) => {
                                error!("Disconnected from room: {}", reason);
                                Err(Error::Disconnected(reason))
                            }
                            None => {
                                info!("Disconnected from room");
                                Ok(())
                            }
                        };
                    }
                }

                Some(event) = self.host_events.recv() => {
                    if let ControlFlow::Break(()) = self.on_host_event(event) {
                        break Ok(());
                    }
                }

                Some(Reacquired { generation, outcome }) = self.reacquired_rx.recv() => {
                    self.finish_reacquire(generation, outcome);
                }

                Some(command) = self.commands.recv() => {
                    if let ControlFlow::Break(reply) = self.on_command(command) {
                        self.shutdown();
                        let _ = reply.send(());
                        return Ok(());
                    }
                }
            }
        };

        self.shutdown();
        outcome
    }

    fn on_host_event(&mut self, event: HostEvent) -> ControlFlow<()> {
        match event {
            HostEvent::BeforeUnload | HostEvent::PageHide => {
                info!("Page unloading, leaving room");
                self.room.disconnect();
                ControlFlow::Break(())
            }
            HostEvent::VisibilityChanged(visibility) => {
                self.set_visibility(visibility, None);
                ControlFlow::Continue(())
            }
        }
    }

    /// Breaks with the leave reply, to be sent once teardown is done
    fn on_command(&mut self, command: Command) -> ControlFlow<Reply<()>> {
        match command {
            Command::TogglePin { participant, reply } => {
                let _ = reply.send(self.controller.toggle_pin(&participant));
            }
            Command::Leave { reply } => {
                info!("Leaving room");
                self.room.disconnect();
                return ControlFlow::Break(reply);
            }
            Command::SetVisibility { visibility, reply } => {
                self.set_visibility(visibility, Some(reply));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.controller.state());
            }
        }
        ControlFlow::Continue(())
    }

    fn set_visibility(&mut self, visibility: Visibility, reply: Option<Reply<Result<()>>>) {
        if self.platform == Platform::Desktop {
            debug!("Ignoring visibility change to {:?} on desktop", visibility);
            reply_to(reply, Ok(()));
            return;
        }

        debug!("Page visibility changed to {:?}", visibility);
        match visibility {
            Visibility::Hidden => {
                self.controller.release_camera();
                reply_to(reply, Ok(()));
            }
            Visibility::Visible => {
                if let Some(generation) = self.controller.begin_camera_reacquire() {
                    self.spawn_reacquire(generation);
                    self.latest_generation = Some(generation);
                    self.wait_for(generation, reply);
                } else if let Some(generation) = self.in_flight_generation() {
                    self.wait_for(generation, reply);
                } else {
                    reply_to(reply, Ok(()));
                }
            }
        }
    }

    fn in_flight_generation(&self) -> Option<u64> {
        self.latest_generation
            .filter(|generation| self.waiters.contains_key(generation))
    }

    fn wait_for(&mut self, generation: u64, reply: Option<Reply<Result<()>>>) {
        let waiters = self.waiters.entry(generation).or_default();
        if let Some(reply) = reply {
            waiters.push(reply);
        }
    }

    /// Open a new camera and publish it off the event loop
    ///
    /// A result that arrives after the loop has exited is rolled back here,
    /// so a camera opened during teardown is never left running.
    fn spawn_reacquire(&self, generation: u64) {
        let connector = Arc::clone(&self.connector);
        let room = Arc::clone(&self.room);
        let video = self.video.clone();
        let tx = self.reacquired_tx.clone();

        tokio::spawn(async move {
            let outcome = reacquire(connector.as_ref(), room.as_ref(), &video).await;
            if let Err(mpsc::error::SendError(Reacquired {
                outcome: Ok(publication),
                ..
            })) = tx.send(Reacquired { generation, outcome })
            {
                if let Some(track) = publication.track {
                    info!("Session gone, discarding camera track {}", track.sid());
                    track.stop();
                    if let Err(e) = room.unpublish_track(track.sid()) {
                        warn!("Failed to unpublish {}: {}", track.sid(), e);
                    }
                }
            }
        });
    }

    fn finish_reacquire(&mut self, generation: u64, outcome: Result<PublicationSnapshot>) {
        let result = self.controller.finish_camera_reacquire(generation, outcome);
        let mut waiters = self
            .waiters
            .remove(&generation)
            .unwrap_or_default()
            .into_iter();

        match result {
            Ok(()) => waiters.for_each(|reply| reply_to(Some(reply), Ok(()))),
            Err(e) => {
                error!("Unable to re-acquire camera: {}", e);
                // Error is not Clone; later waiters get a device error with the same text
                let shared = e.to_string();
                reply_to(waiters.next(), Err(e));
                waiters.for_each(|reply| reply_to(Some(reply), Err(Error::Device(shared.clone()))));
            }
        }
    }

    /// Single exit path: tear down the view and remove the host hooks
    fn shutdown(&mut self) {
        self.controller.teardown();
        self.listeners.clear();

        // Acquisitions still in flight roll themselves back once this is closed
        self.reacquired_rx.close();
        while let Ok(Reacquired { generation, outcome }) = self.reacquired_rx.try_recv() {
            let _ = self.controller.finish_camera_reacquire(generation, outcome);
        }

        for (_, waiters) in self.waiters.drain() {
            for reply in waiters {
                let _ = reply.send(Err(Error::SessionClosed));
            }
        }
        self.commands.close();
    }
}

async fn reacquire(
    connector: &dyn RoomConnector,
    room: &dyn RoomSession,
    video: &VideoDeviceConfig,
) -> Result<PublicationSnapshot> {
    let track = connector.create_local_video_track(video).await?;
    match room.publish_track(Arc::clone(&track)).await {
        Ok(publication) => Ok(publication),
        Err(e) => {
            track.stop();
            Err(e)
        }
    }
}

fn reply_to(reply: Option<Reply<Result<()>>>, result: Result<()>) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}

/// Cloneable remote control for a running [`RoomViewSession`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Pin `participant`, or unpin them if they are already pinned
    ///
    /// # Errors
    ///
    /// Returns `Error::ParticipantNotFound` for an unknown session id and
    /// `Error::SessionClosed` once the session has ended.
    pub async fn toggle_pin(&self, participant: &ParticipantSid) -> Result<()> {
        let participant = participant.clone();
        self.request(|reply| Command::TogglePin { participant, reply })
            .await?
    }

    /// Leave the room; leaving a closed session does nothing
    pub async fn leave(&self) -> Result<()> {
        match self.request(|reply| Command::Leave { reply }).await {
            Err(Error::SessionClosed) => {
                debug!("Leave requested after the session closed");
                Ok(())
            }
            other => other,
        }
    }

    /// Report a page visibility change
    ///
    /// Only mobile sessions release and re-acquire the camera; on desktop
    /// this is a no-op. Becoming visible resolves once the camera has been
    /// re-acquired and published.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error (usually `Error::Device`) if the camera
    /// could not be re-acquired.
    pub async fn set_visibility(&self, visibility: Visibility) -> Result<()> {
        self.request(|reply| Command::SetVisibility { visibility, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<PresentationState> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Whether the session has ended
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::TogglePin { participant, .. } => write!(f, "TogglePin({})", participant),
            Command::Leave { .. } => f.write_str("Leave"),
            Command::SetVisibility { visibility, .. } => write!(f, "SetVisibility({:?})", visibility),
            Command::Snapshot { .. } => f.write_str("Snapshot"),
        }
    }
}
