//! Room view demo
//!
//! Joins an in-memory room, replays a YAML scenario against it and prints
//! the resulting presentation state as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Replay a scenario with the default desktop configuration
//! cargo run --bin room-view-demo -- \
//!   --scenario crates/room-view/scenarios/pin-and-leave.yaml
//!
//! # Mobile lifecycle handling, TOML configuration, JSON logs
//! RUST_LOG=room_view=debug cargo run --bin room-view-demo -- \
//!   --scenario crates/room-view/scenarios/mobile-background.yaml \
//!   --config room-view.toml --platform mobile --json
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use room_view::{
    DomModel, ManualHost, ParticipantSid, Platform, PresentationState, RoomViewConfig,
    RoomViewSession, SessionHandle, SharedDom, SimulatedRoom, TrackKind, TrackSid,
    TracingQualitySink, Visibility,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Room view demo
///
/// Replays participant, track and speaker events from a scenario file
/// through a simulated room.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (YAML)
    #[arg(short, long, env = "ROOM_VIEW_SCENARIO")]
    scenario: PathBuf,

    /// Configuration file (TOML); falls back to ROOM_VIEW_* variables
    #[arg(short, long, env = "ROOM_VIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Room name, overrides the configuration
    #[arg(long)]
    room: Option<String>,

    /// Host platform, overrides the configuration
    #[arg(long)]
    platform: Option<Platform>,

    /// Access token handed to the room
    #[arg(long, default_value = "demo-token", env = "ROOM_VIEW_TOKEN")]
    token: String,

    /// Emit JSON log lines
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// A scripted session
#[derive(Debug, Deserialize)]
struct Scenario {
    /// Local participant identity
    #[serde(default = "default_identity")]
    identity: String,

    /// Participants already in the room when it is joined
    #[serde(default)]
    participants: Vec<Arrival>,

    #[serde(default)]
    dominant_speaker: Option<String>,

    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    steps: Vec<Step>,
}

fn default_identity() -> String {
    "local".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Arrival {
    identity: String,
    #[serde(default = "default_true")]
    video: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Step {
    /// A participant joins with subscribed tracks
    Join(Arrival),
    /// A participant leaves
    Leave(String),
    /// Dominant speaker changes; `~` for nobody
    Speaker(Option<String>),
    /// Thumbnail click
    Pin(String),
    /// A track is announced under `label` but not subscribed yet
    Publish {
        identity: String,
        kind: TrackKind,
        label: String,
    },
    Subscribe(String),
    Unsubscribe(String),
    Unpublish(String),
    Quality {
        identity: String,
        level: u8,
    },
    Visibility(Visibility),
    /// The room ends abnormally
    Fail {
        #[serde(default)]
        code: Option<u32>,
        message: String,
    },
    /// Leave button
    LeaveRoom,
}

#[derive(Debug, Serialize)]
struct Report {
    outcome: String,
    state: Option<PresentationState>,
    dom: DomModel,
}

/// Scenario names resolved to session ids
struct Replay {
    room: SimulatedRoom,
    handle: SessionHandle,
    participants: HashMap<String, ParticipantSid>,
    tracks: HashMap<String, (ParticipantSid, TrackSid, TrackKind)>,
}

impl Replay {
    fn participant(&self, identity: &str) -> Result<ParticipantSid> {
        self.participants
            .get(identity)
            .cloned()
            .with_context(|| format!("unknown participant '{}'", identity))
    }

    fn track(&self, label: &str) -> Result<(ParticipantSid, TrackSid, TrackKind)> {
        self.tracks
            .get(label)
            .cloned()
            .with_context(|| format!("unknown track '{}'", label))
    }

    /// Apply one step; returns false once the session is over
    async fn apply(&mut self, step: Step) -> Result<bool> {
        match step {
            Step::Join(arrival) => {
                let sid = self.room.join(&arrival.identity, arrival.video);
                self.participants.insert(arrival.identity, sid);
            }
            Step::Leave(identity) => {
                let sid = self.participant(&identity)?;
                self.room.leave(&sid);
            }
            Step::Speaker(identity) => {
                let sid = identity.map(|i| self.participant(&i)).transpose()?;
                self.room.set_dominant_speaker(sid.as_ref());
            }
            Step::Pin(identity) => {
                let sid = self.participant(&identity)?;
                if let Err(e) = self.handle.toggle_pin(&sid).await {
                    warn!("Pin of {} failed: {}", identity, e);
                }
            }
            Step::Publish {
                identity,
                kind,
                label,
            } => {
                let sid = self.participant(&identity)?;
                let track_sid = self.room.publish(&sid, kind);
                self.tracks.insert(label, (sid, track_sid, kind));
            }
            Step::Subscribe(label) => {
                let (sid, track_sid, kind) = self.track(&label)?;
                self.room.subscribe(&sid, &track_sid, kind);
            }
            Step::Unsubscribe(label) => {
                let (sid, track_sid, _) = self.track(&label)?;
                self.room.unsubscribe(&sid, &track_sid);
            }
            Step::Unpublish(label) => {
                let (sid, track_sid, _) = self.track(&label)?;
                self.room.unpublish(&sid, &track_sid);
            }
            Step::Quality { identity, level } => {
                let sid = self.participant(&identity)?;
                self.room.network_quality(&sid, level);
            }
            Step::Visibility(visibility) => {
                if let Err(e) = self.handle.set_visibility(visibility).await {
                    error!("Visibility change to {:?} failed: {}", visibility, e);
                }
            }
            Step::Fail { code, message } => {
                self.room.fail(code, &message);
                return Ok(false);
            }
            Step::LeaveRoom => {
                self.handle.leave().await?;
                return Ok(false);
            }
        }

        // Commands queue behind room events, so this waits for the step to land
        Ok(self.handle.snapshot().await.is_ok())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = RoomViewConfig::load(args.config.as_ref())?;
    if let Some(room) = args.room {
        config.room_name = room;
    }
    if config.room_name.is_empty() {
        config.room_name = "demo".to_string();
    }
    if let Some(platform) = args.platform {
        config.platform = platform;
    }

    let content = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let scenario: Scenario = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing scenario {}", args.scenario.display()))?;

    info!(
        "Replaying {} step(s) in room '{}' as {} ({:?})",
        scenario.steps.len(),
        config.room_name,
        scenario.identity,
        config.platform
    );

    let mut room = SimulatedRoom::new(&scenario.identity);
    for arrival in &scenario.participants {
        room = room.with_participant(&arrival.identity, arrival.video);
    }
    let mut participants: HashMap<String, ParticipantSid> = scenario
        .participants
        .iter()
        .map(|arrival| arrival.identity.clone())
        .zip(room.initial_participants())
        .collect();
    participants.insert(scenario.identity.clone(), room.local_sid());

    if let Some(speaker) = &scenario.dominant_speaker {
        let Some(sid) = participants.get(speaker).cloned() else {
            bail!("dominant speaker '{}' is not in the room", speaker);
        };
        room = room.with_dominant_speaker(Some(sid));
    }

    let dom = SharedDom::new();
    let host = ManualHost::new(config.platform);
    let (session, handle) = RoomViewSession::connect(
        Arc::new(room.clone()),
        &args.token,
        config,
        Box::new(dom.clone()),
        Box::new(TracingQualitySink),
        &host,
    )
    .await?;
    let joined = tokio::spawn(session.run());

    let mut replay = Replay {
        room,
        handle: handle.clone(),
        participants,
        tracks: HashMap::new(),
    };
    for step in scenario.steps {
        if !replay.apply(step).await? {
            break;
        }
    }

    let state = handle.snapshot().await.ok();
    let dom_snapshot = dom.snapshot();
    handle.leave().await?;

    let outcome = match joined.await? {
        Ok(()) => "left".to_string(),
        Err(e) => {
            error!("Room ended with error: {}", e);
            e.to_string()
        }
    };

    let report = Report {
        outcome,
        state,
        dom: dom_snapshot,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
