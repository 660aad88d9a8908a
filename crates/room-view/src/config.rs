//! Configuration for joining a room
//!
//! Configuration can be loaded from a TOML file and/or environment variables.
//! [`RoomViewConfig::connect_options`] turns it into what the collaborator's
//! connect call receives.

use crate::error::Error;
use crate::sdk::TrackPriority;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Verbosity requested for network-quality reports on both sides
pub const NETWORK_QUALITY_VERBOSITY: u8 = 3;

/// Host platform, decides which lifecycle hooks are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
}

impl std::str::FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "desktop" => Ok(Platform::Desktop),
            "mobile" => Ok(Platform::Mobile),
            other => Err(Error::InvalidConfig(format!(
                "platform must be desktop or mobile, got {}",
                other
            ))),
        }
    }
}

/// Main configuration for a room view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomViewConfig {
    /// Name of the room to join
    pub room_name: String,

    /// Desktop or mobile lifecycle handling
    #[serde(default)]
    pub platform: Platform,

    /// Microphone selection
    #[serde(default)]
    pub audio: AudioOptions,

    /// Camera selection, also used to re-acquire the camera on mobile
    #[serde(default)]
    pub video: VideoDeviceConfig,

    /// Subscriber bandwidth allocation
    #[serde(default)]
    pub bandwidth_profile: BandwidthProfile,

    /// Enable dominant speaker detection (default: true)
    #[serde(default = "default_true")]
    pub dominant_speaker: bool,

    /// Maximum audio send bitrate in bps (default: 16000)
    #[serde(default = "default_max_audio_bitrate")]
    pub max_audio_bitrate_bps: Option<u32>,

    /// Video codec preference order (default: VP8 with simulcast)
    #[serde(default = "default_preferred_codecs")]
    pub preferred_video_codecs: Vec<PreferredCodec>,
}

/// Microphone options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub device_id: Option<String>,
}

/// Camera options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDeviceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Track name announced to other participants
    #[serde(default = "default_track_name")]
    pub name: String,
}

/// Bandwidth profile passed through to the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthProfile {
    #[serde(default)]
    pub mode: BandwidthProfileMode,

    #[serde(default = "default_dominant_speaker_priority")]
    pub dominant_speaker_priority: TrackPriority,

    #[serde(default)]
    pub max_subscription_bitrate_kbps: Option<u32>,

    #[serde(default)]
    pub client_track_switch_off_control: SwitchOffControl,

    #[serde(default)]
    pub content_preferences_mode: SwitchOffControl,
}

/// Bandwidth allocation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BandwidthProfileMode {
    Grid,
    #[default]
    Collaboration,
    Presentation,
}

/// Whether the collaborator manages track switch-off / render hints itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchOffControl {
    #[default]
    Auto,
    Manual,
}

/// Video codec preference entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredCodec {
    pub codec: VideoCodec,

    #[serde(default)]
    pub simulcast: bool,
}

/// Supported video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    VP8,
    VP9,
    H264,
}

/// Network quality reporting verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkQualityConfig {
    pub local: u8,
    pub remote: u8,
}

/// Options handed to [`crate::sdk::RoomConnector::connect`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    pub name: String,
    pub audio: Option<AudioOptions>,
    pub video: Option<VideoDeviceConfig>,
    pub bandwidth_profile: BandwidthProfile,
    pub dominant_speaker: bool,
    pub max_audio_bitrate_bps: Option<u32>,
    pub preferred_video_codecs: Vec<PreferredCodec>,
    pub network_quality: NetworkQualityConfig,
}

fn default_true() -> bool {
    true
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_frame_rate() -> u32 {
    24
}

fn default_track_name() -> String {
    "camera".to_string()
}

fn default_max_audio_bitrate() -> Option<u32> {
    Some(16000)
}

fn default_dominant_speaker_priority() -> TrackPriority {
    TrackPriority::High
}

fn default_preferred_codecs() -> Vec<PreferredCodec> {
    vec![PreferredCodec {
        codec: VideoCodec::VP8,
        simulcast: true,
    }]
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            device_id: None,
        }
    }
}

impl Default for VideoDeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_id: None,
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
            name: default_track_name(),
        }
    }
}

impl Default for BandwidthProfile {
    fn default() -> Self {
        Self {
            mode: BandwidthProfileMode::default(),
            dominant_speaker_priority: default_dominant_speaker_priority(),
            max_subscription_bitrate_kbps: None,
            client_track_switch_off_control: SwitchOffControl::default(),
            content_preferences_mode: SwitchOffControl::default(),
        }
    }
}

impl RoomViewConfig {
    /// Create a configuration with defaults for the given room
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            room_name: room_name.into(),
            platform: Platform::default(),
            audio: AudioOptions::default(),
            video: VideoDeviceConfig::default(),
            bandwidth_profile: BandwidthProfile::default(),
            dominant_speaker: true,
            max_audio_bitrate_bps: default_max_audio_bitrate(),
            preferred_video_codecs: default_preferred_codecs(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let room_name = std::env::var("ROOM_VIEW_ROOM_NAME").unwrap_or_default();
        let mut config = Self::new(room_name);

        if let Ok(platform) = std::env::var("ROOM_VIEW_PLATFORM") {
            if let Ok(p) = platform.parse() {
                config.platform = p;
            }
        }
        if let Ok(device) = std::env::var("ROOM_VIEW_VIDEO_DEVICE") {
            config.video.device_id = Some(device);
        }
        if let Ok(device) = std::env::var("ROOM_VIEW_AUDIO_DEVICE") {
            config.audio.device_id = Some(device);
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `room_name` is empty
    /// - the camera is enabled with a zero width, height or frame rate
    /// - dominant speaker detection is off while the bandwidth profile
    ///   asks for a dominant speaker priority above standard
    pub fn validate(&self) -> crate::Result<()> {
        if self.room_name.trim().is_empty() {
            return Err(Error::InvalidConfig("room_name must not be empty".to_string()));
        }

        if self.video.enabled
            && (self.video.width == 0 || self.video.height == 0 || self.video.frame_rate == 0)
        {
            return Err(Error::InvalidConfig(format!(
                "video dimensions and frame rate must be non-zero, got {}x{}@{}",
                self.video.width, self.video.height, self.video.frame_rate
            )));
        }

        if !self.dominant_speaker
            && self.bandwidth_profile.dominant_speaker_priority == TrackPriority::High
        {
            return Err(Error::InvalidConfig(
                "dominant_speaker_priority requires dominant_speaker detection".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the options for the collaborator's connect call
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            name: self.room_name.clone(),
            audio: self.audio.enabled.then(|| self.audio.clone()),
            video: self.video.enabled.then(|| self.video.clone()),
            bandwidth_profile: self.bandwidth_profile.clone(),
            dominant_speaker: self.dominant_speaker,
            max_audio_bitrate_bps: self.max_audio_bitrate_bps,
            preferred_video_codecs: self.preferred_video_codecs.clone(),
            network_quality: NetworkQualityConfig {
                local: NETWORK_QUALITY_VERBOSITY,
                remote: NETWORK_QUALITY_VERBOSITY,
            },
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
