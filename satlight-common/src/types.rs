use serde::{Deserialize, Serialize};

/// A transmission window as it travels on the wire: `("YYYY/MM/DD HH:MM:SS", "YYYY/MM/DD HH:MM:SS")`.
pub type WindowPair = (String, String);

/// Webhook events understood by the controller, tagged by their `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookEvent {
    ChallengeSolved {
        #[serde(default)]
        satellite_index: i64,
    },
    ChallengeUnsolved {
        #[serde(default)]
        satellite_index: i64,
    },
    #[serde(rename = "add_transmission_time")]
    AddTransmissionTimes {
        #[serde(default)]
        satellite_index: i64,
        #[serde(default)]
        transmission_times: Vec<WindowPair>,
    },
    ClearTransmissionTimes {
        /// `None` clears every satellite
        #[serde(default)]
        satellite_index: Option<i64>,
    },
}

impl WebhookEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WebhookEvent::ChallengeSolved { .. } => EventKind::ChallengeSolved,
            WebhookEvent::ChallengeUnsolved { .. } => EventKind::ChallengeUnsolved,
            WebhookEvent::AddTransmissionTimes { .. } => EventKind::AddTransmissionTimes,
            WebhookEvent::ClearTransmissionTimes { .. } => EventKind::ClearTransmissionTimes,
        }
    }
}

/// Payload-free discriminant of [`WebhookEvent`], mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChallengeSolved,
    ChallengeUnsolved,
    AddTransmissionTimes,
    ClearTransmissionTimes,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ChallengeSolved => "challenge_solved",
            EventKind::ChallengeUnsolved => "challenge_unsolved",
            EventKind::AddTransmissionTimes => "add_transmission_time",
            EventKind::ClearTransmissionTimes => "clear_transmission_times",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    pub event_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Point-in-time view of one satellite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteView {
    pub index: usize,
    pub solved: bool,
    pub transmitting: bool,
    pub transmission_times: Vec<WindowPair>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub satellite_count: usize,
    pub leds_per_satellite: usize,
    pub total_led_count: usize,
    pub render_state: String,
    pub satellite_states: Vec<SatelliteView>,
}

/// Body of `GET /transmitting`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmittingResponse {
    pub transmitting: Vec<usize>,
}

/// On-disk state file. The render-derived transmitting flag is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub satellite_states: Vec<PersistedSatellite>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSatellite {
    #[serde(default)]
    pub solved: bool,
    #[serde(default)]
    pub transmission_times: Vec<WindowPair>,
}
