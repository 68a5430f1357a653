use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Behaviour shared by every entity kind's state enumeration.
///
/// State codes are ordered integers so storage layers can filter and sort
/// without decoding the enumeration. The declared edges of the state graph are
/// exposed through [`EntityState::can_transition_to`]; the manager and command
/// handlers refuse to persist any other edge.
pub trait EntityState:
    Copy + Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Stable integer code used by storage
    fn code(&self) -> i32;

    /// Decode a stored code, `None` if unknown for this kind
    fn from_code(code: i32) -> Option<Self>;

    /// Upper-case state name as used in logs and events
    fn name(&self) -> &'static str;

    /// Absorbing state: no further automatic transition happens
    fn is_terminal(&self) -> bool;

    /// State entered when processing fails permanently
    fn terminal_failure() -> Self;

    /// Whether `next` is a declared edge from this state
    fn can_transition_to(&self, next: Self) -> bool;

    /// Every state of the kind, ordered by code
    fn all() -> &'static [Self];
}

/// Contract negotiation states
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationState {
    /// Request received or created, to be sent to the counter-party
    #[default]
    Requested,
    /// Offer exchanged, waiting for agreement
    Offered,
    /// Agreement reached, verification pending
    Agreed,
    /// Agreement verified, finalization pending
    Verified,
    /// Negotiation concluded successfully
    Finalized,
    /// Negotiation aborted or failed
    Terminated,
}

impl NegotiationState {
    const ALL: [NegotiationState; 6] = [
        Self::Requested,
        Self::Offered,
        Self::Agreed,
        Self::Verified,
        Self::Finalized,
        Self::Terminated,
    ];
}

impl EntityState for NegotiationState {
    fn code(&self) -> i32 {
        match self {
            Self::Requested => 100,
            Self::Offered => 200,
            Self::Agreed => 300,
            Self::Verified => 400,
            Self::Finalized => 500,
            Self::Terminated => 600,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.code() == code)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Offered => "OFFERED",
            Self::Agreed => "AGREED",
            Self::Verified => "VERIFIED",
            Self::Finalized => "FINALIZED",
            Self::Terminated => "TERMINATED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Terminated)
    }

    fn terminal_failure() -> Self {
        Self::Terminated
    }

    fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Requested, Self::Offered)
            | (Self::Offered, Self::Agreed)
            | (Self::Agreed, Self::Verified)
            | (Self::Verified, Self::Finalized) => true,
            (from, Self::Terminated) => !from.is_terminal(),
            _ => false,
        }
    }

    fn all() -> &'static [Self] {
        &Self::ALL
    }
}

/// Transfer process states
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    /// Created, nothing provisioned yet
    #[default]
    Initial,
    /// Resources are being provisioned
    Provisioning,
    /// Data flow running
    Started,
    /// Data flow finished
    Completed,
    /// Provisioned resources are being released
    Deprovisioning,
    /// Provisioned resources released
    Deprovisioned,
    /// Transfer aborted or failed
    Terminated,
}

impl TransferState {
    const ALL: [TransferState; 7] = [
        Self::Initial,
        Self::Provisioning,
        Self::Started,
        Self::Completed,
        Self::Deprovisioning,
        Self::Deprovisioned,
        Self::Terminated,
    ];
}

impl EntityState for TransferState {
    fn code(&self) -> i32 {
        match self {
            Self::Initial => 100,
            Self::Provisioning => 200,
            Self::Started => 300,
            Self::Completed => 400,
            Self::Deprovisioning => 500,
            Self::Deprovisioned => 600,
            Self::Terminated => 700,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.code() == code)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Provisioning => "PROVISIONING",
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Deprovisioning => "DEPROVISIONING",
            Self::Deprovisioned => "DEPROVISIONED",
            Self::Terminated => "TERMINATED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Deprovisioned | Self::Terminated
        )
    }

    fn terminal_failure() -> Self {
        Self::Terminated
    }

    fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Initial, Self::Provisioning)
            | (Self::Provisioning, Self::Started)
            | (Self::Started, Self::Completed)
            | (Self::Completed, Self::Deprovisioning)
            | (Self::Terminated, Self::Deprovisioning)
            | (Self::Deprovisioning, Self::Deprovisioned) => true,
            (from, Self::Terminated) => !from.is_terminal(),
            _ => false,
        }
    }

    fn all() -> &'static [Self] {
        &Self::ALL
    }
}

/// Policy monitor entry states
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyMonitorState {
    /// Monitoring the policy of a running transfer
    #[default]
    Started,
    /// Policy no longer applies, monitoring ended
    Completed,
    /// Monitoring failed permanently
    Failed,
}

impl PolicyMonitorState {
    const ALL: [PolicyMonitorState; 3] = [Self::Started, Self::Completed, Self::Failed];
}

impl EntityState for PolicyMonitorState {
    fn code(&self) -> i32 {
        match self {
            Self::Started => 100,
            Self::Completed => 200,
            Self::Failed => 300,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.code() == code)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }

    fn terminal_failure() -> Self {
        Self::Failed
    }

    fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Started, Self::Completed) | (Self::Started, Self::Failed)
        )
    }

    fn all() -> &'static [Self] {
        &Self::ALL
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for PolicyMonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TransferState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid transfer state: {s}"))
    }
}

impl std::str::FromStr for NegotiationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid negotiation state: {s}"))
    }
}
