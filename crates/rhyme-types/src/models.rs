use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One user's stance toward another, stored per ordered `(from, to)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Accepted,
    Declined,
    Blocked,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown link status: {other}")),
        }
    }
}

/// Which stored row made two users friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Combined relationship answer for `(current, target)`, derived from up to
/// two directed rows. Variants are listed in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipStatus {
    SelfUser,
    Friends(Direction),
    PendingSent,
    PendingIncoming,
    None,
}

impl FriendshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfUser => "self",
            Self::Friends(_) => "friends",
            Self::PendingSent => "pending_sent",
            Self::PendingIncoming => "pending_incoming",
            Self::None => "none",
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::Friends(direction) => Some(direction),
            _ => None,
        }
    }
}

/// Recipient's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RespondAction {
    Accept,
    Decline,
}

impl FromStr for RespondAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Self::Accept),
            "decline" => Ok(Self::Decline),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyPoem {
    pub date: String,
    pub theme: String,
    pub title: String,
    pub content: String,
    pub generated_by: String,
}
