//! Logical channels of the task protocol.

use std::fmt;

/// Fresh tasks.
pub const PRIMARY_TOPIC: &str = "video-processing";
/// Tasks waiting for another attempt.
pub const RETRY_TOPIC: &str = "video-processing-retry";
/// Tasks that exhausted their attempts. Never consumed by workers.
pub const DEAD_LETTER_TOPIC: &str = "video-processing-dlq";

/// Channel a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Primary,
    Retry,
    DeadLetter,
}

impl Channel {
    /// Channels a worker subscribes to.
    pub const CONSUMED: [Channel; 2] = [Channel::Primary, Channel::Retry];

    pub fn topic(&self) -> &'static str {
        match self {
            Channel::Primary => PRIMARY_TOPIC,
            Channel::Retry => RETRY_TOPIC,
            Channel::DeadLetter => DEAD_LETTER_TOPIC,
        }
    }

    pub fn from_topic(topic: &str) -> Option<Self> {
        match topic {
            PRIMARY_TOPIC => Some(Channel::Primary),
            RETRY_TOPIC => Some(Channel::Retry),
            DEAD_LETTER_TOPIC => Some(Channel::DeadLetter),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}
