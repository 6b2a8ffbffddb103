// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat record of who spoke when, used to split bursts at turn changes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use doppel_core::types::{ChatId, IncomingMessage, PlatformUserId};

use crate::burst::{BreakPredicate, BurstUnit, Fragment};

/// Turn events remembered per chat.
pub const MAX_TURNS_PER_CHAT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnEvent {
    pub timestamp: i64,
    pub speaker: PlatformUserId,
    pub reply_to: Option<PlatformUserId>,
}

/// Bounded ring of recent turns per chat.
#[derive(Debug)]
pub struct TurnTracker {
    window_secs: i64,
    chats: Mutex<HashMap<ChatId, VecDeque<TurnEvent>>>,
}

impl TurnTracker {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX),
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Remembers `message` as a turn. Messages without a sender are ignored.
    pub fn record(&self, message: &IncomingMessage) {
        let Some(sender) = &message.sender else {
            return;
        };
        let event = TurnEvent {
            timestamp: message.timestamp,
            speaker: sender.platform_id,
            reply_to: message.reply_to.as_ref().map(|p| p.platform_id),
        };
        let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        let events = chats.entry(message.chat_id).or_default();
        if events.len() == MAX_TURNS_PER_CHAT {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn len(&self, chat_id: ChatId) -> usize {
        let chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        chats.get(&chat_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, chat_id: ChatId) -> bool {
        self.len(chat_id) == 0
    }

    /// Whether another participant took a turn between `last` and `current`.
    ///
    /// Only a turn that plausibly belongs to the same exchange counts: the
    /// new message replies to that participant, that participant replied to
    /// `owner`, or the turn falls within the window of both ends.
    pub fn was_interrupted(
        &self,
        chat_id: ChatId,
        owner: PlatformUserId,
        last: i64,
        current: i64,
        reply_to: Option<PlatformUserId>,
    ) -> bool {
        let chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(events) = chats.get(&chat_id) else {
            return false;
        };
        for event in events {
            if event.timestamp <= last {
                continue;
            }
            if event.timestamp >= current {
                break;
            }
            if event.speaker == owner {
                continue;
            }
            if reply_to == Some(event.speaker) || event.reply_to == Some(owner) {
                return true;
            }
            if current - event.timestamp <= self.window_secs
                && event.timestamp - last <= self.window_secs
            {
                return true;
            }
        }
        false
    }
}

impl BreakPredicate for TurnTracker {
    fn should_break(&self, unit: &BurstUnit, fragment: &Fragment) -> bool {
        self.was_interrupted(
            unit.chat_id,
            unit.speaker,
            unit.last_activity,
            fragment.timestamp,
            fragment.origin.reply_to.as_ref().map(|p| p.platform_id),
        )
    }
}
