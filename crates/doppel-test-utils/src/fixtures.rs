// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for incoming messages.

use doppel_core::types::{ChatId, IncomingMessage, Participant, PlatformUserId};

/// A human participant with a username.
pub fn participant(platform_id: i64, username: &str) -> Participant {
    Participant {
        platform_id: PlatformUserId(platform_id),
        username: Some(username.to_string()),
        first_name: None,
        last_name: None,
        is_bot: false,
    }
}

/// An automated participant.
pub fn bot(platform_id: i64, username: &str) -> Participant {
    Participant {
        is_bot: true,
        ..participant(platform_id, username)
    }
}

/// A plain text message from `sender`.
pub fn text_message(chat_id: i64, sender: &Participant, text: &str, timestamp: i64) -> IncomingMessage {
    IncomingMessage {
        chat_id: ChatId(chat_id),
        sender: Some(sender.clone()),
        text: Some(text.to_string()),
        has_voice: false,
        timestamp,
        via_bot: false,
        forwarded: false,
        reply_to: None,
        mentions: Vec::new(),
    }
}

/// A text message replying to a message written by `target`.
pub fn reply_message(
    chat_id: i64,
    sender: &Participant,
    target: &Participant,
    text: &str,
    timestamp: i64,
) -> IncomingMessage {
    IncomingMessage {
        reply_to: Some(target.clone()),
        ..text_message(chat_id, sender, text, timestamp)
    }
}

/// A voice note without text.
pub fn voice_message(chat_id: i64, sender: &Participant, timestamp: i64) -> IncomingMessage {
    IncomingMessage {
        text: None,
        has_voice: true,
        ..text_message(chat_id, sender, "", timestamp)
    }
}
