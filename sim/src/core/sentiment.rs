//! Keyword sentiment over recent chat, used to steer Elyx tone.

use crate::core::state::PersonaSnapshot;
use crate::core::text::mentions_any;
use crate::core::types::ChatMessage;

const POSITIVE: [&str; 9] = [
    "thanks", "helpful", "nice", "works", "good", "👍", "ok", "great", "love",
];
const NEGATIVE: [&str; 11] = [
    "busy", "later", "can't", "cant", "skip", "won't", "wont", "no", "nah", "too much", "hard",
];
const STRESS: [&str; 8] = [
    "stressed",
    "deadline",
    "flight",
    "jetlag",
    "jet lag",
    "travel",
    "busy week",
    "on the road",
];

/// Score `messages` starting from the neutral baseline.
///
/// Each message counts once per category, whatever the number of matching
/// keywords. Every score is clamped into `0..=100`.
pub fn track_persona_sentiment(messages: &[ChatMessage]) -> PersonaSnapshot {
    let mut snap = PersonaSnapshot::default();
    for message in messages {
        let text = message.text.to_lowercase();
        if mentions_any(&text, &POSITIVE) {
            snap.trust += 2;
            snap.engagement += 1;
        }
        if mentions_any(&text, &NEGATIVE) {
            snap.engagement -= 2;
            snap.frustration += 2;
        }
        if mentions_any(&text, &STRESS) {
            snap.frustration += 2;
            snap.engagement -= 1;
        }
    }
    PersonaSnapshot {
        trust: snap.trust.clamp(0, 100),
        engagement: snap.engagement.clamp(0, 100),
        frustration: snap.frustration.clamp(0, 100),
    }
}
