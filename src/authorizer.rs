//! Decision authorization: which emoji means what, and who may decide.

use std::collections::BTreeSet;

use crate::models::application::Application;
use crate::models::decision::Decision;
use crate::models::normalize_emoji;
use crate::models::request::TrackedRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmojiClass {
    Approve,
    Reject,
    Ignore,
}

impl EmojiClass {
    pub fn decision(self) -> Option<Decision> {
        match self {
            EmojiClass::Approve => Some(Decision::Approved),
            EmojiClass::Reject => Some(Decision::Rejected),
            EmojiClass::Ignore => None,
        }
    }
}

/// Globally configured approval and rejection emoji sets.
#[derive(Debug, Clone, Default)]
pub struct EmojiPolicy {
    approve: BTreeSet<String>,
    reject: BTreeSet<String>,
}

impl EmojiPolicy {
    pub fn new<I, J, S, T>(approve: I, reject: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let normalize = |e: &str| Some(normalize_emoji(e)).filter(|e| !e.is_empty());
        Self {
            approve: approve
                .into_iter()
                .filter_map(|e| normalize(e.as_ref()))
                .collect(),
            reject: reject
                .into_iter()
                .filter_map(|e| normalize(e.as_ref()))
                .collect(),
        }
    }

    /// Classification from the global sets alone. An emoji in both sets is
    /// ambiguous and ignored.
    pub fn global_class(&self, emoji: &str) -> EmojiClass {
        let emoji = normalize_emoji(emoji);
        match (self.approve.contains(&emoji), self.reject.contains(&emoji)) {
            (true, false) => EmojiClass::Approve,
            (false, true) => EmojiClass::Reject,
            _ => EmojiClass::Ignore,
        }
    }

    /// An emoji outside the request's own `valid_emojis` is always ignored,
    /// whatever the global sets say.
    pub fn classify_emoji(&self, request: &TrackedRequest, emoji: &str) -> EmojiClass {
        if !request.is_valid_emoji(emoji) {
            return EmojiClass::Ignore;
        }
        self.global_class(emoji)
    }
}

pub fn can_decide(application: &Application, identity: &str) -> bool {
    application.is_authorized_approver(identity)
}
