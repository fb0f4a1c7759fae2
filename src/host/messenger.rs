//! Player Messaging
//!
//! The core supplies a template key plus positional arguments; the host
//! resolves and delivers. Templates use `%` placeholders, replaced in order.

use tracing::info;

use crate::core::id::PlayerId;

/// Message template keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Msg {
    /// Arena has every required warp.
    ArenaReady,
    /// Arena is missing warps (list).
    MissingWarps,
    /// Joined an arena (arena).
    JoinedArena,
    /// Join refused (arena, reason).
    JoinRejected,
    /// Left an arena (arena).
    LeftArena,
    /// Now spectating (arena).
    Spectating,
    /// Match began (arena).
    ArenaStarted,
    /// Checkpoint broadcast (HH:MM:SS).
    TimeRemaining,
    /// Match ended with winners (arena, names).
    ArenaEnded,
    /// Match ended in a draw (arena).
    ArenaDraw,
    /// Player removed for cheating (name).
    PlayerKicked,
    /// Class chosen (class).
    ClassPicked,
    /// Class refused (class, reason).
    ClassRejected,
    /// No permitted class, removed from lobby.
    NoPermittedClass,
    /// Rating update (new rating, signed delta).
    RatingChanged,
    /// Ability refused during its cooldown (seconds left).
    AbilityCooldown,
    /// Ability permission missing.
    AbilityNoPermission,
}

impl Msg {
    /// All keys.
    pub const ALL: [Msg; 17] = [
        Msg::ArenaReady,
        Msg::MissingWarps,
        Msg::JoinedArena,
        Msg::JoinRejected,
        Msg::LeftArena,
        Msg::Spectating,
        Msg::ArenaStarted,
        Msg::TimeRemaining,
        Msg::ArenaEnded,
        Msg::ArenaDraw,
        Msg::PlayerKicked,
        Msg::ClassPicked,
        Msg::ClassRejected,
        Msg::NoPermittedClass,
        Msg::RatingChanged,
        Msg::AbilityCooldown,
        Msg::AbilityNoPermission,
    ];

    /// Config key, e.g. `join-rejected`.
    pub fn key(self) -> &'static str {
        match self {
            Msg::ArenaReady => "arena-ready",
            Msg::MissingWarps => "missing-warps",
            Msg::JoinedArena => "joined-arena",
            Msg::JoinRejected => "join-rejected",
            Msg::LeftArena => "left-arena",
            Msg::Spectating => "spectating",
            Msg::ArenaStarted => "arena-started",
            Msg::TimeRemaining => "time-remaining",
            Msg::ArenaEnded => "arena-ended",
            Msg::ArenaDraw => "arena-draw",
            Msg::PlayerKicked => "player-kicked",
            Msg::ClassPicked => "class-picked",
            Msg::ClassRejected => "class-rejected",
            Msg::NoPermittedClass => "no-permitted-class",
            Msg::RatingChanged => "rating-changed",
            Msg::AbilityCooldown => "ability-cooldown",
            Msg::AbilityNoPermission => "ability-no-permission",
        }
    }

    /// Default English template.
    pub fn template(self) -> &'static str {
        match self {
            Msg::ArenaReady => "The arena is ready to be used!",
            Msg::MissingWarps => "Missing warps: %",
            Msg::JoinedArena => "You joined the arena '%'.",
            Msg::JoinRejected => "You cannot join '%': %.",
            Msg::LeftArena => "You left the arena '%'.",
            Msg::Spectating => "You are now spectating '%'.",
            Msg::ArenaStarted => "The arena '%' has begun!",
            Msg::TimeRemaining => "% remaining!",
            Msg::ArenaEnded => "The arena '%' has ended. Winner(s): %",
            Msg::ArenaDraw => "The arena '%' ended in a draw.",
            Msg::PlayerKicked => "% has been caught cheating!",
            Msg::ClassPicked => "You have chosen the class '%'.",
            Msg::ClassRejected => "You cannot pick '%': %.",
            Msg::NoPermittedClass => "You do not have permission for any class.",
            Msg::RatingChanged => "Your rating is now % (%).",
            Msg::AbilityCooldown => "This ability is on cooldown for % more seconds!",
            Msg::AbilityNoPermission => "You do not have permission to use this ability.",
        }
    }

    /// Fill the default template. Surplus placeholders stay as `%`.
    pub fn format(self, args: &[String]) -> String {
        format_template(self.template(), args)
    }
}

/// Replace each `%` in `template` with the next argument.
pub fn format_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    for c in template.chars() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push('%'),
        }
    }
    out
}

/// Join items, appending `separator` after each one, then trim whitespace.
///
/// An empty separator falls back to a single space.
pub fn format_list<I, S>(items: I, separator: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let separator = if separator.is_empty() { " " } else { separator };
    let mut out = String::new();
    for item in items {
        out.push_str(item.as_ref());
        out.push_str(separator);
    }
    out.trim().to_string()
}

/// Delivers template messages to players.
pub trait Messenger: Send + Sync {
    /// Message one player.
    fn tell(&self, recipient: PlayerId, msg: Msg, args: &[String]);

    /// Message every recipient.
    fn announce(&self, recipients: &[PlayerId], msg: Msg, args: &[String]) {
        for recipient in recipients {
            self.tell(*recipient, msg, args);
        }
    }
}

/// Messenger that writes rendered messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessenger;

impl Messenger for LogMessenger {
    fn tell(&self, recipient: PlayerId, msg: Msg, args: &[String]) {
        info!(player = %recipient, key = msg.key(), "{}", msg.format(args));
    }
}
