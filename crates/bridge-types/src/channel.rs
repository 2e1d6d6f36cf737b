//! Sub-channel naming.
//!
//! A logical channel maps onto three transport sub-channels. The suffix
//! separator `#` keeps the derived names disjoint: `"a#reply"` can never be
//! the request sub-channel of any logical channel because request names
//! always end in `#request`.

/// Which of the three derived sub-channels a transport name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubChannelKind {
    /// Carries `CallEnvelope`s towards the answering side.
    Request,
    /// Carries `ReplyEnvelope`s back to the caller.
    Reply,
    /// Carries one-way `NotifyEnvelope`s.
    Notify,
}

impl SubChannelKind {
    /// Suffix appended to the logical channel name.
    pub const fn suffix(self) -> &'static str {
        match self {
            SubChannelKind::Request => "#request",
            SubChannelKind::Reply => "#reply",
            SubChannelKind::Notify => "#notify",
        }
    }

    /// Derive the transport sub-channel for `channel`.
    pub fn derive(self, channel: &str) -> String {
        format!("{channel}{}", self.suffix())
    }

    /// Split a transport sub-channel back into its kind and logical channel.
    pub fn parse(sub_channel: &str) -> Option<(SubChannelKind, &str)> {
        [
            SubChannelKind::Request,
            SubChannelKind::Reply,
            SubChannelKind::Notify,
        ]
        .into_iter()
        .find_map(|kind| {
            sub_channel
                .strip_suffix(kind.suffix())
                .map(|channel| (kind, channel))
        })
    }
}

/// Request sub-channel for `channel`.
pub fn request_channel(channel: &str) -> String {
    SubChannelKind::Request.derive(channel)
}

/// Reply sub-channel for `channel`.
pub fn reply_channel(channel: &str) -> String {
    SubChannelKind::Reply.derive(channel)
}

/// One-way notification sub-channel for `channel`.
pub fn notify_channel(channel: &str) -> String {
    SubChannelKind::Notify.derive(channel)
}
