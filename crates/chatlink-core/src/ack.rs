use crate::types::AckLevel;

/// Side effects implied by one acknowledgment observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckDecision {
    /// Persist `observed` as the new stored level.
    pub advance: bool,
    /// Emit a public message event (subject to pending-request resolution).
    pub should_emit: bool,
    /// Signal downstream that previously delivered data for this id is stale.
    pub should_mark_dirty: bool,
}

impl AckDecision {
    const IGNORE: Self = Self {
        advance: false,
        should_emit: false,
        should_mark_dirty: false,
    };
}

/// Decide what one acknowledgment observation implies for a message.
///
/// `previous` is the stored level, absent when the message has never been
/// seen. The caller routes only self-authored observations here, so the dirty
/// signal does not re-check authorship.
///
/// Non-media messages emit once, on first sight. Media messages suppress
/// emission until the backend confirms the asset is retrievable: either the
/// server-level ack arrives with `has_media` set, or the level reaches
/// `Device`/`Read`, which imply deliverability on their own. The two paths
/// exist because asset upload completion and ack advancement are reported by
/// independent, racing notifications.
pub fn decide(
    previous: Option<AckLevel>,
    observed: AckLevel,
    is_media_kind: bool,
    has_media: bool,
) -> AckDecision {
    if let Some(stored) = previous
        && observed <= stored
    {
        // Duplicate or out-of-order delivery. The stored level never regresses.
        return AckDecision::IGNORE;
    }

    let should_emit = if is_media_kind {
        let deliverable = (observed == AckLevel::Server && has_media)
            || matches!(observed, AckLevel::Device | AckLevel::Read);
        deliverable && previous.is_none_or(|stored| stored <= AckLevel::Server)
    } else {
        previous.is_none()
    };

    let should_mark_dirty =
        previous.is_some() && matches!(observed, AckLevel::Read | AckLevel::Played);

    AckDecision {
        advance: true,
        should_emit,
        should_mark_dirty,
    }
}
