use url::Url;

use crate::types::{MessageKind, RawMessage};

/// Suffix of a plain contact id on the wire.
const CONTACT_ID_SUFFIX: &str = "@c.us";
/// Suffix of a room id on the wire.
const ROOM_ID_SUFFIX: &str = "@g.us";
/// Host of a group invite link.
const INVITE_LINK_HOST: &str = "chat.whatsapp.com";
/// Key suffix for the preserved pre-revocation payload.
const REVOKED_KEY_SUFFIX: &str = "_revoked";
/// Key suffix for the text message synthesized from an image caption.
const CAPTION_KEY_SUFFIX: &str = "_TEXT";

/// Whether `id` names a single contact (not a room or broadcast).
pub fn is_contact_id(id: &str) -> bool {
    id.ends_with(CONTACT_ID_SUFFIX)
}

/// Whether `id` names a room.
pub fn is_room_id(id: &str) -> bool {
    id.ends_with(ROOM_ID_SUFFIX)
}

/// Whether a raw message is backend metadata noise that must never advance
/// state or emit: multi-recipient contact-card placeholders and system notices
/// with an empty body and no author (room-join notifications).
pub fn is_noise(message: &RawMessage) -> bool {
    match message.kind {
        MessageKind::MultiContactCard => true,
        MessageKind::SystemNotice => message.body.is_empty() && message.author.is_none(),
        _ => false,
    }
}

/// Whether `link` is a group invite link.
pub fn is_invite_link(link: &str) -> bool {
    invite_code_from_link(link).is_some()
}

/// Extract the invite code from a group invite link, if it is one.
pub fn invite_code_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    if url.host_str() != Some(INVITE_LINK_HOST) {
        return None;
    }
    url.path_segments()?
        .find(|segment| !segment.is_empty())
        .map(str::to_owned)
}

/// Cache key preserving the pre-revocation payload of a revoked message.
///
/// A revocation reuses the live message id, so the original payload moves to
/// this derived key instead of being overwritten.
pub fn revoked_message_key(message_id: &str) -> String {
    format!("{message_id}{REVOKED_KEY_SUFFIX}")
}

/// Cache key of the text message synthesized from an image caption.
pub fn caption_message_key(message_id: &str) -> String {
    format!("{message_id}{CAPTION_KEY_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AckLevel;

    fn raw(kind: MessageKind, body: &str, author: Option<&str>) -> RawMessage {
        RawMessage {
            id: "m1".into(),
            from_me: false,
            kind,
            body: body.to_owned(),
            author: author.map(str::to_owned),
            from: Some("123@c.us".into()),
            timestamp: 1_700_000_000,
            ack: AckLevel::Pending,
            has_media: false,
            caption: None,
            links: Vec::new(),
            invite_code: None,
        }
    }

    #[test]
    fn discriminates_contact_and_room_ids() {
        assert!(is_contact_id("4912345@c.us"));
        assert!(!is_contact_id("4912345-168@g.us"));
        assert!(!is_contact_id("status@broadcast"));
        assert!(is_room_id("4912345-168@g.us"));
        assert!(!is_room_id("4912345@c.us"));
    }

    #[test]
    fn filters_join_notices_and_vcard_placeholders() {
        assert!(is_noise(&raw(MessageKind::MultiContactCard, "cards", None)));
        assert!(is_noise(&raw(MessageKind::SystemNotice, "", None)));
        // Authored or non-empty notices pass through.
        assert!(!is_noise(&raw(MessageKind::SystemNotice, "", Some("1@c.us"))));
        assert!(!is_noise(&raw(MessageKind::SystemNotice, "changed", None)));
        assert!(!is_noise(&raw(MessageKind::Text, "", None)));
    }

    #[test]
    fn extracts_invite_codes_from_links() {
        assert_eq!(
            invite_code_from_link("https://chat.whatsapp.com/AbCdEf123"),
            Some("AbCdEf123".to_owned())
        );
        assert_eq!(
            invite_code_from_link("https://chat.whatsapp.com/AbCdEf123?utm=x"),
            Some("AbCdEf123".to_owned())
        );
        assert_eq!(invite_code_from_link("https://example.org/AbCdEf123"), None);
        assert_eq!(invite_code_from_link("https://chat.whatsapp.com/"), None);
        assert_eq!(invite_code_from_link("not a url"), None);
        assert!(is_invite_link("https://chat.whatsapp.com/AbCdEf123"));
        assert!(!is_invite_link("https://example.org/x"));
    }

    #[test]
    fn derives_stable_cache_keys() {
        assert_eq!(revoked_message_key("m1"), "m1_revoked");
        assert_eq!(caption_message_key("m1"), "m1_TEXT");
    }
}
