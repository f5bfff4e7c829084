//! Scope filtering: which conversations are gated at all.
//!
//! A conversation that is out of scope passes through the gate untouched —
//! no judgment call, no merge buffering, no signal other than `Allow`.

use replygate_core::config::{FilterConfig, GroupFilterMode};
use replygate_core::types::{strip_kind_prefix, ConversationKey, ConversationKind};

/// Returns `true` when gating applies to the given conversation.
///
/// Rules:
/// - Kinds other than private/group are never gated.
/// - A disabled kind toggle exempts that kind entirely.
/// - Private conversations ignore the group filter mode.
/// - Group conversations consult the mode: `disabled` gates every group,
///   `allow-list` gates only listed groups, `deny-list` gates everything
///   except listed groups. List entries match with or without a
///   `group_`/`private_` prefix.
///
/// Pure function of its inputs — no side effects.
pub fn is_in_scope(config: &FilterConfig, kind: ConversationKind, key: &ConversationKey) -> bool {
    match kind {
        ConversationKind::Other => false,
        ConversationKind::Private => config.private_enabled,
        ConversationKind::Group => {
            if !config.group_enabled {
                return false;
            }
            match config.group_filter_mode {
                GroupFilterMode::Disabled => true,
                GroupFilterMode::AllowList => group_listed(config, key),
                GroupFilterMode::DenyList => !group_listed(config, key),
            }
        }
    }
}

/// Whether the conversation's prefix-stripped id matches any configured
/// group id (also prefix-stripped).
fn group_listed(config: &FilterConfig, key: &ConversationKey) -> bool {
    let bare = key.bare_id();
    config
        .group_ids
        .iter()
        .any(|entry| strip_kind_prefix(entry) == bare)
}
