//! First-contact profile resolution.

use tracing::debug;

use courier_core::types::{CorrespondentProfile, PromptMessage};
use courier_store::ConversationStore;

use crate::provider::CompletionProvider;

/// Resolve the correspondent profile for one flush.
///
/// Existing profiles are returned as-is. On a correspondent's first-ever
/// turn the display name is derived from the transport-provided name (first
/// whitespace token only) and a gender hint is requested from the completion
/// service as a one-off side call; the result is persisted best-effort.
/// Every failure path yields an empty profile instead of blocking the turn.
pub async fn resolve_profile(
    store: &ConversationStore,
    provider: &dyn CompletionProvider,
    correspondent_id: &str,
    sender_name: Option<&str>,
    first_contact: bool,
) -> CorrespondentProfile {
    if let Some(profile) = store.profile(correspondent_id) {
        return profile;
    }
    if !first_contact {
        return CorrespondentProfile::default();
    }

    let display_name = sender_name
        .and_then(|n| n.split_whitespace().next())
        .map(str::to_string);
    let gender_hint = match display_name.as_deref() {
        Some(name) => classify_gender(provider, name).await,
        None => None,
    };

    let profile = CorrespondentProfile {
        display_name,
        gender_hint,
    };
    if profile != CorrespondentProfile::default() {
        store.save_profile(correspondent_id, &profile);
    }
    profile
}

/// One-off side call: answer is pinned to male/female/unknown.
async fn classify_gender(provider: &dyn CompletionProvider, name: &str) -> Option<String> {
    let prompt = vec![
        PromptMessage::system(
            "Classify the likely grammatical gender for addressing the given \
             first name. Answer with exactly one word: male, female, or unknown.",
        ),
        PromptMessage::user(name),
    ];
    match provider.complete(&prompt).await {
        Ok(answer) => {
            let answer = answer.trim().to_lowercase();
            match answer.as_str() {
                "male" | "female" => Some(answer),
                _ => Some("unknown".to_string()),
            }
        }
        Err(e) => {
            debug!(name, error = %e, "gender classification failed");
            None
        }
    }
}
