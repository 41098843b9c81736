//! Deterministic prompt assembly.
//!
//! Order is fixed: static instructions (with the enumerated media catalog),
//! retrieval snippets, the stored log role-mapped turn by turn, and finally
//! the current batch as one combined user message.

use courier_core::types::{
    CorrespondentProfile, InboundMessage, MediaDescriptor, PromptMessage, Role, Turn,
};

/// Build the ordered instruction sequence for one flush.
pub fn build_context(
    instructions: &str,
    catalog: &[MediaDescriptor],
    snippets: &[String],
    log: &[Turn],
    batch: &[InboundMessage],
    profile: Option<&CorrespondentProfile>,
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(log.len() + snippets.len() + 2);

    let mut system = instructions.to_string();
    if !catalog.is_empty() {
        system.push_str("\n\n");
        system.push_str(&render_catalog(catalog));
    }
    messages.push(PromptMessage::system(system));

    for snippet in snippets {
        messages.push(PromptMessage::system(format!(
            "Supplementary context:\n{}",
            snippet.trim()
        )));
    }

    for turn in log {
        messages.push(match turn.role {
            Role::Correspondent => PromptMessage::user(turn.content.clone()),
            Role::Agent => PromptMessage::assistant(turn.content.clone()),
        });
    }

    messages.push(PromptMessage::user(render_batch(batch, profile)));
    messages
}

/// Enumerated, human-readable catalog section so the completion service can
/// reference items by id instead of inventing URLs.
fn render_catalog(catalog: &[MediaDescriptor]) -> String {
    let mut out = String::from("Media catalog (reference an item as [MEDIA: <id>]):\n");
    for item in catalog {
        out.push_str(&format!("#{}: {}\n", item.id, clean(&item.description)));
    }
    out.trim_end().to_string()
}

/// Collapse whitespace runs so each description renders as one line.
fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Query string for the retrieval collaborator: the batch's extractable
/// text, or `None` when the batch carries no text at all.
pub fn batch_query(batch: &[InboundMessage]) -> Option<String> {
    let parts: Vec<&str> = batch
        .iter()
        .map(|m| m.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// The current batch as a single combined turn: optional profile hint,
/// numbering when the burst has more than one message.
pub fn render_batch(batch: &[InboundMessage], profile: Option<&CorrespondentProfile>) -> String {
    let mut out = String::new();

    if let Some(name) = profile.and_then(|p| p.display_name.as_deref()) {
        match profile.and_then(|p| p.gender_hint.as_deref()) {
            Some(hint) => out.push_str(&format!("[Speaking with {name} ({hint})]\n")),
            None => out.push_str(&format!("[Speaking with {name}]\n")),
        }
    }

    if batch.len() > 1 {
        for (i, msg) in batch.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, render_entry(msg)));
        }
    } else if let Some(msg) = batch.first() {
        out.push_str(&render_entry(msg));
    }

    out.trim_end().to_string()
}

/// Display/storage form of one inbound message: its text plus a bracketed
/// media-type label when it originated from non-text input.
pub fn render_entry(msg: &InboundMessage) -> String {
    let text = msg.text.trim();
    match msg.kind.label() {
        Some(label) if text.is_empty() => label.to_string(),
        Some(label) => format!("{text} {label}"),
        None => text.to_string(),
    }
}
