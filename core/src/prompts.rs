//! Fixed prompt templates and sampling temperatures for each action kind.

use crate::protocol::ActionKind;

/// System message sent ahead of every chat transcript.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a concise writing assistant embedded in a phone keyboard. \
Answer follow-up questions about the user's text directly. Keep replies short enough to read on a small screen.";

/// Builds the single-turn prompt for `kind`. Returns `None` for kinds that are
/// not answered by a single completion (web search, chat).
pub fn single_turn_prompt(kind: ActionKind, source_text: &str) -> Option<String> {
    let prompt = match kind {
        ActionKind::Compose => format!(
            "Based on this brief input: '{source_text}', compose a clear, well-written message. \
             Expand on the idea naturally and make it sound professional yet friendly. \
             Only return the composed message, nothing else."
        ),
        ActionKind::Polish => format!(
            "Polish this text to make it more professional and well-written: '{source_text}'. \
             Keep the same meaning but improve clarity, grammar, and tone. \
             Only return the polished text, nothing else."
        ),
        ActionKind::Shorten => format!(
            "Make this text more concise while keeping the key message: '{source_text}'. \
             Only return the shortened text, nothing else."
        ),
        ActionKind::Explain => format!(
            "Explain this in simple, clear terms: '{source_text}'. \
             Provide a concise explanation that's easy to understand. Keep it to 2-3 sentences. \
             Only return the explanation, nothing else."
        ),
        ActionKind::FactCheck => format!(
            "Fact-check this statement: '{source_text}'. \
             Provide a brief assessment (true/false/partially true) and a short explanation. \
             Keep it concise (2-3 sentences). Only return the fact-check result, nothing else."
        ),
        ActionKind::WebSearch | ActionKind::Chat => return None,
    };
    Some(prompt)
}

/// Creative kinds run warmer, corrective kinds cooler.
pub fn default_temperature(kind: ActionKind) -> f64 {
    match kind {
        ActionKind::Compose | ActionKind::Chat => 0.7,
        ActionKind::Polish => 0.5,
        ActionKind::Explain => 0.4,
        ActionKind::Shorten => 0.3,
        ActionKind::FactCheck | ActionKind::WebSearch => 0.2,
    }
}
