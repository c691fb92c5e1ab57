//! Prompt construction for chat replies and session summaries.

use crate::context::{ContextWindow, render_transcript};
use supportline_core::message::Message;
use supportline_core::session::Turn;

/// The fixed reply used whenever a session is handed to a human.
pub const ESCALATION_REPLY: &str =
    "I'm escalating this issue to a human support agent. Please wait while I connect you.";

/// The fixed reply used when the provider cannot produce an answer.
pub const DEGRADED_REPLY: &str =
    "I'm having trouble reaching the support system right now. Please try again later.";

/// Persona and formatting rules for chat replies.
pub fn system_prompt(assistant_name: &str) -> String {
    format!(
        "You are {assistant_name}, a friendly and professional customer support assistant.\n\
         Rules for every reply:\n\
         1) Do not open with filler such as 'Great!', 'Okay' or 'Sure'.\n\
         2) Answer directly in one to three sentences.\n\
         3) Put multiple items (steps, options, features) in a short numbered list or bullets, one sentence each.\n\
         4) Close with a brief question offering the next step.\n\
         5) Keep the tone neutral and professional.\n\
         6) If you are uncertain or the issue needs a person, reply exactly: '{ESCALATION_REPLY}'"
    )
}

/// Messages for a chat reply: persona, prior context, then the new message.
pub fn chat_messages(assistant_name: &str, window: &ContextWindow, user_input: &str) -> Vec<Message> {
    let context = if window.is_empty() {
        "No prior context.".to_string()
    } else {
        window.render(assistant_name)
    };

    vec![
        Message::system(system_prompt(assistant_name)),
        Message::user(format!(
            "Conversation context:\n{context}\n\nCustomer: {user_input}\n{assistant_name}:"
        )),
    ]
}

/// Messages asking for a one-line summary and up to three next actions.
pub fn summary_messages(assistant_name: &str, turns: &[Turn]) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are {assistant_name}, an assistant that summarizes support conversations. \
             Produce a compact one-line summary, then three concise next actions as bullets."
        )),
        Message::user(format!(
            "Conversation:\n{}\n\nOutput format:\nSUMMARY:\n- <one line summary>\nNEXT_ACTIONS:\n- action1\n- action2\n- action3",
            render_transcript(turns, assistant_name)
        )),
    ]
}
