//! ChatML rendering shared by prompt construction and tokenized commits.
//!
//! The same template must be used when building a raw-mode prompt and when
//! rendering an exchange for tokenization, otherwise tokenized context drifts
//! from what the model saw.

use ctxd_types::context::RawMessage;
use ctxd_types::session::MessageRole;

pub const IM_START: &str = "<|im_start|>";
pub const IM_END: &str = "<|im_end|>";

/// Render one conversational turn.
pub fn render_turn(role: MessageRole, content: &str) -> String {
    format!("{IM_START}{role}\n{content}{IM_END}\n")
}

/// Prompt for raw mode: the stored history followed by the new user turn.
pub fn render_raw_prompt(history: &[RawMessage], prompt: &str) -> String {
    let mut out = String::new();
    for message in history {
        out.push_str(&render_turn(message.role, &message.content));
    }
    out.push_str(&render_turn(MessageRole::User, prompt));
    out
}

/// A complete user+assistant exchange, as appended to tokenized context.
pub fn render_exchange(user: &str, assistant: &str) -> String {
    let mut out = render_turn(MessageRole::User, user);
    out.push_str(&render_turn(MessageRole::Assistant, assistant));
    out
}
