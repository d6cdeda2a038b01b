use serde::Serialize;

pub const DIRECTIVE_TOKEN: &str = "[SHOW_WHATSAPP]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub text: String,
    pub show_whatsapp: bool,
}

pub fn render(content: &str) -> Rendered {
    Rendered {
        show_whatsapp: content.contains(DIRECTIVE_TOKEN),
        text: strip_directive(content),
    }
}

// Repeats until no token is left: `[SHOW_[SHOW_WHATSAPP]WHATSAPP]` would
// otherwise splice a new one together.
pub fn strip_directive(content: &str) -> String {
    let mut text = content.replace(DIRECTIVE_TOKEN, "");
    while text.contains(DIRECTIVE_TOKEN) {
        text = text.replace(DIRECTIVE_TOKEN, "");
    }
    text
}
