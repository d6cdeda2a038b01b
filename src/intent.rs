use serde::{ Deserialize, Serialize };
use unicode_normalization::{ char::is_combining_mark, UnicodeNormalization };

use crate::capture::CaptureStage;
use crate::config::prompt::PromptConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    EmailContact,
    #[serde(rename = "whatsapp_handoff")]
    WhatsAppHandoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CaptureAnswer,
    QuickAction(QuickAction),
    ContactRequest,
    ForwardToLlm,
}

pub fn classify(stage: CaptureStage, utterance: &str, prompts: &PromptConfig) -> Intent {
    if stage != CaptureStage::Idle {
        return Intent::CaptureAnswer;
    }
    let utterance = utterance.trim();
    if let Some(def) = prompts.quick_actions.iter().find(|def| def.label.trim() == utterance) {
        return Intent::QuickAction(def.action);
    }
    if wants_contact(utterance, prompts) {
        return Intent::ContactRequest;
    }
    Intent::ForwardToLlm
}

fn fold(word: &str) -> String {
    word.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

// Words at least as long as a keyword may differ by `contact_max_edits`.
pub fn wants_contact(utterance: &str, prompts: &PromptConfig) -> bool {
    if prompts.contact_keywords.is_empty() {
        return false;
    }
    let words: Vec<String> = utterance
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(fold)
        .collect();

    prompts.contact_keywords.iter().any(|keyword| {
        let keyword = fold(keyword);
        let keyword_len = keyword.chars().count();
        words.iter().any(|word| {
            *word == keyword ||
                (word.chars().count() >= keyword_len &&
                    strsim::levenshtein(word, &keyword) <= prompts.contact_max_edits)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(prompts: &PromptConfig, action: QuickAction) -> String {
        prompts.quick_action_label(action).unwrap().to_string()
    }

    #[test]
    fn active_capture_wins_over_everything() {
        let prompts = PromptConfig::default();
        let whatsapp = label(&prompts, QuickAction::WhatsAppHandoff);
        for stage in [
            CaptureStage::AwaitingName,
            CaptureStage::AwaitingEmail,
            CaptureStage::AwaitingMessage,
        ] {
            assert_eq!(classify(stage, &whatsapp, &prompts), Intent::CaptureAnswer);
            assert_eq!(classify(stage, "contáctame", &prompts), Intent::CaptureAnswer);
            assert_eq!(classify(stage, "¿Qué sabe hacer?", &prompts), Intent::CaptureAnswer);
        }
    }

    #[test]
    fn quick_action_labels_match_exactly() {
        let prompts = PromptConfig::default();
        let email = label(&prompts, QuickAction::EmailContact);
        assert_eq!(
            classify(CaptureStage::Idle, &email, &prompts),
            Intent::QuickAction(QuickAction::EmailContact)
        );
        let shouted = email.to_uppercase();
        assert_ne!(
            classify(CaptureStage::Idle, &shouted, &prompts),
            Intent::QuickAction(QuickAction::EmailContact)
        );
    }

    #[test]
    fn contact_requests_are_detected() {
        let prompts = PromptConfig::default();
        assert_eq!(
            classify(CaptureStage::Idle, "Por favor contáctame, tengo un proyecto", &prompts),
            Intent::ContactRequest
        );
        assert_eq!(
            classify(CaptureStage::Idle, "¿Qué tecnologías domina Erick?", &prompts),
            Intent::ForwardToLlm
        );
    }

    #[test]
    fn accents_and_small_typos_still_match() {
        let prompts = PromptConfig::default();
        assert!(wants_contact("LLÁMAME mañana", &prompts));
        assert!(wants_contact("contactame", &prompts));
        assert!(wants_contact("escribemee por favor", &prompts));
    }

    #[test]
    fn ordinary_questions_go_to_llm() {
        let prompts = PromptConfig::default();
        for question in [
            "¿Ha trabajado con Llama o con GPT?",
            "¿Escribe código en Python?",
            "¿Qué tecnologías domina?",
            "¿Lo contactan muchas empresas?",
            "Quiero contratarlo",
        ] {
            assert_eq!(classify(CaptureStage::Idle, question, &prompts), Intent::ForwardToLlm, "{}", question);
        }
    }

    #[test]
    fn padded_labels_still_match() {
        let mut prompts = PromptConfig::default();
        prompts.quick_actions[1].label = format!("  {}  ", prompts.quick_actions[1].label);
        let trimmed = prompts.quick_actions[1].label.trim().to_string();
        assert_eq!(
            classify(CaptureStage::Idle, &trimmed, &prompts),
            Intent::QuickAction(prompts.quick_actions[1].action)
        );
    }

    #[test]
    fn empty_keyword_list_disables_detection() {
        let prompts = PromptConfig { contact_keywords: vec![], ..PromptConfig::default() };
        assert!(!wants_contact("contáctame", &prompts));
    }
}
