use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStage {
    #[default]
    Idle,
    AwaitingName,
    AwaitingEmail,
    AwaitingMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadDraft {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStep {
    AskEmail { name: String },
    AskMessage,
    Completed(LeadDraft),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("no capture flow is active")]
    NotActive,
    #[error("capture answers must not be empty")]
    EmptyAnswer,
}

#[derive(Debug, Clone, Default)]
pub struct LeadCapture {
    stage: CaptureStage,
    draft: LeadDraft,
}

impl LeadCapture {
    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    pub fn draft(&self) -> &LeadDraft {
        &self.draft
    }

    pub fn is_active(&self) -> bool {
        self.stage != CaptureStage::Idle
    }

    pub fn begin(&mut self) {
        self.draft = LeadDraft::default();
        self.stage = CaptureStage::AwaitingName;
    }

    pub fn answer(&mut self, text: &str) -> Result<CaptureStep, CaptureError> {
        let text = text.trim();
        if self.stage == CaptureStage::Idle {
            return Err(CaptureError::NotActive);
        }
        if text.is_empty() {
            return Err(CaptureError::EmptyAnswer);
        }

        match self.stage {
            CaptureStage::Idle => Err(CaptureError::NotActive),
            CaptureStage::AwaitingName => {
                self.draft.name = text.to_string();
                self.stage = CaptureStage::AwaitingEmail;
                Ok(CaptureStep::AskEmail { name: self.draft.name.clone() })
            }
            CaptureStage::AwaitingEmail => {
                self.draft.email = text.to_string();
                self.stage = CaptureStage::AwaitingMessage;
                Ok(CaptureStep::AskMessage)
            }
            CaptureStage::AwaitingMessage => {
                self.draft.message = text.to_string();
                self.stage = CaptureStage::Idle;
                Ok(CaptureStep::Completed(std::mem::take(&mut self.draft)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn full_flow_yields_completed_draft() {
        let mut capture = LeadCapture::default();
        capture.begin();
        assert_eq!(capture.stage(), CaptureStage::AwaitingName);

        assert_eq!(
            capture.answer(" Ana ").unwrap(),
            CaptureStep::AskEmail { name: "Ana".into() }
        );
        assert_eq!(capture.draft().name, "Ana");
        assert!(capture.draft().email.is_empty());

        assert_eq!(capture.answer("ana@x.com").unwrap(), CaptureStep::AskMessage);
        assert!(capture.draft().message.is_empty());

        let step = capture.answer("necesito una web").unwrap();
        assert_eq!(
            step,
            CaptureStep::Completed(LeadDraft {
                name: "Ana".into(),
                email: "ana@x.com".into(),
                message: "necesito una web".into(),
            })
        );
        assert_eq!(capture.stage(), CaptureStage::Idle);
        assert_eq!(capture.draft(), &LeadDraft::default());
    }

    #[test]
    fn email_is_not_validated() {
        let mut capture = LeadCapture::default();
        capture.begin();
        capture.answer("Ana").unwrap();
        assert_eq!(capture.answer("not an email").unwrap(), CaptureStep::AskMessage);
    }

    #[test]
    fn idle_and_blank_answers_are_rejected() {
        let mut capture = LeadCapture::default();
        assert_eq!(capture.answer("Ana"), Err(CaptureError::NotActive));
        capture.begin();
        assert_eq!(capture.answer("   "), Err(CaptureError::EmptyAnswer));
        assert_eq!(capture.stage(), CaptureStage::AwaitingName);
    }

    #[test]
    fn begin_discards_previous_draft() {
        let mut capture = LeadCapture::default();
        capture.begin();
        capture.answer("Ana").unwrap();
        capture.begin();
        assert_eq!(capture.stage(), CaptureStage::AwaitingName);
        assert_eq!(capture.draft(), &LeadDraft::default());
    }

    proptest! {
        #[test]
        fn three_answers_always_complete(
            name in "[a-zA-Z]{1,10}",
            email in "[a-z@.]{1,12}",
            message in "[a-z ]{0,20}[a-z]",
        ) {
            let mut capture = LeadCapture::default();
            capture.begin();
            capture.answer(&name).unwrap();
            capture.answer(&email).unwrap();
            let step = capture.answer(&message).unwrap();
            let is_completed = matches!(step, CaptureStep::Completed(_));
            prop_assert!(is_completed);
            prop_assert_eq!(capture.stage(), CaptureStage::Idle);
        }
    }
}
