use std::time::Duration;

use crate::email::TemplateParams;
use crate::error::ServiceError;
use crate::llm::chat::ChatMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestCompletion { turn: u64, messages: Vec<ChatMessage> },

    CancelCompletion { turn: u64 },

    DeliverLead { params: TemplateParams },

    DeliverContactForm { generation: u64, params: TemplateParams },

    ScheduleFormReset { generation: u64, delay: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completion { turn: u64, result: Result<String, ServiceError> },
    LeadDelivery { result: Result<(), ServiceError> },
    FormDelivery { generation: u64, result: Result<(), ServiceError> },
    FormReset { generation: u64 },
}
