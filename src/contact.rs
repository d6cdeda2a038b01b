use serde::{ Deserialize, Serialize };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    #[default]
    Idle,
    Success,
    Error,
}

// Results and reset timers of an older generation are ignored.
#[derive(Debug, Clone, Default)]
pub struct ContactForm {
    status: FormStatus,
    sending: bool,
    generation: u64,
}

impl ContactForm {
    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn begin(&mut self) -> Option<u64> {
        if self.sending {
            return None;
        }
        self.generation += 1;
        self.sending = true;
        self.status = FormStatus::Idle;
        Some(self.generation)
    }

    pub fn finish(&mut self, generation: u64, status: FormStatus) -> bool {
        if generation != self.generation || !self.sending {
            return false;
        }
        self.sending = false;
        self.status = status;
        true
    }

    pub fn reset(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.sending {
            return false;
        }
        self.status = FormStatus::Idle;
        true
    }
}
