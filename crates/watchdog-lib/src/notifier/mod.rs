//! Alarm notifications
//!
//! Alarm evaluation produces [`Notification`] values; the collector hands
//! them to a bounded [`NotificationQueue`] drained by a
//! [`NotificationWorker`], so a slow mail relay never holds up request
//! handling. Whether a notification is mailed or only logged is decided
//! when the alarm fires, from the `WITH_MAIL` flag in force at that time.

mod mail;
mod worker;

pub use mail::{HttpMailRelay, MailMessage, MailTransport, NotifyError};
pub use worker::{NotificationQueue, NotificationWorker, NotifierConfig};

use serde::{Deserialize, Serialize};

use crate::alarm::{quantities, Transition};

pub mod subjects {
    pub const OVERLOAD: &str = "Server overload";
    pub const OVERLOAD_CLEARED: &str = "Server overload cleared";
    pub const SAMPLER_RESPONSE: &str = "Sampler response";
    pub const SERVER_FAULT: &str = "Server fault";
    pub const TEST: &str = "Test notification";
}

/// A message waiting for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Send through the mail transport; when false the worker only logs it
    pub mail_enabled: bool,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, mail_enabled: bool) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            mail_enabled,
        }
    }

    /// Service-control style notification ("Server fault")
    pub fn server_fault(body: impl Into<String>, mail_enabled: bool) -> Self {
        Self::new(subjects::SERVER_FAULT, body, mail_enabled)
    }

    /// Manually requested test message
    pub fn test_message(mail_enabled: bool) -> Self {
        Self::new(
            subjects::TEST,
            "Test notification from the farm watchdog.",
            mail_enabled,
        )
    }

    /// Message for an alarm state change
    pub fn for_transition(transition: &Transition, mail_enabled: bool) -> Self {
        let trip = transition.is_trip();
        let value = transition
            .value
            .map(|v| v.to_string())
            .unwrap_or_default();

        let (subject, body) = match transition.quantity.as_str() {
            quantities::ELAPSE => {
                let body = if trip {
                    format!("Alert sampler response {} s.", value)
                } else {
                    format!("End of alert sampler response {} s.", value)
                };
                (subjects::SAMPLER_RESPONSE, body)
            }
            quantities::MYSQL => {
                let body = if trip {
                    "Data store unreachable."
                } else {
                    "Data store reconnected."
                };
                (subjects::SERVER_FAULT, body.to_string())
            }
            quantities::DEMON => {
                let body = if trip {
                    "Sampler connection error."
                } else {
                    "Sampler reconnected."
                };
                (subjects::SERVER_FAULT, body.to_string())
            }
            quantity if trip => (
                subjects::OVERLOAD,
                format!("Alert {} {} %.", quantity, value),
            ),
            quantity => (
                subjects::OVERLOAD_CLEARED,
                format!("End of alert {} {} %.", quantity, value),
            ),
        };

        Self::new(subject, body, mail_enabled)
    }
}
