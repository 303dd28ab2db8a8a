use crate::Error;
use std::collections::HashMap;

/// Minimal view of a SIP response a real SIP core would hand this engine:
/// status code plus the handful of headers subscribe/notify logic reads.
/// Everything else (Via, CSeq method, full header list) stays with the core.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub remote_tag: Option<String>,
    pub route_set: Vec<String>,
    pub expires: Option<u32>,
    pub min_expires: Option<u32>,
    pub headers: HashMap<String, String>,
}

impl Response {
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The three `Subscription-State` values (spec.md §4.4/§6); `Active` and
/// `Pending` behave identically here (both refresh the expiry schedule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    Active,
    Pending,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionState {
    pub state: SubState,
    pub expires: Option<u32>,
    pub reason: Option<String>,
}

impl SubscriptionState {
    /// Parse `active|pending|terminated; expires=N; reason=...` (spec.md §6).
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut parts = raw.split(';').map(str::trim);
        let state = match parts.next().ok_or(Error::Protocol("empty Subscription-State header"))? {
            "active" => SubState::Active,
            "pending" => SubState::Pending,
            "terminated" => SubState::Terminated,
            _ => return Err(Error::Protocol("unknown Subscription-State value")),
        };

        let mut expires = None;
        let mut reason = None;
        for param in parts {
            if let Some(v) = param.strip_prefix("expires=") {
                expires = v.parse().ok();
            } else if let Some(v) = param.strip_prefix("reason=") {
                reason = Some(v.trim_matches('"').to_string());
            }
        }

        Ok(Self { state, expires, reason })
    }
}

/// A NOTIFY, as the SIP core's dialog matching delivers it to this engine.
#[derive(Debug, Clone)]
pub struct Notify {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
    pub event: String,
    pub subscription_state: SubscriptionState,
}

/// Headers this engine wants sent on an outbound request; serializing them
/// into an actual SIP message is the SIP core's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub method: &'static str,
    pub request_uri: String,
    pub call_id: String,
    pub cseq: u32,
    pub event: String,
    pub id: Option<String>,
    pub expires: u32,
    pub contact: String,
    pub authorization: Option<String>,
    pub refer_to: Option<String>,
}
