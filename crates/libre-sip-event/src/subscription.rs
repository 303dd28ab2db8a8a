use crate::backoff::{jittered, refresh_delay};
use crate::dialog::Dialog;
use crate::message::{OutgoingRequest, Response, SubState};
use crate::{Error, Notify};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Pending,
    Active,
    Terminated,
}

/// Guards re-entrant `subscribe()`/`refresh()` calls while a request is
/// in flight (spec.md Data Model's `loop-state`, narrated in
/// `original_source/src/sipevent/sub.c`/`subscribe.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Idle,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub expires: u32,
    pub retry_on_failure: bool,
}

impl SubscriptionConfig {
    pub fn new(expires: u32) -> Self {
        Self { expires, retry_on_failure: true }
    }
}

/// What the caller must do after feeding a response or NOTIFY into a
/// [`Subscription`]: send a request, arm a timer, or tear the subscriber
/// down. Mirrors the `IceEvent`/`rtmp::connection::Event` "event sink"
/// pattern used by the other engine crates (DESIGN NOTES "Callback /
/// handler plumbing").
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(OutgoingRequest),
    ScheduleRefresh(Duration),
    ScheduleRetry(Duration),
    /// A 401/407 challenge; the caller supplies credentials to
    /// [`Subscription::retry_with_auth`].
    NeedAuth,
    Closed { reason: &'static str },
}

/// Dialog-scoped subscription lifecycle: `init → pending → active →
/// (refresh loop) → terminated`, per spec.md §4.4.
pub struct Subscription {
    dialog: Dialog,
    event: String,
    id: Option<String>,
    state: State,
    flow: Flow,
    config: SubscriptionConfig,
    failc: u32,
    expires: u32,
    subscribed: bool,
    terminated: bool,
    refer: bool,
    refer_to: Option<String>,
    contact: String,
}

impl Subscription {
    pub fn new(dialog: Dialog, event: impl Into<String>, id: Option<String>, contact: impl Into<String>, config: SubscriptionConfig) -> Self {
        Self {
            dialog,
            event: event.into(),
            id,
            state: State::Init,
            flow: Flow::Idle,
            expires: config.expires,
            config,
            failc: 0,
            subscribed: false,
            terminated: false,
            refer: false,
            refer_to: None,
            contact: contact.into(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    fn build_request(&mut self, method: &'static str, expires: u32) -> OutgoingRequest {
        let cseq = self.dialog.next_cseq();
        OutgoingRequest {
            method,
            request_uri: self.dialog.target_uri.clone(),
            call_id: self.dialog.call_id.clone(),
            cseq,
            event: self.event.clone(),
            id: self.id.clone(),
            expires,
            contact: self.contact.clone(),
            authorization: None,
            refer_to: self.refer_to.clone(),
        }
    }

    /// Send the first (or a refreshing) SUBSCRIBE. Fails with
    /// [`Error::Protocol`] if a request is already in flight.
    pub fn subscribe(&mut self) -> Result<OutgoingRequest, Error> {
        if self.flow == Flow::InFlight {
            return Err(Error::Protocol("a SUBSCRIBE is already in flight for this subscription"));
        }
        self.flow = Flow::InFlight;
        if self.state == State::Init {
            self.state = State::Pending;
        }
        Ok(self.build_request("SUBSCRIBE", self.expires))
    }

    /// REFER variant: same reply/notify handling, never auto-refreshes
    /// (spec.md §4.4).
    pub fn refer(&mut self, refer_to: impl Into<String>) -> Result<OutgoingRequest, Error> {
        if self.flow == Flow::InFlight {
            return Err(Error::Protocol("a request is already in flight for this subscription"));
        }
        self.refer = true;
        self.refer_to = Some(refer_to.into());
        self.flow = Flow::InFlight;
        if self.state == State::Init {
            self.state = State::Pending;
        }
        Ok(self.build_request("REFER", self.expires))
    }

    /// Send `SUBSCRIBE` with `Expires: 0` (spec.md §4.4 "Termination").
    pub fn terminate(&mut self) -> Result<OutgoingRequest, Error> {
        if self.flow == Flow::InFlight {
            return Err(Error::Protocol("a request is already in flight for this subscription"));
        }
        self.flow = Flow::InFlight;
        Ok(self.build_request(if self.refer { "REFER" } else { "SUBSCRIBE" }, 0))
    }

    /// Retry the in-flight request with digest credentials after a 401/407
    /// (spec.md §4.4). Keeps `flow == InFlight`: this is still the same
    /// logical transaction from the caller's point of view.
    pub fn retry_with_auth(&mut self, authorization: String) -> OutgoingRequest {
        let mut req = self.build_request(if self.refer { "REFER" } else { "SUBSCRIBE" }, self.expires);
        req.authorization = Some(authorization);
        req
    }

    /// Feed a response to the currently in-flight request.
    pub fn on_response(&mut self, resp: &Response) -> Result<Vec<Action>, Error> {
        if resp.is_provisional() {
            return Ok(Vec::new());
        }

        if resp.is_success() {
            let remote_tag = resp.remote_tag.clone().ok_or(Error::Protocol("2xx to SUBSCRIBE/REFER missing a to-tag"))?;
            self.dialog.establish(remote_tag, resp.route_set.clone());
            self.expires = resp.expires.unwrap_or(self.config.expires);
            self.failc = 0;
            self.subscribed = true;
            self.state = State::Active;
            self.flow = Flow::Idle;
            if self.expires == 0 {
                self.terminated = true;
                self.state = State::Terminated;
                return Ok(vec![Action::Closed { reason: "expires=0" }]);
            }
            if self.refer {
                return Ok(Vec::new());
            }
            return Ok(vec![Action::ScheduleRefresh(refresh_delay(self.expires))]);
        }

        match resp.status {
            401 | 407 => Ok(vec![Action::NeedAuth]),
            403 => {
                self.state = State::Terminated;
                self.terminated = true;
                self.subscribed = false;
                self.flow = Flow::Idle;
                Ok(vec![Action::Closed { reason: "forbidden" }])
            }
            408 | 481 => {
                self.subscribed = false;
                self.flow = Flow::Idle;
                if self.config.retry_on_failure {
                    self.failc += 1;
                    Ok(vec![Action::ScheduleRetry(jittered(self.failc))])
                } else {
                    self.state = State::Terminated;
                    self.terminated = true;
                    Ok(vec![Action::Closed { reason: "dialog does not exist" }])
                }
            }
            423 => {
                let min_expires = resp.min_expires.ok_or(Error::Protocol("423 response missing Min-Expires"))?;
                if min_expires > self.expires {
                    self.expires = min_expires;
                }
                self.flow = Flow::Idle;
                Ok(vec![Action::ScheduleRetry(Duration::ZERO)])
            }
            _ => {
                self.flow = Flow::Idle;
                if self.config.retry_on_failure {
                    self.failc += 1;
                    Ok(vec![Action::ScheduleRetry(jittered(self.failc))])
                } else {
                    self.state = State::Terminated;
                    self.terminated = true;
                    Ok(vec![Action::Closed { reason: "subscription failed" }])
                }
            }
        }
    }

    /// Dispatch an inbound NOTIFY. Matching is dialog-key first, then a
    /// half-key match for an unestablished dialog (fork handling, spec.md
    /// §4.4); a NOTIFY matching neither is the caller's to ignore (it
    /// belongs to some other subscription).
    pub fn on_notify(&mut self, notify: &Notify) -> Result<Vec<Action>, Error> {
        let matches_full = self.dialog.key() == Some((notify.call_id.as_str(), notify.local_tag.as_str(), notify.remote_tag.as_str()));
        let matches_half = !self.dialog.is_established() && self.dialog.half_key() == (notify.call_id.as_str(), notify.local_tag.as_str());

        if !matches_full && !matches_half {
            return Ok(Vec::new());
        }
        if matches_half {
            self.dialog.establish(notify.remote_tag.clone(), Vec::new());
        }

        if notify.event != self.event {
            return Err(Error::Protocol("NOTIFY Event header does not match this subscription"));
        }

        match notify.subscription_state.state {
            SubState::Active | SubState::Pending => {
                self.subscribed = true;
                self.state = State::Active;
                let expires = notify.subscription_state.expires.unwrap_or(self.expires);
                self.expires = expires;
                Ok(vec![Action::ScheduleRefresh(refresh_delay(expires))])
            }
            SubState::Terminated => {
                self.state = State::Terminated;
                self.terminated = true;
                self.subscribed = false;
                Ok(vec![Action::Closed { reason: "terminated by notifier" }])
            }
        }
    }
}
