/// A SIP dialog, identified by `(call-id, local-tag, remote-tag)` once
/// established; `remote_tag` is `None` until the peer's first 2xx arrives
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: Option<String>,
    pub local_cseq: u32,
    pub remote_cseq: u32,
    pub target_uri: String,
    pub local_uri: String,
    pub local_display: Option<String>,
    pub route_set: Vec<String>,
}

impl Dialog {
    /// A not-yet-established dialog targeted at `request_uri`: the initial
    /// SUBSCRIBE is sent there and the dialog fills in from whatever 2xx
    /// response establishes it.
    pub fn new_uac(call_id: String, local_tag: String, local_uri: String, request_uri: String) -> Self {
        Self {
            call_id,
            local_tag,
            remote_tag: None,
            local_cseq: 0,
            remote_cseq: 0,
            target_uri: request_uri,
            local_uri,
            local_display: None,
            route_set: Vec::new(),
        }
    }

    pub fn is_established(&self) -> bool {
        self.remote_tag.is_some()
    }

    /// Full dialog key once established.
    pub fn key(&self) -> Option<(&str, &str, &str)> {
        self.remote_tag.as_deref().map(|remote_tag| (self.call_id.as_str(), self.local_tag.as_str(), remote_tag))
    }

    /// Half key usable before the dialog is established, for fork handling:
    /// the first NOTIFY whose `(call-id, local-tag)` matches completes the
    /// dialog on this side (spec.md §4.4).
    pub fn half_key(&self) -> (&str, &str) {
        (self.call_id.as_str(), self.local_tag.as_str())
    }

    pub fn next_cseq(&mut self) -> u32 {
        self.local_cseq += 1;
        self.local_cseq
    }

    /// Fill remote-target/route-set/remote-tag from an establishing 2xx,
    /// per spec.md §4.4 ("if dialog is not yet established...").
    pub fn establish(&mut self, remote_tag: String, route_set: Vec<String>) {
        if self.remote_tag.is_none() {
            self.remote_tag = Some(remote_tag);
            self.route_set = route_set;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_none_until_established() {
        let dialog = Dialog::new_uac("cid".into(), "ltag".into(), "sip:a@x".into(), "sip:b@x".into());
        assert!(dialog.key().is_none());
        assert_eq!(dialog.half_key(), ("cid", "ltag"));
    }

    #[test]
    fn establish_fills_remote_tag_once() {
        let mut dialog = Dialog::new_uac("cid".into(), "ltag".into(), "sip:a@x".into(), "sip:b@x".into());
        dialog.establish("rtag".into(), vec!["sip:proxy".into()]);
        assert_eq!(dialog.key(), Some(("cid", "ltag", "rtag")));

        // a later 2xx (e.g. a retransmitted one) must not overwrite an
        // already-established dialog.
        dialog.establish("other-rtag".into(), Vec::new());
        assert_eq!(dialog.key(), Some(("cid", "ltag", "rtag")));
    }
}
