use crate::amf0::Value;
use std::collections::HashMap;

/// An AMF command begins `(name, transaction_id, body...)` (spec.md §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub body: Vec<Value>,
}

/// Allocates outbound transaction ids and matches inbound `_result`/`_error`
/// replies back to the caller that sent the original command. `0` is
/// reserved for fire-and-forget commands and is never allocated here.
pub struct CommandTable {
    next_id: u64,
    pending: HashMap<u64, u64>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self { next_id: 1, pending: HashMap::new() }
    }

    /// Allocate a transaction id for an outbound command expecting a reply,
    /// returning it alongside an opaque completion token for the caller.
    pub fn begin(&mut self) -> (f64, u64) {
        let tid = self.next_id;
        self.next_id += 1;
        let completion = tid;
        self.pending.insert(tid, completion);
        (tid as f64, completion)
    }

    /// `name == "_result"` or `"_error"`: look the transaction id up and
    /// complete it. Any other inbound command name (`onStatus`, `play`,
    /// application-defined names) is not a reply and is routed by the
    /// caller directly to its status/command handler instead.
    pub fn complete(&mut self, transaction_id: f64) -> Option<u64> {
        if transaction_id.fract() != 0.0 || transaction_id < 0.0 {
            return None;
        }
        self.pending.remove(&(transaction_id as u64))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_reply_name(name: &str) -> bool {
    name == "_result" || name == "_error"
}

/// Parse `(name, transaction-id, body...)` out of a decoded AMF0 value list.
pub fn parse(values: Vec<Value>) -> Option<Command> {
    let mut iter = values.into_iter();
    let name = match iter.next()? {
        Value::String(s) => s,
        _ => return None,
    };
    let transaction_id = match iter.next()? {
        Value::Number(n) => n,
        _ => return None,
    };
    Some(Command { name, transaction_id, body: iter.collect() })
}

pub fn encode(command: &Command) -> Vec<Value> {
    let mut values = vec![Value::String(command.name.clone()), Value::Number(command.transaction_id)];
    values.extend(command.body.clone());
    values
}
