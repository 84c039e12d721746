use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One usage event captured by [`Client::record`](crate::Client::record).
///
/// Fields are read-only once constructed. `data` is an arbitrary JSON value
/// supplied by the host application and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    event_name: String,
    agent_id: String,
    customer_id: String,
    #[serde(default)]
    data: Value,
}

impl Signal {
    pub fn new(
        agent_id: impl Into<String>,
        customer_id: impl Into<String>,
        event_name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            agent_id: agent_id.into(),
            customer_id: customer_id.into(),
            data,
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}
