//! In-process doubles for the source and reporter seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::report::{ChannelPayload, ChannelReporter, ReportError};
use crate::source::{SensorSource, SourceError};

/// Answers queries from a script; an exhausted script answers "".
pub struct ScriptedSource {
    responses: VecDeque<String>,
    queries: Vec<Vec<u8>>,
}

impl ScriptedSource {
    pub fn new<I, T>(responses: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            queries: Vec::new(),
        }
    }

    pub fn queries(&self) -> Vec<Vec<u8>> {
        self.queries.clone()
    }
}

impl SensorSource for ScriptedSource {
    async fn query(&mut self, query: &[u8]) -> Result<String, SourceError> {
        self.queries.push(query.to_vec());
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    fn describe(&self) -> String {
        "scripted source".to_string()
    }
}

pub enum Behaviour {
    Accept,
    Reject,
    Hang,
}

/// Records payloads and answers according to `behaviour`.
pub struct MockReporter {
    behaviour: Behaviour,
    sent: Mutex<Vec<ChannelPayload>>,
}

impl MockReporter {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<ChannelPayload> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChannelReporter for MockReporter {
    async fn update(&self, payload: &ChannelPayload) -> Result<String, ReportError> {
        let id = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(payload.clone());
            sent.len()
        };
        match self.behaviour {
            Behaviour::Accept => Ok(id.to_string()),
            Behaviour::Reject => Err(ReportError::Rejected),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(id.to_string())
            }
        }
    }
}
