use std::collections::VecDeque;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::client::{BrokerClient, TextRows};
use crate::{Error, Result};

/// In-memory [`BrokerClient`] that records every statement and replays
/// canned results.
///
/// - statements containing a registered failure marker return an error;
/// - receive statements (`WAITFOR`) pop queued messages, then come back empty;
/// - other queries return the rows registered for a matching prefix, or none.
pub struct MockBrokerClient {
    statements: Vec<String>,
    query_results: Vec<(String, TextRows)>,
    messages: VecDeque<(String, String)>,
    failures: Vec<String>,
    polls: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
            query_results: Vec::new(),
            messages: VecDeque::new(),
            failures: Vec::new(),
            polls: 0,
            cancel_after: None,
        }
    }

    pub fn with_query_result(mut self, prefix: &str, rows: TextRows) -> Self {
        self.query_results.push((prefix.to_string(), rows));
        self
    }

    pub fn with_message(mut self, message_type: &str, body: &str) -> Self {
        self.messages
            .push_back((message_type.to_string(), body.to_string()));
        self
    }

    pub fn fail_on(mut self, marker: &str) -> Self {
        self.failures.push(marker.to_string());
        self
    }

    /// Cancel `token` once `polls` receive statements have been issued.
    pub fn cancel_after_polls(mut self, polls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((polls, token));
        self
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    fn record(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        match self.failures.iter().find(|marker| sql.contains(marker.as_str())) {
            Some(marker) => Err(Error::Connection(format!("mock failure on {}", marker))),
            None => Ok(()),
        }
    }

    fn poll(&mut self) -> TextRows {
        self.polls += 1;
        if let Some((limit, token)) = &self.cancel_after {
            if self.polls >= *limit {
                token.cancel();
            }
        }

        match self.messages.pop_front() {
            Some((message_type, body)) => vec![vec![Some(message_type), Some(body)]],
            None => Vec::new(),
        }
    }
}

impl Default for MockBrokerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.record(sql)
    }

    async fn query(&mut self, sql: &str) -> Result<TextRows> {
        self.record(sql)?;

        if sql.contains("WAITFOR") {
            return Ok(self.poll());
        }

        let rows = self
            .query_results
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(rows)
    }
}
