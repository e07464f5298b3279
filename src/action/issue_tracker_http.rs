//! A `reqwest`-backed `IssueTracker`, feature-gated behind
//! `issue-tracker-http`. This is the one concrete transport the runtime
//! ships; real deployments are expected to supply their own `IssueTracker`
//! impl for their tracker of choice.

use async_trait::async_trait;
use serde_json::json;

use crate::action::handlers::IssueTracker;

pub struct HttpIssueTracker {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpIssueTracker {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn issue_url(&self, issue: u64) -> String {
        format!("{}/issues/{issue}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl IssueTracker for HttpIssueTracker {
    async fn comment(&self, issue: u64, body: &str) -> Result<(), String> {
        self.client
            .post(format!("{}/comments", self.issue_url(issue)))
            .bearer_auth(&self.token)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn set_label(&self, issue: u64, label: &str) -> Result<(), String> {
        self.client
            .post(format!("{}/labels", self.issue_url(issue)))
            .bearer_auth(&self.token)
            .json(&json!({ "labels": [label] }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn close(&self, issue: u64) -> Result<(), String> {
        self.client
            .patch(self.issue_url(issue))
            .bearer_auth(&self.token)
            .json(&json!({ "state": "closed" }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
