use std::time::Duration;

use serde::Deserialize;

use super::{ChoreApi, ClientError};
use crate::db::{Chore, ChorePage, ChorePatch, ListQuery, NewChore};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`ChoreApi`] over the REST surface, authenticated with a bearer token.
pub struct HttpChoreApi {
    base_url: String,
    authorization: String,
    agent: ureq::Agent,
}

impl HttpChoreApi {
    pub fn new(base_url: &str, token: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: format!("Bearer {}", token),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/chores{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &self.url(path))
            .set("Authorization", &self.authorization)
    }
}

fn map_error(err: ureq::Error) -> ClientError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("HTTP {}", status));
            ClientError::Api { status, message }
        }
        ureq::Error::Transport(transport) => ClientError::Transport(transport.to_string()),
    }
}

impl ChoreApi for HttpChoreApi {
    fn list(&self, query: &ListQuery) -> Result<ChorePage, ClientError> {
        let mut request = self
            .request("GET", "")
            .query("page", &query.page.to_string())
            .query("limit", &query.limit.to_string());
        if let Some(status) = query.filters.status {
            request = request.query("status", status.as_str());
        }
        if let Some(q) = query.filters.query.as_deref() {
            request = request.query("q", q);
        }
        let response = request.call().map_err(map_error)?;
        Ok(response.into_json()?)
    }

    fn create(&self, chore: &NewChore) -> Result<Chore, ClientError> {
        let response = self.request("POST", "").send_json(chore).map_err(map_error)?;
        Ok(response.into_json()?)
    }

    fn update(&self, id: i64, patch: &ChorePatch) -> Result<Chore, ClientError> {
        let response = self
            .request("PUT", &format!("/{}", id))
            .send_json(patch)
            .map_err(map_error)?;
        Ok(response.into_json()?)
    }

    fn delete(&self, id: i64) -> Result<(), ClientError> {
        self.request("DELETE", &format!("/{}", id))
            .call()
            .map_err(map_error)?;
        Ok(())
    }
}
