// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the experiment control system.
//!
//! The control system exposes the environments it currently manages, each
//! with the run it is taking, as `{ "environments": [{ "id",
//! "currentRunNumber" }] }`.

use std::time::Duration;

use async_trait::async_trait;
use bookkeeping_core::reconciliation::ControlSystemSnapshot;
use tracing::debug;

use crate::error::{Error, Result};

/// Source of the environments known to the control system.
#[async_trait]
pub trait EnvironmentStatusSource: Send + Sync {
    /// Fetch the current list of live environments.
    async fn snapshot(&self) -> Result<ControlSystemSnapshot>;
}

/// [`EnvironmentStatusSource`] backed by the control system's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpControlSystemClient {
    client: reqwest::Client,
    url: String,
}

impl HttpControlSystemClient {
    /// Create a client querying `url` with the given request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EnvironmentStatusSource for HttpControlSystemClient {
    async fn snapshot(&self) -> Result<ControlSystemSnapshot> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ExternalSystemUnavailable(format!(
                "Control system responded with status code {}",
                status.as_u16()
            )));
        }

        let snapshot: ControlSystemSnapshot = response.json().await?;
        debug!(
            environments = snapshot.environments.len(),
            "Fetched control system snapshot"
        );
        Ok(snapshot)
    }
}
