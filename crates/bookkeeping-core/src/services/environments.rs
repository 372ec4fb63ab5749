// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment use cases.

use std::sync::Arc;

use tracing::info;

use crate::commands::{EnvironmentUpdate, NewEnvironment, Page, Paginated};
use crate::error::{CoreError, Result};
use crate::model::{Environment, RunReference};
use crate::persistence::{EnvironmentRecord, Persistence};

use super::history_item_from_record;

#[derive(Clone)]
pub struct EnvironmentService {
    persistence: Arc<dyn Persistence>,
}

impl EnvironmentService {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Register an environment. Its initial status opens the history.
    pub async fn create(&self, environment: &NewEnvironment) -> Result<Environment> {
        if self
            .persistence
            .get_environment(&environment.id)
            .await?
            .is_some()
        {
            return Err(CoreError::EnvironmentAlreadyExists {
                environment_id: environment.id.clone(),
            });
        }
        self.persistence.insert_environment(environment).await?;
        info!(
            environment_id = %environment.id,
            status = %environment.status,
            "Environment created"
        );
        self.get(&environment.id).await
    }

    pub async fn update(&self, id: &str, update: &EnvironmentUpdate) -> Result<Environment> {
        self.persistence.update_environment(id, update).await?;
        if let Some(status) = update.status {
            info!(environment_id = %id, %status, "Environment status updated");
        }
        self.get(id).await
    }

    /// Environment with its history and run references.
    pub async fn get(&self, id: &str) -> Result<Environment> {
        let record = self
            .persistence
            .get_environment(id)
            .await?
            .ok_or_else(|| CoreError::EnvironmentNotFound {
                environment_id: id.to_string(),
            })?;
        self.hydrate(record).await
    }

    /// Environments, most recently created first.
    pub async fn list(&self, page: &Page) -> Result<Paginated<Environment>> {
        let total_count = self.persistence.count_environments().await?;
        let records = self.persistence.list_environments(page).await?;
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            items.push(self.hydrate(record).await?);
        }
        Ok(Paginated {
            items,
            total_count,
            page_count: page.page_count(total_count),
        })
    }

    async fn hydrate(&self, record: EnvironmentRecord) -> Result<Environment> {
        let history = self
            .persistence
            .list_environment_history(&record.id)
            .await?
            .into_iter()
            .map(history_item_from_record)
            .collect::<Result<Vec<_>>>()?;
        let runs = self
            .persistence
            .list_environment_run_numbers(&record.id)
            .await?
            .into_iter()
            .map(|run_number| RunReference { run_number })
            .collect();

        Ok(Environment {
            status: record.status.parse()?,
            id: record.id,
            status_message: record.status_message,
            toredown_at: record.toredown_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
            runs,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::NewRun;
    use crate::model::EnvironmentStatus;
    use crate::services::{RunService, test_support};

    fn standby(id: &str) -> NewEnvironment {
        NewEnvironment {
            id: id.to_string(),
            status: EnvironmentStatus::Standby,
            status_message: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let persistence = test_support::persistence().await;
        let service = EnvironmentService::new(persistence.clone());
        let runs = RunService::new(persistence);

        service.create(&standby("env-1")).await.unwrap();
        runs.create(&NewRun {
            run_number: 10,
            environment_id: Some("env-1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

        let environment = service.get("env-1").await.unwrap();
        assert_eq!(environment.status, EnvironmentStatus::Standby);
        assert_eq!(environment.runs, vec![RunReference { run_number: 10 }]);
        assert_eq!(environment.history.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_environment() {
        let service = EnvironmentService::new(test_support::persistence().await);
        service.create(&standby("env-1")).await.unwrap();
        assert!(matches!(
            service.create(&standby("env-1")).await,
            Err(CoreError::EnvironmentAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_update_appends_history() {
        let service = EnvironmentService::new(test_support::persistence().await);
        service.create(&standby("env-1")).await.unwrap();

        let environment = service
            .update(
                "env-1",
                &EnvironmentUpdate {
                    status: Some(EnvironmentStatus::Running),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(environment.status, EnvironmentStatus::Running);
        assert_eq!(environment.history.len(), 2);
        assert_eq!(environment.history[1].status, EnvironmentStatus::Running);
    }

    #[tokio::test]
    async fn test_update_unknown_environment() {
        let service = EnvironmentService::new(test_support::persistence().await);
        let err = service
            .update("missing", &EnvironmentUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Environment with this id (missing) could not be found"
        );
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let service = EnvironmentService::new(test_support::persistence().await);
        for id in ["a", "b", "c"] {
            service.create(&standby(id)).await.unwrap();
        }
        let page = service.list(&Page { offset: 0, limit: 2 }).await.unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.page_count, 2);
        assert_eq!(page.items.len(), 2);
    }
}
