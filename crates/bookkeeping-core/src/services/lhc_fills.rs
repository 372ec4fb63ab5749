// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LHC fill use cases.

use std::sync::Arc;

use tracing::info;

use crate::commands::{LhcFillUpdate, NewLhcFill, Page, Paginated};
use crate::error::{CoreError, Result};
use crate::model::{LhcFill, LhcFillWithRuns, Run};
use crate::persistence::Persistence;

use super::RunService;

#[derive(Clone)]
pub struct LhcFillService {
    persistence: Arc<dyn Persistence>,
    runs: RunService,
}

impl LhcFillService {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        let runs = RunService::new(persistence.clone());
        Self { persistence, runs }
    }

    pub async fn create(&self, fill: &NewLhcFill) -> Result<LhcFill> {
        if self
            .persistence
            .get_lhc_fill(fill.fill_number)
            .await?
            .is_some()
        {
            return Err(CoreError::LhcFillAlreadyExists {
                fill_number: fill.fill_number,
            });
        }
        self.persistence.insert_lhc_fill(fill).await?;
        info!(fill_number = fill.fill_number, "LHC fill created");
        self.find(fill.fill_number).await
    }

    pub async fn update(&self, fill_number: i64, update: &LhcFillUpdate) -> Result<LhcFill> {
        self.find(fill_number).await?;
        self.persistence.update_lhc_fill(fill_number, update).await?;
        info!(fill_number, "LHC fill updated");
        self.find(fill_number).await
    }

    /// A fill with its runs. Runs are only exposed once the fill reached
    /// stable beams.
    pub async fn get(&self, fill_number: i64) -> Result<LhcFillWithRuns> {
        let fill = self.find(fill_number).await?;
        let runs = self.visible_runs(&fill).await?;
        Ok(LhcFillWithRuns { fill, runs })
    }

    /// Fills, highest fill number first, each with its runs.
    pub async fn list(&self, page: &Page) -> Result<Paginated<LhcFillWithRuns>> {
        let total_count = self.persistence.count_lhc_fills().await?;
        let records = self.persistence.list_lhc_fills(page).await?;
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let fill = LhcFill::from(record);
            let runs = self.visible_runs(&fill).await?;
            items.push(LhcFillWithRuns { fill, runs });
        }
        Ok(Paginated {
            items,
            total_count,
            page_count: page.page_count(total_count),
        })
    }

    /// Runs of a fill; empty until the fill reached stable beams.
    pub async fn runs(&self, fill_number: i64) -> Result<Vec<Run>> {
        let fill = self.find(fill_number).await?;
        self.visible_runs(&fill).await
    }

    async fn visible_runs(&self, fill: &LhcFill) -> Result<Vec<Run>> {
        if fill.has_stable_beams() {
            self.runs.list_for_fill(fill.fill_number).await
        } else {
            Ok(Vec::new())
        }
    }

    async fn find(&self, fill_number: i64) -> Result<LhcFill> {
        self.persistence
            .get_lhc_fill(fill_number)
            .await?
            .map(LhcFill::from)
            .ok_or(CoreError::LhcFillNotFound { fill_number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::NewRun;
    use crate::services::test_support;
    use chrono::{Duration, Utc};

    async fn services() -> (LhcFillService, RunService) {
        let persistence = test_support::persistence().await;
        (
            LhcFillService::new(persistence.clone()),
            RunService::new(persistence),
        )
    }

    #[tokio::test]
    async fn test_runs_hidden_without_stable_beams() {
        let (fills, runs) = services().await;
        fills
            .create(&NewLhcFill {
                fill_number: 7,
                ..Default::default()
            })
            .await
            .unwrap();
        runs.create(&NewRun {
            run_number: 1,
            fill_number: Some(7),
            ..Default::default()
        })
        .await
        .unwrap();

        let fill = fills.get(7).await.unwrap();
        assert!(fill.runs.is_empty());
        assert!(fills.runs(7).await.unwrap().is_empty());

        let start = Utc::now() - Duration::hours(1);
        let updated = fills
            .update(
                7,
                &LhcFillUpdate {
                    stable_beams_start: Some(start),
                    stable_beams_end: Some(start + Duration::minutes(30)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.stable_beams_duration, Some(1800));

        let fill = fills.get(7).await.unwrap();
        assert_eq!(fill.runs.len(), 1);
        assert_eq!(fill.runs[0].run_number, 1);
        let runs = fills.runs(7).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_number, 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_fill() {
        let (fills, _) = services().await;
        let fill = NewLhcFill {
            fill_number: 1,
            ..Default::default()
        };
        fills.create(&fill).await.unwrap();
        assert_eq!(
            fills.create(&fill).await.unwrap_err(),
            CoreError::LhcFillAlreadyExists { fill_number: 1 }
        );
        assert_eq!(
            fills
                .update(2, &LhcFillUpdate::default())
                .await
                .unwrap_err()
                .to_string(),
            "LhcFill with this number (2) could not be found"
        );
    }

    #[tokio::test]
    async fn test_list_orders_by_fill_number() {
        let (fills, _) = services().await;
        for fill_number in [3, 1, 2] {
            fills
                .create(&NewLhcFill {
                    fill_number,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let page = fills.list(&Page::default()).await.unwrap();
        let numbers: Vec<_> = page.items.iter().map(|item| item.fill.fill_number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(page.total_count, 3);
    }
}
