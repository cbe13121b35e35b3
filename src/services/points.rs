//! Point deductions, balances and history.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::interfaces::PointsStore;
use crate::model::{
    Balance, Debit, DebitOutcome, DeductPoints, DeductResult, EstablishmentId, HistoryEntry,
    HistoryFilter, Page, PageRequest, Reconciliation, UserId, MAX_POINTS,
};
use crate::utils::retry::retry_on_conflict;

/// History description when the establishment gives none.
pub const DEFAULT_DEDUCT_DESCRIPTION: &str = "Points deducted";

pub struct PointsService {
    points: Arc<dyn PointsStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl PointsService {
    pub fn new(points: Arc<dyn PointsStore>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            points,
            clock,
            config,
        }
    }

    /// Debit `input.points` from a user's balance at `establishment_id`.
    ///
    /// The balance is never driven negative: a deduction larger than the
    /// balance fails with `InsufficientPoints` and changes nothing.
    pub async fn deduct(
        &self,
        establishment_id: EstablishmentId,
        input: DeductPoints,
    ) -> Result<DeductResult> {
        if input.points == 0 {
            return Err(Error::validation("points must be a positive integer"));
        }
        if input.points > MAX_POINTS {
            return Err(Error::validation(format!(
                "points must not exceed {MAX_POINTS}"
            )));
        }

        let debit = Debit {
            user_id: input.user_id,
            establishment_id,
            amount: input.points,
            description: input
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DEDUCT_DESCRIPTION.to_string()),
        };
        let now = self.clock.now();

        let outcome =
            retry_on_conflict("deduct_points", || self.points.debit(debit.clone(), now)).await?;

        match outcome {
            DebitOutcome::Debited(balance) => {
                info!(
                    %establishment_id,
                    user_id = %input.user_id,
                    points = input.points,
                    remaining = balance.amount,
                    "Points deducted"
                );
                Ok(DeductResult {
                    points_deducted: input.points,
                    remaining_points: balance.amount,
                })
            }
            DebitOutcome::Insufficient { available } => {
                debug!(
                    %establishment_id,
                    user_id = %input.user_id,
                    available,
                    requested = input.points,
                    "Deduction rejected"
                );
                Err(Error::InsufficientPoints {
                    available,
                    requested: input.points,
                })
            }
        }
    }

    /// Current balance; zero when the user never earned here.
    pub async fn balance(&self, user_id: UserId, establishment_id: EstablishmentId) -> Result<u64> {
        Ok(self
            .points
            .balance(user_id, establishment_id)
            .await?
            .map_or(0, |b| b.amount))
    }

    /// Every balance the user holds, ordered by establishment.
    pub async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>> {
        Ok(self.points.balances_for_user(user_id).await?)
    }

    /// Establishment history, newest first.
    pub async fn history_for(
        &self,
        establishment_id: EstablishmentId,
        filter: HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>> {
        let page = page.normalized(self.config.max_page_size);
        Ok(self.points.history(establishment_id, filter, page).await?)
    }

    /// One user's history at one establishment, oldest first.
    pub async fn user_history(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Vec<HistoryEntry>> {
        Ok(self.points.pair_history(user_id, establishment_id).await?)
    }

    /// Fold the history and compare it with the stored balance.
    pub async fn reconcile(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Reconciliation> {
        let balance = self.balance(user_id, establishment_id).await?;
        let history = self.user_history(user_id, establishment_id).await?;
        let reconciliation = Reconciliation::from_history(balance, &history);
        if !reconciliation.is_consistent() {
            warn!(
                %user_id,
                %establishment_id,
                balance,
                history_sum = %reconciliation.history_sum,
                "Balance does not match history"
            );
        }
        Ok(reconciliation)
    }
}
