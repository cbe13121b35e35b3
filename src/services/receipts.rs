//! Receipt issuance and claiming.

use std::sync::Arc;

use backon::Retryable;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::identifier::{self, ReceiptCode};
use crate::interfaces::ReceiptStore;
use crate::model::{
    ClaimOutcome, ClaimResult, EstablishmentId, IssueReceipt, IssuedReceipt, Page, PageRequest,
    Receipt, ReceiptFilter, UserId, MAX_POINTS,
};
use crate::utils::retry::{conflict_backoff, retry_on_conflict};

/// Issues receipts for establishments and lets users claim them.
///
/// A claim marks the receipt and credits the claimant's balance in one
/// storage unit of work; see [`ReceiptStore::claim`].
pub struct ReceiptService {
    receipts: Arc<dyn ReceiptStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl ReceiptService {
    pub fn new(receipts: Arc<dyn ReceiptStore>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            receipts,
            clock,
            config,
        }
    }

    /// Issue a new unclaimed receipt worth `input.amount` points.
    ///
    /// Fails with `Validation` for a zero amount and `Exhausted` when no
    /// unused identifier turns up within the configured attempts.
    pub async fn issue(
        &self,
        establishment_id: EstablishmentId,
        input: IssueReceipt,
    ) -> Result<IssuedReceipt> {
        if input.amount == 0 {
            return Err(Error::validation("amount must be a positive integer"));
        }
        if input.amount > MAX_POINTS {
            return Err(Error::validation(format!(
                "amount must not exceed {MAX_POINTS}"
            )));
        }
        let customer_phone = input
            .customer_phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .map(str::to_string);

        // An insert can still lose the race for a code that looked free;
        // that surfaces as a retryable storage error and restarts the draw.
        let issue_once = || self.issue_once(establishment_id, &input, customer_phone.clone());
        let receipt = issue_once
            .retry(conflict_backoff())
            .when(Error::is_retryable)
            .notify(|err: &Error, delay| {
                warn!(%establishment_id, error = %err, ?delay, "Retrying receipt issuance");
            })
            .await?;

        info!(
            %establishment_id,
            receipt_id = %receipt.id,
            code = %receipt.code,
            amount = receipt.amount,
            "Receipt issued"
        );
        Ok(IssuedReceipt::from(&receipt))
    }

    async fn issue_once(
        &self,
        establishment_id: EstablishmentId,
        input: &IssueReceipt,
        customer_phone: Option<String>,
    ) -> Result<Receipt> {
        let code = identifier::generate_unique(self.config.identifier_attempts, |candidate| async move {
            self.receipts
                .code_exists(&candidate)
                .await
                .map_err(Error::from)
        })
        .await?;

        let receipt = Receipt::new(
            code,
            establishment_id,
            input.amount,
            customer_phone,
            input.metadata.clone(),
            self.clock.now(),
        );
        self.receipts.insert(&receipt).await?;
        Ok(receipt)
    }

    /// Claim a receipt for `user_id`, crediting its amount to their balance
    /// at the issuing establishment.
    pub async fn claim(
        &self,
        establishment_id: EstablishmentId,
        identifier: &str,
        user_id: UserId,
    ) -> Result<ClaimResult> {
        let code = ReceiptCode::parse(identifier).map_err(Error::Validation)?;
        let now = self.clock.now();

        let outcome = retry_on_conflict("claim_receipt", || {
            self.receipts.claim(&code, establishment_id, user_id, now)
        })
        .await?;

        match outcome {
            ClaimOutcome::Claimed { receipt, balance } => {
                info!(
                    %establishment_id,
                    %user_id,
                    code = %code,
                    points = receipt.amount,
                    balance = balance.amount,
                    "Receipt claimed"
                );
                Ok(ClaimResult {
                    points_added: receipt.amount,
                    total_points: balance.amount,
                    receipt,
                })
            }
            ClaimOutcome::NotFound => Err(Error::NotFound(format!("receipt {code}"))),
            ClaimOutcome::AlreadyClaimed(receipt) => {
                debug!(code = %code, claimed_by = ?receipt.claimed_by, "Receipt already claimed");
                Err(Error::AlreadyClaimed {
                    identifier: code.to_string(),
                })
            }
        }
    }

    /// Look up a receipt without changing it.
    pub async fn get(&self, establishment_id: EstablishmentId, identifier: &str) -> Result<Receipt> {
        let code = ReceiptCode::parse(identifier).map_err(Error::Validation)?;
        self.receipts
            .find(&code, establishment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("receipt {code}")))
    }

    /// An establishment's receipts, newest first.
    pub async fn list(
        &self,
        establishment_id: EstablishmentId,
        filter: ReceiptFilter,
        page: PageRequest,
    ) -> Result<Page<Receipt>> {
        let page = page.normalized(self.config.max_page_size);
        debug!(%establishment_id, page = page.page, limit = page.limit, "Listing receipts");
        Ok(self.receipts.list(establishment_id, filter, page).await?)
    }

    /// First page at the configured default size.
    pub fn first_page(&self) -> PageRequest {
        PageRequest::new(1, self.config.default_page_size)
    }
}
