//! In-memory receipt and points storage.
//!
//! Receipts, balances and history live behind one mutex so a claim and its
//! credit are applied together or not at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::identifier::ReceiptCode;
use crate::interfaces::{PointsStore, ReceiptStore, Result};
use crate::model::{
    Balance, ClaimOutcome, Credit, Debit, DebitOutcome, EstablishmentId, HistoryEntry,
    HistoryFilter, HistoryKind, Page, PageRequest, Receipt, ReceiptFilter, UserId, MAX_POINTS,
};

type BalanceKey = (UserId, EstablishmentId);

#[derive(Default)]
struct LedgerState {
    /// Insertion order doubles as creation order.
    receipts: Vec<Receipt>,
    by_code: HashMap<ReceiptCode, usize>,
    balances: HashMap<BalanceKey, Balance>,
    history: Vec<HistoryEntry>,
}

impl LedgerState {
    /// Compute the balance and history entry a credit would produce.
    fn prepare_credit(&self, credit: &Credit, now: DateTime<Utc>) -> Result<(Balance, HistoryEntry)> {
        let key = (credit.user_id, credit.establishment_id);
        let current = self.balances.get(&key).map_or(0, |b| b.amount);
        let amount = current
            .checked_add(credit.amount)
            .filter(|sum| *sum <= MAX_POINTS)
            .ok_or_else(|| {
                StorageError::Unsupported(format!(
                    "balance {current} + {} exceeds storage range",
                    credit.amount
                ))
            })?;

        let balance = Balance {
            user_id: credit.user_id,
            establishment_id: credit.establishment_id,
            amount,
            updated_at: now,
        };
        let entry = HistoryEntry {
            kind: HistoryKind::Earned,
            amount: credit.amount,
            user_id: credit.user_id,
            establishment_id: credit.establishment_id,
            receipt_id: credit.receipt_id,
            description: credit.description.clone(),
            balance_after: amount,
            created_at: now,
        };
        Ok((balance, entry))
    }

    fn commit(&mut self, balance: Balance, entry: HistoryEntry) {
        self.balances
            .insert((balance.user_id, balance.establishment_id), balance);
        self.history.push(entry);
    }
}

/// In-memory implementation of both [`ReceiptStore`] and [`PointsStore`].
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    fail_on_credit: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every credit (including the one inside a claim) fail with
    /// `StorageError::Unsupported` before anything is written.
    pub fn set_fail_on_credit(&self, fail: bool) {
        self.fail_on_credit.store(fail, Ordering::SeqCst);
    }

    fn check_credit_allowed(&self) -> Result<()> {
        if self.fail_on_credit.load(Ordering::SeqCst) {
            return Err(StorageError::Unsupported("credit disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReceiptStore for MemoryLedger {
    async fn insert(&self, receipt: &Receipt) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.by_code.contains_key(&receipt.code) {
            return Err(StorageError::DuplicateIdentifier(receipt.code.to_string()));
        }
        let index = state.receipts.len();
        state.by_code.insert(receipt.code.clone(), index);
        state.receipts.push(receipt.clone());
        Ok(())
    }

    async fn code_exists(&self, code: &ReceiptCode) -> Result<bool> {
        Ok(self.state.lock().await.by_code.contains_key(code))
    }

    async fn find(
        &self,
        code: &ReceiptCode,
        establishment_id: EstablishmentId,
    ) -> Result<Option<Receipt>> {
        let state = self.state.lock().await;
        Ok(state
            .by_code
            .get(code)
            .map(|&i| &state.receipts[i])
            .filter(|r| r.establishment_id == establishment_id)
            .cloned())
    }

    async fn claim(
        &self,
        code: &ReceiptCode,
        establishment_id: EstablishmentId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let mut state = self.state.lock().await;

        let index = match state.by_code.get(code) {
            Some(&i) if state.receipts[i].establishment_id == establishment_id => i,
            _ => return Ok(ClaimOutcome::NotFound),
        };
        let mut receipt = state.receipts[index].clone();
        if !receipt.mark_claimed(user_id, now) {
            return Ok(ClaimOutcome::AlreadyClaimed(receipt));
        }

        let credit = Credit {
            user_id,
            establishment_id,
            amount: receipt.amount,
            receipt_id: Some(receipt.id),
            description: format!("Claimed receipt {code}"),
        };
        self.check_credit_allowed()?;
        let (balance, entry) = state.prepare_credit(&credit, now)?;

        state.receipts[index] = receipt.clone();
        state.commit(balance.clone(), entry);
        Ok(ClaimOutcome::Claimed { receipt, balance })
    }

    async fn list(
        &self,
        establishment_id: EstablishmentId,
        filter: ReceiptFilter,
        page: PageRequest,
    ) -> Result<Page<Receipt>> {
        let state = self.state.lock().await;
        let mut matching: Vec<Receipt> = state
            .receipts
            .iter()
            .rev()
            .filter(|r| r.establishment_id == establishment_id && r.matches(&filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_sorted(matching, page))
    }
}

#[async_trait]
impl PointsStore for MemoryLedger {
    async fn credit(&self, credit: Credit, now: DateTime<Utc>) -> Result<Balance> {
        let mut state = self.state.lock().await;
        self.check_credit_allowed()?;
        let (balance, entry) = state.prepare_credit(&credit, now)?;
        state.commit(balance.clone(), entry);
        Ok(balance)
    }

    async fn debit(&self, debit: Debit, now: DateTime<Utc>) -> Result<DebitOutcome> {
        let mut state = self.state.lock().await;
        let key = (debit.user_id, debit.establishment_id);
        let available = state.balances.get(&key).map_or(0, |b| b.amount);
        if available < debit.amount {
            return Ok(DebitOutcome::Insufficient { available });
        }

        let amount = available - debit.amount;
        let balance = Balance {
            user_id: debit.user_id,
            establishment_id: debit.establishment_id,
            amount,
            updated_at: now,
        };
        let entry = HistoryEntry {
            kind: HistoryKind::Deducted,
            amount: debit.amount,
            user_id: debit.user_id,
            establishment_id: debit.establishment_id,
            receipt_id: None,
            description: debit.description,
            balance_after: amount,
            created_at: now,
        };
        state.commit(balance.clone(), entry);
        Ok(DebitOutcome::Debited(balance))
    }

    async fn balance(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Option<Balance>> {
        let state = self.state.lock().await;
        Ok(state.balances.get(&(user_id, establishment_id)).cloned())
    }

    async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>> {
        let state = self.state.lock().await;
        let mut balances: Vec<Balance> = state
            .balances
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        balances.sort_by_key(|b| b.establishment_id);
        Ok(balances)
    }

    async fn history(
        &self,
        establishment_id: EstablishmentId,
        filter: HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>> {
        let state = self.state.lock().await;
        let mut matching: Vec<HistoryEntry> = state
            .history
            .iter()
            .rev()
            .filter(|e| e.establishment_id == establishment_id && e.matches(&filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_sorted(matching, page))
    }

    async fn pair_history(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Vec<HistoryEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|e| e.user_id == user_id && e.establishment_id == establishment_id)
            .cloned()
            .collect())
    }
}
