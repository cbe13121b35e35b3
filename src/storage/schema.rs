//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Receipts table schema.
#[derive(Iden)]
pub enum Receipts {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "code"]
    Code,
    #[iden = "establishment_id"]
    EstablishmentId,
    #[iden = "amount"]
    Amount,
    #[iden = "claimed"]
    Claimed,
    #[iden = "claimed_by"]
    ClaimedBy,
    #[iden = "claimed_at"]
    ClaimedAt,
    #[iden = "customer_phone"]
    CustomerPhone,
    #[iden = "metadata"]
    Metadata,
    #[iden = "created_at"]
    CreatedAt,
}

/// Point balances table schema.
#[derive(Iden)]
pub enum Balances {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "establishment_id"]
    EstablishmentId,
    #[iden = "amount"]
    Amount,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Points history table schema.
#[derive(Iden)]
pub enum PointsHistory {
    Table,
    #[iden = "seq"]
    Seq,
    #[iden = "kind"]
    Kind,
    #[iden = "amount"]
    Amount,
    #[iden = "user_id"]
    UserId,
    #[iden = "establishment_id"]
    EstablishmentId,
    #[iden = "receipt_id"]
    ReceiptId,
    #[iden = "description"]
    Description,
    #[iden = "balance_after"]
    BalanceAfter,
    #[iden = "created_at"]
    CreatedAt,
}

/// Subscriptions table schema.
#[derive(Iden)]
pub enum Subscriptions {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "plan"]
    Plan,
    #[iden = "status"]
    Status,
    #[iden = "start_date"]
    StartDate,
    #[iden = "end_date"]
    EndDate,
    #[iden = "auto_renew"]
    AutoRenew,
    #[iden = "trial_active"]
    TrialActive,
    #[iden = "trial_start"]
    TrialStart,
    #[iden = "trial_end"]
    TrialEnd,
    #[iden = "trial_used"]
    TrialUsed,
}

/// Usage counters table schema.
#[derive(Iden, Clone, Copy)]
pub enum UsageTracking {
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "voice_inputs"]
    VoiceInputs,
    #[iden = "voice_inputs_reset"]
    VoiceInputsReset,
    #[iden = "expenses"]
    Expenses,
    #[iden = "expenses_reset"]
    ExpensesReset,
    #[iden = "revenues"]
    Revenues,
    #[iden = "revenues_reset"]
    RevenuesReset,
    #[iden = "supervisors"]
    Supervisors,
    #[iden = "projects"]
    Projects,
    #[iden = "partners"]
    Partners,
}

/// SQL for creating the receipt and ledger tables.
pub const CREATE_LEDGER_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS receipts (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    establishment_id TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    claimed INTEGER NOT NULL DEFAULT 0,
    claimed_by TEXT,
    claimed_at TEXT,
    customer_phone TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_receipts_establishment ON receipts(establishment_id, created_at);

CREATE TABLE IF NOT EXISTS balances (
    user_id TEXT NOT NULL,
    establishment_id TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount >= 0),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, establishment_id)
);

CREATE TABLE IF NOT EXISTS points_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    user_id TEXT NOT NULL,
    establishment_id TEXT NOT NULL,
    receipt_id TEXT UNIQUE,
    description TEXT NOT NULL,
    balance_after INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_establishment ON points_history(establishment_id, created_at);
CREATE INDEX IF NOT EXISTS idx_history_pair ON points_history(user_id, establishment_id);
"#;

/// SQL for creating the subscriptions table.
pub const CREATE_SUBSCRIPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    user_id TEXT PRIMARY KEY,
    plan TEXT NOT NULL,
    status TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    auto_renew INTEGER NOT NULL DEFAULT 0,
    trial_active INTEGER NOT NULL DEFAULT 0,
    trial_start TEXT,
    trial_end TEXT,
    trial_used INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_end ON subscriptions(end_date);
CREATE INDEX IF NOT EXISTS idx_subscriptions_trial_end ON subscriptions(trial_end);
"#;

/// SQL for creating the usage counters table.
pub const CREATE_USAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS usage_tracking (
    user_id TEXT PRIMARY KEY,
    voice_inputs INTEGER NOT NULL DEFAULT 0,
    voice_inputs_reset TEXT NOT NULL,
    expenses INTEGER NOT NULL DEFAULT 0,
    expenses_reset TEXT NOT NULL,
    revenues INTEGER NOT NULL DEFAULT 0,
    revenues_reset TEXT NOT NULL,
    supervisors INTEGER NOT NULL DEFAULT 0,
    projects INTEGER NOT NULL DEFAULT 0,
    partners INTEGER NOT NULL DEFAULT 0
);
"#;
