//! PostgreSQL schema
//!
//! Amounts are `NUMERIC(30, 8)`, ids are ULID strings or trading logins.
//! Status and kind columns hold the `i16` ids of the Rust enums.

pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts_tb (
    account_id   BIGINT PRIMARY KEY,
    client_id    BIGINT NOT NULL,
    account_type SMALLINT NOT NULL,
    currency     VARCHAR(3) NOT NULL,
    leverage     INTEGER NOT NULL,
    status       SMALLINT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions_tb (
    transaction_id     VARCHAR(26) PRIMARY KEY,
    kind               SMALLINT NOT NULL,
    status             SMALLINT NOT NULL,
    account_id         BIGINT NOT NULL REFERENCES accounts_tb (account_id),
    counter_account_id BIGINT REFERENCES accounts_tb (account_id),
    accrual_id         VARCHAR(26),
    amount             NUMERIC(30, 8) NOT NULL CHECK (amount > 0),
    currency           VARCHAR(3) NOT NULL,
    method             VARCHAR(64) NOT NULL,
    details            TEXT,
    idempotency_key    VARCHAR(128),
    actor_id           VARCHAR(128),
    reason             TEXT,
    created_at         TIMESTAMPTZ NOT NULL,
    updated_at         TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_TRANSACTIONS_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_status
    ON transactions_tb (account_id, kind, status)
"#;

pub const CREATE_TRANSACTIONS_UPDATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_updated_at
    ON transactions_tb (updated_at)
"#;

pub const CREATE_LEDGER_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries_tb (
    entry_id       VARCHAR(26) PRIMARY KEY,
    seq            BIGSERIAL UNIQUE,
    account_id     BIGINT NOT NULL REFERENCES accounts_tb (account_id),
    amount         NUMERIC(30, 8) NOT NULL CHECK (amount <> 0),
    currency       VARCHAR(3) NOT NULL,
    kind           SMALLINT NOT NULL,
    transaction_id VARCHAR(26) NOT NULL REFERENCES transactions_tb (transaction_id),
    committed      BOOLEAN NOT NULL DEFAULT TRUE,
    created_at     TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_LEDGER_ACCOUNT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ledger_entries_account
    ON ledger_entries_tb (account_id, seq)
"#;

pub const CREATE_LEDGER_TRANSACTION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ledger_entries_transaction
    ON ledger_entries_tb (transaction_id)
"#;

pub const CREATE_IB_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ib_profiles_tb (
    ib_id          BIGINT PRIMARY KEY,
    payout_account BIGINT NOT NULL REFERENCES accounts_tb (account_id),
    created_at     TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_VOLUME_SAMPLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ib_volume_samples_tb (
    sample_id   BIGSERIAL PRIMARY KEY,
    ib_id       BIGINT NOT NULL,
    volume      NUMERIC(30, 8) NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_VOLUME_SAMPLES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ib_volume_samples
    ON ib_volume_samples_tb (ib_id, recorded_at)
"#;

pub const CREATE_ACCRUALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS commission_accruals_tb (
    accrual_id            VARCHAR(26) PRIMARY KEY,
    ib_id                 BIGINT NOT NULL,
    period                VARCHAR(7) NOT NULL,
    amount                NUMERIC(30, 8) NOT NULL,
    currency              VARCHAR(3) NOT NULL,
    paid                  BOOLEAN NOT NULL DEFAULT FALSE,
    paid_at               TIMESTAMPTZ,
    payout_transaction_id VARCHAR(26),
    payout_key            VARCHAR(128),
    updated_at            TIMESTAMPTZ NOT NULL
)
"#;

/// At most one open accrual per IB and period
pub const CREATE_ACCRUALS_OPEN_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_commission_accruals_open
    ON commission_accruals_tb (ib_id, period) WHERE NOT paid
"#;

/// Statements applied by `PgStore::migrate`, in order
pub const MIGRATIONS: &[&str] = &[
    CREATE_ACCOUNTS_TABLE,
    CREATE_TRANSACTIONS_TABLE,
    CREATE_TRANSACTIONS_STATUS_INDEX,
    CREATE_TRANSACTIONS_UPDATED_INDEX,
    CREATE_LEDGER_ENTRIES_TABLE,
    CREATE_LEDGER_ACCOUNT_INDEX,
    CREATE_LEDGER_TRANSACTION_INDEX,
    CREATE_IB_PROFILES_TABLE,
    CREATE_VOLUME_SAMPLES_TABLE,
    CREATE_VOLUME_SAMPLES_INDEX,
    CREATE_ACCRUALS_TABLE,
    CREATE_ACCRUALS_OPEN_INDEX,
];
