//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    AccountView, AccrualStateView, AccrualView, AccrueCommissionRequest, ApprovalView,
    ApproveRequest, BalanceView, CreateTransactionRequest, EntryView, FloatingPnlRequest, IbView,
    OpenAccountRequest, PayoutView, ProcessPayoutRequest, RegisterIbRequest, RejectRequest,
    SetStatusRequest, TransactionView,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "fxledger Back-Office API",
        version = "0.1.0",
        description = "Ledger and transaction lifecycle core: deposits, withdrawals, internal transfers and IB commission payouts.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_transaction,
        crate::gateway::handlers::approve_transaction,
        crate::gateway::handlers::reject_transaction,
        crate::gateway::handlers::get_transaction,
        crate::gateway::handlers::open_account,
        crate::gateway::handlers::set_account_status,
        crate::gateway::handlers::get_balance,
        crate::gateway::handlers::set_floating_pnl,
        crate::gateway::handlers::register_ib,
        crate::gateway::handlers::accrue_commission,
        crate::gateway::handlers::get_accrual,
        crate::gateway::handlers::process_payout,
    ),
    components(
        schemas(
            HealthResponse,
            CreateTransactionRequest,
            ApproveRequest,
            RejectRequest,
            TransactionView,
            EntryView,
            ApprovalView,
            OpenAccountRequest,
            SetStatusRequest,
            FloatingPnlRequest,
            AccountView,
            BalanceView,
            RegisterIbRequest,
            IbView,
            AccrueCommissionRequest,
            AccrualView,
            AccrualStateView,
            ProcessPayoutRequest,
            PayoutView,
        )
    ),
    tags(
        (name = "Transactions", description = "Deposit, withdrawal and transfer lifecycle"),
        (name = "Accounts", description = "Provisioning, KYC status and balances"),
        (name = "Commissions", description = "IB commission accrual and payout"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
