use serde::{Deserialize, Serialize};

/// Current balance for one (user, point type) pair.
///
/// The balance is derived: it always equals the sum of signed transaction
/// amounts for the pair, enforced by the ledger's atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: String,
    pub point_type_id: String,
    pub balance: i64,
    pub updated_at: i64,
}

impl UserBalance {
    /// A zero balance for a pair that has no row yet.
    pub fn zero(user_id: &str, point_type_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            point_type_id: point_type_id.to_string(),
            balance: 0,
            updated_at: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }
}

/// Immutable ledger entry. `amount` is always positive; the kind carries
/// the sign. `after` must equal `before` plus or minus `amount` and match
/// the balance committed in the same atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub point_type_id: String,
    pub amount: i64,
    pub kind: TransactionKind,
    pub reason: String,
    pub before: i64,
    pub after: i64,
    pub created_at: i64,
}

/// Ledger entry prior to insertion; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub point_type_id: String,
    pub amount: i64,
    pub kind: TransactionKind,
    pub reason: String,
    pub before: i64,
    pub after: i64,
}

/// Optional filters and pagination for listing transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub point_type_id: Option<String>,
    pub kind: Option<TransactionKind>,
    /// Inclusive lower bound, Unix seconds.
    pub start_time: Option<i64>,
    /// Inclusive upper bound, Unix seconds.
    pub end_time: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

/// One page of transactions plus the total count matching the filter,
/// independent of pagination.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub entries: Vec<Transaction>,
    pub total: i64,
}
