use serde::{Deserialize, Serialize};

/// One charged line on a receipt. `id` is the fee catalog id the line was
/// entered against; legacy receipts may carry ids outside the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLine {
    pub id: String,
    pub description: String,
    pub amount: f64,
}

/// A payment recorded against an earlier fee line, keyed by `item_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePayment {
    pub id: String,
    pub item_id: String,
    pub item_name: String,
    pub amount: f64,
    pub description: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: i64,
    pub receipt_number: String,
    pub date: String,
    pub student_name: String,
    pub grade: String,
    pub term: String,
    pub admission_number: String,
    pub parent_name: String,
    pub payment_method: String,
    pub total_amount: f64,
    pub balance_total: f64,
    pub fee_items: Vec<FeeLine>,
    pub balance_payments: Vec<BalancePayment>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Normalized receipt fields ready to be written. Totals are derived from the
/// lines, so they are not part of the draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptDraft {
    pub date: String,
    pub student_name: String,
    pub grade: String,
    pub term: String,
    pub admission_number: String,
    pub parent_name: String,
    pub payment_method: String,
    pub fee_items: Vec<FeeLine>,
    pub balance_payments: Vec<BalancePayment>,
}
