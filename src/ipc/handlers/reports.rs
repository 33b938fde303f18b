use crate::fees;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{load_section, SetupSection};
use crate::ipc::helpers::{required_receipt_id, store_err, today, validation_failed};
use crate::ipc::types::{AppState, Request};
use crate::model::{BalancePayment, FeeLine};
use crate::receipts;

use super::receipts::default_payment_method;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Pdf,
    Jpeg,
}

impl ExportFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpeg",
        }
    }
}

/// Fields the print layout needs, whether the receipt is saved or still a draft.
struct PrintableReceipt {
    receipt_number: String,
    date: String,
    student_name: String,
    grade: String,
    term: String,
    admission_number: String,
    parent_name: String,
    payment_method: String,
    fee_items: Vec<FeeLine>,
    balance_payments: Vec<BalancePayment>,
}

fn load_printable(state: &AppState, req: &Request) -> Result<PrintableReceipt, Value> {
    let conn = state.db.as_ref();
    if let Some(inline) = req.params.get("receipt").filter(|v| v.is_object()) {
        let default_method = default_payment_method(conn);
        let (draft, errors) = fees::parse_receipt_input(inline, today(), &default_method);
        if !errors.is_empty() {
            return Err(validation_failed(req, &errors));
        }
        // Numbers are only issued on save.
        return Ok(PrintableReceipt {
            receipt_number: String::new(),
            date: draft.date,
            student_name: draft.student_name,
            grade: draft.grade,
            term: draft.term,
            admission_number: draft.admission_number,
            parent_name: draft.parent_name,
            payment_method: draft.payment_method,
            fee_items: draft.fee_items,
            balance_payments: draft.balance_payments,
        });
    }

    let Some(conn) = conn else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let receipt_id = required_receipt_id(req)?;
    let r = receipts::get_receipt(conn, receipt_id).map_err(|e| store_err(req, e))?;
    Ok(PrintableReceipt {
        receipt_number: r.receipt_number,
        date: r.date,
        student_name: r.student_name,
        grade: r.grade,
        term: r.term,
        admission_number: r.admission_number,
        parent_name: r.parent_name,
        payment_method: r.payment_method,
        fee_items: r.fee_items,
        balance_payments: r.balance_payments,
    })
}

fn section_or_default(state: &AppState, section: SetupSection) -> Value {
    state
        .db
        .as_ref()
        .and_then(|c| load_section(c, section).ok())
        .unwrap_or_else(|| json!({}))
}

fn handle_reports_receipt_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let school = section_or_default(state, SetupSection::School);
    let exports = section_or_default(state, SetupSection::Exports);

    let format_raw = req
        .params
        .get("format")
        .and_then(|v| v.as_str())
        .or_else(|| exports.get("defaultFormat").and_then(|v| v.as_str()))
        .unwrap_or("pdf");
    let Some(format) = ExportFormat::parse(format_raw) else {
        return err(
            &req.id,
            "bad_params",
            "format must be one of: pdf, jpeg",
            Some(json!({ "format": format_raw })),
        );
    };

    let receipt = match load_printable(state, req) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let symbol = school.get("currencySymbol").and_then(|v| v.as_str());
    let money = |amount: f64| match symbol {
        Some(s) => fees::format_money(s, amount),
        None => fees::format_naira(amount),
    };
    let text = |key: &str| school.get(key).and_then(|v| v.as_str()).unwrap_or("");

    let fee_lines: Vec<Value> = receipt
        .fee_items
        .iter()
        .map(|l| {
            json!({
                "id": l.id,
                "description": l.description,
                "amount": l.amount,
                "amountText": money(l.amount)
            })
        })
        .collect();
    let payment_lines: Vec<Value> = receipt
        .balance_payments
        .iter()
        .map(|p| {
            json!({
                "itemId": p.item_id,
                "itemName": p.item_name,
                "description": p.description,
                "date": p.date,
                "amount": p.amount,
                "amountText": money(p.amount)
            })
        })
        .collect();
    let grand_total = fees::grand_total(&receipt.fee_items);
    let balance_total = fees::balance_total(&receipt.balance_payments);

    let filename = format!(
        "{}.{}",
        fees::receipt_filename(&receipt.student_name, &receipt.grade, &receipt.receipt_number),
        format.as_str()
    );

    ok(
        &req.id,
        json!({
            "format": format.as_str(),
            "filename": filename,
            "page": {
                "marginMm": exports.get("marginMm").cloned().unwrap_or(json!(10)),
                "jpegQuality": exports.get("jpegQuality").cloned().unwrap_or(json!(95))
            },
            "school": {
                "name": text("name"),
                "address": text("address"),
                "phone": text("phone")
            },
            "receipt": {
                "receiptNumber": receipt.receipt_number,
                "date": receipt.date,
                "term": receipt.term,
                "paymentMethod": receipt.payment_method
            },
            "student": {
                "name": receipt.student_name,
                "grade": receipt.grade,
                "admissionNumber": receipt.admission_number,
                "parentName": receipt.parent_name
            },
            "feeItems": fee_lines,
            "balancePayments": payment_lines,
            "totals": {
                "grandTotal": grand_total,
                "grandTotalText": money(grand_total),
                "balanceTotal": balance_total,
                "balanceTotalText": money(balance_total)
            },
            "footer": text("receiptFooter")
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.receiptModel" => Some(handle_reports_receipt_model(state, req)),
        _ => None,
    }
}
