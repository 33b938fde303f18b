use crate::model::{BalancePayment, FeeLine, ReceiptDraft};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeItemDef {
    pub id: &'static str,
    pub label: &'static str,
}

const FEE_CATALOG: &[FeeItemDef] = &[
    FeeItemDef { id: "tuitionFee", label: "Tuition Fee" },
    FeeItemDef { id: "lessonLevy", label: "Lesson Levy (Termly)" },
    FeeItemDef { id: "ptaLevyOld", label: "P.T.A Levy (Per Family)" },
    FeeItemDef { id: "extraCurriculum", label: "Extra Curriculum Activities" },
    FeeItemDef { id: "developmentLevy", label: "Development Levy" },
    FeeItemDef { id: "ptaLevyNew", label: "P.T.A Levy (New Intake)" },
    FeeItemDef { id: "registrationForm", label: "Registration Form" },
    FeeItemDef { id: "schoolUniform", label: "School Uniform (2 Pairs)" },
    FeeItemDef { id: "peOutfit", label: "P.E Outfit" },
    FeeItemDef { id: "stockings", label: "Stockings (2 Pairs)" },
    FeeItemDef { id: "cardigan", label: "Cardigan" },
    FeeItemDef { id: "idCard", label: "I.D Card" },
    FeeItemDef { id: "assessmentBooklet", label: "Assessment Booklet" },
    FeeItemDef { id: "endOfYearParty", label: "End of Year Party" },
    FeeItemDef { id: "endOfSessionParty", label: "End of Session Party" },
    FeeItemDef { id: "transportation", label: "Transportation Fee" },
    FeeItemDef { id: "juniorWaec", label: "Junior WAEC Fee" },
    FeeItemDef { id: "seniorWaec", label: "Senior WAEC Fee" },
];

const GRADE_OPTIONS: &[&str] = &[
    "Angel",
    "Rainbow",
    "Glorious Star",
    "Bright Star",
    "Lavender",
    "Year 1",
    "Year 2",
    "Year 3",
    "Year 4",
    "Year 5",
    "Year 6",
    "Year 7",
    "Year 8",
    "Year 9",
    "Year 10",
    "Year 11",
    "Year 12",
];

const TERM_OPTIONS: &[&str] = &["1st Term", "2nd Term", "3rd Term"];

pub const DEFAULT_PAYMENT_METHOD: &str = "Cash";

pub fn fee_catalog() -> &'static [FeeItemDef] {
    FEE_CATALOG
}

pub fn grade_options() -> &'static [&'static str] {
    GRADE_OPTIONS
}

pub fn term_options() -> &'static [&'static str] {
    TERM_OPTIONS
}

pub fn find_fee_item(id: &str) -> Option<&'static FeeItemDef> {
    FEE_CATALOG.iter().find(|d| d.id == id)
}

/// Lenient amount parsing: finite numbers pass through, strings keep only
/// digits, `.` and `-` and then read the longest leading number, so
/// `"15000-"` is 15000 and `"12.5.3"` is 12.5. Anything else is 0.
pub fn parse_amount(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_amount_str(s),
        _ => 0.0,
    }
}

pub fn parse_amount_str(s: &str) -> f64 {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned[..numeric_prefix_len(&cleaned)]
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .unwrap_or(0.0)
}

/// Length of the leading `-?digits[.digits]` run; 0 when no digit is found.
fn numeric_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        0
    } else {
        end
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Builds fee lines in catalog order from a `{ feeId: amount }` map, keeping
/// only amounts above zero.
pub fn fee_lines_from_amounts(amounts: &Map<String, Value>) -> Vec<FeeLine> {
    FEE_CATALOG
        .iter()
        .filter_map(|def| {
            let amount = amounts.get(def.id).map(parse_amount).unwrap_or(0.0);
            if amount > 0.0 {
                Some(FeeLine {
                    id: def.id.to_string(),
                    description: def.label.to_string(),
                    amount: round2(amount),
                })
            } else {
                None
            }
        })
        .collect()
}

pub fn grand_total(lines: &[FeeLine]) -> f64 {
    round2(lines.iter().map(|l| l.amount).sum())
}

pub fn balance_total(payments: &[BalancePayment]) -> f64 {
    round2(payments.iter().map(|p| p.amount).sum())
}

fn str_field(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Turns the composition form into a normalized draft plus per-field
/// validation messages. An empty message map means the draft can be saved.
pub fn parse_receipt_input(
    params: &Value,
    today: NaiveDate,
    default_payment_method: &str,
) -> (ReceiptDraft, BTreeMap<String, String>) {
    let mut errors = BTreeMap::new();

    let date = match str_field(params, "date") {
        s if s.is_empty() => today.format("%Y-%m-%d").to_string(),
        s => {
            if NaiveDate::parse_from_str(&s, "%Y-%m-%d").is_err() {
                errors.insert("date".to_string(), "Date must be YYYY-MM-DD".to_string());
            }
            s
        }
    };

    let student_name = str_field(params, "studentName");
    let grade = str_field(params, "grade");
    let term = str_field(params, "term");
    let admission_number = str_field(params, "admissionNumber");
    let parent_name = str_field(params, "parentName");
    let payment_method = match str_field(params, "paymentMethod") {
        s if s.is_empty() => default_payment_method.to_string(),
        s => s,
    };

    if student_name.is_empty() {
        errors.insert("studentName".into(), "Student name is required".into());
    }
    if grade.is_empty() {
        errors.insert("grade".into(), "Grade is required".into());
    }
    if term.is_empty() {
        errors.insert("term".into(), "Term is required".into());
    }
    if admission_number.is_empty() {
        errors.insert(
            "admissionNumber".into(),
            "Parent/Guardian contact is required".into(),
        );
    }
    if parent_name.is_empty() {
        errors.insert("parentName".into(), "Parent/Guardian name is required".into());
    }

    let fee_items = params
        .get("feeAmounts")
        .and_then(|v| v.as_object())
        .map(fee_lines_from_amounts)
        .unwrap_or_default();

    let mut balance_payments = Vec::new();
    if let Some(raw) = params.get("balancePayments").and_then(|v| v.as_array()) {
        for (i, p) in raw.iter().enumerate() {
            match parse_balance_payment(p, &date) {
                Ok(bp) => balance_payments.push(bp),
                Err(msg) => {
                    errors.insert(format!("balancePayments.{}", i), msg);
                }
            }
        }
    }

    let has_bad_payments = errors.keys().any(|k| k.starts_with("balancePayments."));
    if fee_items.is_empty() && balance_payments.is_empty() && !has_bad_payments {
        errors.insert(
            "feeItems".into(),
            "At least one fee item or balance payment must be entered".into(),
        );
    }

    (
        ReceiptDraft {
            date,
            student_name,
            grade,
            term,
            admission_number,
            parent_name,
            payment_method,
            fee_items,
            balance_payments,
        },
        errors,
    )
}

fn parse_balance_payment(p: &Value, receipt_date: &str) -> Result<BalancePayment, String> {
    let item_id = str_field(p, "itemId");
    let Some(def) = find_fee_item(&item_id) else {
        return Err(format!("Unknown fee item: {}", item_id));
    };
    let amount = p.get("amount").map(parse_amount).unwrap_or(0.0);
    if amount <= 0.0 {
        return Err("Amount must be greater than 0".to_string());
    }
    let id = match str_field(p, "id") {
        s if s.is_empty() => Uuid::new_v4().to_string(),
        s => s,
    };
    let description = match str_field(p, "description") {
        s if s.is_empty() => format!("Balance payment for {}", def.label),
        s => s,
    };
    let date = match str_field(p, "date") {
        s if s.is_empty() => receipt_date.to_string(),
        s => s,
    };
    Ok(BalancePayment {
        id,
        item_id,
        item_name: def.label.to_string(),
        amount: round2(amount),
        description,
        date,
    })
}

/// `RCP-YYYYMMDD-XXXXX` with five uppercase alphanumerics.
pub fn generate_receipt_number(date: NaiveDate) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .to_ascii_uppercase()
        .chars()
        .take(5)
        .collect();
    format!("RCP-{}-{}", date.format("%Y%m%d"), suffix)
}

fn sanitize_for_filename(value: &str) -> String {
    let mut out = String::new();
    let mut in_space = false;
    for c in value.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
        }
    }
    out
}

pub fn receipt_filename(student_name: &str, grade: &str, receipt_number: &str) -> String {
    let name = match sanitize_for_filename(student_name) {
        s if s.is_empty() => "student".to_string(),
        s => s,
    };
    let grade = match sanitize_for_filename(grade) {
        s if s.is_empty() => "grade".to_string(),
        s => s,
    };
    let receipt = sanitize_for_filename(receipt_number);
    if receipt.is_empty() {
        format!("receipt-{}-{}", name, grade)
    } else {
        format!("receipt-{}-{}-{}", name, grade, receipt)
    }
}

pub fn format_money(symbol: &str, amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}{}.{}", sign, symbol, grouped, frac)
}

pub fn format_naira(amount: f64) -> String {
    format_money("\u{20A6}", amount)
}
