use crate::model::{BalancePayment, FeeLine, Receipt};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Amounts at or below this are treated as settled (float noise).
pub const OUTSTANDING_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutstanding {
    pub item_id: String,
    pub item_name: String,
    pub original_amount: f64,
    pub paid_amount: f64,
    pub outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingItem {
    pub receipt_number: String,
    pub receipt_date: String,
    pub term: String,
    pub item_name: String,
    pub original_amount: f64,
    pub paid_amount: f64,
    pub outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReceipt {
    pub receipt_number: String,
    pub date: String,
    pub term: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBalance {
    pub id: i64,
    pub student_name: String,
    pub admission_number: String,
    pub grade: String,
    pub parent_name: String,
    pub receipts: Vec<StudentReceipt>,
    pub total_outstanding: f64,
    pub outstanding_items: Vec<OutstandingItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub grade: String,
    pub students: Vec<StudentBalance>,
    pub total_outstanding: f64,
    pub student_count: usize,
    pub item_count: usize,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingStats {
    pub total_students: usize,
    pub total_outstanding_items: usize,
    pub total_balance_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingReport {
    pub grades: Vec<GradeSummary>,
    pub stats: OutstandingStats,
    pub available_grades: Vec<String>,
}

fn payments_by_item(payments: &[BalancePayment]) -> HashMap<&str, f64> {
    let mut paid: HashMap<&str, f64> = HashMap::new();
    for p in payments {
        *paid.entry(p.item_id.as_str()).or_insert(0.0) += p.amount;
    }
    paid
}

/// Per-line reconciliation for a single receipt: each fee line minus the
/// payments recorded against its id.
pub fn student_outstanding(
    fee_items: &[FeeLine],
    payments: &[BalancePayment],
) -> (f64, Vec<ItemOutstanding>) {
    let paid = payments_by_item(payments);
    let mut total = 0.0;
    let mut items = Vec::new();
    for line in fee_items {
        let paid_amount = paid.get(line.id.as_str()).copied().unwrap_or(0.0);
        let outstanding = line.amount - paid_amount;
        if outstanding > OUTSTANDING_EPSILON {
            items.push(ItemOutstanding {
                item_id: line.id.clone(),
                item_name: line.description.clone(),
                original_amount: line.amount,
                paid_amount,
                outstanding,
            });
            total += outstanding;
        }
    }
    (total, items)
}

fn receipt_outstanding_items(receipt: &Receipt) -> Vec<OutstandingItem> {
    let (_, from_lines) = student_outstanding(&receipt.fee_items, &receipt.balance_payments);
    if !from_lines.is_empty() {
        return from_lines
            .into_iter()
            .map(|it| OutstandingItem {
                receipt_number: receipt.receipt_number.clone(),
                receipt_date: receipt.date.clone(),
                term: receipt.term.clone(),
                item_name: it.item_name,
                original_amount: it.original_amount,
                paid_amount: it.paid_amount,
                outstanding: it.outstanding,
            })
            .collect();
    }

    // Some receipts only record what is still owed, as balance payments with
    // no matching fee lines. Those amounts are the outstanding values.
    receipt
        .balance_payments
        .iter()
        .filter(|p| p.amount > OUTSTANDING_EPSILON)
        .map(|p| {
            let item_name = [&p.item_name, &p.description]
                .into_iter()
                .find(|s| !s.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| "Balance".to_string());
            let receipt_date = if p.date.trim().is_empty() {
                receipt.date.clone()
            } else {
                p.date.clone()
            };
            OutstandingItem {
                receipt_number: receipt.receipt_number.clone(),
                receipt_date,
                term: receipt.term.clone(),
                item_name,
                original_amount: p.amount,
                paid_amount: 0.0,
                outstanding: p.amount,
            }
        })
        .collect()
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part / whole * 1000.0).round() / 10.0
    } else {
        0.0
    }
}

fn group_by_grade(students: Vec<StudentBalance>, overall_total: f64) -> Vec<GradeSummary> {
    let mut grades: Vec<GradeSummary> = Vec::new();
    for student in students {
        let idx = match grades.iter().position(|g| g.grade == student.grade) {
            Some(i) => i,
            None => {
                grades.push(GradeSummary {
                    grade: student.grade.clone(),
                    students: Vec::new(),
                    total_outstanding: 0.0,
                    student_count: 0,
                    item_count: 0,
                    percent_of_total: 0.0,
                });
                grades.len() - 1
            }
        };
        let g = &mut grades[idx];
        g.total_outstanding += student.total_outstanding;
        g.student_count += 1;
        g.item_count += student.outstanding_items.len();
        g.students.push(student);
    }
    for g in grades.iter_mut() {
        g.percent_of_total = percent_of(g.total_outstanding, overall_total);
    }
    grades.sort_by(|a, b| cmp_text(&a.grade, &b.grade));
    grades
}

/// Rolls receipts up into per-student and per-grade outstanding balances.
///
/// Students are keyed by admission number; name, grade and parent come from
/// the first receipt seen for that key, so callers pass receipts newest first.
/// Students with nothing outstanding are dropped.
pub fn compute_outstanding(receipts: &[Receipt]) -> OutstandingReport {
    let mut order: Vec<StudentBalance> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut stats = OutstandingStats::default();

    for receipt in receipts {
        let slot = *index
            .entry(receipt.admission_number.as_str())
            .or_insert_with(|| {
                order.push(StudentBalance {
                    id: receipt.id,
                    student_name: receipt.student_name.clone(),
                    admission_number: receipt.admission_number.clone(),
                    grade: receipt.grade.clone(),
                    parent_name: receipt.parent_name.clone(),
                    receipts: Vec::new(),
                    total_outstanding: 0.0,
                    outstanding_items: Vec::new(),
                });
                order.len() - 1
            });
        let student = &mut order[slot];
        student.receipts.push(StudentReceipt {
            receipt_number: receipt.receipt_number.clone(),
            date: receipt.date.clone(),
            term: receipt.term.clone(),
            total_amount: receipt.total_amount,
        });

        for item in receipt_outstanding_items(receipt) {
            student.total_outstanding += item.outstanding;
            stats.total_outstanding_items += 1;
            stats.total_balance_amount += item.outstanding;
            student.outstanding_items.push(item);
        }
    }

    let mut students: Vec<StudentBalance> = order
        .into_iter()
        .filter(|s| !s.outstanding_items.is_empty())
        .collect();
    students.sort_by(|a, b| {
        cmp_text(&a.grade, &b.grade).then_with(|| cmp_text(&a.student_name, &b.student_name))
    });
    stats.total_students = students.len();

    let grades = group_by_grade(students, stats.total_balance_amount);
    let available_grades = grades.iter().map(|g| g.grade.clone()).collect();
    OutstandingReport {
        grades,
        stats,
        available_grades,
    }
}

fn student_matches(student: &StudentBalance, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    [
        &student.student_name,
        &student.admission_number,
        &student.parent_name,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

/// Narrows a report by grade and free-text search. Grade sums are recomputed
/// from the surviving students; percentages stay relative to the full total.
pub fn filter_report(report: &OutstandingReport, grade: Option<&str>, search: &str) -> OutstandingReport {
    let grade = grade.map(str::trim).filter(|g| !g.is_empty() && *g != "all");
    let needle = search.trim().to_lowercase();
    let overall = report.stats.total_balance_amount;

    let grades = report
        .grades
        .iter()
        .filter(|g| grade.map(|want| g.grade == want).unwrap_or(true))
        .filter_map(|g| {
            let students: Vec<StudentBalance> = g
                .students
                .iter()
                .filter(|s| student_matches(s, &needle))
                .cloned()
                .collect();
            if students.is_empty() {
                return None;
            }
            let total_outstanding: f64 = students.iter().map(|s| s.total_outstanding).sum();
            Some(GradeSummary {
                grade: g.grade.clone(),
                student_count: students.len(),
                item_count: students.iter().map(|s| s.outstanding_items.len()).sum(),
                percent_of_total: percent_of(total_outstanding, overall),
                total_outstanding,
                students,
            })
        })
        .collect();

    OutstandingReport {
        grades,
        stats: report.stats.clone(),
        available_grades: report.available_grades.clone(),
    }
}

fn csv_text(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub const OUTSTANDING_CSV_HEADER: &str = "Grade,Student Name,Admission Number,Parent Name,Item Description,Term,Original Amount (\u{20A6}),Paid Amount (\u{20A6}),Outstanding (\u{20A6}),Receipt Number,Date";

/// One CSV row per outstanding item, grouped as the report is ordered.
pub fn outstanding_csv(report: &OutstandingReport) -> (String, usize) {
    let mut csv = String::from(OUTSTANDING_CSV_HEADER);
    csv.push('\n');
    let mut rows = 0;
    for g in &report.grades {
        for s in &g.students {
            for item in &s.outstanding_items {
                csv.push_str(&format!(
                    "{},{},{},{},{},{},\u{20A6}{:.2},\u{20A6}{:.2},\u{20A6}{:.2},{},{}\n",
                    csv_text(&g.grade),
                    csv_text(&s.student_name),
                    csv_text(&s.admission_number),
                    csv_text(&s.parent_name),
                    csv_text(&item.item_name),
                    csv_text(&item.term),
                    item.original_amount,
                    item.paid_amount,
                    item.outstanding,
                    csv_text(&item.receipt_number),
                    csv_text(&item.receipt_date),
                ));
                rows += 1;
            }
        }
    }
    (csv, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, amount: f64) -> FeeLine {
        FeeLine {
            id: id.to_string(),
            description: format!("{} label", id),
            amount,
        }
    }

    fn pay(item_id: &str, amount: f64) -> BalancePayment {
        BalancePayment {
            id: format!("p-{}-{}", item_id, amount),
            item_id: item_id.to_string(),
            item_name: format!("{} label", item_id),
            amount,
            description: String::new(),
            date: String::new(),
        }
    }

    fn receipt(
        id: i64,
        adm: &str,
        name: &str,
        grade: &str,
        lines: Vec<FeeLine>,
        pays: Vec<BalancePayment>,
    ) -> Receipt {
        Receipt {
            id,
            receipt_number: format!("RCP-{}", id),
            date: "2025-01-10".to_string(),
            student_name: name.to_string(),
            grade: grade.to_string(),
            term: "1st Term".to_string(),
            admission_number: adm.to_string(),
            parent_name: format!("Parent of {}", name),
            payment_method: "Cash".to_string(),
            total_amount: lines.iter().map(|l| l.amount).sum(),
            balance_total: pays.iter().map(|p| p.amount).sum(),
            fee_items: lines,
            balance_payments: pays,
            created_at: "2025-01-10T00:00:00Z".to_string(),
            updated_at: None,
        }
    }

    #[test]
    fn payments_reduce_matching_fee_lines_only() {
        let (total, items) = student_outstanding(
            &[line("tuitionFee", 1000.0), line("cardigan", 50.0)],
            &[pay("tuitionFee", 400.0), pay("tuitionFee", 100.0), pay("idCard", 30.0)],
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].paid_amount, 500.0);
        assert_eq!(items[0].outstanding, 500.0);
        assert_eq!(items[1].paid_amount, 0.0);
        assert!((total - 550.0).abs() < 1e-9);
    }

    #[test]
    fn settled_and_noise_level_lines_are_not_outstanding() {
        let (total, items) = student_outstanding(
            &[line("tuitionFee", 100.0), line("cardigan", 10.005)],
            &[pay("tuitionFee", 100.0), pay("cardigan", 10.0)],
        );
        assert!(items.is_empty());
        assert_eq!(total, 0.0);
    }

    #[test]
    fn fallback_uses_payment_amounts_when_lines_are_settled() {
        let r = receipt(
            1,
            "A1",
            "Ada",
            "Year 1",
            vec![],
            vec![pay("tuitionFee", 250.0), pay("idCard", 0.005)],
        );
        let report = compute_outstanding(&[r]);
        let student = &report.grades[0].students[0];
        assert_eq!(student.outstanding_items.len(), 1);
        let item = &student.outstanding_items[0];
        assert_eq!(item.original_amount, 250.0);
        assert_eq!(item.paid_amount, 0.0);
        assert_eq!(item.item_name, "tuitionFee label");
        assert_eq!(item.receipt_date, "2025-01-10");
    }

    #[test]
    fn fallback_is_skipped_when_any_line_is_outstanding() {
        let r = receipt(
            1,
            "A1",
            "Ada",
            "Year 1",
            vec![line("tuitionFee", 300.0)],
            vec![pay("cardigan", 80.0)],
        );
        let report = compute_outstanding(&[r]);
        let items = &report.grades[0].students[0].outstanding_items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].outstanding, 300.0);
    }

    #[test]
    fn students_roll_up_by_admission_number_and_grade() {
        let receipts = vec![
            receipt(3, "A1", "Ada", "Year 2", vec![line("tuitionFee", 100.0)], vec![]),
            receipt(2, "B7", "Bola", "Year 1", vec![line("idCard", 40.0)], vec![]),
            receipt(1, "A1", "Ada Old", "Year 1", vec![line("cardigan", 60.0)], vec![]),
            receipt(
                0,
                "C3",
                "Chi",
                "Year 1",
                vec![line("idCard", 40.0)],
                vec![pay("idCard", 40.0)],
            ),
        ];
        let report = compute_outstanding(&receipts);

        assert_eq!(report.stats.total_students, 2);
        assert_eq!(report.stats.total_outstanding_items, 3);
        assert!((report.stats.total_balance_amount - 200.0).abs() < 1e-9);
        assert_eq!(report.available_grades, vec!["Year 1", "Year 2"]);

        let ada = &report.grades[1].students[0];
        assert_eq!(ada.student_name, "Ada");
        assert_eq!(ada.grade, "Year 2");
        assert_eq!(ada.receipts.len(), 2);
        assert!((ada.total_outstanding - 160.0).abs() < 1e-9);

        assert_eq!(report.grades[0].student_count, 1);
        assert_eq!(report.grades[0].percent_of_total, 20.0);
        assert_eq!(report.grades[1].percent_of_total, 80.0);
    }

    #[test]
    fn empty_input_has_zero_percentages() {
        let report = compute_outstanding(&[]);
        assert!(report.grades.is_empty());
        assert_eq!(report.stats, OutstandingStats::default());
        assert_eq!(percent_of(10.0, 0.0), 0.0);
    }

    #[test]
    fn filter_recomputes_grade_sums_against_overall_total() {
        let receipts = vec![
            receipt(1, "A1", "Ada", "Year 1", vec![line("tuitionFee", 100.0)], vec![]),
            receipt(2, "B1", "Bola", "Year 1", vec![line("tuitionFee", 300.0)], vec![]),
            receipt(3, "C1", "Chi", "Year 2", vec![line("tuitionFee", 600.0)], vec![]),
        ];
        let report = compute_outstanding(&receipts);

        let only_bola = filter_report(&report, Some("all"), "  BOLA ");
        assert_eq!(only_bola.grades.len(), 1);
        assert_eq!(only_bola.grades[0].student_count, 1);
        assert_eq!(only_bola.grades[0].total_outstanding, 300.0);
        assert_eq!(only_bola.grades[0].percent_of_total, 30.0);

        let by_parent = filter_report(&report, Some("Year 2"), "parent of");
        assert_eq!(by_parent.grades.len(), 1);
        assert_eq!(by_parent.grades[0].grade, "Year 2");

        let none = filter_report(&report, Some("Year 9"), "");
        assert!(none.grades.is_empty());
        assert_eq!(none.stats, report.stats);
    }

    #[test]
    fn csv_has_one_row_per_item_with_quoted_text() {
        let receipts = vec![receipt(
            1,
            "A1",
            "Ada \"Ace\" Obi",
            "Year 1",
            vec![line("tuitionFee", 100.0), line("idCard", 5.5)],
            vec![pay("tuitionFee", 25.0)],
        )];
        let (csv, rows) = outstanding_csv(&compute_outstanding(&receipts));
        assert_eq!(rows, 2);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], OUTSTANDING_CSV_HEADER);
        assert!(lines[1].starts_with("\"Year 1\",\"Ada \"\"Ace\"\" Obi\",\"A1\""));
        assert!(lines[1].contains("\u{20A6}100.00,\u{20A6}25.00,\u{20A6}75.00"));
    }
}
