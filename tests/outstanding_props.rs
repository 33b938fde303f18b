#[path = "../src/model.rs"]
mod model;
#[path = "../src/outstanding.rs"]
mod outstanding;

use model::{BalancePayment, FeeLine, Receipt};
use outstanding::{compute_outstanding, filter_report, OUTSTANDING_EPSILON};
use proptest::prelude::*;
use proptest::test_runner::Config;
use std::collections::HashSet;

const ITEM_IDS: &[&str] = &["tuitionFee", "idCard", "cardigan", "transportation"];
const GRADES: &[&str] = &["Angel", "year 2", "Year 1", "Year 10"];

fn fee_line() -> impl Strategy<Value = FeeLine> {
    (prop::sample::select(ITEM_IDS), 0_u32..50_000).prop_map(|(id, cents)| FeeLine {
        id: id.to_string(),
        description: format!("{} fee", id),
        amount: f64::from(cents) / 100.0,
    })
}

fn payment() -> impl Strategy<Value = BalancePayment> {
    (prop::sample::select(ITEM_IDS), 0_u32..50_000).prop_map(|(id, cents)| BalancePayment {
        id: format!("p-{}", cents),
        item_id: id.to_string(),
        item_name: format!("{} fee", id),
        amount: f64::from(cents) / 100.0,
        description: String::new(),
        date: "2025-03-01".to_string(),
    })
}

fn receipts() -> impl Strategy<Value = Vec<Receipt>> {
    prop::collection::vec(
        (
            0_usize..6,
            prop::sample::select(GRADES),
            prop::collection::vec(fee_line(), 0..4),
            prop::collection::vec(payment(), 0..3),
        ),
        0..12,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (student, grade, fee_items, balance_payments))| Receipt {
                id: i as i64 + 1,
                receipt_number: format!("RCP-{}", i),
                date: "2025-03-01".to_string(),
                student_name: format!("Student {}", student),
                grade: grade.to_string(),
                term: "2nd Term".to_string(),
                admission_number: format!("ADM-{}", student),
                parent_name: format!("Parent {}", student),
                payment_method: "Cash".to_string(),
                total_amount: fee_items.iter().map(|l| l.amount).sum(),
                balance_total: balance_payments.iter().map(|p| p.amount).sum(),
                fee_items,
                balance_payments,
                created_at: String::new(),
                updated_at: None,
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(Config::with_cases(128))]
    #[test]
    fn report_totals_agree_at_every_level(input in receipts()) {
        let report = compute_outstanding(&input);

        let mut students = 0;
        let mut items = 0;
        let mut amount = 0.0;
        let mut seen = HashSet::new();
        for g in &report.grades {
            let grade_sum: f64 = g.students.iter().map(|s| s.total_outstanding).sum();
            prop_assert!((grade_sum - g.total_outstanding).abs() < 1e-6);
            prop_assert_eq!(g.student_count, g.students.len());
            for s in &g.students {
                prop_assert!(!s.outstanding_items.is_empty());
                prop_assert_eq!(&s.grade, &g.grade);
                prop_assert!(seen.insert(s.admission_number.clone()));
                let item_sum: f64 = s.outstanding_items.iter().map(|i| i.outstanding).sum();
                prop_assert!((item_sum - s.total_outstanding).abs() < 1e-6);
                for it in &s.outstanding_items {
                    prop_assert!(it.outstanding > OUTSTANDING_EPSILON);
                }
            }
            students += g.student_count;
            items += g.item_count;
            amount += g.total_outstanding;
        }
        prop_assert_eq!(students, report.stats.total_students);
        prop_assert_eq!(items, report.stats.total_outstanding_items);
        prop_assert!((amount - report.stats.total_balance_amount).abs() < 1e-6);
    }

    #[test]
    fn grades_are_sorted_and_percentages_sum_to_about_100(input in receipts()) {
        let report = compute_outstanding(&input);
        let names: Vec<String> = report.grades.iter().map(|g| g.grade.to_lowercase()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        prop_assert_eq!(names, sorted);

        let pct: f64 = report.grades.iter().map(|g| g.percent_of_total).sum();
        if report.stats.total_balance_amount > 0.0 {
            prop_assert!((pct - 100.0).abs() <= 0.05 * report.grades.len() as f64 + 1e-9);
        } else {
            prop_assert_eq!(pct, 0.0);
        }
    }

    #[test]
    fn unfiltered_view_matches_report(input in receipts()) {
        let report = compute_outstanding(&input);
        let view = filter_report(&report, Some("all"), "   ");
        prop_assert_eq!(view, report);
    }
}
