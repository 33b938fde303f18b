mod test_support;

use serde_json::json;
use test_support::{receipt_input, request_ok, spawn_sidecar_in, temp_dir};

fn seed(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
) {
    let receipts = vec![
        // Older Year 1 receipt for ADM-1; the newer one moves the student up.
        receipt_input(
            "Ada Old",
            "ADM-1",
            "Year 1",
            json!({ "cardigan": 3000 }),
            json!([]),
        ),
        receipt_input(
            "Bola",
            "ADM-2",
            "Year 1",
            json!({ "tuitionFee": 10000 }),
            json!([{ "itemId": "tuitionFee", "amount": 4000 }]),
        ),
        // Lines settled but payments recorded: the payments are reported as owed.
        receipt_input(
            "Chi",
            "ADM-3",
            "Year 1",
            json!({ "idCard": 1500 }),
            json!([{ "itemId": "idCard", "amount": 1500 }]),
        ),
        // Balance-only receipt: payments stand for what is still owed.
        receipt_input(
            "Dayo",
            "ADM-4",
            "Angel",
            json!({}),
            json!([{ "itemId": "transportation", "amount": 2000, "description": "Bus arrears" }]),
        ),
        receipt_input(
            "Ada",
            "ADM-1",
            "Year 2",
            json!({ "tuitionFee": 8000 }),
            json!([]),
        ),
    ];
    for (i, r) in receipts.into_iter().enumerate() {
        request_ok(stdin, reader, &format!("seed-{}", i), "receipts.create", r);
    }
}

#[test]
fn outstanding_groups_students_by_grade() {
    let workspace = temp_dir("feebook-outstanding");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_in(&workspace);
    seed(&mut stdin, &mut reader);

    let report = request_ok(&mut stdin, &mut reader, "1", "balances.outstanding", json!({}));

    assert_eq!(report.pointer("/stats/totalStudents").and_then(|v| v.as_u64()), Some(4));
    assert_eq!(
        report.pointer("/stats/totalOutstandingItems").and_then(|v| v.as_u64()),
        Some(5)
    );
    assert_eq!(
        report.pointer("/stats/totalBalanceAmount").and_then(|v| v.as_f64()),
        Some(20500.0)
    );
    assert_eq!(
        report.get("availableGrades"),
        Some(&json!(["Angel", "Year 1", "Year 2"]))
    );

    let grades = report.get("grades").and_then(|v| v.as_array()).expect("grades");
    assert_eq!(grades.len(), 3);

    let angel = &grades[0];
    assert_eq!(angel.get("totalOutstanding").and_then(|v| v.as_f64()), Some(2000.0));
    let dayo_item = angel.pointer("/students/0/outstandingItems/0").expect("item");
    assert_eq!(dayo_item.get("itemName").and_then(|v| v.as_str()), Some("Transportation Fee"));
    assert_eq!(dayo_item.get("paidAmount").and_then(|v| v.as_f64()), Some(0.0));

    let year1 = &grades[1];
    assert_eq!(year1.get("studentCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(year1.get("totalOutstanding").and_then(|v| v.as_f64()), Some(7500.0));
    assert_eq!(
        year1.pointer("/students/1/outstandingItems/0/itemName").and_then(|v| v.as_str()),
        Some("I.D Card")
    );
    assert_eq!(
        year1.pointer("/students/0/outstandingItems/0/outstanding").and_then(|v| v.as_f64()),
        Some(6000.0)
    );

    // ADM-1 carries both receipts under the newest identity.
    let year2 = &grades[2];
    let ada = year2.pointer("/students/0").expect("ada");
    assert_eq!(ada.get("studentName").and_then(|v| v.as_str()), Some("Ada"));
    assert_eq!(ada.get("totalOutstanding").and_then(|v| v.as_f64()), Some(11000.0));
    assert_eq!(ada.get("receipts").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));
    assert_eq!(year2.get("percentOfTotal").and_then(|v| v.as_f64()), Some(53.7));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn filters_and_csv_export() {
    let workspace = temp_dir("feebook-outstanding-csv");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_in(&workspace);
    seed(&mut stdin, &mut reader);

    let by_grade = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "balances.outstanding",
        json!({ "grade": "Year 1" }),
    );
    let grades = by_grade.get("grades").and_then(|v| v.as_array()).expect("grades");
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0].get("grade").and_then(|v| v.as_str()), Some("Year 1"));
    // Stats always describe the unfiltered report.
    assert_eq!(by_grade.pointer("/stats/totalStudents").and_then(|v| v.as_u64()), Some(4));

    let by_search = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "balances.outstanding",
        json!({ "grade": "all", "search": "adm-4" }),
    );
    let grades = by_search.get("grades").and_then(|v| v.as_array()).expect("grades");
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0].get("grade").and_then(|v| v.as_str()), Some("Angel"));

    let out = workspace.join("exports").join("outstanding.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "balances.exportCsv",
        json!({ "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported.get("rowsExported").and_then(|v| v.as_u64()), Some(5));

    let text = std::fs::read_to_string(&out).expect("read csv");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("Grade,Student Name,Admission Number"));
    assert!(lines[1].starts_with("\"Angel\",\"Dayo\",\"ADM-4\""));
    assert!(lines[2].contains("\u{20A6}10000.00,\u{20A6}4000.00,\u{20A6}6000.00"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
