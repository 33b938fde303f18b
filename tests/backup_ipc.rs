mod test_support;

use serde_json::json;
use test_support::{error_code, receipt_input, request_err, request_ok, spawn_sidecar_in, temp_dir};

#[test]
fn exported_bundle_restores_into_another_workspace() {
    let source = temp_dir("feebook-backup-ipc-src");
    let target = temp_dir("feebook-backup-ipc-dst");
    let bundle = source.join("out").join("backup.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_in(&source);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "receipts.create",
        receipt_input("Ada", "ADM-1", "Year 1", json!({ "tuitionFee": 5000 }), json!([])),
    );
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("feebook-workspace-v1")
    );
    assert_eq!(exported.get("entryCount").and_then(|v| v.as_u64()), Some(3));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": target.to_string_lossy() }),
    );
    assert_eq!(
        imported.get("workspacePath").and_then(|v| v.as_str()),
        Some(target.to_string_lossy().as_ref())
    );

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(target.to_string_lossy().as_ref())
    );
    let list = request_ok(&mut stdin, &mut reader, "5", "receipts.list", json!({}));
    let receipts = list.get("receipts").and_then(|v| v.as_array()).expect("receipts");
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].get("studentName").and_then(|v| v.as_str()), Some("Ada"));

    let missing = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "backup.importWorkspaceBundle",
        json!({ "inPath": source.join("nope.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(target);
}
