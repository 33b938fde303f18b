use crate::fees;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_fees_catalog(_state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "feeItems": fees::fee_catalog(),
            "grades": fees::grade_options(),
            "terms": fees::term_options(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.catalog" => Some(handle_fees_catalog(state, req)),
        _ => None,
    }
}
