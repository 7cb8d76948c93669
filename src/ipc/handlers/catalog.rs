use crate::catalog;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

// The catalog is static, so these methods work before a workspace is selected.

fn year_param(params: &serde_json::Value) -> Result<u8, HandlerErr> {
    let year = params
        .get("year")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing year"))?;
    if !catalog::is_valid_year(year) {
        return Err(HandlerErr::bad_params(format!(
            "year must be between {} and {}",
            catalog::FIRST_YEAR,
            catalog::LAST_YEAR
        )));
    }
    Ok(year as u8)
}

fn catalog_list(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year = year_param(params)?;
    let subjects: Vec<serde_json::Value> = catalog::entries(year)
        .iter()
        .map(|(code, name)| json!({ "code": code, "subjectName": name }))
        .collect();
    Ok(json!({ "year": year, "subjects": subjects }))
}

fn catalog_resolve(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let year = year_param(params)?;
    let code = params
        .get("code")
        .and_then(|v| v.as_u64())
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| HandlerErr::bad_params("missing code"))?;
    Ok(json!({
        "year": year,
        "code": code,
        "subjectName": catalog::resolve(year, code),
    }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "catalog.list" => catalog_list(&req.params),
        "catalog.resolve" => catalog_resolve(&req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
