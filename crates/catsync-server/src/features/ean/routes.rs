//! EAN-13 routes
//!
//! - `GET /api/v1/ean/generate/:product_id/:variant_id` - Internal barcode for a variant
//! - `GET /api/v1/ean/validate/:code` - Check a code against the internal check digit

use axum::{
    extract::{rejection::PathRejection, Path},
    routing::get,
    Json, Router,
};
use catsync_common::ean;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedEan {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EanValidation {
    pub code: String,
    pub valid: bool,
}

pub fn ean_routes() -> Router {
    Router::new()
        .route("/generate/:product_id/:variant_id", get(generate_ean))
        .route("/validate/:code", get(validate_ean))
}

async fn generate_ean(path: Result<Path<(u64, u64)>, PathRejection>) -> Result<Json<GeneratedEan>, AppError> {
    let Path((product_id, variant_id)) = path?;
    Ok(Json(GeneratedEan {
        code: ean::generate(product_id, variant_id),
    }))
}

async fn validate_ean(Path(code): Path<String>) -> Json<EanValidation> {
    let valid = ean::is_valid(&code);
    Json(EanValidation { code, valid })
}
