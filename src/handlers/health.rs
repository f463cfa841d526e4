use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.environment.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "timestamp": chrono::Utc::now(),
    }))
}
