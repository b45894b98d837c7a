//! Health check handler

pub async fn health_check() -> &'static str {
    "OK"
}
