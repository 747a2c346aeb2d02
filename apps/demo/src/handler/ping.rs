use axum::extract::State;
use ignite_server::AppContext;

/// `GET /ping`
///
/// 参照中の設定値（`http-server.addr`）をログに出し、`pong` を返す。
pub async fn ping(State(ctx): State<AppContext>) -> &'static str {
    tracing::info!(
        http_server.addr = %ctx.config.http_server.addr,
        "ping を受信しました"
    );
    "pong"
}
