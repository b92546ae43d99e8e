use std::net::SocketAddr;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower::BoxError;
use tower::ServiceBuilder;

use drip_limit::Limiter;
use tower_drip::DripError;
use tower_drip::DripLayer;

#[tokio::main]
async fn main() {
    // 1. Setup the limiter: 5 requests per second per client, burst 10.
    let limiter = Limiter::new("5/s".parse().unwrap(), 10.0).unwrap();

    // 2. Key requests by peer address.
    let layer = DripLayer::<_, Request, _>::by_peer_addr(limiter);

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Drip!" }))
        .layer(
            ServiceBuilder::new()
                // 1. The outermost layer: catches BoxError and returns Response
                .layer(HandleErrorLayer::new(handle_drip_error))
                // 2. The middle layer: introduces BoxError
                .layer(layer)
                // 3. The secret sauce: converts the Route's Infallible to BoxError
                // so that DripLayer is happy wrapping it.
                .map_err(BoxError::from),
        );

    // 4. Serve with ConnectInfo so PeerAddrKey can see the peer address.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();
    println!("📡 Listening on http://127.0.0.1:3000");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// The signature must match BoxError -> IntoResponse
async fn handle_drip_error(err: tower::BoxError) -> impl IntoResponse {
    if let Some(drip_err) = err.downcast_ref::<DripError>() {
        drip_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
