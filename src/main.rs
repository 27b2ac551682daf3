use log::{error, info};

use unimart_chat::integration;
use unimart_chat::state::AppState;

#[tokio::main]
async fn main() {
    let config = integration::Config::default();

    let state = match AppState::init(&config).await {
        Ok(state) => state,
        Err(e) => panic!("Failed to initialize app state: {e}"),
    };

    let app = unimart_chat::app(state, &config.env);
    let addr = config.env.addr();
    info!("Listening on {addr}");

    let served = match config.env.ssl_config() {
        Some(ssl_config) => {
            axum_server::bind_openssl(addr, ssl_config)
                .serve(app.into_make_service())
                .await
        }
        None => {
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await
        }
    };

    if let Err(e) = served {
        error!("Server stopped: {e}");
    }
}
