use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::catcher::Catcher;
use salvo::cors::{AllowHeaders, AllowOrigin, Cors};
use salvo::http::Method;
use salvo::prelude::*;
use secrecy::SecretString;
use tracing::info;

use crate::config::Config;
use crate::db::DatabaseManager;
use crate::drive::DriveClient;
use crate::supabase::SupabaseStorage;

pub mod handlers;
pub mod metrics;
pub mod middleware;

use self::middleware::auth::create_router;
use self::middleware::errors::handle_error;

pub struct WebState {
    pub config: Arc<Config>,
    pub db_manager: Arc<DatabaseManager>,
    pub drive: Arc<DriveClient>,
    pub supabase: Option<Arc<SupabaseStorage>>,
    pub admin_token: SecretString,
    pub admin_password: SecretString,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> &'static WebState {
    WEB_STATE
        .get()
        .expect("web state is not initialized before handler execution")
}

#[derive(Clone)]
pub struct WebServer {
    config: Arc<Config>,
}

impl WebServer {
    pub async fn new(
        config: Arc<Config>,
        db_manager: Arc<DatabaseManager>,
        drive: Arc<DriveClient>,
        supabase: Option<Arc<SupabaseStorage>>,
    ) -> Result<Self> {
        let _ = WEB_STATE.set(WebState {
            admin_token: SecretString::from(config.auth.admin_token.clone()),
            admin_password: SecretString::from(config.auth.admin_password.clone()),
            config: config.clone(),
            db_manager,
            drive,
            supabase,
        });

        Ok(Self { config })
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.port
        );
        info!("Starting web server on {}", bind_addr);

        let cors = Cors::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(AllowHeaders::any())
            .into_handler();

        let service = Service::new(create_router(self.config.server.uploads_dir.clone()))
            .catcher(Catcher::default().hoop(handle_error))
            .hoop(cors);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor).serve(service).await;

        Ok(())
    }
}
