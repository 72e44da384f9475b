use std::{env, sync::Arc};

use colored::Colorize;
use confab_chat::{Chat, DatabaseError, PgDatabase};
use confab_server::{logging, ServerContext};
use log::{error, info};
use thiserror::Error;

#[derive(Debug, Error)]
enum SetupError {
    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),
}

impl SetupError {
    fn hint(&self) -> String {
        match self {
            SetupError::MissingDatabaseUrl => {
                "Point DATABASE_URL at a postgres instance, for example postgres://localhost/confab."
                    .to_string()
            }
            SetupError::Database(_) => {
                "This is a database error. Make sure the postgres instance is properly installed and running, then try again."
                    .to_string()
            }
        }
    }
}

async fn init() -> Result<ServerContext, SetupError> {
    info!("Connecting to database...");

    let url = env::var("DATABASE_URL").map_err(|_| SetupError::MissingDatabaseUrl)?;
    let database = PgDatabase::new(&url).await?;

    Ok(ServerContext {
        chat: Arc::new(Chat::new(database)),
    })
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    match init().await {
        Ok(context) => {
            info!("Initialized successfully.");
            confab_server::run_server(context).await;
        }
        Err(error) => {
            error!(
                "{} Read the error below to troubleshoot the issue.",
                "Confab failed to start!".bold().red()
            );
            error!("{error}");
            error!("{}", format!("Hint: {}", error.hint()).bright_black().italic());
        }
    }
}
