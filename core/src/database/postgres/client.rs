use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::task::{self, JoinHandle};
use tokio_postgres::{
    config::SslMode,
    types::{ToSql, Type as PgType},
    Client, Config, Error as PgError, Statement,
};
use tracing::{debug, error, info};

use crate::{
    config::LoaderConfig,
    database::{
        postgres::generate::{generate_insert_raw_line_sql, RAW_LINE_SAVEPOINT, RAW_TABLE_NAME},
        store::RawRecordStore,
    },
    loader::RawRecord,
};

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("Can not connect to the database please make sure your DB_* settings are correct: {0}")]
    CanNotConnectToDatabase(PgError),

    #[error("Could not create tls connector: {0}")]
    CouldNotCreateTlsConnector(#[from] native_tls::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("PgError {0}")]
    PgError(#[from] PgError),
}

fn postgres_config(config: &LoaderConfig) -> Config {
    let mut pg_config = Config::new();
    pg_config
        .host(&config.host)
        .port(config.port)
        .dbname(&config.database)
        .user(&config.user)
        .password(&config.password);
    pg_config
}

/// One PostgreSQL connection used exclusively by a single load run.
pub struct PostgresRawStore {
    client: Client,
    connection_handle: JoinHandle<Result<(), PgError>>,
    insert_sql: String,
    insert_statement: Option<Statement>,
    in_transaction: bool,
}

impl PostgresRawStore {
    /// Opens the connection described by `config`. The cause of a failure is logged here,
    /// callers only decide whether to abort.
    pub async fn connect(config: &LoaderConfig) -> Result<Self, PostgresConnectionError> {
        let connector = TlsConnector::builder().build().map_err(|e| {
            error!("Could not create tls connector: {}", e);
            PostgresConnectionError::CouldNotCreateTlsConnector(e)
        })?;
        let tls_connector = MakeTlsConnector::new(connector);

        let mut pg_config = postgres_config(config);

        let first_attempt = pg_config.connect(tls_connector.clone()).await;
        let (client, connection) = match first_attempt {
            Ok(pair) => pair,
            // retry without ssl if ssl has been attempted and failed
            Err(e) if pg_config.get_ssl_mode() != SslMode::Disable => {
                debug!("Connecting with ssl failed, retrying without ssl: {}", e);
                pg_config.ssl_mode(SslMode::Disable);
                pg_config.connect(tls_connector).await.map_err(|e| {
                    error!("Error connecting to PostgreSQL: {}", e);
                    PostgresConnectionError::CanNotConnectToDatabase(e)
                })?
            }
            Err(e) => {
                error!("Error connecting to PostgreSQL: {}", e);
                return Err(PostgresConnectionError::CanNotConnectToDatabase(e));
            }
        };

        let connection_handle = task::spawn(connection);

        // Perform a simple query to check the connection
        if let Err(e) = client.query_one("SELECT 1", &[]).await {
            error!("Error connecting to PostgreSQL: {}", e);
            connection_handle.abort();
            return Err(PostgresConnectionError::CanNotConnectToDatabase(e));
        }

        info!("Connected to PostgreSQL at {}:{}/{}", config.host, config.port, config.database);

        Ok(PostgresRawStore {
            client,
            connection_handle,
            insert_sql: generate_insert_raw_line_sql(RAW_TABLE_NAME),
            insert_statement: None,
            in_transaction: false,
        })
    }

    async fn begin_if_needed(&mut self) -> Result<(), PostgresError> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn execute_insert(&mut self, record: &RawRecord) -> Result<(), PostgresError> {
        let statement = match &self.insert_statement {
            Some(statement) => statement.clone(),
            None => {
                let statement = self
                    .client
                    .prepare_typed(&self.insert_sql, &[PgType::TEXT, PgType::TIMESTAMP])
                    .await?;
                self.insert_statement = Some(statement.clone());
                statement
            }
        };

        let params: [&(dyn ToSql + Sync); 2] = [&record.raw_line, &record.inserted_at];
        self.client.execute(&statement, &params).await?;
        Ok(())
    }
}

#[async_trait]
impl RawRecordStore for PostgresRawStore {
    type Error = PostgresError;

    /// Each insert runs under its own savepoint. PostgreSQL refuses every statement in a
    /// transaction after one fails, so a rejected row is rolled back to the savepoint and
    /// the rest of the batch stays committable.
    async fn insert_raw_record(&mut self, record: &RawRecord) -> Result<(), PostgresError> {
        self.begin_if_needed().await?;
        self.client.batch_execute(&format!("SAVEPOINT {}", RAW_LINE_SAVEPOINT)).await?;

        match self.execute_insert(record).await {
            Ok(()) => {
                self.client
                    .batch_execute(&format!("RELEASE SAVEPOINT {}", RAW_LINE_SAVEPOINT))
                    .await?;
                Ok(())
            }
            Err(insert_err) => {
                if let Err(e) = self
                    .client
                    .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", RAW_LINE_SAVEPOINT))
                    .await
                {
                    error!("Could not roll back to savepoint after failed insert: {}", e);
                }
                Err(insert_err)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), PostgresError> {
        if !self.in_transaction {
            return Ok(());
        }
        // A failed COMMIT ends the transaction on the server as well.
        self.in_transaction = false;
        self.client.batch_execute("COMMIT").await.map_err(PostgresError::PgError)
    }

    async fn rollback(&mut self) -> Result<(), PostgresError> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client.batch_execute("ROLLBACK").await.map_err(PostgresError::PgError)
    }

    async fn close(self) {
        let PostgresRawStore { client, connection_handle, .. } = self;

        // Dropping the client ends the connection future
        drop(client);
        match connection_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("PostgreSQL connection ended with an error: {}", e),
            Err(e) => error!("PostgreSQL connection task failed: {}", e),
        }

        info!("PostgreSQL connection closed");
    }
}
