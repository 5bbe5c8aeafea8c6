//! TrackIT SQL Server access.
//!
//! One Tiberius connection per run, shared by the reader and, when work
//! orders are closed with SQL, by [`SqlCloser`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::query::{QueryParam, SourceQuery};
use super::TicketSource;
use crate::config::DatabaseConfig;
use crate::error::{MigrationError, Result};
use crate::model::ticket::SourceRow;
use crate::providers::SourceCloser;

type MssqlClient = Client<Compat<TcpStream>>;

pub struct MssqlSource {
    target: String,
    query: SourceQuery,
    client: Mutex<Option<MssqlClient>>,
}

impl MssqlSource {
    pub async fn connect(db: &DatabaseConfig, query: SourceQuery) -> Result<Self> {
        let target = format!("{}:{}/{}", db.host, db.port, db.database);
        let config = build_config(db);

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MigrationError::connectivity(&target, e))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| MigrationError::connectivity(&target, e))?;
        info!("Connected to TrackIT database {}", target);

        Ok(Self {
            target,
            query,
            client: Mutex::new(Some(client)),
        })
    }

    /// Runs a statement that returns no rows, binding params in order.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> Result<u64> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| MigrationError::connectivity(&self.target, "connection closed"))?;

        let mut query = Query::new(sql.to_string());
        bind_all(&mut query, params);
        let result = query.execute(client).await?;
        Ok(result.total())
    }

    /// Releases the connection. Later calls fail with a connectivity error.
    pub async fn close(&self) -> Result<()> {
        if let Some(client) = self.client.lock().await.take() {
            client.close().await?;
            debug!("Closed TrackIT connection {}", self.target);
        }
        Ok(())
    }
}

fn build_config(db: &DatabaseConfig) -> Config {
    let mut config = Config::new();
    config.host(&db.host);
    config.port(db.port);
    config.database(&db.database);
    config.authentication(AuthMethod::sql_server(&db.user, &db.password));

    if db.encrypt {
        if db.trust_server_cert {
            config.trust_cert();
        }
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::NotSupported);
    }
    config
}

fn bind_all(query: &mut Query<'_>, params: &[QueryParam]) {
    for param in params {
        match param {
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Text(s) => query.bind(s.clone()),
        }
    }
}

/// Text form of a cell; NULL becomes `None`.
fn cell_text(data: &ColumnData<'static>) -> Option<String> {
    match data {
        ColumnData::U8(v) => v.map(|v| v.to_string()),
        ColumnData::I16(v) => v.map(|v| v.to_string()),
        ColumnData::I32(v) => v.map(|v| v.to_string()),
        ColumnData::I64(v) => v.map(|v| v.to_string()),
        ColumnData::F32(v) => v.map(|v| v.to_string()),
        ColumnData::F64(v) => v.map(|v| v.to_string()),
        ColumnData::Bit(v) => v.map(|v| v.to_string()),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::Guid(v) => v.as_ref().map(|g| g.to_string()),
        ColumnData::Numeric(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .ok()
            .flatten()
            .map(|d| d.format("%Y-%m-%d").to_string()),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .ok()
                .flatten()
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        _ => None,
    }
}

#[async_trait]
impl TicketSource for MssqlSource {
    fn describe(&self) -> String {
        format!("TrackIT {}", self.target)
    }

    async fn fetch_rows(&self) -> Result<Vec<SourceRow>> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| MigrationError::connectivity(&self.target, "connection closed"))?;

        let mut query = Query::new(self.query.sql.clone());
        bind_all(&mut query, &self.query.params);
        let stream = query.query(client).await?;
        let rows = stream.into_first_result().await?;

        let rows: Vec<SourceRow> = rows
            .iter()
            .map(|row| {
                let mut source_row = SourceRow::new();
                for (column, data) in row.cells() {
                    source_row.insert(column.name(), cell_text(data));
                }
                source_row
            })
            .collect();

        debug!("Fetched {} rows from {}", rows.len(), self.target);
        Ok(rows)
    }
}

/// Closes work orders with a configured UPDATE on the source connection.
/// `@P1` is bound to the work order id, `@P2` to the Jira link.
pub struct SqlCloser {
    source: Arc<MssqlSource>,
    statement: String,
}

impl SqlCloser {
    pub fn new(source: Arc<MssqlSource>, statement: String) -> Self {
        Self { source, statement }
    }
}

#[async_trait]
impl SourceCloser for SqlCloser {
    fn name(&self) -> &str {
        "TrackIT SQL"
    }

    async fn close(&self, workorder_id: i64, issue_url: &str) -> Result<()> {
        let id = i32::try_from(workorder_id).map_err(|_| {
            MigrationError::api("TrackIT SQL close", format!("work order {workorder_id} out of range"))
        })?;
        let params = [QueryParam::Int(id), QueryParam::Text(issue_url.to_string())];
        let affected = self.source.execute(&self.statement, &params).await.map_err(|e| {
            MigrationError::api(format!("TrackIT SQL close {workorder_id}"), e)
        })?;
        if affected == 0 {
            return Err(MigrationError::api(
                format!("TrackIT SQL close {workorder_id}"),
                "statement updated no rows",
            ));
        }
        debug!(workorder_id, affected, "TrackIT work order closed with SQL");
        Ok(())
    }
}
