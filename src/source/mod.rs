pub mod mssql;
pub mod query;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ticket::SourceRow;

/// Where work orders come from. One `fetch_rows` per run.
#[async_trait]
pub trait TicketSource: Send + Sync {
    fn describe(&self) -> String;
    async fn fetch_rows(&self) -> Result<Vec<SourceRow>>;
}
