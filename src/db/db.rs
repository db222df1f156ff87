// db/db.rs
use async_trait::async_trait;
use sqlx::{Error, Pool, Postgres};

use super::marketdb::{MarketTx, PgMarketTx};

/// Entry point to a transactional store. Every multi-entity operation runs inside the
/// `MarketTx` returned by `begin`; dropping it without `commit` rolls everything back.
#[async_trait]
pub trait MarketStore: Send + Sync + std::fmt::Debug {
    async fn begin(&self) -> Result<Box<dyn MarketTx>, Error>;

    fn backend(&self) -> &str;
}

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

#[async_trait]
impl MarketStore for DBClient {
    async fn begin(&self) -> Result<Box<dyn MarketTx>, Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgMarketTx::new(tx)))
    }

    fn backend(&self) -> &str {
        "postgres"
    }
}
