use crate::{error::Error, record::Record};
use async_trait::async_trait;

///
/// CollectionHooks
///
/// Per-entity behaviour run after successful writes. The write has
/// already been applied when a hook runs, so hook failures are logged and
/// never fail the operation.
///

#[async_trait]
pub trait CollectionHooks: Send + Sync {
    async fn on_create(&self, _record: &Record) -> Result<(), Error> {
        Ok(())
    }

    async fn on_create_many(&self, _records: &[Record]) -> Result<(), Error> {
        Ok(())
    }
}

///
/// NoHooks
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl CollectionHooks for NoHooks {}
