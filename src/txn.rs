//! Transaction management with compile-time safety
//!
//! A read transaction pins the committed tables at its start. A write
//! transaction holds the environment write lock and mutates a private copy of
//! the tables; [`Transaction::commit`] validates and publishes the copy, and
//! dropping an uncommitted write transaction discards it.

use parking_lot::MutexGuard;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::env::Environment;
use crate::error::{Result, TransactionId};
use crate::table::Tables;

/// Transaction mode marker traits
pub mod mode {
    /// Sealed trait for transaction modes
    pub(crate) mod sealed {
        pub trait Sealed {}
    }

    /// Transaction mode trait
    pub trait Mode: sealed::Sealed {
        /// Whether this is a write transaction
        const IS_WRITE: bool;
    }
}

/// Read-only transaction mode
#[derive(Debug)]
pub struct Read;

impl mode::sealed::Sealed for Read {}
impl mode::Mode for Read {
    const IS_WRITE: bool = false;
}

/// Read-write transaction mode
#[derive(Debug)]
pub struct Write;

impl mode::sealed::Sealed for Write {}
impl mode::Mode for Write {
    const IS_WRITE: bool = true;
}

/// Mode-specific transaction data
enum ModeData<'env> {
    Read {
        tables: Arc<Tables>,
    },
    Write {
        _write_guard: MutexGuard<'env, ()>,
        working: Box<Tables>,
    },
}

/// A page store transaction
pub struct Transaction<'env, M: mode::Mode> {
    env: &'env Environment,
    id: TransactionId,
    mode_data: ModeData<'env>,
    _mode: PhantomData<M>,
}

impl<'env, M: mode::Mode> Transaction<'env, M> {
    /// Transaction ID. For a write transaction this is the ID it commits as.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Whether this transaction can write
    pub fn is_write(&self) -> bool {
        M::IS_WRITE
    }

    /// Tables visible to this transaction
    pub fn tables(&self) -> &Tables {
        match &self.mode_data {
            ModeData::Read { tables } => tables,
            ModeData::Write { working, .. } => working,
        }
    }
}

impl<'env> Transaction<'env, Read> {
    pub(crate) fn new_read(env: &'env Environment) -> Self {
        let inner = env.inner();
        let tables = Arc::clone(&inner.committed.read());
        let id = TransactionId(inner.txn_id.load(Ordering::Acquire));
        Self { env, id, mode_data: ModeData::Read { tables }, _mode: PhantomData }
    }
}

impl<'env> Transaction<'env, Write> {
    pub(crate) fn new_write(env: &'env Environment) -> Self {
        let inner = env.inner();
        let guard = inner.write_lock.lock();
        let working = Box::new(Tables::clone(&inner.committed.read()));
        let id = TransactionId(inner.txn_id.load(Ordering::Acquire) + 1);
        Self {
            env,
            id,
            mode_data: ModeData::Write { _write_guard: guard, working },
            _mode: PhantomData,
        }
    }

    /// Mutable access to the working tables
    pub fn tables_mut(&mut self) -> &mut Tables {
        match &mut self.mode_data {
            ModeData::Write { working, .. } => working,
            // Write transactions are always built with write data
            ModeData::Read { .. } => unreachable!("write transaction without working tables"),
        }
    }

    /// Validate, persist and publish the working tables.
    ///
    /// On error nothing becomes visible and the write lock is released.
    pub fn commit(self) -> Result<TransactionId> {
        let Transaction { env, id, mode_data, .. } = self;
        let ModeData::Write { _write_guard, working } = mode_data else {
            unreachable!("write transaction without working tables");
        };
        let inner = env.inner();

        working.check_references()?;
        inner.persist(&working)?;

        *inner.committed.write() = Arc::new(*working);
        inner.txn_id.store(id.0, Ordering::Release);
        debug!(txn = %id, "committed page store transaction");
        Ok(id)
    }

    /// Discard the working tables
    pub fn abort(self) {
        debug!(txn = %self.id, "aborted page store transaction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvBuilder;
    use crate::error::{Error, PersistenceError};
    use crate::model::VersionKind;
    use crate::table::{MetadataRow, PageRow};
    use serde_json::Value;

    fn root_row() -> PageRow {
        PageRow { code: "home".into(), parent_code: None, pos: 1, group_code: "free".into() }
    }

    fn metadata() -> MetadataRow {
        MetadataRow {
            titles: Default::default(),
            model_code: "home".into(),
            show_in_menu: false,
            extra_config: Value::Null,
            updated_at: None,
        }
    }

    #[test]
    fn test_commit_publishes_and_bumps_id() {
        let env = EnvBuilder::new().open_in_memory().unwrap();
        assert!(!env.read_txn().unwrap().is_write());
        let mut txn = env.write_txn().unwrap();
        assert!(txn.is_write());
        assert_eq!(txn.id(), TransactionId(1));
        txn.tables_mut().insert_page(root_row()).unwrap();
        txn.tables_mut().insert_metadata(VersionKind::Draft, "home", metadata()).unwrap();
        assert_eq!(txn.commit().unwrap(), TransactionId(1));

        assert_eq!(env.last_txn_id(), TransactionId(1));
        assert!(env.read_txn().unwrap().tables().page("home").is_some());
    }

    #[test]
    fn test_drop_discards_changes() {
        let env = EnvBuilder::new().open_in_memory().unwrap();
        {
            let mut txn = env.write_txn().unwrap();
            txn.tables_mut().insert_page(root_row()).unwrap();
        }
        let txn = env.write_txn().unwrap();
        assert_eq!(txn.tables().page_count(), 0);
        txn.abort();
        assert_eq!(env.last_txn_id(), TransactionId(0));
    }

    #[test]
    fn test_dangling_reference_fails_commit() {
        let env = EnvBuilder::new().open_in_memory().unwrap();
        let mut txn = env.write_txn().unwrap();
        txn.tables_mut().insert_page(root_row()).unwrap();
        match txn.commit() {
            Err(Error::Persistence(PersistenceError::Constraint { .. })) => {}
            other => panic!("Expected constraint violation, got {:?}", other),
        }
        assert_eq!(env.read_txn().unwrap().tables().page_count(), 0);
    }

    #[test]
    fn test_read_txn_is_isolated_from_later_commits() {
        let env = EnvBuilder::new().open_in_memory().unwrap();
        let before = env.read_txn().unwrap();

        let mut txn = env.write_txn().unwrap();
        txn.tables_mut().insert_page(root_row()).unwrap();
        txn.tables_mut().insert_metadata(VersionKind::Draft, "home", metadata()).unwrap();
        txn.commit().unwrap();

        assert_eq!(before.tables().page_count(), 0);
        assert_eq!(env.read_txn().unwrap().tables().page_count(), 1);
    }

    #[test]
    fn test_injected_failure_rolls_back() {
        let env = EnvBuilder::new().open_in_memory().unwrap();
        env.fail_next_commit();
        let mut txn = env.write_txn().unwrap();
        txn.tables_mut().insert_page(root_row()).unwrap();
        txn.tables_mut().insert_metadata(VersionKind::Draft, "home", metadata()).unwrap();
        assert!(txn.commit().unwrap_err().is_persistence());
        assert_eq!(env.read_txn().unwrap().tables().page_count(), 0);
        assert_eq!(env.last_txn_id(), TransactionId(0));
    }
}
