// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session factory for one SQLite database file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rowguard_config::model::SqliteConfig;
use rowguard_core::{RowGuardError, Session, SessionFactory};

use crate::gate::IsolationGate;
use crate::session::FileSession;

/// Opens [`FileSession`]s against one file, all admitted by the same gate.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: String,
    gate: Arc<IsolationGate>,
    busy_timeout: Duration,
}

impl SqliteConnector {
    pub fn new(path: impl Into<String>, gate: Arc<IsolationGate>) -> Self {
        Self {
            path: path.into(),
            gate,
            busy_timeout: Duration::ZERO,
        }
    }

    pub fn from_config(config: &SqliteConfig, gate: Arc<IsolationGate>) -> Self {
        Self::new(config.database_path.clone(), gate)
            .with_busy_timeout(Duration::from_millis(config.busy_timeout_ms))
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn gate(&self) -> &Arc<IsolationGate> {
        &self.gate
    }

    pub async fn open(&self) -> Result<FileSession, RowGuardError> {
        FileSession::open(&self.path, self.gate.clone(), self.busy_timeout).await
    }
}

#[async_trait]
impl SessionFactory for SqliteConnector {
    async fn create_database_for_editing(&self) -> Result<Box<dyn Session>, RowGuardError> {
        Ok(Box::new(self.open().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowguard_core::IsolationLevel;

    #[tokio::test]
    async fn factory_sessions_share_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factory.db");
        let gate = Arc::new(IsolationGate::new());
        let connector = SqliteConnector::new(path.to_str().unwrap(), gate.clone());

        let mut first = connector.create_database_for_editing().await.unwrap();
        let mut second = connector.create_database_for_editing().await.unwrap();

        first.begin(IsolationLevel::Exclusive).await.unwrap();
        let err = second.begin(IsolationLevel::Exclusive).await.unwrap_err();
        assert!(matches!(err, RowGuardError::TransactionState(_)));

        first.close().await.unwrap();
        assert_eq!(gate.current(), IsolationLevel::NoLock);
        second.begin(IsolationLevel::Exclusive).await.unwrap();
        second.close().await.unwrap();
    }

    #[test]
    fn from_config_applies_busy_timeout() {
        let config = SqliteConfig {
            database_path: "/tmp/x.db".to_string(),
            busy_timeout_ms: 250,
        };
        let connector = SqliteConnector::from_config(&config, Arc::new(IsolationGate::new()));
        assert_eq!(connector.path(), "/tmp/x.db");
        assert_eq!(connector.busy_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn open_in_missing_directory_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/app.db");
        let connector = SqliteConnector::new(path.to_str().unwrap(), Arc::new(IsolationGate::new()));
        let err = connector.open().await.err().unwrap();
        assert!(matches!(err, RowGuardError::Connection { .. }));
    }
}
