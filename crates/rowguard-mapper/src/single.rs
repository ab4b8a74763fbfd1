// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A mapper over exactly one row.

use rowguard_core::{IsolationLevel, Record, RowGuardError, Session, Timestamp, WhereSet};
use tracing::debug;

use crate::mapper::{EditState, RecordMapper};
use crate::strategy::{ConflictStrategy, Pessimistic};

/// [`RecordMapper`] narrowed to a single row.
///
/// `edit` fails with `DataNotFound` when the filter matches nothing (unless a
/// default record was supplied) and with `AmbiguousRecord` when it matches
/// more than one row. Either way the edit is undone before returning.
pub struct SingleRecordMapper<S: ConflictStrategy> {
    inner: RecordMapper<S>,
    default_record: Option<Record>,
    substituted: bool,
}

impl<S: ConflictStrategy> SingleRecordMapper<S> {
    pub fn new(
        session: Box<dyn Session>,
        table: &str,
        strategy: S,
    ) -> Result<Self, RowGuardError> {
        Ok(Self {
            inner: RecordMapper::new(session, table, strategy)?,
            default_record: None,
            substituted: false,
        })
    }

    pub fn with_filter(mut self, filter: impl WhereSet + 'static) -> Self {
        self.inner = self.inner.with_filter(filter);
        self
    }

    /// Record to edit when the filter matches no row.
    pub fn with_default(mut self, record: Record) -> Self {
        self.default_record = Some(record);
        self
    }

    pub fn ignore_conflict_detection(mut self, ignore: bool) -> Self {
        self.inner = self.inner.ignore_conflict_detection(ignore);
        self
    }

    pub async fn edit(&mut self) -> Result<(), RowGuardError> {
        if self.inner.is_editing() {
            return Ok(());
        }
        self.inner.edit().await?;
        let count = self.inner.records().len();
        match count {
            1 => {
                self.substituted = false;
                Ok(())
            }
            0 => match self.default_record.clone() {
                Some(default) => {
                    debug!(table = %self.inner.table(), "no row matched; editing the default record");
                    self.inner.replace_records(vec![default]);
                    self.substituted = true;
                    Ok(())
                }
                None => {
                    self.inner.abort_edit().await;
                    Err(RowGuardError::DataNotFound {
                        table: self.inner.table().to_string(),
                    })
                }
            },
            count => {
                self.inner.abort_edit().await;
                Err(RowGuardError::AmbiguousRecord {
                    table: self.inner.table().to_string(),
                    count,
                })
            }
        }
    }

    fn current(&self) -> Result<&Record, RowGuardError> {
        self.inner.records().first().ok_or_else(|| {
            RowGuardError::TransactionState(format!(
                "no record on {}: call edit first",
                self.inner.table()
            ))
        })
    }

    /// The row being edited.
    pub fn record(&self) -> Result<&Record, RowGuardError> {
        self.current()
    }

    pub fn record_mut(&mut self) -> Result<&mut Record, RowGuardError> {
        let table = self.inner.table().to_string();
        self.inner.records_mut().first_mut().ok_or_else(|| {
            RowGuardError::TransactionState(format!("no record on {table}: call edit first"))
        })
    }

    /// Whether the record came from `with_default` rather than the table.
    pub fn is_new(&self) -> bool {
        self.substituted
    }

    pub fn identifier(&self) -> Option<String> {
        self.current()
            .ok()
            .and_then(|record| self.inner.strategy().identifier(record))
    }

    pub fn last_update_time(&self) -> Option<Timestamp> {
        self.current()
            .ok()
            .and_then(|record| self.inner.strategy().last_update_time(record))
    }

    pub fn state(&self) -> EditState {
        self.inner.state()
    }

    pub fn session_mut(&mut self) -> &mut dyn Session {
        self.inner.session_mut()
    }

    pub fn mapper(&self) -> &RecordMapper<S> {
        &self.inner
    }

    pub async fn detect_conflict(&mut self) -> Result<(), RowGuardError> {
        self.inner.detect_conflict().await
    }

    pub async fn begin_save(&mut self, level: IsolationLevel) -> Result<(), RowGuardError> {
        self.inner.begin_save(level).await
    }

    pub async fn commit(&mut self) -> Result<(), RowGuardError> {
        self.inner.commit().await
    }

    pub async fn close(&mut self) -> Result<(), RowGuardError> {
        self.inner.close().await
    }
}

impl SingleRecordMapper<Pessimistic> {
    pub async fn forcibly_close(&mut self) -> Result<(), RowGuardError> {
        self.inner.forcibly_close().await
    }
}
