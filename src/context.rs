//! Контекст загрузки: сигнал отмены и крайний срок.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::FetchError;

/// Разделяемый флаг отмены.
///
/// Клоны указывают на один и тот же флаг: отмена через любой из них
/// видна всем.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Запросить отмену.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Контекст одного вызова `load`.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl LoadContext {
    /// Контекст без отмены и без крайнего срока.
    pub fn background() -> Self {
        Self::default()
    }

    /// Контекст с заданным токеном отмены.
    pub fn with_token(token: CancelToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Ограничить контекст таймаутом от текущего момента.
    ///
    /// Более ранний из двух сроков сохраняется.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Оставшееся время до крайнего срока.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Отменён ли контекст (явно или по истечении срока).
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.remaining().is_some_and(|r| r.is_zero())
    }

    /// Вернуть `FetchError::Cancelled`, если контекст завершён.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_done() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}
