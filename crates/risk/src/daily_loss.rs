use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

/// Accumulates realized losses over the current UTC day.
///
/// The total resets automatically at the UTC day boundary on the next
/// access. Only losses are recorded; profitable closes leave the total
/// untouched so the limit acts as a pure circuit breaker.
#[derive(Debug)]
pub struct DailyLossTracker {
    state: Mutex<DayState>,
}

#[derive(Debug)]
struct DayState {
    day: NaiveDate,
    loss: Decimal,
}

impl DailyLossTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DayState {
                day: Utc::now().date_naive(),
                loss: Decimal::ZERO,
            }),
        }
    }

    /// Records a realized loss. `amount` is the magnitude of the loss and
    /// must be non-negative; zero is accepted and ignored.
    pub async fn record_loss(&self, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        let mut state = self.state.lock().await;
        Self::roll_over(&mut state);
        state.loss += amount;
        tracing::debug!(loss = %state.loss, "daily loss updated");
    }

    /// The accumulated loss for the current UTC day.
    pub async fn current(&self) -> Decimal {
        let mut state = self.state.lock().await;
        Self::roll_over(&mut state);
        state.loss
    }

    /// Clears the running total without waiting for the day boundary.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.day = Utc::now().date_naive();
        state.loss = Decimal::ZERO;
    }

    fn roll_over(state: &mut DayState) {
        let today = Utc::now().date_naive();
        if state.day != today {
            tracing::info!(previous_loss = %state.loss, "new UTC day, daily loss counter reset");
            state.day = today;
            state.loss = Decimal::ZERO;
        }
    }
}

impl Default for DailyLossTracker {
    fn default() -> Self {
        Self::new()
    }
}
