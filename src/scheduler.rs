//! Due-account selection for the scheduled sync pass.
//!
//! Pure logic over `(now, account rows)`, no IO and no locks, so it can be
//! driven by any external trigger (timer, message, manual call) without
//! behavioral drift, and tested without mocking the network.

use crate::db::{DbAccount, SyncCadence};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};

/// Anchor hour (UTC) for daily and weekly schedules.
const DAILY_ANCHOR_HOUR: u32 = 0;
/// Anchor hours (UTC) for twice-daily schedules.
const TWICE_DAILY_ANCHOR_HOURS: [u32; 2] = [0, 12];
/// Anchor day for weekly schedules.
const WEEKLY_ANCHOR_DAY: Weekday = Weekday::Mon;

/// The schedule-relevant projection of an account row.
#[derive(Debug, Clone)]
pub struct ScheduleView {
    pub id: i64,
    pub is_active: bool,
    pub cadence: SyncCadence,
    pub last_sync: Option<DateTime<Utc>>,
}

impl From<&DbAccount> for ScheduleView {
    fn from(account: &DbAccount) -> Self {
        Self {
            id: account.id,
            is_active: account.is_active,
            cadence: account.settings().sync_cadence,
            last_sync: account.last_sync,
        }
    }
}

/// Selects the accounts due for an automatic sync at `now`.
///
/// `manual` accounts and inactive accounts are never selected. `hourly`
/// accounts are selected on every tick unless their `last_sync` falls within
/// `min_interval`, the suppression that keeps an over-eager external trigger
/// from doubling work. Anchored schedules fire only when the tick's
/// wall-clock hour (and, for weekly, day) matches; missed ticks mean a late
/// sync, which is an accepted approximation.
pub fn select_due_accounts(
    now: DateTime<Utc>,
    rows: &[ScheduleView],
    min_interval: Duration,
) -> Vec<i64> {
    rows.iter()
        .filter(|row| row.is_active && is_due(now, row.cadence, row.last_sync, min_interval))
        .map(|row| row.id)
        .collect()
}

fn is_due(
    now: DateTime<Utc>,
    cadence: SyncCadence,
    last_sync: Option<DateTime<Utc>>,
    min_interval: Duration,
) -> bool {
    match cadence {
        SyncCadence::Manual => false,
        SyncCadence::Hourly => last_sync.is_none_or(|ls| now - ls >= min_interval),
        SyncCadence::Daily => now.hour() == DAILY_ANCHOR_HOUR,
        SyncCadence::TwiceDaily => TWICE_DAILY_ANCHOR_HOURS.contains(&now.hour()),
        SyncCadence::Weekly => {
            now.weekday() == WEEKLY_ANCHOR_DAY && now.hour() == DAILY_ANCHOR_HOUR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(id: i64, cadence: SyncCadence, last_sync: Option<DateTime<Utc>>) -> ScheduleView {
        ScheduleView {
            id,
            is_active: true,
            cadence,
            last_sync,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn min_interval() -> Duration {
        Duration::minutes(30)
    }

    #[test]
    fn inactive_accounts_are_never_selected() {
        let now = at(2024, 1, 1, 0, 0);
        for cadence in [
            SyncCadence::Hourly,
            SyncCadence::Daily,
            SyncCadence::TwiceDaily,
            SyncCadence::Weekly,
        ] {
            let mut r = row(1, cadence, None);
            r.is_active = false;
            assert!(
                select_due_accounts(now, &[r], min_interval()).is_empty(),
                "{cadence:?} selected an inactive account"
            );
        }
    }

    #[test]
    fn manual_accounts_are_never_auto_selected() {
        let now = at(2024, 1, 1, 0, 0);
        let r = row(1, SyncCadence::Manual, None);
        assert!(select_due_accounts(now, &[r], min_interval()).is_empty());
    }

    #[test]
    fn hourly_selected_on_any_tick_when_never_synced() {
        let now = at(2024, 6, 3, 14, 37);
        let r = row(7, SyncCadence::Hourly, None);
        assert_eq!(select_due_accounts(now, &[r], min_interval()), vec![7]);
    }

    #[test]
    fn hourly_suppressed_within_min_interval() {
        let tick = at(2024, 6, 3, 14, 0);
        let r = row(1, SyncCadence::Hourly, Some(tick - Duration::minutes(10)));
        assert!(select_due_accounts(tick, &[r], min_interval()).is_empty());
    }

    #[test]
    fn hourly_two_close_ticks_select_at_most_once() {
        // Trigger firing every 10 minutes must not double-sync an hourly
        // account: with last_sync 25 minutes before the first tick, the
        // first tick is suppressed and only the second selects.
        let tick1 = at(2024, 6, 3, 14, 0);
        let tick2 = tick1 + Duration::minutes(10);
        let last_sync = Some(tick1 - Duration::minutes(25));

        let r = row(1, SyncCadence::Hourly, last_sync);
        let first = select_due_accounts(tick1, std::slice::from_ref(&r), min_interval());
        let second = select_due_accounts(tick2, &[r], min_interval());

        assert_eq!(first.len() + second.len(), 1);
        assert_eq!(second, vec![1]);
    }

    #[test]
    fn daily_fires_only_at_anchor_hour() {
        let r = row(2, SyncCadence::Daily, Some(at(2024, 5, 1, 0, 5)));
        assert_eq!(
            select_due_accounts(at(2024, 5, 2, 0, 0), std::slice::from_ref(&r), min_interval()),
            vec![2]
        );
        assert!(select_due_accounts(at(2024, 5, 2, 13, 0), &[r], min_interval()).is_empty());
    }

    #[test]
    fn twice_daily_fires_at_both_anchor_hours() {
        let r = row(3, SyncCadence::TwiceDaily, None);
        assert_eq!(
            select_due_accounts(at(2024, 5, 2, 0, 0), std::slice::from_ref(&r), min_interval()),
            vec![3]
        );
        assert_eq!(
            select_due_accounts(at(2024, 5, 2, 12, 0), std::slice::from_ref(&r), min_interval()),
            vec![3]
        );
        assert!(select_due_accounts(at(2024, 5, 2, 6, 0), &[r], min_interval()).is_empty());
    }

    #[test]
    fn weekly_fires_monday_midnight_only() {
        // 2024-01-01 is a Monday.
        let monday_midnight = at(2024, 1, 1, 0, 0);
        let r = row(
            4,
            SyncCadence::Weekly,
            Some(monday_midnight - Duration::weeks(1)),
        );

        assert_eq!(
            select_due_accounts(monday_midnight, std::slice::from_ref(&r), min_interval()),
            vec![4]
        );
        assert!(
            select_due_accounts(
                at(2024, 1, 1, 1, 0),
                std::slice::from_ref(&r),
                min_interval()
            )
            .is_empty()
        );
        // Tuesday midnight, wrong day.
        assert!(select_due_accounts(at(2024, 1, 2, 0, 0), &[r], min_interval()).is_empty());
    }

    #[test]
    fn mixed_population_selects_only_due_rows() {
        let now = at(2024, 1, 1, 0, 0); // Monday midnight: everything anchored fires
        let rows = vec![
            row(1, SyncCadence::Manual, None),
            row(2, SyncCadence::Hourly, Some(now - Duration::minutes(5))),
            row(3, SyncCadence::Hourly, Some(now - Duration::hours(2))),
            row(4, SyncCadence::Daily, None),
            row(5, SyncCadence::Weekly, None),
        ];
        assert_eq!(select_due_accounts(now, &rows, min_interval()), vec![3, 4, 5]);
    }
}
