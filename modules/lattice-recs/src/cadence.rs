//! Next-fire-time computation for the two wall-clock cadences, pinned to
//! a fixed UTC offset, plus the tokio loop that drives a job body.

use std::future::Future;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{error, info};

use crate::jobs::JobSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fires once a day at the given local wall-clock time.
    DailyAt { hour: u32, minute: u32 },
    /// Fires on the 1st and 15th of each month at the given local time.
    SemiMonthlyAt { hour: u32, minute: u32 },
}

impl Cadence {
    /// The first fire time strictly after `after`, in UTC.
    pub fn next_fire(&self, after: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        let local_after = after.with_timezone(&offset).naive_local();

        let next_local = match *self {
            Cadence::DailyAt { hour, minute } => {
                let time = wall_clock(hour, minute);
                let today = local_after.date().and_time(time);
                if today > local_after {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Cadence::SemiMonthlyAt { hour, minute } => {
                let time = wall_clock(hour, minute);
                let date = local_after.date();
                let months = [
                    (date.year(), date.month()),
                    next_month(date.year(), date.month()),
                ];
                // Next month's 1st always qualifies, so min() never comes
                // up empty.
                months
                    .iter()
                    .flat_map(|&(y, m)| {
                        [1, 15]
                            .into_iter()
                            .filter_map(move |day| NaiveDate::from_ymd_opt(y, m, day))
                    })
                    .map(|d| d.and_time(time))
                    .filter(|c| *c > local_after)
                    .min()
                    .unwrap_or(local_after + Duration::days(1))
            }
        };

        Utc.from_utc_datetime(&(next_local - offset))
    }
}

/// Out-of-range configuration falls back to local midnight.
fn wall_clock(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Sleep-until-due loop around a job body. A failed run is logged and
/// the loop keeps going; the job body owns all per-member isolation.
pub async fn run_on_cadence<F, Fut>(name: &'static str, cadence: Cadence, offset: FixedOffset, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<JobSummary>>,
{
    loop {
        let now = Utc::now();
        let next = cadence.next_fire(now, offset);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(job = name, next = %next, "Next scheduled run");
        tokio::time::sleep(wait).await;

        match job().await {
            Ok(summary) => info!(job = name, "Scheduled run complete. {summary}"),
            Err(e) => error!(job = name, error = %e, "Scheduled run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_fires_later_today_or_tomorrow() {
        let cadence = Cadence::DailyAt { hour: 9, minute: 0 };
        let offset = FixedOffset::east_opt(0).unwrap();

        let before = utc(2025, 3, 10, 6, 0);
        assert_eq!(cadence.next_fire(before, offset), utc(2025, 3, 10, 9, 0));

        let after = utc(2025, 3, 10, 9, 0);
        assert_eq!(cadence.next_fire(after, offset), utc(2025, 3, 11, 9, 0));
    }

    #[test]
    fn semi_monthly_picks_first_and_fifteenth() {
        let cadence = Cadence::SemiMonthlyAt { hour: 8, minute: 30 };
        let offset = FixedOffset::east_opt(0).unwrap();

        assert_eq!(
            cadence.next_fire(utc(2025, 1, 10, 12, 0), offset),
            utc(2025, 1, 15, 8, 30)
        );
        assert_eq!(
            cadence.next_fire(utc(2025, 1, 20, 12, 0), offset),
            utc(2025, 2, 1, 8, 30)
        );
        // Fire moment itself is exclusive.
        assert_eq!(
            cadence.next_fire(utc(2025, 1, 15, 8, 30), offset),
            utc(2025, 2, 1, 8, 30)
        );
    }

    #[test]
    fn semi_monthly_rolls_over_year_end() {
        let cadence = Cadence::SemiMonthlyAt { hour: 8, minute: 0 };
        let offset = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            cadence.next_fire(utc(2025, 12, 20, 0, 0), offset),
            utc(2026, 1, 1, 8, 0)
        );
    }

    #[test]
    fn offset_pins_the_local_wall_clock() {
        // 09:00 at UTC+2 is 07:00 UTC.
        let cadence = Cadence::DailyAt { hour: 9, minute: 0 };
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            cadence.next_fire(utc(2025, 3, 10, 0, 0), offset),
            utc(2025, 3, 10, 7, 0)
        );
    }
}
