use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

/// Months in which the sWIG80 basket is revised
pub const REVISION_MONTHS: [u32; 4] = [3, 6, 9, 12];

/// Index revision calendar: revisions take effect after the session on the
/// third Friday of March, June, September and December.
pub struct RevisionCalendar;

impl RevisionCalendar {
    /// Third Friday of the given month
    pub fn third_friday(year: i32, month: u32) -> Option<NaiveDate> {
        NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Fri, 3)
    }

    /// Most recent revision on or before `today`
    pub fn last_revision_date(today: NaiveDate) -> Option<NaiveDate> {
        [today.year() - 1, today.year()]
            .into_iter()
            .flat_map(|year| REVISION_MONTHS.iter().filter_map(move |&m| Self::third_friday(year, m)))
            .filter(|date| *date <= today)
            .max()
    }

    /// Whether the stored composition predates the latest revision.
    ///
    /// An update made on the revision day itself is treated as stale since
    /// the new basket only applies after that session.
    pub fn should_update_portfolio(last_update: Option<DateTime<Utc>>, today: NaiveDate) -> bool {
        let Some(last_update) = last_update else {
            return true;
        };

        match Self::last_revision_date(today) {
            Some(revision) => last_update.date_naive() <= revision,
            None => true,
        }
    }

    /// Next revision strictly after `today`
    pub fn next_revision_date(today: NaiveDate) -> Option<NaiveDate> {
        [today.year(), today.year() + 1]
            .into_iter()
            .flat_map(|year| REVISION_MONTHS.iter().filter_map(move |&m| Self::third_friday(year, m)))
            .find(|date| *date > today)
    }

    pub fn days_until_next_revision(today: NaiveDate) -> Option<i64> {
        Self::next_revision_date(today).map(|d| (d - today).num_days())
    }

    /// First day on which a download reflects the revision
    pub fn effective_date(revision: NaiveDate) -> NaiveDate {
        revision + Duration::days(1)
    }
}
