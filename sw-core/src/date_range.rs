use chrono::NaiveDate;

/// An inclusive range of calendar days that yields each day from the
/// start through the end.
#[derive(Clone, Eq, PartialEq, Copy, Debug)]
pub struct DateRange(pub NaiveDate, pub NaiveDate);

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.0
    }

    pub fn end(&self) -> NaiveDate {
        self.1
    }

    /// Number of days the range yields; zero when end precedes start.
    pub fn num_days(&self) -> usize {
        let span = (self.1 - self.0).num_days();
        if span < 0 {
            0
        } else {
            span as usize + 1
        }
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.0 <= *date && *date <= self.1
    }
}

impl Iterator for DateRange {
    type Item = NaiveDate;
    fn next(&mut self) -> Option<Self::Item> {
        if self.0 > self.1 {
            return None;
        }
        let current = self.0;
        match current.succ_opt() {
            Some(next) => self.0 = next,
            // NaiveDate::MAX has no successor; close the range instead
            None => self.1 = current.pred_opt().unwrap_or(current),
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::DateRange;
    use chrono::NaiveDate;

    #[test]
    fn test_date_range_iteration() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let range = DateRange(start, end);
        assert_eq!(range.num_days(), 5);
        let dates: Vec<NaiveDate> = range.collect();
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[0], start);
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(dates[4], end);
    }

    #[test]
    fn test_date_range_single_day() {
        let start = NaiveDate::from_ymd_opt(2022, 3, 15).unwrap();
        let range = DateRange(start, start);
        assert_eq!(range.num_days(), 1);
        let dates: Vec<NaiveDate> = range.collect();
        assert_eq!(dates, vec![start]);
    }

    #[test]
    fn test_date_range_empty() {
        let start = NaiveDate::from_ymd_opt(2022, 3, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2022, 3, 14).unwrap();
        let range = DateRange(start, end);
        assert_eq!(range.num_days(), 0);
        assert!(!range.contains(&start));
        assert_eq!(range.count(), 0);
    }
}
