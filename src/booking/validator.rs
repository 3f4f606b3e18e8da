use chrono::{Duration, Local, NaiveDate};

use crate::model::BookingRequest;

/// Longest span a booking may cover, in days.
pub const MAX_BOOKING_DAYS: i64 = 3;

/// Furthest ahead of today either endpoint may lie, in days.
pub const MAX_ADVANCE_DAYS: i64 = 30;

/// One independently evaluable constraint on a proposed date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    StartDateRequired,
    EndDateRequired,
    StartDateMustBeGreaterThanToday,
    BookingNoLongerThanThreeDays,
    BookingMustBeLessOrEqualThanThirtyDaysInAdvance,
    StartDateMustBeGreaterThanEndDate,
}

impl Rule {
    pub fn message(&self) -> &'static str {
        match self {
            Rule::StartDateRequired => "Start date is required",
            Rule::EndDateRequired => "End date is required",
            Rule::StartDateMustBeGreaterThanToday => "Start date must be greater than today",
            Rule::BookingNoLongerThanThreeDays => "Booking can't be longer than 3 days",
            Rule::BookingMustBeLessOrEqualThanThirtyDaysInAdvance => {
                "Booking must be less or equal than 30 days in advance"
            }
            Rule::StartDateMustBeGreaterThanEndDate => {
                "Start date must be greater than end date"
            }
        }
    }
}

/// The failed rules of one validation pass, in evaluation order. Produced
/// fresh per call; valid iff empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    failures: Vec<Rule>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[Rule] {
        &self.failures
    }

    pub fn messages(&self) -> Vec<&'static str> {
        self.failures.iter().map(Rule::message).collect()
    }

    fn check(&mut self, ok: bool, rule: Rule) {
        if !ok {
            self.failures.push(rule);
        }
    }
}

/// Pure rule evaluation over a proposed date range. Stateless and free of
/// I/O; "today" is read at call time, never frozen per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator;

impl RequestValidator {
    pub fn validate(&self, request: &BookingRequest) -> ValidationOutcome {
        evaluate(
            request.start_date,
            request.end_date,
            Local::now().date_naive(),
        )
    }
}

/// Evaluate every rule whose operands are present — no short-circuiting — so
/// a single pass reports all violations. A rule whose operand is missing is
/// skipped; the corresponding required-field rule already fired.
fn evaluate(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> ValidationOutcome {
    let horizon = today + Duration::days(MAX_ADVANCE_DAYS);
    let mut outcome = ValidationOutcome::default();

    outcome.check(start.is_some(), Rule::StartDateRequired);
    outcome.check(end.is_some(), Rule::EndDateRequired);
    if let Some(start) = start {
        outcome.check(start > today, Rule::StartDateMustBeGreaterThanToday);
    }
    if let (Some(start), Some(end)) = (start, end) {
        outcome.check(
            start + Duration::days(MAX_BOOKING_DAYS) >= end,
            Rule::BookingNoLongerThanThreeDays,
        );
    }
    if let Some(start) = start {
        outcome.check(
            start <= horizon,
            Rule::BookingMustBeLessOrEqualThanThirtyDaysInAdvance,
        );
    }
    if let Some(end) = end {
        // The horizon bounds both endpoints; a range can trip it twice.
        outcome.check(
            end <= horizon,
            Rule::BookingMustBeLessOrEqualThanThirtyDaysInAdvance,
        );
    }
    if let (Some(start), Some(end)) = (start, end) {
        outcome.check(start < end, Rule::StartDateMustBeGreaterThanEndDate);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn day(offset: i64) -> NaiveDate {
        today() + Duration::days(offset)
    }

    fn run(start: Option<i64>, end: Option<i64>) -> ValidationOutcome {
        evaluate(start.map(day), end.map(day), today())
    }

    #[test]
    fn missing_start_fails() {
        let outcome = run(None, Some(2));
        assert!(!outcome.is_valid());
        assert!(outcome.failures().contains(&Rule::StartDateRequired));
    }

    #[test]
    fn missing_end_fails() {
        let outcome = run(Some(1), None);
        assert!(!outcome.is_valid());
        assert_eq!(outcome.failures(), &[Rule::EndDateRequired]);
    }

    #[test]
    fn both_missing_reports_both() {
        let outcome = run(None, None);
        assert_eq!(
            outcome.failures(),
            &[Rule::StartDateRequired, Rule::EndDateRequired]
        );
    }

    #[test]
    fn start_today_is_rejected() {
        let outcome = run(Some(0), Some(2));
        assert_eq!(outcome.failures(), &[Rule::StartDateMustBeGreaterThanToday]);
    }

    #[test]
    fn start_tomorrow_passes() {
        assert!(run(Some(1), Some(3)).is_valid());
    }

    #[test]
    fn span_of_exactly_three_days_passes() {
        assert!(run(Some(1), Some(4)).is_valid());
    }

    #[test]
    fn span_of_four_days_fails() {
        let outcome = run(Some(1), Some(5));
        assert_eq!(outcome.failures(), &[Rule::BookingNoLongerThanThreeDays]);
    }

    #[test]
    fn range_ending_exactly_at_horizon_passes() {
        assert!(run(Some(28), Some(30)).is_valid());
    }

    #[test]
    fn end_past_horizon_fails() {
        let outcome = run(Some(29), Some(31));
        assert_eq!(
            outcome.failures(),
            &[Rule::BookingMustBeLessOrEqualThanThirtyDaysInAdvance]
        );
    }

    #[test]
    fn both_endpoints_past_horizon_fail_twice() {
        let outcome = run(Some(31), Some(33));
        assert_eq!(
            outcome.failures(),
            &[
                Rule::BookingMustBeLessOrEqualThanThirtyDaysInAdvance,
                Rule::BookingMustBeLessOrEqualThanThirtyDaysInAdvance,
            ]
        );
    }

    #[test]
    fn start_equal_to_end_fails() {
        let outcome = run(Some(2), Some(2));
        assert_eq!(
            outcome.failures(),
            &[Rule::StartDateMustBeGreaterThanEndDate]
        );
    }

    #[test]
    fn start_after_end_fails() {
        let outcome = run(Some(3), Some(2));
        assert_eq!(
            outcome.failures(),
            &[Rule::StartDateMustBeGreaterThanEndDate]
        );
    }

    #[test]
    fn failures_keep_rule_order() {
        // Missing end and a non-future start: both reported, in rule order.
        let outcome = run(Some(0), None);
        assert_eq!(
            outcome.failures(),
            &[Rule::EndDateRequired, Rule::StartDateMustBeGreaterThanToday]
        );
    }

    #[test]
    fn messages_are_fixed_strings() {
        let outcome = run(Some(0), Some(5));
        assert_eq!(
            outcome.messages(),
            vec![
                "Start date must be greater than today",
                "Booking can't be longer than 3 days",
            ]
        );
    }

    #[test]
    fn valid_range_has_no_failures() {
        let outcome = run(Some(1), Some(3));
        assert!(outcome.is_valid());
        assert!(outcome.failures().is_empty());
        assert!(outcome.messages().is_empty());
    }
}
