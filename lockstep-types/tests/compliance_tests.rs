use chrono::NaiveDate;
use lockstep_types::{ComplianceSnapshot, DisplayCache, EnrollmentState, SerialSource};

fn snapshot_due(date: &str) -> ComplianceSnapshot {
    ComplianceSnapshot {
        next_payment_date: Some(date.to_string()),
        ..Default::default()
    }
}

#[test]
fn days_until_payment_iso_date() {
    let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    assert_eq!(snapshot_due("2026-10-21").days_until_payment(today), Some(5));
}

#[test]
fn days_until_payment_day_first_date() {
    let today = NaiveDate::from_ymd_opt(2025, 12, 30).unwrap();
    assert_eq!(snapshot_due("31/12/2025").days_until_payment(today), Some(1));
}

#[test]
fn days_until_payment_overdue_is_negative() {
    let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    assert_eq!(snapshot_due("2026-10-10").days_until_payment(today), Some(-6));
}

#[test]
fn days_until_payment_unparseable() {
    let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    assert_eq!(snapshot_due("N/A").days_until_payment(today), None);
    assert_eq!(ComplianceSnapshot::default().days_until_payment(today), None);
}

#[test]
fn display_defaults() {
    let cache = DisplayCache::default();
    assert_eq!(cache.amount_due, "$0.00");
    assert_eq!(cache.amount_paid, "$0.00");
    assert_eq!(cache.contact_phone, "N/A");
    assert!(cache.reminder_message.is_none());
}

#[test]
fn enrollment_state_string_form() {
    for state in [
        EnrollmentState::Unenrolled,
        EnrollmentState::AdminPending,
        EnrollmentState::Identified,
        EnrollmentState::Enrolled,
    ] {
        assert_eq!(state.as_str().parse::<EnrollmentState>().unwrap(), state);
    }
    assert!("done".parse::<EnrollmentState>().is_err());
}

#[test]
fn serial_source_string_form() {
    for source in [
        SerialSource::Imei,
        SerialSource::HardwareSerial,
        SerialSource::Manual,
        SerialSource::Generated,
    ] {
        assert_eq!(source.as_str().parse::<SerialSource>().unwrap(), source);
    }
}
