//! Expiry policies for unpaid appointments
//!
//! The rule deciding when an unpaid booking lapses belongs to whoever owns the
//! data store. Stores that evaluate the rule themselves take an
//! [`ExpiryPolicy`] so the rule can be swapped without touching the sweeper.

use crate::types::{Appointment, AppointmentStatus, PaymentStatus};
use chrono::{DateTime, Duration, Utc};

/// Decides whether an appointment's payment window has lapsed
pub trait ExpiryPolicy: Send + Sync {
    /// True if the appointment should be cancelled for non-payment at `now`
    fn is_expired(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool;
}

/// Expire pending bookings that stay unpaid past a fixed window.
///
/// The deadline is `created_at + payment_window`, pulled forward to the
/// appointment's start time when that comes first.
#[derive(Debug, Clone)]
pub struct PaymentWindowPolicy {
    payment_window: Duration,
}

impl PaymentWindowPolicy {
    pub fn new(payment_window: Duration) -> Self {
        Self { payment_window }
    }

    pub fn payment_window(&self) -> Duration {
        self.payment_window
    }

    /// Moment after which an unpaid booking counts as expired
    pub fn deadline(&self, appointment: &Appointment) -> DateTime<Utc> {
        let window_end = appointment.created_at + self.payment_window;
        window_end.min(appointment.start_time)
    }
}

impl Default for PaymentWindowPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(30))
    }
}

impl ExpiryPolicy for PaymentWindowPolicy {
    fn is_expired(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        if appointment.status != AppointmentStatus::PendingPayment {
            return false;
        }
        if appointment.payment_status == PaymentStatus::Paid {
            return false;
        }

        now >= self.deadline(appointment)
    }
}

impl<F> ExpiryPolicy for F
where
    F: Fn(&Appointment, DateTime<Utc>) -> bool + Send + Sync,
{
    fn is_expired(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        self(appointment, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn appointment(
        created_at: DateTime<Utc>,
        start_time: DateTime<Utc>,
        status: AppointmentStatus,
        payment_status: PaymentStatus,
    ) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            practitioner_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            start_time,
            created_at,
            status,
            payment_status,
            cancellation_reason: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_unpaid_booking_expires_after_window() {
        let policy = PaymentWindowPolicy::default();
        let created = Utc::now();
        let appt = appointment(
            created,
            created + Duration::days(2),
            AppointmentStatus::PendingPayment,
            PaymentStatus::Unpaid,
        );

        assert!(!policy.is_expired(&appt, created + Duration::minutes(29)));
        assert!(policy.is_expired(&appt, created + Duration::minutes(30)));
        assert!(policy.is_expired(&appt, created + Duration::hours(5)));
    }

    #[test]
    fn test_start_time_pulls_deadline_forward() {
        let policy = PaymentWindowPolicy::default();
        let created = Utc::now();
        let appt = appointment(
            created,
            created + Duration::minutes(10),
            AppointmentStatus::PendingPayment,
            PaymentStatus::Unpaid,
        );

        assert_eq!(policy.deadline(&appt), created + Duration::minutes(10));
        assert!(policy.is_expired(&appt, created + Duration::minutes(10)));
    }

    #[test]
    fn test_paid_and_settled_bookings_never_expire() {
        let policy = PaymentWindowPolicy::default();
        let created = Utc::now() - Duration::days(3);
        let now = Utc::now();

        let paid = appointment(
            created,
            created + Duration::days(1),
            AppointmentStatus::PendingPayment,
            PaymentStatus::Paid,
        );
        assert!(!policy.is_expired(&paid, now));

        for status in [
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Completed,
        ] {
            let appt = appointment(
                created,
                created + Duration::days(1),
                status,
                PaymentStatus::Unpaid,
            );
            assert!(!policy.is_expired(&appt, now), "status {}", status);
        }
    }

    #[test]
    fn test_closure_policy() {
        let never = |_: &Appointment, _: DateTime<Utc>| false;
        let created = Utc::now() - Duration::days(1);
        let appt = appointment(
            created,
            created,
            AppointmentStatus::PendingPayment,
            PaymentStatus::Unpaid,
        );
        assert!(!never.is_expired(&appt, Utc::now()));
    }

    proptest! {
        #[test]
        fn prop_pending_unpaid_expires_exactly_at_deadline(
            window_minutes in 1i64..10_000,
            lead_minutes in 0i64..20_000,
            offset_minutes in -20_000i64..20_000,
        ) {
            let policy = PaymentWindowPolicy::new(Duration::minutes(window_minutes));
            let created = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
            let appt = appointment(
                created,
                created + Duration::minutes(lead_minutes),
                AppointmentStatus::PendingPayment,
                PaymentStatus::Unpaid,
            );
            let now = created + Duration::minutes(offset_minutes);

            prop_assert_eq!(policy.is_expired(&appt, now), now >= policy.deadline(&appt));
        }

        #[test]
        fn prop_paid_never_expires(offset_minutes in 0i64..100_000) {
            let policy = PaymentWindowPolicy::default();
            let created = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
            let appt = appointment(
                created,
                created + Duration::hours(1),
                AppointmentStatus::PendingPayment,
                PaymentStatus::Paid,
            );

            prop_assert!(!policy.is_expired(&appt, created + Duration::minutes(offset_minutes)));
        }
    }
}
