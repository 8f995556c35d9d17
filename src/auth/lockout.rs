use chrono::{DateTime, Duration, Utc};

/// Outcome of recording a failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Value stored in `failed_login_attempts` after the update.
    pub attempts: i32,
    /// Set when this failure locked the account.
    pub locked_until: Option<DateTime<Utc>>,
}

/// Account lockout after repeated failed logins.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: i32,
    pub duration: Duration,
}

impl LockoutPolicy {
    pub fn new(max_attempts: i32, lockout_minutes: i64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            duration: Duration::minutes(lockout_minutes),
        }
    }

    pub fn is_locked(&self, locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        locked_until.map(|until| until > now).unwrap_or(false)
    }

    /// Interprets the row written by `db::users::record_failed_login`.
    ///
    /// The counter is incremented in the database and reset to zero only by the
    /// failure that locks the account, so a zero counter means this failure locked it.
    pub fn outcome(&self, attempts: i32, locked_until: Option<DateTime<Utc>>) -> FailureOutcome {
        FailureOutcome {
            attempts,
            locked_until: if attempts == 0 { locked_until } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_counter_means_locked_now() {
        let policy = LockoutPolicy::new(3, 15);
        let now = Utc::now();
        let until = now + Duration::minutes(15);

        let counted = policy.outcome(2, Some(now - Duration::hours(1)));
        assert_eq!(counted.attempts, 2);
        assert!(counted.locked_until.is_none());

        let locked = policy.outcome(0, Some(until));
        assert_eq!(locked.locked_until, Some(until));
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let policy = LockoutPolicy::new(0, 15);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_is_locked() {
        let policy = LockoutPolicy::new(5, 15);
        let now = Utc::now();
        assert!(!policy.is_locked(None, now));
        assert!(policy.is_locked(Some(now + Duration::minutes(1)), now));
        assert!(!policy.is_locked(Some(now - Duration::seconds(1)), now));
    }
}
