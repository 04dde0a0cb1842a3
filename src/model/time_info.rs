//! Creation, modification, access and expiry bookkeeping

use chrono::{DateTime, Utc};

use crate::utils::{now, truncate_to_seconds};

/// Timestamps and usage counter shared by groups and entries
///
/// Every timestamp is UTC at whole-second precision; the `DateTime<Utc>`
/// parameter type rules out local or offset times at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeInfo {
    last_modification_time: DateTime<Utc>,
    creation_time: DateTime<Utc>,
    last_access_time: DateTime<Utc>,
    expiry_time: DateTime<Utc>,
    expires: bool,
    usage_count: i32,
    location_changed: DateTime<Utc>,
}

impl Default for TimeInfo {
    fn default() -> Self {
        let current = now();
        Self {
            last_modification_time: current,
            creation_time: current,
            last_access_time: current,
            expiry_time: current,
            expires: false,
            usage_count: 0,
            location_changed: current,
        }
    }
}

impl TimeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_modification_time(&self) -> DateTime<Utc> {
        self.last_modification_time
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn last_access_time(&self) -> DateTime<Utc> {
        self.last_access_time
    }

    pub fn expiry_time(&self) -> DateTime<Utc> {
        self.expiry_time
    }

    pub fn expires(&self) -> bool {
        self.expires
    }

    pub fn usage_count(&self) -> i32 {
        self.usage_count
    }

    pub fn location_changed(&self) -> DateTime<Utc> {
        self.location_changed
    }

    pub fn set_last_modification_time(&mut self, dt: DateTime<Utc>) {
        self.last_modification_time = truncate_to_seconds(dt);
    }

    pub fn set_creation_time(&mut self, dt: DateTime<Utc>) {
        self.creation_time = truncate_to_seconds(dt);
    }

    pub fn set_last_access_time(&mut self, dt: DateTime<Utc>) {
        self.last_access_time = truncate_to_seconds(dt);
    }

    pub fn set_expiry_time(&mut self, dt: DateTime<Utc>) {
        self.expiry_time = truncate_to_seconds(dt);
    }

    pub fn set_expires(&mut self, expires: bool) {
        self.expires = expires;
    }

    pub fn set_usage_count(&mut self, count: i32) {
        self.usage_count = count;
    }

    pub fn set_location_changed(&mut self, dt: DateTime<Utc>) {
        self.location_changed = truncate_to_seconds(dt);
    }

    /// True when expiry is enabled and the expiry time has passed
    pub fn is_expired(&self) -> bool {
        self.expires && self.expiry_time <= Utc::now()
    }

    /// Stamp modification and access with the current time
    pub(crate) fn touch_modified(&mut self) {
        let current = now();
        self.last_modification_time = current;
        self.last_access_time = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Timelike};

    #[test]
    fn test_defaults() {
        let times = TimeInfo::new();
        assert!(!times.expires());
        assert_eq!(times.usage_count(), 0);
        assert_eq!(times.creation_time(), times.last_modification_time());
        assert!(!times.is_expired());
    }

    #[test]
    fn test_setters_truncate_subseconds() {
        let mut times = TimeInfo::new();
        let dt = Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap() + Duration::milliseconds(750);
        times.set_creation_time(dt);
        assert_eq!(times.creation_time().nanosecond(), 0);
        assert_eq!(times.creation_time().second(), 9);
    }

    #[test]
    fn test_is_expired() {
        let mut times = TimeInfo::new();
        times.set_expiry_time(Utc::now() - Duration::days(1));
        assert!(!times.is_expired());
        times.set_expires(true);
        assert!(times.is_expired());
        times.set_expiry_time(Utc::now() + Duration::days(1));
        assert!(!times.is_expired());
    }
}
