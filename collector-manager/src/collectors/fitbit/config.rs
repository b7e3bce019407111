use std::time::Duration;

pub const PROFILE_PATH: &str = "/1/user/-/profile.json";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

pub const INTRADAY_TODAY_EVERY: Duration = Duration::from_secs(3 * MINUTE);
pub const INTRADAY_YESTERDAY_EVERY: Duration = Duration::from_secs(HOUR);
pub const BATTERY_EVERY: Duration = Duration::from_secs(20 * MINUTE);
pub const MONTHLY_FAMILY_EVERY: Duration = Duration::from_secs(3 * HOUR);
pub const SLEEP_EVERY: Duration = Duration::from_secs(4 * HOUR);
pub const YEARLY_FAMILY_EVERY: Duration = Duration::from_secs(6 * HOUR);
pub const HOURLY_EVERY: Duration = Duration::from_secs(HOUR);
pub const CARDIO_TEMPERATURE_EVERY: Duration = Duration::from_secs(6 * HOUR);
pub const ACTIVITY_SUMMARY_EVERY: Duration = Duration::from_secs(24 * HOUR);
pub const LIFETIME_EVERY: Duration = Duration::from_secs(12 * HOUR);

/// Page size and inter-page delay for the ECG listing.
pub const ECG_PAGE_SIZE: usize = 10;
pub const ECG_PAGE_DELAY: Duration = Duration::from_secs(1);

/// How many recent activities one run fetches.
pub const RECENT_ACTIVITY_LIMIT: usize = 50;

pub const ACTIVITY_MINUTE_SERIES: [&str; 4] = [
    "minutesSedentary",
    "minutesLightlyActive",
    "minutesFairlyActive",
    "minutesVeryActive",
];

/// Tracker series and the measurement each is stored under.
pub const ACTIVITY_TOTAL_SERIES: [(&str, &str); 3] = [
    ("distance", "distance"),
    ("calories", "calories"),
    ("steps", "Total Steps"),
];

/// Heart-rate zone names in the order the API returns them.
pub const HEART_ZONE_FIELDS: [&str; 4] = ["Normal", "Fat Burn", "Cardio", "Peak"];
