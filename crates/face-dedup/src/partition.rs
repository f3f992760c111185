use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use common::frames::ImageLocation;

/// Calendar partition of a frame's capture time in the configured timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePartition {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl TimePartition {
    /// Partition a fractional Unix timestamp. Callers validate the timestamp
    /// first; anything outside chrono's range falls back to the epoch.
    pub fn from_timestamp(ts: f64, tz: Tz) -> Self {
        let secs = ts.floor();
        let nanos = ((ts - secs) * 1e9) as u32;
        let utc = DateTime::<Utc>::from_timestamp(secs as i64, nanos).unwrap_or_default();
        Self::from_datetime(&utc.with_timezone(&tz))
    }

    pub fn from_datetime<Z: TimeZone>(dt: &DateTime<Z>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
        }
    }

    /// Year and month (`YYYYMM`), used to query records by time range
    pub fn partition_key(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    /// Object key path segment (`YYYY/MM/DD/HH`)
    pub fn key_path(&self) -> String {
        format!(
            "{:04}/{:02}/{:02}/{:02}",
            self.year, self.month, self.day, self.hour
        )
    }
}

/// Where frame images are written in the object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub bucket: String,
    /// Normalized key prefix: empty or ending in `/`
    pub key_root: String,
}

impl StorageLayout {
    pub fn image_location(&self, partition: &TimePartition, frame_id: &str) -> ImageLocation {
        ImageLocation {
            bucket: self.bucket.clone(),
            key: format!("{}{}/{}.jpg", self.key_root, partition.key_path(), frame_id),
        }
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            bucket: "frames".to_string(),
            key_root: "frames/".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-31T23:30:00Z
    const END_OF_JANUARY_UTC: f64 = 1_706_743_800.0;

    #[test]
    fn test_partition_in_utc() {
        let partition = TimePartition::from_timestamp(END_OF_JANUARY_UTC + 0.75, Tz::UTC);

        assert_eq!(partition.partition_key(), "202401");
        assert_eq!(partition.key_path(), "2024/01/31/23");
    }

    #[test]
    fn test_partition_follows_configured_timezone() {
        // 00:30 on Feb 1st in Berlin (UTC+1)
        let berlin = TimePartition::from_timestamp(END_OF_JANUARY_UTC, chrono_tz::Europe::Berlin);
        assert_eq!(berlin.partition_key(), "202402");
        assert_eq!(berlin.key_path(), "2024/02/01/00");

        // 15:30 on Jan 31st in Los Angeles (UTC-8)
        let pacific =
            TimePartition::from_timestamp(END_OF_JANUARY_UTC, chrono_tz::America::Los_Angeles);
        assert_eq!(pacific.partition_key(), "202401");
        assert_eq!(pacific.key_path(), "2024/01/31/15");
    }

    #[test]
    fn test_out_of_range_timestamp_falls_back_to_epoch() {
        let partition = TimePartition::from_timestamp(1e30, Tz::UTC);
        assert_eq!(partition.partition_key(), "197001");
    }

    #[test]
    fn test_image_location() {
        let layout = StorageLayout {
            bucket: "camera-frames".to_string(),
            key_root: "frames/".to_string(),
        };
        let partition = TimePartition::from_timestamp(END_OF_JANUARY_UTC, Tz::UTC);

        let location = layout.image_location(&partition, "f-123");
        assert_eq!(location.bucket, "camera-frames");
        assert_eq!(location.key, "frames/2024/01/31/23/f-123.jpg");

        let rootless = StorageLayout {
            bucket: "camera-frames".to_string(),
            key_root: String::new(),
        };
        assert_eq!(
            rootless.image_location(&partition, "f-123").key,
            "2024/01/31/23/f-123.jpg"
        );
    }
}
