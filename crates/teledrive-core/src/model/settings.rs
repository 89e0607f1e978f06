//! Process-wide runtime settings singleton.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy for removing a finished torrent's engine-local payload copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Remove as soon as the task completes.
    Immediate,
    /// Remove after a fixed delay.
    Fixed,
    /// Remove after a delay drawn uniformly from a configured window.
    Random,
}

impl CleanupPolicy {
    /// Stable database label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Fixed => "fixed",
            Self::Random => "random",
        }
    }

    /// Parse a database label; `None` for unknown labels.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "immediate" => Some(Self::Immediate),
            "fixed" => Some(Self::Fixed),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

const MIB: i64 = 1024 * 1024;

/// Mutable operational knobs, stored as a single database row.
///
/// Every read goes through the database; a patch is visible to the next
/// operation without any cache invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Global cap on in-flight chunk uploads.
    pub upload_concurrency: i32,
    /// Global cap on in-flight chunk fetches per download.
    pub download_concurrency: i32,
    /// Chunk size handed to new upload sessions.
    pub upload_chunk_size_bytes: i64,
    /// Disk bytes kept free for scratch space.
    pub reserved_disk_bytes: i64,
    /// Hours before an unfinished upload session expires.
    pub upload_session_ttl_hours: i32,
    /// Minutes between upload-session sweeper passes.
    pub upload_session_cleanup_interval_min: i32,
    /// Thumbnail cache size cap in bytes.
    pub thumbnail_cache_max_bytes: i64,
    /// Thumbnail cache entry lifetime in hours.
    pub thumbnail_cache_ttl_hours: i32,
    /// Concurrent thumbnail generations.
    pub thumbnail_generate_concurrency: i32,
    /// PHC-format Argon2 hash of the vault password; `None` until set.
    pub vault_password_hash: Option<String>,
    /// Minutes a vault unlock session stays valid.
    pub vault_session_ttl_minutes: i32,
    /// Source-cleanup policy for finished torrent tasks.
    pub torrent_cleanup_policy: CleanupPolicy,
    /// Delay minutes for the `fixed` cleanup policy.
    pub torrent_cleanup_fixed_minutes: i32,
    /// Lower bound minutes for the `random` cleanup policy.
    pub torrent_cleanup_min_minutes: i32,
    /// Upper bound minutes for the `random` cleanup policy.
    pub torrent_cleanup_max_minutes: i32,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RuntimeSettings {
    /// Built-in defaults applied on first read.
    #[must_use]
    pub fn defaults(now: DateTime<Utc>) -> Self {
        Self {
            upload_concurrency: 1,
            download_concurrency: 1,
            upload_chunk_size_bytes: 20 * MIB,
            reserved_disk_bytes: 0,
            upload_session_ttl_hours: 24,
            upload_session_cleanup_interval_min: 30,
            thumbnail_cache_max_bytes: 10 * 1024 * MIB,
            thumbnail_cache_ttl_hours: 720,
            thumbnail_generate_concurrency: 1,
            vault_password_hash: None,
            vault_session_ttl_minutes: 60,
            torrent_cleanup_policy: CleanupPolicy::Fixed,
            torrent_cleanup_fixed_minutes: 60,
            torrent_cleanup_min_minutes: 30,
            torrent_cleanup_max_minutes: 180,
            updated_at: now,
        }
    }

    /// Clamp every knob into its documented range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.upload_concurrency = self.upload_concurrency.clamp(1, 16);
        self.download_concurrency = self.download_concurrency.clamp(1, 32);
        self.upload_chunk_size_bytes = self.upload_chunk_size_bytes.clamp(MIB, 20 * MIB);
        self.reserved_disk_bytes = self.reserved_disk_bytes.max(0);
        self.upload_session_ttl_hours = self.upload_session_ttl_hours.clamp(1, 720);
        self.upload_session_cleanup_interval_min =
            self.upload_session_cleanup_interval_min.clamp(1, 1440);
        self.thumbnail_cache_max_bytes = self.thumbnail_cache_max_bytes.max(0);
        self.thumbnail_cache_ttl_hours = self.thumbnail_cache_ttl_hours.clamp(1, 8760);
        self.thumbnail_generate_concurrency = self.thumbnail_generate_concurrency.clamp(1, 4);
        self.vault_session_ttl_minutes = self.vault_session_ttl_minutes.clamp(1, 1440);
        self.torrent_cleanup_fixed_minutes = self.torrent_cleanup_fixed_minutes.clamp(1, 10_080);
        self.torrent_cleanup_min_minutes = self.torrent_cleanup_min_minutes.clamp(1, 10_080);
        self.torrent_cleanup_max_minutes = self
            .torrent_cleanup_max_minutes
            .clamp(self.torrent_cleanup_min_minutes, 10_080);
        self
    }

    /// Merge the non-null fields of a patch, then clamp.
    #[must_use]
    pub fn apply(mut self, patch: SettingsPatch, now: DateTime<Utc>) -> Self {
        if let Some(value) = patch.upload_concurrency {
            self.upload_concurrency = value;
        }
        if let Some(value) = patch.download_concurrency {
            self.download_concurrency = value;
        }
        if let Some(value) = patch.upload_chunk_size_bytes {
            self.upload_chunk_size_bytes = value;
        }
        if let Some(value) = patch.reserved_disk_bytes {
            self.reserved_disk_bytes = value;
        }
        if let Some(value) = patch.upload_session_ttl_hours {
            self.upload_session_ttl_hours = value;
        }
        if let Some(value) = patch.upload_session_cleanup_interval_min {
            self.upload_session_cleanup_interval_min = value;
        }
        if let Some(value) = patch.thumbnail_cache_max_bytes {
            self.thumbnail_cache_max_bytes = value;
        }
        if let Some(value) = patch.thumbnail_cache_ttl_hours {
            self.thumbnail_cache_ttl_hours = value;
        }
        if let Some(value) = patch.thumbnail_generate_concurrency {
            self.thumbnail_generate_concurrency = value;
        }
        if let Some(value) = patch.vault_password_hash {
            self.vault_password_hash = Some(value);
        }
        if let Some(value) = patch.vault_session_ttl_minutes {
            self.vault_session_ttl_minutes = value;
        }
        if let Some(value) = patch.torrent_cleanup_policy {
            self.torrent_cleanup_policy = value;
        }
        if let Some(value) = patch.torrent_cleanup_fixed_minutes {
            self.torrent_cleanup_fixed_minutes = value;
        }
        if let Some(value) = patch.torrent_cleanup_min_minutes {
            self.torrent_cleanup_min_minutes = value;
        }
        if let Some(value) = patch.torrent_cleanup_max_minutes {
            self.torrent_cleanup_max_minutes = value;
        }
        self.updated_at = now;
        self.clamped()
    }
}

/// Partial update for [`RuntimeSettings`]; `None` fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    /// New global upload concurrency cap.
    pub upload_concurrency: Option<i32>,
    /// New global download concurrency cap.
    pub download_concurrency: Option<i32>,
    /// New chunk size for future upload sessions.
    pub upload_chunk_size_bytes: Option<i64>,
    /// New reserved disk byte floor.
    pub reserved_disk_bytes: Option<i64>,
    /// New upload-session TTL in hours.
    pub upload_session_ttl_hours: Option<i32>,
    /// New sweeper cadence in minutes.
    pub upload_session_cleanup_interval_min: Option<i32>,
    /// New thumbnail cache cap in bytes.
    pub thumbnail_cache_max_bytes: Option<i64>,
    /// New thumbnail cache TTL in hours.
    pub thumbnail_cache_ttl_hours: Option<i32>,
    /// New thumbnail generation concurrency.
    pub thumbnail_generate_concurrency: Option<i32>,
    /// New vault password hash (PHC string).
    pub vault_password_hash: Option<String>,
    /// New vault unlock-session TTL in minutes.
    pub vault_session_ttl_minutes: Option<i32>,
    /// New torrent source-cleanup policy.
    pub torrent_cleanup_policy: Option<CleanupPolicy>,
    /// New fixed-policy delay in minutes.
    pub torrent_cleanup_fixed_minutes: Option<i32>,
    /// New random-policy lower bound in minutes.
    pub torrent_cleanup_min_minutes: Option<i32>,
    /// New random-policy upper bound in minutes.
    pub torrent_cleanup_max_minutes: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_their_own_clamps() {
        let defaults = RuntimeSettings::defaults(Utc::now());
        assert_eq!(defaults.clone().clamped(), defaults);
    }

    #[test]
    fn clamp_pins_out_of_range_values() {
        let mut settings = RuntimeSettings::defaults(Utc::now());
        settings.upload_concurrency = 99;
        settings.download_concurrency = 0;
        settings.upload_chunk_size_bytes = 1;
        settings.reserved_disk_bytes = -5;
        settings.upload_session_ttl_hours = 100_000;
        settings.thumbnail_generate_concurrency = 12;
        let clamped = settings.clamped();
        assert_eq!(clamped.upload_concurrency, 16);
        assert_eq!(clamped.download_concurrency, 1);
        assert_eq!(clamped.upload_chunk_size_bytes, MIB);
        assert_eq!(clamped.reserved_disk_bytes, 0);
        assert_eq!(clamped.upload_session_ttl_hours, 720);
        assert_eq!(clamped.thumbnail_generate_concurrency, 4);
    }

    #[test]
    fn random_window_upper_bound_never_undershoots_lower() {
        let mut settings = RuntimeSettings::defaults(Utc::now());
        settings.torrent_cleanup_min_minutes = 500;
        settings.torrent_cleanup_max_minutes = 10;
        let clamped = settings.clamped();
        assert_eq!(clamped.torrent_cleanup_min_minutes, 500);
        assert_eq!(clamped.torrent_cleanup_max_minutes, 500);
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let now = Utc::now();
        let settings = RuntimeSettings::defaults(now);
        let patched = settings.clone().apply(
            SettingsPatch {
                upload_concurrency: Some(8),
                torrent_cleanup_policy: Some(CleanupPolicy::Random),
                ..SettingsPatch::default()
            },
            now,
        );
        assert_eq!(patched.upload_concurrency, 8);
        assert_eq!(patched.torrent_cleanup_policy, CleanupPolicy::Random);
        assert_eq!(patched.download_concurrency, settings.download_concurrency);
        assert_eq!(patched.vault_password_hash, None);
    }

    #[test]
    fn cleanup_policy_labels_round_trip() {
        for policy in [
            CleanupPolicy::Immediate,
            CleanupPolicy::Fixed,
            CleanupPolicy::Random,
        ] {
            assert_eq!(CleanupPolicy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(CleanupPolicy::parse("deferred"), None);
    }
}
