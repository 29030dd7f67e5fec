//! Platform settings: a text key/value table seeded with defaults at startup
//! and read back as a typed snapshot.
//!
//! Values are stored as text and never validated on write. Interpretation
//! happens once, in [`PlatformSettings::from_values`], where every malformed
//! value falls back to its default.

use crate::grading::OutputMatch;
use crate::model::admin::{NewPlatformSetting, PlatformSettingRow};
use crate::schema::platform_settings::dsl as settings_dsl;
use diesel::prelude::*;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const MAX_FAIL_UNLOCK: &str = "max_fail_unlock";
pub const XP_PER_LEVEL: &str = "xp_per_level";
pub const XP_PER_FIRST_TRY: &str = "xp_per_first_try";
pub const OUTPUT_MATCH: &str = "output_match";
pub const PLATFORM_NAME: &str = "platform_name";
pub const PLATFORM_TAGLINE: &str = "platform_tagline";
pub const MAINTENANCE_MODE: &str = "maintenance_mode";
pub const ALLOW_REGISTRATIONS: &str = "allow_registrations";
pub const BAN_DURATION_DAYS: &str = "ban_duration_days";
pub const MEDIA_THUMB_W: &str = "media_thumb_w";
pub const MEDIA_THUMB_H: &str = "media_thumb_h";
pub const MEDIA_THUMB_CROP: &str = "media_thumb_crop";
pub const MEDIA_MEDIUM_W: &str = "media_medium_w";
pub const MEDIA_MEDIUM_H: &str = "media_medium_h";
pub const MEDIA_LARGE_W: &str = "media_large_w";
pub const MEDIA_LARGE_H: &str = "media_large_h";
pub const MEDIA_ORGANIZE: &str = "media_organize";

/// One row of the default settings table.
pub struct SettingDefault {
    pub key: &'static str,
    pub value: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub tab: &'static str,
}

const fn setting(
    key: &'static str,
    value: &'static str,
    label: &'static str,
    description: &'static str,
    tab: &'static str,
) -> SettingDefault {
    SettingDefault {
        key,
        value,
        label,
        description,
        tab,
    }
}

pub const DEFAULT_SETTINGS: &[SettingDefault] = &[
    setting(
        MAX_FAIL_UNLOCK,
        "5",
        "Failed Attempts to Unlock Repo Link",
        "How many failed attempts before the repo link is revealed.",
        "gameplay",
    ),
    setting(
        XP_PER_LEVEL,
        "100",
        "XP Awarded per Level Completion",
        "XP given to a user when they pass a level.",
        "gameplay",
    ),
    setting(
        XP_PER_FIRST_TRY,
        "50",
        "Bonus XP for First-Try Pass",
        "Extra XP awarded if the student passes on their very first attempt.",
        "gameplay",
    ),
    setting(
        OUTPUT_MATCH,
        "trim",
        "Output Comparison",
        "How program output is compared with the expected output: exact, trim or normalize.",
        "gameplay",
    ),
    setting(
        PLATFORM_NAME,
        "Campus404",
        "Platform Name",
        "Shown in the browser title and student-facing pages.",
        "platform",
    ),
    setting(
        PLATFORM_TAGLINE,
        "Learn by fixing bugs",
        "Platform Tagline",
        "Short description shown on the login / landing screen.",
        "platform",
    ),
    setting(
        MAINTENANCE_MODE,
        "false",
        "Maintenance Mode",
        "When enabled, students cannot run or submit code.",
        "platform",
    ),
    setting(
        ALLOW_REGISTRATIONS,
        "true",
        "Allow New Registrations",
        "Disable to prevent new users from creating accounts.",
        "access",
    ),
    setting(
        BAN_DURATION_DAYS,
        "0",
        "Ban Duration (days)",
        "How long a ban lasts. Set to 0 for permanent bans.",
        "access",
    ),
    setting(
        MEDIA_THUMB_W,
        "150",
        "Thumbnail Width",
        "Maximum width of a thumbnail (pixels).",
        "media",
    ),
    setting(
        MEDIA_THUMB_H,
        "150",
        "Thumbnail Height",
        "Maximum height of a thumbnail (pixels).",
        "media",
    ),
    setting(
        MEDIA_THUMB_CROP,
        "true",
        "Crop Thumbnails",
        "If enabled, thumbnail images are cropped to exact dimensions.",
        "media",
    ),
    setting(
        MEDIA_MEDIUM_W,
        "300",
        "Medium Width",
        "Maximum width of a medium-sized image (pixels).",
        "media",
    ),
    setting(
        MEDIA_MEDIUM_H,
        "300",
        "Medium Height",
        "Maximum height of a medium-sized image (pixels).",
        "media",
    ),
    setting(
        MEDIA_LARGE_W,
        "1024",
        "Large Width",
        "Maximum width of a large-sized image (pixels).",
        "media",
    ),
    setting(
        MEDIA_LARGE_H,
        "1024",
        "Large Height",
        "Maximum height of a large-sized image (pixels).",
        "media",
    ),
    setting(
        MEDIA_ORGANIZE,
        "true",
        "Organize Uploads",
        "Organize media into month- and year-based folders.",
        "media",
    ),
];

/// Inserts every default setting whose key is not present yet.
/// Existing values are left untouched. Returns the number of rows inserted.
pub fn seed_defaults(conn: &mut PgConnection) -> QueryResult<usize> {
    let rows: Vec<NewPlatformSetting> = DEFAULT_SETTINGS
        .iter()
        .map(|d| NewPlatformSetting {
            key: d.key,
            value: d.value,
            label: d.label,
            description: d.description,
            tab: d.tab,
        })
        .collect();

    let inserted = diesel::insert_into(settings_dsl::platform_settings)
        .values(&rows)
        .on_conflict(settings_dsl::key)
        .do_nothing()
        .execute(conn)?;

    info!(
        "Seeded {} of {} default platform settings",
        inserted,
        rows.len()
    );
    Ok(inserted)
}

/// Reads a single raw setting value, or `default` if the key is absent.
pub fn get_setting(conn: &mut PgConnection, key: &str, default: &str) -> QueryResult<String> {
    let value = settings_dsl::platform_settings
        .find(key)
        .select(settings_dsl::value)
        .first::<String>(conn)
        .optional()?;
    Ok(value.unwrap_or_else(|| default.to_string()))
}

/// Loads every stored setting row.
pub fn load_rows(conn: &mut PgConnection) -> QueryResult<Vec<PlatformSettingRow>> {
    settings_dsl::platform_settings
        .order((settings_dsl::tab.asc(), settings_dsl::key.asc()))
        .select(PlatformSettingRow::as_select())
        .load(conn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpRules {
    pub xp_per_level: i32,
    pub xp_per_first_try: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBox {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSettings {
    pub thumbnail: SizeBox,
    pub thumbnail_crop: bool,
    pub medium: SizeBox,
    pub large: SizeBox,
    pub organize: bool,
}

/// Typed snapshot of the settings table. The `access` tab is stored for the
/// account frontend and has no field here.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformSettings {
    pub max_fail_unlock: i32,
    pub xp: XpRules,
    pub output_match: OutputMatch,
    pub platform_name: String,
    pub platform_tagline: String,
    pub maintenance_mode: bool,
    pub media: MediaSettings,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self::from_values(&HashMap::new())
    }
}

impl PlatformSettings {
    /// Reads the whole table once and interprets it.
    pub fn load(conn: &mut PgConnection) -> QueryResult<Self> {
        let values: HashMap<String, String> = settings_dsl::platform_settings
            .select((settings_dsl::key, settings_dsl::value))
            .load::<(String, String)>(conn)?
            .into_iter()
            .collect();
        debug!("Loaded {} platform settings", values.len());
        Ok(Self::from_values(&values))
    }

    pub fn from_values(values: &HashMap<String, String>) -> Self {
        let reader = Reader { values };
        PlatformSettings {
            max_fail_unlock: reader.non_negative(MAX_FAIL_UNLOCK),
            xp: XpRules {
                xp_per_level: reader.non_negative(XP_PER_LEVEL),
                xp_per_first_try: reader.non_negative(XP_PER_FIRST_TRY),
            },
            output_match: reader.parsed(OUTPUT_MATCH).unwrap_or_default(),
            platform_name: reader.text(PLATFORM_NAME),
            platform_tagline: reader.text(PLATFORM_TAGLINE),
            maintenance_mode: reader.flag(MAINTENANCE_MODE),
            media: MediaSettings {
                thumbnail: reader.size_box(MEDIA_THUMB_W, MEDIA_THUMB_H),
                thumbnail_crop: reader.flag(MEDIA_THUMB_CROP),
                medium: reader.size_box(MEDIA_MEDIUM_W, MEDIA_MEDIUM_H),
                large: reader.size_box(MEDIA_LARGE_W, MEDIA_LARGE_H),
                organize: reader.flag(MEDIA_ORGANIZE),
            },
        }
    }
}

fn default_value(key: &str) -> &'static str {
    DEFAULT_SETTINGS
        .iter()
        .find(|d| d.key == key)
        .map(|d| d.value)
        .unwrap_or("")
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

struct Reader<'a> {
    values: &'a HashMap<String, String>,
}

impl Reader<'_> {
    fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Stored value if it parses, otherwise the parsed default.
    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        if let Some(raw) = self.raw(key) {
            match raw.trim().parse::<T>() {
                Ok(value) => return Some(value),
                Err(_) => warn!(
                    "Setting '{}' has unparsable value '{}', using default '{}'",
                    key,
                    raw,
                    default_value(key)
                ),
            }
        }
        default_value(key).parse::<T>().ok()
    }

    fn non_negative(&self, key: &str) -> i32 {
        let default = default_value(key).parse().unwrap_or(0);
        let value: i32 = self.parsed(key).unwrap_or(default);
        if value < 0 {
            warn!("Setting '{}' is negative ({}), using default", key, value);
            return default;
        }
        value
    }

    fn flag(&self, key: &str) -> bool {
        let default = parse_flag(default_value(key)).unwrap_or(false);
        match self.raw(key) {
            None => default,
            Some(raw) => parse_flag(raw).unwrap_or_else(|| {
                warn!(
                    "Setting '{}' has non-boolean value '{}', using default {}",
                    key, raw, default
                );
                default
            }),
        }
    }

    fn text(&self, key: &str) -> String {
        self.raw(key).unwrap_or(default_value(key)).to_string()
    }

    fn dimension(&self, key: &str) -> u32 {
        let default = default_value(key).parse().unwrap_or(1);
        let value: u32 = self.parsed(key).unwrap_or(default);
        if value == 0 {
            warn!("Setting '{}' is zero, using default", key);
            return default;
        }
        value
    }

    fn size_box(&self, width_key: &str, height_key: &str) -> SizeBox {
        SizeBox {
            width: self.dimension(width_key),
            height: self.dimension(height_key),
        }
    }
}
